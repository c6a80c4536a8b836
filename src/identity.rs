use rand::Rng;

use crate::config::SmokeConfig;
use crate::mailbox::MailboxAddress;

/// Ephemeral identity material for one run. Generated once, never persisted.
#[derive(Debug, Clone)]
pub struct SignupContext {
    pub mailbox: MailboxAddress,
    pub password: String,
    pub unified_id: String,
    pub pin: String,
}

impl SignupContext {
    /// Generate fresh identity material. The mailbox local part carries a
    /// millisecond timestamp so concurrent and repeated runs never collide.
    pub fn generate(config: &SmokeConfig) -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        let local_part = format!("{}_{}", config.credentials.mailbox_prefix, millis);
        let mailbox = MailboxAddress::new(local_part, config.mailbox.domain.clone());

        let mut rng = rand::thread_rng();
        let unified_id = format!("id{}", rng.gen_range(10000..100000));

        Self {
            mailbox,
            password: config.credentials.password.clone(),
            unified_id,
            pin: config.credentials.pin.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SmokeConfig;

    fn test_config() -> SmokeConfig {
        SmokeConfig::from_toml(include_str!("../config/default.toml")).unwrap()
    }

    #[test]
    fn generated_context_has_expected_shape() {
        let ctx = SignupContext::generate(&test_config());

        assert!(ctx.mailbox.local_part.starts_with("glyph_qa_"));
        assert_eq!(ctx.mailbox.domain, "yopmail.com");
        assert!(ctx.mailbox.to_string().ends_with("@yopmail.com"));

        assert!(ctx.unified_id.starts_with("id"));
        assert_eq!(ctx.unified_id.len(), 7);
        assert!(ctx.unified_id[2..].bytes().all(|b| b.is_ascii_digit()));

        assert_eq!(ctx.pin.len(), 6);
    }

    #[test]
    fn contexts_are_unique_per_run() {
        let config = test_config();
        let a = SignupContext::generate(&config);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = SignupContext::generate(&config);
        assert_ne!(a.mailbox.local_part, b.mailbox.local_part);
    }
}
