use anyhow::{Context, Result};
use serde::Deserialize;
use url::Url;

#[derive(Debug, Deserialize, Clone)]
pub struct SmokeConfig {
    pub target: TargetConfig,
    pub credentials: CredentialsConfig,
    pub mailbox: MailboxConfig,
    pub poll: PollConfig,
    pub browser: BrowserConfig,
    pub artifacts: ArtifactsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TargetConfig {
    /// Page hosting the signup widget.
    pub base_url: String,
    /// id of the iframe the widget renders into.
    #[serde(default = "default_widget_frame_id")]
    pub widget_frame_id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CredentialsConfig {
    pub password: String,
    /// Six digits, entered one per PIN cell.
    pub pin: String,
    /// Local-part prefix for the generated mailbox address.
    #[serde(default = "default_mailbox_prefix")]
    pub mailbox_prefix: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MailboxConfig {
    pub strategy: MailboxStrategy,
    /// Domain the disposable address lives under.
    pub domain: String,
    /// Web inbox base URL (webmail strategy).
    #[serde(default)]
    pub webmail_url: Option<String>,
    /// REST API base URL (api strategy).
    #[serde(default)]
    pub api_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MailboxStrategy {
    Webmail,
    Api,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Settle delay after submitting credentials, before the first inbox check.
    #[serde(default = "default_post_submit_delay_ms")]
    pub post_submit_delay_ms: u64,
    /// How long the confirm-PIN field gets to render before it is concluded absent.
    #[serde(default = "default_confirm_pin_settle_ms")]
    pub confirm_pin_settle_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrowserConfig {
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
    /// Deadline for individual element/frame waits.
    #[serde(default = "default_wait_timeout_seconds")]
    pub wait_timeout_seconds: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArtifactsConfig {
    #[serde(default = "default_screenshot_dir")]
    pub screenshot_dir: String,
}

fn default_widget_frame_id() -> String {
    "safle-react-widget-iframe".to_string()
}
fn default_mailbox_prefix() -> String {
    "glyph_qa".to_string()
}
fn default_max_attempts() -> u32 {
    10
}
fn default_interval_ms() -> u64 {
    6000
}
fn default_post_submit_delay_ms() -> u64 {
    5000
}
fn default_confirm_pin_settle_ms() -> u64 {
    2500
}
fn default_headless() -> bool {
    true
}
fn default_window_width() -> u32 {
    1920
}
fn default_window_height() -> u32 {
    1080
}
fn default_wait_timeout_seconds() -> u64 {
    60
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36"
        .to_string()
}
fn default_screenshot_dir() -> String {
    "screenshots".to_string()
}

impl SmokeConfig {
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: SmokeConfig = toml::from_str(raw).context("parsing config")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would only fail mid-run. Re-run after
    /// CLI/env overrides are applied.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.target.base_url)
            .with_context(|| format!("invalid target.base_url: {}", self.target.base_url))?;

        match self.mailbox.strategy {
            MailboxStrategy::Webmail => {
                let url = self
                    .mailbox
                    .webmail_url
                    .as_deref()
                    .context("mailbox.webmail_url required for the webmail strategy")?;
                Url::parse(url).with_context(|| format!("invalid mailbox.webmail_url: {url}"))?;
            }
            MailboxStrategy::Api => {
                let url = self
                    .mailbox
                    .api_url
                    .as_deref()
                    .context("mailbox.api_url required for the api strategy")?;
                Url::parse(url).with_context(|| format!("invalid mailbox.api_url: {url}"))?;
            }
        }

        if self.poll.max_attempts == 0 {
            anyhow::bail!("poll.max_attempts must be at least 1");
        }
        if self.credentials.pin.len() != 6 || !self.credentials.pin.bytes().all(|b| b.is_ascii_digit()) {
            anyhow::bail!("credentials.pin must be exactly 6 digits");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT_TOML: &str = include_str!("../config/default.toml");

    #[test]
    fn default_config_parses() {
        let config = SmokeConfig::from_toml(DEFAULT_TOML).unwrap();
        assert_eq!(config.mailbox.strategy, MailboxStrategy::Webmail);
        assert!(config.poll.max_attempts >= 1);
        assert_eq!(config.credentials.pin.len(), 6);
    }

    #[test]
    fn webmail_strategy_requires_webmail_url() {
        let raw = r#"
            [target]
            base_url = "https://unifiedid.glyph.network/"
            [credentials]
            password = "Test@123"
            pin = "888881"
            [mailbox]
            strategy = "webmail"
            domain = "yopmail.com"
            [poll]
            [browser]
            [artifacts]
        "#;
        assert!(SmokeConfig::from_toml(raw).is_err());
    }

    #[test]
    fn bad_pin_rejected() {
        let raw = r#"
            [target]
            base_url = "https://unifiedid.glyph.network/"
            [credentials]
            password = "Test@123"
            pin = "88888"
            [mailbox]
            strategy = "api"
            domain = "yopmail.com"
            api_url = "https://api.example.test/v1"
            [poll]
            [browser]
            [artifacts]
        "#;
        assert!(SmokeConfig::from_toml(raw).is_err());
    }
}
