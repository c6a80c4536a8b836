pub mod api;
pub mod webmail;

use async_trait::async_trait;
use regex::Regex;

use crate::error::MailboxError;

pub use api::ApiInbox;
pub use webmail::WebmailInbox;

/// A disposable mailbox address, fixed for the lifetime of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxAddress {
    pub local_part: String,
    pub domain: String,
}

impl MailboxAddress {
    pub fn new(local_part: String, domain: String) -> Self {
        Self { local_part, domain }
    }
}

impl std::fmt::Display for MailboxAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.local_part, self.domain)
    }
}

/// One message pulled from the inbox. `identifier` is whatever handle the
/// provider exposes (numeric id for the API backend, row id for webmail).
#[derive(Debug, Clone)]
pub struct InboxMessage {
    pub identifier: String,
    pub raw_body: String,
}

/// Signalled when a message body carries no valid code.
#[derive(Debug, Clone, thiserror::Error)]
#[error("no isolated 6-digit code in message body")]
pub struct ExtractionError;

/// Pull the OTP out of a message body: a 6-digit run that is not part of a
/// longer digit run. A 10-digit tracking number must not match. First such
/// run wins if the body carries several.
pub fn extract_otp(body: &str) -> Result<String, ExtractionError> {
    let re = Regex::new(r"(?:^|[^0-9])([0-9]{6})(?:[^0-9]|$)").expect("static pattern");
    re.captures(body)
        .map(|caps| caps[1].to_string())
        .ok_or(ExtractionError)
}

/// One mailbox-retrieval strategy. A single non-blocking attempt per call:
/// `Ok(None)` means nothing has arrived yet and polling should continue.
/// Transient trouble (network hiccup, frame not rendered, empty list) is the
/// implementation's to absorb into `Ok(None)` or `MailboxError::Transient`;
/// only genuinely unrecoverable conditions surface as `Unrecoverable`.
#[async_trait]
pub trait MailboxClient: Send {
    async fn check_inbox(&mut self) -> Result<Option<InboxMessage>, MailboxError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolated_six_digit_code_extracts() {
        assert_eq!(extract_otp("482193").unwrap(), "482193");
        assert_eq!(extract_otp("code 482193 sent").unwrap(), "482193");
        assert_eq!(extract_otp("(482193)").unwrap(), "482193");
    }

    #[test]
    fn expiry_notice_body_extracts() {
        let body = "Your code is: 482193 - expires in 10 minutes";
        assert_eq!(extract_otp(body).unwrap(), "482193");
    }

    #[test]
    fn longer_digit_runs_do_not_match() {
        assert!(extract_otp("tracking number 0123456789").is_err());
        assert!(extract_otp("ref 1234567").is_err());
    }

    #[test]
    fn shorter_digit_runs_do_not_match() {
        assert!(extract_otp("pin 12345 only").is_err());
        assert!(extract_otp("no digits here").is_err());
    }

    #[test]
    fn first_isolated_run_wins() {
        assert_eq!(extract_otp("backup 111111, code 222222").unwrap(), "111111");
    }

    #[test]
    fn code_at_end_of_body_extracts() {
        assert_eq!(extract_otp("your verification code is 654321").unwrap(), "654321");
    }

    #[test]
    fn ten_digit_number_beside_valid_code() {
        let body = "order 0123456789 confirmed, verification code 482193";
        assert_eq!(extract_otp(body).unwrap(), "482193");
    }

    #[test]
    fn mailbox_address_renders_as_email() {
        let addr = MailboxAddress::new("glyph_qa_1700000000".into(), "example.test".into());
        assert_eq!(addr.to_string(), "glyph_qa_1700000000@example.test");
    }
}
