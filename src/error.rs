use std::time::Duration;

/// Top-level error taxonomy for a smoke run. Everything here aborts the run
/// once it escapes its local retry boundary; only the OTP poller and the
/// per-wait loops retry internally.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SmokeError {
    #[error("element not found: {locator} (waited {waited:?})")]
    ElementNotFound { locator: String, waited: Duration },

    #[error("frame never became available: {0}")]
    FrameUnavailable(String),

    #[error(transparent)]
    Otp(#[from] OtpError),

    #[error("mailbox backend unrecoverable: {0}")]
    MailboxUnrecoverable(String),

    #[error("success indicator never appeared: {0}")]
    VerificationFailed(String),

    #[error("browser error: {0}")]
    Browser(String),
}

impl SmokeError {
    /// Short category name used as the screenshot file prefix.
    pub fn category(&self) -> &'static str {
        match self {
            SmokeError::ElementNotFound { .. } => "element_not_found",
            SmokeError::FrameUnavailable(_) => "frame_unavailable",
            SmokeError::Otp(OtpError::Timeout { .. }) => "otp_timeout",
            SmokeError::Otp(OtpError::ExtractionFailed { .. }) => "otp_extraction",
            SmokeError::Otp(OtpError::Mailbox(_)) => "mailbox",
            SmokeError::MailboxUnrecoverable(_) => "mailbox",
            SmokeError::VerificationFailed(_) => "verification",
            SmokeError::Browser(_) => "browser",
        }
    }
}

/// Outcome of the bounded OTP retrieval loop.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OtpError {
    /// Attempts exhausted and no message ever arrived.
    #[error("no OTP mail arrived within {attempts} attempts")]
    Timeout { attempts: u32 },

    /// Mail arrived at least once but never contained a valid code.
    #[error("mail arrived but no 6-digit code found within {attempts} attempts")]
    ExtractionFailed { attempts: u32 },

    /// The mail backend failed in a way polling cannot fix.
    #[error("mailbox unrecoverable: {0}")]
    Mailbox(String),
}

/// Per-attempt mailbox failure classification. Transient failures are
/// swallowed by the poller; unrecoverable ones propagate immediately.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MailboxError {
    #[error("transient mailbox failure: {0}")]
    Transient(String),

    #[error("unrecoverable mailbox failure: {0}")]
    Unrecoverable(String),
}
