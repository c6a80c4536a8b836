// Core modules
pub mod cli;
pub mod config;
pub mod error;
pub mod identity;
pub mod mailbox;
pub mod otp;
pub mod session;
pub mod signup;

// Re-exports for convenience
pub use config::{MailboxStrategy, SmokeConfig};
pub use error::{MailboxError, OtpError, SmokeError};
pub use identity::SignupContext;
pub use mailbox::{extract_otp, InboxMessage, MailboxAddress, MailboxClient};
pub use otp::retrieve_otp;
pub use session::{BrowserSession, Locator};
pub use signup::{SignupOrchestrator, SignupReport, SignupState};
