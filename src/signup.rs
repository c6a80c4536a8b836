use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::{MailboxStrategy, SmokeConfig};
use crate::error::SmokeError;
use crate::identity::SignupContext;
use crate::mailbox::{ApiInbox, WebmailInbox};
use crate::otp;
use crate::session::{BrowserSession, Locator};

// Locator contract of the signup widget.
const EMAIL_INPUT: &str = "#email-input";
const PASSWORD_INPUT: &str = "#password-input";
const CONFIRM_PASSWORD_INPUT: &str = "#confirm-password-input";
const SIGN_UP_LABEL: &str = "Sign Up";
const OTP_CELL_PREFIX: &str = "email-otp-";
const UNIFIED_ID_INPUT: &str = "#unified-id-input";
const NEXT_LABEL: &str = "Next";
const PIN_CELL_PREFIX: &str = "pin-input-";
const CONFIRM_PIN_CELL_PREFIX: &str = "confirm-pin-input-";
const CREATE_LABEL: &str = "Create";
const SUCCESS_HEADING_TEXT: &str = "successfully";

/// How long the finalize button probe waits for the "Create" label before
/// falling back to "Next".
const FINALIZE_PROBE: Duration = Duration::from_secs(3);

/// Linear progression of one signup run. `ConfirmPinSet` is entered only when
/// the widget renders a confirmation row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignupState {
    Start,
    CredentialsEntered,
    SubmittedSignup,
    OtpRetrieved,
    OtpSubmitted,
    IdentifierChosen,
    PinSet,
    ConfirmPinSet,
    Verified,
}

impl SignupState {
    pub fn name(&self) -> &'static str {
        match self {
            SignupState::Start => "Start",
            SignupState::CredentialsEntered => "CredentialsEntered",
            SignupState::SubmittedSignup => "SubmittedSignup",
            SignupState::OtpRetrieved => "OtpRetrieved",
            SignupState::OtpSubmitted => "OtpSubmitted",
            SignupState::IdentifierChosen => "IdentifierChosen",
            SignupState::PinSet => "PinSet",
            SignupState::ConfirmPinSet => "ConfirmPinSet",
            SignupState::Verified => "Verified",
        }
    }
}

/// What a successful run reports back to the operator.
#[derive(Debug, Clone)]
pub struct SignupReport {
    pub unified_id: String,
    pub email: String,
    pub elapsed: Duration,
}

fn segmented_cell(prefix: &str, index: usize) -> Locator {
    Locator::css(format!("#{prefix}{index}"))
}

/// Drives the whole flow. Owns the browser session and the run's identity
/// material; every transition either completes and advances the state or
/// aborts the run. There is no partial-state resume.
pub struct SignupOrchestrator {
    session: BrowserSession,
    config: SmokeConfig,
    context: SignupContext,
    state: SignupState,
}

impl SignupOrchestrator {
    pub fn new(session: BrowserSession, config: SmokeConfig, context: SignupContext) -> Self {
        Self {
            session,
            config,
            context,
            state: SignupState::Start,
        }
    }

    pub fn state(&self) -> SignupState {
        self.state
    }

    fn advance(&mut self, next: SignupState) {
        info!("state {} -> {}", self.state.name(), next.name());
        self.state = next;
    }

    /// The widget lives in a nested iframe; every return to it re-enters the
    /// top document first.
    async fn enter_widget(&mut self) -> Result<(), SmokeError> {
        self.session.exit_to_top_frame();
        let frame_id = self.config.target.widget_frame_id.clone();
        self.session.enter_frame(&frame_id).await
    }

    async fn enter_segmented_code(&mut self, prefix: &str, code: &str) -> Result<(), SmokeError> {
        for (index, digit) in code.chars().enumerate() {
            let cell = segmented_cell(prefix, index);
            self.session
                .set_field_value(&cell, &digit.to_string())
                .await?;
        }
        Ok(())
    }

    async fn poll_for_otp(&mut self) -> Result<String, SmokeError> {
        let max_attempts = self.config.poll.max_attempts;
        let interval = Duration::from_millis(self.config.poll.interval_ms);

        match self.config.mailbox.strategy {
            MailboxStrategy::Api => {
                // Presence validated at config load.
                let api_url = self.config.mailbox.api_url.clone().unwrap_or_default();
                let mut client = ApiInbox::new(&api_url, self.context.mailbox.clone())
                    .map_err(|e| SmokeError::MailboxUnrecoverable(e.to_string()))?;
                Ok(otp::retrieve_otp(&mut client, max_attempts, interval).await?)
            }
            MailboxStrategy::Webmail => {
                let webmail_url = self.config.mailbox.webmail_url.clone().unwrap_or_default();
                let address = self.context.mailbox.clone();

                let mut inbox =
                    WebmailInbox::open(&mut self.session, &webmail_url, &address).await?;
                let outcome = otp::retrieve_otp(&mut inbox, max_attempts, interval).await;
                // The secondary tab comes down whether or not a code arrived.
                if let Err(e) = inbox.close() {
                    warn!("webmail tab teardown: {e}");
                }
                Ok(outcome?)
            }
        }
    }

    /// The finalize control is labeled "Create" on current widget builds and
    /// "Next" on older ones.
    async fn click_finalize(&mut self) -> Result<(), SmokeError> {
        let create = Locator::button(CREATE_LABEL);
        match self
            .session
            .wait_until_visible_within(&create, FINALIZE_PROBE)
            .await
        {
            Ok(()) => self.session.click_robust(&create).await,
            Err(SmokeError::ElementNotFound { .. }) => {
                self.session.click_robust(&Locator::button(NEXT_LABEL)).await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn run(&mut self) -> Result<SignupReport, SmokeError> {
        let started = Instant::now();
        let email = self.context.mailbox.to_string();
        info!("starting signup run for {email}");

        // Start -> CredentialsEntered
        let base_url = self.config.target.base_url.clone();
        self.session.navigate(&base_url)?;
        self.enter_widget().await?;

        let password = self.context.password.clone();
        self.session
            .set_field_value(&Locator::css(EMAIL_INPUT), &email)
            .await?;
        self.session
            .set_field_value(&Locator::css(PASSWORD_INPUT), &password)
            .await?;
        self.session
            .set_field_value(&Locator::css(CONFIRM_PASSWORD_INPUT), &password)
            .await?;
        self.advance(SignupState::CredentialsEntered);

        // CredentialsEntered -> SubmittedSignup
        self.session
            .click_robust(&Locator::button(SIGN_UP_LABEL))
            .await?;
        self.advance(SignupState::SubmittedSignup);

        // Give the backend a moment to dispatch the OTP mail before the
        // first inbox check burns an attempt.
        let settle = Duration::from_millis(self.config.poll.post_submit_delay_ms);
        info!("waiting {settle:?} for OTP dispatch");
        tokio::time::sleep(settle).await;

        // SubmittedSignup -> OtpRetrieved
        let code = self.poll_for_otp().await?;
        self.advance(SignupState::OtpRetrieved);

        // OtpRetrieved -> OtpSubmitted
        self.session.switch_to_tab(0)?;
        self.enter_widget().await?;
        self.enter_segmented_code(OTP_CELL_PREFIX, &code).await?;
        self.advance(SignupState::OtpSubmitted);

        // OtpSubmitted -> IdentifierChosen
        let unified_id = self.context.unified_id.clone();
        let id_input = Locator::css(UNIFIED_ID_INPUT);
        self.session.set_field_value(&id_input, &unified_id).await?;

        // Submission proceeds only with the field confirmed to hold exactly
        // the generated identifier.
        let written = self.session.field_value(&id_input)?.unwrap_or_default();
        if written != unified_id {
            return Err(SmokeError::Browser(format!(
                "identifier field holds {written:?}, expected {unified_id:?}"
            )));
        }
        info!("unified id entered: {unified_id}");

        self.session.click_robust(&Locator::button(NEXT_LABEL)).await?;
        self.advance(SignupState::IdentifierChosen);

        // IdentifierChosen -> PinSet
        let pin = self.context.pin.clone();
        self.session
            .wait_until_visible(&segmented_cell(PIN_CELL_PREFIX, 0))
            .await?;
        self.enter_segmented_code(PIN_CELL_PREFIX, &pin).await?;
        self.advance(SignupState::PinSet);

        // PinSet -> ConfirmPinSet (only if the widget renders one). The field
        // gets a bounded settle window before it is concluded absent, so a
        // slow render is not mistaken for a missing step.
        let confirm_settle = Duration::from_millis(self.config.poll.confirm_pin_settle_ms);
        match self
            .session
            .wait_until_visible_within(&segmented_cell(CONFIRM_PIN_CELL_PREFIX, 0), confirm_settle)
            .await
        {
            Ok(()) => {
                self.enter_segmented_code(CONFIRM_PIN_CELL_PREFIX, &pin).await?;
                self.advance(SignupState::ConfirmPinSet);
            }
            Err(SmokeError::ElementNotFound { .. }) => {
                info!("no confirm-PIN field within {confirm_settle:?}, proceeding");
            }
            Err(e) => return Err(e),
        }

        self.click_finalize().await?;

        // -> Verified. The success heading is a hard deadline: unlike OTP
        // delivery, final verification is not expected to be flaky.
        let heading = Locator::text("h1", SUCCESS_HEADING_TEXT);
        self.session
            .wait_until_visible(&heading)
            .await
            .map_err(|e| match e {
                SmokeError::ElementNotFound { locator, waited } => SmokeError::VerificationFailed(
                    format!("{locator} not visible after {waited:?}"),
                ),
                other => other,
            })?;
        self.advance(SignupState::Verified);

        info!("✓ registration verified for unified id {unified_id}");
        Ok(SignupReport {
            unified_id,
            email,
            elapsed: started.elapsed(),
        })
    }

    /// Capture a post-mortem screenshot named after the failure category.
    /// Called on the abort path before teardown; never masks the real error.
    pub fn capture_failure(&self, error: &SmokeError) -> Option<PathBuf> {
        let dir = PathBuf::from(&self.config.artifacts.screenshot_dir);
        match self.session.screenshot_to(&dir, error.category()) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("failed to capture failure screenshot: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segmented_cells_are_positionally_addressed() {
        assert_eq!(segmented_cell(OTP_CELL_PREFIX, 0).to_string(), "#email-otp-0");
        assert_eq!(segmented_cell(PIN_CELL_PREFIX, 5).to_string(), "#pin-input-5");
        assert_eq!(
            segmented_cell(CONFIRM_PIN_CELL_PREFIX, 2).to_string(),
            "#confirm-pin-input-2"
        );
    }

    #[test]
    fn state_names_follow_the_flow() {
        let flow = [
            SignupState::Start,
            SignupState::CredentialsEntered,
            SignupState::SubmittedSignup,
            SignupState::OtpRetrieved,
            SignupState::OtpSubmitted,
            SignupState::IdentifierChosen,
            SignupState::PinSet,
            SignupState::ConfirmPinSet,
            SignupState::Verified,
        ];
        let names: Vec<_> = flow.iter().map(|s| s.name()).collect();
        assert_eq!(names.first(), Some(&"Start"));
        assert_eq!(names.last(), Some(&"Verified"));
        assert_eq!(names.len(), 9);
    }
}
