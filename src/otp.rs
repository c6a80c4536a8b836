use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{MailboxError, OtpError};
use crate::mailbox::{extract_otp, MailboxClient};

/// Bookkeeping for one OTP-retrieval call. Created on entry, mutated once per
/// loop iteration, discarded when the call returns.
#[derive(Debug)]
pub struct PollState {
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub interval: Duration,
    pub deadline_reached: bool,
}

impl PollState {
    fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            attempts_made: 0,
            max_attempts,
            interval,
            deadline_reached: max_attempts == 0,
        }
    }

    fn has_budget(&self) -> bool {
        !self.deadline_reached
    }

    fn record_attempt(&mut self) {
        self.attempts_made += 1;
        if self.attempts_made >= self.max_attempts {
            self.deadline_reached = true;
        }
    }
}

/// Poll the mailbox until a message with a valid 6-digit code arrives, for at
/// most `max_attempts` attempts spaced `interval` apart. The attempt budget
/// gives a deterministic worst-case wall-clock bound of
/// `(max_attempts - 1) * interval` total suspension; a hit on any attempt
/// short-circuits without waiting out the remainder.
///
/// Transient mailbox trouble counts as "no message yet" for that attempt.
/// Unrecoverable mailbox failures propagate immediately.
pub async fn retrieve_otp(
    client: &mut dyn MailboxClient,
    max_attempts: u32,
    interval: Duration,
) -> Result<String, OtpError> {
    let mut state = PollState::new(max_attempts, interval);
    let mut saw_mail = false;

    while state.has_budget() {
        info!(
            "polling for OTP, attempt {}/{}",
            state.attempts_made + 1,
            state.max_attempts
        );

        match client.check_inbox().await {
            Ok(Some(message)) => {
                saw_mail = true;
                match extract_otp(&message.raw_body) {
                    Ok(code) => {
                        info!(attempts = state.attempts_made + 1, "OTP found: {code}");
                        return Ok(code);
                    }
                    Err(_) => {
                        // A message with no code (e.g. a welcome mail) is not
                        // terminal; the real one may still be in flight.
                        warn!(
                            identifier = %message.identifier,
                            "message present but no valid code in body"
                        );
                    }
                }
            }
            Ok(None) => debug!("no message yet"),
            Err(MailboxError::Transient(cause)) => {
                warn!(%cause, "transient mailbox failure, continuing to poll");
            }
            Err(MailboxError::Unrecoverable(cause)) => {
                return Err(OtpError::Mailbox(cause));
            }
        }

        state.record_attempt();
        if state.has_budget() {
            tokio::time::sleep(state.interval).await;
        }
    }

    if saw_mail {
        Err(OtpError::ExtractionFailed {
            attempts: state.attempts_made,
        })
    } else {
        Err(OtpError::Timeout {
            attempts: state.attempts_made,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::InboxMessage;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    /// Scripted mailbox: pops one result per check, then reports empty.
    struct StubMailbox {
        script: VecDeque<Result<Option<InboxMessage>, MailboxError>>,
        calls: u32,
    }

    impl StubMailbox {
        fn new(script: Vec<Result<Option<InboxMessage>, MailboxError>>) -> Self {
            Self {
                script: script.into(),
                calls: 0,
            }
        }
    }

    #[async_trait]
    impl MailboxClient for StubMailbox {
        async fn check_inbox(&mut self) -> Result<Option<InboxMessage>, MailboxError> {
            self.calls += 1;
            self.script.pop_front().unwrap_or(Ok(None))
        }
    }

    fn otp_message() -> InboxMessage {
        InboxMessage {
            identifier: "1".into(),
            raw_body: "Your code is: 482193 - expires in 10 minutes".into(),
        }
    }

    fn noise_message() -> InboxMessage {
        InboxMessage {
            identifier: "2".into(),
            raw_body: "Welcome to Glyph! Track parcel 0123456789".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_final_attempt_using_exactly_n() {
        let mut stub = StubMailbox::new(vec![
            Ok(None),
            Ok(None),
            Ok(None),
            Ok(None),
            Ok(Some(otp_message())),
        ]);

        let code = retrieve_otp(&mut stub, 5, Duration::from_secs(3)).await.unwrap();
        assert_eq!(code, "482193");
        assert_eq!(stub.calls, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_is_bounded_and_returns_timeout() {
        let mut stub = StubMailbox::new(vec![]);
        let start = tokio::time::Instant::now();

        let err = retrieve_otp(&mut stub, 4, Duration::from_secs(2)).await.unwrap_err();

        assert!(matches!(err, OtpError::Timeout { attempts: 4 }));
        assert_eq!(stub.calls, 4);
        // Suspension only between attempts: (4 - 1) * 2s.
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn short_circuits_without_delay_on_first_attempt() {
        let mut stub = StubMailbox::new(vec![Ok(Some(otp_message()))]);
        let start = tokio::time::Instant::now();

        let code = retrieve_otp(&mut stub, 10, Duration::from_secs(30)).await.unwrap();

        assert_eq!(code, "482193");
        assert_eq!(stub.calls, 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempt_budget_times_out_without_checking() {
        let mut stub = StubMailbox::new(vec![Ok(Some(otp_message()))]);

        let err = retrieve_otp(&mut stub, 0, Duration::from_secs(1)).await.unwrap_err();

        assert!(matches!(err, OtpError::Timeout { attempts: 0 }));
        assert_eq!(stub.calls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn mail_without_code_reports_extraction_failed_at_exhaustion() {
        let mut stub = StubMailbox::new(vec![
            Ok(Some(noise_message())),
            Ok(Some(noise_message())),
            Ok(Some(noise_message())),
        ]);

        let err = retrieve_otp(&mut stub, 3, Duration::from_secs(1)).await.unwrap_err();

        assert!(matches!(err, OtpError::ExtractionFailed { attempts: 3 }));
        assert_eq!(stub.calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn code_still_found_after_noise_mail() {
        let mut stub = StubMailbox::new(vec![
            Ok(Some(noise_message())),
            Ok(Some(otp_message())),
        ]);

        let code = retrieve_otp(&mut stub, 5, Duration::from_secs(1)).await.unwrap();
        assert_eq!(code, "482193");
        assert_eq!(stub.calls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_swallowed() {
        let mut stub = StubMailbox::new(vec![
            Err(MailboxError::Transient("socket reset".into())),
            Ok(Some(otp_message())),
        ]);

        let code = retrieve_otp(&mut stub, 5, Duration::from_secs(1)).await.unwrap();
        assert_eq!(code, "482193");
        assert_eq!(stub.calls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unrecoverable_failure_propagates_immediately() {
        let mut stub = StubMailbox::new(vec![
            Err(MailboxError::Unrecoverable("invalid API key".into())),
        ]);
        let start = tokio::time::Instant::now();

        let err = retrieve_otp(&mut stub, 10, Duration::from_secs(30)).await.unwrap_err();

        assert!(matches!(err, OtpError::Mailbox(_)));
        assert_eq!(stub.calls, 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
