use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{MailboxError, SmokeError};
use crate::mailbox::{InboxMessage, MailboxAddress, MailboxClient};
use crate::session::{BrowserSession, Locator};

/// Frame holding the message list on the hosted inbox page.
const INBOX_FRAME_ID: &str = "ifinbox";
/// Frame holding the opened message body.
const MAIL_FRAME_ID: &str = "ifmail";
/// Rows of the message list, newest first.
const MAIL_ROW_SELECTOR: &str = ".m, .lm";

/// How long any single render condition gets per poll attempt. A check must
/// stay a single cheap attempt; the outer poller owns the real time budget.
const ATTEMPT_WAIT: Duration = Duration::from_secs(3);

/// Scraped-UI mailbox strategy: a secondary browser tab logged into the
/// provider's web inbox by direct URL. Each check reloads the page, opens the
/// newest list row inside the inbox frame, and reads the body from the mail
/// frame. The tab is closed when the inbox is dropped, success or failure.
pub struct WebmailInbox<'a> {
    session: &'a mut BrowserSession,
    tab_index: usize,
    closed: bool,
}

impl<'a> WebmailInbox<'a> {
    pub async fn open(
        session: &'a mut BrowserSession,
        webmail_url: &str,
        address: &MailboxAddress,
    ) -> Result<WebmailInbox<'a>, SmokeError> {
        let inbox_url = direct_inbox_url(webmail_url, &address.local_part);
        info!("opening web inbox {inbox_url}");

        let tab_index = session.open_new_tab()?;
        session.navigate(&inbox_url)?;

        Ok(WebmailInbox {
            session,
            tab_index,
            closed: false,
        })
    }

    /// Close the inbox tab and return focus to the primary tab.
    pub fn close(mut self) -> Result<(), SmokeError> {
        self.close_tab()
    }

    fn close_tab(&mut self) -> Result<(), SmokeError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.session.switch_to_tab(self.tab_index)?;
        self.session.close_current_tab()
    }

    /// One non-blocking pass over the rendered inbox. Any render hiccup is
    /// "no message yet"; the poller decides whether to keep trying.
    async fn check_rendered_inbox(&mut self) -> Result<Option<InboxMessage>, SmokeError> {
        self.session.refresh()?;

        // Newest row first; an empty list means nothing has arrived.
        self.session.exit_to_top_frame();
        self.session
            .enter_frame_within(INBOX_FRAME_ID, ATTEMPT_WAIT)
            .await?;

        let row = Locator::css(MAIL_ROW_SELECTOR);
        if self
            .session
            .wait_until_visible_within(&row, ATTEMPT_WAIT)
            .await
            .is_err()
        {
            return Ok(None);
        }

        let identifier = self
            .session
            .inner_text(&row)?
            .map(|text| text.trim().to_string())
            .unwrap_or_default();
        self.session.click_robust(&row).await?;

        // The body renders in a sibling frame, reachable only from the top.
        self.session.exit_to_top_frame();
        self.session
            .enter_frame_within(MAIL_FRAME_ID, ATTEMPT_WAIT)
            .await?;

        let body = self.session.inner_text(&Locator::css("body"))?;
        self.session.exit_to_top_frame();

        match body {
            Some(raw_body) if !raw_body.trim().is_empty() => {
                debug!(identifier = %identifier, "read message body from mail frame");
                Ok(Some(InboxMessage {
                    identifier,
                    raw_body,
                }))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl<'a> MailboxClient for WebmailInbox<'a> {
    async fn check_inbox(&mut self) -> Result<Option<InboxMessage>, MailboxError> {
        match self.check_rendered_inbox().await {
            Ok(message) => Ok(message),
            // Frames and rows that have not rendered yet are the normal case
            // early in the poll window, not failures.
            Err(SmokeError::FrameUnavailable(frame)) => {
                debug!("frame {frame} not rendered yet");
                Ok(None)
            }
            Err(SmokeError::ElementNotFound { locator, .. }) => {
                debug!("{locator} not rendered yet");
                Ok(None)
            }
            Err(e) => Err(MailboxError::Transient(e.to_string())),
        }
    }
}

impl Drop for WebmailInbox<'_> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close_tab() {
                warn!("failed to close webmail tab: {e}");
            }
        }
    }
}

/// Login-by-URL address for the hosted inbox, e.g.
/// `https://yopmail.com/en/?login=glyph_qa_1700000000`.
fn direct_inbox_url(webmail_url: &str, local_part: &str) -> String {
    let base = webmail_url.trim_end_matches('/');
    format!("{base}/?login={local_part}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_url_appends_login_query() {
        assert_eq!(
            direct_inbox_url("https://yopmail.com/en/", "glyph_qa_1700000000"),
            "https://yopmail.com/en/?login=glyph_qa_1700000000"
        );
        assert_eq!(
            direct_inbox_url("https://yopmail.com/en", "glyph_qa_1700000000"),
            "https://yopmail.com/en/?login=glyph_qa_1700000000"
        );
    }
}
