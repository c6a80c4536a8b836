use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::MailboxError;
use crate::mailbox::{InboxMessage, MailboxAddress, MailboxClient};

/// REST mailbox strategy: one GET to list message summaries, a second GET to
/// read the newest message body.
pub struct ApiInbox {
    address: MailboxAddress,
    api_url: String,
    http_client: reqwest::Client,
}

impl ApiInbox {
    pub fn new(api_url: &str, address: MailboxAddress) -> Result<Self, MailboxError> {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| MailboxError::Unrecoverable(format!("http client: {e}")))?;

        Ok(Self {
            address,
            api_url: api_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    fn list_url(&self) -> String {
        format!(
            "{}/?action=getMessages&login={}&domain={}",
            self.api_url, self.address.local_part, self.address.domain
        )
    }

    fn read_url(&self, id: i64) -> String {
        format!(
            "{}/?action=readMessage&login={}&domain={}&id={}",
            self.api_url, self.address.local_part, self.address.domain, id
        )
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, MailboxError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| MailboxError::Transient(format!("request failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            // Credential-level rejection; polling again will not fix it.
            return Err(MailboxError::Unrecoverable(format!("mail API rejected request: HTTP {status}")));
        }
        if !status.is_success() {
            return Err(MailboxError::Transient(format!("mail API returned HTTP {status}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| MailboxError::Transient(format!("malformed response: {e}")))
    }
}

#[async_trait]
impl MailboxClient for ApiInbox {
    async fn check_inbox(&mut self) -> Result<Option<InboxMessage>, MailboxError> {
        let summaries: Vec<MessageSummary> = self.get_json(&self.list_url()).await?;
        debug!(count = summaries.len(), "listed inbox for {}", self.address);

        let Some(summary) = summaries.into_iter().next() else {
            return Ok(None);
        };

        let message: FullMessage = self.get_json(&self.read_url(summary.id)).await?;
        let raw_body = message.text_body.or(message.body).unwrap_or_default();

        info!(id = summary.id, from = %summary.from, "fetched message body");
        Ok(Some(InboxMessage {
            identifier: summary.id.to_string(),
            raw_body,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct MessageSummary {
    id: i64,
    from: String,
    #[allow(dead_code)]
    subject: String,
}

#[derive(Debug, Deserialize)]
struct FullMessage {
    body: Option<String>,
    #[serde(rename = "textBody")]
    text_body: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inbox() -> ApiInbox {
        let address = MailboxAddress::new("glyph_qa_1700000000".into(), "example.test".into());
        ApiInbox::new("https://api.example.test/v1/", address).unwrap()
    }

    #[test]
    fn endpoint_urls_carry_address_parts() {
        let inbox = inbox();
        assert_eq!(
            inbox.list_url(),
            "https://api.example.test/v1/?action=getMessages&login=glyph_qa_1700000000&domain=example.test"
        );
        assert_eq!(
            inbox.read_url(42),
            "https://api.example.test/v1/?action=readMessage&login=glyph_qa_1700000000&domain=example.test&id=42"
        );
    }

    #[test]
    fn summary_and_body_deserialize() {
        let summaries: Vec<MessageSummary> =
            serde_json::from_str(r#"[{"id": 7, "from": "no-reply@glyph.network", "subject": "Your code"}]"#)
                .unwrap();
        assert_eq!(summaries[0].id, 7);

        let message: FullMessage =
            serde_json::from_str(r#"{"body": "<p>482193</p>", "textBody": "Your code is: 482193"}"#).unwrap();
        assert_eq!(message.text_body.as_deref(), Some("Your code is: 482193"));
    }
}
