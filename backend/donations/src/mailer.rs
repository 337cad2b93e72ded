//! Outbound email via a transactional-mail HTTP API.
//!
//! Every send is best-effort: workflow code dispatches through
//! [`Mailer::send_detached`] so a mail failure can never affect the
//! donation state transition it accompanies.

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;

#[derive(Debug, Clone)]
pub struct MailSettings {
    /// Base URL of the mail provider's send endpoint
    pub api_url: String,
    pub api_key: String,
    /// Sender address shown to recipients
    pub from: String,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    template_data: &'a Value,
}

#[derive(Clone)]
pub struct Mailer {
    client: Client,
    settings: Option<MailSettings>,
}

impl Mailer {
    pub fn new(client: Client, settings: Option<MailSettings>) -> Self {
        Self { client, settings }
    }

    /// A mailer with no provider configured; every send is a logged no-op.
    pub fn disabled() -> Self {
        Self {
            client: Client::new(),
            settings: None,
        }
    }

    /// Submit one message. Returns whether the provider queued it.
    pub async fn send(&self, to: &str, subject: &str, template_data: &Value) -> Result<bool> {
        let Some(settings) = &self.settings else {
            debug!("mail disabled, dropping '{subject}' to {to}");
            return Ok(false);
        };

        let response = self
            .client
            .post(&settings.api_url)
            .bearer_auth(&settings.api_key)
            .json(&SendRequest {
                from: &settings.from,
                to,
                subject,
                template_data,
            })
            .send()
            .await?;

        response.error_for_status()?;
        Ok(true)
    }

    /// Fire-and-forget send on a detached task. Failures are logged and
    /// never reach the caller.
    pub fn send_detached(&self, to: String, subject: String, template_data: Value) {
        let mailer = self.clone();
        tokio::spawn(async move {
            match mailer.send(&to, &subject, &template_data).await {
                Ok(true) => debug!("queued '{subject}' to {to}"),
                Ok(false) => {}
                Err(e) => warn!("failed to send '{subject}' to {to}: {e}"),
            }
        });
    }
}
