//! Generic HTTP webhook notifier.
//!
//! Delivers notifications as JSON payloads (`subject`, `body`, `metadata`)
//! to a configured URL.

use std::time::Duration;

use crate::traits::{Notification, Notifier, NotifyError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts notifications as JSON to a configured endpoint.
///
/// `${VAR_NAME}` references in the URL are resolved from the environment
/// at construction time, so secrets embedded in webhook paths can stay out
/// of the config file.
#[derive(Debug)]
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Result<Self, NotifyError> {
        let url = resolve_env_vars(url)?;
        let parsed = reqwest::Url::parse(&url)
            .map_err(|e| NotifyError::Config(format!("invalid webhook url: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(NotifyError::Config(format!(
                "unsupported webhook scheme: {}",
                parsed.scheme()
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { url, client })
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let body = serde_json::to_string(notification)
            .map_err(|e| NotifyError::Config(format!("failed to serialize notification: {e}")))?;

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::warn!(%status, body = %body, "webhook returned non-2xx status");
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(%status, "webhook notification delivered");
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "webhook"
    }
}

/// Replace every `${NAME}` with the value of environment variable `NAME`.
fn resolve_env_vars(input: &str) -> Result<String, NotifyError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            NotifyError::Config(format!("unclosed env var reference in: {input}"))
        })?;
        let name = &after[..end];
        let value = std::env::var(name)
            .map_err(|_| NotifyError::Config(format!("env var not found: {name}")))?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);

    Ok(out)
}
