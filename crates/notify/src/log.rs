use crate::traits::{Notification, Notifier, NotifyError};

/// Writes notifications to the log. Used when no webhook is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            subject = %notification.subject,
            "benchmark report\n{}",
            notification.body
        );
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "log"
    }
}
