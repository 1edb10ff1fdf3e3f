//! Notification boundary for benchmark reports.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable notification channels
//! - Webhook and log-only notifier implementations
//! - Minijinja template rendering of report notifications
//! - Dispatcher that fans a notification out to every channel

pub mod dispatcher;
pub mod log;
pub mod templating;
pub mod traits;
pub mod webhook;

pub use dispatcher::Dispatcher;
pub use log::LogNotifier;
pub use templating::{TemplateContext, TemplateRenderer};
pub use traits::{DispatchResult, Notification, Notifier, NotifyError};
pub use webhook::WebhookNotifier;
