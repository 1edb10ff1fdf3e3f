//! Minijinja template rendering for report notifications.
//!
//! Templates see the finished run, a summary of its report and the
//! rendered diff block. Templates are arbitrary strings supplied by
//! configuration, so a fresh [`minijinja::Environment`] is built per call.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;

use velo_analysis::{Marker, Report, RowKind};
use velo_core::{Run, TaskSource};

use crate::traits::{Notification, NotifyError};

/// Subject line used for every report notification.
pub const DEFAULT_SUBJECT: &str =
    "[velo] {{ run.source }}: {{ report.flagged }} flagged, {{ report.failed }} failed";

/// Body used when no template is configured.
pub const DEFAULT_BODY: &str = "{{ run.source }} benchmarked on {{ run.runner }} for {{ run.author }} \
in {{ run.duration_secs | round(1) }}s.
{% if report.run_error %}The run failed: {{ report.run_error }}
{% endif %}
{{ diff }}";

/// Context data available to notification templates.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateContext {
    pub run: RunContext,
    pub report: ReportContext,
    /// The rendered diff block.
    pub diff: String,
    /// Current timestamp in RFC 3339 format.
    pub now: String,
}

/// Run metadata exposed to templates.
#[derive(Debug, Clone, Serialize)]
pub struct RunContext {
    pub id: String,
    pub author: String,
    pub runner: String,
    /// Human-readable source, `repo@commit` or the tar description.
    pub source: String,
    pub repo_id: Option<String>,
    pub commit_hash: Option<String>,
    pub duration_secs: f64,
}

/// Report counters exposed to templates.
#[derive(Debug, Clone, Serialize)]
pub struct ReportContext {
    pub flagged: usize,
    pub improvements: usize,
    pub regressions: usize,
    pub failed: usize,
    pub run_error: Option<String>,
}

impl TemplateContext {
    pub fn new(run: &Run, report: &Report, diff: impl Into<String>) -> Self {
        let commit_hash = match &run.source {
            TaskSource::Commit { commit_hash, .. } => Some(commit_hash.clone()),
            TaskSource::Tar { .. } => None,
        };
        let duration_ms = (run.stop_time - run.start_time).num_milliseconds().max(0);

        let marker_count = |wanted: Marker| {
            report
                .rows
                .iter()
                .filter(|r| matches!(&r.kind, RowKind::Changed { marker, .. } if *marker == wanted))
                .count()
        };
        let improvements = marker_count(Marker::Improvement);
        let regressions = marker_count(Marker::Regression);

        Self {
            run: RunContext {
                id: run.id.to_string(),
                author: run.author.clone(),
                runner: run.runner_name.clone(),
                source: run.source.to_string(),
                repo_id: run.source.repo_id().map(|id| id.to_string()),
                commit_hash,
                duration_secs: duration_ms as f64 / 1000.0,
            },
            report: ReportContext {
                flagged: improvements + regressions,
                improvements,
                regressions,
                failed: report.failed().count(),
                run_error: report.run_error.clone(),
            },
            diff: diff.into(),
            now: Utc::now().to_rfc3339(),
        }
    }
}

/// Renders notification templates using minijinja.
#[derive(Debug, Default)]
pub struct TemplateRenderer {
    body_template: Option<String>,
}

impl TemplateRenderer {
    /// Renderer using [`DEFAULT_BODY`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Renderer using a custom body template. The template is parsed up front.
    pub fn with_body_template(template: impl Into<String>) -> Result<Self, NotifyError> {
        let template = template.into();
        validate(&template)?;
        Ok(Self {
            body_template: Some(template),
        })
    }

    /// Render a template string with the given context.
    pub fn render(&self, template: &str, ctx: &TemplateContext) -> Result<String, NotifyError> {
        build_env()
            .render_str(template, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Build the notification for one analysed run.
    pub fn notification(&self, ctx: &TemplateContext) -> Result<Notification, NotifyError> {
        let body_template = self.body_template.as_deref().unwrap_or(DEFAULT_BODY);
        let subject = self.render(DEFAULT_SUBJECT, ctx)?;
        let body = self.render(body_template, ctx)?;

        let mut metadata = BTreeMap::new();
        metadata.insert("run_id".to_string(), ctx.run.id.clone());
        metadata.insert("source".to_string(), ctx.run.source.clone());
        metadata.insert("author".to_string(), ctx.run.author.clone());
        if let Some(repo_id) = &ctx.run.repo_id {
            metadata.insert("repo_id".to_string(), repo_id.clone());
        }

        Ok(Notification {
            subject,
            body,
            metadata,
        })
    }
}

/// Check that a template string parses, without evaluating it.
pub fn validate(template: &str) -> Result<(), NotifyError> {
    build_env()
        .template_from_str(template)
        .map(|_| ())
        .map_err(|e| NotifyError::Template(e.to_string()))
}

fn build_env() -> minijinja::Environment<'static> {
    let mut env = minijinja::Environment::new();
    env.add_filter("round", round_filter);
    env.add_function("env", env_function);
    env
}

/// Round a float to N decimal places (default 0).
fn round_filter(value: f64, decimals: Option<u32>) -> String {
    format!("{:.*}", decimals.unwrap_or(0) as usize, value)
}

/// Read an environment variable, or an empty string if unset.
fn env_function(name: String) -> String {
    std::env::var(&name).unwrap_or_else(|_| {
        tracing::warn!(var = %name, "template references unset environment variable");
        String::new()
    })
}
