//! Result ingestion: completed runs flow from the dispatcher through analysis
//! to the notifier.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use velo_analysis::{analyze, render_diff, DimensionRegistry, SignificanceFactors};
use velo_core::config::AnalysisConfig;
use velo_core::Run;
use velo_dispatch::{ResultSink, RunHistory};
use velo_notify::{Dispatcher as NotifyDispatcher, Notification, TemplateContext, TemplateRenderer};
use velo_wire::ReportedDimension;

/// A run handed over by the dispatcher, with the dimension metadata its
/// runner reported.
#[derive(Debug)]
pub struct CompletedRun {
    pub run: Run,
    pub dimensions: Vec<ReportedDimension>,
}

/// Forwards completed runs to the ingestion task.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<CompletedRun>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CompletedRun>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ResultSink for ChannelSink {
    fn submit(&self, run: Run, dimensions: Vec<ReportedDimension>) {
        let run_id = run.id;
        if self.tx.send(CompletedRun { run, dimensions }).is_err() {
            warn!(run_id = %run_id, "result pipeline closed, dropping run");
        }
    }
}

/// Owns everything needed to turn a run into a notification.
pub struct ResultPipeline {
    history: Arc<dyn RunHistory>,
    registry: DimensionRegistry,
    factors: SignificanceFactors,
    renderer: TemplateRenderer,
}

impl ResultPipeline {
    pub fn new(history: Arc<dyn RunHistory>, analysis: &AnalysisConfig, renderer: TemplateRenderer) -> Self {
        Self {
            history,
            registry: DimensionRegistry::with_insignificant(&analysis.insignificant_dimensions),
            factors: SignificanceFactors::from(analysis),
            renderer,
        }
    }

    /// Record one run and build its notification, if it is worth one.
    pub fn ingest(&mut self, completed: CompletedRun) -> Option<Notification> {
        let CompletedRun { run, dimensions } = completed;
        for reported in dimensions {
            self.registry
                .merge_reported(reported.dimension, reported.unit, reported.interpretation);
        }

        let previous = self.history.previous_run(&run);
        self.history.record(run.clone());

        let report = analyze(&run, previous.as_ref(), &self.registry, &self.factors);
        info!(
            run_id = %run.id,
            source = %run.source,
            runner = %run.runner_name,
            failed = run.is_failed(),
            rows = report.rows.len(),
            "run ingested"
        );

        if !report.is_noteworthy() {
            debug!(run_id = %run.id, "nothing flagged, no notification");
            return None;
        }

        let ctx = TemplateContext::new(&run, &report, render_diff(&report));
        match self.renderer.notification(&ctx) {
            Ok(notification) => Some(notification),
            Err(e) => {
                warn!(run_id = %run.id, error = %e, "failed to render notification");
                None
            }
        }
    }

    /// Consume runs until every sink is gone.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<CompletedRun>, notifier: NotifyDispatcher) {
        while let Some(completed) = rx.recv().await {
            if let Some(notification) = self.ingest(completed) {
                notifier.dispatch(&notification).await;
            }
        }
        debug!("result pipeline stopped");
    }
}
