//! Hand-written collaborator mocks shared by unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use velo_core::Run;
use velo_wire::{CloseCode, ReportedDimension, RunnerBound};

use crate::traits::{ResultSink, RunnerLink};

/// Records everything sent to a runner.
#[derive(Default)]
pub struct RecordingLink {
    sent: Mutex<Vec<String>>,
    pub pings: AtomicUsize,
    closed: Mutex<Option<(CloseCode, String)>>,
    dead: AtomicBool,
}

impl RecordingLink {
    pub fn messages(&self) -> Vec<RunnerBound> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|text| RunnerBound::from_wire(text).unwrap())
            .collect()
    }

    pub fn closed_with(&self) -> Option<CloseCode> {
        self.closed.lock().unwrap().as_ref().map(|(code, _)| *code)
    }

    /// Make every further send fail, as if the socket dropped.
    pub fn kill(&self) {
        self.dead.store(true, Ordering::SeqCst);
    }
}

impl RunnerLink for RecordingLink {
    fn send_ping(&self) -> bool {
        if self.dead.load(Ordering::SeqCst) {
            return false;
        }
        self.pings.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn send_text(&self, text: String) -> bool {
        if self.dead.load(Ordering::SeqCst) {
            return false;
        }
        self.sent.lock().unwrap().push(text);
        true
    }

    fn close(&self, code: CloseCode, reason: &str) {
        *self.closed.lock().unwrap() = Some((code, reason.to_string()));
        self.kill();
    }
}

/// Collects submitted runs.
#[derive(Default)]
pub struct RecordingSink {
    runs: Mutex<Vec<(Run, Vec<ReportedDimension>)>>,
}

impl RecordingSink {
    pub fn runs(&self) -> Vec<Run> {
        self.runs.lock().unwrap().iter().map(|(run, _)| run.clone()).collect()
    }
}

impl ResultSink for RecordingSink {
    fn submit(&self, run: Run, dimensions: Vec<ReportedDimension>) {
        self.runs.lock().unwrap().push((run, dimensions));
    }
}
