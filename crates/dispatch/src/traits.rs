use velo_core::Run;
use velo_wire::{CloseCode, ReportedDimension};

/// Outbound half of one runner's socket.
///
/// Implementations must not block: sends are queued to the socket writer.
pub trait RunnerLink: Send + Sync + 'static {
    /// Queue a websocket ping. `false` if the socket is gone.
    fn send_ping(&self) -> bool;

    /// Queue one encoded envelope. `false` if the socket is gone.
    fn send_text(&self, text: String) -> bool;

    /// Close the socket with the given code.
    fn close(&self, code: CloseCode, reason: &str);
}

/// Receives completed runs for ingestion and analysis.
pub trait ResultSink: Send + Sync + 'static {
    fn submit(&self, run: Run, dimensions: Vec<ReportedDimension>);
}
