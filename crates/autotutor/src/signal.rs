//! Per-run cancellation context.

use tokio_util::sync::CancellationToken;

/// Cooperative control flags for one run, shared by the store and every unit
/// of work the pool launches.
///
/// Two levels: *admission* closes on pause or stop and keeps new rows from
/// starting; *stop* closes only on stop and additionally discards results of
/// requests that were already in flight. The admission token is a child of the
/// stop token, so stopping always closes admission too.
#[derive(Debug, Clone)]
pub struct RunSignal {
    stop: CancellationToken,
    admission: CancellationToken,
}

impl RunSignal {
    pub fn new() -> Self {
        let stop = CancellationToken::new();
        let admission = stop.child_token();
        Self { stop, admission }
    }

    /// Whether new rows may still start.
    pub fn is_admitting(&self) -> bool {
        !self.admission.is_cancelled()
    }

    /// Whether the run was stopped (not merely paused).
    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Close admission. In-flight results still commit.
    pub fn pause(&self) {
        self.admission.cancel();
    }

    /// Close admission and discard in-flight results.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Resolves once admission closes.
    pub async fn closed(&self) {
        self.admission.cancelled().await;
    }
}

impl Default for RunSignal {
    fn default() -> Self {
        Self::new()
    }
}
