//! Append-only capture stream
//!
//! The transport invokes [`ResponseListener::on_response`] from whatever
//! thread delivers the response; the driving sequence reads the log between
//! its own await points. Entries are never removed or reordered except by
//! [`CaptureStream::clear`].

use crate::record::{ApiCallRecord, ObservedResponse};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receives responses from a transport
pub trait ResponseListener: Send + Sync {
    /// Called once per response, possibly from a foreign thread
    fn on_response(&self, response: ObservedResponse);
}

/// Transport that delivers responses to subscribed listeners
pub trait ResponseFeed: Send + Sync {
    /// Attach a listener for the rest of the session
    fn subscribe(&self, listener: Arc<dyn ResponseListener>);
}

#[derive(Debug, Default)]
struct CallLog {
    /// Bumped by every `clear`, so windows opened before it go stale
    epoch: u64,
    calls: Vec<ApiCallRecord>,
}

/// Thread-safe, append-only log of captured data calls
#[derive(Debug, Default)]
pub struct CaptureStream {
    log: RwLock<CallLog>,
    monitoring: AtomicBool,
}

impl CaptureStream {
    /// Create empty stream
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe this stream to `feed`
    ///
    /// Returns `false` if the stream was already monitoring, in which case
    /// nothing is subscribed a second time.
    pub fn start_monitoring(self: &Arc<Self>, feed: &dyn ResponseFeed) -> bool {
        if self.monitoring.swap(true, Ordering::SeqCst) {
            return false;
        }
        let listener: Arc<dyn ResponseListener> = Arc::clone(self) as Arc<dyn ResponseListener>;
        feed.subscribe(listener);
        tracing::debug!("Response capture attached");
        true
    }

    /// Whether `start_monitoring` has been called
    #[inline]
    #[must_use]
    pub fn is_monitoring(&self) -> bool {
        self.monitoring.load(Ordering::SeqCst)
    }

    /// Record a response if it is a data call
    ///
    /// Returns the index of the appended record. Failed calls are logged as
    /// they arrive; recording never fails.
    pub fn record(&self, response: ObservedResponse) -> Option<usize> {
        if !response.is_data_call() {
            return None;
        }

        let record = ApiCallRecord::from_response(response);
        if record.is_failure() {
            tracing::warn!(
                method = %record.method,
                url = %record.url,
                status = record.status,
                "Captured failed call"
            );
        }

        let mut log = self.log.write();
        log.calls.push(record);
        Some(log.calls.len() - 1)
    }

    /// Number of captured calls
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.log.read().calls.len()
    }

    /// Whether nothing has been captured
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log.read().calls.is_empty()
    }

    /// All captured calls in arrival order
    #[must_use]
    pub fn calls(&self) -> Vec<ApiCallRecord> {
        self.log.read().calls.clone()
    }

    /// Calls appended at or after `index`
    #[must_use]
    pub fn calls_since(&self, index: usize) -> Vec<ApiCallRecord> {
        let log = self.log.read();
        log.calls.get(index..).map(<[_]>::to_vec).unwrap_or_default()
    }

    /// Calls with status >= 400, in arrival order
    #[must_use]
    pub fn failed_calls(&self) -> Vec<ApiCallRecord> {
        self.log
            .read()
            .calls
            .iter()
            .filter(|c| c.is_failure())
            .cloned()
            .collect()
    }

    /// Empty the log
    ///
    /// Meant for use between independent scenarios. Windows opened before
    /// the clear yield no calls afterwards.
    pub fn clear(&self) {
        let mut log = self.log.write();
        log.calls.clear();
        log.epoch += 1;
    }

    /// Snapshot the current position for a submission window
    #[must_use]
    pub fn window(&self) -> CaptureWindow {
        let log = self.log.read();
        CaptureWindow {
            start: log.calls.len(),
            epoch: log.epoch,
        }
    }
}

impl ResponseListener for CaptureStream {
    fn on_response(&self, response: ObservedResponse) {
        self.record(response);
    }
}

/// Position in a [`CaptureStream`] marking the start of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureWindow {
    start: usize,
    epoch: u64,
}

impl CaptureWindow {
    /// Index of the first call belonging to this window
    #[inline]
    #[must_use]
    pub fn start(&self) -> usize {
        self.start
    }

    /// Calls captured since the window was opened
    #[must_use]
    pub fn calls(&self, stream: &CaptureStream) -> Vec<ApiCallRecord> {
        let log = stream.log.read();
        if log.epoch != self.epoch {
            return Vec::new();
        }
        log.calls.get(self.start..).map(<[_]>::to_vec).unwrap_or_default()
    }
}
