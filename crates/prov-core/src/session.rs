//! Provisioning session
//!
//! A [`Session`] owns the UI driver and the response capture of one
//! console session. Provisioning operations borrow it; nothing else holds
//! session-scoped state.

use crate::driver::UiDriver;
use crate::types::SessionId;
use prov_capture::{CaptureStream, ResponseFeed};
use std::sync::Arc;

/// Driver and capture stream of one console session
#[derive(Clone)]
pub struct Session {
    id: SessionId,
    driver: Arc<dyn UiDriver>,
    capture: Arc<CaptureStream>,
}

impl Session {
    /// Create session with a fresh, unattached capture stream
    #[must_use]
    pub fn new(driver: Arc<dyn UiDriver>) -> Self {
        Self::with_capture(driver, Arc::new(CaptureStream::new()))
    }

    /// Create session over an existing capture stream
    #[must_use]
    pub fn with_capture(driver: Arc<dyn UiDriver>, capture: Arc<CaptureStream>) -> Self {
        Self {
            id: SessionId::new(),
            driver,
            capture,
        }
    }

    /// Create session and start capturing `feed`
    #[must_use]
    pub fn attach(driver: Arc<dyn UiDriver>, feed: &dyn ResponseFeed) -> Self {
        let session = Self::new(driver);
        session.capture.start_monitoring(feed);
        tracing::info!("Session {} attached", session.id);
        session
    }

    /// Session id
    #[inline]
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// UI driver
    #[inline]
    #[must_use]
    pub fn driver(&self) -> &dyn UiDriver {
        self.driver.as_ref()
    }

    /// Captured calls
    #[inline]
    #[must_use]
    pub fn capture(&self) -> &CaptureStream {
        &self.capture
    }

    /// Drop captured calls between independent scenarios
    pub fn reset_capture(&self) {
        tracing::debug!("Session {}: clearing {} captured call(s)", self.id, self.capture.len());
        self.capture.clear();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("captured", &self.capture.len())
            .field("monitoring", &self.capture.is_monitoring())
            .finish_non_exhaustive()
    }
}
