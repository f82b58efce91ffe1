//! Response capture for console sessions
//!
//! Passively records every data call the console makes while a session is
//! being driven, so that write outcomes can be judged from what the server
//! actually answered rather than from what the page rendered.
//!
//! # Core Concepts
//!
//! - [`ObservedResponse`]: raw response as delivered by the transport
//! - [`ApiCallRecord`]: immutable record of one captured data call
//! - [`CaptureStream`]: append-only, thread-safe log of records
//! - [`CaptureWindow`]: snapshot used to isolate the calls of one submission
//!
//! # Example
//!
//! ```rust,ignore
//! use prov_capture::{CaptureStream, ObservedResponse, ResourceKind};
//! use std::sync::Arc;
//!
//! let stream = Arc::new(CaptureStream::new());
//! stream.start_monitoring(&transport);
//!
//! let window = stream.window();
//! // ... submit a form ...
//! let calls = window.calls(&stream);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod record;
mod stream;

pub use record::{ApiCallRecord, ObservedResponse, ResourceKind};
pub use stream::{CaptureStream, CaptureWindow, ResponseFeed, ResponseListener};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
