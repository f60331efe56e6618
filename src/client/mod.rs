//! Browser-side half of the pipeline: who the visitor is, what device they
//! are on, and best-effort delivery of their events.
//!
//! Nothing in this module returns an error to the caller. Identity failure
//! yields a fallback id, encoding failure an empty blob, transport failure a
//! log line.

pub mod context;
pub mod emitter;
pub mod identity;
pub mod navigation;

pub use context::{ContextSnapshot, PlatformContextProvider, StaticContextProvider, SystemContextProvider};
pub use emitter::{Delivery, EventEmitter, TrackingPayload};
pub use identity::{DeviceFingerprint, FingerprintSource, IdentityResolver};
pub use navigation::NavigationObserver;
