//! Server-side visitor records.
//!
//! # OWNERSHIP INVARIANT
//! The registry is the only writer of `VisitorIdentity`. The ingestion path
//! may create a record and refresh its bookkeeping, but `access_status` is
//! written exclusively by `set_access_status`, i.e. by an operator.

pub mod policy;
pub mod store;
pub mod types;

pub use policy::{decide, AccessDecision, Transition};
pub use store::{RegistryError, VisitorRegistry};
pub use types::{AccessStatus, StatusUpdate, TrackingEvent, VisitorDetail, VisitorIdentity};
