pub mod client;
pub mod config;
pub mod console;
pub mod logging;
pub mod registry;
pub mod server;
pub mod time;

// Re-export the pieces most callers wire together
pub use client::emitter::EventEmitter;
pub use client::identity::IdentityResolver;
pub use registry::{AccessStatus, VisitorRegistry};
