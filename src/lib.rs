pub mod config;
pub mod events;
pub mod models;
pub mod session;
pub mod sync;
pub mod wire;

// Re-export main types for convenience
pub use config::{ChatOrder, Settings, SyncConfig};
pub use events::{Command, Event, Outbound};
pub use models::*;
pub use sync::{Reconciler, StateChange};
