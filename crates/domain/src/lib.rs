pub mod container_payload;
pub mod entities;
pub mod ports;
pub mod repositories;

pub use container_payload::*;
pub use entities::*;
pub use fleet_sync_core::{SyncError, SyncResult};
pub use ports::*;
pub use repositories::*;
