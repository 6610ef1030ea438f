// Session lifecycle: abandonment timers and completion markers.

pub mod monitor;
pub mod registry;

pub use monitor::{RoomMonitor, SESSION_TIMEOUT};
