//! Live socket connections: per-connection handle, the process pool and
//! heartbeat supervision.

pub mod handle;
pub mod heartbeat;
pub mod pool;

pub use handle::ConnectionHandle;
pub use heartbeat::{HeartbeatConfig, HeartbeatExit, run_heartbeat};
pub use pool::ConnectionPool;
