//! Background tasks for the intercom service.
//!
//! # Tasks
//!
//! - `session_sweeper` - Session liveness recomputation and expiry
//! - `bridge_status` - Logs bridge endpoints with failed transports

pub mod bridge_status;
pub mod session_sweeper;

pub use bridge_status::start_bridge_status_poller;
pub use session_sweeper::start_session_sweeper;
