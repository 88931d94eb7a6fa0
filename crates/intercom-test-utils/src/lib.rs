//! # Intercom Test Utilities
//!
//! Shared test utilities for the intercom service.
//!
//! - `fixtures` - SDP offers/answers and bridge JSON payloads
//! - `mock_bridge` - wiremock-backed media bridge speaking the control protocol
//! - `server_harness` - `TestIntercomServer` for end-to-end HTTP tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use intercom_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let bridge = Arc::new(MockBridge::new());
//!     let server = TestIntercomServer::spawn(bridge).await?;
//!
//!     let response = reqwest::get(format!("{}/health", server.url())).await?;
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod mock_bridge;
pub mod server_harness;

// Re-export commonly used items
pub use fixtures::*;
pub use intercom_service::bridge::mock::MockBridge;
pub use mock_bridge::*;
pub use server_harness::*;
