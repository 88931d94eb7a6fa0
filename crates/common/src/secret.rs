//! Secret wrapper for credentials that must never reach the logs.
//!
//! The only credential the broker holds is the media bridge API key. It is
//! loaded from the environment into a [`SecretString`], carried inside the
//! bridge client, and exposed exactly once per request when the
//! `Authorization: Bearer` header is built.
//!
//! `SecretString` redacts itself in `Debug`, so any struct deriving `Debug`
//! (configs, clients) stays safe to log with `{:?}` or tracing fields.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct BridgeCredentials {
//!     base_url: String,
//!     api_key: SecretString,
//! }
//!
//! let creds = BridgeCredentials {
//!     base_url: "http://bridge:8080/conferences/".to_string(),
//!     api_key: SecretString::from("bridge-key"),
//! };
//!
//! assert!(!format!("{creds:?}").contains("bridge-key"));
//! let header = format!("Bearer {}", creds.api_key.expose_secret());
//! assert_eq!(header, "Bearer bridge-key");
//! ```

pub use secrecy::{ExposeSecret, SecretString};

/// Returns true when an optional key is present and non-empty.
///
/// Bridges running without authentication are configured with an empty key;
/// in that case no `Authorization` header is sent at all.
#[must_use]
pub fn is_configured(key: Option<&SecretString>) -> bool {
    key.is_some_and(|k| !k.expose_secret().is_empty())
}
