//! Service layer for the intercom broker.
//!
//! # Components
//!
//! - `orchestrator` - conference, endpoint and session flows over the
//!   bridge, negotiation and directory

pub mod orchestrator;

pub use orchestrator::{Negotiated, Orchestrator, SessionOffer};
