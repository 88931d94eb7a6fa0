//! Intercom Service Library
//!
//! Session broker for an audio intercom system. It sits between WebRTC
//! clients and a media bridge: it allocates bridge conferences and endpoints
//! per production line, translates between SDP and the bridge's structured
//! endpoint descriptions, and tracks session liveness.
//!
//! # Modules
//!
//! - `bridge` - Media bridge control protocol client
//! - `sdp` - SDP parsing and serialization
//! - `negotiation` - SDP to endpoint description translation
//! - `directory` - Productions, lines and user sessions
//! - `serializer` - Single-lane execution of line conference allocation
//! - `services` - Orchestration of the above per HTTP operation
//! - `handlers` / `routes` - HTTP surface
//! - `tasks` - Background session sweep and bridge status polling

pub mod bridge;
pub mod config;
pub mod directory;
pub mod errors;
pub mod handlers;
pub mod negotiation;
pub mod observability;
pub mod routes;
pub mod sdp;
pub mod serializer;
pub mod services;
pub mod tasks;
