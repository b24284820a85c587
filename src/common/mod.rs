//! # Common Components
//!
//! Shared data structures and utilities used across the client.
//!
//! ## Modules
//!
//! - [`messages`]: Wire types for the discovery protocol
//! - [`connection`]: TCP connection abstraction with message framing
//! - [`config`]: Configuration structures and TOML loading
//! - [`error`]: Typed failures of discovery calls

pub mod config;
pub mod connection;
pub mod error;
pub mod messages;
