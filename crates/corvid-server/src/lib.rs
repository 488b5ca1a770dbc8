//! # Corvid Server
//!
//! TCP front end for the Corvid messaging server.
//!
//! This crate provides:
//! - TOML configuration with validation
//! - A tokio accept loop with one task per connection
//! - A registry routing stanzas between bound sessions
//! - Outbound dialback verification over TCP

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod connector;
pub mod registry;
pub mod server;

pub use config::Config;
pub use connector::TcpConnector;
pub use registry::SessionRegistry;
pub use server::StreamServer;
