//! # surfsync Server
//!
//! RPC server hosting the surfsync stores.
//!
//! This crate provides:
//! - [`ServerConfig`] and the [`ServiceRole`] a process plays
//! - [`RequestHandler`], dispatching decoded requests onto the stores
//! - [`SurfServer`] and [`serve`], an async TCP listener speaking
//!   length-prefixed CBOR frames
//!
//! # Roles
//!
//! A process hosts the metadata service, the block service, or both. A
//! request addressed to a service the process does not host is answered
//! with [`surfsync_protocol::ErrorCode::WrongService`].
//!
//! # Example
//!
//! ```rust,ignore
//! use surfsync_server::{ServerConfig, ServiceRole, SurfServer};
//!
//! let config = ServerConfig::new("127.0.0.1:8081".parse()?).with_role(ServiceRole::Both);
//! SurfServer::new(config).run().await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod server;

pub use config::{ServerConfig, ServiceRole};
pub use error::{ServerError, ServerResult};
pub use handler::RequestHandler;
pub use server::{serve, SurfServer};
