//! # lansync - keep named files in sync across a LAN
//!
//! One machine runs a host, the others connect as peers. For every file a
//! peer asks the host for its size, modification time and content hash, and
//! whichever side holds the stale copy receives the other one. Equal hashes
//! mean nothing is transferred.
//!
//! ## Host
//!
//! ```rust,ignore
//! use lansync::{Config, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(None)?;
//!     let mut server = Server::bind(&config)?;
//!     server.start(config.max_backlog).await?;
//!     tokio::signal::ctrl_c().await?;
//!     server.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Peer
//!
//! ```rust,ignore
//! use lansync::{Config, PeerSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config { address: Some("192.168.1.10".into()), ..Config::default() };
//!     let mut session = PeerSession::new(&config)?;
//!     if session.connect().await {
//!         session.sync_file("notes.txt").await;
//!         session.disconnect().await;
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod decision;
pub mod error;
pub mod hasher;
pub mod locks;
pub mod logging;
pub mod net;
pub mod progress;
pub mod protocol;
pub mod server;
pub mod transfer;
pub mod transport;
pub mod types;

// Re-export commonly used types and functions
pub use client::{PeerSession, SyncOutcome};
pub use config::Config;
pub use decision::{decide, SyncDecision};
pub use error::{ConnectionError, ProtocolError, SyncError, TransferError};
pub use server::Server;
pub use transport::Framing;
pub use types::{FileRecord, SyncReply, TransferHeader};

// vim: ts=4
