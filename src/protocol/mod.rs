//! Sync protocol message layer
//!
//! Four requests travel from a peer to the host over the same stream that
//! later carries raw file bytes:
//!
//! ```text
//! SYNC_REQUEST:<name>        -> {"exists":..,"size":..,"modified":..,"hash":..}
//! GET_FILE:<name>            -> FILE_SIZE:<n>, <- READY, -> <n raw bytes>
//! SEND_FILE:<name>:<size>    -> READY, <- <size raw bytes>, -> FILE_RECEIVED
//! anything else              -> UNKNOWN_COMMAND
//! ```

pub mod command;
pub mod handler;

pub use command::{Request, Response};
pub use handler::{handle_message, serve_connection, HostContext};

// vim: ts=4
