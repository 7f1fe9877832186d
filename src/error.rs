//! Error types for lansync operations
//!
//! Errors are grouped by how far they are allowed to travel: a
//! [`ConnectionError`] ends the affected connection, a [`ProtocolError`] is
//! reported back to the peer and the connection stays open, a
//! [`TransferError`] turns the current sync into a failure.

use std::error::Error;
use std::fmt;
use std::io;

/// Main error type for sync operations
#[derive(Debug)]
pub enum SyncError {
	/// Transport level failure (nested)
	Connection(ConnectionError),

	/// Malformed or unexpected message (nested)
	Protocol(ProtocolError),

	/// File bytes did not arrive intact (nested)
	Transfer(TransferError),

	/// Local filesystem failure (missing file, permission denied, ...)
	Filesystem(io::Error),

	/// The other side reported an error
	Remote { message: String },

	/// Invalid configuration
	InvalidConfig { message: String },
}

impl SyncError {
	/// Whether the error leaves the underlying stream in an unusable state.
	///
	/// A failed transfer always desynchronizes the stream: the payload was
	/// announced by size and the other side keeps counting bytes.
	pub fn is_transport(&self) -> bool {
		matches!(self, SyncError::Connection(_) | SyncError::Transfer(_))
	}
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::Connection(e) => write!(f, "Connection error: {}", e),
			SyncError::Protocol(e) => write!(f, "Protocol error: {}", e),
			SyncError::Transfer(e) => write!(f, "Transfer error: {}", e),
			SyncError::Filesystem(e) => write!(f, "Filesystem error: {}", e),
			SyncError::Remote { message } => write!(f, "Remote error: {}", message),
			SyncError::InvalidConfig { message } => {
				write!(f, "Invalid configuration: {}", message)
			}
		}
	}
}

impl Error for SyncError {}

impl From<io::Error> for SyncError {
	fn from(e: io::Error) -> Self {
		SyncError::Filesystem(e)
	}
}

impl From<ConnectionError> for SyncError {
	fn from(e: ConnectionError) -> Self {
		SyncError::Connection(e)
	}
}

impl From<ProtocolError> for SyncError {
	fn from(e: ProtocolError) -> Self {
		SyncError::Protocol(e)
	}
}

impl From<TransferError> for SyncError {
	fn from(e: TransferError) -> Self {
		SyncError::Transfer(e)
	}
}

/// Transport errors on a single connection
#[derive(Debug)]
pub enum ConnectionError {
	/// Socket I/O failed (reset, broken pipe, ...)
	Io(io::Error),

	/// Peer closed the stream while a reply was expected
	Disconnected,

	/// No data within the configured I/O timeout
	Timeout,

	/// Operation requires an established connection
	NotConnected,

	/// Bytes that cannot be decoded into any message
	InvalidMessage { message: String },
}

impl fmt::Display for ConnectionError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConnectionError::Io(e) => write!(f, "I/O error: {}", e),
			ConnectionError::Disconnected => write!(f, "Connection disconnected"),
			ConnectionError::Timeout => write!(f, "Connection timeout"),
			ConnectionError::NotConnected => write!(f, "Not connected"),
			ConnectionError::InvalidMessage { message } => {
				write!(f, "Invalid message: {}", message)
			}
		}
	}
}

impl Error for ConnectionError {}

impl From<io::Error> for ConnectionError {
	fn from(e: io::Error) -> Self {
		match e.kind() {
			io::ErrorKind::UnexpectedEof => ConnectionError::Disconnected,
			io::ErrorKind::TimedOut => ConnectionError::Timeout,
			_ => ConnectionError::Io(e),
		}
	}
}

impl From<tokio::time::error::Elapsed> for ConnectionError {
	fn from(_: tokio::time::error::Elapsed) -> Self {
		ConnectionError::Timeout
	}
}

/// Protocol errors, reported to the peer without closing the connection
#[derive(Debug)]
pub enum ProtocolError {
	/// Message does not start with any known tag
	UnknownCommand { command: String },

	/// Known tag but unusable argument list
	MalformedArguments { command: String, message: String },

	/// Filename is not a bare file name
	InvalidFilename { name: String },

	/// Reply does not match the exchange in progress
	UnexpectedReply { expected: String, got: String },

	/// Sync reply could not be (de)serialized
	Json(String),
}

impl fmt::Display for ProtocolError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ProtocolError::UnknownCommand { command } => write!(f, "Unknown command: {}", command),
			ProtocolError::MalformedArguments { command, message } => {
				write!(f, "Malformed {} arguments: {}", command, message)
			}
			ProtocolError::InvalidFilename { name } => write!(f, "Invalid filename: {:?}", name),
			ProtocolError::UnexpectedReply { expected, got } => {
				write!(f, "Expected {}, got {:?}", expected, got)
			}
			ProtocolError::Json(msg) => write!(f, "JSON error: {}", msg),
		}
	}
}

impl Error for ProtocolError {}

impl From<serde_json::Error> for ProtocolError {
	fn from(e: serde_json::Error) -> Self {
		ProtocolError::Json(e.to_string())
	}
}

/// File transfer integrity errors
#[derive(Debug)]
pub enum TransferError {
	/// Stream ended before the declared size was received
	Truncated { expected: u64, received: u64 },

	/// Source file yielded fewer bytes than were announced
	SourceShrunk { expected: u64, sent: u64 },

	/// Reading or writing the local file failed
	Io(io::Error),

	/// Writing to or reading from the stream failed
	Connection(ConnectionError),
}

impl fmt::Display for TransferError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TransferError::Truncated { expected, received } => {
				write!(f, "Incomplete transfer: received {} of {} bytes", received, expected)
			}
			TransferError::SourceShrunk { expected, sent } => {
				write!(f, "Source file shrank: sent {} of {} bytes", sent, expected)
			}
			TransferError::Io(e) => write!(f, "File I/O error: {}", e),
			TransferError::Connection(e) => write!(f, "{}", e),
		}
	}
}

impl Error for TransferError {}

impl From<io::Error> for TransferError {
	fn from(e: io::Error) -> Self {
		TransferError::Io(e)
	}
}

impl From<ConnectionError> for TransferError {
	fn from(e: ConnectionError) -> Self {
		TransferError::Connection(e)
	}
}


// vim: ts=4
