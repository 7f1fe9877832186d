//! Text commands and replies of the sync protocol
//!
//! Requests have the form `TAG:arg1:arg2...`; replies are either bare
//! keywords (`READY`) or `TAG:value` pairs (`FILE_SIZE:42`). A sync query
//! is answered with JSON instead, see [`crate::types::SyncReply`].

use crate::error::ProtocolError;
use crate::types::{SyncQuery, TransferHeader};

pub const SYNC_REQUEST: &str = "SYNC_REQUEST";
pub const GET_FILE: &str = "GET_FILE";
pub const SEND_FILE: &str = "SEND_FILE";

pub const READY: &str = "READY";
pub const FILE_RECEIVED: &str = "FILE_RECEIVED";
pub const FILE_NOT_FOUND: &str = "FILE_NOT_FOUND";
pub const UNKNOWN_COMMAND: &str = "UNKNOWN_COMMAND";
pub const FILE_SIZE: &str = "FILE_SIZE";
pub const ERROR: &str = "ERROR";

/// A request sent by a peer to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
	/// `SYNC_REQUEST:<filename>`
	SyncRequest(SyncQuery),
	/// `GET_FILE:<filename>`
	GetFile { filename: String },
	/// `SEND_FILE:<filename>:<size>`
	SendFile(TransferHeader),
	/// Anything without a known tag
	Unknown(String),
}

impl Request {
	/// Parse one message.
	///
	/// Unrecognized text yields [`Request::Unknown`]; a known tag with an
	/// unusable argument list is a [`ProtocolError`].
	pub fn parse(message: &str) -> Result<Request, ProtocolError> {
		let message = message.trim_end_matches(&['\r', '\n'][..]);
		let (tag, rest) = match message.split_once(':') {
			Some(parts) => parts,
			None => return Ok(Request::Unknown(message.to_string())),
		};

		match tag {
			SYNC_REQUEST => {
				Ok(Request::SyncRequest(SyncQuery { filename: rest.to_string() }))
			}
			GET_FILE => Ok(Request::GetFile { filename: rest.to_string() }),
			SEND_FILE => {
				let (filename, size) =
					rest.rsplit_once(':').ok_or_else(|| ProtocolError::MalformedArguments {
						command: SEND_FILE.to_string(),
						message: "expected <filename>:<size>".to_string(),
					})?;
				let size = size.trim().parse::<u64>().map_err(|e| {
					ProtocolError::MalformedArguments {
						command: SEND_FILE.to_string(),
						message: format!("invalid size {:?}: {}", size, e),
					}
				})?;
				Ok(Request::SendFile(TransferHeader { filename: filename.to_string(), size }))
			}
			_ => Ok(Request::Unknown(message.to_string())),
		}
	}

	pub fn encode(&self) -> String {
		match self {
			Request::SyncRequest(query) => format!("{}:{}", SYNC_REQUEST, query.filename),
			Request::GetFile { filename } => format!("{}:{}", GET_FILE, filename),
			Request::SendFile(header) => {
				format!("{}:{}:{}", SEND_FILE, header.filename, header.size)
			}
			Request::Unknown(text) => text.clone(),
		}
	}
}

/// A keyword reply from the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
	Ready,
	FileReceived,
	FileNotFound,
	UnknownCommand,
	FileSize(u64),
	Error(String),
	/// Text that is none of the above
	Other(String),
}

impl Response {
	pub fn parse(message: &str) -> Response {
		let message = message.trim_end_matches(&['\r', '\n'][..]);
		match message {
			READY => return Response::Ready,
			FILE_RECEIVED => return Response::FileReceived,
			FILE_NOT_FOUND => return Response::FileNotFound,
			UNKNOWN_COMMAND => return Response::UnknownCommand,
			_ => {}
		}
		match message.split_once(':') {
			Some((FILE_SIZE, size)) => match size.trim().parse::<u64>() {
				Ok(n) => Response::FileSize(n),
				Err(_) => Response::Other(message.to_string()),
			},
			Some((ERROR, text)) => Response::Error(text.to_string()),
			_ => Response::Other(message.to_string()),
		}
	}

	pub fn encode(&self) -> String {
		match self {
			Response::Ready => READY.to_string(),
			Response::FileReceived => FILE_RECEIVED.to_string(),
			Response::FileNotFound => FILE_NOT_FOUND.to_string(),
			Response::UnknownCommand => UNKNOWN_COMMAND.to_string(),
			Response::FileSize(n) => format!("{}:{}", FILE_SIZE, n),
			Response::Error(text) => format!("{}:{}", ERROR, text),
			Response::Other(text) => text.clone(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_requests() {
		assert_eq!(
			Request::parse("SYNC_REQUEST:a.txt").unwrap(),
			Request::SyncRequest(SyncQuery { filename: "a.txt".into() })
		);
		assert_eq!(
			Request::parse("GET_FILE:report.pdf").unwrap(),
			Request::GetFile { filename: "report.pdf".into() }
		);
		assert_eq!(
			Request::parse("SEND_FILE:a.txt:10").unwrap(),
			Request::SendFile(TransferHeader { filename: "a.txt".into(), size: 10 })
		);
	}

	#[test]
	fn test_filename_keeps_inner_colons() {
		assert_eq!(
			Request::parse("GET_FILE:a:b").unwrap(),
			Request::GetFile { filename: "a:b".into() }
		);
		assert_eq!(
			Request::parse("SEND_FILE:a:b:7").unwrap(),
			Request::SendFile(TransferHeader { filename: "a:b".into(), size: 7 })
		);
	}

	#[test]
	fn test_unknown_requests() {
		assert_eq!(Request::parse("HELLO").unwrap(), Request::Unknown("HELLO".into()));
		assert_eq!(Request::parse("DELETE:x").unwrap(), Request::Unknown("DELETE:x".into()));
		assert_eq!(Request::parse("").unwrap(), Request::Unknown(String::new()));
		// Tags are matched exactly, prefix included
		assert_eq!(
			Request::parse("SYNC_REQUEST").unwrap(),
			Request::Unknown("SYNC_REQUEST".into())
		);
	}

	#[test]
	fn test_malformed_send_file() {
		assert!(matches!(
			Request::parse("SEND_FILE:a.txt"),
			Err(ProtocolError::MalformedArguments { .. })
		));
		assert!(matches!(
			Request::parse("SEND_FILE:a.txt:ten"),
			Err(ProtocolError::MalformedArguments { .. })
		));
	}

	#[test]
	fn test_request_encoding() {
		let header = TransferHeader { filename: "a.txt".into(), size: 10 };
		assert_eq!(Request::SendFile(header).encode(), "SEND_FILE:a.txt:10");
		assert_eq!(Request::GetFile { filename: "x".into() }.encode(), "GET_FILE:x");
	}

	#[test]
	fn test_parse_responses() {
		assert_eq!(Response::parse("READY"), Response::Ready);
		assert_eq!(Response::parse("FILE_RECEIVED"), Response::FileReceived);
		assert_eq!(Response::parse("FILE_NOT_FOUND"), Response::FileNotFound);
		assert_eq!(Response::parse("UNKNOWN_COMMAND"), Response::UnknownCommand);
		assert_eq!(Response::parse("FILE_SIZE:42"), Response::FileSize(42));
		assert_eq!(Response::parse("ERROR:disk: full"), Response::Error("disk: full".into()));
		assert_eq!(Response::parse("FILE_SIZE:x"), Response::Other("FILE_SIZE:x".into()));
		assert_eq!(Response::Error("boom".into()).encode(), "ERROR:boom");
	}
}

// vim: ts=4
