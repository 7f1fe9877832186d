//! Byte stream transport shared by command messages and raw file payloads
//!
//! Both directions of a connection carry two kinds of traffic: short text
//! commands (`SYNC_REQUEST:...`, `READY`, ...) and raw file bytes whose length
//! was agreed on beforehand. The transport knows how to delimit the former
//! according to the configured [`Framing`] and never interprets the latter.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::ConnectionError;

/// Largest command message accepted in a single read
pub const MAX_COMMAND_LEN: usize = 1024;

/// Upper bound on a length-prefixed message
pub const MAX_FRAMED_LEN: u32 = 64 * 1024;

/// How command messages are delimited on the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Framing {
	/// One read equals one message, no delimiter (wire compatible with
	/// unmodified peers)
	#[default]
	Compat,
	/// Big-endian `u32` length followed by the message bytes
	LengthPrefixed,
}

impl std::str::FromStr for Framing {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"compat" => Ok(Framing::Compat),
			"length-prefixed" | "framed" => Ok(Framing::LengthPrefixed),
			other => Err(format!("Unknown framing mode: {}", other)),
		}
	}
}

/// A bidirectional ordered byte stream with message and payload primitives
pub struct Transport<S> {
	stream: BufReader<S>,
	framing: Framing,
	io_timeout: Option<Duration>,
}

impl<S> Transport<S>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	pub fn new(stream: S, framing: Framing) -> Self {
		Self { stream: BufReader::new(stream), framing, io_timeout: None }
	}

	/// Bound every reply wait (`READY`, `FILE_SIZE`, ...) by `timeout`
	pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
		self.io_timeout = Some(timeout);
		self
	}

	pub fn framing(&self) -> Framing {
		self.framing
	}

	pub fn get_ref(&self) -> &S {
		self.stream.get_ref()
	}

	/// Wait until at least one byte is buffered.
	///
	/// Returns `false` when the peer closed its write side. Cancel safe: no
	/// bytes are consumed, so it can be raced against a poll timeout.
	pub async fn wait_readable(&mut self) -> Result<bool, ConnectionError> {
		let buf = self.stream.fill_buf().await?;
		Ok(!buf.is_empty())
	}

	/// Read the next command message, `None` on a clean end of stream
	pub async fn read_message(&mut self) -> Result<Option<String>, ConnectionError> {
		let bytes = match self.framing {
			Framing::Compat => {
				let buf = self.stream.fill_buf().await?;
				if buf.is_empty() {
					return Ok(None);
				}
				let n = buf.len().min(MAX_COMMAND_LEN);
				let bytes = buf[..n].to_vec();
				self.stream.consume(n);
				bytes
			}
			Framing::LengthPrefixed => {
				if !self.wait_readable().await? {
					return Ok(None);
				}
				let len = self.stream.read_u32().await?;
				if len > MAX_FRAMED_LEN {
					return Err(ConnectionError::InvalidMessage {
						message: format!("frame of {} bytes exceeds {}", len, MAX_FRAMED_LEN),
					});
				}
				let mut bytes = vec![0; len as usize];
				self.stream.read_exact(&mut bytes).await?;
				bytes
			}
		};

		String::from_utf8(bytes).map(Some).map_err(|e| ConnectionError::InvalidMessage {
			message: format!("not valid UTF-8: {}", e),
		})
	}

	/// Read a reply the protocol requires; end of stream is an error here
	pub async fn expect_message(&mut self) -> Result<String, ConnectionError> {
		let reply = match self.io_timeout {
			Some(limit) => tokio::time::timeout(limit, self.read_message()).await??,
			None => self.read_message().await?,
		};
		reply.ok_or(ConnectionError::Disconnected)
	}

	/// Send one command message and flush it
	pub async fn write_message(&mut self, message: &str) -> Result<(), ConnectionError> {
		let stream = self.stream.get_mut();
		if self.framing == Framing::LengthPrefixed {
			stream.write_u32(message.len() as u32).await?;
		}
		stream.write_all(message.as_bytes()).await?;
		stream.flush().await?;
		Ok(())
	}

	/// Read up to `buf.len()` raw payload bytes; `0` means end of stream
	pub async fn read_payload(&mut self, buf: &mut [u8]) -> Result<usize, ConnectionError> {
		let n = match self.io_timeout {
			Some(limit) => tokio::time::timeout(limit, self.stream.read(buf)).await??,
			None => self.stream.read(buf).await?,
		};
		Ok(n)
	}

	/// Write raw payload bytes
	pub async fn write_payload(&mut self, data: &[u8]) -> Result<(), ConnectionError> {
		let stream = self.stream.get_mut();
		stream.write_all(data).await?;
		Ok(())
	}

	pub async fn flush(&mut self) -> Result<(), ConnectionError> {
		self.stream.get_mut().flush().await?;
		Ok(())
	}

	/// Close our write side; the peer sees end of stream
	pub async fn shutdown(&mut self) -> Result<(), ConnectionError> {
		self.stream.get_mut().shutdown().await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_compat_message_exchange() {
		let (a, b) = tokio::io::duplex(4096);
		let mut left = Transport::new(a, Framing::Compat);
		let mut right = Transport::new(b, Framing::Compat);

		left.write_message("SYNC_REQUEST:a.txt").await.unwrap();
		assert_eq!(right.read_message().await.unwrap().as_deref(), Some("SYNC_REQUEST:a.txt"));

		right.write_message("READY").await.unwrap();
		assert_eq!(left.expect_message().await.unwrap(), "READY");
	}

	#[tokio::test]
	async fn test_length_prefixed_keeps_coalesced_messages_apart() {
		let (a, b) = tokio::io::duplex(4096);
		let mut left = Transport::new(a, Framing::LengthPrefixed);
		let mut right = Transport::new(b, Framing::LengthPrefixed);

		left.write_message("GET_FILE:x").await.unwrap();
		left.write_message("READY").await.unwrap();

		assert_eq!(right.read_message().await.unwrap().as_deref(), Some("GET_FILE:x"));
		assert_eq!(right.read_message().await.unwrap().as_deref(), Some("READY"));
	}

	#[tokio::test]
	async fn test_end_of_stream() {
		let (a, b) = tokio::io::duplex(64);
		let mut right = Transport::new(b, Framing::Compat);
		drop(a);

		assert!(!right.wait_readable().await.unwrap());
		assert!(right.read_message().await.unwrap().is_none());
		assert!(matches!(right.expect_message().await, Err(ConnectionError::Disconnected)));
	}

	#[tokio::test]
	async fn test_invalid_utf8_is_rejected() {
		let (mut a, b) = tokio::io::duplex(64);
		let mut right = Transport::new(b, Framing::Compat);
		a.write_all(&[0xff, 0xfe, 0x00]).await.unwrap();

		assert!(matches!(
			right.read_message().await,
			Err(ConnectionError::InvalidMessage { .. })
		));
	}

	#[tokio::test]
	async fn test_io_timeout() {
		let (_a, b) = tokio::io::duplex(64);
		let mut right =
			Transport::new(b, Framing::Compat).with_io_timeout(Duration::from_millis(20));

		assert!(matches!(right.expect_message().await, Err(ConnectionError::Timeout)));
	}

	#[test]
	fn test_framing_from_str() {
		assert_eq!("compat".parse::<Framing>().unwrap(), Framing::Compat);
		assert_eq!("length-prefixed".parse::<Framing>().unwrap(), Framing::LengthPrefixed);
		assert!("bogus".parse::<Framing>().is_err());
	}
}

// vim: ts=4
