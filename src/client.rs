//! Peer side of the sync protocol
//!
//! A [`PeerSession`] holds one connection to the host. Each sync asks the host
//! for its copy of the file, compares it with the local one and then pushes,
//! pulls or does nothing.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::net::TcpStream;

use crate::config::Config;
use crate::decision::{decide, SyncDecision};
use crate::error::{ConnectionError, ProtocolError, SyncError};
use crate::logging::*;
use crate::net;
use crate::progress;
use crate::protocol::{Request, Response};
use crate::transfer;
use crate::transport::Transport;
use crate::types::{self, FileRecord, SyncQuery, SyncReply, TransferHeader};

/// What a successful sync did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
	/// The file exists on neither side
	NothingToSync,
	/// Both copies have the same content
	AlreadyInSync,
	/// The local copy was uploaded to the host
	Pushed { bytes: u64 },
	/// The host copy was downloaded
	Pulled { bytes: u64 },
}

impl SyncOutcome {
	/// Whether the sync counts as a success for callers that only want a
	/// yes/no answer
	pub fn is_success(&self) -> bool {
		!matches!(self, SyncOutcome::NothingToSync)
	}
}

/// One peer's connection to a host
pub struct PeerSession {
	address: SocketAddr,
	config: Config,
	transport: Option<Transport<TcpStream>>,
}

impl PeerSession {
	/// Create a session for the host in `config`.
	///
	/// Without a configured address the LAN address of this machine is
	/// discovered now, falling back to localhost.
	pub fn new(config: &Config) -> Result<PeerSession, SyncError> {
		let ip = net::resolve_address(config.address.as_deref(), IpAddr::V4(Ipv4Addr::LOCALHOST))?;
		PeerSession::with_address(config, SocketAddr::new(ip, config.port))
	}

	/// Create a session for an explicit host address
	pub fn with_address(config: &Config, address: SocketAddr) -> Result<PeerSession, SyncError> {
		config.validate()?;
		std::fs::create_dir_all(&config.data_dir)?;
		Ok(PeerSession { address, config: config.clone(), transport: None })
	}

	pub fn host_address(&self) -> SocketAddr {
		self.address
	}

	pub fn is_connected(&self) -> bool {
		self.transport.is_some()
	}

	/// Connect to the host. Failures are logged, never returned.
	pub async fn connect(&mut self) -> bool {
		if self.transport.is_some() {
			return true;
		}

		let attempt = TcpStream::connect(self.address);
		let result = match self.config.io_timeout() {
			Some(limit) => match tokio::time::timeout(limit, attempt).await {
				Ok(r) => r.map_err(ConnectionError::from),
				Err(_) => Err(ConnectionError::Timeout),
			},
			None => attempt.await.map_err(ConnectionError::from),
		};

		match result {
			Ok(stream) => {
				let _ = stream.set_nodelay(true);
				let mut transport = Transport::new(stream, self.config.framing);
				if let Some(limit) = self.config.io_timeout() {
					transport = transport.with_io_timeout(limit);
				}
				self.transport = Some(transport);
				info!("Connected to host {}", self.address);
				true
			}
			Err(e) => {
				warn!("Cannot connect to host {}: {}", self.address, e);
				false
			}
		}
	}

	/// Close the connection; does nothing when not connected
	pub async fn disconnect(&mut self) {
		if let Some(mut transport) = self.transport.take() {
			let _ = transport.shutdown().await;
			info!("Disconnected from host {}", self.address);
		}
	}

	/// Sync one file, reporting only success or failure.
	///
	/// `true` when both copies match afterwards, `false` when the file exists
	/// on neither side, the host reported an error or anything failed.
	pub async fn sync_file(&mut self, name: &str) -> bool {
		match self.try_sync_file(name).await {
			Ok(SyncOutcome::NothingToSync) => {
				warn!("File {} exists neither locally nor on the host", name);
				false
			}
			Ok(outcome) => {
				debug!("Sync of {} finished: {:?}", name, outcome);
				true
			}
			Err(e) => {
				error!("Sync of {} failed: {}", name, e);
				false
			}
		}
	}

	/// Sync one file and report what was done
	pub async fn try_sync_file(&mut self, name: &str) -> Result<SyncOutcome, SyncError> {
		types::resolve_path(&self.config.data_dir, name)?;

		let remote = self.query(name).await?;
		let local = FileRecord::load(&self.config.data_dir, name).await?;

		match decide(local.as_ref(), &remote) {
			SyncDecision::NothingToSync => Ok(SyncOutcome::NothingToSync),
			SyncDecision::InSync => {
				info!("File {} is already in sync", name);
				Ok(SyncOutcome::AlreadyInSync)
			}
			SyncDecision::Push => {
				info!("Local copy of {} is newer, sending it to the host", name);
				let bytes = self.push_file(name).await?;
				Ok(SyncOutcome::Pushed { bytes })
			}
			SyncDecision::Pull => {
				info!("Host copy of {} is newer, fetching it", name);
				let bytes = self.pull_file(name).await?;
				Ok(SyncOutcome::Pulled { bytes })
			}
			SyncDecision::Abort(message) => Err(SyncError::Remote { message }),
		}
	}

	/// Ask the host for its copy of `name`
	pub async fn query(&mut self, name: &str) -> Result<SyncReply, SyncError> {
		let request = Request::SyncRequest(SyncQuery { filename: name.to_string() });
		let reply = self.request(&request.encode()).await?;
		Ok(SyncReply::decode(name, &reply)?)
	}

	/// Upload the local copy of `name`; returns the bytes sent
	pub async fn push_file(&mut self, name: &str) -> Result<u64, SyncError> {
		let path = types::resolve_path(&self.config.data_dir, name)?;
		let file = tokio::fs::File::open(&path).await?;
		let size = file.metadata().await?.len();
		let header = TransferHeader { filename: name.to_string(), size };

		let reply = self.request(&Request::SendFile(header.clone()).encode()).await?;
		match Response::parse(&reply) {
			Response::Ready => {}
			Response::Error(message) => return Err(SyncError::Remote { message }),
			_ => return Err(unexpected("READY", reply)),
		}

		let chunk_size = self.config.chunk_size;
		let report = progress::reporter(self.config.report_progress);
		let transport = self.transport.as_mut().ok_or(ConnectionError::NotConnected)?;
		let sent = transfer::send_file(transport, file, &header, chunk_size, report).await;
		let sent = self.check(sent.map_err(SyncError::from))?;

		let ack = self.receive().await?;
		match Response::parse(&ack) {
			Response::FileReceived => {
				info!("Sent {} to host ({} bytes)", name, sent);
				Ok(sent)
			}
			Response::Error(message) => Err(SyncError::Remote { message }),
			_ => Err(unexpected("FILE_RECEIVED", ack)),
		}
	}

	/// Download the host copy of `name`; returns the bytes received
	pub async fn pull_file(&mut self, name: &str) -> Result<u64, SyncError> {
		let path = types::resolve_path(&self.config.data_dir, name)?;

		let request = Request::GetFile { filename: name.to_string() };
		let reply = self.request(&request.encode()).await?;
		let size = match Response::parse(&reply) {
			Response::FileSize(size) => size,
			Response::FileNotFound => {
				return Err(SyncError::Remote { message: format!("{} not found on host", name) })
			}
			Response::Error(message) => return Err(SyncError::Remote { message }),
			_ => return Err(unexpected("FILE_SIZE", reply)),
		};

		self.send(&Response::Ready.encode()).await?;

		let header = TransferHeader { filename: name.to_string(), size };
		let chunk_size = self.config.chunk_size;
		let report = progress::reporter(self.config.report_progress);
		let transport = self.transport.as_mut().ok_or(ConnectionError::NotConnected)?;
		let received = transfer::receive_file(transport, &path, &header, chunk_size, report).await;
		let received = self.check(received.map_err(SyncError::from))?;

		info!("Received {} from host ({} bytes)", name, received);
		Ok(received)
	}

	/// Send one raw command and return the host's reply
	pub async fn request(&mut self, message: &str) -> Result<String, SyncError> {
		self.send(message).await?;
		self.receive().await
	}

	async fn send(&mut self, message: &str) -> Result<(), SyncError> {
		let transport = self.transport.as_mut().ok_or(ConnectionError::NotConnected)?;
		debug!("Sending {}", message);
		let result = transport.write_message(message).await.map_err(SyncError::from);
		self.check(result)
	}

	async fn receive(&mut self) -> Result<String, SyncError> {
		let transport = self.transport.as_mut().ok_or(ConnectionError::NotConnected)?;
		let result = transport.expect_message().await.map_err(SyncError::from);
		let reply = self.check(result)?;
		debug!("Host replied {}", reply);
		Ok(reply)
	}

	/// Drop the connection after an error that left the stream unusable
	fn check<T>(&mut self, result: Result<T, SyncError>) -> Result<T, SyncError> {
		if let Err(e) = &result {
			if e.is_transport() && self.transport.take().is_some() {
				warn!("Connection to host {} lost: {}", self.address, e);
			}
		}
		result
	}
}

fn unexpected(expected: &str, got: String) -> SyncError {
	ProtocolError::UnexpectedReply { expected: expected.to_string(), got }.into()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::server::Server;
	use tempfile::TempDir;

	fn config(dir: &TempDir) -> Config {
		Config {
			address: Some("127.0.0.1".into()),
			port: 0,
			data_dir: dir.path().to_path_buf(),
			read_timeout_ms: 50,
			io_timeout_ms: 5000,
			report_progress: false,
			..Config::default()
		}
	}

	async fn start_host(dir: &TempDir) -> Server {
		let mut server = Server::bind(&config(dir)).unwrap();
		server.start(3).await.unwrap();
		server
	}

	#[tokio::test]
	async fn test_not_connected() {
		let dir = TempDir::new().unwrap();
		let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
		let mut session = PeerSession::with_address(&config(&dir), addr).unwrap();

		assert!(!session.is_connected());
		assert!(!session.sync_file("a.txt").await);
		assert!(matches!(
			session.query("a.txt").await,
			Err(SyncError::Connection(ConnectionError::NotConnected))
		));
		session.disconnect().await;
	}

	#[tokio::test]
	async fn test_connect_failure_returns_false() {
		let dir = TempDir::new().unwrap();
		let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
		let addr = listener.local_addr().unwrap();
		drop(listener);

		let mut session = PeerSession::with_address(&config(&dir), addr).unwrap();
		assert!(!session.connect().await);
		assert!(!session.is_connected());
	}

	#[tokio::test]
	async fn test_push_then_pull() {
		let host_dir = TempDir::new().unwrap();
		let peer_dir = TempDir::new().unwrap();
		let mut server = start_host(&host_dir).await;

		std::fs::write(peer_dir.path().join("notes.txt"), b"from the peer").unwrap();
		let mut session =
			PeerSession::with_address(&config(&peer_dir), server.local_addr()).unwrap();
		assert!(session.connect().await);

		assert_eq!(session.push_file("notes.txt").await.unwrap(), 13);
		assert_eq!(std::fs::read(host_dir.path().join("notes.txt")).unwrap(), b"from the peer");

		std::fs::remove_file(peer_dir.path().join("notes.txt")).unwrap();
		assert_eq!(session.pull_file("notes.txt").await.unwrap(), 13);
		assert_eq!(std::fs::read(peer_dir.path().join("notes.txt")).unwrap(), b"from the peer");

		session.disconnect().await;
		session.disconnect().await;
		server.stop().await;
	}

	#[tokio::test]
	async fn test_pull_missing_file_is_remote_error() {
		let host_dir = TempDir::new().unwrap();
		let peer_dir = TempDir::new().unwrap();
		let mut server = start_host(&host_dir).await;

		let mut session =
			PeerSession::with_address(&config(&peer_dir), server.local_addr()).unwrap();
		assert!(session.connect().await);
		assert!(matches!(session.pull_file("ghost.bin").await, Err(SyncError::Remote { .. })));
		assert!(session.is_connected());

		session.disconnect().await;
		server.stop().await;
	}

	#[tokio::test]
	async fn test_raw_request() {
		let host_dir = TempDir::new().unwrap();
		let peer_dir = TempDir::new().unwrap();
		let mut server = start_host(&host_dir).await;

		let mut session =
			PeerSession::with_address(&config(&peer_dir), server.local_addr()).unwrap();
		assert!(session.connect().await);
		assert_eq!(session.request("PING").await.unwrap(), "UNKNOWN_COMMAND");

		session.disconnect().await;
		server.stop().await;
	}

	#[test]
	fn test_outcome_success() {
		assert!(!SyncOutcome::NothingToSync.is_success());
		assert!(SyncOutcome::AlreadyInSync.is_success());
		assert!(SyncOutcome::Pushed { bytes: 1 }.is_success());
	}
}

// vim: ts=4
