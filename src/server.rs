//! Connection supervisor for the host side
//!
//! The server accepts connections in its own task and gives each one a
//! dedicated worker task running the protocol loop. It keeps one
//! [`ConnectionEntry`] per live connection; a worker removes its own entry
//! when its loop ends, and [`Server::stop`] cancels whatever is left.

use futures::future::join_all;
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::{ConnectionError, SyncError};
use crate::logging::*;
use crate::net;
use crate::protocol::{serve_connection, HostContext};
use crate::transfer;
use crate::transport::{Framing, Transport};

/// Delay before accepting again after a failed accept
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Host bookkeeping for one live connection
#[derive(Debug)]
pub struct ConnectionEntry {
	pub address: SocketAddr,
	worker: Option<JoinHandle<()>>,
}

struct Shared {
	ctx: HostContext,
	running: AtomicBool,
	connections: Mutex<HashMap<u64, ConnectionEntry>>,
	next_id: AtomicU64,
	framing: Framing,
	poll: Duration,
	io_timeout: Option<Duration>,
}

impl Shared {
	fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<u64, ConnectionEntry>> {
		self.connections.lock().unwrap_or_else(|e| e.into_inner())
	}
}

/// A sync host bound to one listening endpoint
pub struct Server {
	shared: Arc<Shared>,
	address: SocketAddr,
	socket: Option<TcpSocket>,
	acceptor: Option<JoinHandle<()>>,
}

impl Server {
	/// Bind the listening endpoint.
	///
	/// Without a configured address the LAN address is discovered now, for
	/// this server only; if none is found every interface is bound.
	pub fn bind(config: &Config) -> Result<Server, SyncError> {
		config.validate()?;
		let ip = net::resolve_address(
			config.address.as_deref(),
			IpAddr::V4(Ipv4Addr::UNSPECIFIED),
		)?;
		let requested = SocketAddr::new(ip, config.port);

		std::fs::create_dir_all(&config.data_dir)?;

		let socket = match requested {
			SocketAddr::V4(_) => TcpSocket::new_v4(),
			SocketAddr::V6(_) => TcpSocket::new_v6(),
		}
		.map_err(socket_error)?;
		socket.set_reuseaddr(true).map_err(socket_error)?;
		socket.bind(requested).map_err(socket_error)?;
		let address = socket.local_addr().map_err(socket_error)?;
		info!("Host bound to {}", address);

		let shared = Arc::new(Shared {
			ctx: HostContext::new(
				config.data_dir.clone(),
				config.chunk_size,
				config.report_progress,
			),
			running: AtomicBool::new(false),
			connections: Mutex::new(HashMap::new()),
			next_id: AtomicU64::new(0),
			framing: config.framing,
			poll: config.read_timeout(),
			io_timeout: config.io_timeout(),
		});

		Ok(Server { shared, address, socket: Some(socket), acceptor: None })
	}

	/// Start listening and accepting connections in a background task
	pub async fn start(&mut self, max_backlog: u32) -> Result<(), SyncError> {
		let socket = self.socket.take().ok_or_else(|| SyncError::InvalidConfig {
			message: "server already started".into(),
		})?;

		match transfer::cleanup_temp_files(&self.shared.ctx.data_dir).await {
			Ok(0) => {}
			Ok(n) => info!("Cleaned up {} temporary files", n),
			Err(e) => warn!("Temp file cleanup failed: {}", e),
		}

		let listener = socket.listen(max_backlog).map_err(socket_error)?;
		self.shared.running.store(true, Ordering::SeqCst);
		self.acceptor = Some(tokio::spawn(accept_loop(listener, self.shared.clone())));
		info!("Host listening on {}", self.address);
		Ok(())
	}

	/// Stop the host.
	///
	/// Cancels every worker (closing its connection), then closes the
	/// listening endpoint, then releases the connection list. Safe to call
	/// more than once.
	pub async fn stop(&mut self) {
		self.shared.running.store(false, Ordering::SeqCst);

		let closed = self.cancel_workers().await;
		if let Some(acceptor) = self.acceptor.take() {
			acceptor.abort();
			let _ = acceptor.await;
		}
		// Connections accepted while the workers were being cancelled
		let late = self.cancel_workers().await;

		if closed + late > 0 {
			info!("Closed {} connections", closed + late);
		}
		info!("Host stopped");
	}

	async fn cancel_workers(&self) -> usize {
		let entries: Vec<ConnectionEntry> =
			self.shared.entries().drain().map(|(_, entry)| entry).collect();
		let count = entries.len();

		let workers: Vec<JoinHandle<()>> = entries
			.into_iter()
			.filter_map(|entry| {
				debug!("Closing connection to {}", entry.address);
				entry.worker
			})
			.collect();
		for worker in &workers {
			worker.abort();
		}
		join_all(workers).await;
		count
	}

	pub fn local_addr(&self) -> SocketAddr {
		self.address
	}

	pub fn is_running(&self) -> bool {
		self.shared.running.load(Ordering::SeqCst)
	}

	/// Number of live connections
	pub fn connection_count(&self) -> usize {
		self.shared.entries().len()
	}

	/// Addresses of the live connections
	pub fn peers(&self) -> Vec<SocketAddr> {
		self.shared.entries().values().map(|entry| entry.address).collect()
	}
}

impl Drop for Server {
	fn drop(&mut self) {
		self.shared.running.store(false, Ordering::SeqCst);
		if let Some(acceptor) = self.acceptor.take() {
			acceptor.abort();
		}
		for (_, entry) in self.shared.entries().drain() {
			if let Some(worker) = entry.worker {
				worker.abort();
			}
		}
	}
}

fn socket_error(e: io::Error) -> SyncError {
	SyncError::Connection(ConnectionError::from(e))
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
	while shared.running.load(Ordering::SeqCst) {
		let (stream, address) = match listener.accept().await {
			Ok(conn) => conn,
			Err(e) => {
				warn!("Accept failed: {}", e);
				tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
				continue;
			}
		};
		if !shared.running.load(Ordering::SeqCst) {
			break;
		}
		info!("Peer connected: {}", address);

		let id = shared.next_id.fetch_add(1, Ordering::SeqCst);
		shared.entries().insert(id, ConnectionEntry { address, worker: None });

		let worker = tokio::spawn(run_worker(shared.clone(), id, stream, address));
		if let Some(entry) = shared.entries().get_mut(&id) {
			entry.worker = Some(worker);
		}
	}
	debug!("Accept loop finished");
}

async fn run_worker(shared: Arc<Shared>, id: u64, stream: TcpStream, address: SocketAddr) {
	let mut transport = Transport::new(stream, shared.framing);
	if let Some(limit) = shared.io_timeout {
		transport = transport.with_io_timeout(limit);
	}

	let peer = address.to_string();
	if let Err(e) =
		serve_connection(transport, &shared.ctx, &shared.running, shared.poll, &peer).await
	{
		warn!("Connection to {} terminated: {}", peer, e);
	}

	shared.entries().remove(&id);
	info!("Peer {} removed", peer);
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;
	use tokio::io::AsyncReadExt;

	fn test_config(dir: &TempDir) -> Config {
		Config {
			address: Some("127.0.0.1".into()),
			port: 0,
			data_dir: dir.path().to_path_buf(),
			read_timeout_ms: 50,
			report_progress: false,
			..Config::default()
		}
	}

	async fn wait_for_count(server: &Server, expected: usize) {
		for _ in 0..100 {
			if server.connection_count() == expected {
				return;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		panic!("expected {} connections, have {}", expected, server.connection_count());
	}

	#[tokio::test]
	async fn test_start_and_stop() {
		let dir = TempDir::new().unwrap();
		let mut server = Server::bind(&test_config(&dir)).unwrap();
		assert_ne!(server.local_addr().port(), 0);
		assert!(!server.is_running());

		server.start(3).await.unwrap();
		assert!(server.is_running());
		assert!(server.start(3).await.is_err());

		server.stop().await;
		assert!(!server.is_running());
		server.stop().await;
	}

	#[tokio::test]
	async fn test_entries_follow_connections() {
		let dir = TempDir::new().unwrap();
		let mut server = Server::bind(&test_config(&dir)).unwrap();
		server.start(3).await.unwrap();

		let first = TcpStream::connect(server.local_addr()).await.unwrap();
		let second = TcpStream::connect(server.local_addr()).await.unwrap();
		wait_for_count(&server, 2).await;
		assert_eq!(server.peers().len(), 2);

		drop(first);
		wait_for_count(&server, 1).await;

		drop(second);
		wait_for_count(&server, 0).await;
		server.stop().await;
	}

	#[tokio::test]
	async fn test_stop_closes_live_connections() {
		let dir = TempDir::new().unwrap();
		let mut server = Server::bind(&test_config(&dir)).unwrap();
		server.start(3).await.unwrap();

		let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
		wait_for_count(&server, 1).await;

		tokio::time::timeout(Duration::from_secs(2), server.stop()).await.unwrap();
		assert_eq!(server.connection_count(), 0);

		let mut buf = [0u8; 16];
		let n = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
			.await
			.unwrap()
			.unwrap_or(0);
		assert_eq!(n, 0);

		assert!(TcpStream::connect(server.local_addr()).await.is_err());
	}

	#[tokio::test]
	async fn test_removes_orphaned_temp_files_on_start() {
		let dir = TempDir::new().unwrap();
		let tmp = transfer::temp_path(&dir.path().join("a.txt"));
		std::fs::write(&tmp, b"partial").unwrap();

		let mut server = Server::bind(&test_config(&dir)).unwrap();
		server.start(3).await.unwrap();
		assert!(!tmp.exists());
		server.stop().await;
	}
}

// vim: ts=4
