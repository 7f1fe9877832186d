//! Host side of the sync protocol
//!
//! [`serve_connection`] owns one connection for its whole life: it reads one
//! message at a time, dispatches it and answers. Request failures are
//! reported to the peer as `ERROR:<message>` and the loop goes on; only
//! transport failures end it.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::fs as afs;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use super::command::{Request, Response};
use crate::error::{ProtocolError, SyncError};
use crate::locks::FileLocks;
use crate::progress;
use crate::transfer;
use crate::transport::Transport;
use crate::types::{self, FileRecord, SyncQuery, SyncReply, TransferHeader};

/// State shared by every connection of one host
#[derive(Debug)]
pub struct HostContext {
	pub data_dir: PathBuf,
	pub chunk_size: usize,
	pub report_progress: bool,
	pub locks: FileLocks,
}

impl HostContext {
	pub fn new(data_dir: PathBuf, chunk_size: usize, report_progress: bool) -> Self {
		Self { data_dir, chunk_size, report_progress, locks: FileLocks::new() }
	}
}

/// Run the message loop for one connection until the peer leaves, a
/// transport error occurs or `running` is cleared.
///
/// `poll` bounds how long the loop waits for the next message before
/// re-checking `running`.
pub async fn serve_connection<S>(
	mut transport: Transport<S>,
	ctx: &HostContext,
	running: &AtomicBool,
	poll: Duration,
	peer: &str,
) -> Result<(), SyncError>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	loop {
		if !running.load(Ordering::SeqCst) {
			debug!("Closing connection to {}: host stopping", peer);
			break;
		}

		match tokio::time::timeout(poll, transport.wait_readable()).await {
			Err(_) => continue,
			Ok(Ok(true)) => {}
			Ok(Ok(false)) => {
				info!("Peer {} disconnected", peer);
				break;
			}
			Ok(Err(e)) => return Err(e.into()),
		}

		let message = match transport.read_message().await? {
			Some(m) => m,
			None => break,
		};
		debug!("Command from {}: {}", peer, message);

		if let Err(e) = handle_message(&mut transport, ctx, &message).await {
			if e.is_transport() {
				// The peer may be counting payload bytes; nothing else goes on the stream
				return Err(e);
			}
			warn!("Request {:?} from {} failed: {}", message, peer, e);
			transport.write_message(&error_reply(&e).encode()).await?;
		}
	}

	let _ = transport.shutdown().await;
	Ok(())
}

/// Reply sent for a request that failed without breaking the stream
fn error_reply(e: &SyncError) -> Response {
	match e {
		SyncError::Protocol(ProtocolError::UnknownCommand { .. }) => Response::UnknownCommand,
		other => Response::Error(other.to_string()),
	}
}

/// Parse and answer a single message.
///
/// Failures are returned to the caller, which turns them into the reply.
pub async fn handle_message<S>(
	transport: &mut Transport<S>,
	ctx: &HostContext,
	message: &str,
) -> Result<(), SyncError>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	match Request::parse(message)? {
		Request::SyncRequest(query) => handle_sync_request(transport, ctx, &query).await,
		Request::GetFile { filename } => handle_get_file(transport, ctx, &filename).await,
		Request::SendFile(header) => handle_send_file(transport, ctx, &header).await,
		Request::Unknown(command) => Err(ProtocolError::UnknownCommand { command }.into()),
	}
}

/// Describe the host copy of a file.
///
/// Any local failure is folded into the JSON reply, the peer expects JSON
/// here.
async fn handle_sync_request<S>(
	transport: &mut Transport<S>,
	ctx: &HostContext,
	query: &SyncQuery,
) -> Result<(), SyncError>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	let reply = match describe(ctx, &query.filename).await {
		Ok(Some(record)) => SyncReply::Found(record),
		Ok(None) => {
			info!("File {} not found on host", query.filename);
			SyncReply::NotFound
		}
		Err(e) => SyncReply::Error(e.to_string()),
	};
	transport.write_message(&reply.encode()?).await?;
	Ok(())
}

async fn describe(ctx: &HostContext, name: &str) -> Result<Option<FileRecord>, SyncError> {
	types::resolve_path(&ctx.data_dir, name)?;
	Ok(FileRecord::load(&ctx.data_dir, name).await?)
}

/// `GET_FILE`: announce the size, wait for `READY`, stream the bytes
async fn handle_get_file<S>(
	transport: &mut Transport<S>,
	ctx: &HostContext,
	filename: &str,
) -> Result<(), SyncError>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	let path = types::resolve_path(&ctx.data_dir, filename)?;
	let _guard = ctx.locks.lock(filename).await;

	// Opened before the size is announced; after FILE_SIZE only the payload may follow
	let (file, meta) = match open_source(&path).await {
		Ok(Some(opened)) => opened,
		Ok(None) => {
			transport.write_message(&Response::FileNotFound.encode()).await?;
			return Ok(());
		}
		Err(e) => return Err(e.into()),
	};

	let header = TransferHeader { filename: filename.to_string(), size: meta.len() };
	transport.write_message(&Response::FileSize(header.size).encode()).await?;

	let ack = transport.expect_message().await?;
	if Response::parse(&ack) != Response::Ready {
		return Err(ProtocolError::UnexpectedReply { expected: "READY".into(), got: ack }.into());
	}

	transfer::send_file(
		transport,
		file,
		&header,
		ctx.chunk_size,
		progress::reporter(ctx.report_progress),
	)
	.await?;
	info!("File {} sent to peer", filename);
	Ok(())
}

/// Open a regular file for sending, `None` if it is missing or not a file
async fn open_source(path: &Path) -> io::Result<Option<(afs::File, std::fs::Metadata)>> {
	let file = match afs::File::open(path).await {
		Ok(f) => f,
		Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
		Err(e) => return Err(e),
	};
	let meta = file.metadata().await?;
	if !meta.is_file() {
		return Ok(None);
	}
	Ok(Some((file, meta)))
}

/// `SEND_FILE`: acknowledge with `READY`, receive exactly `size` bytes
async fn handle_send_file<S>(
	transport: &mut Transport<S>,
	ctx: &HostContext,
	header: &TransferHeader,
) -> Result<(), SyncError>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	let path = types::resolve_path(&ctx.data_dir, &header.filename)?;
	let _guard = ctx.locks.lock(&header.filename).await;

	transport.write_message(&Response::Ready.encode()).await?;
	transfer::receive_file(
		transport,
		&path,
		header,
		ctx.chunk_size,
		progress::reporter(ctx.report_progress),
	)
	.await?;

	info!("File {} received from peer", header.filename);
	transport.write_message(&Response::FileReceived.encode()).await?;
	Ok(())
}


// vim: ts=4
