//! Chunked file transfer over an agreed payload size
//!
//! The sender streams the file in large chunks; the receiver reads until the
//! declared size has arrived. Chunk sizes need not match between the two
//! sides since the receive loop is driven by the remaining byte count.
//!
//! Received bytes go to a temporary sibling file that replaces the
//! destination only once the payload is complete, so a dropped connection
//! never leaves a half-written file under the real name.

use std::convert::TryFrom;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs as afs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::error::TransferError;
use crate::progress::{ProgressCallback, TransferDirection, TransferProgress};
use crate::transport::Transport;
use crate::types::TransferHeader;

/// Default chunk size for both directions (32 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 4 * (1 << 23);

/// Suffix of in-flight receive files
pub const TEMP_SUFFIX: &str = ".lansync-tmp";

/// Temporary path used while receiving `dest`
pub fn temp_path(dest: &Path) -> PathBuf {
	let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
	name.push(TEMP_SUFFIX);
	dest.with_file_name(name)
}

/// Stream exactly `header.size` bytes of `source` to the peer.
///
/// The caller opens `source` before announcing the size. Returns the number
/// of bytes sent.
pub async fn send_file<S>(
	transport: &mut Transport<S>,
	mut source: afs::File,
	header: &TransferHeader,
	chunk_size: usize,
	progress: &dyn ProgressCallback,
) -> Result<u64, TransferError>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	let mut buf = vec![0u8; buffer_len(chunk_size, header.size)];
	let mut sent: u64 = 0;

	while sent < header.size {
		let want = buf.len().min((header.size - sent) as usize);
		let n = read_full(&mut source, &mut buf[..want]).await?;
		if n == 0 {
			return Err(TransferError::SourceShrunk { expected: header.size, sent });
		}
		transport.write_payload(&buf[..n]).await?;
		sent += n as u64;
		progress.on_progress(&TransferProgress {
			filename: &header.filename,
			direction: TransferDirection::Sending,
			bytes_done: sent,
			bytes_total: header.size,
		});
	}
	transport.flush().await?;

	debug!("Sent {} ({} bytes)", header.filename, sent);
	Ok(sent)
}

/// Receive exactly `header.size` bytes from the peer into `dest`.
///
/// A stream that ends early yields [`TransferError::Truncated`] and leaves
/// any previous `dest` untouched. Returns the number of bytes written.
pub async fn receive_file<S>(
	transport: &mut Transport<S>,
	dest: &Path,
	header: &TransferHeader,
	chunk_size: usize,
	progress: &dyn ProgressCallback,
) -> Result<u64, TransferError>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	let tmp = temp_path(dest);
	match receive_into(transport, &tmp, header, chunk_size, progress).await {
		Ok(received) => {
			afs::rename(&tmp, dest).await.map_err(|e| {
				warn!("Cannot move {} into place: {}", tmp.display(), e);
				TransferError::Io(e)
			})?;
			debug!("Received {} ({} bytes)", header.filename, received);
			Ok(received)
		}
		Err(e) => {
			if let Err(rm) = afs::remove_file(&tmp).await {
				if rm.kind() != io::ErrorKind::NotFound {
					warn!("Failed to remove {}: {}", tmp.display(), rm);
				}
			}
			Err(e)
		}
	}
}

async fn receive_into<S>(
	transport: &mut Transport<S>,
	tmp: &Path,
	header: &TransferHeader,
	chunk_size: usize,
	progress: &dyn ProgressCallback,
) -> Result<u64, TransferError>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	let mut file = afs::File::create(tmp).await?;
	let mut buf = vec![0u8; buffer_len(chunk_size, header.size)];
	let mut received: u64 = 0;

	while received < header.size {
		let want = buf.len().min((header.size - received) as usize);
		let n = transport.read_payload(&mut buf[..want]).await?;
		if n == 0 {
			return Err(TransferError::Truncated { expected: header.size, received });
		}
		file.write_all(&buf[..n]).await?;
		received += n as u64;
		progress.on_progress(&TransferProgress {
			filename: &header.filename,
			direction: TransferDirection::Receiving,
			bytes_done: received,
			bytes_total: header.size,
		});
	}
	file.flush().await?;
	file.sync_all().await?;

	Ok(received)
}

/// Remove in-flight files left behind by an interrupted receive
pub async fn cleanup_temp_files(dir: &Path) -> io::Result<usize> {
	let mut removed = 0;
	let mut entries = afs::read_dir(dir).await?;
	while let Some(entry) = entries.next_entry().await? {
		let is_temp = entry.file_name().to_str().map_or(false, |n| n.ends_with(TEMP_SUFFIX));
		if !is_temp {
			continue;
		}
		match afs::remove_file(entry.path()).await {
			Ok(()) => removed += 1,
			Err(e) if e.kind() == io::ErrorKind::NotFound => {}
			Err(e) => warn!("Failed to remove temp file {:?}: {}", entry.path(), e),
		}
	}
	Ok(removed)
}

fn buffer_len(chunk_size: usize, total: u64) -> usize {
	let total = usize::try_from(total).unwrap_or(usize::MAX);
	chunk_size.min(total).max(1)
}

/// Read until `buf` is full or the file ends
async fn read_full(file: &mut afs::File, buf: &mut [u8]) -> io::Result<usize> {
	let mut filled = 0;
	while filled < buf.len() {
		let n = file.read(&mut buf[filled..]).await?;
		if n == 0 {
			break;
		}
		filled += n;
	}
	Ok(filled)
}


// vim: ts=4
