//! Data exchanged during one sync attempt
//!
//! Nothing here is persisted: records are derived from the filesystem on
//! demand and dropped once the exchange that needed them is over.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::fs as afs;

use crate::error::ProtocolError;
use crate::hasher;

/// Metadata of one synchronized file
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
	pub name: String,
	pub size: u64,
	/// Seconds since the UNIX epoch, sub-second precision kept
	pub modified_at: f64,
	/// Hex content hash
	pub hash: String,
}

impl FileRecord {
	/// Build the record for `name` inside `dir`, `None` if it does not exist
	pub async fn load(dir: &Path, name: &str) -> io::Result<Option<FileRecord>> {
		let path = dir.join(name);
		let meta = match afs::metadata(&path).await {
			Ok(m) => m,
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(e),
		};
		if !meta.is_file() {
			return Err(io::Error::new(
				io::ErrorKind::InvalidInput,
				format!("{} is not a regular file", path.display()),
			));
		}

		let modified_at = match meta.modified()?.duration_since(UNIX_EPOCH) {
			Ok(d) => d.as_secs_f64(),
			Err(e) => -e.duration().as_secs_f64(),
		};
		let hash = hasher::hash_file(&path).await?;

		Ok(Some(FileRecord { name: name.to_string(), size: meta.len(), modified_at, hash }))
	}
}

/// Client request for the host's view of a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncQuery {
	pub filename: String,
}

/// Host answer to a [`SyncQuery`]
#[derive(Debug, Clone, PartialEq)]
pub enum SyncReply {
	NotFound,
	Found(FileRecord),
	Error(String),
}

/// JSON shape of a sync reply on the wire
#[derive(Debug, Default, Serialize, Deserialize)]
struct WireReply {
	#[serde(skip_serializing_if = "Option::is_none")]
	exists: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	size: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	modified: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	hash: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	error: Option<String>,
}

impl SyncReply {
	/// Serialize to `{"exists":..}` / `{"error":..}` JSON
	pub fn encode(&self) -> Result<String, ProtocolError> {
		let wire = match self {
			SyncReply::NotFound => WireReply { exists: Some(false), ..Default::default() },
			SyncReply::Found(record) => WireReply {
				exists: Some(true),
				size: Some(record.size),
				modified: Some(record.modified_at),
				hash: Some(record.hash.clone()),
				error: None,
			},
			SyncReply::Error(message) => {
				WireReply { error: Some(message.clone()), ..Default::default() }
			}
		};
		Ok(serde_json::to_string(&wire)?)
	}

	/// Parse a reply to the query for `name`
	pub fn decode(name: &str, text: &str) -> Result<SyncReply, ProtocolError> {
		let wire: WireReply = serde_json::from_str(text)?;
		if let Some(message) = wire.error {
			return Ok(SyncReply::Error(message));
		}
		match wire.exists {
			Some(true) => match (wire.size, wire.modified, wire.hash) {
				(Some(size), Some(modified_at), Some(hash)) => {
					Ok(SyncReply::Found(FileRecord { name: name.to_string(), size, modified_at, hash }))
				}
				_ => Err(ProtocolError::Json(format!("incomplete file record: {}", text))),
			},
			Some(false) => Ok(SyncReply::NotFound),
			None => Err(ProtocolError::Json(format!("reply without exists or error: {}", text))),
		}
	}
}

/// Announces a raw payload of exactly `size` bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferHeader {
	pub filename: String,
	pub size: u64,
}

/// Validate a bare file name and join it onto `dir`
pub fn resolve_path(dir: &Path, name: &str) -> Result<PathBuf, ProtocolError> {
	let bare = !name.is_empty()
		&& name != "."
		&& name != ".."
		&& !name.contains('/')
		&& !name.contains('\\')
		&& !name.contains('\0');
	if !bare {
		return Err(ProtocolError::InvalidFilename { name: name.to_string() });
	}
	Ok(dir.join(name))
}


// vim: ts=4
