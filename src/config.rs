//! Configuration for hosts and peers
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (Config::default())
//! 2. Config file (`.toml`, `.json` or `.json5`)
//! 3. Environment variables (LANSYNC_* prefix)
//! 4. CLI flags (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use crate::error::SyncError;
use crate::transfer::DEFAULT_CHUNK_SIZE;
use crate::transport::Framing;

/// Default TCP port of the host
pub const DEFAULT_PORT: u16 = 2000;

/// Default listen backlog
pub const DEFAULT_BACKLOG: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	// ========================================================================
	// NETWORK
	// ========================================================================
	/// IP address the host binds, or the host address a peer connects to.
	/// `None` resolves a LAN address when the server or session is
	/// constructed.
	pub address: Option<String>,

	/// TCP port
	pub port: u16,

	/// Listen backlog passed to `listen(2)`
	pub max_backlog: u32,

	/// Command framing on the wire
	pub framing: Framing,

	// ========================================================================
	// STORAGE
	// ========================================================================
	/// Directory holding the synchronized files by bare name
	pub data_dir: PathBuf,

	// ========================================================================
	// TRANSFER
	// ========================================================================
	/// Bytes per read/write during file transfer
	pub chunk_size: usize,

	/// Poll interval of the host's per-connection read loop (milliseconds)
	pub read_timeout_ms: u64,

	/// Limit for waiting on a reply or payload bytes (milliseconds, 0 = none)
	pub io_timeout_ms: u64,

	// ========================================================================
	// OUTPUT
	// ========================================================================
	/// Log transfer percentage after every chunk
	pub report_progress: bool,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			address: None,
			port: DEFAULT_PORT,
			max_backlog: DEFAULT_BACKLOG,
			framing: Framing::Compat,
			data_dir: PathBuf::from("lansync-data"),
			chunk_size: DEFAULT_CHUNK_SIZE,
			read_timeout_ms: 1000,
			io_timeout_ms: 30_000,
			report_progress: true,
		}
	}
}

impl Config {
	/// Load a config file; the format is picked by extension
	pub fn from_file(path: &Path) -> Result<Config, SyncError> {
		let text = fs::read_to_string(path).map_err(|e| SyncError::InvalidConfig {
			message: format!("cannot read {}: {}", path.display(), e),
		})?;
		let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

		let parsed = match ext {
			"toml" => toml::from_str::<Config>(&text).map_err(|e| e.to_string()),
			"json" => serde_json::from_str::<Config>(&text).map_err(|e| e.to_string()),
			"json5" => json5::from_str::<Config>(&text).map_err(|e| e.to_string()),
			other => Err(format!("unsupported config format {:?}", other)),
		};
		parsed.map_err(|message| SyncError::InvalidConfig {
			message: format!("{}: {}", path.display(), message),
		})
	}

	/// Defaults, then `path` if given, then the environment
	pub fn load(path: Option<&Path>) -> Result<Config, SyncError> {
		let mut config = match path {
			Some(p) => Config::from_file(p)?,
			None => Config::default(),
		};
		config.apply_env()?;
		config.validate()?;
		Ok(config)
	}

	/// Override fields from `LANSYNC_*` environment variables
	pub fn apply_env(&mut self) -> Result<(), SyncError> {
		self.apply_vars(|key| env::var(key).ok())
	}

	fn apply_vars<F>(&mut self, var: F) -> Result<(), SyncError>
	where
		F: Fn(&str) -> Option<String>,
	{
		if let Some(address) = var("LANSYNC_ADDRESS") {
			self.address = Some(address);
		}
		if let Some(port) = var("LANSYNC_PORT") {
			self.port = port.parse().map_err(|e| SyncError::InvalidConfig {
				message: format!("LANSYNC_PORT={:?}: {}", port, e),
			})?;
		}
		if let Some(dir) = var("LANSYNC_DATA_DIR") {
			self.data_dir = PathBuf::from(dir);
		}
		if let Some(framing) = var("LANSYNC_FRAMING") {
			self.framing = framing
				.parse()
				.map_err(|message| SyncError::InvalidConfig { message })?;
		}
		Ok(())
	}

	pub fn validate(&self) -> Result<(), SyncError> {
		if self.chunk_size == 0 {
			return Err(SyncError::InvalidConfig { message: "chunkSize must be positive".into() });
		}
		if self.read_timeout_ms == 0 {
			return Err(SyncError::InvalidConfig {
				message: "readTimeoutMs must be positive".into(),
			});
		}
		Ok(())
	}

	pub fn read_timeout(&self) -> Duration {
		Duration::from_millis(self.read_timeout_ms)
	}

	pub fn io_timeout(&self) -> Option<Duration> {
		if self.io_timeout_ms == 0 {
			None
		} else {
			Some(Duration::from_millis(self.io_timeout_ms))
		}
	}
}


// vim: ts=4
