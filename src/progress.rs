//! Transfer progress reporting

use tracing::info;

/// Direction of a file transfer, from the reporting side's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
	Sending,
	Receiving,
}

/// Progress statistics after each transferred chunk
#[derive(Debug, Clone)]
pub struct TransferProgress<'a> {
	pub filename: &'a str,
	pub direction: TransferDirection,
	pub bytes_done: u64,
	pub bytes_total: u64,
}

impl TransferProgress<'_> {
	/// Cumulative percentage, truncated to five decimals
	pub fn percent(&self) -> f64 {
		if self.bytes_total == 0 {
			return 100.0;
		}
		let pct = self.bytes_done as f64 / self.bytes_total as f64 * 100.0;
		(pct * 100_000.0).trunc() / 100_000.0
	}
}

/// Callback for progress updates
pub trait ProgressCallback: Send + Sync {
	fn on_progress(&self, progress: &TransferProgress<'_>);
}

/// Progress callback that does nothing
pub struct NoProgress;

impl ProgressCallback for NoProgress {
	fn on_progress(&self, _progress: &TransferProgress<'_>) {}
}

/// Logs each update at info level
pub struct LogProgress;

impl ProgressCallback for LogProgress {
	fn on_progress(&self, progress: &TransferProgress<'_>) {
		let verb = match progress.direction {
			TransferDirection::Sending => "Sent",
			TransferDirection::Receiving => "Received",
		};
		info!("{} {}: {}%", verb, progress.filename, progress.percent());
	}
}

/// Pick the callback matching the `reportProgress` setting
pub fn reporter(enabled: bool) -> &'static dyn ProgressCallback {
	if enabled {
		&LogProgress
	} else {
		&NoProgress
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn progress(done: u64, total: u64) -> TransferProgress<'static> {
		TransferProgress {
			filename: "f",
			direction: TransferDirection::Sending,
			bytes_done: done,
			bytes_total: total,
		}
	}

	#[test]
	fn test_percent() {
		assert_eq!(progress(5, 10).percent(), 50.0);
		assert_eq!(progress(10, 10).percent(), 100.0);
		assert_eq!(progress(1, 3).percent(), 33.33333);
	}

	#[test]
	fn test_empty_file_is_complete() {
		assert_eq!(progress(0, 0).percent(), 100.0);
	}
}

// vim: ts=4
