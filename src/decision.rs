//! Newest-wins decision between a local file and the host's copy
//!
//! The decision is pure: both records are computed before calling
//! [`decide`], which performs no I/O.

use crate::types::{FileRecord, SyncReply};

/// What a sync attempt has to do
#[derive(Debug, Clone, PartialEq)]
pub enum SyncDecision {
	/// Neither side has the file
	NothingToSync,
	/// Both sides hold identical content
	InSync,
	/// Send the local copy to the host
	Push,
	/// Fetch the host copy
	Pull,
	/// The host could not answer
	Abort(String),
}

pub fn decide(local: Option<&FileRecord>, remote: &SyncReply) -> SyncDecision {
	match (remote, local) {
		(SyncReply::Error(message), _) => SyncDecision::Abort(message.clone()),
		(SyncReply::NotFound, None) => SyncDecision::NothingToSync,
		(SyncReply::NotFound, Some(_)) => SyncDecision::Push,
		(SyncReply::Found(_), None) => SyncDecision::Pull,
		(SyncReply::Found(theirs), Some(ours)) => {
			if ours.hash == theirs.hash {
				SyncDecision::InSync
			} else if ours.modified_at > theirs.modified_at {
				SyncDecision::Push
			} else {
				// Equal timestamps fall through to the host copy
				SyncDecision::Pull
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn record(hash: &str, modified_at: f64) -> FileRecord {
		FileRecord { name: "a.txt".into(), size: 10, modified_at, hash: hash.into() }
	}

	#[test]
	fn test_remote_error_aborts() {
		let local = record("aa", 1.0);
		assert_eq!(
			decide(Some(&local), &SyncReply::Error("denied".into())),
			SyncDecision::Abort("denied".into())
		);
		assert_eq!(decide(None, &SyncReply::Error("x".into())), SyncDecision::Abort("x".into()));
	}

	#[test]
	fn test_remote_missing() {
		assert_eq!(decide(None, &SyncReply::NotFound), SyncDecision::NothingToSync);
		assert_eq!(decide(Some(&record("aa", 1.0)), &SyncReply::NotFound), SyncDecision::Push);
	}

	#[test]
	fn test_local_missing_pulls() {
		assert_eq!(decide(None, &SyncReply::Found(record("aa", 1.0))), SyncDecision::Pull);
	}

	#[test]
	fn test_identical_hash_ignores_mtime() {
		let local = record("aa", 500.0);
		let remote = SyncReply::Found(record("aa", 1.0));
		assert_eq!(decide(Some(&local), &remote), SyncDecision::InSync);
	}

	#[test]
	fn test_newer_side_wins() {
		let remote = SyncReply::Found(record("bb", 100.0));
		assert_eq!(decide(Some(&record("aa", 200.0)), &remote), SyncDecision::Push);
		assert_eq!(decide(Some(&record("aa", 50.0)), &remote), SyncDecision::Pull);
	}

	#[test]
	fn test_tie_pulls() {
		let remote = SyncReply::Found(record("bb", 100.0));
		for _ in 0..10 {
			assert_eq!(decide(Some(&record("aa", 100.0)), &remote), SyncDecision::Pull);
		}
	}
}

// vim: ts=4
