//! Content hashing used to decide whether two copies of a file are identical

use std::path::Path;
use tokio::fs as afs;
use tokio::io::AsyncReadExt;

/// Read block size while hashing
const HASH_BLOCK_SIZE: usize = 64 * 1024;

/// Hash an in-memory buffer, hex encoded
pub fn hash_bytes(data: &[u8]) -> String {
	hex::encode(blake3::hash(data).as_bytes())
}

/// Hash the full content of a file, hex encoded.
///
/// Identical content always yields the same string; file metadata does not
/// participate.
pub async fn hash_file(path: &Path) -> std::io::Result<String> {
	let mut file = afs::File::open(path).await?;
	let mut hasher = blake3::Hasher::new();
	let mut buf = vec![0u8; HASH_BLOCK_SIZE];
	loop {
		let n = file.read(&mut buf).await?;
		if n == 0 {
			break;
		}
		hasher.update(&buf[..n]);
	}
	Ok(hex::encode(hasher.finalize().as_bytes()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[tokio::test]
	async fn test_hash_is_deterministic() {
		let dir = TempDir::new().unwrap();
		let a = dir.path().join("a.bin");
		let b = dir.path().join("b.bin");
		std::fs::write(&a, b"same bytes").unwrap();
		std::fs::write(&b, b"same bytes").unwrap();

		let ha = hash_file(&a).await.unwrap();
		assert_eq!(ha, hash_file(&a).await.unwrap());
		assert_eq!(ha, hash_file(&b).await.unwrap());
		assert_eq!(ha, hash_bytes(b"same bytes"));
		assert_eq!(ha.len(), 64);
	}

	#[tokio::test]
	async fn test_different_content_differs() {
		let dir = TempDir::new().unwrap();
		let a = dir.path().join("a.bin");
		std::fs::write(&a, b"one").unwrap();
		let first = hash_file(&a).await.unwrap();
		std::fs::write(&a, b"two").unwrap();

		assert_ne!(first, hash_file(&a).await.unwrap());
	}

	#[tokio::test]
	async fn test_file_larger_than_block() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("big.bin");
		let data: Vec<u8> = (0..HASH_BLOCK_SIZE * 3 + 17).map(|i| (i % 251) as u8).collect();
		std::fs::write(&path, &data).unwrap();

		assert_eq!(hash_file(&path).await.unwrap(), hash_bytes(&data));
	}

	#[tokio::test]
	async fn test_missing_file() {
		let dir = TempDir::new().unwrap();
		assert!(hash_file(&dir.path().join("nope")).await.is_err());
	}
}

// vim: ts=4
