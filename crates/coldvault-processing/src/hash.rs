//! Content hashing
//!
//! Digests are lowercase hex SHA-256 and are used verbatim as the deduplication key.

use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Digest of a fully consumed stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDigest {
    pub hex: String,
    /// Number of bytes hashed.
    pub size: u64,
}

/// Hash a reader to EOF without buffering it in memory.
pub async fn compute_digest<R>(reader: &mut R) -> std::io::Result<ContentDigest>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    let mut size = 0u64;

    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        size += n as u64;
    }

    Ok(ContentDigest {
        hex: hex::encode(hasher.finalize()),
        size,
    })
}

pub fn digest_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
