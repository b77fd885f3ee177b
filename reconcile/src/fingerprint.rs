//! Content fingerprints using sha2 and blake3

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

const BUFFER_SIZE: usize = 64 * 1024;

/// Hash algorithms supported for fingerprinting
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-256 hash
    Sha256,
    /// Blake3 hash (faster)
    #[default]
    Blake3,
}

impl HashAlgorithm {
    /// Fingerprint of an in-memory buffer
    pub fn digest(&self, bytes: &[u8]) -> String {
        match self {
            HashAlgorithm::Sha256 => format!("{:x}", Sha256::digest(bytes)),
            HashAlgorithm::Blake3 => blake3::hash(bytes).to_hex().to_string(),
        }
    }

    /// Fingerprint of everything a reader yields until EOF
    pub async fn digest_reader<R>(&self, reader: &mut R) -> std::io::Result<String>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut buffer = vec![0; BUFFER_SIZE];

        match self {
            HashAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                loop {
                    let bytes_read = reader.read(&mut buffer).await?;
                    if bytes_read == 0 {
                        break;
                    }
                    hasher.update(&buffer[..bytes_read]);
                }
                Ok(format!("{:x}", hasher.finalize()))
            }
            HashAlgorithm::Blake3 => {
                let mut hasher = blake3::Hasher::new();
                loop {
                    let bytes_read = reader.read(&mut buffer).await?;
                    if bytes_read == 0 {
                        break;
                    }
                    hasher.update(&buffer[..bytes_read]);
                }
                Ok(hasher.finalize().to_hex().to_string())
            }
        }
    }
}
