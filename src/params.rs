use std::str::FromStr;

use crate::error::PdiffError;

/// Default block size: 1 MiB, as recommended in the data model.
pub const DEFAULT_BLOCK_SIZE: u64 = 1024 * 1024;

/// A content digest algorithm both endpoints must recognize by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashMethod {
  Blake3,
  Sha256,
}

impl HashMethod {
  pub fn name(self) -> &'static str {
    match self {
      HashMethod::Blake3 => "blake3",
      HashMethod::Sha256 => "sha256",
    }
  }

  /// Digest length in bytes for this method. Fixed per method.
  pub fn digest_len(self) -> usize {
    match self {
      HashMethod::Blake3 => 32,
      HashMethod::Sha256 => 32,
    }
  }

  pub fn digest(self, data: &[u8]) -> Vec<u8> {
    match self {
      HashMethod::Blake3 => blake3::hash(data).as_bytes().to_vec(),
      HashMethod::Sha256 => {
        use sha2::{Digest, Sha256};
        let mut h = Sha256::new();
        h.update(data);
        h.finalize().to_vec()
      }
    }
  }
}

impl FromStr for HashMethod {
  type Err = PdiffError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "blake3" => Ok(HashMethod::Blake3),
      "sha256" => Ok(HashMethod::Sha256),
      other => Err(PdiffError::UnknownHash(other.to_string())),
    }
  }
}

impl Default for HashMethod {
  fn default() -> Self {
    HashMethod::Blake3
  }
}

/// Transfer parameters, immutable for the duration of a transfer.
#[derive(Debug, Clone)]
pub struct TransferParams {
  pub block_size: u64,
  pub hash_method: HashMethod,
  pub concurrency: usize,
  pub whole_file: bool,
  pub dry_run: bool,
}

impl Default for TransferParams {
  fn default() -> Self {
    Self {
      block_size: DEFAULT_BLOCK_SIZE,
      hash_method: HashMethod::default(),
      concurrency: 4,
      whole_file: false,
      dry_run: false,
    }
  }
}
