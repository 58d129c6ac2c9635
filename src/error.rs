use thiserror::Error;

/// The error taxonomy of a transfer: a closed set of *kinds*, not a grab bag
/// of wrapped library errors. Every fallible operation in the core maps its
/// failure onto one of these before it crosses a module boundary.
#[derive(Error, Debug)]
pub enum PdiffError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("local file is {local} bytes, remote is {remote} bytes; sizes must match before a delta transfer")]
  SizeMismatch { local: u64, remote: u64 },

  #[error("unknown hash method: {0}")]
  UnknownHash(String),

  #[error("protocol error: {0}")]
  Protocol(String),

  #[error("network error: {0}")]
  Network(#[from] reqwest::Error),

  #[error("path not found on remote: {0}")]
  NotFound(String),

  #[error("transfer cancelled")]
  Cancelled,
}

pub type Result<T> = std::result::Result<T, PdiffError>;
