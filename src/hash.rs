use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::Path;

use crate::error::{PdiffError, Result};
use crate::params::HashMethod;

/// Block hasher. Opens its own file descriptor, reads exactly
/// `length` bytes at `offset`, and returns the digest under `method`.
/// Never shares a file descriptor with another worker: each call is a
/// self-contained unit of work suitable for driving from a work pool.
pub fn hash_block(path: &Path, offset: u64, length: u64, method: HashMethod) -> Result<Vec<u8>> {
  let file = File::open(path)?;
  let mut buf = vec![0u8; length as usize];
  file.read_exact_at(&mut buf, offset).map_err(|e| {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
      PdiffError::Io(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        format!(
          "short read at offset {} (wanted {} bytes) on {}",
          offset,
          length,
          path.display()
        ),
      ))
    } else {
      PdiffError::Io(e)
    }
  })?;
  Ok(method.digest(&buf))
}
