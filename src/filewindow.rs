use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;

use crate::error::Result;

/// A local file opened for positional I/O. Distinct offsets may be
/// read or written concurrently from multiple threads: `pread`/`pwrite`
/// take the offset as an argument instead of moving a shared cursor, so
/// callers only need to guarantee that no two concurrent writes target the
/// same offset, which a diff set with unique block offsets gives us.
pub struct FileWindow {
  file: File,
  size: u64,
}

impl FileWindow {
  pub fn open_read(path: &Path) -> Result<Self> {
    let file = File::open(path)?;
    let size = file.metadata()?.len();
    Ok(Self { file, size })
  }

  pub fn open_read_write(path: &Path) -> Result<Self> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    let size = file.metadata()?.len();
    Ok(Self { file, size })
  }

  pub fn size(&self) -> u64 {
    self.size
  }

  /// Read exactly `length` bytes starting at `offset`. Reads may overlap
  /// freely with other reads and writes.
  pub fn read_at(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; length as usize];
    self.file.read_exact_at(&mut buf, offset)?;
    Ok(buf)
  }

  /// Write `data` at `offset`. Never truncates or extends the file:
  /// a short final block writes exactly its own length, nothing more.
  pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
    self.file.write_all_at(data, offset)?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write as _;
  use std::sync::Arc;
  use std::thread;

  #[test]
  fn reads_back_what_was_written() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(&[0u8; 8192]).unwrap();
    f.flush().unwrap();

    let win = FileWindow::open_read_write(f.path()).unwrap();
    win.write_at(1024, b"hello").unwrap();
    let back = win.read_at(1024, 5).unwrap();
    assert_eq!(back, b"hello");
  }

  #[test]
  fn short_write_does_not_extend_file() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(&[0u8; 100]).unwrap();
    f.flush().unwrap();

    let win = FileWindow::open_read_write(f.path()).unwrap();
    win.write_at(50, &[1u8; 10]).unwrap();
    assert_eq!(win.size(), 100);
    assert_eq!(std::fs::metadata(f.path()).unwrap().len(), 100);
  }

  #[test]
  fn concurrent_writes_to_disjoint_offsets_are_safe() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(&[0u8; 4096]).unwrap();
    f.flush().unwrap();

    let win = Arc::new(FileWindow::open_read_write(f.path()).unwrap());
    let mut handles = vec![];
    for i in 0..4u64 {
      let win = win.clone();
      handles.push(thread::spawn(move || {
        win.write_at(i * 1024, &vec![i as u8; 1024]).unwrap();
      }));
    }
    for h in handles {
      h.join().unwrap();
    }
    for i in 0..4u64 {
      let block = win.read_at(i * 1024, 1024).unwrap();
      assert!(block.iter().all(|&b| b == i as u8));
    }
  }
}
