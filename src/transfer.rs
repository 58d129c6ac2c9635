use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};

use crate::block::BlockDescriptor;
use crate::client::RemoteClient;
use crate::delta::DiffSet;
use crate::error::Result;
use crate::filewindow::FileWindow;
use crate::workpool::{CancelToken, WorkPool};

/// Direction of a transfer: remote -> local, or local -> remote (GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
  Pull,
  Push,
}

/// `(bytes_transferred, bytes_total)`, monotonically non-decreasing as
/// reported by the engine.
#[derive(Clone)]
pub struct Progress {
  transferred: Arc<AtomicU64>,
  total: u64,
}

impl Progress {
  pub fn bytes_transferred(&self) -> u64 {
    self.transferred.load(Ordering::SeqCst)
  }

  pub fn bytes_total(&self) -> u64 {
    self.total
  }
}

/// For each differing offset, fetch the block from the remote side
/// and write it locally (pull), or read it locally and push it to the
/// remote (push), with up to `concurrency` copies in flight. Blocks may
/// complete in any order; correctness follows from the diff set's
/// disjoint offsets.
pub struct TransferEngine {
  local_path: PathBuf,
  remote_path: String,
  direction: Direction,
}

impl TransferEngine {
  pub fn new(local_path: impl Into<PathBuf>, remote_path: impl Into<String>, direction: Direction) -> Self {
    Self { local_path: local_path.into(), remote_path: remote_path.into(), direction }
  }

  /// Copy every block in `diff`. Returns the total bytes actually
  /// transferred (zero if `diff` is empty, e.g. a full-match pull).
  /// If `cancel` fires before every block has been copied, this returns
  /// `Err(PdiffError::Cancelled)` rather than a short, silently-incomplete
  /// `Progress` — the caller must not treat a cut-short run as success.
  pub fn run(
    &self,
    pool: &WorkPool,
    remote: RemoteClient,
    diff: &DiffSet,
    cancel: CancelToken,
    progress_bar: bool,
  ) -> Result<Progress> {
    let total: u64 = diff.blocks.iter().map(|b| b.length).sum();
    let bar = if progress_bar {
      let bar = ProgressBar::new(total);
      bar.set_style(
        ProgressStyle::default_bar()
          .template("{spinner:.green} transfer [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes}")
          .progress_chars("#>-"),
      );
      Some(bar)
    } else {
      None
    };

    let local = Arc::new(open_local(&self.local_path, self.direction)?);
    let remote_path = self.remote_path.clone();
    let direction = self.direction;
    let transferred = Arc::new(AtomicU64::new(0));

    let rx = pool.run(
      diff.blocks.clone(),
      move |b: &BlockDescriptor| -> Result<u64> {
        match direction {
          Direction::Pull => {
            let data = remote.get_block(&remote_path, b.offset, b.length)?;
            local.write_at(b.offset, &data)?;
          }
          Direction::Push => {
            let data = local.read_at(b.offset, b.length)?;
            remote.put_block(&remote_path, b.offset, &data)?;
          }
        }
        Ok(b.length)
      },
      cancel,
    );

    for item in rx.iter() {
      let (_, len) = item?;
      transferred.fetch_add(len, Ordering::SeqCst);
      if let Some(bar) = &bar {
        bar.inc(len);
      }
    }
    if let Some(bar) = &bar {
      bar.finish();
    }

    Ok(Progress { transferred, total })
  }
}

fn open_local(path: &Path, direction: Direction) -> Result<FileWindow> {
  match direction {
    Direction::Pull => FileWindow::open_read_write(path),
    Direction::Push => FileWindow::open_read(path),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn progress_reports_zero_for_empty_diff() {
    let p = Progress { transferred: Arc::new(AtomicU64::new(0)), total: 0 };
    assert_eq!(p.bytes_transferred(), 0);
    assert_eq!(p.bytes_total(), 0);
  }
}
