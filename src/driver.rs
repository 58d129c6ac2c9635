use std::fmt;
use std::time::{Duration, Instant};

use size_format::SizeFormatterBinary;

use crate::client::RemoteClient;
use crate::delta::{compute_delta, whole_file_diff};
use crate::error::{PdiffError, Result};
use crate::hashpipeline::local_hash_stream;
use crate::location::{Endpoints, FileLocation};
use crate::params::TransferParams;
use crate::transfer::{Direction, TransferEngine};
use crate::workpool::{CancelToken, WorkPool};

/// Reported on success and on dry-run completion, printed to stdout at
/// the end of a run.
pub struct TransferSummary {
  pub total_blocks: u64,
  pub diff_blocks: u64,
  pub bytes_transferred: u64,
  pub similarity_index: f64,
  pub elapsed: Duration,
  pub dry_run: bool,
}

impl fmt::Display for TransferSummary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.dry_run {
      write!(
        f,
        "dry run: {}/{} blocks differ (similarity {:.4}), nothing written",
        self.diff_blocks, self.total_blocks, self.similarity_index
      )
    } else {
      write!(
        f,
        "transferred {}B across {}/{} differing blocks (similarity {:.4}) in {:.2}s",
        SizeFormatterBinary::new(self.bytes_transferred),
        self.diff_blocks,
        self.total_blocks,
        self.similarity_index,
        self.elapsed.as_secs_f64(),
      )
    }
  }
}

/// The client-side state machine:
/// `INIT -> DESCRIBE -> HASHING -> DELTA -> (dry_run? REPORT : TRANSFER) -> DONE`,
/// with any worker error or external cancellation moving to `FAIL`.
pub fn run_transfer(endpoints: Endpoints, params: TransferParams, cancel: CancelToken) -> Result<TransferSummary> {
  let start = Instant::now();

  let (direction, local_path, base_url, remote_path) = split_endpoints(endpoints)?;
  log::info!(
    "starting {:?} transfer: local={} remote={}{} block_size={} concurrency={}",
    direction,
    local_path.display(),
    base_url,
    remote_path,
    params.block_size,
    params.concurrency
  );

  // DESCRIBE
  let remote = RemoteClient::new(base_url, params.concurrency)?;
  let remote_size = remote.describe(&remote_path)?;
  let local_size = std::fs::metadata(&local_path)?.len();
  log::info!("remote size is {} bytes, local size is {} bytes", remote_size, local_size);
  if local_size != remote_size {
    log::error!("size mismatch: local {} bytes, remote {} bytes", local_size, remote_size);
    return Err(PdiffError::SizeMismatch { local: local_size, remote: remote_size });
  }
  let size = local_size;

  let pool = WorkPool::new(params.concurrency)?;

  // HASHING + DELTA (or bypass entirely in whole-file mode)
  let diff = if params.whole_file {
    log::info!("whole-file mode: skipping hashing, every block is a diff");
    whole_file_diff(size, params.block_size)
  } else {
    log::info!("hashing {} bytes at block size {}", size, params.block_size);
    let local_rx = local_hash_stream(&pool, &local_path, size, &params, cancel.clone());
    let remote_iter = remote.stream_hashes(&remote_path, &params)?;
    let diff = compute_delta(local_rx.into_iter(), remote_iter, size, params.block_size)?;
    log::info!(
      "delta computed: {}/{} blocks differ (similarity {:.4})",
      diff.blocks.len(),
      diff.total_blocks,
      diff.similarity_index()
    );
    diff
  };

  let total_blocks = diff.total_blocks;
  let diff_blocks = diff.blocks.len() as u64;
  let similarity_index = diff.similarity_index();

  // (dry_run?) REPORT : TRANSFER
  let bytes_transferred = if params.dry_run {
    log::info!("dry run: reporting diff without transferring");
    0
  } else {
    log::info!("transferring {} differing blocks", diff_blocks);
    let engine = TransferEngine::new(local_path, remote_path, direction);
    let progress = engine.run(&pool, remote, &diff, cancel, true)?;
    progress.bytes_transferred()
  };

  log::info!("transfer done: {} bytes transferred", bytes_transferred);

  Ok(TransferSummary {
    total_blocks,
    diff_blocks,
    bytes_transferred,
    similarity_index,
    elapsed: start.elapsed(),
    dry_run: params.dry_run,
  })
}

fn split_endpoints(endpoints: Endpoints) -> Result<(Direction, std::path::PathBuf, String, String)> {
  match (endpoints.source, endpoints.target) {
    (FileLocation::Remote { host, port, path }, FileLocation::Local(local)) => {
      Ok((Direction::Pull, local, format!("http://{}:{}", host, port), path))
    }
    (FileLocation::Local(local), FileLocation::Remote { host, port, path }) => {
      Ok((Direction::Push, local, format!("http://{}:{}", host, port), path))
    }
    // `Endpoints::parse` already enforces exactly one remote endpoint.
    _ => Err(PdiffError::Protocol("exactly one endpoint must be remote".to_string())),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn summary_display_distinguishes_dry_run() {
    let s = TransferSummary {
      total_blocks: 10,
      diff_blocks: 2,
      bytes_transferred: 0,
      similarity_index: 0.8,
      elapsed: Duration::from_secs(1),
      dry_run: true,
    };
    assert!(format!("{}", s).starts_with("dry run"));
  }
}
