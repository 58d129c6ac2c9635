use std::fs;
use std::io::Write as _;
use std::sync::atomic::{AtomicU16, Ordering};
use std::thread;
use std::time::Duration;

use pdiffcopy::driver::run_transfer;
use pdiffcopy::location::Endpoints;
use pdiffcopy::params::{HashMethod, TransferParams};
use pdiffcopy::server::PdiffServer;
use pdiffcopy::workpool::CancelToken;

// Each test gets its own port so the suite can run concurrently without
// fighting over a listener, the same way integration suites in the pack
// mint a unique scratch path per test instead of sharing one.
static NEXT_PORT: AtomicU16 = AtomicU16::new(19_500);

fn spawn_server() -> u16 {
  let port = NEXT_PORT.fetch_add(1, Ordering::SeqCst);
  let server = PdiffServer::new(format!("127.0.0.1:{}", port));
  thread::spawn(move || {
    let _ = server.serve();
  });
  // give tiny_http a moment to bind before the client connects.
  thread::sleep(Duration::from_millis(100));
  port
}

fn params(block_size: u64) -> TransferParams {
  TransferParams { block_size, hash_method: HashMethod::Blake3, concurrency: 4, whole_file: false, dry_run: false }
}

fn pull(port: u16, remote_path: &std::path::Path, local_path: &std::path::Path, params: TransferParams) -> pdiffcopy::error::Result<pdiffcopy::driver::TransferSummary> {
  let source = format!("127.0.0.1:{}{}", port, remote_path.display());
  let endpoints = Endpoints::parse(&source, local_path.to_str().unwrap()).unwrap();
  run_transfer(endpoints, params, CancelToken::new())
}

/// S1 — full-match pull: identical contents yield an empty diff and no
/// bytes written.
#[test]
fn full_match_pull_transfers_nothing() {
  let port = spawn_server();
  let mut remote = tempfile::NamedTempFile::new().unwrap();
  let content = vec![0x5Au8; 64 * 1024 + 37];
  remote.write_all(&content).unwrap();
  remote.flush().unwrap();

  let mut local = tempfile::NamedTempFile::new().unwrap();
  local.write_all(&content).unwrap();
  local.flush().unwrap();

  let summary = pull(port, remote.path(), local.path(), params(4096)).unwrap();
  assert_eq!(summary.diff_blocks, 0);
  assert_eq!(summary.bytes_transferred, 0);
  assert_eq!(summary.similarity_index, 1.0);
  assert_eq!(fs::read(local.path()).unwrap(), content);
}

/// S2 — single-block change: only the differing block is fetched, and the
/// target ends up byte-equal to the source.
#[test]
fn single_block_change_is_reconciled() {
  let port = spawn_server();
  let block_size = 4096u64;
  let total = block_size * 5;

  let mut remote_bytes = vec![0xAAu8; total as usize];
  for b in remote_bytes[(block_size as usize * 2)..(block_size as usize * 2 + 16)].iter_mut() {
    *b = 0xFF;
  }
  let mut remote = tempfile::NamedTempFile::new().unwrap();
  remote.write_all(&remote_bytes).unwrap();
  remote.flush().unwrap();

  let local_bytes = vec![0xAAu8; total as usize];
  let mut local = tempfile::NamedTempFile::new().unwrap();
  local.write_all(&local_bytes).unwrap();
  local.flush().unwrap();

  let summary = pull(port, remote.path(), local.path(), params(block_size)).unwrap();
  assert_eq!(summary.diff_blocks, 1);
  assert_eq!(summary.bytes_transferred, block_size);
  assert_eq!(fs::read(local.path()).unwrap(), remote_bytes);
}

/// S3 — short final block: the differing block's reported length matches
/// its true (short) length, and the byte-for-byte reconciliation still
/// holds across the boundary.
#[test]
fn short_final_block_is_reconciled() {
  let port = spawn_server();
  let block_size = 1024u64;
  let total = block_size * 3 + 100;

  let mut remote_bytes = vec![0x11u8; total as usize];
  let tail_start = (block_size * 3) as usize + 50;
  for b in remote_bytes[tail_start..].iter_mut() {
    *b = 0x22;
  }
  let mut remote = tempfile::NamedTempFile::new().unwrap();
  remote.write_all(&remote_bytes).unwrap();
  remote.flush().unwrap();

  let local_bytes = vec![0x11u8; total as usize];
  let mut local = tempfile::NamedTempFile::new().unwrap();
  local.write_all(&local_bytes).unwrap();
  local.flush().unwrap();

  let summary = pull(port, remote.path(), local.path(), params(block_size)).unwrap();
  assert_eq!(summary.diff_blocks, 1);
  assert_eq!(summary.bytes_transferred, 100);
  assert_eq!(fs::read(local.path()).unwrap(), remote_bytes);
}

/// S4 — whole-file mode: every block is transferred unconditionally, with
/// no hashing performed.
#[test]
fn whole_file_mode_copies_every_block() {
  let port = spawn_server();
  let block_size = 1024u64;
  let total = block_size * 5;

  let remote_bytes: Vec<u8> = (0..total).map(|i| (i % 251) as u8).collect();
  let mut remote = tempfile::NamedTempFile::new().unwrap();
  remote.write_all(&remote_bytes).unwrap();
  remote.flush().unwrap();

  let local_bytes = vec![0u8; total as usize];
  let mut local = tempfile::NamedTempFile::new().unwrap();
  local.write_all(&local_bytes).unwrap();
  local.flush().unwrap();

  let mut p = params(block_size);
  p.whole_file = true;
  let summary = pull(port, remote.path(), local.path(), p).unwrap();
  assert_eq!(summary.diff_blocks, 5);
  assert_eq!(summary.bytes_transferred, total);
  assert_eq!(fs::read(local.path()).unwrap(), remote_bytes);
}

/// S5 — size mismatch is caught before any hashing or transfer work
/// begins, and the target is left untouched.
#[test]
fn size_mismatch_fails_before_any_transfer() {
  let port = spawn_server();
  let mut remote = tempfile::NamedTempFile::new().unwrap();
  remote.write_all(&vec![0u8; 1000]).unwrap();
  remote.flush().unwrap();

  let local_bytes = vec![0u8; 999];
  let mut local = tempfile::NamedTempFile::new().unwrap();
  local.write_all(&local_bytes).unwrap();
  local.flush().unwrap();

  let err = pull(port, remote.path(), local.path(), params(256)).unwrap_err();
  assert!(matches!(err, pdiffcopy::error::PdiffError::SizeMismatch { .. }));
  assert_eq!(fs::read(local.path()).unwrap(), local_bytes);
}

/// S6 — dry run computes and reports the diff but never writes the
/// target.
#[test]
fn dry_run_leaves_target_untouched() {
  let port = spawn_server();
  let block_size = 1024u64;
  let total = block_size * 2;

  let mut remote_bytes = vec![0x33u8; total as usize];
  for b in remote_bytes[..16].iter_mut() {
    *b = 0x44;
  }
  let mut remote = tempfile::NamedTempFile::new().unwrap();
  remote.write_all(&remote_bytes).unwrap();
  remote.flush().unwrap();

  let local_bytes = vec![0x33u8; total as usize];
  let mut local = tempfile::NamedTempFile::new().unwrap();
  local.write_all(&local_bytes).unwrap();
  local.flush().unwrap();

  let mut p = params(block_size);
  p.dry_run = true;
  let summary = pull(port, remote.path(), local.path(), p).unwrap();
  assert_eq!(summary.diff_blocks, 1);
  assert_eq!(summary.bytes_transferred, 0);
  assert_eq!(fs::read(local.path()).unwrap(), local_bytes);
}

/// Idempotence: running the same pull twice leaves an empty diff and an
/// unchanged target the second time.
#[test]
fn second_run_is_idempotent() {
  let port = spawn_server();
  let block_size = 2048u64;
  let total = block_size * 3;

  let mut remote_bytes = vec![0x77u8; total as usize];
  for b in remote_bytes[(block_size as usize)..(block_size as usize + 8)].iter_mut() {
    *b = 0x88;
  }
  let mut remote = tempfile::NamedTempFile::new().unwrap();
  remote.write_all(&remote_bytes).unwrap();
  remote.flush().unwrap();

  let mut local = tempfile::NamedTempFile::new().unwrap();
  local.write_all(&vec![0x77u8; total as usize]).unwrap();
  local.flush().unwrap();

  let first = pull(port, remote.path(), local.path(), params(block_size)).unwrap();
  assert_eq!(first.diff_blocks, 1);

  let second = pull(port, remote.path(), local.path(), params(block_size)).unwrap();
  assert_eq!(second.diff_blocks, 0);
  assert_eq!(second.bytes_transferred, 0);
  assert_eq!(fs::read(local.path()).unwrap(), remote_bytes);
}
