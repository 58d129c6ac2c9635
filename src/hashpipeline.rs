use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io::Read;
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt};
use crossbeam_channel::{bounded, Receiver};

use crate::block::enumerate_blocks;
use crate::error::{PdiffError, Result};
use crate::hash::hash_block;
use crate::params::TransferParams;
use crate::workpool::{CancelToken, WorkPool};

/// One entry of a hash stream: `(offset, digest)`.
#[derive(Debug, Clone)]
pub struct HashEntry {
  pub offset: u64,
  pub digest: Vec<u8>,
}

/// Ordered by offset, ascending. Wrapping in `Reverse` turns the
/// std `BinaryHeap` (a max-heap) into the min-heap the reorder buffer needs.
#[derive(Eq, PartialEq)]
struct ByOffset(HashEntry);

impl Ord for ByOffset {
  fn cmp(&self, other: &Self) -> std::cmp::Ordering {
    self.0.offset.cmp(&other.0.offset)
  }
}
impl PartialOrd for ByOffset {
  fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
    Some(self.cmp(other))
  }
}

/// Local case: drive the work pool with every block offset of a file, reorder
/// completion-order results into ascending-offset order with a bounded
/// min-heap, and emit a lazy, single-pass hash stream.
///
/// The heap is private to this one ordering thread; memory is bounded by
/// worker completion skew (in blocks), not file size.
pub fn local_hash_stream(
  pool: &WorkPool,
  path: &Path,
  size: u64,
  params: &TransferParams,
  cancel: CancelToken,
) -> Receiver<Result<HashEntry>> {
  let blocks = enumerate_blocks(size, params.block_size);
  let path = path.to_path_buf();
  let method = params.hash_method;
  let block_size = params.block_size;

  let raw_rx = pool.run(
    blocks,
    move |b: &crate::block::BlockDescriptor| {
      let digest = hash_block(&path, b.offset, b.length, method)?;
      Ok(HashEntry { offset: b.offset, digest })
    },
    cancel,
  );

  let (tx, rx) = bounded(pool.concurrency() * 2 + 1);
  std::thread::spawn(move || {
    let mut heap: BinaryHeap<Reverse<ByOffset>> = BinaryHeap::new();
    let mut next_offset = 0u64;
    for item in raw_rx.iter() {
      let (_, entry) = match item {
        Ok(pair) => pair,
        Err(e) => {
          let _ = tx.send(Err(e));
          return;
        }
      };
      heap.push(Reverse(ByOffset(entry)));
      while let Some(Reverse(ByOffset(top))) = heap.peek() {
        if top.offset != next_offset {
          break;
        }
        let Reverse(ByOffset(entry)) = heap.pop().unwrap();
        next_offset = entry.offset + block_size;
        if tx.send(Ok(entry)).is_err() {
          return;
        }
      }
    }
  });
  rx
}

/// Remote case: lazily parses the server's hash-stream response body
/// (fixed-width `offset BE || digest` records) into a single-pass
/// `Iterator<Item = Result<HashEntry>>`, enforcing the ascending-offset
/// contract as it reads. Any out-of-order entry is a protocol error; the
/// iterator yields it once and then stops.
pub struct HashStreamReader<R> {
  body: R,
  digest_len: usize,
  last_offset: Option<u64>,
  done: bool,
}

impl<R: Read> HashStreamReader<R> {
  pub fn new(body: R, digest_len: usize) -> Self {
    Self { body, digest_len, last_offset: None, done: false }
  }
}

impl<R: Read> Iterator for HashStreamReader<R> {
  type Item = Result<HashEntry>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.done {
      return None;
    }
    let offset = match self.body.read_u64::<BigEndian>() {
      Ok(o) => o,
      Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
        self.done = true;
        return None;
      }
      Err(e) => {
        self.done = true;
        return Some(Err(PdiffError::Io(e)));
      }
    };
    let mut digest = vec![0u8; self.digest_len];
    if let Err(e) = self.body.read_exact(&mut digest) {
      self.done = true;
      return Some(Err(PdiffError::Io(e)));
    }

    if let Some(last) = self.last_offset {
      if offset <= last {
        self.done = true;
        return Some(Err(PdiffError::Protocol(format!(
          "hash stream out of order: offset {} did not increase past {}",
          offset, last
        ))));
      }
    }
    self.last_offset = Some(offset);
    Some(Ok(HashEntry { offset, digest }))
  }
}

/// Convenience used by tests and by callers that do want the whole stream
/// materialized at once.
#[cfg(test)]
fn parse_hash_stream(body: impl Read, digest_len: usize) -> Result<Vec<HashEntry>> {
  HashStreamReader::new(body, digest_len).collect()
}

/// Serialize a single hash-stream record.
pub fn write_hash_entry(out: &mut impl std::io::Write, entry: &HashEntry) -> std::io::Result<()> {
  use byteorder::WriteBytesExt;
  out.write_u64::<BigEndian>(entry.offset)?;
  out.write_all(&entry.digest)?;
  Ok(())
}
