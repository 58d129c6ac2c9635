use crate::block::{enumerate_blocks, BlockDescriptor};
use crate::error::{PdiffError, Result};
use crate::hashpipeline::HashEntry;

/// The set of offsets whose content differs, each carrying its block
/// length.
pub struct DiffSet {
  pub blocks: Vec<BlockDescriptor>,
  pub total_blocks: u64,
}

impl DiffSet {
  /// `1 - |diff_set| / total_blocks` (GLOSSARY: similarity index). A
  /// zero-block file is perfectly similar by convention.
  pub fn similarity_index(&self) -> f64 {
    if self.total_blocks == 0 {
      1.0
    } else {
      1.0 - (self.blocks.len() as f64 / self.total_blocks as f64)
    }
  }
}

/// Consume two ascending hash streams in lock-step and emit the
/// offsets whose digests differ. Precondition: equal file size and equal
/// `block_size`, so both streams carry identical offset sequences;
/// callers must have already checked sizes match before calling this.
pub fn compute_delta(
  local: impl Iterator<Item = Result<HashEntry>>,
  remote: impl Iterator<Item = Result<HashEntry>>,
  size: u64,
  block_size: u64,
) -> Result<DiffSet> {
  let mut local = local;
  let mut remote = remote;
  let mut diffs = Vec::new();

  loop {
    let l = local.next();
    let r = remote.next();
    match (l, r) {
      (None, None) => break,
      (Some(l), Some(r)) => {
        let l = l?;
        let r = r?;
        if l.offset != r.offset {
          return Err(PdiffError::Protocol(format!(
            "hash streams diverged: local offset {} vs remote offset {}",
            l.offset, r.offset
          )));
        }
        if l.digest != r.digest {
          diffs.push(BlockDescriptor {
            offset: l.offset,
            length: crate::block::block_length_at(l.offset, size, block_size),
          });
        }
      }
      _ => {
        return Err(PdiffError::Protocol(
          "hash streams ended at different lengths".to_string(),
        ))
      }
    }
  }

  Ok(DiffSet {
    blocks: diffs,
    total_blocks: crate::block::num_blocks(size, block_size),
  })
}

/// When `whole_file` is set, hashing is bypassed entirely: every offset is
/// a diff.
pub fn whole_file_diff(size: u64, block_size: u64) -> DiffSet {
  let blocks = enumerate_blocks(size, block_size);
  DiffSet { total_blocks: blocks.len() as u64, blocks }
}
