use std::time::Duration;

use reqwest::blocking::Client;

use crate::error::{PdiffError, Result};
use crate::hashpipeline::HashStreamReader;
use crate::params::TransferParams;

/// The client side of the wire protocol. One `RemoteClient` per
/// `(host, port)` endpoint; its inner `reqwest::blocking::Client` already
/// pools persistent connections per host, sized to
/// at least `concurrency` by `pool_max_idle_per_host`.
#[derive(Clone)]
pub struct RemoteClient {
  http: Client,
  base_url: String,
}

impl RemoteClient {
  pub fn new(base_url: impl Into<String>, concurrency: usize) -> Result<Self> {
    let http = Client::builder()
      .pool_max_idle_per_host(concurrency.max(1))
      .timeout(Duration::from_secs(300))
      .build()?;
    Ok(Self { http, base_url: base_url.into() })
  }

  /// Describe step: returns the remote file
  /// size, or `NOT_FOUND` if the path doesn't exist.
  pub fn describe(&self, path: &str) -> Result<u64> {
    let url = format!("{}{}", self.base_url, path);
    let resp = self.http.get(&url).query(&[("action", "info")]).send()?;
    if resp.status() == reqwest::StatusCode::NOT_FOUND {
      return Err(PdiffError::NotFound(path.to_string()));
    }
    if !resp.status().is_success() {
      return Err(PdiffError::Protocol(format!(
        "unexpected status {} from describe",
        resp.status()
      )));
    }
    let text = resp.text()?;
    text
      .trim()
      .parse()
      .map_err(|_| PdiffError::Protocol(format!("non-numeric size in describe response: {}", text)))
  }

  /// Stream hashes step. Returns a
  /// lazy, single-pass iterator over the response body; the caller
  /// enforces nothing extra — `HashStreamReader` already checks ascending
  /// order as it parses.
  pub fn stream_hashes(
    &self,
    path: &str,
    params: &TransferParams,
  ) -> Result<HashStreamReader<impl std::io::Read>> {
    let url = format!("{}{}", self.base_url, path);
    let resp = self
      .http
      .get(&url)
      .query(&[
        ("action", "hashes".to_string()),
        ("block_size", params.block_size.to_string()),
        ("method", params.hash_method.name().to_string()),
        ("concurrency", params.concurrency.to_string()),
      ])
      .send()?;
    if !resp.status().is_success() {
      return Err(PdiffError::Protocol(format!(
        "unexpected status {} from hash stream",
        resp.status()
      )));
    }
    Ok(HashStreamReader::new(resp, params.hash_method.digest_len()))
  }

  /// Read block.
  pub fn get_block(&self, path: &str, offset: u64, length: u64) -> Result<Vec<u8>> {
    let url = format!("{}{}", self.base_url, path);
    let resp = self
      .http
      .get(&url)
      .query(&[
        ("action", "block".to_string()),
        ("offset", offset.to_string()),
        ("length", length.to_string()),
      ])
      .send()?;
    if resp.status() == reqwest::StatusCode::RANGE_NOT_SATISFIABLE {
      return Err(PdiffError::Protocol(format!(
        "offset {} length {} out of range on remote",
        offset, length
      )));
    }
    if !resp.status().is_success() {
      return Err(PdiffError::Protocol(format!(
        "unexpected status {} from block read",
        resp.status()
      )));
    }
    let bytes = resp.bytes()?;
    if bytes.len() as u64 != length {
      return Err(PdiffError::Protocol(format!(
        "expected {} bytes from remote, got {}",
        length,
        bytes.len()
      )));
    }
    Ok(bytes.to_vec())
  }

  /// Write block.
  pub fn put_block(&self, path: &str, offset: u64, data: &[u8]) -> Result<()> {
    let url = format!("{}{}", self.base_url, path);
    let resp = self
      .http
      .put(&url)
      .query(&[("action", "block"), ("offset", &offset.to_string())])
      .body(data.to_vec())
      .send()?;
    if resp.status() != reqwest::StatusCode::NO_CONTENT {
      return Err(PdiffError::Protocol(format!(
        "unexpected status {} from block write",
        resp.status()
      )));
    }
    Ok(())
  }
}

