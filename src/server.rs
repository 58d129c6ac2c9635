use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use tiny_http::{Header, Method, Request, Response, Server};

use crate::error::{PdiffError, Result};
use crate::filewindow::FileWindow;
use crate::hashpipeline::{local_hash_stream, write_hash_entry, HashEntry};
use crate::params::{HashMethod, TransferParams};
use crate::workpool::{CancelToken, WorkPool};

/// The server side of the wire protocol. Stateless across requests:
/// every request carries its own path, and the server has no
/// authentication or encryption; front it with a reverse proxy on
/// hostile networks.
pub struct PdiffServer {
  listen_addr: String,
}

impl PdiffServer {
  pub fn new(listen_addr: impl Into<String>) -> Self {
    Self { listen_addr: listen_addr.into() }
  }

  /// Bind and serve forever, one thread per connection. Each request is
  /// handled to completion on its own thread so a slow hash-stream
  /// response never blocks new connections.
  pub fn serve(&self) -> Result<()> {
    let server = Server::http(&self.listen_addr)
      .map_err(|e| PdiffError::Protocol(format!("cannot bind {}: {}", self.listen_addr, e)))?;
    let server = Arc::new(server);
    log::info!("pdiffcopy server listening on {}", self.listen_addr);

    loop {
      let request = match server.recv() {
        Ok(r) => r,
        Err(e) => {
          log::error!("error accepting connection: {}", e);
          continue;
        }
      };
      std::thread::spawn(move || {
        if let Err(e) = handle_request(request) {
          log::error!("error handling request: {}", e);
        }
      });
    }
  }
}

fn handle_request(mut request: Request) -> Result<()> {
  let (path, query) = split_url(request.url());
  let action = query.get("action").map(String::as_str).unwrap_or("");
  let method = request.method().clone();

  log::debug!("{} {} action={}", method, path, action);

  match (method, action) {
    (Method::Head, "info") | (Method::Get, "info") => respond_info(request, &path),
    (Method::Get, "hashes") => respond_hashes(request, &path, &query),
    (Method::Get, "block") => respond_read_block(request, &path, &query),
    (Method::Put, "block") | (Method::Post, "block") => {
      respond_write_block(&mut request, &path, &query)
    }
    _ => {
      let _ = request.respond(Response::empty(400));
      Ok(())
    }
  }
}

fn respond_info(request: Request, path: &str) -> Result<()> {
  match std::fs::metadata(path) {
    Ok(meta) => {
      let header = Header::from_bytes(&b"X-File-Size"[..], meta.len().to_string().as_bytes())
        .expect("valid header");
      let response = Response::from_string(meta.len().to_string())
        .with_status_code(200)
        .with_header(header);
      let _ = request.respond(response);
    }
    Err(_) => {
      let _ = request.respond(Response::from_string("not found").with_status_code(404));
    }
  }
  Ok(())
}

fn respond_hashes(request: Request, path: &str, query: &HashMap<String, String>) -> Result<()> {
  let block_size: u64 = match query.get("block_size").and_then(|v| v.parse().ok()) {
    Some(v) if v > 0 => v,
    _ => {
      let _ = request.respond(Response::from_string("bad block_size").with_status_code(400));
      return Ok(());
    }
  };
  let method = match query.get("method").map(String::as_str).map(HashMethod::from_str) {
    Some(Ok(m)) => m,
    _ => {
      let _ = request.respond(Response::from_string("unknown hash method").with_status_code(400));
      return Ok(());
    }
  };
  let concurrency: usize = query
    .get("concurrency")
    .and_then(|v| v.parse().ok())
    .filter(|v| *v > 0)
    .unwrap_or(4);

  let size = match std::fs::metadata(path) {
    Ok(meta) => meta.len(),
    Err(_) => {
      let _ = request.respond(Response::from_string("not found").with_status_code(404));
      return Ok(());
    }
  };

  let params = TransferParams { block_size, hash_method: method, concurrency, ..Default::default() };
  let pool = WorkPool::new(concurrency)?;
  let rx = local_hash_stream(&pool, Path::new(path), size, &params, CancelToken::new());

  let body = HashStreamBody { rx, buf: Vec::new(), pos: 0 };
  let response = Response::new(200.into(), vec![], body, None, None);
  let _ = request.respond(response);
  Ok(())
}

fn respond_read_block(request: Request, path: &str, query: &HashMap<String, String>) -> Result<()> {
  let offset: u64 = match query.get("offset").and_then(|v| v.parse().ok()) {
    Some(v) => v,
    None => {
      let _ = request.respond(Response::from_string("bad offset").with_status_code(400));
      return Ok(());
    }
  };
  let length: u64 = match query.get("length").and_then(|v| v.parse().ok()) {
    Some(v) => v,
    None => {
      let _ = request.respond(Response::from_string("bad length").with_status_code(400));
      return Ok(());
    }
  };

  let window = match FileWindow::open_read(Path::new(path)) {
    Ok(w) => w,
    Err(_) => {
      let _ = request.respond(Response::from_string("not found").with_status_code(404));
      return Ok(());
    }
  };
  if offset.saturating_add(length) > window.size() {
    let _ = request.respond(Response::from_string("out of range").with_status_code(416));
    return Ok(());
  }

  let data = window.read_at(offset, length)?;
  let _ = request.respond(Response::from_data(data));
  Ok(())
}

fn respond_write_block(request: &mut Request, path: &str, query: &HashMap<String, String>) -> Result<()> {
  let offset: u64 = match query.get("offset").and_then(|v| v.parse().ok()) {
    Some(v) => v,
    None => {
      let _ = request.respond(Response::from_string("bad offset").with_status_code(400));
      return Ok(());
    }
  };

  let mut data = Vec::new();
  request.as_reader().read_to_end(&mut data)?;

  let window = match FileWindow::open_read_write(Path::new(path)) {
    Ok(w) => w,
    Err(_) => {
      let _ = request.respond(Response::from_string("not found").with_status_code(404));
      return Ok(());
    }
  };
  if offset.saturating_add(data.len() as u64) > window.size() {
    let _ = request.respond(Response::from_string("out of range").with_status_code(416));
    return Ok(());
  }

  window.write_at(offset, &data)?;
  let _ = request.respond(Response::empty(204));
  Ok(())
}

/// Adapts the hash-stream `Receiver` into `Read` so `tiny_http` can flush
/// each ordered entry as it becomes available instead of buffering the
/// whole response.
struct HashStreamBody {
  rx: crossbeam_channel::Receiver<Result<HashEntry>>,
  buf: Vec<u8>,
  pos: usize,
}

impl Read for HashStreamBody {
  fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
    loop {
      if self.pos < self.buf.len() {
        let n = (self.buf.len() - self.pos).min(out.len());
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        return Ok(n);
      }
      match self.rx.recv() {
        Ok(Ok(entry)) => {
          self.buf.clear();
          self.pos = 0;
          write_hash_entry(&mut self.buf, &entry)?;
        }
        Ok(Err(e)) => return Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())),
        Err(_) => return Ok(0),
      }
    }
  }
}

fn split_url(url: &str) -> (String, HashMap<String, String>) {
  match url.split_once('?') {
    Some((path, query)) => (
      path.to_string(),
      url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect(),
    ),
    None => (url.to_string(), HashMap::new()),
  }
}
