use std::path::PathBuf;

/// Either endpoint of a transfer. Exactly one of the two endpoints of a
/// transfer is `Local`; the other is `Remote` — that
/// invariant is checked by the caller (`Endpoints::parse`), not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileLocation {
  Local(PathBuf),
  Remote { host: String, port: u16, path: String },
}

impl FileLocation {
  /// Parse a CLI argument as `HOST:PORT/PATH` if it looks like one,
  /// otherwise treat it as a local filesystem path.
  pub fn parse(arg: &str) -> Self {
    if let Some(remote) = parse_remote(arg) {
      remote
    } else {
      FileLocation::Local(PathBuf::from(arg))
    }
  }

  pub fn is_remote(&self) -> bool {
    matches!(self, FileLocation::Remote { .. })
  }

  pub fn base_url(&self) -> Option<String> {
    match self {
      FileLocation::Remote { host, port, .. } => Some(format!("http://{}:{}", host, port)),
      FileLocation::Local(_) => None,
    }
  }
}

/// `HOST:PORT/PATH` — a bare host:port followed by an absolute-looking
/// path. Anything that doesn't parse as `host:port/path` with a numeric
/// port is not a remote location.
fn parse_remote(arg: &str) -> Option<FileLocation> {
  let (host_port, path) = arg.split_once('/')?;
  let (host, port) = host_port.split_once(':')?;
  if host.is_empty() {
    return None;
  }
  let port: u16 = port.parse().ok()?;
  Some(FileLocation::Remote {
    host: host.to_string(),
    port,
    path: format!("/{}", path),
  })
}

/// The two endpoints of a transfer, with the invariant enforced at parse
/// time: exactly one side is local.
pub struct Endpoints {
  pub source: FileLocation,
  pub target: FileLocation,
}

impl Endpoints {
  pub fn parse(source_arg: &str, target_arg: &str) -> anyhow::Result<Self> {
    let source = FileLocation::parse(source_arg);
    let target = FileLocation::parse(target_arg);
    if source.is_remote() == target.is_remote() {
      anyhow::bail!(
        "exactly one of SOURCE and TARGET must be a HOST:PORT/PATH remote location"
      );
    }
    Ok(Self { source, target })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_remote_location() {
    let loc = FileLocation::parse("example.com:9876/data/image.bin");
    assert_eq!(
      loc,
      FileLocation::Remote {
        host: "example.com".to_string(),
        port: 9876,
        path: "/data/image.bin".to_string(),
      }
    );
  }

  #[test]
  fn non_remote_is_local() {
    let loc = FileLocation::parse("/var/data/image.bin");
    assert_eq!(loc, FileLocation::Local(PathBuf::from("/var/data/image.bin")));
  }

  #[test]
  fn bad_port_falls_back_to_local() {
    let loc = FileLocation::parse("not-a-host:abc/path");
    assert!(matches!(loc, FileLocation::Local(_)));
  }

  #[test]
  fn endpoints_reject_two_locals() {
    assert!(Endpoints::parse("/a", "/b").is_err());
  }

  #[test]
  fn endpoints_reject_two_remotes() {
    assert!(Endpoints::parse("h:1/a", "h:2/b").is_err());
  }

  #[test]
  fn endpoints_accept_pull_shape() {
    let e = Endpoints::parse("h:1234/remote.img", "/local.img").unwrap();
    assert!(e.source.is_remote());
    assert!(!e.target.is_remote());
  }
}
