use structopt::StructOpt;

/// Command-line surface: thin argument parsing that feeds the transfer
/// and server driver functions through the options it carries.
#[derive(Debug, StructOpt)]
#[structopt(
  name = "pdiffcopy",
  about = "Parallel block-delta copy of one very large file between two hosts."
)]
pub struct Opt {
  /// Block size in bytes. Must be positive; a power of two is recommended.
  #[structopt(long, default_value = "1048576")]
  pub block_size: u64,

  /// Content digest algorithm both endpoints must recognize: blake3 or sha256.
  #[structopt(long, default_value = "blake3")]
  pub hash_method: String,

  /// Skip hashing; transfer every block unconditionally.
  #[structopt(long)]
  pub whole_file: bool,

  /// Maximum number of in-flight hash or block operations per side.
  #[structopt(long, default_value = "4")]
  pub concurrency: usize,

  /// Compute and report the diff, but never write.
  #[structopt(long)]
  pub dry_run: bool,

  /// Start in server mode, bound to this address (e.g. 0.0.0.0:9876).
  #[structopt(long)]
  pub listen: Option<String>,

  /// Increase log verbosity.
  #[structopt(short, long)]
  pub verbose: bool,

  /// Suppress all but error-level logging.
  #[structopt(short, long)]
  pub quiet: bool,

  /// Local path, or HOST:PORT/PATH for the remote endpoint.
  pub source: Option<String>,

  /// Local path, or HOST:PORT/PATH for the remote endpoint.
  pub target: Option<String>,
}

impl Opt {
  pub fn log_filter(&self) -> &'static str {
    if self.quiet {
      "error"
    } else if self.verbose {
      "debug"
    } else {
      "info"
    }
  }
}
