use std::str::FromStr;

use anyhow::{anyhow, bail, Result};
use structopt::StructOpt;

use pdiffcopy::cli::Opt;
use pdiffcopy::driver::run_transfer;
use pdiffcopy::location::Endpoints;
use pdiffcopy::params::{HashMethod, TransferParams};
use pdiffcopy::server::PdiffServer;
use pdiffcopy::signals;
use pdiffcopy::workpool::CancelToken;

fn main() -> Result<()> {
  let opt = Opt::from_args();
  if std::env::var("RUST_LOG").is_err() {
    std::env::set_var("RUST_LOG", opt.log_filter());
  }
  pretty_env_logger::init_timed();

  let result = match (&opt.source, &opt.target) {
    (None, None) => run_server(&opt),
    (Some(source), Some(target)) => run_client(&opt, source, target),
    _ => bail!("expected either no positional arguments (server mode) or both SOURCE and TARGET"),
  };
  if let Err(e) = &result {
    log::error!("{}", e);
  }
  result
}

fn run_server(opt: &Opt) -> Result<()> {
  let listen = opt
    .listen
    .clone()
    .ok_or_else(|| anyhow!("--listen is required when no SOURCE/TARGET is given"))?;
  let server = PdiffServer::new(listen);
  server.serve()?;
  Ok(())
}

fn run_client(opt: &Opt, source: &str, target: &str) -> Result<()> {
  if opt.block_size == 0 {
    bail!("--block-size must be positive");
  }
  let endpoints = Endpoints::parse(source, target)?;
  let hash_method = HashMethod::from_str(&opt.hash_method)?;
  let params = TransferParams {
    block_size: opt.block_size,
    hash_method,
    concurrency: opt.concurrency.max(1),
    whole_file: opt.whole_file,
    dry_run: opt.dry_run,
  };

  let cancel = CancelToken::new();
  signals::install(cancel.clone());

  let summary = run_transfer(endpoints, params, cancel)?;
  println!("{}", summary);
  Ok(())
}
