use signal_hook::consts::signal::*;
use signal_hook::iterator::Signals;

use crate::workpool::CancelToken;

/// Installs a background thread that turns SIGINT/SIGTERM into a
/// cancellation flag plumbed into the transfer driver, rather than an
/// abrupt `process::exit`. The caller is responsible for draining the
/// work pool after `cancel()` is observed; this only flips the flag.
pub fn install(cancel: CancelToken) {
  let mut signals = match Signals::new([SIGINT, SIGTERM]) {
    Ok(s) => s,
    Err(e) => {
      log::warn!("could not install signal handler: {}", e);
      return;
    }
  };
  std::thread::spawn(move || {
    for sig in &mut signals {
      log::info!("received signal {}, cancelling transfer", sig);
      cancel.cancel();
    }
  });
}
