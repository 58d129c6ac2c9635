use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver};

use crate::error::{PdiffError, Result};

/// Shared cancellation flag, cheaply cloned and checked from any worker
/// without holding a lock across a blocking call.
#[derive(Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
  pub fn new() -> Self {
    Self(Arc::new(AtomicBool::new(false)))
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

impl Default for CancelToken {
  fn default() -> Self {
    Self::new()
  }
}

/// Work pool. Distributes a finite stream of tasks across
/// `concurrency` real OS threads (a `rayon` thread pool, so CPU-bound
/// hashing never serializes behind a single core or a single event loop)
/// and streams back `(task, result)` pairs in *completion* order, not
/// input order. Consumers that need offset order re-sort downstream.
pub struct WorkPool {
  pool: rayon::ThreadPool,
}

impl WorkPool {
  pub fn new(concurrency: usize) -> Result<Self> {
    let pool = rayon::ThreadPoolBuilder::new()
      .num_threads(concurrency.max(1))
      .thread_name(|i| format!("pdiffcopy-worker-{}", i))
      .build()
      .map_err(|e| crate::error::PdiffError::Protocol(format!("failed to start worker pool: {}", e)))?;
    Ok(Self { pool })
  }

  /// Run `f` over every element of `tasks`. The channel yields one entry
  /// per task that completed before a failure or cancellation stopped
  /// dispatch. On the first worker error, no further tasks are dispatched,
  /// the error is sent as the final entry, and the channel then closes.
  /// If dispatch stops short of every task without any worker having
  /// failed, the run was cut short by external cancellation: once every
  /// already-spawned task has been allowed to finish, a final
  /// `Err(PdiffError::Cancelled)` is sent so callers never mistake a
  /// cancelled run for a clean, merely-short one.
  pub fn run<T, R, F>(&self, tasks: Vec<T>, f: F, cancel: CancelToken) -> Receiver<Result<(T, R)>>
  where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(&T) -> Result<R> + Send + Sync + 'static,
  {
    let capacity = self.pool.current_num_threads() * 2 + 1;
    let (tx, rx) = bounded(capacity);
    let f = Arc::new(f);
    let failed = Arc::new(AtomicBool::new(false));
    let total = tasks.len();
    let completed = Arc::new(AtomicUsize::new(0));

    self.pool.spawn(move || {
      rayon::scope(|scope| {
        for task in tasks {
          if cancel.is_cancelled() || failed.load(Ordering::SeqCst) {
            break;
          }
          let f = f.clone();
          let tx = tx.clone();
          let cancel = cancel.clone();
          let failed = failed.clone();
          let completed = completed.clone();
          scope.spawn(move |_| {
            if cancel.is_cancelled() || failed.load(Ordering::SeqCst) {
              return;
            }
            match f(&task) {
              Ok(result) => {
                completed.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send(Ok((task, result)));
              }
              Err(e) => {
                if !failed.swap(true, Ordering::SeqCst) {
                  cancel.cancel();
                  let _ = tx.send(Err(e));
                }
              }
            }
          });
        }
      });

      if !failed.load(Ordering::SeqCst) && completed.load(Ordering::SeqCst) < total {
        let _ = tx.send(Err(PdiffError::Cancelled));
      }
    });

    rx
  }

  pub fn concurrency(&self) -> usize {
    self.pool.current_num_threads()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::PdiffError;
  use std::collections::HashSet;

  #[test]
  fn runs_every_task_exactly_once() {
    let pool = WorkPool::new(4).unwrap();
    let tasks: Vec<u32> = (0..200).collect();
    let rx = pool.run(tasks, |t: &u32| Ok(*t * 2), CancelToken::new());

    let mut seen = HashSet::new();
    for item in rx.iter() {
      let (task, result) = item.unwrap();
      assert_eq!(result, task * 2);
      assert!(seen.insert(task));
    }
    assert_eq!(seen.len(), 200);
  }

  #[test]
  fn concurrency_one_is_correct() {
    let pool = WorkPool::new(1).unwrap();
    let tasks: Vec<u32> = (0..20).collect();
    let rx = pool.run(tasks, |t: &u32| Ok(*t + 1), CancelToken::new());
    let results: Vec<_> = rx.iter().map(|r| r.unwrap().1).collect();
    assert_eq!(results.len(), 20);
  }

  #[test]
  fn first_failure_is_propagated_and_stops_the_rest() {
    let pool = WorkPool::new(2).unwrap();
    let tasks: Vec<u32> = (0..1000).collect();
    let rx = pool.run(
      tasks,
      |t: &u32| {
        if *t == 5 {
          Err(PdiffError::Protocol("boom".to_string()))
        } else {
          std::thread::sleep(std::time::Duration::from_millis(1));
          Ok(*t)
        }
      },
      CancelToken::new(),
    );

    let items: Vec<_> = rx.iter().collect();
    assert!(items.iter().any(|r| r.is_err()));
    // Not all 1000 tasks ran to completion - the pool stopped dispatching.
    assert!(items.len() < 1000);
  }

  #[test]
  fn external_cancellation_surfaces_as_cancelled_error() {
    let pool = WorkPool::new(2).unwrap();
    let cancel = CancelToken::new();
    let cancel_for_worker = cancel.clone();
    let tasks: Vec<u32> = (0..1000).collect();
    let rx = pool.run(
      tasks,
      move |t: &u32| {
        if *t == 3 {
          cancel_for_worker.cancel();
        }
        std::thread::sleep(std::time::Duration::from_millis(1));
        Ok(*t)
      },
      cancel,
    );

    let items: Vec<_> = rx.iter().collect();
    assert!(items.len() < 1000);
    assert!(matches!(items.last(), Some(Err(PdiffError::Cancelled))));
  }
}
