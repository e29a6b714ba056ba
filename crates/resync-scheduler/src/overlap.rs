//! Skip-on-overlap guard for scheduled jobs.
//!
//! A cron tick that fires while the previous run of the same job is still
//! going is skipped rather than queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Tracks whether a scheduled job is currently executing.
#[derive(Default)]
pub struct OverlapGuard {
    is_running: Arc<AtomicBool>,
}

impl OverlapGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the job running, or return `None` if it already is.
    pub fn try_acquire(&self) -> Option<RunGuard> {
        self.is_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunGuard {
                flag: self.is_running.clone(),
            })
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }
}

/// Clears the running flag when dropped, including on panic.
pub struct RunGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_second_acquire_skipped_while_held() {
        let guard = OverlapGuard::new();

        let run1 = guard.try_acquire();
        assert!(run1.is_some());
        assert!(guard.is_running());
        assert!(guard.try_acquire().is_none());

        drop(run1);
        assert!(!guard.is_running());
        assert!(guard.try_acquire().is_some());
    }

    #[test]
    fn test_at_most_one_holder_across_threads() {
        let guard = Arc::new(OverlapGuard::new());
        let holders = Arc::new(AtomicU32::new(0));
        let max_holders = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = guard.clone();
                let holders = holders.clone();
                let max_holders = max_holders.clone();
                thread::spawn(move || {
                    if let Some(_run) = guard.try_acquire() {
                        let now = holders.fetch_add(1, Ordering::SeqCst) + 1;
                        max_holders.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(5));
                        holders.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_holders.load(Ordering::SeqCst), 1);
        assert!(!guard.is_running());
    }
}
