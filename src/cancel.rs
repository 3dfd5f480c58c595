use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Result, SplitError};

const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Cooperative cancellation shared by every worker of one request.
///
/// `cancel()` flips a flag; workers check it before each network call and
/// while sleeping. Calls already in flight run to completion.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(SplitError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep for `duration`, waking early with `Cancelled` if the token fires.
    pub fn sleep(&self, duration: Duration) -> Result<()> {
        let deadline = Instant::now() + duration;
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }

    /// Cancel automatically once `timeout` has elapsed.
    pub fn cancel_after(&self, timeout: Duration) {
        let token = self.clone();
        thread::spawn(move || {
            thread::sleep(timeout);
            if !token.is_cancelled() {
                log::warn!("Request deadline of {:?} reached, cancelling", timeout);
                token.cancel();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_visible_to_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(clone.check().is_ok());
        token.cancel();
        assert!(clone.is_cancelled());
        assert!(matches!(clone.check(), Err(SplitError::Cancelled)));
    }

    #[test]
    fn test_sleep_wakes_on_cancel() {
        let token = CancellationToken::new();
        token.cancel_after(Duration::from_millis(20));
        let started = Instant::now();
        let result = token.sleep(Duration::from_secs(10));
        assert!(matches!(result, Err(SplitError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_sleep_completes_without_cancel() {
        let token = CancellationToken::new();
        assert!(token.sleep(Duration::from_millis(10)).is_ok());
    }
}
