use crate::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Raised when a prefilter pass has finished and its sorted order is ready
/// for hash verification. Reset at the start of every ingest.
#[derive(Debug, Clone, Default)]
pub struct PrefilterSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl PrefilterSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self) {
        let (lock, _) = &*self.inner;
        if let Ok(mut ready) = lock.lock() {
            *ready = false;
        }
    }

    pub fn complete(&self) {
        let (lock, cvar) = &*self.inner;
        if let Ok(mut ready) = lock.lock() {
            *ready = true;
            cvar.notify_all();
        }
    }

    pub fn is_complete(&self) -> bool {
        let (lock, _) = &*self.inner;
        lock.lock().map(|ready| *ready).unwrap_or(false)
    }

    /// Block until the prefilter completes, retrying `attempts` times with a
    /// fixed `backoff` per attempt.
    pub fn wait(&self, attempts: u32, backoff: Duration) -> Result<(), Error> {
        let (lock, cvar) = &*self.inner;
        let mut ready = lock.lock()?;
        let mut attempt = 0;

        while !*ready {
            if attempt >= attempts {
                return Err(Error::PrefilterTimeout { attempts });
            }
            warn!(
                attempt = attempt + 1,
                max_attempts = attempts,
                "Prefilter not complete, waiting {}ms",
                backoff.as_millis()
            );
            let (guard, _) = cvar.wait_timeout(ready, backoff)?;
            ready = guard;
            attempt += 1;
        }

        debug!("Prefilter complete after {} wait attempts", attempt);
        Ok(())
    }
}

/// Cooperative cancellation for an in-flight verification pass.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
