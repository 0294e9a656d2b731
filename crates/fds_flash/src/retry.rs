//! Retry wrapper for flash drivers.

use crate::driver::{FlashDriver, FlashGeometry, FlashOp};
use crate::error::{FlashError, FlashResult};
use tracing::{debug, warn};

/// A driver wrapper that re-issues failed operations.
///
/// Each operation gets `retries` additional attempts after the first one.
/// A retryable failure ([`FlashError::is_retryable`]) reported by the inner
/// driver is swallowed and the same operation is started again; once the
/// budget is spent the failure surfaces as [`FlashError::Timeout`].
/// Non-retryable errors pass through unchanged.
///
/// The wrapper keeps a copy of the in-flight operation so it can be replayed.
#[derive(Debug)]
pub struct RetryFlash<F> {
    inner: F,
    retries: u32,
    current: Option<FlashOp>,
    attempts: u32,
}

impl<F: FlashDriver> RetryFlash<F> {
    /// Default number of retries per operation.
    pub const DEFAULT_RETRIES: u32 = 3;

    /// Wraps a driver with a retry budget.
    #[must_use]
    pub fn new(inner: F, retries: u32) -> Self {
        Self {
            inner,
            retries,
            current: None,
            attempts: 0,
        }
    }

    /// Returns the wrapped driver.
    pub fn inner(&self) -> &F {
        &self.inner
    }

    /// Returns the wrapped driver for modification.
    pub fn inner_mut(&mut self) -> &mut F {
        &mut self.inner
    }

    /// Unwraps the driver.
    pub fn into_inner(self) -> F {
        self.inner
    }

    fn issue(&mut self, op: &FlashOp) -> FlashResult<()> {
        match op {
            FlashOp::Write { address, words } => self.inner.start_write(*address, words),
            FlashOp::Erase { address, pages } => self.inner.start_erase(*address, *pages),
        }
    }

    /// Starts `op`, retrying synchronous rejections within the budget.
    fn start(&mut self, op: FlashOp) -> FlashResult<()> {
        if self.current.is_some() {
            return Err(FlashError::Busy);
        }
        self.attempts = 0;
        loop {
            match self.issue(&op) {
                Ok(()) => {
                    self.current = Some(op);
                    return Ok(());
                }
                Err(err) if err.is_retryable() && self.attempts < self.retries => {
                    self.attempts += 1;
                    debug!(attempt = self.attempts, %err, "flash start rejected, retrying");
                }
                Err(err) if err.is_retryable() => return Err(FlashError::Timeout),
                Err(err) => return Err(err),
            }
        }
    }
}

impl<F: FlashDriver> FlashDriver for RetryFlash<F> {
    fn geometry(&self) -> FlashGeometry {
        self.inner.geometry()
    }

    fn read(&self, address: u32, out: &mut [u32]) -> FlashResult<()> {
        self.inner.read(address, out)
    }

    fn start_write(&mut self, address: u32, words: &[u32]) -> FlashResult<()> {
        self.start(FlashOp::Write {
            address,
            words: words.to_vec(),
        })
    }

    fn start_erase(&mut self, address: u32, pages: u32) -> FlashResult<()> {
        self.start(FlashOp::Erase { address, pages })
    }

    fn poll(&mut self) -> Option<FlashResult<()>> {
        let outcome = self.inner.poll()?;
        let Some(op) = self.current.take() else {
            return Some(outcome);
        };

        match outcome {
            Ok(()) => Some(Ok(())),
            Err(err) if err.is_retryable() && self.attempts < self.retries => {
                self.attempts += 1;
                warn!(attempt = self.attempts, %err, "flash operation failed, retrying");
                match self.issue(&op) {
                    Ok(()) => {
                        self.current = Some(op);
                        None
                    }
                    Err(err) if err.is_retryable() => Some(Err(FlashError::Timeout)),
                    Err(err) => Some(Err(err)),
                }
            }
            Err(err) if err.is_retryable() => {
                warn!(%err, "flash retry budget exhausted");
                Some(Err(FlashError::Timeout))
            }
            Err(err) => Some(Err(err)),
        }
    }

    fn is_busy(&self) -> bool {
        self.current.is_some() || self.inner.is_busy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FlashGeometry, SimFlash};

    fn retry(retries: u32) -> RetryFlash<SimFlash> {
        RetryFlash::new(SimFlash::new(FlashGeometry::new(0, 16, 2)), retries)
    }

    #[test]
    fn retry_recovers_from_transient_failure() {
        let mut flash = retry(2);
        flash.inner_mut().faults_mut().fail_next = 2;

        flash.start_write(0, &[42]).unwrap();
        assert_eq!(flash.poll(), None);
        assert_eq!(flash.poll(), None);
        assert_eq!(flash.poll(), Some(Ok(())));
        assert_eq!(flash.read_word(0).unwrap(), 42);
        assert!(!flash.is_busy());
    }

    #[test]
    fn retry_budget_exhausted_is_timeout() {
        let mut flash = retry(1);
        flash.inner_mut().faults_mut().fail_next = 5;

        flash.start_erase(0, 1).unwrap();
        assert_eq!(flash.poll(), None);
        assert_eq!(flash.poll(), Some(Err(FlashError::Timeout)));
        assert!(!flash.is_busy());
    }

    #[test]
    fn retry_busy_start() {
        let mut flash = retry(3);
        flash.inner_mut().faults_mut().busy_next = 2;
        assert!(flash.start_write(0, &[1]).is_ok());

        let mut flash = retry(1);
        flash.inner_mut().faults_mut().busy_next = 2;
        assert_eq!(flash.start_write(0, &[1]), Err(FlashError::Timeout));
    }

    #[test]
    fn retry_passes_through_fatal_errors() {
        let mut flash = retry(3);
        flash.inner_mut().cut_power_after(0);
        flash.start_write(0, &[1]).unwrap();
        assert_eq!(flash.poll(), Some(Err(FlashError::PowerLost)));
        assert_eq!(flash.start_write(0, &[1]), Err(FlashError::PowerLost));
    }
}
