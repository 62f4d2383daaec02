// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Reference-counted access to a process-wide hardware accelerator.
//!
//! The first lease initialises the device context and the last lease to be
//! dropped tears it down. Engine state itself is never shared between tasks.

use std::sync::{Arc, Mutex, PoisonError};

use crate::errors::EngineError;
use crate::observability::messages::controller::AcceleratorHolders;
use crate::observability::messages::StructuredLog;

/// Device hooks run on the first acquire and the last release.
pub trait AcceleratorDriver: Send + Sync {
    fn init(&self) -> Result<(), EngineError>;

    fn deinit(&self);
}

/// Driver for hosts without an accelerator.
pub struct NoopAccelerator;

impl AcceleratorDriver for NoopAccelerator {
    fn init(&self) -> Result<(), EngineError> {
        Ok(())
    }

    fn deinit(&self) {}
}

#[derive(Clone)]
pub struct AcceleratorContext {
    inner: Arc<Inner>,
}

struct Inner {
    holders: Mutex<usize>,
    driver: Arc<dyn AcceleratorDriver>,
}

impl AcceleratorContext {
    pub fn new(driver: Arc<dyn AcceleratorDriver>) -> Self {
        Self {
            inner: Arc::new(Inner {
                holders: Mutex::new(0),
                driver,
            }),
        }
    }

    pub fn holders(&self) -> usize {
        *self.inner.holders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a lease, initialising the device if nobody holds one.
    pub fn acquire(&self) -> Result<AcceleratorLease, EngineError> {
        let mut holders = self.inner.holders.lock().unwrap_or_else(PoisonError::into_inner);
        if *holders == 0 {
            self.inner.driver.init()?;
        }
        *holders += 1;
        AcceleratorHolders {
            holders: *holders,
            acquired: true,
        }
        .log();
        Ok(AcceleratorLease {
            inner: self.inner.clone(),
        })
    }
}

impl Default for AcceleratorContext {
    fn default() -> Self {
        Self::new(Arc::new(NoopAccelerator))
    }
}

/// Released on drop.
pub struct AcceleratorLease {
    inner: Arc<Inner>,
}

impl Drop for AcceleratorLease {
    fn drop(&mut self) {
        let mut holders = self.inner.holders.lock().unwrap_or_else(PoisonError::into_inner);
        *holders = holders.saturating_sub(1);
        if *holders == 0 {
            self.inner.driver.deinit();
        }
        AcceleratorHolders {
            holders: *holders,
            acquired: false,
        }
        .log();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingDriver {
        inits: AtomicUsize,
        deinits: AtomicUsize,
        fail: bool,
    }

    impl AcceleratorDriver for CountingDriver {
        fn init(&self) -> Result<(), EngineError> {
            if self.fail {
                return Err(EngineError::Load("npu not present".to_string()));
            }
            self.inits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn deinit(&self) {
            self.deinits.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_init_on_first_and_deinit_on_last() {
        let driver = Arc::new(CountingDriver::default());
        let ctx = AcceleratorContext::new(driver.clone());

        let first = ctx.acquire().unwrap();
        let second = ctx.acquire().unwrap();
        assert_eq!(ctx.holders(), 2);
        assert_eq!(driver.inits.load(Ordering::SeqCst), 1);

        drop(first);
        assert_eq!(driver.deinits.load(Ordering::SeqCst), 0);
        drop(second);
        assert_eq!(ctx.holders(), 0);
        assert_eq!(driver.deinits.load(Ordering::SeqCst), 1);

        let _again = ctx.acquire().unwrap();
        assert_eq!(driver.inits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_init_takes_no_lease() {
        let driver = Arc::new(CountingDriver {
            fail: true,
            ..Default::default()
        });
        let ctx = AcceleratorContext::new(driver);

        assert!(ctx.acquire().is_err());
        assert_eq!(ctx.holders(), 0);
    }
}
