//! Bounded slot pool with a minimum hold time.
//!
//! A [`RatePool`] caps the number of simultaneous operations against a
//! shared upstream and, after each successful operation, keeps the slot
//! occupied for a cool-down interval before handing it to the next caller.
//! With capacity `N` and hold `H` this bounds both concurrency and the
//! request rate (at most `N` successful requests per `H`).
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use linkscribe_core::pool::{PoolConfig, RatePool};
//!
//! # async fn run() -> Result<(), linkscribe_core::AppError> {
//! let pool = RatePool::new(PoolConfig::new(3).with_hold(Duration::from_secs(2)));
//! let body = pool.run(async { Ok::<_, linkscribe_core::AppError>("text") }).await?;
//! # let _ = body;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::AppError;

/// Configuration for a [`RatePool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of slots held at once.
    pub capacity: usize,

    /// How long a slot stays occupied after a successful operation.
    pub hold: Duration,
}

impl PoolConfig {
    /// Create a config with the given capacity and no hold.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            hold: Duration::ZERO,
        }
    }

    pub fn with_hold(mut self, hold: Duration) -> Self {
        self.hold = hold;
        self
    }
}

impl Default for PoolConfig {
    /// Three slots, two-second cool-down.
    fn default() -> Self {
        Self {
            capacity: 3,
            hold: Duration::from_secs(2),
        }
    }
}

/// Semaphore-backed pool shared by every clone.
#[derive(Debug, Clone)]
pub struct RatePool {
    semaphore: Arc<Semaphore>,
    config: PoolConfig,
}

impl RatePool {
    pub fn new(config: PoolConfig) -> Self {
        let config = PoolConfig {
            capacity: config.capacity.max(1),
            ..config
        };
        Self {
            semaphore: Arc::new(Semaphore::new(config.capacity)),
            config,
        }
    }

    pub fn config(&self) -> PoolConfig {
        self.config
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> Result<PoolSlot, AppError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| AppError::Cancelled)?;

        Ok(PoolSlot {
            permit,
            hold: self.config.hold,
        })
    }

    /// Run `operation` inside a slot.
    ///
    /// On success the slot is held for the cool-down before this returns;
    /// on failure it is released immediately.
    pub async fn run<T, Fut>(&self, operation: Fut) -> Result<T, AppError>
    where
        Fut: Future<Output = Result<T, AppError>>,
    {
        let slot = self.acquire().await?;
        let result = operation.await;
        if result.is_ok() {
            slot.release().await;
        }
        result
    }
}

/// An occupied pool slot. Dropping it frees the slot at once;
/// [`release`](Self::release) frees it after the configured hold.
#[derive(Debug)]
pub struct PoolSlot {
    permit: OwnedSemaphorePermit,
    hold: Duration,
}

impl PoolSlot {
    pub async fn release(self) {
        if !self.hold.is_zero() {
            tracing::debug!(hold_ms = %self.hold.as_millis(), "Holding pool slot");
            tokio::time::sleep(self.hold).await;
        }
        drop(self.permit);
    }
}
