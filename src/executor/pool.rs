//! Admission pools, one bounded semaphore per operation class.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::PoolConfig;
use crate::error::keys;

/// Class of backend operation. Each class has its own admission pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpClass {
    Search,
    Regex,
    Prefix,
}

impl OpClass {
    pub const ALL: [OpClass; 3] = [OpClass::Search, OpClass::Regex, OpClass::Prefix];

    pub fn as_str(&self) -> &'static str {
        match self {
            OpClass::Search => "search",
            OpClass::Regex => "regex",
            OpClass::Prefix => "prefix",
        }
    }

    /// Message key reported when this class has no free slot.
    pub fn too_busy_key(&self) -> &'static str {
        match self {
            OpClass::Regex => keys::REGEX_TOO_BUSY,
            OpClass::Search | OpClass::Prefix => keys::TOO_BUSY,
        }
    }

    /// Message key attached when this class returns partial results.
    pub fn timed_out_key(&self) -> &'static str {
        match self {
            OpClass::Regex => keys::REGEX_TIMED_OUT,
            OpClass::Search | OpClass::Prefix => keys::TIMED_OUT,
        }
    }

    fn index(&self) -> usize {
        match self {
            OpClass::Search => 0,
            OpClass::Regex => 1,
            OpClass::Prefix => 2,
        }
    }
}

/// A held admission slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct Admission {
    _permit: OwnedSemaphorePermit,
    pub waited: Duration,
}

/// Why a request was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejected {
    pub op: OpClass,
    pub waited: Duration,
}

/// Process-wide admission pools.
#[derive(Debug)]
pub struct AdmissionPools {
    pools: [Arc<Semaphore>; 3],
    capacity: [usize; 3],
    admission_wait: Duration,
}

impl AdmissionPools {
    pub fn new(config: &PoolConfig) -> Self {
        let capacity = OpClass::ALL.map(|op| config.permits(op));
        Self {
            pools: capacity.map(|permits| Arc::new(Semaphore::new(permits))),
            capacity,
            admission_wait: config.admission_wait,
        }
    }

    /// Wait up to the admission budget for a slot in the pool of `op`.
    pub async fn acquire(&self, op: OpClass) -> std::result::Result<Admission, Rejected> {
        let started = tokio::time::Instant::now();
        let semaphore = Arc::clone(&self.pools[op.index()]);
        let acquired = tokio::time::timeout(self.admission_wait, semaphore.acquire_owned()).await;
        let waited = started.elapsed();
        match acquired {
            Ok(Ok(permit)) => Ok(Admission {
                _permit: permit,
                waited,
            }),
            // Timed out, or the semaphore was closed.
            _ => Err(Rejected { op, waited }),
        }
    }

    /// Slots of `op` currently free.
    pub fn available(&self, op: OpClass) -> usize {
        self.pools[op.index()].available_permits()
    }

    /// Slots of `op` currently held.
    pub fn in_flight(&self, op: OpClass) -> usize {
        self.capacity[op.index()] - self.available(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pools(search: usize, regex: usize) -> AdmissionPools {
        AdmissionPools::new(&PoolConfig {
            search,
            regex,
            prefix: 1,
            admission_wait: Duration::from_millis(20),
        })
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let pools = pools(2, 1);
        let first = pools.acquire(OpClass::Search).await.unwrap();
        assert_eq!(pools.in_flight(OpClass::Search), 1);
        drop(first);
        assert_eq!(pools.available(OpClass::Search), 2);
    }

    #[tokio::test]
    async fn test_exhausted_pool_rejects_after_wait() {
        let pools = pools(2, 1);
        let _held = pools.acquire(OpClass::Regex).await.unwrap();
        let rejected = pools.acquire(OpClass::Regex).await.unwrap_err();
        assert_eq!(rejected.op, OpClass::Regex);
        assert!(rejected.waited >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_pools_are_independent() {
        let pools = pools(1, 1);
        let _regex = pools.acquire(OpClass::Regex).await.unwrap();
        assert!(pools.acquire(OpClass::Search).await.is_ok());
    }

    #[test]
    fn test_message_keys() {
        assert_eq!(OpClass::Regex.too_busy_key(), keys::REGEX_TOO_BUSY);
        assert_eq!(OpClass::Prefix.too_busy_key(), keys::TOO_BUSY);
        assert_eq!(OpClass::Regex.timed_out_key(), keys::REGEX_TIMED_OUT);
    }
}
