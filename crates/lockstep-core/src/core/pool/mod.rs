//! # Process Pool Module
//!
//! A fixed, ordered group of cooperating workers and the collective operations they use to
//! stay in lock-step. Every worker must reach every collective with a matching call or the
//! pool deadlocks; this is a contract of the caller and is not enforced.
//!
//! Mismatches that are observable after a rendezvous (payload lengths, invalid root ranks,
//! a worker failing to decode a payload) are reported on every worker, so that all workers
//! leave the collective with the same outcome.
//!
//! ## Implementations
//!
//! - [`serial::SerialPool`] - A single worker; every collective is a local no-op
//! - [`local::LocalPool`] - In-process workers on scoped threads sharing a rendezvous hub
//!
//! ## Division of work
//!
//! Workers are split into contiguous process groups. Distributed loops take their share
//! with [`ProcessPool::interleaved_loop`] and combine partial results with
//! [`ProcessPool::all_sum_by`], both under the same [`DivisionStrategy`].

pub mod local;
pub mod serial;
pub mod strategy;

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::iter::StepBy;
use std::ops::Range;
use thiserror::Error;

pub use local::LocalPool;
pub use serial::SerialPool;
pub use strategy::DivisionStrategy;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Root rank {root} is invalid for a pool of {size} processes")]
    InvalidRoot { root: usize, size: usize },
    #[error("Payload size disagreement between workers during '{operation}'")]
    SizeMismatch { operation: &'static str },
    #[error("Failed to encode or decode a broadcast payload: {0}")]
    Codec(#[from] bincode::Error),
    #[error("Collective '{operation}' failed on another worker")]
    RemoteFailure { operation: &'static str },
    #[error("Process pool is broken: {0}")]
    Broken(String),
    #[error("A process pool needs at least one worker")]
    Empty,
    #[error("Cannot split a pool of {size} processes into {groups} groups")]
    InvalidGroups { groups: usize, size: usize },
}

/// Collective operations shared by every worker in a pool.
pub trait ProcessPool: Send + Sync {
    /// Number of workers in the pool.
    fn n_processes(&self) -> usize;

    /// Rank of this worker, in `0..n_processes()`.
    fn rank(&self) -> usize;

    fn is_root(&self, root: usize) -> bool {
        self.rank() == root
    }

    /// Whether this worker is rank zero, the conventional reporting rank.
    fn is_master(&self) -> bool {
        self.rank() == 0
    }

    fn check_root(&self, root: usize) -> Result<(), PoolError> {
        if root < self.n_processes() {
            Ok(())
        } else {
            Err(PoolError::InvalidRoot {
                root,
                size: self.n_processes(),
            })
        }
    }

    /// Replaces `data` on every worker with the root's bytes.
    fn broadcast_bytes(&self, data: &mut Vec<u8>, root: usize) -> Result<(), PoolError>;

    /// Element-wise sum of `values` across workers, stored on the root only.
    fn sum(&self, values: &mut [f64], root: usize) -> Result<(), PoolError>;

    /// Element-wise sum of `values` across workers, stored on every worker.
    fn all_sum(&self, values: &mut [f64]) -> Result<(), PoolError>;

    /// Gathers every worker's slice onto every worker, ordered by rank.
    fn all_gather(&self, local: &[f64]) -> Result<Vec<Vec<f64>>, PoolError>;

    /// Logical AND of `flag` across workers.
    fn all_true(&self, flag: bool) -> Result<bool, PoolError>;

    fn barrier(&self) -> Result<(), PoolError>;

    /// Number of process groups the pool is split into.
    fn n_groups(&self) -> usize {
        1
    }

    /// Ranks belonging to `group`.
    fn group_ranks(&self, group: usize) -> Range<usize> {
        strategy::group_ranks(self.n_processes(), self.n_groups(), group)
    }

    /// Group holding this worker.
    fn group_index(&self) -> usize {
        strategy::group_of(self.n_processes(), self.n_groups(), self.rank())
    }

    /// Rank of this worker within its group.
    fn group_rank(&self) -> usize {
        self.rank() - self.group_ranks(self.group_index()).start
    }

    fn is_group_leader(&self) -> bool {
        self.group_rank() == 0
    }

    /// Number of shares a loop is divided into under `strategy`.
    fn strategy_divisions(&self, strategy: DivisionStrategy) -> usize {
        match strategy {
            DivisionStrategy::Groups => self.n_groups(),
            DivisionStrategy::GroupProcesses => self.group_ranks(self.group_index()).len(),
            DivisionStrategy::Pool => self.n_processes(),
            DivisionStrategy::PoolProcesses => 1,
        }
    }

    /// Which of those shares belongs to this worker.
    fn strategy_index(&self, strategy: DivisionStrategy) -> usize {
        match strategy {
            DivisionStrategy::Groups => self.group_index(),
            DivisionStrategy::GroupProcesses => self.group_rank(),
            DivisionStrategy::Pool => self.rank(),
            DivisionStrategy::PoolProcesses => 0,
        }
    }

    /// Indices `0..n` assigned to this worker under `strategy`, interleaved across shares.
    fn interleaved_loop(&self, n: usize, strategy: DivisionStrategy) -> StepBy<Range<usize>> {
        (self.strategy_index(strategy)..n).step_by(self.strategy_divisions(strategy).max(1))
    }

    /// Element-wise sum of the partial results of a loop divided with `strategy`, stored on
    /// every worker.
    ///
    /// `Groups` adds the group leaders' values, `GroupProcesses` the values of this worker's
    /// group and `Pool` every worker's values. `PoolProcesses` leaves `values` untouched.
    /// Every worker of the pool must call this, whatever the strategy.
    fn all_sum_by(&self, values: &mut [f64], strategy: DivisionStrategy) -> Result<(), PoolError> {
        let contributors = match strategy {
            DivisionStrategy::Pool => return self.all_sum(values),
            DivisionStrategy::PoolProcesses => return Ok(()),
            DivisionStrategy::Groups => (0..self.n_groups())
                .map(|group| self.group_ranks(group).start)
                .collect::<Vec<_>>(),
            DivisionStrategy::GroupProcesses => self.group_ranks(self.group_index()).collect(),
        };

        let gathered = self.all_gather(values)?;
        if gathered.iter().any(|c| c.len() != values.len()) {
            return Err(PoolError::SizeMismatch {
                operation: "all_sum_by",
            });
        }
        values.iter_mut().for_each(|v| *v = 0.0);
        for rank in contributors {
            for (total, value) in values.iter_mut().zip(&gathered[rank]) {
                *total += value;
            }
        }
        Ok(())
    }
}

/// Typed collectives layered over the byte-level [`ProcessPool`] operations.
pub trait PoolExt: ProcessPool {
    /// Broadcasts a serialisable value from the root.
    ///
    /// Encoding and decoding outcomes are agreed with [`ProcessPool::all_true`], so a
    /// failure on any worker fails the call on all of them.
    fn broadcast_value<T>(&self, value: &mut T, root: usize) -> Result<(), PoolError>
    where
        T: Serialize + DeserializeOwned,
    {
        self.check_root(root)?;
        let is_root = self.is_root(root);
        let (mut bytes, encoded) = if is_root {
            match bincode::serialize(value) {
                Ok(bytes) => (bytes, Ok(())),
                Err(e) => (Vec::new(), Err(PoolError::from(e))),
            }
        } else {
            (Vec::new(), Ok(()))
        };

        self.broadcast_bytes(&mut bytes, root)?;

        let outcome = if is_root {
            encoded
        } else {
            bincode::deserialize(&bytes)
                .map(|decoded| *value = decoded)
                .map_err(PoolError::from)
        };

        if self.all_true(outcome.is_ok())? {
            Ok(())
        } else {
            Err(outcome
                .err()
                .unwrap_or(PoolError::RemoteFailure {
                    operation: "broadcast_value",
                }))
        }
    }

    fn broadcast_f64(&self, value: &mut f64, root: usize) -> Result<(), PoolError> {
        self.broadcast_value(value, root)
    }

    fn broadcast_bool(&self, value: &mut bool, root: usize) -> Result<(), PoolError> {
        self.broadcast_value(value, root)
    }

    /// Takes the root's `decision` and returns it on every worker.
    fn decide(&self, root: usize, decision: bool) -> Result<bool, PoolError> {
        let mut decision = decision;
        self.broadcast_bool(&mut decision, root)?;
        Ok(decision)
    }
}

impl<P: ProcessPool + ?Sized> PoolExt for P {}
