use super::{PoolError, ProcessPool};
use parking_lot::Mutex;
use std::sync::{Arc, Barrier};
use std::thread;
use tracing::{debug, trace};

/// Rendezvous point shared by every worker of a [`LocalPool`].
///
/// Each collective is bracketed by two barrier waits. Workers publish their contribution
/// before the first wait and read the others' between the two, so a worker can never
/// overwrite a slot that another worker is still reading.
#[derive(Debug)]
struct Hub {
    size: usize,
    groups: usize,
    barrier: Barrier,
    bytes: Mutex<Vec<u8>>,
    contributions: Mutex<Vec<Vec<f64>>>,
    flags: Mutex<Vec<bool>>,
}

impl Hub {
    fn new(size: usize, groups: usize) -> Self {
        Self {
            size,
            groups,
            barrier: Barrier::new(size),
            bytes: Mutex::new(Vec::new()),
            contributions: Mutex::new(vec![Vec::new(); size]),
            flags: Mutex::new(vec![true; size]),
        }
    }

    #[inline]
    fn wait(&self) {
        self.barrier.wait();
    }
}

/// Handle of one worker in a pool of in-process workers.
///
/// Reductions accumulate contributions in rank order, so results are bit-identical on
/// every worker and independent of thread scheduling.
#[derive(Debug, Clone)]
pub struct LocalPool {
    rank: usize,
    hub: Arc<Hub>,
}

impl LocalPool {
    /// Creates the handles of a pool of `n` workers in a single group, ordered by rank.
    pub fn create(n: usize) -> Result<Vec<LocalPool>, PoolError> {
        Self::create_grouped(n, 1)
    }

    /// Creates the handles of a pool of `n` workers split into `groups` process groups.
    pub fn create_grouped(n: usize, groups: usize) -> Result<Vec<LocalPool>, PoolError> {
        if n == 0 {
            return Err(PoolError::Empty);
        }
        if groups == 0 || groups > n {
            return Err(PoolError::InvalidGroups { groups, size: n });
        }
        let hub = Arc::new(Hub::new(n, groups));
        Ok((0..n)
            .map(|rank| LocalPool {
                rank,
                hub: Arc::clone(&hub),
            })
            .collect())
    }

    /// Runs `f` on `n` scoped worker threads and collects their results by rank.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Empty`] for `n == 0` and [`PoolError::Broken`] if a worker panics.
    /// A worker that panics while others wait inside a collective leaves them blocked.
    pub fn run<F, R>(n: usize, f: F) -> Result<Vec<R>, PoolError>
    where
        F: Fn(LocalPool) -> R + Sync,
        R: Send,
    {
        Self::run_grouped(n, 1, f)
    }

    /// As [`LocalPool::run`], with the workers split into `groups` process groups.
    ///
    /// # Errors
    ///
    /// Additionally returns [`PoolError::InvalidGroups`] unless `1 <= groups <= n`.
    pub fn run_grouped<F, R>(n: usize, groups: usize, f: F) -> Result<Vec<R>, PoolError>
    where
        F: Fn(LocalPool) -> R + Sync,
        R: Send,
    {
        let pools = Self::create_grouped(n, groups)?;
        debug!(workers = n, groups, "Starting local process pool.");
        let f = &f;

        thread::scope(|scope| {
            let handles: Vec<_> = pools
                .into_iter()
                .map(|pool| {
                    let rank = pool.rank;
                    (rank, scope.spawn(move || f(pool)))
                })
                .collect();

            handles
                .into_iter()
                .map(|(rank, handle)| {
                    handle
                        .join()
                        .map_err(|_| PoolError::Broken(format!("worker {} panicked", rank)))
                })
                .collect()
        })
    }

    /// Publishes this worker's contribution and returns every contribution after the
    /// first rendezvous. The caller must call `finish` once done reading.
    fn exchange(&self, local: &[f64]) -> Vec<Vec<f64>> {
        self.hub.contributions.lock()[self.rank] = local.to_vec();
        self.hub.wait();
        self.hub.contributions.lock().clone()
    }

    #[inline]
    fn finish(&self) {
        self.hub.wait();
    }

    fn reduce(contributions: &[Vec<f64>], values: &mut [f64]) -> Result<(), PoolError> {
        if contributions.iter().any(|c| c.len() != values.len()) {
            return Err(PoolError::SizeMismatch { operation: "sum" });
        }
        values.iter_mut().for_each(|v| *v = 0.0);
        for contribution in contributions {
            for (total, value) in values.iter_mut().zip(contribution) {
                *total += value;
            }
        }
        Ok(())
    }
}

impl ProcessPool for LocalPool {
    fn n_processes(&self) -> usize {
        self.hub.size
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn n_groups(&self) -> usize {
        self.hub.groups
    }

    fn broadcast_bytes(&self, data: &mut Vec<u8>, root: usize) -> Result<(), PoolError> {
        self.check_root(root)?;
        if self.is_root(root) {
            *self.hub.bytes.lock() = data.clone();
        }
        self.hub.wait();
        if !self.is_root(root) {
            data.clone_from(&self.hub.bytes.lock());
        }
        trace!(rank = self.rank, root, len = data.len(), "Broadcast bytes.");
        self.finish();
        Ok(())
    }

    fn sum(&self, values: &mut [f64], root: usize) -> Result<(), PoolError> {
        self.check_root(root)?;
        let contributions = self.exchange(values);
        self.finish();
        if self.is_root(root) {
            Self::reduce(&contributions, values)
        } else if contributions.iter().any(|c| c.len() != values.len()) {
            Err(PoolError::SizeMismatch { operation: "sum" })
        } else {
            Ok(())
        }
    }

    fn all_sum(&self, values: &mut [f64]) -> Result<(), PoolError> {
        let contributions = self.exchange(values);
        self.finish();
        Self::reduce(&contributions, values)
    }

    fn all_gather(&self, local: &[f64]) -> Result<Vec<Vec<f64>>, PoolError> {
        let contributions = self.exchange(local);
        self.finish();
        Ok(contributions)
    }

    fn all_true(&self, flag: bool) -> Result<bool, PoolError> {
        self.hub.flags.lock()[self.rank] = flag;
        self.hub.wait();
        let result = self.hub.flags.lock().iter().all(|&f| f);
        self.finish();
        Ok(result)
    }

    fn barrier(&self) -> Result<(), PoolError> {
        self.hub.wait();
        Ok(())
    }
}
