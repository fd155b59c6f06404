use super::{PoolError, ProcessPool};

/// Pool of exactly one worker. Collectives are local and the only valid root is zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialPool;

impl SerialPool {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessPool for SerialPool {
    fn n_processes(&self) -> usize {
        1
    }

    fn rank(&self) -> usize {
        0
    }

    fn broadcast_bytes(&self, _data: &mut Vec<u8>, root: usize) -> Result<(), PoolError> {
        self.check_root(root)
    }

    fn sum(&self, _values: &mut [f64], root: usize) -> Result<(), PoolError> {
        self.check_root(root)
    }

    fn all_sum(&self, _values: &mut [f64]) -> Result<(), PoolError> {
        Ok(())
    }

    fn all_gather(&self, local: &[f64]) -> Result<Vec<Vec<f64>>, PoolError> {
        Ok(vec![local.to_vec()])
    }

    fn all_true(&self, flag: bool) -> Result<bool, PoolError> {
        Ok(flag)
    }

    fn barrier(&self) -> Result<(), PoolError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pool::DivisionStrategy;

    #[test]
    fn serial_pool_collectives_leave_values_untouched() {
        let pool = SerialPool::new();
        let mut values = [1.0, 2.0];
        pool.all_sum(&mut values).unwrap();
        pool.sum(&mut values, 0).unwrap();
        assert_eq!(values, [1.0, 2.0]);
        assert!(pool.all_true(true).unwrap());
        assert!(!pool.all_true(false).unwrap());
        assert_eq!(pool.all_gather(&[4.0]).unwrap(), vec![vec![4.0]]);
    }

    #[test]
    fn serial_pool_only_accepts_root_zero() {
        let pool = SerialPool::new();
        let mut bytes = vec![1, 2, 3];
        assert!(pool.broadcast_bytes(&mut bytes, 0).is_ok());
        assert!(matches!(
            pool.broadcast_bytes(&mut bytes, 1),
            Err(PoolError::InvalidRoot { root: 1, size: 1 })
        ));
        assert_eq!(
            pool.interleaved_loop(3, DivisionStrategy::Groups)
                .collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }
}
