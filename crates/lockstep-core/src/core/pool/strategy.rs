use std::fmt;
use std::ops::Range;

/// How the iterations of a distributed loop are divided between the workers of a pool.
///
/// A pool is split into contiguous process groups. Work can be spread over the groups,
/// over the processes of this worker's group, over every process of the pool, or not at
/// all. A loop distributed with one strategy must be reduced with the same strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DivisionStrategy {
    /// One share per process group; every process of a group computes the same share.
    Groups,
    /// One share per process of this worker's group; each group covers the whole loop.
    GroupProcesses,
    /// One share per process of the pool.
    #[default]
    Pool,
    /// Every process runs the whole loop and nothing is reduced.
    PoolProcesses,
}

impl DivisionStrategy {
    /// Strategy for a loop nested inside one divided with `self`, if it can be divided further.
    pub fn subdivision(self) -> Option<DivisionStrategy> {
        match self {
            DivisionStrategy::Groups => Some(DivisionStrategy::GroupProcesses),
            DivisionStrategy::Pool => Some(DivisionStrategy::PoolProcesses),
            DivisionStrategy::GroupProcesses | DivisionStrategy::PoolProcesses => None,
        }
    }
}

impl fmt::Display for DivisionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Ranks of `group` when `size` processes are split into `groups` contiguous groups.
///
/// The first `size % groups` groups hold one process more than the others.
pub fn group_ranks(size: usize, groups: usize, group: usize) -> Range<usize> {
    let groups = groups.clamp(1, size.max(1));
    let base = size / groups;
    let remainder = size % groups;
    let first = base * group + group.min(remainder);
    let len = base + usize::from(group < remainder);
    first..(first + len).min(size)
}

/// Index of the group holding `rank`, using the layout of [`group_ranks`].
pub fn group_of(size: usize, groups: usize, rank: usize) -> usize {
    let groups = groups.clamp(1, size.max(1));
    let base = (size / groups).max(1);
    let remainder = size % groups;
    let large = remainder * (base + 1);
    if rank < large {
        rank / (base + 1)
    } else {
        remainder + (rank - large) / base
    }
}
