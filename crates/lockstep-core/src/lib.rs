//! # Lockstep Core Library
//!
//! An execution and synchronisation substrate for simulation and analysis workloads that
//! run on a pool of cooperating workers in lock-step.
//!
//! ## Architectural Philosophy
//!
//! The library keeps the same three-layer split throughout:
//!
//! - **[`core`]: The Foundation.** Data models (`Configuration`, `PeriodicBox`), the
//!   type-erased `ItemStore` and its broadcast registry, the `ProcessPool` collectives, and
//!   the stateless interaction kernels with their exclusion flags.
//!
//! - **[`engine`]: The Logic Core.** The procedure node graph and its
//!   check/prepare/execute/finalize lifecycle, execution contexts, tasks, keywords and the
//!   module contract with its concrete modules.
//!
//! - **[`workflows`]: The Public API.** The iteration driver that generates
//!   configurations, runs the module layer and keeps every worker's item store in sync.

pub mod core;
pub mod engine;
pub mod workflows;
