//! # Engine Module
//!
//! The stateful layer that drives work on top of [`crate::core`]: procedures built from
//! typed nodes, the contexts they run under, tasks that bind a procedure to a context, and
//! modules that own keywords, a target policy and, for analysis, an internal procedure.
//!
//! ## Architecture
//!
//! - **Execution Context** ([`context`]) - Borrowed pool, configuration and item store for one invocation
//! - **Procedures** ([`procedure`]) - Node arena, validation and the check/prepare/execute/finalize lifecycle
//! - **Tasks** ([`task`]) - Outermost unit binding one procedure to one context
//! - **Modules** ([`modules`]) - The module contract, registry, layer and concrete modules
//! - **Keywords** ([`keywords`]) - Typed module options with defaults and change signals
//! - **Configuration** ([`config`]) - Run parameters and their builder
//! - **Progress Monitoring** ([`progress`]) - Callback-based progress events
//! - **Error Handling** ([`error`]) - The engine error type aggregating every subsystem

pub mod config;
pub mod context;
pub mod error;
pub mod keywords;
pub mod modules;
pub mod procedure;
pub mod progress;
pub mod task;
