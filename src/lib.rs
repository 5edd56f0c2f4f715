#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, allow(unused_attributes))]

//! # warden-core
//!
//! An in-process traffic governance library: a sliding-window statistic
//! substrate, per-resource statistic trees, and an admission pipeline of
//! ordered checker stages for flow control, circuit breaking, concurrency
//! isolation, hot-parameter control and system adaptive protection.
//!
//! Warden adopts the Chain-of-Responsibility pattern: user-defined rules are
//! checked via slots registered on `base::SlotChain`. Using Warden generally
//! means:
//! 1. Initialize configuration.
//! 2. Define a resource to be protected and build a Warden entry.
//! 3. Load the rules defined for each resource.
//! 4. Write the code at entry and exit points.
//!
//! ## Add Dependency
//!
//! ```toml
//! [dependencies]
//! warden-core = "0.1.0"
//! ```
//!
//! Optional features:
//! - async: support asynchronous resources (entry pointers become `Arc<RwLock<_>>` instead of `Rc<RefCell<_>>`).
//! - exporter: export metric statistics to Prometheus.
//! - logger_env: use `env_logger` to initialize logging.
//! - logger_log4rs: use `log4rs` to initialize logging.
//! - datasource: dynamically load rules from an external property source.
//! - metric_log: store formatted metric logs on disk for Warden resources.
//!
//! ## General Configurations and Initialization
//!
//! Warden needs to be initialized. The `api` module provides the following entry points:
//!
//! - `init_default()`: load configuration from the system environment; use defaults otherwise.
//! - `init_with_config_file(config_path: &mut String)`: load configuration from a YAML file.
//! - `init_with_config(config_entity: ConfigEntity)`: use a hand-crafted `ConfigEntity`.
//!
//! Example:
//!
//! ```rust
//! use warden_core::{init_default, logging};
//! init_default().unwrap_or_else(|err| logging::error!("{:?}", err));
//! ```
//!
//! ## Resource Definition
//!
//! A block of code is regarded as a resource in Warden, which can be
//! protected by defining its entry. By constructing `EntryBuilder` and
//! calling `build()`, we create an `Entry`.
//!
//! ```rust
//! use warden_core::base;
//! use warden_core::api::EntryBuilder;
//! let entry_builder = EntryBuilder::new(res_name.clone())
//!     .with_traffic_type(base::TrafficType::Inbound);
//! if let Ok(entry) = entry_builder.build() {
//!     // The request is allowed to be processed.
//!     // after finish the logic, exit the entry.
//!     entry.exit()
//! } else {
//!     // The request is blocked.
//!     // you do not need to call `exit()` on entry now.
//! }
//! ```
//!
//! ## Load Warden Rules
//!
//! Warden supports loading hand-crafted rules. `load_rules()` overwrites
//! all rules defined before; `append_rule()` appends a single rule
//! incrementally. For example:
//!
//! ```rust
//! flow::load_rules(vec![Arc::new(flow::Rule {
//!     resource: "example".into(),
//!     threshold: 10.0,
//!     calculate_strategy: flow::CalculateStrategy::Direct,
//!     control_strategy: flow::ControlStrategy::Reject,
//!     ..Default::default()
//! })]);
//! ```
//!
//! Rules can also be kept current dynamically through the `datasource`
//! feature, which wires an external property source (implementing
//! `DataSource`) to a rule manager's `load_rules()`.
//!
// This module is not intended to be part of the public API. In general, any
// `doc(hidden)` code is not part of Warden's public and stable API.
#[macro_use]
#[doc(hidden)]
pub mod macros;

/// Warden API
pub mod api;
/// Core implementations of Warden, including the statistic structures,
/// such as the sliding window and its underlying LeapArray, the rule managers,
/// and other utilities on configuration and metric logs.
/// The rule managers are responsible for managing the flow controller, circuit breaker,
/// isolation and system status related rules.
pub mod core;
/// Adapters for different logging crates.
pub mod logging;
cfg_exporter! {
    /// Metric Exporter implementations. Currently, only Prometheus is supported.
    pub mod exporter;
}
cfg_datasource! {
    /// Dynamic datasource support for Warden rule management.
    pub mod datasource;
}
// Utility functions for Warden.
pub mod utils;

// re-export precludes
pub use crate::core::*;
pub use api::*;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
