//! Logging slot (structured entry/exit log) and the on-disk metric log.

cfg_metric_log! {
    pub mod metric;
    pub use metric::*;
}
pub mod slot;

pub use slot::*;
