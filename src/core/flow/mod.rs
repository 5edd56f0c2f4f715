//! Flow control: the leaky-bucket rate limiter, warm-up token generator and
//! default threshold comparator, selected per `Rule` and wired through a
//! `Controller`.

pub mod rule;
pub mod rule_manager;
pub mod slot;
pub mod standalone_stat_slot;
pub mod traffic_shaping;

pub use rule::*;
pub use rule_manager::*;
pub use slot::*;
pub use standalone_stat_slot::*;
pub use traffic_shaping::*;
