use crate::Result;
use std::fmt;

/// Common behaviour shared by all rule kinds (flow, circuit breaker,
/// authority/isolation, hot-parameter, system). Rule managers are generic
/// over this trait so they can validate and index rules uniformly.
pub trait GuardRule: fmt::Debug + Send + Sync {
    fn resource_name(&self) -> String;
    fn is_valid(&self) -> Result<()> {
        Ok(())
    }
}
