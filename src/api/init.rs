//! Runtime bootstrap. `init_*` functions bring up, in order:
//! 1. global config, from an explicit `ConfigEntity`, a YAML file or the system environment
//! 2. the logging backend
//! 3. background tasks: metric log flushing, system statistic collectors, the time ticker

use super::{config, config::ConfigEntity};
#[cfg(feature = "metric_log")]
use crate::core::log::metric;
use crate::{core::system_metric, utils, Result};

/// Initializes the runtime using configuration resolved from the system
/// environment and built-in defaults.
#[inline]
pub fn init_default() -> Result<()> {
    init_warden(&mut String::new())
}

/// Initializes the runtime using the given config entity.
#[inline]
pub fn init_with_config(config_entity: ConfigEntity) -> Result<()> {
    config_entity.check()?;
    config::reset_global_config(config_entity);
    config::override_config_from_env_and_init_log()?;
    init_core_components()
}

/// Loads general configuration from the given YAML file and initializes the runtime.
#[inline]
pub fn init_with_config_file(config_path: &mut String) -> Result<()> {
    init_warden(config_path)
}

#[inline]
fn init_warden(config_path: &mut String) -> Result<()> {
    if !config_path.is_empty() {
        config::init_config_with_yaml(config_path)?;
    }
    init_core_components()
}

// init_core_components starts background tasks with the already-resolved global config.
#[inline]
fn init_core_components() -> Result<()> {
    #[cfg(feature = "metric_log")]
    if config::metric_log_flush_interval_sec() > 0 {
        metric::init_task();
    }

    let system_interval = config::system_stat_collect_interval_ms();
    let mut load_interval = system_interval;
    let mut cpu_interval = system_interval;
    let mut mem_interval = system_interval;

    if config::load_stat_collec_interval_ms() > 0 {
        load_interval = config::load_stat_collec_interval_ms();
    }
    if config::cpu_stat_collec_interval_ms() > 0 {
        cpu_interval = config::cpu_stat_collec_interval_ms();
    }
    if config::memory_stat_collec_interval_ms() > 0 {
        mem_interval = config::memory_stat_collec_interval_ms();
    }

    if load_interval > 0 {
        system_metric::init_load_collector(load_interval);
    }
    if cpu_interval > 0 {
        system_metric::init_cpu_collector(cpu_interval);
    }
    if mem_interval > 0 {
        system_metric::init_memory_collector(mem_interval);
    }

    if config::use_cache_time() {
        utils::start_time_ticker();
    }
    Ok(())
}
