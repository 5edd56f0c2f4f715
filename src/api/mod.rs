//! mod `api` provides the topmost fundamental APIs for users using warden-core.
//! Users must initialize Warden before loading Warden rules. Warden supports three ways to perform initialization:
//!
//!  1. `init_default()`, using default config to initialize.
//!  2. `init_with_config(config_entity: config::ConfigEntity)`, using a customized config entity to initialize.
//!  3. `init_with_config_file(config_path: &mut String)`, using a YAML file to initialize.

mod base;
mod init;
mod slot_chain;

pub use base::*;
pub use init::*;
pub use slot_chain::*;
