pub mod helpers;
pub mod property;
pub mod source;

pub use helpers::*;
pub use property::*;
pub use source::*;

use crate::base::GuardRule;
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
