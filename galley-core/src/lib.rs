//! Galley core library: domain types, configuration, errors.
//!
//! - [`types`]: kitchen/recipe newtypes, validated recipe paths, the typed
//!   recipe status payload
//! - [`config`]: `~/.galley/config.yaml` load / save and ignore rules
//! - [`error`]: [`ConfigError`], [`PathError`], [`StatusError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, IgnoreRules};
pub use error::{ConfigError, PathError, StatusError};
pub use types::{
    Category, CategoryMap, ContentId, FileEncoding, FileRecord, KitchenName, RecipeName,
    RecipePath, RecipeStatus,
};
