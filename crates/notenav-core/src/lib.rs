//! # notenav-core
//!
//! Core types, traits, and defaults for the notenav content pipeline.
//!
//! This crate provides the data structures and trait definitions the
//! database, the content providers and the processors share.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod settings;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use settings::{ContentSettings, SettingKey};
pub use traits::*;
