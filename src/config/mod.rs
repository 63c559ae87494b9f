//! Runtime configuration resolved from settings plus environment overrides.

mod helpers;
mod inventory;

pub use inventory::{InventoryConfig, ServerConfig, TemplatePaths};
