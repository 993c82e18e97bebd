//! # RMSA Common Library
//!
//! Shared code for the repeated-measures survey analysis workspace:
//! - Error type
//! - Configuration loading and resolution
//! - Study design table (conditions, items, constructs, vocabularies)
//! - Timestamp parsing

pub mod config;
pub mod design;
pub mod error;
pub mod time;

pub use design::{Condition, Construct, Item, Phase, Scale, StudyDesign};
pub use error::{Error, Result};
