//! Language support: catalog of display metadata and the translation
//! routing table.
//!
//! - `registry`: single source of truth for language codes, flag emoji and
//!   display names, plus code normalization
//! - `routing`: which target languages each source language fans out to

mod registry;
mod routing;

pub use registry::{info, normalize, LanguageInfo};
pub use routing::{policy, targets_for};
