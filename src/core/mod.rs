//! Calculation translation with dependency resolution

pub mod dependency;
pub mod report;

pub use dependency::{DependencyGraph, Step};
pub use report::{translate_calculations, TranslationEntry, TranslationReport};
