//! Analysis modules.
//!
//! This module wraps the external static analyzer and normalizes its
//! diagnostics into findings.

pub mod analyzer;

pub use analyzer::{Analyzer, CommandAnalyzer};
