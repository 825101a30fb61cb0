//! Utility functions for snipsentry: deciding which repository files are
//! candidates for snippet analysis.

pub mod file_selector;

pub use file_selector::{extension_of, ExtensionFilter, FileSelector, SelectionMode, DEFAULT_EXTENSIONS};
