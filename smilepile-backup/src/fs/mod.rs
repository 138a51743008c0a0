//! File system helpers: staging tree traversal and photo file handling.

pub mod files;
pub mod scratch;
pub mod walker;
