//! Filesystem side of a corpus run: chapter discovery and pair output.

pub mod chapters;
pub mod jsonl;
