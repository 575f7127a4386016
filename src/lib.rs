//! JournalSync Library
//!
//! Loads a Monica journal through a file-backed TTL cache, groups entries by
//! date and renders Zim pages. The binary in `main.rs` wires these modules to
//! the command line.

pub mod app;
pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod diagnostics;
pub mod journal;
pub mod monica;
pub mod zim;
