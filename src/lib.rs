//
// lib.rs
// snapdiff
//
// Library entry that re-exports the comparison engine: directory handles, the per-entry
// classifier, the tree walker and the status bitmask, plus the CLI option builder used by
// the binary.
//
// Public crate interface: re-export modules used by the binary and tests.
#[cfg(not(target_os = "linux"))]
compile_error!("snapdiff relies on Linux descriptor-relative file APIs");

pub mod cancel;
pub mod cli;
pub mod compare;
pub mod diff;
pub mod dir;
pub mod error;
pub mod merge;
pub mod stat;
pub mod status;

pub use cancel::CancelFlag;
pub use cli::{build_options, Args};
pub use compare::{cmp_files, cmp_files_at, cmp_files_content};
pub use diff::{compare_dirs, spawn_compare, Change, Counters, Exclusions, Options, Outcome};
pub use dir::{Dir, FileRef};
pub use error::{Error, Result};
pub use stat::{FileType, Stat};
pub use status::Status;
