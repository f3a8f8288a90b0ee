use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use glob::Pattern;

use crate::diff::{Exclusions, Options};

/// Snapshot storage directory skipped unless `--no-default-excludes` is given.
pub const DEFAULT_EXCLUDE: &str = ".snapshots";

#[derive(Parser, Debug)]
#[command(author, version, about = "Compare two directory trees, e.g. a snapshot and the live system", long_about = None)]
pub struct Args {
    /// First root (usually the older snapshot)
    pub root1: PathBuf,

    /// Second root
    pub root2: PathBuf,

    /// Glob patterns, relative to the roots, to skip (can be repeated or comma separated)
    #[arg(short = 'x', long, value_delimiter = ',', num_args = 1..)]
    pub exclude: Vec<String>,

    /// Do not skip the snapshot storage directory
    #[arg(long)]
    pub no_default_excludes: bool,

    /// Classify a single path, relative to the roots, instead of walking the trees
    #[arg(short, long)]
    pub path: Option<PathBuf>,

    /// Print only the summary
    #[arg(short, long)]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn build_options(args: &Args) -> Result<Options> {
    let defaults: &[&str] = if args.no_default_excludes {
        &[][..]
    } else {
        &[DEFAULT_EXCLUDE][..]
    };

    let patterns = defaults
        .iter()
        .copied()
        .chain(args.exclude.iter().map(String::as_str))
        .map(|s| Pattern::new(s).with_context(|| format!("Invalid glob pattern: {s}")))
        .collect::<Result<Vec<_>>>()?;

    Ok(Options {
        exclusions: Exclusions::new(patterns),
    })
}
