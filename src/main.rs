use std::io::{self, BufWriter, Write};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use snapdiff::{build_options, cmp_files_at, compare_dirs, Args, CancelFlag, Counters, Dir, Outcome};

fn init_logging(verbose: bool) {
    let fallback = if verbose { "snapdiff=debug" } else { "snapdiff=info" };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let root1 = args.root1.canonicalize().context("Invalid root1")?;
    let root2 = args.root2.canonicalize().context("Invalid root2")?;

    if let Some(path) = &args.path {
        let status = cmp_files_at(&root1, &root2, path)
            .with_context(|| format!("Failed to compare {}", path.display()))?;
        println!("{status} {}", path.display());
        return Ok(());
    }

    let options = build_options(&args)?;

    let dir1 = Dir::open_root(&root1).with_context(|| format!("Failed to open {}", root1.display()))?;
    let dir2 = Dir::open_root(&root2).with_context(|| format!("Failed to open {}", root2.display()))?;

    let mut counters = Counters::default();
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut write_err = None;

    let outcome = compare_dirs(&dir1, &dir2, &options, &CancelFlag::new(), |path, status| {
        counters.record(status);
        if !args.quiet && write_err.is_none() {
            if let Err(err) = writeln!(out, "{status} {}", path.display()) {
                write_err = Some(err);
            }
        }
    })
    .context("Comparison failed")?;

    if let Some(err) = write_err {
        return Err(err).context("Failed to write output");
    }
    out.flush()?;
    drop(out);

    if outcome == Outcome::Cancelled {
        anyhow::bail!("Comparison cancelled");
    }

    println!("== snapdiff: Summary ==");
    println!("Changed paths:        {}", counters.total);
    println!("Created (+):          {}", counters.created);
    println!("Deleted (-):          {}", counters.deleted);
    println!("Type changed (t):     {}", counters.type_changed);
    println!("Content changed (c):  {}", counters.content);
    println!("Permissions (p):      {}", counters.permissions);
    println!("Owner (u):            {}", counters.user);
    println!("Group (g):            {}", counters.group);

    Ok(())
}
