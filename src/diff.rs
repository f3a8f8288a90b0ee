use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, Receiver};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use glob::{MatchOptions, Pattern};
use tracing::{debug, error, trace};

use crate::cancel::CancelFlag;
use crate::compare::cmp_files;
use crate::dir::{Dir, FileRef};
use crate::error::{Error, Result};
use crate::merge::{Merge, Step};
use crate::stat::Stat;
use crate::status::Status;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Paths, relative to the roots, that are never compared nor reported.
///
/// `*` and `?` stop at `/`; use `**` to span directories. Names that are not
/// valid UTF-8 are matched with each invalid sequence replaced by U+FFFD.
#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    patterns: Vec<Pattern>,
}

impl Exclusions {
    pub fn new(patterns: Vec<Pattern>) -> Self {
        Exclusions { patterns }
    }

    pub fn is_excluded(&self, rel: &Path) -> bool {
        if self.patterns.is_empty() {
            return false;
        }

        let rel = rel.to_string_lossy();
        self.patterns.iter().any(|p| p.matches_with(&rel, MATCH_OPTIONS))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Options {
    pub exclusions: Exclusions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Cancelled,
}

/// One reported difference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub path: PathBuf,
    pub status: Status,
}

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Counters {
    pub total: usize,
    pub created: usize,
    pub deleted: usize,
    pub type_changed: usize,
    pub content: usize,
    pub permissions: usize,
    pub user: usize,
    pub group: usize,
}

impl Counters {
    pub fn record(&mut self, status: Status) {
        self.total += 1;
        let tally = [
            (Status::CREATED, &mut self.created),
            (Status::DELETED, &mut self.deleted),
            (Status::TYPE, &mut self.type_changed),
            (Status::CONTENT, &mut self.content),
            (Status::PERMISSIONS, &mut self.permissions),
            (Status::USER, &mut self.user),
            (Status::GROUP, &mut self.group),
        ];
        for (bit, count) in tally {
            if status.contains(bit) {
                *count += 1;
            }
        }
    }
}

/// State of one comparison run. The devices are those of the two roots and
/// never change while the run lasts.
struct Walker<'a, F> {
    dev1: u64,
    dev2: u64,
    exclusions: &'a Exclusions,
    cancel: &'a CancelFlag,
    sink: F,
}

#[derive(Clone, Copy)]
enum Side {
    One,
    Two,
}

impl<'a, F> Walker<'a, F>
where
    F: FnMut(&Path, Status),
{
    fn new(dev1: u64, dev2: u64, options: &'a Options, cancel: &'a CancelFlag, sink: F) -> Self {
        Walker {
            dev1,
            dev2,
            exclusions: &options.exclusions,
            cancel,
            sink,
        }
    }

    fn interruption_point(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    fn report(&mut self, path: &Path, status: Status) {
        trace!(path = %path.display(), %status, "change");
        (self.sink)(path, status);
    }

    fn dev(&self, side: Side) -> u64 {
        match side {
            Side::One => self.dev1,
            Side::Two => self.dev2,
        }
    }

    fn stat_entry(dir: &Dir, name: &OsStr) -> Result<Stat> {
        dir.stat(name, false).map_err(|err| {
            let path = dir.fullname_of(name, true);
            error!(path = %path.display(), %err, "stat failed");
            Error::io(path, err)
        })
    }

    fn open_child(dir: &Dir, name: &OsStr) -> Result<Dir> {
        dir.open_child(name)
            .map_err(|err| Error::io(dir.fullname_of(name, true), err))
    }

    fn entries(dir: &Dir) -> Result<Vec<OsString>> {
        dir.entries().map_err(|err| Error::io(dir.fullname(true), err))
    }

    /// Reports everything below `dir` with `status`. Subdirectories on a
    /// foreign device are reported but not entered.
    fn list_subdirs(&mut self, dir: &Dir, side: Side, status: Status) -> Result<()> {
        self.interruption_point()?;

        for name in Self::entries(dir)? {
            let rel = dir.fullname_of(&name, false);
            if self.exclusions.is_excluded(&rel) {
                continue;
            }

            self.report(&rel, status);

            let stat = Self::stat_entry(dir, &name)?;
            if stat.is_dir() && stat.dev == self.dev(side) {
                let child = Self::open_child(dir, &name)?;
                self.list_subdirs(&child, side, status)?;
            }
        }

        Ok(())
    }

    fn lonesome(&mut self, dir: &Dir, name: &OsStr, side: Side) -> Result<()> {
        let stat = Self::stat_entry(dir, name)?;
        if stat.dev != self.dev(side) {
            return Ok(());
        }

        let status = match side {
            Side::One => Status::DELETED,
            Side::Two => Status::CREATED,
        };

        self.report(&dir.fullname_of(name, false), status);

        if stat.is_dir() {
            let child = Self::open_child(dir, name)?;
            self.list_subdirs(&child, side, status)?;
        }

        Ok(())
    }

    fn twosome(&mut self, dir1: &Dir, dir2: &Dir, name: &OsStr) -> Result<()> {
        let stat1 = Self::stat_entry(dir1, name)?;
        let stat2 = Self::stat_entry(dir2, name)?;

        // Anything on another filesystem is invisible, whatever its type.
        if stat1.dev != self.dev1 || stat2.dev != self.dev2 {
            return Ok(());
        }

        let status = cmp_files(&FileRef::new(dir1, name), &stat1, &FileRef::new(dir2, name), &stat2)?;
        if !status.is_empty() {
            self.report(&dir1.fullname_of(name, false), status);
        }

        if !status.contains(Status::TYPE) {
            if stat1.is_dir() {
                let child1 = Self::open_child(dir1, name)?;
                let child2 = Self::open_child(dir2, name)?;
                self.cmp_dirs_worker(&child1, &child2)?;
            }
        } else {
            if stat1.is_dir() {
                let child1 = Self::open_child(dir1, name)?;
                self.list_subdirs(&child1, Side::One, Status::DELETED)?;
            }

            if stat2.is_dir() {
                let child2 = Self::open_child(dir2, name)?;
                self.list_subdirs(&child2, Side::Two, Status::CREATED)?;
            }
        }

        Ok(())
    }

    fn cmp_dirs_worker(&mut self, dir1: &Dir, dir2: &Dir) -> Result<()> {
        self.interruption_point()?;

        let entries1 = Self::entries(dir1)?;
        let entries2 = Self::entries(dir2)?;

        for step in Merge::new(&entries1, &entries2) {
            let step = step?;
            let (Step::Left(name) | Step::Right(name) | Step::Both(name)) = step;

            if self.exclusions.is_excluded(&dir1.fullname_of(name, false)) {
                continue;
            }

            match step {
                Step::Left(name) => self.lonesome(dir1, name, Side::One)?,
                Step::Right(name) => self.lonesome(dir2, name, Side::Two)?,
                Step::Both(name) => self.twosome(dir1, dir2, name)?,
            }
        }

        Ok(())
    }
}

fn root_dev(dir: &Dir) -> Result<u64> {
    dir.stat(OsStr::new("."), false)
        .map(|st| st.dev)
        .map_err(|err| {
            error!(path = %dir.fullname(true).display(), %err, "stat failed");
            Error::io(dir.fullname(true), err)
        })
}

/// Compares the trees below `dir1` and `dir2` and calls `sink` with the path
/// (relative to the roots) and status of every difference, in traversal
/// order.
///
/// The walk never leaves the filesystems the two roots live on. Cancellation
/// is checked before every directory is read; a cancelled run reports
/// nothing further and returns `Outcome::Cancelled`.
pub fn compare_dirs<F>(dir1: &Dir, dir2: &Dir, options: &Options, cancel: &CancelFlag, sink: F) -> Result<Outcome>
where
    F: FnMut(&Path, Status),
{
    debug!(path1 = %dir1.fullname(true).display(), path2 = %dir2.fullname(true).display(), "comparing directories");

    if cancel.is_cancelled() {
        return Ok(Outcome::Cancelled);
    }

    let dev1 = root_dev(dir1)?;
    let dev2 = root_dev(dir2)?;
    debug!(dev1, dev2, "root devices");

    let start = Instant::now();
    let mut walker = Walker::new(dev1, dev2, options, cancel, sink);
    let result = walker.cmp_dirs_worker(dir1, dir2);
    debug!(elapsed = ?start.elapsed(), "comparing directories finished");

    match result {
        Ok(()) => Ok(Outcome::Completed),
        Err(Error::Cancelled) => Ok(Outcome::Cancelled),
        Err(err) => Err(err),
    }
}

/// Compares `root1` and `root2` on a new thread and streams the differences
/// through a channel holding at most `capacity` changes.
///
/// Dropping the receiver cancels this run only; `cancel` itself is never set
/// by the driver, so other runs sharing it carry on.
pub fn spawn_compare(
    root1: PathBuf,
    root2: PathBuf,
    options: Options,
    cancel: CancelFlag,
    capacity: usize,
) -> (Receiver<Change>, JoinHandle<Result<Outcome>>) {
    let (tx, rx) = sync_channel(capacity);

    let handle = thread::spawn(move || {
        let dir1 = Dir::open_root(&root1).map_err(|e| Error::io(&root1, e))?;
        let dir2 = Dir::open_root(&root2).map_err(|e| Error::io(&root2, e))?;

        let run = cancel.child();
        compare_dirs(&dir1, &dir2, &options, &run, |path, status| {
            let change = Change {
                path: path.to_path_buf(),
                status,
            };
            if tx.send(change).is_err() {
                run.cancel();
            }
        })
    });

    (rx, handle)
}
