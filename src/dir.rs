//! Descriptor-owning directory handles.
//!
//! Every lookup below a [`Dir`] goes through the `*at` family of calls on the
//! handle's own descriptor, so a handle keeps pointing at the directory it was
//! opened on even if an ancestor is renamed meanwhile.

use std::ffi::{OsStr, OsString};
use std::io;
use std::os::fd::{AsFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{self, AtFlags, OFlag};
use nix::sys::stat::{fstatat, Mode};

use crate::stat::Stat;

const DIR_FLAGS: OFlag = OFlag::O_RDONLY
    .union(OFlag::O_DIRECTORY)
    .union(OFlag::O_CLOEXEC);

/// Runs `open` with `O_NOATIME` added, and again without it when the kernel
/// refuses the flag because the caller does not own the file.
pub(crate) fn with_noatime<T>(flags: OFlag, open: impl Fn(OFlag) -> nix::Result<T>) -> io::Result<T> {
    match open(flags | OFlag::O_NOATIME) {
        Err(Errno::EPERM) => open(flags).map_err(io::Error::from),
        res => res.map_err(io::Error::from),
    }
}

/// An open directory.
#[derive(Debug)]
pub struct Dir {
    base_path: PathBuf,
    path: PathBuf,
    fd: OwnedFd,
}

impl Dir {
    /// Opens a comparison root.
    pub fn open_root(base_path: impl AsRef<Path>) -> io::Result<Self> {
        let base_path = base_path.as_ref();
        let fd = with_noatime(DIR_FLAGS, |flags| fcntl::open(base_path, flags, Mode::empty()))?;

        Ok(Dir {
            base_path: base_path.to_path_buf(),
            path: PathBuf::new(),
            fd,
        })
    }

    /// Opens the subdirectory `name`. A symlink is never followed for this
    /// step.
    pub fn open_child(&self, name: &OsStr) -> io::Result<Self> {
        let fd = with_noatime(DIR_FLAGS | OFlag::O_NOFOLLOW, |flags| {
            fcntl::openat(self.fd.as_fd(), name, flags, Mode::empty())
        })?;

        Ok(Dir {
            base_path: self.base_path.clone(),
            path: self.path.join(name),
            fd,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Path of this directory relative to the root.
    pub fn rel_path(&self) -> &Path {
        &self.path
    }

    pub fn fullname(&self, with_base_path: bool) -> PathBuf {
        if with_base_path {
            self.base_path.join(&self.path)
        } else {
            self.path.clone()
        }
    }

    pub fn fullname_of(&self, name: &OsStr, with_base_path: bool) -> PathBuf {
        self.fullname(with_base_path).join(name)
    }

    /// Names of all entries except "." and "..", sorted by bytes.
    ///
    /// Reads through a fresh descriptor for "." so the position of any other
    /// reader of this directory is left alone.
    pub fn entries(&self) -> io::Result<Vec<OsString>> {
        let mut stream = with_noatime(DIR_FLAGS, |flags| {
            nix::dir::Dir::openat(self.fd.as_fd(), ".", flags, Mode::empty())
        })?;

        let mut names = Vec::new();
        for entry in stream.iter() {
            let entry = entry?;
            let name = OsStr::from_bytes(entry.file_name().to_bytes());
            if name != OsStr::new(".") && name != OsStr::new("..") {
                names.push(name.to_os_string());
            }
        }

        names.sort();
        Ok(names)
    }

    /// `fstatat` relative to this directory.
    pub fn stat(&self, name: &OsStr, follow: bool) -> io::Result<Stat> {
        let flags = if follow {
            AtFlags::empty()
        } else {
            AtFlags::AT_SYMLINK_NOFOLLOW
        };

        let st = fstatat(self.fd.as_fd(), name, flags)?;
        Ok(Stat::from(st))
    }

    /// `openat` relative to this directory; the descriptor is close-on-exec.
    pub fn open(&self, name: &OsStr, flags: OFlag) -> io::Result<OwnedFd> {
        with_noatime(flags | OFlag::O_CLOEXEC, |flags| {
            fcntl::openat(self.fd.as_fd(), name, flags, Mode::empty())
        })
    }

    pub fn readlink(&self, name: &OsStr) -> io::Result<OsString> {
        Ok(fcntl::readlinkat(self.fd.as_fd(), name)?)
    }
}

/// A name inside a [`Dir`]. Holds nothing but the borrow and the name.
#[derive(Debug, Clone, Copy)]
pub struct FileRef<'a> {
    dir: &'a Dir,
    name: &'a OsStr,
}

impl<'a> FileRef<'a> {
    pub fn new(dir: &'a Dir, name: &'a OsStr) -> Self {
        FileRef { dir, name }
    }

    pub fn name(&self) -> &OsStr {
        self.name
    }

    pub fn fullname(&self, with_base_path: bool) -> PathBuf {
        self.dir.fullname_of(self.name, with_base_path)
    }

    pub fn stat(&self, follow: bool) -> io::Result<Stat> {
        self.dir.stat(self.name, follow)
    }

    pub fn open(&self, flags: OFlag) -> io::Result<OwnedFd> {
        self.dir.open(self.name, flags)
    }

    pub fn readlink(&self) -> io::Result<OsString> {
        self.dir.readlink(self.name)
    }
}
