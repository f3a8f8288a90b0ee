//! Per-entry comparison: content equality and status classification.

use std::ffi::OsStr;
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::AsFd;
use std::path::{Component, Path, PathBuf};

use nix::fcntl::{posix_fadvise, OFlag, PosixFadviseAdvice};
use tracing::{error, warn};

use crate::dir::{Dir, FileRef};
use crate::error::{Error, Result};
use crate::stat::{FileType, Stat};
use crate::status::Status;

const BLOCK_SIZE: usize = 4096;

const CONTENT_OPEN_FLAGS: OFlag = OFlag::O_RDONLY.union(OFlag::O_NOFOLLOW);

fn open_for_compare(file: &FileRef<'_>, size: i64) -> io::Result<File> {
    let fd = file.open(CONTENT_OPEN_FLAGS)?;
    if let Err(err) = posix_fadvise(fd.as_fd(), 0, size as nix::libc::off_t, PosixFadviseAdvice::POSIX_FADV_SEQUENTIAL) {
        warn!(path = %file.fullname(true).display(), %err, "fadvise failed");
    }
    Ok(File::from(fd))
}

fn cmp_files_content_reg(file1: &FileRef<'_>, stat1: &Stat, file2: &FileRef<'_>, stat2: &Stat) -> bool {
    if stat1.size != stat2.size {
        return false;
    }

    if stat1.same_mtime(stat2) {
        return true;
    }

    if stat1.size == 0 {
        return true;
    }

    if stat1.same_inode(stat2) {
        return true;
    }

    let mut f1 = match open_for_compare(file1, stat1.size) {
        Ok(f) => f,
        Err(err) => {
            error!(path = %file1.fullname(true).display(), %err, "open failed");
            return false;
        }
    };

    let mut f2 = match open_for_compare(file2, stat2.size) {
        Ok(f) => f,
        Err(err) => {
            error!(path = %file2.fullname(true).display(), %err, "open failed");
            return false;
        }
    };

    let mut block1 = [0u8; BLOCK_SIZE];
    let mut block2 = [0u8; BLOCK_SIZE];

    let mut length = stat1.size as u64;
    while length > 0 {
        let t = length.min(BLOCK_SIZE as u64) as usize;

        if let Err(err) = f1.read_exact(&mut block1[..t]) {
            error!(path = %file1.fullname(true).display(), %err, "read failed");
            return false;
        }

        if let Err(err) = f2.read_exact(&mut block2[..t]) {
            error!(path = %file2.fullname(true).display(), %err, "read failed");
            return false;
        }

        if block1[..t] != block2[..t] {
            return false;
        }

        length -= t as u64;
    }

    true
}

fn cmp_files_content_lnk(file1: &FileRef<'_>, stat1: &Stat, file2: &FileRef<'_>, stat2: &Stat) -> bool {
    if stat1.same_mtime(stat2) {
        return true;
    }

    let target1 = match file1.readlink() {
        Ok(t) => t,
        Err(err) => {
            error!(path = %file1.fullname(true).display(), %err, "readlink failed");
            return false;
        }
    };

    let target2 = match file2.readlink() {
        Ok(t) => t,
        Err(err) => {
            error!(path = %file2.fullname(true).display(), %err, "readlink failed");
            return false;
        }
    };

    target1 == target2
}

/// Whether two entries of the same type have the same content.
///
/// Regular files are checked cheapest first: size, modification time, empty
/// files, shared inode, and only then block by block. Symlinks compare their
/// targets. Other types carry no content and are always equal.
///
/// Failing to open or read a file is not an error; it is logged and the files
/// are considered different.
pub fn cmp_files_content(file1: &FileRef<'_>, stat1: &Stat, file2: &FileRef<'_>, stat2: &Stat) -> Result<bool> {
    if stat1.type_bits() != stat2.type_bits() {
        return Err(Error::TypeMismatch {
            path: file1.fullname(false),
        });
    }

    Ok(match stat1.file_type() {
        FileType::Regular => cmp_files_content_reg(file1, stat1, file2, stat2),
        FileType::Symlink => cmp_files_content_lnk(file1, stat1, file2, stat2),
        _ => true,
    })
}

/// Classifies two entries whose metadata has already been captured.
pub fn cmp_files(file1: &FileRef<'_>, stat1: &Stat, file2: &FileRef<'_>, stat2: &Stat) -> Result<Status> {
    let mut status = Status::empty();

    if stat1.type_bits() != stat2.type_bits() {
        status |= Status::TYPE;
    } else if !cmp_files_content(file1, stat1, file2, stat2)? {
        status |= Status::CONTENT;
    }

    if stat1.permission_bits() != stat2.permission_bits() {
        status |= Status::PERMISSIONS;
    }

    if stat1.uid != stat2.uid {
        status |= Status::USER;
    }

    if stat1.gid != stat2.gid {
        status |= Status::GROUP;
    }

    Ok(status)
}

/// Turns `name` into a path below a root. A leading `/` is dropped, so
/// `/etc/fstab` and `etc/fstab` name the same entry; `..` is refused.
fn relative_name(name: &Path) -> Result<PathBuf> {
    let mut rel = PathBuf::new();
    for component in name.components() {
        match component {
            Component::RootDir | Component::CurDir => {}
            Component::Normal(part) => rel.push(part),
            Component::ParentDir | Component::Prefix(_) => {
                return Err(Error::InvalidPath {
                    path: name.to_path_buf(),
                })
            }
        }
    }

    if rel.as_os_str().is_empty() {
        return Err(Error::InvalidPath {
            path: name.to_path_buf(),
        });
    }
    Ok(rel)
}

/// Classifies the path `name`, relative to both roots, without walking the
/// trees.
///
/// The name is resolved in a single `fstatat` below each root, so
/// intermediate symlinks in a multi-component name are followed.
pub fn cmp_files_at(base_path1: &Path, base_path2: &Path, name: &Path) -> Result<Status> {
    let rel = relative_name(name)?;

    let dir1 = Dir::open_root(base_path1).map_err(|e| Error::io(base_path1, e))?;
    let dir2 = Dir::open_root(base_path2).map_err(|e| Error::io(base_path2, e))?;

    let name: &OsStr = rel.as_os_str();
    let file1 = FileRef::new(&dir1, name);
    let file2 = FileRef::new(&dir2, name);

    match (file1.stat(false), file2.stat(false)) {
        (Ok(stat1), Ok(stat2)) => cmp_files(&file1, &stat1, &file2, &stat2),
        (Err(_), Ok(_)) => Ok(Status::CREATED),
        (Ok(_), Err(_)) => Ok(Status::DELETED),
        (Err(err), Err(_)) => {
            error!(path = %file1.fullname(true).display(), %err, "stat failed");
            Err(Error::io(file1.fullname(true), err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stat::synthetic;
    use std::fs;
    use std::sync::{Arc, Mutex};

    fn regular(size: i64, mtime_sec: i64) -> Stat {
        Stat {
            size,
            mtime_sec,
            ..synthetic(FileType::Regular, 0o644)
        }
    }

    #[test]
    fn different_types_are_a_contract_violation() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Dir::open_root(tmp.path()).unwrap();
        let file = FileRef::new(&dir, OsStr::new("f"));

        let reg = synthetic(FileType::Regular, 0o644);
        let lnk = synthetic(FileType::Symlink, 0o777);
        assert!(matches!(
            cmp_files_content(&file, &reg, &file, &lnk),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn size_mismatch_beats_equal_mtime() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Dir::open_root(tmp.path()).unwrap();
        let file = FileRef::new(&dir, OsStr::new("missing"));

        assert!(!cmp_files_content(&file, &regular(10, 5), &file, &regular(11, 5)).unwrap());
    }

    #[test]
    fn metadata_shortcuts_avoid_reading() {
        // none of these files exist, so any attempt to read would report a difference
        let tmp = tempfile::tempdir().unwrap();
        let dir = Dir::open_root(tmp.path()).unwrap();
        let a = FileRef::new(&dir, OsStr::new("a"));
        let b = FileRef::new(&dir, OsStr::new("b"));

        // equal mtime
        assert!(cmp_files_content(&a, &regular(10, 5), &b, &regular(10, 5)).unwrap());

        // both empty
        assert!(cmp_files_content(&a, &regular(0, 5), &b, &regular(0, 6)).unwrap());

        // same inode with differing mtime
        let s1 = Stat { ino: 42, ..regular(10, 5) };
        let s2 = Stat { ino: 42, ..regular(10, 6) };
        assert!(cmp_files_content(&a, &s1, &b, &s2).unwrap());

        // different inode falls through to reading, which fails
        let s3 = Stat { ino: 43, ..regular(10, 6) };
        assert!(!cmp_files_content(&a, &s1, &b, &s3).unwrap());
    }

    #[test]
    fn block_comparison_finds_late_difference() {
        let tmp = tempfile::tempdir().unwrap();
        let mut data = vec![7u8; BLOCK_SIZE * 3 + 17];
        fs::write(tmp.path().join("a"), &data).unwrap();
        fs::write(tmp.path().join("same"), &data).unwrap();
        *data.last_mut().unwrap() = 8;
        fs::write(tmp.path().join("b"), &data).unwrap();

        let dir = Dir::open_root(tmp.path()).unwrap();
        let a = FileRef::new(&dir, OsStr::new("a"));
        let b = FileRef::new(&dir, OsStr::new("b"));
        let same = FileRef::new(&dir, OsStr::new("same"));
        let sa = a.stat(false).unwrap();
        let sb = Stat { mtime_nsec: sa.mtime_nsec + 1, ..b.stat(false).unwrap() };
        let ss = Stat { mtime_nsec: sa.mtime_nsec + 1, ..same.stat(false).unwrap() };

        assert!(!cmp_files_content(&a, &sa, &b, &sb).unwrap());
        assert!(cmp_files_content(&a, &sa, &same, &ss).unwrap());
    }

    #[test]
    fn truncated_file_counts_as_different() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a"), b"hello").unwrap();
        fs::write(tmp.path().join("b"), b"hel").unwrap();

        let dir = Dir::open_root(tmp.path()).unwrap();
        let a = FileRef::new(&dir, OsStr::new("a"));
        let b = FileRef::new(&dir, OsStr::new("b"));
        let sa = a.stat(false).unwrap();
        // pretend b was still 5 bytes long when it was stat'ed
        let sb = Stat { size: 5, mtime_sec: sa.mtime_sec + 1, ino: sa.ino + 1, ..b.stat(false).unwrap() };

        let logs = LogCapture::default();
        let equal = tracing::subscriber::with_default(logs.subscriber(), || {
            cmp_files_content(&a, &sa, &b, &sb).unwrap()
        });

        assert!(!equal);
        let output = logs.contents();
        assert!(output.contains("read failed"), "{output}");
        assert!(output.contains("ERROR"), "{output}");
    }

    #[test]
    fn unopenable_file_is_logged() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Dir::open_root(tmp.path()).unwrap();
        let a = FileRef::new(&dir, OsStr::new("a"));
        let b = FileRef::new(&dir, OsStr::new("b"));
        let s1 = Stat { ino: 1, ..regular(10, 5) };
        let s2 = Stat { ino: 2, ..regular(10, 6) };

        let logs = LogCapture::default();
        let equal = tracing::subscriber::with_default(logs.subscriber(), || {
            cmp_files_content(&a, &s1, &b, &s2).unwrap()
        });

        assert!(!equal);
        assert!(logs.contents().contains("open failed"));
    }

    #[test]
    fn symlinks_compare_targets() {
        let tmp = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink("target", tmp.path().join("l1")).unwrap();
        std::os::unix::fs::symlink("target", tmp.path().join("l2")).unwrap();
        std::os::unix::fs::symlink("other", tmp.path().join("l3")).unwrap();

        let dir = Dir::open_root(tmp.path()).unwrap();
        let l1 = FileRef::new(&dir, OsStr::new("l1"));
        let l2 = FileRef::new(&dir, OsStr::new("l2"));
        let l3 = FileRef::new(&dir, OsStr::new("l3"));
        let s1 = l1.stat(false).unwrap();
        let s2 = Stat { mtime_sec: s1.mtime_sec + 1, ..l2.stat(false).unwrap() };
        let s3 = Stat { mtime_sec: s1.mtime_sec + 1, ..l3.stat(false).unwrap() };

        assert!(cmp_files_content(&l1, &s1, &l2, &s2).unwrap());
        assert!(!cmp_files_content(&l1, &s1, &l3, &s3).unwrap());
    }

    #[test]
    fn classifier_combines_bits() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Dir::open_root(tmp.path()).unwrap();
        let d = FileRef::new(&dir, OsStr::new("d"));

        let base = synthetic(FileType::Directory, 0o755);
        assert_eq!(cmp_files(&d, &base, &d, &base).unwrap(), Status::empty());

        let other = Stat {
            mode: base.mode & !0o777 | 0o700,
            uid: base.uid + 1,
            gid: base.gid + 1,
            ..base
        };
        assert_eq!(
            cmp_files(&d, &base, &d, &other).unwrap(),
            Status::PERMISSIONS | Status::USER | Status::GROUP
        );

        let sticky = Stat { mode: base.mode | nix::libc::S_ISVTX as u32, ..base };
        assert_eq!(cmp_files(&d, &base, &d, &sticky).unwrap(), Status::PERMISSIONS);

        let fifo = synthetic(FileType::Fifo, 0o755);
        assert_eq!(cmp_files(&d, &base, &d, &fifo).unwrap(), Status::TYPE);
    }

    #[test]
    fn bare_path_classification() {
        let tmp1 = tempfile::tempdir().unwrap();
        let tmp2 = tempfile::tempdir().unwrap();
        fs::create_dir(tmp1.path().join("sub")).unwrap();
        fs::create_dir(tmp2.path().join("sub")).unwrap();
        fs::write(tmp1.path().join("sub/old"), b"x").unwrap();
        fs::write(tmp2.path().join("sub/new"), b"x").unwrap();

        assert_eq!(
            cmp_files_at(tmp1.path(), tmp2.path(), Path::new("sub/new")).unwrap(),
            Status::CREATED
        );
        assert_eq!(
            cmp_files_at(tmp1.path(), tmp2.path(), Path::new("sub/old")).unwrap(),
            Status::DELETED
        );
        assert!(matches!(
            cmp_files_at(tmp1.path(), tmp2.path(), Path::new("sub/none")),
            Err(Error::Io { .. })
        ));
    }

    #[test]
    fn bare_path_with_leading_slash_stays_below_roots() {
        let tmp1 = tempfile::tempdir().unwrap();
        let tmp2 = tempfile::tempdir().unwrap();
        fs::write(tmp1.path().join("f"), b"only here").unwrap();
        fs::write(tmp1.path().join("both"), b"one").unwrap();
        fs::write(tmp2.path().join("both"), b"two!").unwrap();

        assert_eq!(
            cmp_files_at(tmp1.path(), tmp2.path(), Path::new("/f")).unwrap(),
            Status::DELETED
        );
        assert_eq!(
            cmp_files_at(tmp1.path(), tmp2.path(), Path::new("/both")).unwrap(),
            Status::CONTENT
        );

        // an absolute host path must not resolve outside the roots
        let outside = tempfile::tempdir().unwrap();
        let host_file = outside.path().join("host");
        fs::write(&host_file, b"x").unwrap();
        assert!(matches!(
            cmp_files_at(tmp1.path(), tmp2.path(), &host_file),
            Err(Error::Io { .. })
        ));
    }

    #[test]
    fn bare_path_must_not_escape_roots() {
        let tmp1 = tempfile::tempdir().unwrap();
        let tmp2 = tempfile::tempdir().unwrap();

        for name in ["../etc/passwd", "sub/../../x", "/", ""] {
            assert!(
                matches!(
                    cmp_files_at(tmp1.path(), tmp2.path(), Path::new(name)),
                    Err(Error::InvalidPath { .. })
                ),
                "{name}"
            );
        }
    }

    /// Collects formatted log output of the code run under `subscriber()`.
    #[derive(Clone, Default)]
    struct LogCapture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogCapture {
        fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
            let writer = self.clone();
            tracing_subscriber::fmt()
                .with_writer(move || writer.clone())
                .with_ansi(false)
                .finish()
        }

        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }
}
