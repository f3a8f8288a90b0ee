use nix::libc;
use nix::sys::stat::FileStat;

/// Permission, setuid, setgid and sticky bits.
pub const PERMISSION_BITS: u32 = (libc::S_IRWXU
    | libc::S_IRWXG
    | libc::S_IRWXO
    | libc::S_ISUID
    | libc::S_ISGID
    | libc::S_ISVTX) as u32;

const TYPE_BITS: u32 = libc::S_IFMT as u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
    BlockDevice,
    CharDevice,
    Fifo,
    Socket,
    Unknown,
}

/// Metadata of one entry, captured once with `fstatat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: i64,
    pub mtime_sec: i64,
    pub mtime_nsec: i64,
}

impl Stat {
    /// Type bits of `mode`.
    pub fn type_bits(&self) -> u32 {
        self.mode & TYPE_BITS
    }

    pub fn permission_bits(&self) -> u32 {
        self.mode & PERMISSION_BITS
    }

    pub fn file_type(&self) -> FileType {
        match self.type_bits() {
            t if t == libc::S_IFREG as u32 => FileType::Regular,
            t if t == libc::S_IFDIR as u32 => FileType::Directory,
            t if t == libc::S_IFLNK as u32 => FileType::Symlink,
            t if t == libc::S_IFBLK as u32 => FileType::BlockDevice,
            t if t == libc::S_IFCHR as u32 => FileType::CharDevice,
            t if t == libc::S_IFIFO as u32 => FileType::Fifo,
            t if t == libc::S_IFSOCK as u32 => FileType::Socket,
            _ => FileType::Unknown,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.file_type() == FileType::Directory
    }

    pub fn same_mtime(&self, other: &Stat) -> bool {
        self.mtime_sec == other.mtime_sec && self.mtime_nsec == other.mtime_nsec
    }

    pub fn same_inode(&self, other: &Stat) -> bool {
        self.dev == other.dev && self.ino == other.ino
    }
}

impl From<FileStat> for Stat {
    #[allow(clippy::unnecessary_cast)]
    fn from(st: FileStat) -> Self {
        Stat {
            dev: st.st_dev as u64,
            ino: st.st_ino as u64,
            mode: st.st_mode as u32,
            uid: st.st_uid as u32,
            gid: st.st_gid as u32,
            size: st.st_size as i64,
            mtime_sec: st.st_mtime as i64,
            mtime_nsec: st.st_mtime_nsec as i64,
        }
    }
}

#[cfg(test)]
pub(crate) fn synthetic(file_type: FileType, perm: u32) -> Stat {
    let type_bits = match file_type {
        FileType::Regular => libc::S_IFREG,
        FileType::Directory => libc::S_IFDIR,
        FileType::Symlink => libc::S_IFLNK,
        FileType::BlockDevice => libc::S_IFBLK,
        FileType::CharDevice => libc::S_IFCHR,
        FileType::Fifo => libc::S_IFIFO,
        FileType::Socket => libc::S_IFSOCK,
        FileType::Unknown => 0,
    } as u32;
    Stat {
        dev: 1,
        ino: 1,
        mode: type_bits | perm,
        uid: 1000,
        gid: 1000,
        size: 0,
        mtime_sec: 0,
        mtime_nsec: 0,
    }
}
