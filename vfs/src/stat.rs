use core::fmt;

use enumflags2::{bitflags, BitFlags};

/// 文件类型位，取POSIX模式字中的值
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory = 0o040000,
    Regular = 0o100000,
}

/// POSIX模式字：类型位与权限位的按位或。
/// 仅存储，不据此做访问控制。
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct Mode(u32);

impl Mode {
    #[inline]
    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    #[inline]
    pub fn directory(perm: u32) -> Self {
        Self(FileKind::Directory as u32 | perm)
    }

    #[inline]
    pub fn regular(perm: u32) -> Self {
        Self(FileKind::Regular as u32 | perm)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// 模式字中的类型位
    #[inline]
    pub fn kind(self) -> BitFlags<FileKind> {
        BitFlags::from_bits_truncate(self.0)
    }

    /// 追加一个类型位，保留权限位
    #[inline]
    pub fn with(self, kind: FileKind) -> Self {
        Self(self.0 | kind as u32)
    }

    #[inline]
    pub fn is_dir(self) -> bool {
        self.kind().contains(FileKind::Directory)
    }

    #[inline]
    pub fn is_regular(self) -> bool {
        self.kind().contains(FileKind::Regular)
    }
}

impl fmt::Debug for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0o{:o}", self.0)
    }
}

/// `getattr`填充的文件元信息
#[derive(Debug, Clone)]
#[repr(C)]
pub struct Stat {
    pub mode: Mode,
    /// 硬链接数：目录恒为2，文件恒为1
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    /// 文件逻辑长度（字节）
    pub size: u64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    /// 容纳`size`所需的块数
    pub blocks: u64,
    /// 最优I/O块大小
    pub block_size: u32,
}
