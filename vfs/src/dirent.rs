use alloc::string::String;

use crate::FileKind;

/// `readdir`产出的目录项
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// 索引节点编号
    pub ino: u64,
    pub kind: FileKind,
    pub name: String,
}
