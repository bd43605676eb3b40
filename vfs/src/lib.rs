//! 上层回调所交换的类型：错误、文件元信息与目录项。
//! 独立成crate，挂载桥与文件系统核心共用。

#![no_std]

extern crate alloc;

mod dirent;
mod error;
mod stat;

pub use self::{
    dirent::DirEntry,
    error::Error,
    stat::{FileKind, Mode, Stat},
};
