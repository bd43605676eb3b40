//! # flat-fs
//!
//! 单个定长磁盘镜像之上的扁平路径文件系统。整体架构自下而上：
//!
//! - 块设备接口层：读写镜像的抽象（`block-dev` crate）
//! - 块缓存层：内存上的镜像块数据缓存，承担"映射区"的角色
//! - 磁盘块管理层：空闲块位图与块分配器（[`disk`]）
//! - 磁盘数据结构层：位图视图与索引节点记录（[`layout`]）
//! - 索引节点表与回调层：目录树即全部路径的线性表（[`FlatFileSystem`]）
//!
//! 没有目录项记录：目录的子项由各索引节点存储的**完整路径**
//! 经字符串匹配得出。

mod block_cache;
mod disk;
mod fs;
pub mod layout;
mod path;
mod table;

pub use self::disk::bytes_to_blocks;
pub use self::fs::FlatFileSystem;

pub const BLOCK_SIZE: usize = 4096;
pub const BLOCK_COUNT: usize = 256;
/// 镜像文件的固定大小：1 MiB
pub const IMAGE_SIZE: usize = BLOCK_SIZE * BLOCK_COUNT;
/// 分配器发放的最小块号，更小的块保留给元数据
pub const FIRST_DATA_BLOCK: usize = 28;
/// 索引节点表的容量
pub const MAX_FILES: usize = 128;
/// 单个文件的块映射容量
pub const MAX_FILE_BLOCKS: usize = 128;
/// 路径缓冲区容量，含结尾的NUL
pub const PATH_CAP: usize = 256;

type DataBlock = [u8; BLOCK_SIZE];

/// 当前Unix时间戳（秒）
pub(crate) fn unix_now() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs() as i64)
}
