//! # 磁盘数据结构层
//!
//! 镜像的布局（以块为单位）：
//!
//! | 块号 | 角色 |
//! |---|---|
//! | 0 | 空闲块位图 |
//! | 1 | 索引节点计数 |
//! | 2..=27 | 索引节点记录，逐条紧排 |
//! | 28.. | 文件数据块 |
//!
//! 记录采用固定宽度小端字段逐一序列化，与宿主体系结构无关。

mod bitmap;
pub use bitmap::Bitmap;

mod inode;
pub use inode::Inode;
