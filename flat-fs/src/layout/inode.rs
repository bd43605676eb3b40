use vfs::Mode;

use crate::{MAX_FILE_BLOCKS, PATH_CAP};

/// 索引节点记录：一个文件或目录的全部元信息。
///
/// 没有目录项这一层——记录里存的是**完整的绝对路径**，
/// 目录从属关系由路径前缀匹配得出。文件数据的去向由内联的
/// 块映射`blocks[..block_count]`给出，映射从0号下标起连续生长。
#[derive(Debug, Clone)]
pub struct Inode {
    // 最后一字节留给 \0
    path: [u8; PATH_CAP],
    /// 文件逻辑长度（字节），可以小于已分配块的总容量
    pub size: u32,
    /// 块映射中在用的条目数
    pub block_count: u32,
    pub blocks: [u32; MAX_FILE_BLOCKS],
    pub mode: Mode,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

impl Inode {
    /// 记录在磁盘上的字节数
    pub const SIZE: usize = PATH_CAP + 4 + 4 + 4 * MAX_FILE_BLOCKS + 4 + 8 * 3;

    pub fn new(path: &str, mode: Mode, now: i64) -> Self {
        let bytes = path.as_bytes();
        let mut path = [0; PATH_CAP];
        path[..bytes.len()].copy_from_slice(bytes);

        Self {
            path,
            size: 0,
            block_count: 0,
            blocks: [0; MAX_FILE_BLOCKS],
            mode,
            atime: now,
            mtime: now,
            ctime: now,
        }
    }

    pub fn path(&self) -> &str {
        let len = self.path.iter().position(|&c| c == 0).unwrap_or(PATH_CAP);
        core::str::from_utf8(&self.path[..len]).expect("corrupt path in inode record")
    }

    /// 覆写路径，调用前须确认长度不超过`PATH_CAP - 1`
    pub fn set_path(&mut self, path: &str) {
        let bytes = path.as_bytes();
        self.path.fill(0);
        self.path[..bytes.len()].copy_from_slice(bytes);
    }

    /// 块映射中在用的部分
    #[inline]
    pub fn held_blocks(&self) -> &[u32] {
        &self.blocks[..self.block_count as usize]
    }

    /// 按固定宽度小端格式写出记录
    pub fn write_to(&self, out: &mut [u8]) {
        out[..PATH_CAP].copy_from_slice(&self.path);
        let mut at = PATH_CAP;
        put_u32(out, &mut at, self.size);
        put_u32(out, &mut at, self.block_count);
        for block in self.blocks {
            put_u32(out, &mut at, block);
        }
        put_u32(out, &mut at, self.mode.bits());
        for stamp in [self.atime, self.mtime, self.ctime] {
            put_i64(out, &mut at, stamp);
        }
    }

    /// 自磁盘字节重建记录
    pub fn read_from(raw: &[u8]) -> Self {
        let mut path = [0; PATH_CAP];
        path.copy_from_slice(&raw[..PATH_CAP]);
        let mut at = PATH_CAP;
        let size = take_u32(raw, &mut at);
        let block_count = take_u32(raw, &mut at);
        let mut blocks = [0; MAX_FILE_BLOCKS];
        for block in &mut blocks {
            *block = take_u32(raw, &mut at);
        }
        let mode = Mode::new(take_u32(raw, &mut at));
        let atime = take_i64(raw, &mut at);
        let mtime = take_i64(raw, &mut at);
        let ctime = take_i64(raw, &mut at);

        Self {
            path,
            size,
            block_count,
            blocks,
            mode,
            atime,
            mtime,
            ctime,
        }
    }
}

fn put_u32(out: &mut [u8], at: &mut usize, value: u32) {
    out[*at..*at + 4].copy_from_slice(&value.to_le_bytes());
    *at += 4;
}

fn put_i64(out: &mut [u8], at: &mut usize, value: i64) {
    out[*at..*at + 8].copy_from_slice(&value.to_le_bytes());
    *at += 8;
}

fn take_u32(raw: &[u8], at: &mut usize) -> u32 {
    let value = u32::from_le_bytes(raw[*at..*at + 4].try_into().unwrap());
    *at += 4;
    value
}

fn take_i64(raw: &[u8], at: &mut usize) -> i64 {
    let value = i64::from_le_bytes(raw[*at..*at + 8].try_into().unwrap());
    *at += 8;
    value
}
