//! # 索引节点表
//!
//! 全部文件元信息的内存数组，也是目录树的唯一事实来源。
//! 表常驻内存，每次变动整体写回保留的元数据块：
//! 1号块开头是小端`u32`的记录条数，2..=27号块逐条紧排记录。
//!
//! 表内只有前`len`个槽位有效；删除记录时数组向前压实，
//! 写回时顺带清零刚空出的槽位，保证存活记录之后全部为零。

use vfs::{Error, Mode};

use crate::disk::Disk;
use crate::layout::Inode;
use crate::{unix_now, BLOCK_SIZE, MAX_FILES, PATH_CAP};

/// 记录条数所在的块
const COUNT_BLOCK: usize = 1;
/// 记录区的首块
const FIRST_INODE_BLOCK: usize = 2;
/// 每块容纳的记录条数
const INODES_PER_BLOCK: usize = BLOCK_SIZE / Inode::SIZE;

pub struct InodeTable {
    inodes: Vec<Inode>,
}

impl InodeTable {
    /// 从保留块重建整张表。磁盘上的条数是可信值，
    /// 但超出容量说明镜像已损坏，直接终止。
    pub fn load(disk: &Disk) -> Self {
        let count = {
            let cache = disk.block(COUNT_BLOCK).unwrap();
            let cache = cache.lock();
            u32::from_le_bytes(cache.bytes()[..4].try_into().unwrap()) as usize
        };
        assert!(count <= MAX_FILES, "corrupt image: {count} inode records");

        let mut inodes = Vec::with_capacity(MAX_FILES);
        for index in 0..count {
            let (block_id, offset) = Self::slot(index);
            let cache = disk.block(block_id).unwrap();
            let cache = cache.lock();
            inodes.push(Inode::read_from(&cache.bytes()[offset..offset + Inode::SIZE]));
        }

        log::info!("loaded {count} inodes from disk");
        Self { inodes }
    }

    /// 把条数与全部存活记录写回保留块，随后同步落盘
    pub fn save(&self, disk: &Disk) {
        {
            let cache = disk.block(COUNT_BLOCK).unwrap();
            cache.lock().bytes_mut()[..4]
                .copy_from_slice(&(self.inodes.len() as u32).to_le_bytes());
        }

        for (index, inode) in self.inodes.iter().enumerate() {
            let (block_id, offset) = Self::slot(index);
            let cache = disk.block(block_id).unwrap();
            inode.write_to(&mut cache.lock().bytes_mut()[offset..offset + Inode::SIZE]);
        }

        // 清掉紧随其后的槽位：压实后留下的就是这一条旧记录
        if self.inodes.len() < MAX_FILES {
            let (block_id, offset) = Self::slot(self.inodes.len());
            let cache = disk.block(block_id).unwrap();
            cache.lock().bytes_mut()[offset..offset + Inode::SIZE].fill(0);
        }

        disk.flush();
        log::debug!("saved {} inodes to disk", self.inodes.len());
    }

    /// 记录在磁盘上的位置：`(块号, 块内偏移)`
    #[inline]
    fn slot(index: usize) -> (usize, usize) {
        (
            FIRST_INODE_BLOCK + index / INODES_PER_BLOCK,
            index % INODES_PER_BLOCK * Inode::SIZE,
        )
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inodes.len()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Inode> {
        self.inodes.iter()
    }

    #[inline]
    pub fn get(&self, index: usize) -> &Inode {
        &self.inodes[index]
    }

    #[inline]
    pub fn get_mut(&mut self, index: usize) -> &mut Inode {
        &mut self.inodes[index]
    }

    /// 线性扫描完整路径，返回命中的槽位下标
    pub fn position(&self, path: &str) -> Option<usize> {
        self.inodes.iter().position(|inode| inode.path() == path)
    }

    #[inline]
    pub fn find(&self, path: &str) -> Option<&Inode> {
        self.position(path).map(|index| &self.inodes[index])
    }

    /// 在表尾追加一条新记录并落盘。
    /// 新文件不预分配数据块，块映射推迟到首次写入时生长。
    pub fn create(&mut self, path: &str, mode: Mode, disk: &Disk) -> Result<usize, Error> {
        if self.inodes.len() >= MAX_FILES {
            log::error!("create: inode table is full");
            return Err(Error::NoSpace);
        }
        if path.len() >= PATH_CAP {
            log::error!("create: path too long: {path}");
            return Err(Error::NameTooLong);
        }

        let index = self.inodes.len();
        self.inodes.push(Inode::new(path, mode, unix_now()));
        self.save(disk);
        Ok(index)
    }

    /// 为记录的块映射追加一个新分配的数据块
    pub fn add_block(&mut self, index: usize, disk: &Disk) -> Result<u32, Error> {
        let inode = &mut self.inodes[index];
        if inode.held_blocks().len() == inode.blocks.len() {
            log::error!("add_block: block map is full for {}", inode.path());
            return Err(Error::NoSpace);
        }

        let block_id = disk.alloc_block()? as u32;
        inode.blocks[inode.block_count as usize] = block_id;
        inode.block_count += 1;
        self.save(disk);
        Ok(block_id)
    }

    /// 释放记录持有的全部数据块，并把数组压实后落盘
    pub fn remove(&mut self, index: usize, disk: &Disk) {
        let inode = self.inodes.remove(index);
        for &block_id in inode.held_blocks() {
            disk.free_block(block_id as usize);
        }
        self.save(disk);
    }
}
