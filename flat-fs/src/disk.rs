//! # 磁盘块管理层
//!
//! 持有整个镜像的缓存视图，负责块号到字节区域的翻译、
//! 空闲块位图的维护与块的分配回收。
//!
//! 0号块起始的`BLOCK_COUNT / 8`字节即空闲块位图；位图只对
//! 数据区负责，元数据块不进入分配器的扫描范围。

use std::sync::Arc;

use block_dev::BlockDevice;
use spin::Mutex;
use vfs::Error;

use crate::block_cache::{BlockCache, BlockCacheManager};
use crate::layout::Bitmap;
use crate::{BLOCK_COUNT, BLOCK_SIZE, FIRST_DATA_BLOCK};

/// 空闲块位图占据的字节数
const BITMAP_BYTES: usize = BLOCK_COUNT / 8;

pub struct Disk {
    cache: BlockCacheManager,
}

impl Disk {
    /// 接管镜像设备。`fresh`表示镜像是刚创建的空文件：
    /// 此时把0号块标记为已分配；否则磁盘上的元数据即为事实。
    pub fn new(dev: Arc<dyn BlockDevice>, fresh: bool) -> Self {
        let disk = Self {
            cache: BlockCacheManager::new(dev),
        };

        if fresh {
            let cache = disk.cache.get(0);
            let mut cache = cache.lock();
            Bitmap::new(&mut cache.bytes_mut()[..BITMAP_BYTES]).set(0, true);
        }

        disk
    }

    /// 取出编号对应的块缓存，越界时为空；调用者把空视作I/O错误
    pub fn block(&self, block_id: usize) -> Option<Arc<Mutex<BlockCache>>> {
        if block_id >= BLOCK_COUNT {
            log::error!("block: invalid block number {block_id}");
            return None;
        }
        Some(self.cache.get(block_id))
    }

    /// 自低位向高位线性扫描位图，取第一个空闲块。
    /// 新块返回前整块清零。
    pub fn alloc_block(&self) -> Result<usize, Error> {
        let cache = self.cache.get(0);
        let mut cache = cache.lock();
        let mut bitmap = Bitmap::new(&mut cache.bytes_mut()[..BITMAP_BYTES]);

        let Some(block_id) = (FIRST_DATA_BLOCK..BLOCK_COUNT).find(|&id| !bitmap.get(id)) else {
            log::error!("alloc_block: no free blocks available");
            return Err(Error::NoSpace);
        };
        bitmap.set(block_id, true);
        drop(cache);

        self.cache.get(block_id).lock().zeroize();
        log::debug!("+ alloc_block() -> {block_id}");
        Ok(block_id)
    }

    /// 释放一个数据块并整块清零。重复释放只告警，不算错误。
    pub fn free_block(&self, block_id: usize) {
        if !(FIRST_DATA_BLOCK..BLOCK_COUNT).contains(&block_id) {
            log::error!("free_block: invalid block number {block_id}");
            return;
        }

        let cache = self.cache.get(0);
        let mut cache = cache.lock();
        let mut bitmap = Bitmap::new(&mut cache.bytes_mut()[..BITMAP_BYTES]);
        if !bitmap.get(block_id) {
            log::warn!("free_block: block {block_id} is already free");
            return;
        }
        bitmap.set(block_id, false);
        drop(cache);

        self.cache.get(block_id).lock().zeroize();
        log::debug!("+ free_block({block_id})");
    }

    /// 把全部脏块与设备内容同步到磁盘
    #[inline]
    pub fn flush(&self) {
        self.cache.sync_all();
    }
}

/// 容纳指定字节数所需的块数
#[inline]
pub fn bytes_to_blocks(bytes: u64) -> u64 {
    bytes.div_ceil(BLOCK_SIZE as u64)
}
