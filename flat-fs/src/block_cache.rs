//! # 块缓存层
//!
//! 镜像块先装进内存再读写；写过的块带上脏标记，在换出、
//! 同步或挂载结束时写回设备。上层对镜像的全部访问都经过
//! 这一层，等价于一块按需换入的映射区。
//!
//! 缓存池由挂载独占持有，换出走LRU：池子记录每个块最近
//! 一次被取用的时刻，满了就换掉其中最久没人碰过的那个。

use std::sync::Arc;

use block_dev::BlockDevice;
use spin::Mutex;

use crate::{DataBlock, BLOCK_COUNT, BLOCK_SIZE};

/// 内存中的镜像块
pub struct BlockCache {
    /// 缓存的数据
    data: DataBlock,
    /// 对应的块号
    block_id: usize,
    /// 底层块设备的引用
    dev: Arc<dyn BlockDevice>,
    /// 内容是否比设备上的新
    dirty: bool,
}

impl BlockCache {
    /// 把设备上的一个块装进内存
    fn read(block_id: usize, dev: Arc<dyn BlockDevice>) -> Self {
        let mut data = [0; BLOCK_SIZE];
        dev.read_block(block_id, &mut data);

        Self {
            data,
            block_id,
            dev,
            dirty: false,
        }
    }

    /// 脏块写回设备，干净的块什么都不做
    pub fn write_back(&mut self) {
        if self.dirty {
            self.dev.write_block(self.block_id, &self.data);
            self.dirty = false;
        }
    }

    #[inline]
    pub fn bytes(&self) -> &DataBlock {
        &self.data
    }

    #[inline]
    pub fn bytes_mut(&mut self) -> &mut DataBlock {
        self.dirty = true;
        &mut self.data
    }

    /// 整块清零
    pub fn zeroize(&mut self) {
        self.data.fill(0);
        self.dirty = true;
    }
}

impl Drop for BlockCache {
    fn drop(&mut self) {
        self.write_back();
    }
}

/// 缓存池里的一个槽位
struct Slot {
    block_id: usize,
    /// 最近一次取用的时刻（池内计数）
    last_used: u64,
    cache: Arc<Mutex<BlockCache>>,
}

struct Pool {
    /// 取用计数，充当LRU的时钟
    ticks: u64,
    slots: Vec<Slot>,
}

/// 挂载持有的块缓存池
pub struct BlockCacheManager {
    /// 底层块设备的引用
    dev: Arc<dyn BlockDevice>,
    pool: Mutex<Pool>,
}

impl BlockCacheManager {
    /// 槽位数。元数据占据镜像开头的28块，池子装得下整个
    /// 元数据区，还能给数据块留点余地。
    const SLOTS: usize = 32;

    pub fn new(dev: Arc<dyn BlockDevice>) -> Self {
        Self {
            dev,
            pool: Mutex::new(Pool {
                ticks: 0,
                slots: Vec::new(),
            }),
        }
    }

    pub fn get(&self, block_id: usize) -> Arc<Mutex<BlockCache>> {
        assert!(block_id < BLOCK_COUNT);
        let mut pool = self.pool.lock();
        pool.ticks += 1;
        let now = pool.ticks;

        if let Some(slot) = pool.slots.iter_mut().find(|slot| slot.block_id == block_id) {
            slot.last_used = now;
            return slot.cache.clone();
        }

        if pool.slots.len() == Self::SLOTS {
            pool.evict();
        }

        let cache = Arc::new(Mutex::new(BlockCache::read(block_id, self.dev.clone())));
        pool.slots.push(Slot {
            block_id,
            last_used: now,
            cache: cache.clone(),
        });
        cache
    }

    /// 写回全部脏块，并请求设备落盘
    pub fn sync_all(&self) {
        for slot in self.pool.lock().slots.iter() {
            slot.cache.lock().write_back();
        }
        self.dev.sync();
    }
}

impl Pool {
    /// 腾出一个槽位：换掉最久未取用的块。
    /// 上层正借着的块（引用计数大于1）不能动。
    fn evict(&mut self) {
        let victim = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| Arc::strong_count(&slot.cache) == 1)
            .min_by_key(|(_, slot)| slot.last_used)
            .map(|(index, _)| index)
            .expect("every cached block is pinned");

        // swap_remove放掉的Arc是最后一个引用，写回发生在Drop里
        self.slots.swap_remove(victim);
    }
}
