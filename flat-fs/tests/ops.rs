//! 以内存里的镜像驱动整个回调面。

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use block_dev::BlockDevice;
use flat_fs::layout::{Bitmap, Inode};
use flat_fs::{
    FlatFileSystem, BLOCK_COUNT, BLOCK_SIZE, FIRST_DATA_BLOCK, IMAGE_SIZE, MAX_FILES,
    MAX_FILE_BLOCKS,
};
use vfs::{Error, Mode};

/// `Vec`承载的镜像；克隆体共享同一份数据，可用于"重新挂载"
#[derive(Clone)]
struct MemDisk(Arc<Mutex<Vec<u8>>>);

impl MemDisk {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(vec![0; IMAGE_SIZE])))
    }

    fn snapshot(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl BlockDevice for MemDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        let data = self.0.lock().unwrap();
        buf.copy_from_slice(&data[block_id * BLOCK_SIZE..][..buf.len()]);
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        let mut data = self.0.lock().unwrap();
        data[block_id * BLOCK_SIZE..][..buf.len()].copy_from_slice(buf);
    }
}

fn mount_empty() -> (MemDisk, FlatFileSystem) {
    let disk = MemDisk::new();
    let fs = FlatFileSystem::mount(Arc::new(disk.clone()), true);
    (disk, fs)
}

#[test]
fn create_write_read() {
    let (_, mut fs) = mount_empty();
    fs.mkdir("/d", Mode::new(0o755)).unwrap();
    fs.mknod("/d/f", Mode::regular(0o644)).unwrap();
    assert_eq!(fs.write("/d/f", b"hello", 0).unwrap(), 5);

    let mut buf = [0u8; 5];
    assert_eq!(fs.read("/d/f", &mut buf, 0).unwrap(), 5);
    assert_eq!(&buf, b"hello");
    assert_eq!(fs.getattr("/d/f").unwrap().size, 5);
}

#[test]
fn listing_direct_children() {
    let (_, mut fs) = mount_empty();
    fs.mkdir("/d", Mode::new(0o755)).unwrap();
    fs.mknod("/a", Mode::new(0)).unwrap();
    fs.mknod("/d/f", Mode::new(0)).unwrap();
    fs.mknod("/d/g", Mode::new(0)).unwrap();

    let names: Vec<String> = fs
        .readdir("/")
        .unwrap()
        .into_iter()
        .map(|entry| entry.name)
        .collect();
    assert_eq!(names, [".", "..", "d", "a"]);

    let names: Vec<String> = fs
        .readdir("/d")
        .unwrap()
        .into_iter()
        .map(|entry| entry.name)
        .collect();
    assert_eq!(names, [".", "..", "f", "g"]);

    assert_eq!(fs.readdir("/a").unwrap_err(), Error::NotADirectory);
    assert_eq!(fs.readdir("/missing").unwrap_err(), Error::NotFound);
}

#[test]
fn write_spans_block_boundary() {
    let (_, mut fs) = mount_empty();
    fs.mknod("/big", Mode::new(0)).unwrap();

    let data = vec![b'A'; BLOCK_SIZE + 1];
    assert_eq!(fs.write("/big", &data, 0).unwrap(), BLOCK_SIZE + 1);

    let stat = fs.getattr("/big").unwrap();
    assert_eq!(stat.size, (BLOCK_SIZE + 1) as u64);
    assert_eq!(stat.blocks, 2);

    // 块边界两侧各读一字节
    let mut buf = [0u8; 2];
    assert_eq!(fs.read("/big", &mut buf, (BLOCK_SIZE - 1) as u64).unwrap(), 2);
    assert_eq!(&buf, b"AA");
}

#[test]
fn empty_mode_becomes_regular() {
    let (_, mut fs) = mount_empty();
    fs.mknod("/f", Mode::new(0)).unwrap();

    let stat = fs.getattr("/f").unwrap();
    assert_eq!(stat.mode, Mode::regular(0o644));
    assert_eq!(stat.nlink, 1);
    assert_eq!(stat.block_size, BLOCK_SIZE as u32);

    assert_eq!(fs.getattr("/").unwrap().nlink, 2);
    assert_eq!(fs.mknod("/f", Mode::new(0)).unwrap_err(), Error::AlreadyExists);
}

#[test]
fn file_growth_stops_at_block_map_capacity() {
    let (_, mut fs) = mount_empty();
    fs.mknod("/f", Mode::new(0)).unwrap();

    let cap = MAX_FILE_BLOCKS * BLOCK_SIZE;
    let data = vec![0x5a; cap];
    assert_eq!(fs.write("/f", &data, 0).unwrap(), cap);

    // 跨越映射容量的写入产生短写
    assert_eq!(fs.write("/f", &[1, 2, 3, 4], (cap - 2) as u64).unwrap(), 2);
    assert_eq!(fs.getattr("/f").unwrap().size, cap as u64);

    // 映射已满，从头开始的写入寸步难行
    assert_eq!(fs.write("/f", b"x", cap as u64).unwrap_err(), Error::NoSpace);
}

#[test]
fn device_exhaustion_yields_short_write() {
    let (_, mut fs) = mount_empty();

    // 数据区共 BLOCK_COUNT - FIRST_DATA_BLOCK = 228 块
    fs.mknod("/a", Mode::new(0)).unwrap();
    let full = MAX_FILE_BLOCKS * BLOCK_SIZE;
    assert_eq!(fs.write("/a", &vec![1; full], 0).unwrap(), full);

    // 剩余100块，申请101块只能写满100块
    let rest = (BLOCK_COUNT - FIRST_DATA_BLOCK - MAX_FILE_BLOCKS) * BLOCK_SIZE;
    fs.mknod("/b", Mode::new(0)).unwrap();
    assert_eq!(fs.write("/b", &vec![2; rest + BLOCK_SIZE], 0).unwrap(), rest);
    assert_eq!(fs.getattr("/b").unwrap().size, rest as u64);

    fs.mknod("/c", Mode::new(0)).unwrap();
    assert_eq!(fs.write("/c", b"x", 0).unwrap_err(), Error::NoSpace);
}

#[test]
fn allocator_reuses_lowest_freed_block() {
    let (disk, mut fs) = mount_empty();

    fs.mknod("/a", Mode::new(0)).unwrap();
    fs.write("/a", &vec![1; 2 * BLOCK_SIZE], 0).unwrap();
    fs.mknod("/b", Mode::new(0)).unwrap();
    fs.write("/b", &[2], 0).unwrap();

    fs.unlink("/a").unwrap();
    fs.mknod("/c", Mode::new(0)).unwrap();
    fs.write("/c", &[3], 0).unwrap();

    // 分配顺序确定：释放过的最低块号先被重用
    let image = disk.snapshot();
    let count =
        u32::from_le_bytes(image[BLOCK_SIZE..BLOCK_SIZE + 4].try_into().unwrap()) as usize;
    let per_block = BLOCK_SIZE / Inode::SIZE;
    let record = (0..count)
        .map(|i| {
            let offset = (2 + i / per_block) * BLOCK_SIZE + i % per_block * Inode::SIZE;
            Inode::read_from(&image[offset..offset + Inode::SIZE])
        })
        .find(|record| record.path() == "/c")
        .unwrap();
    assert_eq!(record.held_blocks(), &[FIRST_DATA_BLOCK as u32]);
}

#[test]
fn inode_table_capacity() {
    let (_, mut fs) = mount_empty();

    // 根目录占掉一个槽位
    for i in 0..MAX_FILES - 1 {
        fs.mknod(&format!("/f{i}"), Mode::new(0)).unwrap();
    }
    assert_eq!(
        fs.mknod("/one-too-many", Mode::new(0)).unwrap_err(),
        Error::NoSpace
    );
}

#[test]
fn removal_errors() {
    let (_, mut fs) = mount_empty();
    fs.mkdir("/d", Mode::new(0o755)).unwrap();
    fs.mknod("/d/f", Mode::new(0)).unwrap();

    assert_eq!(fs.unlink("/missing").unwrap_err(), Error::NotFound);
    assert_eq!(fs.unlink("/d").unwrap_err(), Error::IsADirectory);
    assert_eq!(fs.rmdir("/d").unwrap_err(), Error::DirectoryNotEmpty);
    assert_eq!(fs.rmdir("/d/f").unwrap_err(), Error::NotFound);
    assert_eq!(fs.rmdir("/").unwrap_err(), Error::DirectoryNotEmpty);

    fs.unlink("/d/f").unwrap();
    fs.rmdir("/d").unwrap();
    assert_eq!(fs.getattr("/d").unwrap_err(), Error::NotFound);
}

#[test]
fn contents_survive_remount() {
    let disk = MemDisk::new();
    {
        let mut fs = FlatFileSystem::mount(Arc::new(disk.clone()), true);
        fs.mknod("/a", Mode::new(0)).unwrap();
        assert_eq!(fs.write("/a", b"xyz", 0).unwrap(), 3);
    }

    let mut fs = FlatFileSystem::mount(Arc::new(disk.clone()), false);
    let mut buf = [0u8; 3];
    assert_eq!(fs.read("/a", &mut buf, 0).unwrap(), 3);
    assert_eq!(&buf, b"xyz");
    assert_eq!(fs.getattr("/a").unwrap().size, 3);
}

#[test]
fn unlink_returns_image_to_prior_state() {
    let disk = MemDisk::new();
    let mut fs = FlatFileSystem::mount(Arc::new(disk.clone()), true);
    fs.mkdir("/keep", Mode::new(0o755)).unwrap();
    let before = disk.snapshot();

    fs.mknod("/scratch", Mode::new(0)).unwrap();
    fs.write("/scratch", &vec![7u8; BLOCK_SIZE * 2 + 5], 0).unwrap();
    fs.unlink("/scratch").unwrap();

    assert_eq!(before, disk.snapshot());
}

#[test]
fn rename_moves_and_restores() {
    let (_, mut fs) = mount_empty();
    fs.mknod("/a", Mode::new(0)).unwrap();
    assert_eq!(fs.write("/a", b"data", 0).unwrap(), 4);
    let stat = fs.getattr("/a").unwrap();

    fs.rename("/a", "/b").unwrap();
    assert_eq!(fs.getattr("/a").unwrap_err(), Error::NotFound);
    fs.rename("/b", "/a").unwrap();

    let back = fs.getattr("/a").unwrap();
    assert_eq!(stat.mode, back.mode);
    assert_eq!(stat.size, back.size);
    let mut buf = [0u8; 4];
    assert_eq!(fs.read("/a", &mut buf, 0).unwrap(), 4);
    assert_eq!(&buf, b"data");
}

#[test]
fn rename_validation() {
    let (_, mut fs) = mount_empty();
    fs.mknod("/a", Mode::new(0)).unwrap();
    fs.mknod("/b", Mode::new(0)).unwrap();

    assert_eq!(fs.rename("/a", "/b").unwrap_err(), Error::AlreadyExists);
    assert_eq!(fs.rename("/missing", "/c").unwrap_err(), Error::NotFound);

    let long = format!("/{}", "n".repeat(300));
    assert_eq!(fs.rename("/a", &long).unwrap_err(), Error::NameTooLong);
    assert_eq!(fs.mknod(&long, Mode::new(0)).unwrap_err(), Error::NameTooLong);
}

#[test]
fn far_offset_write_fills_map_contiguously() {
    let (_, mut fs) = mount_empty();
    fs.mknod("/sparse", Mode::new(0)).unwrap();
    assert_eq!(fs.write("/sparse", b"end", 10_000).unwrap(), 3);

    let stat = fs.getattr("/sparse").unwrap();
    assert_eq!(stat.size, 10_003);
    assert_eq!(stat.blocks, 3);

    // 中间补齐的块读出来全是零
    let mut head = [0xffu8; 16];
    assert_eq!(fs.read("/sparse", &mut head, 0).unwrap(), 16);
    assert_eq!(head, [0; 16]);

    let mut tail = [0u8; 3];
    assert_eq!(fs.read("/sparse", &mut tail, 10_000).unwrap(), 3);
    assert_eq!(&tail, b"end");
}

#[test]
fn reads_past_end_are_clamped() {
    let (_, mut fs) = mount_empty();
    fs.mknod("/f", Mode::new(0)).unwrap();
    assert_eq!(fs.write("/f", b"abc", 0).unwrap(), 3);

    let mut buf = [0u8; 8];
    assert_eq!(fs.read("/f", &mut buf, 0).unwrap(), 3);
    assert_eq!(fs.read("/f", &mut buf, 3).unwrap(), 0);
    assert_eq!(fs.read("/f", &mut buf, 100).unwrap(), 0);
}

#[test]
fn trailing_slashes_are_trimmed() {
    let (_, mut fs) = mount_empty();
    fs.mkdir("/d", Mode::new(0o755)).unwrap();

    assert!(fs.access("/d/", 0).is_ok());
    assert!(fs.access("/d//", 0).is_ok());
    assert_eq!(
        fs.mkdir("/d///", Mode::new(0o755)).unwrap_err(),
        Error::AlreadyExists
    );
}

/// 对着磁盘字节重建状态，检查块记账的不变量：
/// 映射里的块号都不小于数据区起点、都在位图中、互不重复。
#[test]
fn block_bookkeeping_invariants() {
    let disk = MemDisk::new();
    let mut fs = FlatFileSystem::mount(Arc::new(disk.clone()), true);

    fs.mkdir("/d", Mode::new(0o755)).unwrap();
    for (i, len) in [100usize, BLOCK_SIZE + 1, 3 * BLOCK_SIZE].iter().enumerate() {
        let path = format!("/d/f{i}");
        fs.mknod(&path, Mode::new(0)).unwrap();
        fs.write(&path, &vec![i as u8; *len], 0).unwrap();
    }
    // 压实路径也顺带检验
    fs.unlink("/d/f1").unwrap();

    let image = disk.snapshot();
    let count =
        u32::from_le_bytes(image[BLOCK_SIZE..BLOCK_SIZE + 4].try_into().unwrap()) as usize;
    assert!(count <= MAX_FILES);

    let per_block = BLOCK_SIZE / Inode::SIZE;
    let mut held = HashSet::new();
    for i in 0..count {
        let offset = (2 + i / per_block) * BLOCK_SIZE + i % per_block * Inode::SIZE;
        let record = Inode::read_from(&image[offset..offset + Inode::SIZE]);
        for &block in record.held_blocks() {
            assert!((FIRST_DATA_BLOCK..BLOCK_COUNT).contains(&(block as usize)));
            assert!(held.insert(block), "block {block} mapped twice");
        }
    }

    let mut region = image[..BLOCK_COUNT / 8].to_vec();
    let bitmap = Bitmap::new(&mut region);
    assert!(bitmap.get(0));
    for block in held {
        assert!(bitmap.get(block as usize));
    }
}
