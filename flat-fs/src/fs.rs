//! # 回调层
//!
//! 实现挂载桥分派下来的各个文件系统操作。路径在入口处统一
//! 规范化；操作按到达顺序逐个执行，每次元数据变动先落盘再返回。

use std::sync::Arc;

use block_dev::BlockDevice;
use vfs::{DirEntry, Error, FileKind, Mode, Stat};

use crate::disk::{bytes_to_blocks, Disk};
use crate::path::Path;
use crate::table::InodeTable;
use crate::{unix_now, BLOCK_SIZE, PATH_CAP};

/// 一次挂载。独占镜像的缓存视图与索引节点表，
/// 生命周期覆盖全部操作。
pub struct FlatFileSystem {
    disk: Disk,
    table: InodeTable,
    /// `getattr`报告的属主，由挂载方提供
    owner: (u32, u32),
}

impl FlatFileSystem {
    /// 接管镜像并重建索引节点表。`fresh`的含义见[`Disk::new`]。
    /// 挂载完成即保证根目录存在。
    pub fn mount(dev: Arc<dyn BlockDevice>, fresh: bool) -> Self {
        let disk = Disk::new(dev, fresh);
        let mut table = InodeTable::load(&disk);

        if table.find("/").is_none() {
            table
                .create("/", Mode::directory(0o755), &disk)
                .expect("bootstrap root inode");
        }

        log::info!("storage initialized: {} inodes", table.len());
        Self {
            disk,
            table,
            owner: (0, 0),
        }
    }

    /// 挂载方告知`getattr`应报告的属主
    pub fn set_owner(&mut self, uid: u32, gid: u32) {
        self.owner = (uid, gid);
    }

    /// 存在即可访问，权限不做检查
    pub fn access(&self, path: &str, mask: u32) -> Result<(), Error> {
        let path = path.trimmed();
        if self.table.find(path).is_none() {
            log::warn!("access: {path} not found");
            return Err(Error::NotFound);
        }

        log::info!("access({path}, {mask:#o}) -> 0");
        Ok(())
    }

    pub fn getattr(&self, path: &str) -> Result<Stat, Error> {
        let path = path.trimmed();
        let Some(inode) = self.table.find(path) else {
            log::warn!("getattr: no inode for {path}");
            return Err(Error::NotFound);
        };

        let stat = Stat {
            mode: inode.mode,
            nlink: if inode.mode.is_dir() { 2 } else { 1 },
            uid: self.owner.0,
            gid: self.owner.1,
            size: inode.size as u64,
            atime: inode.atime,
            mtime: inode.mtime,
            ctime: inode.ctime,
            blocks: bytes_to_blocks(inode.size as u64),
            block_size: BLOCK_SIZE as u32,
        };
        log::info!(
            "getattr({path}) -> mode: {:?}, size: {}",
            stat.mode,
            stat.size
        );
        Ok(stat)
    }

    /// 列出目录的直接子项，`.`与`..`恒为前两项
    pub fn readdir(&self, path: &str) -> Result<Vec<DirEntry>, Error> {
        let path = path.trimmed();
        let Some(dir_index) = self.table.position(path) else {
            log::warn!("readdir: {path} not found");
            return Err(Error::NotFound);
        };
        if !self.table.get(dir_index).mode.is_dir() {
            log::warn!("readdir: {path} is not a directory");
            return Err(Error::NotADirectory);
        }

        // 根目录的父目录是它自己
        let parent_index = path
            .parent_file()
            .and_then(|(parent, _)| self.table.position(parent))
            .unwrap_or(dir_index);

        let mut entries = vec![
            DirEntry {
                ino: dir_index as u64,
                kind: FileKind::Directory,
                name: ".".into(),
            },
            DirEntry {
                ino: parent_index as u64,
                kind: FileKind::Directory,
                name: "..".into(),
            },
        ];
        for (index, inode) in self.table.iter().enumerate() {
            if let Some(name) = inode.path().child_name(path) {
                entries.push(DirEntry {
                    ino: index as u64,
                    kind: if inode.mode.is_dir() {
                        FileKind::Directory
                    } else {
                        FileKind::Regular
                    },
                    name: name.into(),
                });
            }
        }

        log::info!("readdir({path}) -> {} entries", entries.len());
        Ok(entries)
    }

    pub fn mknod(&mut self, path: &str, mode: Mode) -> Result<(), Error> {
        let path = path.trimmed();
        if self.table.find(path).is_some() {
            log::warn!("mknod: {path} already exists");
            return Err(Error::AlreadyExists);
        }

        // 不带类型位的模式字替换成普通文件的缺省模式
        let mode = if mode.kind().is_empty() {
            Mode::regular(0o644)
        } else {
            mode
        };
        self.table.create(path, mode, &self.disk)?;

        log::info!("mknod({path}, {mode:?}) -> 0");
        Ok(())
    }

    pub fn mkdir(&mut self, path: &str, mode: Mode) -> Result<(), Error> {
        let path = path.trimmed();
        if self.table.find(path).is_some() {
            log::warn!("mkdir: {path} already exists");
            return Err(Error::AlreadyExists);
        }

        self.table
            .create(path, mode.with(FileKind::Directory), &self.disk)?;

        log::info!("mkdir({path}, {mode:?}) -> 0");
        Ok(())
    }

    /// 删除普通文件：归还全部数据块，再摘除记录
    pub fn unlink(&mut self, path: &str) -> Result<(), Error> {
        let path = path.trimmed();
        let Some(index) = self.table.position(path) else {
            log::warn!("unlink: {path} not found");
            return Err(Error::NotFound);
        };
        if self.table.get(index).mode.is_dir() {
            log::warn!("unlink: {path} is a directory");
            return Err(Error::IsADirectory);
        }

        self.table.remove(index, &self.disk);
        log::info!("unlink({path}) -> 0");
        Ok(())
    }

    /// 删除空目录。根目录永远删不掉。
    pub fn rmdir(&mut self, path: &str) -> Result<(), Error> {
        let path = path.trimmed();
        let Some(index) = self.table.position(path) else {
            log::warn!("rmdir: {path} not found");
            return Err(Error::NotFound);
        };
        if !self.table.get(index).mode.is_dir() {
            log::warn!("rmdir: {path} is not a directory");
            return Err(Error::NotFound);
        }
        if path == "/"
            || self
                .table
                .iter()
                .any(|inode| inode.path().child_name(path).is_some())
        {
            log::warn!("rmdir: {path} is not empty");
            return Err(Error::DirectoryNotEmpty);
        }

        self.table.remove(index, &self.disk);
        log::info!("rmdir({path}) -> 0");
        Ok(())
    }

    /// 改名只覆写记录里的路径；目录的子项不随之改写
    pub fn rename(&mut self, from: &str, to: &str) -> Result<(), Error> {
        let from = from.trimmed();
        let to = to.trimmed();

        let Some(index) = self.table.position(from) else {
            log::warn!("rename: source {from} not found");
            return Err(Error::NotFound);
        };
        if self.table.find(to).is_some() {
            log::warn!("rename: destination {to} already exists");
            return Err(Error::AlreadyExists);
        }
        if to.len() >= PATH_CAP {
            log::warn!("rename: destination {to} is too long");
            return Err(Error::NameTooLong);
        }

        let now = unix_now();
        let inode = self.table.get_mut(index);
        inode.set_path(to);
        inode.mtime = now;
        inode.ctime = now;
        self.table.save(&self.disk);

        log::info!("rename({from} -> {to}) -> 0");
        Ok(())
    }

    /// 自`offset`起写入`buf`，返回写入的字节数。
    /// 空间耗尽时已写入的部分照常生效。
    pub fn write(&mut self, path: &str, buf: &[u8], offset: u64) -> Result<usize, Error> {
        let path = path.trimmed();
        let Some(index) = self.table.position(path) else {
            log::warn!("write: no inode for {path}");
            return Err(Error::NotFound);
        };
        if !self.table.get(index).mode.is_regular() {
            log::warn!("write: {path} is not a regular file");
            return Err(Error::IsADirectory);
        }

        let offset = offset as usize;
        let mut done = 0;
        'copy: while done < buf.len() {
            let at = offset + done;
            let block_index = at / BLOCK_SIZE;
            let block_offset = at % BLOCK_SIZE;
            let chunk = (buf.len() - done).min(BLOCK_SIZE - block_offset);

            // 块映射从不跳块：大偏移的写入先把中间的块全部补齐
            while block_index >= self.table.get(index).held_blocks().len() {
                match self.table.add_block(index, &self.disk) {
                    Ok(_) => (),
                    Err(err) if done == 0 => return Err(err),
                    Err(_) => break 'copy,
                }
            }

            let block_id = self.table.get(index).blocks[block_index] as usize;
            let cache = self.disk.block(block_id).ok_or(Error::Io)?;
            cache.lock().bytes_mut()[block_offset..block_offset + chunk]
                .copy_from_slice(&buf[done..done + chunk]);
            done += chunk;
        }

        let now = unix_now();
        let inode = self.table.get_mut(index);
        if offset + done > inode.size as usize {
            inode.size = (offset + done) as u32;
        }
        inode.mtime = now;
        inode.ctime = now;
        self.table.save(&self.disk);

        log::info!("write({path}, {}, {offset}) -> {done}", buf.len());
        Ok(done)
    }

    /// 自`offset`起读入`buf`，返回读出的字节数。
    /// 块映射先于文件长度结束时产生短读。
    pub fn read(&mut self, path: &str, buf: &mut [u8], offset: u64) -> Result<usize, Error> {
        let path = path.trimmed();
        let Some(index) = self.table.position(path) else {
            log::warn!("read: no inode for {path}");
            return Err(Error::NotFound);
        };
        if !self.table.get(index).mode.is_regular() {
            log::warn!("read: {path} is not a regular file");
            return Err(Error::IsADirectory);
        }

        let offset = offset as usize;
        if offset >= self.table.get(index).size as usize {
            return Ok(0);
        }
        let size = buf.len().min(self.table.get(index).size as usize - offset);

        let mut done = 0;
        while done < size {
            let at = offset + done;
            let block_index = at / BLOCK_SIZE;
            let block_offset = at % BLOCK_SIZE;
            let chunk = (size - done).min(BLOCK_SIZE - block_offset);

            let inode = self.table.get(index);
            if block_index >= inode.held_blocks().len() {
                break;
            }

            let block_id = inode.blocks[block_index] as usize;
            let cache = self.disk.block(block_id).ok_or(Error::Io)?;
            buf[done..done + chunk]
                .copy_from_slice(&cache.lock().bytes()[block_offset..block_offset + chunk]);
            done += chunk;
        }

        // 读也要记下访问时间并落盘
        self.table.get_mut(index).atime = unix_now();
        self.table.save(&self.disk);

        log::info!("read({path}, {}, {offset}) -> {done}", buf.len());
        Ok(done)
    }
}
