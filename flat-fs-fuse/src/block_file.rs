use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use block_dev::BlockDevice;
use flat_fs::{BLOCK_SIZE, IMAGE_SIZE};

/// 以宿主文件承载镜像的块设备
pub struct BlockFile(Mutex<File>);

impl BlockFile {
    /// Opens (creating when absent) the image and shapes it to the fixed
    /// size. The second return value tells whether the image started out
    /// as a brand-new empty file.
    pub fn open(path: &Path) -> io::Result<(Self, bool)> {
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let prior = fd.metadata()?.len();
        if prior != IMAGE_SIZE as u64 {
            fd.set_len(IMAGE_SIZE as u64)?;
        }

        Ok((Self(Mutex::new(fd)), prior == 0))
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        let mut image = self.0.lock().unwrap();
        image
            .seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .expect("image seek failed");
        // 镜像大小固定，读不满一块说明镜像坏了
        image.read_exact(buf).expect("image read failed");
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        let mut image = self.0.lock().unwrap();
        image
            .seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .expect("image seek failed");
        image.write_all(buf).expect("image write failed");
    }

    fn sync(&self) {
        self.0.lock().unwrap().sync_data().expect("image sync failed");
    }
}
