//! # 块设备接口层
//!
//! 块设备是以**块**为单位存储数据的设备；这里的"设备"通常是
//! 宿主文件系统上的一个普通镜像文件。[`BlockDevice`] 就是对读写
//! 这类设备的抽象，文件系统通过它读写镜像，而不关心镜像如何打开。

#![no_std]

/// 块设备驱动特质
pub trait BlockDevice: Send + Sync {
    fn read_block(&self, block_id: usize, buf: &mut [u8]);
    fn write_block(&self, block_id: usize, buf: &[u8]);

    /// 请求操作系统把设备内容同步到持久介质
    fn sync(&self) {}
}
