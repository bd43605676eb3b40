mod block_file;
mod cli;

use std::fs;
use std::io::{self, Read, Write};
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use flat_fs::{FlatFileSystem, IMAGE_SIZE};
use typed_bytesize::ByteSizeIec;
use vfs::{Error, Mode};

use self::block_file::BlockFile;
use self::cli::{Cli, Command};

fn main() -> io::Result<ExitCode> {
    env_logger::init();
    let cli = Cli::parse();

    let (file, fresh) = BlockFile::open(&cli.image)?;
    let owner = fs::metadata(&cli.image)?;
    println!(
        "mounting {:?} ({})",
        cli.image,
        ByteSizeIec(IMAGE_SIZE as u64)
    );

    let mut fs = FlatFileSystem::mount(Arc::new(file), fresh);
    fs.set_owner(owner.uid(), owner.gid());

    let code = run(&mut fs, cli.command)?;
    Ok(ExitCode::from(code))
}

fn run(fs: &mut FlatFileSystem, command: Command) -> io::Result<u8> {
    match command {
        Command::Ls { path } => report(
            "ls",
            fs.readdir(&path).map(|entries| {
                for entry in entries {
                    println!("{}", entry.name);
                }
            }),
        ),

        Command::Stat { path } => report("stat", fs.getattr(&path).map(|stat| println!("{stat:#?}"))),

        Command::Touch { path } => report("touch", fs.mknod(&path, Mode::new(0))),

        Command::Mkdir { path } => report("mkdir", fs.mkdir(&path, Mode::new(0o755))),

        Command::Write {
            path,
            text,
            from,
            offset,
        } => {
            let data = match (text, from) {
                (Some(text), _) => text.into_bytes(),
                (None, Some(from)) => fs::read(from)?,
                (None, None) => {
                    let mut buf = Vec::new();
                    io::stdin().read_to_end(&mut buf)?;
                    buf
                }
            };

            if let Err(err) = fs.mknod(&path, Mode::new(0)) {
                if err != Error::AlreadyExists {
                    return report("write", Err::<(), _>(err));
                }
            }
            report("write", fs.write(&path, &data, offset))
        }

        Command::Cat { path } => {
            let mut offset = 0;
            let mut buf = [0u8; 4096];
            loop {
                match fs.read(&path, &mut buf, offset) {
                    Ok(0) => break Ok(0),
                    Ok(len) => {
                        io::stdout().write_all(&buf[..len])?;
                        offset += len as u64;
                    }
                    Err(err) => {
                        eprintln!("cat: {err:?}");
                        break Ok((-err.errno()) as u8);
                    }
                }
            }
        }

        Command::Rm { path } => report("rm", fs.unlink(&path)),

        Command::Rmdir { path } => report("rmdir", fs.rmdir(&path)),

        Command::Mv { from, to } => report("mv", fs.rename(&from, &to)),

        Command::Access { path } => report("access", fs.access(&path, 0)),

        Command::Pack { source } => {
            pack(fs, &source, "/")?;
            Ok(0)
        }
    }
}

/// 把操作结果折叠成进程退出码：失败时为负errno的绝对值
fn report<T>(op: &str, result: Result<T, Error>) -> io::Result<u8> {
    match result {
        Ok(_) => Ok(0),
        Err(err) => {
            eprintln!("{op}: {err:?}");
            Ok((-err.errno()) as u8)
        }
    }
}

/// 把宿主目录树逐层导入镜像
fn pack(fs: &mut FlatFileSystem, source: &Path, dest: &str) -> io::Result<()> {
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let name = entry
            .file_name()
            .into_string()
            .map_err(|name| io::Error::other(format!("non-UTF-8 file name: {name:?}")))?;
        let path = if dest == "/" {
            format!("/{name}")
        } else {
            format!("{dest}/{name}")
        };

        let kind = entry.file_type()?;
        if kind.is_dir() {
            fs.mkdir(&path, Mode::new(0o755)).map_err(fs_to_io)?;
            pack(fs, &entry.path(), &path)?;
        } else if kind.is_file() {
            let data = fs::read(entry.path())?;
            fs.mknod(&path, Mode::new(0)).map_err(fs_to_io)?;
            fs.write(&path, &data, 0).map_err(fs_to_io)?;
            log::info!("packed {path}");
        }
    }

    Ok(())
}

fn fs_to_io(err: Error) -> io::Error {
    io::Error::other(format!("{err:?}"))
}
