#![allow(dead_code)]

//Shared helpers for the scenario tests
use memvfs::{FsError, MemFs};
use memvfs_api::error::Errno;
use memvfs_api::fs::{FileSupport, FsCore, MetaSupport};
use memvfs_api::types::{FsParams, O_CREAT, O_RDONLY, O_RDWR};

//A fresh engine with the default parameters
pub fn new_fs() -> MemFs {
    MemFs::new_fs(&FsParams::default()).unwrap()
}

//Create (or open) a regular file and write `data` from offset 0, leaving the
//descriptor open
pub fn write_file(fs: &MemFs, path: &str, data: &[u8]) -> i32 {
    let fd = fs.open(path, O_CREAT | O_RDWR, 0o644).unwrap();
    if !data.is_empty() {
        assert_eq!(fs.write(fd, data).unwrap(), data.len());
    }
    fd
}

//Read the whole file back through a fresh descriptor
pub fn read_all(fs: &MemFs, path: &str) -> Vec<u8> {
    let fd = fs.open(path, O_RDONLY, 0).unwrap();
    let size = fs.fstat(fd).unwrap().st_size as usize;
    let mut buf = vec![0u8; size];
    let n = fs.read(fd, &mut buf).unwrap();
    buf.truncate(n);
    fs.close(fd).unwrap();
    buf
}

//The POSIX number behind an engine error
pub fn errno(e: FsError) -> Errno {
    e.errno()
}

//Assert that a result failed with the given number
#[macro_export]
macro_rules! assert_errno {
    ($res:expr, $errno:expr) => {
        match $res {
            Ok(_) => panic!("expected {:?}, got success", $errno),
            Err(e) => assert_eq!(e.errno(), $errno),
        }
    };
}
