//Descriptor-driven file I/O scenarios

use memvfs_api::error::Errno;
use memvfs_api::fs::{DirSupport, FileSupport, MetaSupport};
use memvfs_api::types::{
    O_APPEND, O_CREAT, O_DIRECTORY, O_EXCL, O_RDONLY, O_RDWR, O_TMPFILE, O_TRUNC, O_WRONLY,
    SEEK_CUR, SEEK_END, SEEK_SET, S_IFDIR, S_IFMT, S_IFREG,
};

#[path = "util.rs"]
mod util;
use util::{new_fs, read_all, write_file};

#[test]
fn create_write_read_under_nested_directories() {
    let fs = new_fs();
    fs.mkdir("/a", 0o755).unwrap();
    fs.mkdir("/a/b", 0o755).unwrap();
    let fd = fs.open("/a/b/c", O_CREAT | O_WRONLY, 0o644).unwrap();
    assert!(fd >= 0);
    assert_eq!(fs.write(fd, b"hi").unwrap(), 2);
    fs.close(fd).unwrap();

    let st = fs.stat("/a/b/c").unwrap();
    assert_eq!(st.st_size, 2);
    assert_eq!(st.st_mode & S_IFMT, S_IFREG);
    assert_eq!(st.st_mode & 0o777, 0o644);
    assert_eq!(read_all(&fs, "/a/b/c"), b"hi");
}

#[test]
fn exclusive_creation_fails_the_second_time() {
    let fs = new_fs();
    let fd = fs.open("/x", O_CREAT | O_EXCL | O_WRONLY, 0o600).unwrap();
    fs.close(fd).unwrap();
    assert_errno!(fs.open("/x", O_CREAT | O_EXCL | O_WRONLY, 0o600), Errno::EEXIST);
    // without O_EXCL the existing file is reused
    let fd = fs.open("/x", O_CREAT | O_WRONLY, 0o600).unwrap();
    fs.close(fd).unwrap();
}

#[test]
fn unknown_open_flags_are_rejected() {
    let fs = new_fs();
    assert_errno!(fs.open("/x", O_CREAT | 0o4000, 0o644), Errno::EINVAL);
}

#[test]
fn open_enforces_directory_expectations() {
    let fs = new_fs();
    fs.mkdir("/d", 0o755).unwrap();
    write_file(&fs, "/f", b"data");

    assert_errno!(fs.open("/d", O_WRONLY, 0), Errno::EISDIR);
    assert_errno!(fs.open("/f", O_RDONLY | O_DIRECTORY, 0), Errno::ENOTDIR);
    let fd = fs.open("/d", O_RDONLY | O_DIRECTORY, 0).unwrap();
    fs.close(fd).unwrap();
    // a missing file without O_CREAT
    assert_errno!(fs.open("/missing", O_RDONLY, 0), Errno::ENOENT);
}

#[test]
fn truncate_on_open_empties_the_file() {
    let fs = new_fs();
    let fd = write_file(&fs, "/t", b"hello world");
    fs.close(fd).unwrap();
    let fd = fs.open("/t", O_WRONLY | O_TRUNC, 0).unwrap();
    fs.close(fd).unwrap();
    assert_eq!(fs.stat("/t").unwrap().st_size, 0);
}

#[test]
fn seek_state_drives_sequential_reads() {
    let fs = new_fs();
    let fd = write_file(&fs, "/s", b"abcdefgh");
    assert_eq!(fs.lseek(fd, 0, SEEK_SET).unwrap(), 0);
    let mut buf = [0u8; 3];
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 3);
    assert_eq!(&buf, b"abc");
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 3);
    assert_eq!(&buf, b"def");
    assert_eq!(fs.lseek(fd, 0, SEEK_CUR).unwrap(), 6);
    assert_eq!(fs.lseek(fd, -2, SEEK_END).unwrap(), 6);
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 2);
    assert_eq!(&buf[..2], b"gh");
    // and EOF after that
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 0);
    fs.close(fd).unwrap();
}

#[test]
fn seek_arithmetic_is_checked() {
    let fs = new_fs();
    let fd = write_file(&fs, "/s", b"x");
    assert_errno!(fs.lseek(fd, -2, SEEK_SET), Errno::EINVAL);
    assert_errno!(fs.lseek(fd, -10, SEEK_CUR), Errno::EINVAL);
    assert_errno!(fs.lseek(fd, i64::MAX, SEEK_END), Errno::EOVERFLOW);
    assert_errno!(fs.lseek(fd, 0, 99), Errno::EINVAL);
    fs.close(fd).unwrap();
}

#[test]
fn positional_io_leaves_the_seek_alone() {
    let fs = new_fs();
    let fd = write_file(&fs, "/p", b"0123456789");
    let mut buf = [0u8; 4];
    assert_eq!(fs.pread(fd, &mut buf, 2).unwrap(), 4);
    assert_eq!(&buf, b"2345");
    assert_eq!(fs.pwrite(fd, b"XY", 0).unwrap(), 2);
    // the descriptor offset still sits at the end of the initial write
    assert_eq!(fs.lseek(fd, 0, SEEK_CUR).unwrap(), 10);
    assert_errno!(fs.pread(fd, &mut buf, -1), Errno::EINVAL);
    fs.close(fd).unwrap();
    assert_eq!(read_all(&fs, "/p"), b"XY23456789");
}

#[test]
fn vectored_io_crosses_buffer_boundaries() {
    let fs = new_fs();
    let fd = fs.open("/v", O_CREAT | O_RDWR, 0o644).unwrap();
    assert_eq!(fs.writev(fd, &[b"abc", b"", b"defg"]).unwrap(), 7);
    fs.lseek(fd, 0, SEEK_SET).unwrap();
    let mut a = [0u8; 2];
    let mut b = [0u8; 10];
    let n = {
        let mut bufs: [&mut [u8]; 2] = [&mut a, &mut b];
        fs.readv(fd, &mut bufs).unwrap()
    };
    assert_eq!(n, 7);
    assert_eq!(&a, b"ab");
    assert_eq!(&b[..5], b"cdefg");
    fs.close(fd).unwrap();
}

#[test]
fn append_ignores_the_seek_offset() {
    let fs = new_fs();
    let fd = write_file(&fs, "/log", b"one");
    fs.close(fd).unwrap();
    let fd = fs.open("/log", O_WRONLY | O_APPEND, 0).unwrap();
    fs.lseek(fd, 0, SEEK_SET).unwrap();
    assert_eq!(fs.write(fd, b"two").unwrap(), 3);
    // even positional writes land at the end under O_APPEND
    assert_eq!(fs.pwrite(fd, b"!", 0).unwrap(), 1);
    fs.close(fd).unwrap();
    assert_eq!(read_all(&fs, "/log"), b"onetwo!");
}

#[test]
fn write_through_a_readonly_descriptor_is_rejected() {
    let fs = new_fs();
    let fd = write_file(&fs, "/r", b"abc");
    fs.close(fd).unwrap();
    let fd = fs.open("/r", O_RDONLY, 0).unwrap();
    assert_errno!(fs.write(fd, b"x"), Errno::EBADF);
    fs.close(fd).unwrap();
    let fd = fs.open("/r", O_WRONLY, 0).unwrap();
    let mut buf = [0u8; 1];
    assert_errno!(fs.read(fd, &mut buf), Errno::EBADF);
    fs.close(fd).unwrap();
}

#[test]
fn descriptors_recycle_lowest_first() {
    let fs = new_fs();
    let a = write_file(&fs, "/a", b"");
    let b = write_file(&fs, "/b", b"");
    let c = write_file(&fs, "/c", b"");
    assert_eq!((a, b, c), (0, 1, 2));
    fs.close(b).unwrap();
    assert_eq!(write_file(&fs, "/d", b""), 1);
    assert_eq!(write_file(&fs, "/e", b""), 3);
}

#[test]
fn close_range_sweeps_a_window() {
    let fs = new_fs();
    for name in &["/0", "/1", "/2", "/3"] {
        write_file(&fs, name, b"");
    }
    fs.close_range(1, 2, 0).unwrap();
    assert_errno!(fs.fstat(1), Errno::EBADF);
    assert_errno!(fs.fstat(2), Errno::EBADF);
    assert!(fs.fstat(0).is_ok());
    assert!(fs.fstat(3).is_ok());
    assert_errno!(fs.close_range(5, 2, 0), Errno::EINVAL);
    assert_errno!(fs.close_range(0, 1, 7), Errno::EINVAL);
}

#[test]
fn ftruncate_shrinks_and_extends() {
    let fs = new_fs();
    let fd = write_file(&fs, "/t", b"abcdef");
    fs.ftruncate(fd, 3).unwrap();
    assert_eq!(fs.fstat(fd).unwrap().st_size, 3);
    fs.ftruncate(fd, 10).unwrap();
    assert_eq!(fs.fstat(fd).unwrap().st_size, 10);
    fs.close(fd).unwrap();
    assert_eq!(read_all(&fs, "/t"), b"abc\0\0\0\0\0\0\0");

    fs.truncate("/t", 1).unwrap();
    assert_eq!(fs.stat("/t").unwrap().st_size, 1);
    assert_errno!(fs.truncate("/t", -1), Errno::EINVAL);
    fs.mkdir("/d", 0o755).unwrap();
    assert_errno!(fs.truncate("/d", 0), Errno::EISDIR);
}

#[test]
fn ftruncate_requires_a_writable_descriptor() {
    let fs = new_fs();
    let fd = write_file(&fs, "/t", b"abc");
    fs.close(fd).unwrap();
    let fd = fs.open("/t", O_RDONLY, 0).unwrap();
    assert_errno!(fs.ftruncate(fd, 0), Errno::EINVAL);
    fs.close(fd).unwrap();
}

#[test]
fn sendfile_copies_between_descriptors() {
    let fs = new_fs();
    let src = write_file(&fs, "/src", b"0123456789");
    fs.lseek(src, 2, SEEK_SET).unwrap();
    let dst = fs.open("/dst", O_CREAT | O_WRONLY, 0o644).unwrap();

    // without an explicit offset the input seek advances
    assert_eq!(fs.sendfile(dst, src, None, 4).unwrap(), 4);
    assert_eq!(fs.lseek(src, 0, SEEK_CUR).unwrap(), 6);

    // with one, the seek stays and the offset argument moves
    let mut off: i64 = 0;
    assert_eq!(fs.sendfile(dst, src, Some(&mut off), 3).unwrap(), 3);
    assert_eq!(off, 3);
    assert_eq!(fs.lseek(src, 0, SEEK_CUR).unwrap(), 6);

    fs.close(src).unwrap();
    fs.close(dst).unwrap();
    assert_eq!(read_all(&fs, "/dst"), b"2345012");
}

#[test]
fn sendfile_rejects_unfit_descriptors() {
    let fs = new_fs();
    let f = write_file(&fs, "/f", b"abc");
    let d = fs.open("/", O_RDONLY, 0).unwrap();
    let w = fs.open("/f", O_WRONLY | O_APPEND, 0).unwrap();
    assert_errno!(fs.sendfile(w, d, None, 1), Errno::EINVAL);
    assert_errno!(fs.sendfile(w, f, None, 1), Errno::EINVAL); // append output
    assert_errno!(fs.sendfile(d, f, None, 1), Errno::EBADF); // read-only output
    fs.close(f).unwrap();
    fs.close(d).unwrap();
    fs.close(w).unwrap();
}

#[test]
fn tmpfile_lives_only_behind_its_descriptor() {
    let fs = new_fs();
    let fd = fs.open("/", O_TMPFILE | O_RDWR, 0o600).unwrap();
    assert_eq!(fs.write(fd, b"ghost").unwrap(), 5);
    let st = fs.fstat(fd).unwrap();
    assert_eq!(st.st_nlink, 0);
    assert_eq!(st.st_size, 5);
    // nothing in the directory tree names it
    assert_errno!(fs.stat("/ghost"), Errno::ENOENT);
    fs.close(fd).unwrap();

    assert_errno!(fs.open("/", O_TMPFILE | O_RDONLY, 0o600), Errno::EINVAL);
    fs.mkdir("/d", 0o755).unwrap();
    write_file(&fs, "/d/f", b"");
    assert_errno!(fs.open("/d/f", O_TMPFILE | O_RDWR, 0o600), Errno::ENOTDIR);
}

#[test]
fn directory_reads_fail_but_directory_stats_work() {
    let fs = new_fs();
    fs.mkdir("/d", 0o755).unwrap();
    let fd = fs.open("/d", O_RDONLY, 0).unwrap();
    let mut buf = [0u8; 8];
    assert_errno!(fs.read(fd, &mut buf), Errno::EISDIR);
    let st = fs.fstat(fd).unwrap();
    assert_eq!(st.st_mode & S_IFMT, S_IFDIR);
    fs.close(fd).unwrap();
}
