//Directory creation, removal, enumeration, and the cwd

use memvfs_api::error::Errno;
use memvfs_api::fs::{DirSupport, FileSupport, LinkSupport, MetaSupport};
use memvfs_api::types::{
    AT_FDCWD, AT_REMOVEDIR, DT_DIR, DT_LNK, DT_REG, O_CREAT, O_RDONLY, O_RDWR, S_IFDIR, S_IFMT,
};

#[path = "util.rs"]
mod util;
use std::convert::TryInto;
use util::{new_fs, write_file};

#[test]
fn mkdir_builds_the_pinned_pair() {
    let fs = new_fs();
    fs.mkdir("/d", 0o750).unwrap();
    let st = fs.stat("/d").unwrap();
    assert_eq!(st.st_mode & S_IFMT, S_IFDIR);
    assert_eq!(st.st_mode & 0o777, 0o750);
    assert_eq!(st.st_nlink, 2);
    // `.` and `..` resolve to self and parent
    assert_eq!(fs.stat("/d/.").unwrap().st_ino, st.st_ino);
    assert_eq!(fs.stat("/d/..").unwrap().st_ino, fs.stat("/").unwrap().st_ino);
    // the parent gained a link
    assert_eq!(fs.stat("/").unwrap().st_nlink, 3);
}

#[test]
fn mkdir_failure_modes() {
    let fs = new_fs();
    fs.mkdir("/d", 0o755).unwrap();
    assert_errno!(fs.mkdir("/d", 0o755), Errno::EEXIST);
    assert_errno!(fs.mkdir("/", 0o755), Errno::EEXIST);
    assert_errno!(fs.mkdir("/no/such/parent", 0o755), Errno::ENOENT);
    write_file(&fs, "/f", b"");
    assert_errno!(fs.mkdir("/f/sub", 0o755), Errno::ENOTDIR);
}

#[test]
fn rmdir_takes_only_empty_directories() {
    let fs = new_fs();
    fs.mkdir("/d", 0o755).unwrap();
    fs.mkdir("/d/sub", 0o755).unwrap();
    assert_errno!(fs.rmdir("/d"), Errno::ENOTEMPTY);
    fs.rmdir("/d/sub").unwrap();
    assert_eq!(fs.stat("/d").unwrap().st_nlink, 2);
    fs.rmdir("/d").unwrap();
    assert_errno!(fs.stat("/d"), Errno::ENOENT);

    write_file(&fs, "/f", b"");
    assert_errno!(fs.rmdir("/f"), Errno::ENOTDIR);
    assert_errno!(fs.rmdir("/"), Errno::EBUSY);
}

#[test]
fn rmdir_refuses_busy_directories() {
    let fs = new_fs();
    fs.mkdir("/held", 0o755).unwrap();
    let fd = fs.open("/held", O_RDONLY, 0).unwrap();
    assert_errno!(fs.rmdir("/held"), Errno::EBUSY);
    fs.close(fd).unwrap();

    fs.mkdir("/cwd", 0o755).unwrap();
    fs.chdir("/cwd").unwrap();
    assert_errno!(fs.rmdir("/cwd"), Errno::EBUSY);
    fs.chdir("/").unwrap();
    fs.rmdir("/cwd").unwrap();
}

#[test]
fn unlinkat_removedir_matches_rmdir() {
    let fs = new_fs();
    fs.mkdir("/d", 0o755).unwrap();
    fs.unlinkat(AT_FDCWD, "/d", AT_REMOVEDIR).unwrap();
    assert_errno!(fs.stat("/d"), Errno::ENOENT);
    assert_errno!(fs.unlinkat(AT_FDCWD, "/x", 0x9999), Errno::EINVAL);
}

#[test]
fn getdents_emits_aligned_records_with_types() {
    let fs = new_fs();
    fs.mkdir("/d", 0o755).unwrap();
    let fd2 = write_file(&fs, "/file", b"");
    fs.close(fd2).unwrap();
    fs.symlink("/file", "/ln").unwrap();

    let fd = fs.open("/", O_RDONLY, 0).unwrap();
    let mut buf = [0u8; 4096];
    let n = fs.getdents(fd, &mut buf).unwrap();
    assert!(n > 0);

    let mut seen = Vec::new();
    let mut at = 0usize;
    while at < n {
        let ino = u64::from_ne_bytes(buf[at..at + 8].try_into().unwrap());
        let off = u64::from_ne_bytes(buf[at + 8..at + 16].try_into().unwrap());
        let reclen = u16::from_ne_bytes([buf[at + 16], buf[at + 17]]) as usize;
        assert_eq!(reclen % 8, 0, "record not word-aligned");
        let name_area = &buf[at + 18..at + reclen - 1];
        let end = name_area.iter().position(|b| *b == 0).unwrap();
        let name = String::from_utf8(name_area[..end].to_vec()).unwrap();
        let dtype = buf[at + reclen - 1];
        seen.push((name, dtype, ino, off));
        at += reclen;
    }

    let names: Vec<&str> = seen.iter().map(|(n, ..)| n.as_str()).collect();
    assert_eq!(names, vec![".", "..", "d", "file", "ln"]);
    assert_eq!(seen[0].1, DT_DIR);
    assert_eq!(seen[2].1, DT_DIR);
    assert_eq!(seen[3].1, DT_REG);
    assert_eq!(seen[4].1, DT_LNK);
    // offsets count entries
    assert_eq!(seen[0].3, 1);
    assert_eq!(seen[4].3, 5);

    // a second call continues at the seek and then reports the end
    assert_eq!(fs.getdents(fd, &mut buf).unwrap(), 0);
    fs.close(fd).unwrap();
}

#[test]
fn getdents_resumes_and_rejects_tiny_buffers() {
    let fs = new_fs();
    write_file(&fs, "/abcdef", b"");
    let fd = fs.open("/", O_RDONLY, 0).unwrap();

    let mut tiny = [0u8; 8];
    assert_errno!(fs.getdents(fd, &mut tiny), Errno::EINVAL);

    // one record at a time
    let mut small = [0u8; 24]; // exactly one "." record
    let n = fs.getdents(fd, &mut small).unwrap();
    assert!(n > 0);
    let mut total = 1;
    loop {
        let mut buf = [0u8; 64];
        let n = fs.getdents(fd, &mut buf).unwrap();
        if n == 0 {
            break;
        }
        let mut at = 0;
        while at < n {
            let reclen = u16::from_ne_bytes([buf[at + 16], buf[at + 17]]) as usize;
            at += reclen;
            total += 1;
        }
    }
    assert_eq!(total, 3); // ".", "..", "abcdef"
    fs.close(fd).unwrap();

    let plain = write_file(&fs, "/plain", b"");
    let mut buf = [0u8; 64];
    assert_errno!(fs.getdents(plain, &mut buf), Errno::ENOTDIR);
    fs.close(plain).unwrap();
}

#[test]
fn chdir_moves_the_resolution_base() {
    let fs = new_fs();
    fs.mkdir("/w", 0o755).unwrap();
    fs.chdir("/w").unwrap();
    assert_eq!(fs.getcwd(4096).unwrap(), "/w");

    // relative paths now resolve inside /w
    let fd = fs.open("f", O_CREAT | O_RDWR, 0o644).unwrap();
    fs.close(fd).unwrap();
    assert!(fs.stat("/w/f").is_ok());

    fs.chdir("..").unwrap();
    assert_eq!(fs.getcwd(4096).unwrap(), "/");

    assert_errno!(fs.chdir("/w/f"), Errno::ENOTDIR);
    assert_errno!(fs.chdir("/missing"), Errno::ENOENT);
}

#[test]
fn getcwd_respects_the_buffer_contract() {
    let fs = new_fs();
    fs.mkdir("/somewhere", 0o755).unwrap();
    fs.chdir("/somewhere").unwrap();
    assert_errno!(fs.getcwd(0), Errno::EINVAL);
    assert_errno!(fs.getcwd(5), Errno::ERANGE);
    assert_eq!(fs.getcwd(11).unwrap(), "/somewhere");
}

#[test]
fn fchdir_rebuilds_the_path_from_the_tree() {
    let fs = new_fs();
    fs.mkdir("/a", 0o755).unwrap();
    fs.mkdir("/a/b", 0o755).unwrap();
    let fd = fs.open("/a/b", O_RDONLY, 0).unwrap();
    fs.fchdir(fd).unwrap();
    assert_eq!(fs.getcwd(4096).unwrap(), "/a/b");
    fs.close(fd).unwrap();

    let f = write_file(&fs, "/a/b/f", b"");
    assert_errno!(fs.fchdir(f), Errno::ENOTDIR);
    fs.close(f).unwrap();
}

#[test]
fn at_calls_resolve_against_their_descriptor() {
    let fs = new_fs();
    fs.mkdir("/base", 0o755).unwrap();
    let dirfd = fs.open("/base", O_RDONLY, 0).unwrap();
    fs.mkdirat(dirfd, "sub", 0o755).unwrap();
    assert!(fs.stat("/base/sub").is_ok());

    let fd = fs.openat(dirfd, "sub/file", O_CREAT | O_RDWR, 0o600).unwrap();
    fs.close(fd).unwrap();
    assert!(fs.stat("/base/sub/file").is_ok());

    // absolute paths ignore the descriptor
    fs.mkdirat(dirfd, "/top", 0o755).unwrap();
    assert!(fs.stat("/top").is_ok());

    // a non-directory descriptor cannot anchor a walk
    let plain = write_file(&fs, "/plain", b"");
    assert_errno!(fs.mkdirat(plain, "x", 0o755), Errno::ENOTDIR);
    fs.close(plain).unwrap();
    fs.close(dirfd).unwrap();
}
