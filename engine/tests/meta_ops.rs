//Attribute queries and updates: stat family, chmod, times, access, umask

use memvfs_api::error::Errno;
use memvfs_api::fs::{DirSupport, FileSupport, LinkSupport, MetaSupport};
use memvfs_api::types::{
    AT_EMPTY_PATH, AT_FDCWD, AT_SYMLINK_NOFOLLOW, O_RDONLY, R_OK, STATX_BASIC_STATS, STATX_BTIME,
    STATX_SIZE, S_IFLNK, S_IFMT, S_IFREG, TimeSpec, UTIME_NOW, UTIME_OMIT, W_OK, X_OK,
};

#[path = "util.rs"]
mod util;
use util::{new_fs, write_file};

#[test]
fn stat_variants_agree_on_the_same_inode() {
    let fs = new_fs();
    let fd = write_file(&fs, "/f", b"hello");
    let by_fd = fs.fstat(fd).unwrap();
    let by_path = fs.stat("/f").unwrap();
    let by_at = fs.fstatat(AT_FDCWD, "/f", 0).unwrap();
    let by_empty = fs.fstatat(fd, "", AT_EMPTY_PATH).unwrap();
    assert_eq!(by_fd, by_path);
    assert_eq!(by_fd, by_at);
    assert_eq!(by_fd, by_empty);
    assert_eq!(by_fd.st_size, 5);
    fs.close(fd).unwrap();

    assert_errno!(fs.fstatat(AT_FDCWD, "", 0), Errno::ENOENT);
    assert_errno!(fs.fstatat(AT_FDCWD, "/f", 0x8000), Errno::EINVAL);
}

#[test]
fn lstat_sees_the_link_itself() {
    let fs = new_fs();
    write_file(&fs, "/f", b"xyz");
    fs.symlink("/f", "/l").unwrap();
    assert_eq!(fs.stat("/l").unwrap().st_mode & S_IFMT, S_IFREG);
    assert_eq!(fs.lstat("/l").unwrap().st_mode & S_IFMT, S_IFLNK);
    assert_eq!(
        fs.fstatat(AT_FDCWD, "/l", AT_SYMLINK_NOFOLLOW).unwrap().st_mode & S_IFMT,
        S_IFLNK
    );
}

#[test]
fn statx_reports_what_the_mask_asked() {
    let fs = new_fs();
    write_file(&fs, "/f", b"1234");
    let sx = fs.statx(AT_FDCWD, "/f", 0, STATX_BASIC_STATS | STATX_BTIME).unwrap();
    assert_eq!(sx.stx_mask, STATX_BASIC_STATS | STATX_BTIME);
    assert_eq!(sx.stx_size, 4);
    assert!(sx.stx_btime.tv_sec > 0);
    let sx = fs.statx(AT_FDCWD, "/f", 0, STATX_SIZE).unwrap();
    assert_eq!(sx.stx_mask, STATX_SIZE);
}

#[test]
fn chmod_swaps_permissions_and_keeps_the_type() {
    let fs = new_fs();
    write_file(&fs, "/f", b"");
    fs.chmod("/f", 0o4711).unwrap();
    let st = fs.stat("/f").unwrap();
    assert_eq!(st.st_mode & S_IFMT, S_IFREG);
    assert_eq!(st.st_mode & 0o7777, 0o4711);

    // the mask never filters chmod
    fs.chmod("/f", 0o777).unwrap();
    assert_eq!(fs.stat("/f").unwrap().st_mode & 0o7777, 0o777);

    let fd = fs.open("/f", O_RDONLY, 0).unwrap();
    fs.fchmod(fd, 0o600).unwrap();
    assert_eq!(fs.stat("/f").unwrap().st_mode & 0o7777, 0o600);
    fs.close(fd).unwrap();

    assert_errno!(
        fs.fchmodat(AT_FDCWD, "/f", 0o600, AT_SYMLINK_NOFOLLOW),
        Errno::EOPNOTSUPP
    );
    assert_errno!(fs.fchmodat(AT_FDCWD, "/f", 0o600, 0x8000), Errno::EINVAL);
}

#[test]
fn umask_filters_creation_modes() {
    let fs = new_fs();
    // default mask is 022
    write_file(&fs, "/w", b"");
    assert_eq!(fs.stat("/w").unwrap().st_mode & 0o777, 0o644);

    let old = fs.umask(0o077);
    assert_eq!(old, 0o022);
    write_file(&fs, "/x", b"");
    assert_eq!(fs.stat("/x").unwrap().st_mode & 0o777, 0o600);
    fs.mkdir("/d", 0o777).unwrap();
    assert_eq!(fs.stat("/d").unwrap().st_mode & 0o777, 0o700);

    // symlink modes are exempt
    fs.symlink("/w", "/l").unwrap();
    assert_eq!(fs.lstat("/l").unwrap().st_mode & 0o777, 0o777);
}

#[test]
fn utimens_honors_the_sentinels() {
    let fs = new_fs();
    write_file(&fs, "/t", b"");
    let times = [
        TimeSpec { sec: 11, nsec: 100 },
        TimeSpec { sec: 22, nsec: 200 },
    ];
    fs.utimensat(AT_FDCWD, "/t", Some(&times), 0).unwrap();
    let st = fs.stat("/t").unwrap();
    assert_eq!(st.st_atim, times[0]);
    assert_eq!(st.st_mtim, times[1]);

    // omit one side, refresh the other from the clock
    let times = [
        TimeSpec { sec: 0, nsec: UTIME_NOW },
        TimeSpec { sec: 0, nsec: UTIME_OMIT },
    ];
    fs.utimensat(AT_FDCWD, "/t", Some(&times), 0).unwrap();
    let st2 = fs.stat("/t").unwrap();
    assert_eq!(st2.st_mtim, st.st_mtim);
    assert!(st2.st_atim.sec > 1_000_000);

    // nanoseconds out of range
    let bad = [
        TimeSpec { sec: 0, nsec: 2_000_000_000 },
        TimeSpec { sec: 0, nsec: 0 },
    ];
    assert_errno!(fs.utimensat(AT_FDCWD, "/t", Some(&bad), 0), Errno::EINVAL);

    // None means both-now
    let fd = fs.open("/t", O_RDONLY, 0).unwrap();
    fs.futimens(fd, None).unwrap();
    fs.close(fd).unwrap();
    let st3 = fs.stat("/t").unwrap();
    assert!(st3.st_mtim.sec > 1_000_000);
}

#[test]
fn access_checks_the_owner_class() {
    let fs = new_fs();
    write_file(&fs, "/f", b"");
    fs.chmod("/f", 0o600).unwrap();
    fs.access("/f", 0).unwrap();
    fs.access("/f", R_OK | W_OK).unwrap();
    assert_errno!(fs.access("/f", X_OK), Errno::EACCES);
    // group/other bits are not the subject's
    fs.chmod("/f", 0o066).unwrap();
    assert_errno!(fs.access("/f", R_OK), Errno::EACCES);
    assert_errno!(fs.access("/missing", 0), Errno::ENOENT);
    assert_errno!(fs.access("/f", 0x70), Errno::EINVAL);
}

#[test]
fn permission_gates_reject_at_the_right_layer() {
    let fs = new_fs();
    fs.mkdir("/locked", 0o755).unwrap();
    write_file(&fs, "/locked/f", b"secret");
    fs.chmod("/locked", 0o600).unwrap(); // no search bit

    assert_errno!(fs.stat("/locked/f"), Errno::EACCES);
    assert_errno!(fs.open("/locked/f", O_RDONLY, 0), Errno::EACCES);
    // the directory inode itself still stats
    assert!(fs.stat("/locked").is_ok());

    fs.chmod("/locked", 0o755).unwrap();
    fs.chmod("/locked/f", 0o200).unwrap();
    assert_errno!(fs.open("/locked/f", O_RDONLY, 0), Errno::EACCES);
    let fd = fs.open("/locked/f", memvfs_api::types::O_WRONLY, 0).unwrap();
    fs.close(fd).unwrap();
}

#[test]
fn timestamps_move_with_the_operations() {
    let fs = new_fs();
    let fd = write_file(&fs, "/t", b"abc");
    fs.utimensat(
        AT_FDCWD,
        "/t",
        Some(&[
            TimeSpec { sec: 1, nsec: 0 },
            TimeSpec { sec: 1, nsec: 0 },
        ]),
        0,
    )
    .unwrap();

    // a write refreshes mtime and ctime
    fs.pwrite(fd, b"x", 0).unwrap();
    let st2 = fs.fstat(fd).unwrap();
    assert!(st2.st_mtim.sec > 1);
    assert!(st2.st_ctim.sec > 1);

    // a read refreshes atime only
    fs.utimensat(
        AT_FDCWD,
        "/t",
        Some(&[
            TimeSpec { sec: 1, nsec: 0 },
            TimeSpec { sec: 1, nsec: 0 },
        ]),
        0,
    )
    .unwrap();
    let mut buf = [0u8; 1];
    fs.pread(fd, &mut buf, 0).unwrap();
    let st3 = fs.fstat(fd).unwrap();
    assert!(st3.st_atim.sec > 1);
    assert_eq!(st3.st_mtim.sec, 1);
    fs.close(fd).unwrap();
}
