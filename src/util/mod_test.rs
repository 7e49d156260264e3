use super::*;

#[test]
fn test_create_and_sync_write() {
    let dir = tempfile::tempdir().unwrap();
    let path: ffi::OsString = dir.path().join("demo.bin").into();

    let mut fd = create_file_a(&path).unwrap();
    sync_write(&mut fd, b"hello world").unwrap();
    drop(fd);

    let mut fd = open_file_r(&path).unwrap();
    let buf = read_file!(fd, std::io::SeekFrom::Start(0), 11u64, "read demo").unwrap();
    assert_eq!(&buf, b"hello world");
}

#[test]
fn test_create_file_a_truncates_stale_file() {
    let dir = tempfile::tempdir().unwrap();
    let path: ffi::OsString = dir.path().join("demo2.bin").into();

    let mut fd = create_file_a(&path).unwrap();
    sync_write(&mut fd, b"first").unwrap();
    drop(fd);

    // create_file_a removes any stale file first, so re-creating starts empty.
    let fd2 = create_file_a(&path).unwrap();
    assert_eq!(fd2.metadata().unwrap().len(), 0);
}
