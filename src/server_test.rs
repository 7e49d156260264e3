use super::*;
use crate::settings::{HashDigestKind, Settings};
use std::io::Read;

fn scan_settings() -> Settings {
    let mut settings = Settings::default();
    settings.hashdigest_type = HashDigestKind::Md5;
    settings.bloom1.used = false;
    settings.bloom2.used = false;
    settings
}

#[test]
fn test_scan_server_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = Database::create(dir.path().as_os_str(), scan_settings()).unwrap();

    let h1 = vec![0xAAu8; 16];
    let h2 = vec![0xBBu8; 16];
    let h3 = vec![0xCCu8; 16];

    let s1 = db.get_or_insert_source("r", "f1");
    db.insert(&h1, s1, 0).unwrap();
    let s2 = db.get_or_insert_source("r", "f2");
    db.insert(&h2, s2, 0).unwrap();
    for i in 0..5u64 {
        let s = db.get_or_insert_source("r", &format!("f3-{}", i));
        db.insert(&h3, s, i).unwrap();
    }

    let db = Arc::new(Mutex::new(db));
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server_db = Arc::clone(&db);
    let handle = std::thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        serve_connection(&server_db, stream).unwrap();
    });

    let mut client = TcpStream::connect(addr).unwrap();
    let request = ScanRequest {
        kind: HashDigestKind::Md5,
        hashes: vec![h1.clone(), vec![0xFFu8; 16], h2.clone(), h3.clone()],
    };
    client.write_all(&request.encode().unwrap()).unwrap();

    let mut count_buf = [0u8; 4];
    client.read_exact(&mut count_buf).unwrap();
    let count = u32::from_ne_bytes(count_buf) as usize;
    let mut body = vec![0u8; count * 8];
    client.read_exact(&mut body).unwrap();

    let mut resp_buf = count_buf.to_vec();
    resp_buf.extend_from_slice(&body);
    let matches = scan::decode_response(&resp_buf).unwrap();

    assert_eq!(matches.len(), 3);
    assert!(matches.contains(&(0, 1)));
    assert!(matches.contains(&(2, 1)));
    assert!(matches.contains(&(3, 5)));

    drop(client);
    handle.join().unwrap();
}
