//! End-to-end coverage of spec.md §8's six concrete scenarios, each
//! exercised once here against the public library surface rather than
//! against a single store's internals.

use crate::bloom::{size_for, DEFAULT_K_HASH_FUNCTIONS};
use crate::manager::Database;
use crate::scan::{self, ScanRequest};
use crate::settings::{HashDigestKind, Settings};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};

fn settings(k: u32, max_dup: u32) -> Settings {
    let mut settings = Settings::default();
    settings.hashdigest_type = HashDigestKind::Md5;
    settings.number_of_index_bits = k;
    settings.maximum_hash_duplicates = max_dup;
    settings.bloom1.used = false;
    settings.bloom2.used = false;
    settings
}

#[test]
fn scenario_1_singleton_then_demote() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = Database::create(dir.path().as_os_str(), settings(34, 0)).unwrap();
    let h = vec![0xAAu8; 16];

    let src_a = db.get_or_insert_source("r", "a");
    db.insert(&h, src_a, 5).unwrap();
    assert_eq!(db.find(&h).unwrap(), vec![(src_a, 5)]);
    assert_eq!(db.changes.hashes_inserted, 1);

    let src_b = db.get_or_insert_source("r", "b");
    assert_eq!(src_b, 2);
    db.insert(&h, src_b, 0).unwrap();
    assert_eq!(db.changes.hashes_inserted, 2);

    let mut found = db.find(&h).unwrap();
    found.sort();
    let mut expect = vec![(src_a, 5), (src_b, 0)];
    expect.sort();
    assert_eq!(found, expect);
}

#[test]
fn scenario_2_promotion_back_to_singleton() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = Database::create(dir.path().as_os_str(), settings(34, 0)).unwrap();
    let h = vec![0xAAu8; 16];

    let src_a = db.get_or_insert_source("r", "a");
    db.insert(&h, src_a, 5).unwrap();
    let src_b = db.get_or_insert_source("r", "b");
    db.insert(&h, src_b, 0).unwrap();

    db.erase(&h, src_a, 5).unwrap();
    assert_eq!(db.changes.hashes_removed, 1);
    assert_eq!(db.find(&h).unwrap(), vec![(src_b, 0)]);
}

#[test]
fn scenario_3_limit_enforcement() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = Database::create(dir.path().as_os_str(), settings(34, 3)).unwrap();
    let h = vec![0xAAu8; 16];

    for i in 0..3u64 {
        let src = db.get_or_insert_source("r", &format!("s{}", i));
        db.insert(&h, src, i).unwrap();
    }
    let fresh = db.get_or_insert_source("r", "fresh");
    db.insert(&h, fresh, 99).unwrap();

    assert_eq!(db.changes.hashes_not_inserted_exceeds_max_duplicates, 1);
    assert_eq!(db.find(&h).unwrap().len(), 3);
}

#[test]
fn scenario_4_duplicate_rejection() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = Database::create(dir.path().as_os_str(), settings(34, 0)).unwrap();
    let h = vec![0xAAu8; 16];
    let src = db.get_or_insert_source("r", "a");

    db.insert(&h, src, 5).unwrap();
    db.insert(&h, src, 5).unwrap();

    assert_eq!(db.changes.hashes_not_inserted_duplicate_element, 1);
    assert_eq!(db.find(&h).unwrap(), vec![(src, 5)]);
}

#[test]
fn scenario_5_bloom_integrity_under_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    let n = 10_000u64;
    let mut db = Database::create(dir.path().as_os_str(), settings(36, 0)).unwrap();
    let hashes: Vec<Vec<u8>> = (0..n).map(|i| format!("{:016}", i).into_bytes()).collect();
    for (i, h) in hashes.iter().enumerate() {
        let src = db.get_or_insert_source("r", &format!("f{}", i));
        db.insert(h, src, 0).unwrap();
    }

    let mut rebuilt_settings = db.settings().clone();
    rebuilt_settings.bloom1.used = true;
    rebuilt_settings.bloom1.k_hash_functions = DEFAULT_K_HASH_FUNCTIONS;
    rebuilt_settings.bloom1.m_hash_size = size_for(n as usize, DEFAULT_K_HASH_FUNCTIONS);
    db.rebuild_bloom(rebuilt_settings).unwrap();

    for h in &hashes {
        assert!(db.bloom_test(h));
    }

    let trials = 10_000u64;
    let mut false_positives = 0;
    for i in n..n + trials {
        if db.bloom_test(format!("{:016}", i).as_bytes()) {
            false_positives += 1;
        }
    }
    let rate = false_positives as f64 / trials as f64;
    assert!(rate < 0.12, "false positive rate too high: {}", rate);
}

#[test]
fn scenario_6_scan_server_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = Database::create(dir.path().as_os_str(), settings(36, 0)).unwrap();

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
        crate::server::serve_connection(&server_db, stream).unwrap();
    });

    let mut client = TcpStream::connect(addr).unwrap();
    let request = ScanRequest {
        kind: HashDigestKind::Md5,
        hashes: vec![h1.clone(), vec![0xFFu8; 16], h2.clone(), h3.clone(), vec![0xEEu8; 16]],
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
