use super::*;
use crate::settings::Settings;

fn scan_settings() -> Settings {
    let mut settings = Settings::default();
    settings.bloom1.used = true;
    settings.bloom1.m_hash_size = 16;
    settings.bloom2.used = false;
    settings
}

#[test]
fn test_scan_round_trip_mixed_singleton_and_count() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = Database::create(dir.path().as_os_str(), scan_settings()).unwrap();

    let h_a = b"hash-a----------".to_vec();
    let h_b = b"hash-b----------".to_vec();
    let h_absent = b"hash-absent-----".to_vec();

    let src1 = db.get_or_insert_source("r", "f1");
    db.insert(&h_a, src1, 0).unwrap();

    for i in 0..5u64 {
        let src = db.get_or_insert_source("r", &format!("f{}", i + 2));
        db.insert(&h_b, src, i).unwrap();
    }

    let request = vec![
        b"hash-zzzzzzzzzzz".to_vec(),
        h_a.clone(),
        b"hash-yyyyyyyyyyy".to_vec(),
        h_b.clone(),
        h_absent,
    ];
    let matches = scan_list(&db, &request).unwrap();

    assert_eq!(matches.len(), 2);
    assert!(matches.contains(&(1, 1)));
    assert!(matches.contains(&(3, 5)));
}

#[test]
fn test_request_encode_decode_round_trip() {
    let request = ScanRequest {
        kind: HashDigestKind::Md5,
        hashes: vec![vec![0xAAu8; 16], vec![0xBBu8; 16]],
    };
    let buf = request.encode().unwrap();
    let decoded = ScanRequest::decode(&buf).unwrap();
    assert_eq!(decoded.hashes, request.hashes);
}

#[test]
fn test_response_encode_decode_round_trip() {
    let matches = vec![(1u32, 1u32), (3u32, 5u32)];
    let buf = encode_response(&matches);
    let decoded = decode_response(&buf).unwrap();
    assert_eq!(decoded, matches);
}

#[test]
fn test_request_decode_rejects_truncated_buffer() {
    assert!(ScanRequest::decode(&[0u8; 4]).is_err());
}
