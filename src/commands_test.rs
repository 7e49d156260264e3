use super::*;
use crate::bloom::{size_for, DEFAULT_K_HASH_FUNCTIONS};
use crate::settings::{BloomSettings, HashDigestKind, Settings};

fn plain_settings() -> Settings {
    let mut settings = Settings::default();
    settings.hashdigest_type = HashDigestKind::Md5;
    settings.bloom1.used = false;
    settings.bloom2.used = false;
    settings
}

fn hash_for(i: u64) -> Vec<u8> {
    format!("{:016}", i).into_bytes()
}

#[test]
fn test_create_writes_settings_and_history() {
    let dir = tempfile::tempdir().unwrap();
    let os_dir = dir.path().as_os_str();
    create(os_dir, plain_settings()).unwrap();

    assert!(dir.path().join(crate::settings::SETTINGS_FILE).exists());
    assert!(dir.path().join(crate::history::LOG_FILE).exists());
    assert!(dir.path().join(crate::history::HISTORY_FILE).exists());
}

#[test]
fn test_copy_hashdb_to_hashdb() {
    let src_dir = tempfile::tempdir().unwrap();
    let dst_dir = tempfile::tempdir().unwrap();
    let mut src_db = Database::create(src_dir.path().as_os_str(), plain_settings()).unwrap();

    let h = hash_for(1);
    let s = src_db.get_or_insert_source("repo", "image.dd");
    src_db.insert(&h, s, 7).unwrap();
    src_db.close().unwrap();

    Database::create(dst_dir.path().as_os_str(), plain_settings())
        .unwrap()
        .close()
        .unwrap();

    let changes = copy(src_dir.path().as_os_str(), dst_dir.path().as_os_str()).unwrap();
    assert_eq!(changes.hashes_inserted, 1);

    let dst_db = Database::open(dst_dir.path().as_os_str()).unwrap();
    assert_eq!(dst_db.len(), 1);
    let source_id = dst_db.get_or_insert_source("repo", "image.dd");
    assert_eq!(dst_db.find(&h).unwrap(), vec![(source_id, 7)]);
}

#[test]
fn test_copy_dfxml_lines_into_hashdb() {
    let dst_dir = tempfile::tempdir().unwrap();
    Database::create(dst_dir.path().as_os_str(), plain_settings())
        .unwrap()
        .close()
        .unwrap();

    let lines_file = dst_dir.path().with_extension("lines.txt");
    let h = hash_for(2);
    let line = format!(
        r#"<hashdb_element hash="{}" repository_name="repo" filename="f1" block_offset="3"/>"#,
        hex::encode(&h)
    );
    fs::write(&lines_file, format!("{}\n", line)).unwrap();

    let os_lines: &ffi::OsStr = lines_file.as_os_str();
    let changes = copy(os_lines, dst_dir.path().as_os_str()).unwrap();
    assert_eq!(changes.hashes_inserted, 1);

    let dst_db = Database::open(dst_dir.path().as_os_str()).unwrap();
    let source_id = dst_db.get_or_insert_source("repo", "f1");
    assert_eq!(dst_db.find(&h).unwrap(), vec![(source_id, 3)]);
}

#[test]
fn test_export_then_copy_round_trips_via_dfxml_lines() {
    let src_dir = tempfile::tempdir().unwrap();
    let mut src_db = Database::create(src_dir.path().as_os_str(), plain_settings()).unwrap();
    let h1 = hash_for(10);
    let h2 = hash_for(11);
    let s1 = src_db.get_or_insert_source("repo", "a");
    src_db.insert(&h1, s1, 0).unwrap();
    for i in 0..3u64 {
        let s = src_db.get_or_insert_source("repo", &format!("b{}", i));
        src_db.insert(&h2, s, i).unwrap();
    }
    src_db.close().unwrap();

    let dfxml_path = src_dir.path().with_extension("dfxml.txt");
    let os_dfxml: &ffi::OsStr = dfxml_path.as_os_str();
    let n = export(src_dir.path().as_os_str(), os_dfxml).unwrap();
    assert_eq!(n, 2);

    let dst_dir = tempfile::tempdir().unwrap();
    Database::create(dst_dir.path().as_os_str(), plain_settings())
        .unwrap()
        .close()
        .unwrap();
    let changes = copy(os_dfxml, dst_dir.path().as_os_str()).unwrap();
    assert_eq!(changes.hashes_inserted, 4);

    let dst_db = Database::open(dst_dir.path().as_os_str()).unwrap();
    assert_eq!(dst_db.find(&h1).unwrap().len(), 1);
    assert_eq!(dst_db.find(&h2).unwrap().len(), 3);
}

#[test]
fn test_remove_via_hashdb_source() {
    let src_dir = tempfile::tempdir().unwrap();
    let dst_dir = tempfile::tempdir().unwrap();

    let mut src_db = Database::create(src_dir.path().as_os_str(), plain_settings()).unwrap();
    let h = hash_for(20);
    let s = src_db.get_or_insert_source("repo", "c");
    src_db.insert(&h, s, 1).unwrap();
    src_db.close().unwrap();

    Database::create(dst_dir.path().as_os_str(), plain_settings())
        .unwrap()
        .close()
        .unwrap();
    copy(src_dir.path().as_os_str(), dst_dir.path().as_os_str()).unwrap();

    let changes = remove(src_dir.path().as_os_str(), dst_dir.path().as_os_str()).unwrap();
    assert_eq!(changes.hashes_removed, 1);

    let dst_db = Database::open(dst_dir.path().as_os_str()).unwrap();
    assert_eq!(dst_db.len(), 0);
}

#[test]
fn test_merge_unions_two_databases() {
    let a_dir = tempfile::tempdir().unwrap();
    let b_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();

    let mut a_db = Database::create(a_dir.path().as_os_str(), plain_settings()).unwrap();
    let ha = hash_for(30);
    let sa = a_db.get_or_insert_source("repo", "a");
    a_db.insert(&ha, sa, 0).unwrap();
    a_db.close().unwrap();

    let mut b_db = Database::create(b_dir.path().as_os_str(), plain_settings()).unwrap();
    let hb = hash_for(31);
    let sb = b_db.get_or_insert_source("repo", "b");
    b_db.insert(&hb, sb, 0).unwrap();
    b_db.close().unwrap();

    merge(a_dir.path().as_os_str(), b_dir.path().as_os_str(), out_dir.path().as_os_str()).unwrap();

    let out_db = Database::open(out_dir.path().as_os_str()).unwrap();
    assert_eq!(out_db.len(), 2);
    assert_eq!(out_db.find(&ha).unwrap().len(), 1);
    assert_eq!(out_db.find(&hb).unwrap().len(), 1);
}

#[test]
fn test_info_reports_counts() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = Database::create(dir.path().as_os_str(), plain_settings()).unwrap();
    let h = hash_for(40);
    let s = db.get_or_insert_source("repo", "d");
    db.insert(&h, s, 0).unwrap();
    db.close().unwrap();

    let report = info(dir.path().as_os_str()).unwrap();
    assert!(report.contains("hash_records: 1"));
    assert!(report.contains("sources: 1"));
    assert!(report.contains("MD5"));
}

/// Scenario 5 (spec §8): populate 10,000 distinct hashes with bloom
/// disabled, rebuild with bloom1 enabled at that target size, confirm
/// every inserted hash still tests positive and the false-positive rate
/// on unseen hashes lands near the expected ballpark for this `k`/`m`.
#[test]
fn test_rebuild_bloom_integrity_and_false_positive_rate() {
    let dir = tempfile::tempdir().unwrap();
    let n = 10_000u64;
    let mut db = Database::create(dir.path().as_os_str(), plain_settings()).unwrap();
    for i in 0..n {
        let s = db.get_or_insert_source("repo", &format!("f{}", i));
        db.insert(&hash_for(i), s, 0).unwrap();
    }
    db.close().unwrap();

    let mut settings = plain_settings();
    settings.bloom1 = BloomSettings {
        used: true,
        k_hash_functions: DEFAULT_K_HASH_FUNCTIONS,
        m_hash_size: size_for(n as usize, DEFAULT_K_HASH_FUNCTIONS),
    };
    rebuild_bloom(dir.path().as_os_str(), settings).unwrap();

    let db = Database::open(dir.path().as_os_str()).unwrap();
    for i in 0..n {
        assert!(db.bloom_test(&hash_for(i)), "false negative for hash {}", i);
    }

    let trials = 10_000u64;
    let mut false_positives = 0;
    for i in n..n + trials {
        if db.bloom_test(&hash_for(i)) {
            false_positives += 1;
        }
    }
    let rate = false_positives as f64 / trials as f64;
    assert!(rate < 0.12, "false positive rate too high: {}", rate);
}
