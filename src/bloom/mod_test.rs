use super::*;

fn tmp_path(dir: &tempfile::TempDir, name: &str) -> ffi::OsString {
    dir.path().join(name).into()
}

#[test]
fn test_add_and_test() {
    let dir = tempfile::tempdir().unwrap();
    let loc = tmp_path(&dir, "bloom_filter_1");

    let filter = BloomFilter::create(&loc, 16, DEFAULT_K_HASH_FUNCTIONS).unwrap();
    filter.add(b"hash-one");
    filter.add(b"hash-two");

    assert!(filter.test(b"hash-one"));
    assert!(filter.test(b"hash-two"));

    let stats = filter.stats();
    assert_eq!(stats.added_items, 2);
    assert_eq!(stats.hits, 2);
}

#[test]
fn test_no_false_negatives_for_many_keys() {
    let dir = tempfile::tempdir().unwrap();
    let loc = tmp_path(&dir, "bloom_filter_1");

    let n = 10_000usize;
    let m = size_for(n, DEFAULT_K_HASH_FUNCTIONS);
    let filter = BloomFilter::create(&loc, m, DEFAULT_K_HASH_FUNCTIONS).unwrap();

    let keys: Vec<Vec<u8>> = (0..n).map(|i| format!("key-{}", i).into_bytes()).collect();
    for k in &keys {
        filter.add(k);
    }
    for k in &keys {
        assert!(filter.test(k), "false negative for {:?}", k);
    }
}

#[test]
fn test_false_positive_rate_near_target() {
    let dir = tempfile::tempdir().unwrap();
    let loc = tmp_path(&dir, "bloom_filter_1");

    let n = 10_000usize;
    let m = size_for(n, DEFAULT_K_HASH_FUNCTIONS);
    let filter = BloomFilter::create(&loc, m, DEFAULT_K_HASH_FUNCTIONS).unwrap();

    for i in 0..n {
        filter.add(format!("present-{}", i).as_bytes());
    }

    let mut false_positives = 0;
    let trials = 10_000;
    for i in 0..trials {
        if filter.test(format!("absent-{}", i).as_bytes()) {
            false_positives += 1;
        }
    }
    let rate = false_positives as f64 / trials as f64;
    assert!(rate < 0.12, "false positive rate too high: {}", rate);
}

#[test]
fn test_open_round_trip_preserves_bits() {
    let dir = tempfile::tempdir().unwrap();
    let loc = tmp_path(&dir, "bloom_filter_1");

    {
        let mut filter = BloomFilter::create(&loc, 16, 3).unwrap();
        filter.add(b"persisted-key");
        filter.flush().unwrap();
    }

    let filter = BloomFilter::open(&loc).unwrap();
    assert!(filter.test(b"persisted-key"));
}

#[test]
fn test_rebuild_resets_then_repopulates() {
    let dir = tempfile::tempdir().unwrap();
    let loc = tmp_path(&dir, "bloom_filter_1");

    let mut filter = BloomFilter::create(&loc, 16, 3).unwrap();
    filter.add(b"stale-key");
    assert!(filter.test(b"stale-key"));

    filter
        .rebuild(vec![b"fresh-key".to_vec()].into_iter())
        .unwrap();

    assert!(filter.test(b"fresh-key"));
    let stats = filter.stats();
    assert_eq!(stats.added_items, 1);
}
