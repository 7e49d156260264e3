use super::*;

#[test]
fn test_insert_find_replace_erase() {
    let mut store = BTreeHashStore::new();
    let h = b"hash-one".to_vec();

    assert_eq!(store.find_encoding(&h), None);
    store.insert(&h, 42).unwrap();
    assert_eq!(store.find_encoding(&h), Some(42));

    store.replace(&h, 43).unwrap();
    assert_eq!(store.find_encoding(&h), Some(43));

    store.erase(&h).unwrap();
    assert_eq!(store.find_encoding(&h), None);
}

#[test]
fn test_insert_twice_fails() {
    let mut store = BTreeHashStore::new();
    store.insert(b"h", 1).unwrap();
    assert!(store.insert(b"h", 2).is_err());
}

#[test]
fn test_replace_missing_fails() {
    let mut store = BTreeHashStore::new();
    assert!(store.replace(b"h", 1).is_err());
}

#[test]
fn test_erase_missing_fails() {
    let mut store = BTreeHashStore::new();
    assert!(store.erase(b"h").is_err());
}

#[test]
fn test_iter_is_key_ordered() {
    let mut store = BTreeHashStore::new();
    store.insert(b"z", 1).unwrap();
    store.insert(b"a", 2).unwrap();
    store.insert(b"m", 3).unwrap();

    let keys: Vec<Vec<u8>> = store.iter().map(|(h, _)| h).collect();
    assert_eq!(keys, vec![b"a".to_vec(), b"m".to_vec(), b"z".to_vec()]);
}

#[test]
fn test_save_and_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = BTreeHashStore::new();
    store.insert(b"hash-a", 10).unwrap();
    store.insert(b"hash-b", 20).unwrap();

    store.save(dir.path().as_os_str()).unwrap();
    let loaded = BTreeHashStore::load(dir.path().as_os_str()).unwrap();

    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded.find_encoding(b"hash-a"), Some(10));
    assert_eq!(loaded.find_encoding(b"hash-b"), Some(20));
}
