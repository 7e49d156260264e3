use super::*;

#[test]
fn test_hash128_deterministic() {
    assert_eq!(hash128(b"abc"), hash128(b"abc"));
    assert_ne!(hash128(b"abc"), hash128(b"abd"));
}

#[test]
fn test_city_hasher_build_hasher() {
    use std::hash::{Hash, Hasher};

    let mut h1 = CityHasher::new();
    "hello".hash(&mut h1);
    let mut h2 = CityHasher::new();
    "hello".hash(&mut h2);
    assert_eq!(h1.finish(), h2.finish());
}
