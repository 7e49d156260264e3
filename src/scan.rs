//! Bulk scan: a vector of hashes in, a vector of `(index, count)` out for
//! whichever are present, short-circuited by the Bloom filters. Also the
//! TCP wire codec the server adapter speaks (spec §6).

use std::convert::TryInto;

use crate::{err_at, manager::Database, settings::HashDigestKind, Error, Result};

/// `scan_list` is the in-process primitive the TCP server is a thin
/// adapter over: for each hash in `request`, if every enabled Bloom
/// filter admits it and the primary store actually holds it, emit
/// `(index, count)`.
pub fn scan_list(db: &Database, request: &[Vec<u8>]) -> Result<Vec<(u32, u32)>> {
    let mut out = vec![];
    for (index, h) in request.iter().enumerate() {
        if !db.bloom_test(h) {
            continue;
        }
        let matches = db.find(h)?;
        if !matches.is_empty() {
            out.push((index as u32, matches.len() as u32));
        }
    }
    Ok(out)
}

/// `uint32 request_type; uint32 request_count; request_count * hash`.
pub struct ScanRequest {
    pub kind: HashDigestKind,
    pub hashes: Vec<Vec<u8>>,
}

const REQUEST_TYPE_MD5: u32 = 1;
const REQUEST_TYPE_SHA1: u32 = 2;
const REQUEST_TYPE_SHA256: u32 = 3;

/// Hash byte width implied by a wire `request_type`, without decoding a
/// full request -- used by the server to know how many more bytes to
/// read off the socket once it has seen the 8-byte header.
pub fn hash_width_for_request_type(request_type: u32) -> Result<usize> {
    let kind = match request_type {
        REQUEST_TYPE_MD5 => HashDigestKind::Md5,
        REQUEST_TYPE_SHA1 => HashDigestKind::Sha1,
        REQUEST_TYPE_SHA256 => HashDigestKind::Sha256,
        other => return err_at!(DecodeFail, msg: "unknown request_type {}", other),
    };
    Ok(kind.byte_width())
}

impl ScanRequest {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let request_type = match self.kind {
            HashDigestKind::Md5 => REQUEST_TYPE_MD5,
            HashDigestKind::Sha1 => REQUEST_TYPE_SHA1,
            HashDigestKind::Sha256 => REQUEST_TYPE_SHA256,
            other => return err_at!(InvalidInput, msg: "{:?} has no wire request_type", other.as_str()),
        };
        let mut buf = Vec::new();
        buf.extend_from_slice(&request_type.to_ne_bytes());
        buf.extend_from_slice(&(self.hashes.len() as u32).to_ne_bytes());
        for h in &self.hashes {
            buf.extend_from_slice(h);
        }
        Ok(buf)
    }

    pub fn decode(buf: &[u8]) -> Result<ScanRequest> {
        if buf.len() < 8 {
            return err_at!(DecodeFail, msg: "scan request truncated: {} bytes", buf.len());
        }
        let request_type = u32::from_ne_bytes(buf[0..4].try_into().unwrap());
        let request_count = u32::from_ne_bytes(buf[4..8].try_into().unwrap()) as usize;
        let kind = match request_type {
            REQUEST_TYPE_MD5 => HashDigestKind::Md5,
            REQUEST_TYPE_SHA1 => HashDigestKind::Sha1,
            REQUEST_TYPE_SHA256 => HashDigestKind::Sha256,
            other => return err_at!(DecodeFail, msg: "unknown request_type {}", other),
        };
        let hash_width = kind.byte_width();
        let expect = 8 + request_count * hash_width;
        if buf.len() != expect {
            return err_at!(
                DecodeFail, msg: "scan request is {} bytes, expected {} for {} x {}-byte hashes",
                buf.len(), expect, request_count, hash_width
            );
        }
        let hashes = (0..request_count)
            .map(|i| {
                let start = 8 + i * hash_width;
                buf[start..start + hash_width].to_vec()
            })
            .collect();
        Ok(ScanRequest { kind, hashes })
    }
}

/// `uint32 response_count; response_count * {uint32 index, uint32 count}`.
pub fn encode_response(matches: &[(u32, u32)]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(matches.len() as u32).to_ne_bytes());
    for (index, count) in matches {
        buf.extend_from_slice(&index.to_ne_bytes());
        buf.extend_from_slice(&count.to_ne_bytes());
    }
    buf
}

pub fn decode_response(buf: &[u8]) -> Result<Vec<(u32, u32)>> {
    if buf.len() < 4 {
        return err_at!(DecodeFail, msg: "scan response truncated: {} bytes", buf.len());
    }
    let response_count = u32::from_ne_bytes(buf[0..4].try_into().unwrap()) as usize;
    let expect = 4 + response_count * 8;
    if buf.len() != expect {
        return err_at!(DecodeFail, msg: "scan response is {} bytes, expected {}", buf.len(), expect);
    }
    let mut out = Vec::with_capacity(response_count);
    for i in 0..response_count {
        let start = 4 + i * 8;
        let index = u32::from_ne_bytes(buf[start..start + 4].try_into().unwrap());
        let count = u32::from_ne_bytes(buf[start + 4..start + 8].try_into().unwrap());
        out.push((index, count));
    }
    Ok(out)
}

#[cfg(test)]
#[path = "scan_test.rs"]
mod scan_test;
