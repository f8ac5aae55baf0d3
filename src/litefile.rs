use flate2::Compression;
use flate2::write::{DeflateEncoder, GzEncoder};
use sha1::{Digest, Sha1};
use std::io::Write;

/// An in-memory static asset with its gzip and raw-deflate variants
/// precomputed once at load time, plus one independent strong validator per
/// variant for conditional GET.
#[derive(Debug, Clone)]
pub struct LiteFile {
    pub raw: Vec<u8>,
    pub gzip: Vec<u8>,
    pub deflate: Vec<u8>,
    pub etag_identity: String,
    pub etag_gzip: String,
    pub etag_deflate: String,
    pub last_modified: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Identity,
    Gzip,
    Deflate,
}

impl ContentEncoding {
    pub fn as_header_value(&self) -> Option<&'static str> {
        match self {
            ContentEncoding::Identity => None,
            ContentEncoding::Gzip => Some("gzip"),
            ContentEncoding::Deflate => Some("deflate"),
        }
    }
}

impl LiteFile {
    pub fn new(raw: Vec<u8>, last_modified: u64) -> Self {
        let gzip = gzip_compress(&raw);
        let deflate = deflate_compress(&raw);
        let etag_identity = format!("\"{}\"", sha1_hex(&raw));
        let etag_gzip = format!("\"{}\"", sha1_hex(&gzip));
        let etag_deflate = format!("\"{}\"", sha1_hex(&deflate));
        Self {
            raw,
            gzip,
            deflate,
            etag_identity,
            etag_gzip,
            etag_deflate,
            last_modified,
        }
    }

    pub fn size(&self) -> usize {
        self.raw.len() + self.gzip.len() + self.deflate.len()
    }

    /// Picks the smallest body the client's `Accept-Encoding` allows.
    pub fn negotiate(&self, accept_encoding: &str) -> (&[u8], ContentEncoding) {
        let lower = accept_encoding.to_lowercase();
        if lower.contains("gzip") {
            (&self.gzip, ContentEncoding::Gzip)
        } else if lower.contains("deflate") {
            (&self.deflate, ContentEncoding::Deflate)
        } else {
            (&self.raw, ContentEncoding::Identity)
        }
    }

    /// The strong validator for a given negotiated encoding.
    pub fn etag_for(&self, encoding: ContentEncoding) -> &str {
        match encoding {
            ContentEncoding::Identity => &self.etag_identity,
            ContentEncoding::Gzip => &self.etag_gzip,
            ContentEncoding::Deflate => &self.etag_deflate,
        }
    }

    /// True when `If-Modified-Since` equals the stored last-modified time.
    pub fn matches_last_modified(&self, if_modified_since: Option<u64>) -> bool {
        if_modified_since == Some(self.last_modified)
    }

    /// True when `If-None-Match` names the validator for the negotiated
    /// `encoding`, or `*`.
    pub fn matches_etag(&self, if_none_match: Option<&str>, encoding: ContentEncoding) -> bool {
        let Some(inm) = if_none_match else { return false };
        if inm.trim() == "*" {
            return true;
        }
        let validator = self.etag_for(encoding);
        inm.split(',')
            .any(|tag| tag.trim().trim_start_matches('W').trim_start_matches('/') == validator)
    }
}

fn sha1_hex(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().iter().map(|b| format!("{:02x}", b)).collect()
}

fn gzip_compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    let _ = encoder.write_all(data);
    encoder.finish().unwrap_or_default()
}

fn deflate_compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    let _ = encoder.write_all(data);
    encoder.finish().unwrap_or_default()
}

/// Parses the `If-Modified-Since` header's HTTP-date into a unix timestamp.
/// Only RFC 1123 format (what every response here emits) is accepted; an
/// unparsable header is treated as absent rather than an error.
pub fn parse_http_date(value: &str) -> Option<u64> {
    httpdate::parse_http_date(value)
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
}

pub fn format_http_date(timestamp: u64) -> String {
    let system_time = std::time::UNIX_EPOCH + std::time::Duration::from_secs(timestamp);
    httpdate::fmt_http_date(system_time)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_and_deflate_round_trip_via_flate2() {
        let body = b"the quick brown fox jumps over the lazy dog".repeat(8);
        let file = LiteFile::new(body.clone(), 0);

        let mut decoder = flate2::read::GzDecoder::new(&file.gzip[..]);
        let mut out = Vec::new();
        std::io::Read::read_to_end(&mut decoder, &mut out).unwrap();
        assert_eq!(out, body);

        let mut decoder = flate2::read::DeflateDecoder::new(&file.deflate[..]);
        let mut out = Vec::new();
        std::io::Read::read_to_end(&mut decoder, &mut out).unwrap();
        assert_eq!(out, body);
    }

    #[test]
    fn negotiate_prefers_gzip_over_deflate() {
        let file = LiteFile::new(b"hello world".to_vec(), 0);
        let (body, enc) = file.negotiate("gzip, deflate");
        assert_eq!(enc, ContentEncoding::Gzip);
        assert_eq!(body, &file.gzip[..]);
    }

    #[test]
    fn negotiate_falls_back_to_identity() {
        let file = LiteFile::new(b"hello world".to_vec(), 0);
        let (body, enc) = file.negotiate("br");
        assert_eq!(enc, ContentEncoding::Identity);
        assert_eq!(body, &file.raw[..]);
    }

    #[test]
    fn each_variant_has_a_distinct_validator() {
        let file = LiteFile::new(b"hello world".repeat(20), 0);
        assert_ne!(file.etag_identity, file.etag_gzip);
        assert_ne!(file.etag_identity, file.etag_deflate);
        assert_ne!(file.etag_gzip, file.etag_deflate);
    }

    #[test]
    fn conditional_get_matches_etag_for_negotiated_variant() {
        let file = LiteFile::new(b"hello world".repeat(20), 1000);
        let identity = file.etag_identity.clone();
        let gzip = file.etag_gzip.clone();

        assert!(file.matches_etag(Some(&identity), ContentEncoding::Identity));
        assert!(!file.matches_etag(Some(&identity), ContentEncoding::Gzip));
        assert!(file.matches_etag(Some(&gzip), ContentEncoding::Gzip));
    }

    #[test]
    fn conditional_get_matches_last_modified_exactly() {
        let file = LiteFile::new(b"hello world".to_vec(), 1000);
        assert!(file.matches_last_modified(Some(1000)));
        assert!(!file.matches_last_modified(Some(2000)));
        assert!(!file.matches_last_modified(None));
    }
}
