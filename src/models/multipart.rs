//! Represents multipart upload sessions and parts.

use serde::{Deserialize, Serialize};

/// An in-progress multipart upload against a temporary key.
///
/// Parts are uploaded out-of-band through presigned URLs, so the caller
/// records each acknowledged part here and hands the list back at completion.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MultipartSession {
    /// Opaque upload handle returned by the store.
    pub upload_id: String,

    /// Full storage key the upload will materialize at.
    pub key: String,

    /// Parts acknowledged so far, kept ordered by part number.
    pub parts: Vec<CompletedPart>,
}

impl MultipartSession {
    pub fn new(upload_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            upload_id: upload_id.into(),
            key: key.into(),
            parts: Vec::new(),
        }
    }

    /// Record an uploaded part. A re-uploaded part number replaces the
    /// earlier entry.
    pub fn record_part(&mut self, part_number: u32, etag: impl Into<String>) {
        let part = CompletedPart {
            part_number,
            etag: etag.into(),
        };
        match self
            .parts
            .binary_search_by_key(&part_number, |p| p.part_number)
        {
            Ok(idx) => self.parts[idx] = part,
            Err(idx) => self.parts.insert(idx, part),
        }
    }
}

/// A part as submitted at completion time.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CompletedPart {
    /// Part number (1-based).
    pub part_number: u32,

    /// ETag the store returned when the part was uploaded.
    pub etag: String,
}

impl CompletedPart {
    pub fn new(part_number: u32, etag: impl Into<String>) -> Self {
        Self {
            part_number,
            etag: etag.into(),
        }
    }
}

/// A part as reported by the store while the upload is still open.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PartSummary {
    pub part_number: u32,
    pub etag: String,
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_part_keeps_order_and_replaces_duplicates() {
        let mut session = MultipartSession::new("u1", "temp/acme/abc/def.gz");
        session.record_part(2, "etag2");
        session.record_part(1, "etag1");
        session.record_part(3, "etag3");
        session.record_part(2, "etag2b");

        let numbers: Vec<u32> = session.parts.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(session.parts[1].etag, "etag2b");
    }
}
