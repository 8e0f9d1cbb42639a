//! Journal record framing.
//!
//! Each pending write or delete becomes one append-only journal record:
//!
//! - Checksum (16 bytes, MD5 of size-prefix + payload)
//! - Size (u32 big-endian, payload length)
//! - Payload (JSON `{action, key, value?, timestamp}`)
//!
//! The journal only ever contains operations not yet reflected in the data
//! file. Replay is idempotent: applying the same record twice yields the
//! same document map.

use std::io::Read;

use serde::{Deserialize, Serialize};

use super::checksum::{self, DIGEST_LEN};
use super::errors::{StoreError, StoreResult};
use crate::Document;

/// Journal record action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalAction {
    /// Write a document under a key
    #[serde(rename = "set")]
    Set,
    /// Remove a key
    #[serde(rename = "del")]
    Del,
}

/// A single journal record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    /// Operation to replay
    pub action: JournalAction,
    /// Flat composite key the operation applies to
    pub key: String,
    /// Document written; `None` for deletes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Document>,
    /// Unix milliseconds at append time
    pub timestamp: i64,
}

impl JournalRecord {
    /// Record a write of `value` under `key`.
    pub fn set(key: impl Into<String>, value: Document) -> Self {
        Self {
            action: JournalAction::Set,
            key: key.into(),
            value: Some(value),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Record a delete of `key`.
    pub fn del(key: impl Into<String>) -> Self {
        Self {
            action: JournalAction::Del,
            key: key.into(),
            value: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Serializes the record into its wire frame: checksum, size, payload.
    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        let payload = serde_json::to_vec(self)?;
        let size = (payload.len() as u32).to_be_bytes();

        let mut checked = Vec::with_capacity(4 + payload.len());
        checked.extend_from_slice(&size);
        checked.extend_from_slice(&payload);
        let digest = checksum::digest(&checked);

        let mut frame = Vec::with_capacity(DIGEST_LEN + checked.len());
        frame.extend_from_slice(&digest);
        frame.extend_from_slice(&checked);
        Ok(frame)
    }

    /// Reads the next record from `reader`.
    ///
    /// Returns `Ok(None)` at a clean end of stream. A truncated frame or a
    /// checksum mismatch is an integrity error: recovery must abort rather
    /// than silently drop tail records.
    pub fn read_from<R: Read>(reader: &mut R) -> StoreResult<Option<Self>> {
        let mut digest = [0u8; DIGEST_LEN];
        match read_full(reader, &mut digest)? {
            0 => return Ok(None),
            n if n < DIGEST_LEN => {
                return Err(StoreError::Integrity(
                    "journal record truncated inside checksum".into(),
                ))
            }
            _ => {}
        }

        let mut size_buf = [0u8; 4];
        if read_full(reader, &mut size_buf)? < 4 {
            return Err(StoreError::Integrity(
                "journal record truncated inside size header".into(),
            ));
        }
        let size = u32::from_be_bytes(size_buf) as usize;

        // The size header is unverified until the checksum passes, so read
        // what the stream actually holds rather than allocating the claimed
        // size up front.
        let mut payload = Vec::new();
        if reader.by_ref().take(size as u64).read_to_end(&mut payload)? < size {
            return Err(StoreError::Integrity(
                "journal record truncated inside payload".into(),
            ));
        }

        let mut checked = Vec::with_capacity(4 + size);
        checked.extend_from_slice(&size_buf);
        checked.extend_from_slice(&payload);
        if !checksum::verify(&checked, &digest) {
            return Err(StoreError::Integrity(format!(
                "journal record checksum mismatch for {} byte payload",
                size
            )));
        }

        Ok(Some(serde_json::from_slice(&payload)?))
    }
}

/// Reads as many bytes as possible into `buf`, returning the count.
/// Unlike `read_exact`, a clean EOF at offset zero is observable.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> StoreResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
