//! Journal record types and framing.

use crate::error::{CoreError, CoreResult};
use crate::store::RevisionRecord;
use serde::{Deserialize, Serialize};

/// Magic bytes opening every journal record.
pub const JOURNAL_MAGIC: [u8; 4] = *b"DJRN";

/// Current journal format version.
pub const JOURNAL_VERSION: u16 = 1;

/// magic (4) + version (2) + type (1) + length (4)
pub(crate) const HEADER_SIZE: usize = 11;

/// Trailing CRC32.
pub(crate) const CRC_SIZE: usize = 4;

/// Discriminant written in the record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    /// Database identity.
    Header = 1,
    /// A committed document revision.
    Revision = 2,
    /// A replication checkpoint update.
    Checkpoint = 3,
}

impl RecordKind {
    /// Parses a header byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Header),
            2 => Some(Self::Revision),
            3 => Some(Self::Checkpoint),
            _ => None,
        }
    }
}

/// One entry of the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JournalRecord {
    /// Written once when the database is created, and first after compaction.
    Header {
        /// Stable database UUID.
        uuid: String,
        /// Database name at creation.
        name: String,
    },
    /// A committed revision, the new latest for its document.
    Revision(RevisionRecord),
    /// Sets or clears (`value: None`) a checkpoint.
    Checkpoint {
        /// Checkpoint key.
        key: String,
        /// Opaque checkpoint bytes.
        value: Option<Vec<u8>>,
    },
}

impl JournalRecord {
    /// Header discriminant for this record.
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Header { .. } => RecordKind::Header,
            Self::Revision(_) => RecordKind::Revision,
            Self::Checkpoint { .. } => RecordKind::Checkpoint,
        }
    }
}

/// Frames `record` for appending.
pub(crate) fn encode_frame(record: &JournalRecord) -> CoreResult<Vec<u8>> {
    let mut payload = Vec::new();
    ciborium::into_writer(record, &mut payload)?;
    let len = u32::try_from(payload.len())
        .map_err(|_| CoreError::validation("journal record exceeds 4 GiB"))?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    frame.extend_from_slice(&JOURNAL_MAGIC);
    frame.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
    frame.push(record.kind() as u8);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    let crc = crc32(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

/// Result of scanning a journal image.
#[derive(Debug, Default)]
pub(crate) struct Decoded {
    pub records: Vec<(u64, JournalRecord)>,
    /// Length of the prefix made of complete records.
    pub valid_len: u64,
}

/// Splits `bytes` into records, stopping quietly at a torn tail.
pub(crate) fn decode_frames(bytes: &[u8]) -> CoreResult<Decoded> {
    let mut decoded = Decoded::default();
    let mut pos = 0usize;

    while pos < bytes.len() {
        let offset = pos as u64;
        let rest = &bytes[pos..];
        if rest.len() < HEADER_SIZE {
            break;
        }
        if rest[..4] != JOURNAL_MAGIC {
            return Err(CoreError::journal_corruption(offset, "bad magic"));
        }
        let version = u16::from_le_bytes([rest[4], rest[5]]);
        if version != JOURNAL_VERSION {
            return Err(CoreError::journal_corruption(
                offset,
                format!("unsupported journal version {version}"),
            ));
        }
        let kind = RecordKind::from_byte(rest[6]).ok_or_else(|| {
            CoreError::journal_corruption(offset, format!("unknown record type {}", rest[6]))
        })?;
        let len = u32::from_le_bytes([rest[7], rest[8], rest[9], rest[10]]) as usize;
        let frame_len = HEADER_SIZE + len + CRC_SIZE;
        if rest.len() < frame_len {
            break;
        }

        let body_end = HEADER_SIZE + len;
        let stored = u32::from_le_bytes([
            rest[body_end],
            rest[body_end + 1],
            rest[body_end + 2],
            rest[body_end + 3],
        ]);
        let actual = crc32(&rest[..body_end]);
        if stored != actual {
            return Err(CoreError::ChecksumMismatch {
                offset,
                expected: stored,
                actual,
            });
        }

        let record: JournalRecord = ciborium::from_reader(&rest[HEADER_SIZE..body_end])
            .map_err(|e| CoreError::journal_corruption(offset, e.to_string()))?;
        if record.kind() != kind {
            return Err(CoreError::journal_corruption(
                offset,
                "record type does not match payload",
            ));
        }

        decoded.records.push((offset, record));
        pos += frame_len;
        decoded.valid_len = pos as u64;
    }

    Ok(decoded)
}

const CRC_TABLE: [u32; 256] = build_crc_table();

const fn build_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut n = 0;
    while n < 256 {
        let mut c = n as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 == 1 { 0xEDB8_8320 ^ (c >> 1) } else { c >> 1 };
            k += 1;
        }
        table[n] = c;
        n += 1;
    }
    table
}

/// CRC-32 (IEEE 802.3).
pub(crate) fn crc32(data: &[u8]) -> u32 {
    !data.iter().fold(u32::MAX, |crc, &byte| {
        CRC_TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize] ^ (crc >> 8)
    })
}
