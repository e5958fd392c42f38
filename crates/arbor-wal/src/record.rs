//! WAL record format.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use arbor_common::{ArborError, PageId, Result};

/// Log Sequence Number - unique identifier for each log record.
///
/// LSNs increase monotonically from [`Lsn::FIRST`]; 0 marks an
/// uninitialized value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Lsn(pub u64);

impl Lsn {
    /// Invalid/uninitialized LSN.
    pub const INVALID: Lsn = Lsn(0);

    /// First valid LSN.
    pub const FIRST: Lsn = Lsn(1);

    /// Returns true if this is a valid LSN.
    pub fn is_valid(&self) -> bool {
        self.0 > 0
    }

    /// Returns the LSN following this one.
    pub fn next(&self) -> Lsn {
        Lsn(self.0 + 1)
    }
}

impl std::fmt::Display for Lsn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Types of log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum WalRecordType {
    /// Key/record insertion.
    Insert = 1,
    /// Record overwrite for an existing key.
    Update = 2,
    /// Key/record removal.
    Delete = 3,
    /// Checkpoint marker.
    Checkpoint = 4,
}

impl TryFrom<u8> for WalRecordType {
    type Error = ArborError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(WalRecordType::Insert),
            2 => Ok(WalRecordType::Update),
            3 => Ok(WalRecordType::Delete),
            4 => Ok(WalRecordType::Checkpoint),
            _ => Err(ArborError::Codec(format!(
                "invalid WAL record type: {value}"
            ))),
        }
    }
}

/// A single record in the simulated WAL.
///
/// Record format when encoded:
/// - header (21 bytes): lsn (8), page_id (8), record_type (1),
///   payload_len (4)
/// - payload: variable length (the binary-encoded key the mutation acted
///   on; empty for checkpoints)
#[derive(Debug, Clone, PartialEq)]
pub struct WalRecord {
    /// LSN of this record.
    pub lsn: Lsn,
    /// Kind of mutation this record logs.
    pub record_type: WalRecordType,
    /// Page affected by the mutation.
    pub page_id: PageId,
    /// Binary-encoded key payload.
    pub payload: Bytes,
}

impl WalRecord {
    /// Size of the fixed header in bytes.
    pub const HEADER_SIZE: usize = 21;

    /// Returns the full encoded size of this record.
    pub fn encoded_size(&self) -> usize {
        Self::HEADER_SIZE + self.payload.len()
    }

    /// Appends the binary encoding of this record.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.lsn.0);
        buf.put_u64(self.page_id);
        buf.put_u8(self.record_type as u8);
        buf.put_u32(self.payload.len() as u32);
        buf.put_slice(&self.payload);
    }

    /// Decodes one record from the front of `buf`.
    pub fn decode(buf: &mut impl Buf) -> Result<WalRecord> {
        if buf.remaining() < Self::HEADER_SIZE {
            return Err(ArborError::Codec(format!(
                "truncated WAL record header: {} bytes",
                buf.remaining()
            )));
        }
        let lsn = Lsn(buf.get_u64());
        let page_id = buf.get_u64();
        let record_type = WalRecordType::try_from(buf.get_u8())?;
        let payload_len = buf.get_u32() as usize;
        if buf.remaining() < payload_len {
            return Err(ArborError::Codec(format!(
                "truncated WAL record payload: need {payload_len}, have {}",
                buf.remaining()
            )));
        }
        let payload = buf.copy_to_bytes(payload_len);
        Ok(WalRecord {
            lsn,
            record_type,
            page_id,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lsn_ordering() {
        assert!(Lsn::FIRST > Lsn::INVALID);
        assert!(Lsn::FIRST.is_valid());
        assert!(!Lsn::INVALID.is_valid());
        assert_eq!(Lsn(3).next(), Lsn(4));
    }

    #[test]
    fn test_record_type_tags() {
        for record_type in [
            WalRecordType::Insert,
            WalRecordType::Update,
            WalRecordType::Delete,
            WalRecordType::Checkpoint,
        ] {
            assert_eq!(WalRecordType::try_from(record_type as u8).unwrap(), record_type);
        }
        assert!(WalRecordType::try_from(0).is_err());
        assert!(WalRecordType::try_from(99).is_err());
    }

    #[test]
    fn test_record_codec_roundtrip() {
        let record = WalRecord {
            lsn: Lsn(17),
            record_type: WalRecordType::Delete,
            page_id: 42,
            payload: Bytes::from_static(b"\x00\x00\x00\x01\x00\x00\x00\x00\x00\x00\x00\x00\x07"),
        };
        let mut buf = BytesMut::new();
        record.encode(&mut buf);
        assert_eq!(buf.len(), record.encoded_size());
        let decoded = WalRecord::decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_record_decode_truncated() {
        let record = WalRecord {
            lsn: Lsn(1),
            record_type: WalRecordType::Insert,
            page_id: 1,
            payload: Bytes::from_static(b"abcdef"),
        };
        let mut buf = BytesMut::new();
        record.encode(&mut buf);
        let full = buf.freeze();

        let mut header_only = full.slice(0..WalRecord::HEADER_SIZE);
        assert!(WalRecord::decode(&mut header_only).is_err());

        let mut short_header = full.slice(0..5);
        assert!(WalRecord::decode(&mut short_header).is_err());
    }
}
