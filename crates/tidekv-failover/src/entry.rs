//! A single branch-of-history entry.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One branch of a vBucket's history.
///
/// The serde form is the durable on-disk representation
/// (`{"id": <uuid>, "seq": <seqno>}`) and must stay byte-compatible with
/// existing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverEntry {
    /// Branch UUID. Never zero; generated in the 48-bit space so the top
    /// 16 bits stay clear for the legacy wire format.
    #[serde(rename = "id")]
    pub vb_uuid: u64,
    /// Highest sequence number reached on this branch.
    #[serde(rename = "seq")]
    pub by_seqno: u64,
}

impl FailoverEntry {
    /// Size of one packed wire record: 8 bytes UUID + 8 bytes seqno.
    pub const WIRE_SIZE: usize = 16;

    /// Pack this entry into its 16-byte big-endian wire form.
    pub fn to_wire(&self) -> [u8; Self::WIRE_SIZE] {
        let mut buf = [0u8; Self::WIRE_SIZE];
        buf[..8].copy_from_slice(&self.vb_uuid.to_be_bytes());
        buf[8..].copy_from_slice(&self.by_seqno.to_be_bytes());
        buf
    }

    /// Unpack one entry from a 16-byte big-endian wire record.
    pub fn from_wire(record: &[u8; Self::WIRE_SIZE]) -> Self {
        let mut uuid = [0u8; 8];
        let mut seqno = [0u8; 8];
        uuid.copy_from_slice(&record[..8]);
        seqno.copy_from_slice(&record[8..]);
        Self {
            vb_uuid: u64::from_be_bytes(uuid),
            by_seqno: u64::from_be_bytes(seqno),
        }
    }
}

impl fmt::Display for FailoverEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{\"vb_uuid\":\"{}\", \"by_seqno\":\"{}\"}}",
            self.vb_uuid, self.by_seqno
        )
    }
}
