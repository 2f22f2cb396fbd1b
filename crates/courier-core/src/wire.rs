//! Courier wire format: on-wire headers for every envelope the dispatcher emits.
//!
//! These types ARE the protocol. Every field and every size is part of the
//! wire format shared with relays, vehicles and the satellite gateway.
//!
//! All headers are `#[repr(C)]` and built only from little-endian zerocopy
//! integers, so they have alignment 1, a fixed size and no padding. There is
//! no unsafe code in this module.

use static_assertions::assert_eq_size;
use zerocopy::byteorder::{LittleEndian, U16, U32, U64};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

// ── Message ──────────────────────────────────────────────────────────────────

/// Header of an encoded [`Message`](crate::Message). The payload follows.
///
/// Wire size: 20 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct MessageHeader {
    /// Dispatcher-assigned request id. Also the parent id of any fragments.
    pub request_id: U32<LittleEndian>,
    pub source: U16<LittleEndian>,
    pub destination: U16<LittleEndian>,
    /// Unix time in milliseconds. 0 = unset.
    pub timestamp_millis: U64<LittleEndian>,
    /// Payload length in bytes, not including this header.
    pub length: U32<LittleEndian>,
}

assert_eq_size!(MessageHeader, [u8; 20]);

// ── Fragment ─────────────────────────────────────────────────────────────────

/// Header of one fragment of an oversized payload. The slice follows.
///
/// Wire size: 10 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct FragmentHeader {
    /// Shared by every fragment of the same payload.
    pub parent_id: U32<LittleEndian>,
    /// Zero-based position of this slice.
    pub index: U16<LittleEndian>,
    /// Number of fragments the payload was split into.
    pub total: U16<LittleEndian>,
    /// Slice length in bytes.
    pub length: U16<LittleEndian>,
}

assert_eq_size!(FragmentHeader, [u8; 10]);

// ── Transmission request ─────────────────────────────────────────────────────

/// Relay envelope: asks a relay system to forward inline data over its
/// acoustic modem before `deadline_millis`.
///
/// Part fields locate `data` within the message payload, so `data` holds
/// payload bytes only and never exceeds the channel limit.
///
/// Wire size: 28 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct TransmissionHeader {
    pub request_id: U32<LittleEndian>,
    /// Final destination, not the relay.
    pub destination: U16<LittleEndian>,
    /// Always [`COMM_MEAN_ACOUSTIC`] for now.
    pub comm_mean: u8,
    /// 0x01 = whole payload, 0x02 = payload slice.
    pub data_kind: u8,
    pub deadline_millis: U64<LittleEndian>,
    /// Request id of the message the data belongs to.
    pub parent_id: U32<LittleEndian>,
    pub index: U16<LittleEndian>,
    pub total: U16<LittleEndian>,
    pub length: U32<LittleEndian>,
}

assert_eq_size!(TransmissionHeader, [u8; 28]);

// ── Bearer envelope ──────────────────────────────────────────────────────────

/// Header of a satellite short-burst envelope. The body follows.
///
/// Wire size: 14 bytes. Header + body never exceed [`MAX_BEARER_ENVELOPE`].
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct BearerHeader {
    pub source: U16<LittleEndian>,
    pub destination: U16<LittleEndian>,
    /// 0x0001 = whole encoded message, 0x0002 = fragment of one.
    pub kind: U16<LittleEndian>,
    pub timestamp_millis: U64<LittleEndian>,
}

assert_eq_size!(BearerHeader, [u8; 14]);

// ── Constants ─────────────────────────────────────────────────────────────────

/// Default wait applied to deliveries that do not carry their own timeout.
pub const COMM_TIMEOUT_MILLIS: u64 = 20_000;

/// Largest payload the acoustic modem accepts inline. Larger payloads are fragmented.
pub const MAX_ACOUSTIC_PAYLOAD: usize = 998;

/// Deadline handed to relays for acoustic transmission requests.
pub const ACOUSTIC_TIMEOUT_SECS: u64 = 60;

/// Mobile-terminated short-burst limit of the satellite bearer.
pub const MAX_BEARER_ENVELOPE: usize = 270;

/// Service a system advertises when it can forward over its acoustic modem.
pub const ACOUSTIC_RELAY_SERVICE: &str = "acoustic/operation";

/// Communication mean byte for acoustic transmission requests.
pub const COMM_MEAN_ACOUSTIC: u8 = 0x02;

pub const BEARER_KIND_MESSAGE: u16 = 0x0001;
pub const BEARER_KIND_FRAGMENT: u16 = 0x0002;

// ── Framing helpers ──────────────────────────────────────────────────────────

/// Concatenate a header and its body into one buffer.
pub fn frame<H: AsBytes>(header: &H, body: &[u8]) -> Vec<u8> {
    let header = header.as_bytes();
    let mut out = Vec::with_capacity(header.len() + body.len());
    out.extend_from_slice(header);
    out.extend_from_slice(body);
    out
}

/// Split a buffer into its fixed-size header and the remaining body.
pub fn split_frame<H: FromBytes>(bytes: &[u8]) -> Result<(H, &[u8]), WireError> {
    let needed = std::mem::size_of::<H>();
    let header = H::read_from_prefix(bytes).ok_or(WireError::Truncated {
        needed,
        got: bytes.len(),
    })?;
    Ok((header, &bytes[needed..]))
}

/// Check a declared body length against the bytes actually present.
pub fn check_length(declared: usize, actual: usize) -> Result<(), WireError> {
    if declared != actual {
        return Err(WireError::LengthMismatch { declared, actual });
    }
    Ok(())
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("truncated frame: need {needed} header bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    #[error("declared length {declared} does not match {actual} body bytes")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("unknown data kind: 0x{0:02x}")]
    UnknownDataKind(u8),

    #[error("unknown bearer kind: 0x{0:04x}")]
    UnknownBearerKind(u16),

    #[error("unknown comm mean: 0x{0:02x}")]
    UnknownCommMean(u8),

    #[error("payload length {0} does not fit the length field")]
    PayloadTooLarge(usize),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
