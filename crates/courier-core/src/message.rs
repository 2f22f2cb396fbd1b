//! Messages and relay envelopes.
//!
//! The dispatcher treats a [`Message`] as opaque bytes plus addressing. Its
//! encoded form (header + payload) is what travels inside relay envelopes
//! and satellite bearer envelopes.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use zerocopy::byteorder::{U16, U32, U64};

use crate::wire::{
    check_length, frame, split_frame, MessageHeader, TransmissionHeader, WireError,
    COMM_MEAN_ACOUSTIC,
};

/// Unix timestamp in milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// 16-bit system address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SystemId(pub u16);

impl SystemId {
    /// Placeholder used before the dispatcher stamps addressing.
    pub const UNSET: SystemId = SystemId(0xffff);
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

/// A command message submitted for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub request_id: u32,
    pub source: SystemId,
    pub destination: SystemId,
    /// Unix time in milliseconds. 0 = unset.
    pub timestamp_millis: u64,
    pub payload: Bytes,
}

impl Message {
    /// A message with no addressing yet. The dispatcher fills it in.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            request_id: 0,
            source: SystemId::UNSET,
            destination: SystemId::UNSET,
            timestamp_millis: 0,
            payload: payload.into(),
        }
    }

    pub fn with_timestamp(mut self, timestamp_millis: u64) -> Self {
        self.timestamp_millis = timestamp_millis;
        self
    }

    /// Size of the opaque payload in bytes.
    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }

    /// Size of [`Message::to_bytes`] without building it.
    pub fn encoded_len(&self) -> usize {
        std::mem::size_of::<MessageHeader>() + self.payload.len()
    }

    /// Serialize header + payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        let length = u32::try_from(self.payload.len())
            .map_err(|_| WireError::PayloadTooLarge(self.payload.len()))?;
        let header = MessageHeader {
            request_id: U32::new(self.request_id),
            source: U16::new(self.source.0),
            destination: U16::new(self.destination.0),
            timestamp_millis: U64::new(self.timestamp_millis),
            length: U32::new(length),
        };
        Ok(frame(&header, &self.payload))
    }

    /// Parse a buffer produced by [`Message::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        let (header, body) = split_frame::<MessageHeader>(bytes)?;
        check_length(header.length.get() as usize, body.len())?;
        Ok(Self {
            request_id: header.request_id.get(),
            source: SystemId(header.source.get()),
            destination: SystemId(header.destination.get()),
            timestamp_millis: header.timestamp_millis.get(),
            payload: Bytes::copy_from_slice(body),
        })
    }
}

/// What a relay envelope carries inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum DataKind {
    /// The whole message payload.
    Message = 0x01,
    /// One slice of a fragmented payload.
    Fragment = 0x02,
}

impl TryFrom<u8> for DataKind {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(DataKind::Message),
            0x02 => Ok(DataKind::Fragment),
            other => Err(WireError::UnknownDataKind(other)),
        }
    }
}

/// Envelope asking a relay to forward `data` acoustically to `destination`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmissionRequest {
    pub request_id: u32,
    pub destination: SystemId,
    pub data_kind: DataKind,
    /// Unix time in milliseconds after which the relay should drop the request.
    pub deadline_millis: u64,
    /// Request id of the message `data` belongs to.
    pub parent_id: u32,
    pub index: u16,
    pub total: u16,
    /// Payload bytes only; no message or fragment header.
    pub data: Bytes,
}

impl TransmissionRequest {
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        let length = u32::try_from(self.data.len())
            .map_err(|_| WireError::PayloadTooLarge(self.data.len()))?;
        let header = TransmissionHeader {
            request_id: U32::new(self.request_id),
            destination: U16::new(self.destination.0),
            comm_mean: COMM_MEAN_ACOUSTIC,
            data_kind: self.data_kind as u8,
            deadline_millis: U64::new(self.deadline_millis),
            parent_id: U32::new(self.parent_id),
            index: U16::new(self.index),
            total: U16::new(self.total),
            length: U32::new(length),
        };
        Ok(frame(&header, &self.data))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        let (header, body) = split_frame::<TransmissionHeader>(bytes)?;
        if header.comm_mean != COMM_MEAN_ACOUSTIC {
            return Err(WireError::UnknownCommMean(header.comm_mean));
        }
        check_length(header.length.get() as usize, body.len())?;
        Ok(Self {
            request_id: header.request_id.get(),
            destination: SystemId(header.destination.get()),
            data_kind: DataKind::try_from(header.data_kind)?,
            deadline_millis: header.deadline_millis.get(),
            parent_id: header.parent_id.get(),
            index: header.index.get(),
            total: header.total.get(),
            data: Bytes::copy_from_slice(body),
        })
    }
}
