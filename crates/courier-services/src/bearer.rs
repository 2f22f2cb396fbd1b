//! Satellite bearer codec.
//!
//! A bearer envelope is a 14-byte [`BearerHeader`] followed by a body, at
//! most [`MAX_BEARER_ENVELOPE`] bytes in total. The body is either a whole
//! encoded [`Message`] or one fragment of it.

use std::time::Duration;

use bytes::Bytes;
use courier_core::wire::{
    frame, split_frame, BearerHeader, WireError, BEARER_KIND_FRAGMENT, BEARER_KIND_MESSAGE,
    MAX_BEARER_ENVELOPE,
};
use courier_core::{now_millis, Message, SystemId};
use zerocopy::byteorder::{U16, U64};

use crate::fragment::{split, Fragment, FragmentAssembler, FragmentError, FRAGMENT_HEADER_LEN};

pub const BEARER_HEADER_LEN: usize = std::mem::size_of::<BearerHeader>();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BearerKind {
    Message,
    Fragment,
}

impl BearerKind {
    fn code(self) -> u16 {
        match self {
            BearerKind::Message => BEARER_KIND_MESSAGE,
            BearerKind::Fragment => BEARER_KIND_FRAGMENT,
        }
    }

    fn from_code(code: u16) -> Result<Self, WireError> {
        match code {
            BEARER_KIND_MESSAGE => Ok(BearerKind::Message),
            BEARER_KIND_FRAGMENT => Ok(BearerKind::Fragment),
            other => Err(WireError::UnknownBearerKind(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerEnvelope {
    pub source: SystemId,
    pub destination: SystemId,
    pub kind: BearerKind,
    pub timestamp_millis: u64,
    pub body: Bytes,
}

impl BearerEnvelope {
    pub fn encoded_len(&self) -> usize {
        BEARER_HEADER_LEN + self.body.len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let header = BearerHeader {
            source: U16::new(self.source.0),
            destination: U16::new(self.destination.0),
            kind: U16::new(self.kind.code()),
            timestamp_millis: U64::new(self.timestamp_millis),
        };
        frame(&header, &self.body)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        let (header, body) = split_frame::<BearerHeader>(bytes)?;
        Ok(Self {
            source: SystemId(header.source.get()),
            destination: SystemId(header.destination.get()),
            kind: BearerKind::from_code(header.kind.get())?,
            timestamp_millis: header.timestamp_millis.get(),
            body: Bytes::copy_from_slice(body),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Fragment(#[from] FragmentError),

    #[error("envelope limit {0} leaves no room for a fragment")]
    EnvelopeTooSmall(usize),

    #[error("expected a whole-message envelope, got a fragment")]
    UnexpectedFragment,
}

/// Encodes messages into bounded bearer envelopes.
#[derive(Debug, Clone, Copy)]
pub struct BearerCodec {
    max_envelope: usize,
}

impl Default for BearerCodec {
    fn default() -> Self {
        Self::new(MAX_BEARER_ENVELOPE)
    }
}

impl BearerCodec {
    pub fn new(max_envelope: usize) -> Self {
        Self { max_envelope }
    }

    pub fn max_envelope(&self) -> usize {
        self.max_envelope
    }

    /// One `message` envelope when the encoded message fits, otherwise a
    /// run of `fragment` envelopes sharing the message's request id.
    pub fn encode(&self, message: &Message) -> Result<Vec<BearerEnvelope>, CodecError> {
        let slice_budget = self
            .max_envelope
            .checked_sub(BEARER_HEADER_LEN + FRAGMENT_HEADER_LEN)
            .filter(|budget| *budget > 0)
            .ok_or(CodecError::EnvelopeTooSmall(self.max_envelope))?;
        let body_budget = self.max_envelope - BEARER_HEADER_LEN;

        let timestamp_millis = match message.timestamp_millis {
            0 => now_millis(),
            ts => ts,
        };
        let stamped = Message {
            timestamp_millis,
            ..message.clone()
        };
        let encoded = Bytes::from(stamped.to_bytes()?);

        let envelope = |kind: BearerKind, body: Bytes| BearerEnvelope {
            source: message.source,
            destination: message.destination,
            kind,
            timestamp_millis,
            body,
        };

        if encoded.len() <= body_budget {
            return Ok(vec![envelope(BearerKind::Message, encoded)]);
        }

        split(&encoded, slice_budget, message.request_id)?
            .iter()
            .map(|f| {
                let body = Bytes::from(f.to_bytes()?);
                Ok::<_, CodecError>(envelope(BearerKind::Fragment, body))
            })
            .collect()
    }

    /// Decode a single whole-message envelope.
    pub fn decode(&self, bytes: &[u8]) -> Result<Message, CodecError> {
        let envelope = BearerEnvelope::from_bytes(bytes)?;
        if envelope.kind != BearerKind::Message {
            return Err(CodecError::UnexpectedFragment);
        }
        Ok(Message::from_bytes(&envelope.body)?)
    }
}

/// Rebuilds messages from bearer envelopes arriving in any order.
pub struct BearerReassembler {
    assembler: FragmentAssembler,
}

impl BearerReassembler {
    pub fn new(timeout: Duration) -> Self {
        Self {
            assembler: FragmentAssembler::new(timeout),
        }
    }

    /// Feed one envelope. Returns a message once one is complete.
    pub fn push(&mut self, envelope: &BearerEnvelope) -> Result<Option<Message>, CodecError> {
        match envelope.kind {
            BearerKind::Message => Ok(Some(Message::from_bytes(&envelope.body)?)),
            BearerKind::Fragment => {
                let fragment = Fragment::from_bytes(&envelope.body)?;
                match self.assembler.push(fragment)? {
                    Some(encoded) => Ok(Some(Message::from_bytes(&encoded)?)),
                    None => Ok(None),
                }
            }
        }
    }

    pub fn purge_stale(&mut self) -> usize {
        self.assembler.purge_stale()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(len: usize) -> Message {
        let mut msg = Message::new(vec![0x5a; len]).with_timestamp(1_700_000_000_000);
        msg.request_id = 77;
        msg.source = SystemId(0x4001);
        msg.destination = SystemId(0x0015);
        msg
    }

    #[test]
    fn small_message_is_one_envelope() {
        let codec = BearerCodec::default();
        let msg = message(32);
        let envelopes = codec.encode(&msg).unwrap();

        assert_eq!(envelopes.len(), 1);
        let env = &envelopes[0];
        assert_eq!(env.kind, BearerKind::Message);
        assert_eq!(env.source, msg.source);
        assert_eq!(env.destination, msg.destination);
        assert_eq!(codec.decode(&env.to_bytes()).unwrap(), msg);
    }

    #[test]
    fn unset_timestamp_is_stamped_now() {
        let mut msg = message(8);
        msg.timestamp_millis = 0;
        let before = now_millis();
        let env = &BearerCodec::default().encode(&msg).unwrap()[0];
        assert!(env.timestamp_millis >= before);
    }

    #[test]
    fn large_message_fragments_within_limit_and_reassembles() {
        let codec = BearerCodec::default();
        let msg = message(1000);
        let envelopes = codec.encode(&msg).unwrap();

        assert!(envelopes.len() > 1);
        assert!(envelopes.iter().all(|e| e.kind == BearerKind::Fragment));
        assert!(envelopes.iter().all(|e| e.to_bytes().len() <= MAX_BEARER_ENVELOPE));

        let mut reassembler = BearerReassembler::new(Duration::from_secs(60));
        let mut rebuilt = None;
        for env in envelopes.iter().rev() {
            let wire = BearerEnvelope::from_bytes(&env.to_bytes()).unwrap();
            if let Some(m) = reassembler.push(&wire).unwrap() {
                rebuilt = Some(m);
            }
        }
        assert_eq!(rebuilt, Some(msg));
    }

    #[test]
    fn decode_rejects_fragment_envelope() {
        let codec = BearerCodec::default();
        let envelopes = codec.encode(&message(600)).unwrap();
        assert_eq!(
            codec.decode(&envelopes[0].to_bytes()).unwrap_err(),
            CodecError::UnexpectedFragment
        );
    }

    #[test]
    fn tiny_envelope_limit_is_an_error() {
        let codec = BearerCodec::new(BEARER_HEADER_LEN + FRAGMENT_HEADER_LEN);
        assert_eq!(
            codec.encode(&message(4)).unwrap_err(),
            CodecError::EnvelopeTooSmall(24)
        );
    }

    #[test]
    fn message_too_large_to_fragment_is_an_error() {
        let codec = BearerCodec::new(BEARER_HEADER_LEN + FRAGMENT_HEADER_LEN + 1);
        let err = codec.encode(&message(70_000)).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Fragment(FragmentError::TooManyFragments { .. })
        ));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let mut bytes = BearerCodec::default().encode(&message(4)).unwrap()[0].to_bytes();
        bytes[4] = 0x09;
        assert_eq!(
            BearerEnvelope::from_bytes(&bytes).unwrap_err(),
            WireError::UnknownBearerKind(0x0009)
        );
    }
}
