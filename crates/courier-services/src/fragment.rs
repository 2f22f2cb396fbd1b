//! Fragmenter: splits oversized payloads into bounded parts and puts them back.
//!
//! A payload of `len` bytes with a per-part limit of `max` becomes
//! `ceil(len / max)` consecutive slices sharing a parent id. Slices are
//! `Bytes` views into the original buffer; nothing is copied on split.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use courier_core::wire::{check_length, frame, split_frame, FragmentHeader, WireError};
use zerocopy::byteorder::{U16, U32};

/// Encoded size of a fragment header.
pub const FRAGMENT_HEADER_LEN: usize = std::mem::size_of::<FragmentHeader>();

/// One bounded slice of a larger payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub parent_id: u32,
    pub index: u16,
    pub total: u16,
    pub payload: Bytes,
}

impl Fragment {
    /// Fragment header followed by the slice.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        let length = u16::try_from(self.payload.len())
            .map_err(|_| WireError::PayloadTooLarge(self.payload.len()))?;
        let header = FragmentHeader {
            parent_id: U32::new(self.parent_id),
            index: U16::new(self.index),
            total: U16::new(self.total),
            length: U16::new(length),
        };
        Ok(frame(&header, &self.payload))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        let (header, body) = split_frame::<FragmentHeader>(bytes)?;
        check_length(header.length.get() as usize, body.len())?;
        Ok(Self {
            parent_id: header.parent_id.get(),
            index: header.index.get(),
            total: header.total.get(),
            payload: Bytes::copy_from_slice(body),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FragmentError {
    #[error("maximum fragment size must be greater than zero")]
    ZeroMaxPayload,

    #[error("payload needs {count} fragments, more than {max} allowed")]
    TooManyFragments { count: usize, max: usize },

    #[error("fragment index {index} out of range for total {total}")]
    IndexOutOfRange { index: u16, total: u16 },

    #[error("fragment of {parent_id} declares total {got}, expected {expected}")]
    InconsistentTotal {
        parent_id: u32,
        expected: u16,
        got: u16,
    },

    #[error("fragments of {parent_id} incomplete: {have} of {total}")]
    Incomplete { parent_id: u32, have: usize, total: u16 },
}

/// Split `payload` into slices of at most `max_payload` bytes.
///
/// A payload that already fits (including an empty one) comes back as a
/// single fragment equal to it.
pub fn split(payload: &Bytes, max_payload: usize, parent_id: u32) -> Result<Vec<Fragment>, FragmentError> {
    if max_payload == 0 {
        return Err(FragmentError::ZeroMaxPayload);
    }
    if payload.len() <= max_payload {
        return Ok(vec![Fragment {
            parent_id,
            index: 0,
            total: 1,
            payload: payload.clone(),
        }]);
    }

    let count = payload.len().div_ceil(max_payload);
    let total = u16::try_from(count).map_err(|_| FragmentError::TooManyFragments {
        count,
        max: u16::MAX as usize,
    })?;

    let fragments = payload
        .chunks(max_payload)
        .enumerate()
        .map(|(i, chunk)| {
            let start = i * max_payload;
            Fragment {
                parent_id,
                index: i as u16,
                total,
                payload: payload.slice(start..start + chunk.len()),
            }
        })
        .collect();
    Ok(fragments)
}

/// Concatenate a complete set of fragments in index order.
pub fn join(fragments: &[Fragment]) -> Result<Bytes, FragmentError> {
    let Some(first) = fragments.first() else {
        return Ok(Bytes::new());
    };
    let mut assembler = FragmentAssembler::new(Duration::MAX);
    for fragment in fragments {
        if let Some(payload) = assembler.push(fragment.clone())? {
            return Ok(payload);
        }
    }
    Err(FragmentError::Incomplete {
        parent_id: first.parent_id,
        have: assembler.received(first.parent_id),
        total: first.total,
    })
}

struct Assembly {
    total: u16,
    parts: BTreeMap<u16, Bytes>,
    started_at: Instant,
}

/// Collects fragments per parent id until every index has arrived.
///
/// Arrival order does not matter and duplicates are ignored. Assemblies
/// older than the configured timeout are dropped by [`purge_stale`](Self::purge_stale).
pub struct FragmentAssembler {
    pending: HashMap<u32, Assembly>,
    timeout: Duration,
}

impl FragmentAssembler {
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            timeout,
        }
    }

    /// Add one fragment. Returns the payload once the set is complete.
    pub fn push(&mut self, fragment: Fragment) -> Result<Option<Bytes>, FragmentError> {
        if fragment.total == 0 || fragment.index >= fragment.total {
            return Err(FragmentError::IndexOutOfRange {
                index: fragment.index,
                total: fragment.total,
            });
        }

        let assembly = self
            .pending
            .entry(fragment.parent_id)
            .or_insert_with(|| Assembly {
                total: fragment.total,
                parts: BTreeMap::new(),
                started_at: Instant::now(),
            });
        if assembly.total != fragment.total {
            return Err(FragmentError::InconsistentTotal {
                parent_id: fragment.parent_id,
                expected: assembly.total,
                got: fragment.total,
            });
        }
        assembly.parts.entry(fragment.index).or_insert(fragment.payload);

        if assembly.parts.len() < assembly.total as usize {
            return Ok(None);
        }

        let Some(done) = self.pending.remove(&fragment.parent_id) else {
            return Ok(None);
        };
        let size = done.parts.values().map(Bytes::len).sum();
        let mut out = BytesMut::with_capacity(size);
        for part in done.parts.values() {
            out.extend_from_slice(part);
        }
        Ok(Some(out.freeze()))
    }

    /// Number of distinct fragments held for `parent_id`.
    pub fn received(&self, parent_id: u32) -> usize {
        self.pending.get(&parent_id).map_or(0, |a| a.parts.len())
    }

    /// Number of incomplete assemblies.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Drop assemblies older than the timeout. Returns how many were dropped.
    pub fn purge_stale(&mut self) -> usize {
        let before = self.pending.len();
        let timeout = self.timeout;
        self.pending.retain(|_, a| a.started_at.elapsed() <= timeout);
        let purged = before - self.pending.len();
        if purged > 0 {
            tracing::debug!(purged, "dropped stale fragment assemblies");
        }
        purged
    }
}
