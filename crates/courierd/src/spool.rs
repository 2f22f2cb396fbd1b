//! Satellite spool: bearer envelopes written as files for the modem service.
//!
//! Writes are atomic: write to a temp file, then rename. The modem service
//! only ever sees complete `.sbd` files.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};

use courier_services::{BearerEnvelope, BearerSender, TransportError};

pub struct SpoolSender {
    dir: PathBuf,
    seq: AtomicU64,
}

impl SpoolSender {
    /// Creates the spool directory if it does not exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create spool dir: {}", dir.display()))?;
        Ok(Self {
            dir,
            seq: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write(&self, envelope: &BearerEnvelope) -> Result<PathBuf> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let name = format!(
            "{}-{:04x}-{:06}.sbd",
            envelope.timestamp_millis, envelope.destination.0, seq
        );
        let path = self.dir.join(name);
        let tmp_path = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp_path)
                .with_context(|| format!("failed to create temp file: {}", tmp_path.display()))?;
            file.write_all(&envelope.to_bytes())
                .context("failed to write envelope")?;
        }
        fs::rename(&tmp_path, &path).with_context(|| {
            format!(
                "failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;
        Ok(path)
    }
}

impl BearerSender for SpoolSender {
    fn send(&self, envelope: &BearerEnvelope) -> Result<(), TransportError> {
        let path = self
            .write(envelope)
            .map_err(|e| TransportError::Io(format!("{e:#}")))?;
        tracing::debug!(path = %path.display(), len = envelope.encoded_len(), "envelope spooled");
        Ok(())
    }
}
