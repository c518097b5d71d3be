//! Firmware slot: on-disk home of staged and pending images
//!
//! An image is written to a temporary file inside the slot directory while
//! it downloads. Only a verified image is renamed to the pending path, with
//! its SHA-256 written next to it. Dropping a `StagedImage` removes the
//! partial file.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use otaflow_core::TransportError;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info};

const PENDING_IMAGE: &str = "firmware.pending.bin";
const STAGING_PREFIX: &str = ".firmware.staging";

/// Directory holding the pending firmware image
#[derive(Debug, Clone)]
pub struct FirmwareSlot {
    dir: PathBuf,
}

impl FirmwareSlot {
    /// Open (and create if missing) the slot directory
    ///
    /// # Errors
    /// `Io` if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, TransportError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where an installed image is placed
    pub fn pending_path(&self) -> PathBuf {
        self.dir.join(PENDING_IMAGE)
    }

    /// Checksum sidecar of the pending image
    pub fn checksum_path(&self) -> PathBuf {
        self.dir.join(format!("{PENDING_IMAGE}.sha256"))
    }

    /// Start staging a new image
    ///
    /// # Errors
    /// `Io` if the staging file cannot be created.
    pub fn stage(&self) -> Result<StagedImage, TransportError> {
        let file = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(&self.dir)?;
        debug!(path = %file.path().display(), "staging firmware image");
        Ok(StagedImage {
            writer: BufWriter::new(file),
            hasher: Sha256::new(),
            written: 0,
            first_byte: None,
        })
    }
}

/// Image being written to the slot
pub struct StagedImage {
    writer: BufWriter<NamedTempFile>,
    hasher: Sha256,
    written: u64,
    first_byte: Option<u8>,
}

impl StagedImage {
    /// Append `chunk`
    ///
    /// # Errors
    /// `Io` if the write fails.
    pub fn write(&mut self, chunk: &[u8]) -> Result<(), TransportError> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.first_byte.get_or_insert(chunk[0]);
        self.writer.write_all(chunk)?;
        self.hasher.update(chunk);
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Bytes written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// First byte of the image, once written
    pub fn first_byte(&self) -> Option<u8> {
        self.first_byte
    }

    /// Move the image into place as the slot's pending image
    ///
    /// Returns the hex-encoded SHA-256 of the image.
    ///
    /// # Errors
    /// `Io` if flushing, renaming or writing the checksum fails.
    pub fn install(self, slot: &FirmwareSlot) -> Result<String, TransportError> {
        let file = self
            .writer
            .into_inner()
            .map_err(|e| TransportError::Io(e.error().to_string()))?;
        file.as_file().sync_all()?;

        let digest = hex::encode(self.hasher.finalize());
        let pending = slot.pending_path();
        file.persist(&pending)
            .map_err(|e| TransportError::Io(e.error.to_string()))?;
        fs::write(slot.checksum_path(), format!("{digest}  {PENDING_IMAGE}\n"))?;

        info!(
            path = %pending.display(),
            bytes = self.written,
            sha256 = %digest,
            "firmware image installed"
        );
        Ok(digest)
    }
}
