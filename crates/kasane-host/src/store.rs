//! Pipeline files on disk.
//!
//! A pipeline file is the JSON stage list from
//! [`kasane_pipeline::codec`], written next to the images it
//! references. Paths inside the file are relative to the file's own
//! directory, so a project folder can be moved or renamed and its
//! pipeline files keep working.

use std::fs;
use std::path::Path;

use kasane_pipeline::{Chain, CodecError, codec};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the pipeline file or its root image failed.
    #[error("pipeline file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// The stage list could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Write `chain` as a pipeline file at `path`. The root image path is
/// stored relative to `path`'s parent directory.
///
/// # Errors
///
/// [`StoreError::Codec`] if the chain cannot be encoded,
/// [`StoreError::Io`] on write failure.
pub fn save(chain: &Chain, path: &Path) -> Result<(), StoreError> {
    let base = base_dir(path);
    let json = codec::to_json_string(chain, base)?;
    fs::write(path, json)?;
    info!(path = %path.display(), "saved pipeline");
    Ok(())
}

/// Load a pipeline file and the root image it references.
///
/// All-or-nothing: any failure leaves the caller's current chain
/// untouched because nothing is returned. A missing or unreadable root
/// image is a load failure too, since every stage depends on it.
///
/// # Errors
///
/// [`StoreError::Io`] on read failure, [`StoreError::Codec`] if the
/// stage list is malformed.
pub fn load(path: &Path) -> Result<Chain, StoreError> {
    let json = fs::read_to_string(path)?;
    let mut chain = codec::from_json_str(&json, base_dir(path))?;
    let bytes = fs::read(chain.root_path())?;
    chain.set_root_image(bytes, None);
    info!(path = %path.display(), stages = chain.len(), "loaded pipeline");
    Ok(chain)
}

fn base_dir(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new("."))
}
