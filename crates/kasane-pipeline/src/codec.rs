//! Pipeline persistence: an ordered JSON array of
//! `{ "tabName": <discriminator>, "params": <payload> }` records.
//!
//! Serialization walks the chain in order; list position defines chain
//! position on restore. Deserialization is a two-phase polymorphic
//! parse: the discriminator selects a concrete params type through the
//! [registry](crate::registry), then the payload is parsed against that
//! type. Any unresolved discriminator or mismatched payload fails the
//! whole load; no partially built chain ever escapes.
//!
//! The root item's image path is written relative to the pipeline
//! file's directory, so a directory moved wholesale (file + image)
//! still resolves after the move. This module is pure; file I/O lives
//! in the host crate.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chain::Chain;
use crate::kind::StageKind;
use crate::params::{SourceParams, StageParams};
use crate::registry;

/// One persisted stage record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedItem {
    /// Stage-kind discriminator.
    #[serde(rename = "tabName")]
    pub tab_name: String,
    /// Params payload; shape depends on `tab_name`.
    pub params: Value,
}

/// Errors from pipeline (de)serialization. Every variant fails the
/// whole operation atomically.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The persisted list had no items.
    #[error("pipeline file contains no stages")]
    Empty,

    /// The first item was not the root-stage kind.
    #[error("first stage must be '{expected}', found '{found}'", expected = StageKind::Source.name())]
    RootKindMismatch {
        /// Discriminator actually found at position 0.
        found: String,
    },

    /// A discriminator did not resolve through the registry.
    #[error("unknown stage kind '{name}'")]
    UnknownStage {
        /// The unresolved discriminator.
        name: String,
    },

    /// A params payload did not match the resolved concrete type.
    #[error("invalid params for stage '{name}': {source}")]
    BadParams {
        /// The stage's discriminator.
        name: String,
        /// The underlying parse failure.
        #[source]
        source: serde_json::Error,
    },

    /// JSON syntax or value-level failure.
    #[error("malformed pipeline JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The restored structure violated a chain invariant.
    #[error("invalid pipeline structure: {0}")]
    Invalid(String),
}

/// Serialize a chain to its ordered persisted records.
///
/// The root image path is written relative to `base_dir` (the directory
/// the pipeline file will live in) when the two share a prefix;
/// otherwise the path is kept as-is.
///
/// # Errors
///
/// [`CodecError::Json`] if a params struct fails to serialize.
pub fn to_items(chain: &Chain, base_dir: &Path) -> Result<Vec<PersistedItem>, CodecError> {
    let mut items = Vec::with_capacity(chain.len());

    let root_params = SourceParams {
        path: relative_to(chain.root_path(), base_dir),
    };
    items.push(PersistedItem {
        tab_name: StageKind::Source.name().to_string(),
        params: serde_json::to_value(&root_params)?,
    });

    for index in 1..chain.len() {
        // Indices below len always resolve; keep the codec total anyway.
        let (Some(kind), Some(params)) = (chain.kind_at(index), chain.params_at(index)) else {
            return Err(CodecError::Invalid(format!(
                "stage index {index} missing during serialization"
            )));
        };
        items.push(PersistedItem {
            tab_name: kind.name().to_string(),
            params: params_payload(&params)?,
        });
    }

    Ok(items)
}

/// Reconstruct a chain from persisted records.
///
/// Stages are appended in list order, each wired to its predecessor by
/// position; all caches start cold (every stage dirty). The root image
/// path is resolved against `base_dir`; the image bytes themselves are
/// not loaded here.
///
/// # Errors
///
/// See [`CodecError`]; any failure aborts the whole load.
pub fn from_items(items: &[PersistedItem], base_dir: &Path) -> Result<Chain, CodecError> {
    let Some((root_item, rest)) = items.split_first() else {
        return Err(CodecError::Empty);
    };

    let root_spec = registry::lookup(&root_item.tab_name).ok_or_else(|| {
        CodecError::UnknownStage {
            name: root_item.tab_name.clone(),
        }
    })?;
    if root_spec.kind != StageKind::Source {
        return Err(CodecError::RootKindMismatch {
            found: root_item.tab_name.clone(),
        });
    }
    let root_params = parse_item_params(root_spec, root_item)?;
    let StageParams::Source(source) = root_params else {
        return Err(CodecError::Invalid(
            "source registry entry produced non-source params".to_string(),
        ));
    };

    let mut chain = Chain::new();
    chain.set_root_path(resolve(&source.path, base_dir));

    for item in rest {
        let spec = registry::lookup(&item.tab_name).ok_or_else(|| CodecError::UnknownStage {
            name: item.tab_name.clone(),
        })?;
        if spec.kind == StageKind::Source {
            return Err(CodecError::Invalid(
                "source stage is only legal at position 0".to_string(),
            ));
        }
        let params = parse_item_params(spec, item)?;
        chain
            .push(spec.kind, params)
            .map_err(|e| CodecError::Invalid(e.to_string()))?;
    }

    Ok(chain)
}

/// Serialize a chain to a pretty JSON string.
///
/// # Errors
///
/// See [`to_items`].
pub fn to_json_string(chain: &Chain, base_dir: &Path) -> Result<String, CodecError> {
    let items = to_items(chain, base_dir)?;
    Ok(serde_json::to_string_pretty(&items)?)
}

/// Reconstruct a chain from a JSON string.
///
/// # Errors
///
/// See [`from_items`], plus [`CodecError::Json`] for syntax errors.
pub fn from_json_str(json: &str, base_dir: &Path) -> Result<Chain, CodecError> {
    let items: Vec<PersistedItem> = serde_json::from_str(json)?;
    from_items(&items, base_dir)
}

fn parse_item_params(
    spec: &'static registry::StageSpec,
    item: &PersistedItem,
) -> Result<StageParams, CodecError> {
    (spec.parse_params)(item.params.clone())
        .map(StageParams::clamped)
        .map_err(|source| CodecError::BadParams {
            name: item.tab_name.clone(),
            source,
        })
}

/// Serialize params as the bare object stored in a record's `params`
/// field, without the enum tag.
///
/// # Errors
///
/// Propagates the `serde_json` failure.
pub fn params_payload(params: &StageParams) -> Result<Value, serde_json::Error> {
    match params {
        StageParams::Source(p) => serde_json::to_value(p),
        StageParams::Grayscale(p) => serde_json::to_value(p),
        StageParams::Invert(p) => serde_json::to_value(p),
        StageParams::Blur(p) => serde_json::to_value(p),
        StageParams::Threshold(p) => serde_json::to_value(p),
        StageParams::Resize(p) => serde_json::to_value(p),
    }
}

/// Express `path` relative to `base`, walking up with `..` where the
/// two diverge. Already-relative paths are kept as-is; paths with a
/// different root (e.g. another drive) fall back to the original.
fn relative_to(path: &Path, base: &Path) -> PathBuf {
    if path.is_relative() {
        return path.to_path_buf();
    }

    let path_parts: Vec<Component<'_>> = path.components().collect();
    let base_parts: Vec<Component<'_>> = base.components().collect();

    let common = path_parts
        .iter()
        .zip(base_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();
    if common == 0 {
        return path.to_path_buf();
    }

    let mut result = PathBuf::new();
    for _ in common..base_parts.len() {
        result.push("..");
    }
    for part in &path_parts[common..] {
        result.push(part);
    }
    result
}

/// Resolve a stored path against the directory the pipeline file was
/// loaded from. Absolute paths pass through unchanged.
fn resolve(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
