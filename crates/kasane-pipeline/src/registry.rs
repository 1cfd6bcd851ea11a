//! Static registry mapping persisted discriminators to stage kinds.
//!
//! The registry is the single place a `tabName` string is resolved to a
//! concrete kind and params type: an explicit factory table instead of
//! reflection, serving both pipeline-file loading and UI stage menus.

use serde_json::Value;

use crate::kind::StageKind;
use crate::params::{
    BlurParams, GrayscaleParams, InvertParams, ResizeParams, SourceParams, StageParams,
    ThresholdParams,
};

/// One registry entry: a kind, its discriminator, and a parser for its
/// concrete params type.
pub struct StageSpec {
    /// Persisted discriminator (`tabName`).
    pub name: &'static str,
    /// The kind this entry resolves to.
    pub kind: StageKind,
    /// Parse a JSON params payload against this kind's concrete type.
    /// This is the second phase of the two-phase polymorphic parse: the
    /// discriminator has already selected the type.
    pub parse_params: fn(Value) -> Result<StageParams, serde_json::Error>,
}

fn parse_source(v: Value) -> Result<StageParams, serde_json::Error> {
    serde_json::from_value::<SourceParams>(v).map(StageParams::Source)
}

fn parse_grayscale(v: Value) -> Result<StageParams, serde_json::Error> {
    serde_json::from_value::<GrayscaleParams>(v).map(StageParams::Grayscale)
}

fn parse_invert(v: Value) -> Result<StageParams, serde_json::Error> {
    serde_json::from_value::<InvertParams>(v).map(StageParams::Invert)
}

fn parse_blur(v: Value) -> Result<StageParams, serde_json::Error> {
    serde_json::from_value::<BlurParams>(v).map(StageParams::Blur)
}

fn parse_threshold(v: Value) -> Result<StageParams, serde_json::Error> {
    serde_json::from_value::<ThresholdParams>(v).map(StageParams::Threshold)
}

fn parse_resize(v: Value) -> Result<StageParams, serde_json::Error> {
    serde_json::from_value::<ResizeParams>(v).map(StageParams::Resize)
}

/// Every registered stage kind, in menu order. `source` is first and is
/// the only kind legal at chain position 0.
pub static REGISTRY: &[StageSpec] = &[
    StageSpec {
        name: "source",
        kind: StageKind::Source,
        parse_params: parse_source,
    },
    StageSpec {
        name: "grayscale",
        kind: StageKind::Grayscale,
        parse_params: parse_grayscale,
    },
    StageSpec {
        name: "invert",
        kind: StageKind::Invert,
        parse_params: parse_invert,
    },
    StageSpec {
        name: "blur",
        kind: StageKind::Blur,
        parse_params: parse_blur,
    },
    StageSpec {
        name: "threshold",
        kind: StageKind::Threshold,
        parse_params: parse_threshold,
    },
    StageSpec {
        name: "resize",
        kind: StageKind::Resize,
        parse_params: parse_resize,
    },
];

/// Resolve a persisted discriminator to its registry entry.
#[must_use]
pub fn lookup(name: &str) -> Option<&'static StageSpec> {
    REGISTRY.iter().find(|spec| spec.name == name)
}

/// Registry entry for a kind.
///
/// Every [`StageKind`] variant has exactly one entry, so this cannot
/// fail for kinds constructed through the public API.
#[must_use]
pub fn spec_for(kind: StageKind) -> Option<&'static StageSpec> {
    REGISTRY.iter().find(|spec| spec.kind == kind)
}
