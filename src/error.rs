// ----------------------------------------------------------------------------
use thiserror::Error;

use crate::backend::{BackendError, SurfaceFormat};
// ----------------------------------------------------------------------------
/// Errors surfaced by constructors, setters, helpers and the compositor.
/// Constructor and setter failures never leave partial state behind. A
/// compositor failure aborts the running frame; the previous atlas contents
/// stay on screen and the next frame does a full refresh.
#[derive(Debug, Error)]
pub enum TerrainError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("{name} out of range: {value} (valid: {min}..={max})")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// the layer has no local aabb. callers must use the (tile, layer)
    /// invalidation which falls back to the tile aabb.
    #[error("layer has no local aabb, invalidate it through its tile")]
    MissingAabb,

    #[error("unsupported surface format: {0:?}")]
    UnsupportedFormat(SurfaceFormat),

    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("raster backend failed: {0}")]
    Backend(#[from] BackendError),
}
// ----------------------------------------------------------------------------
impl TerrainError {
    // ------------------------------------------------------------------------
    pub(crate) fn out_of_range(
        name: &'static str,
        value: impl Into<f64>,
        min: impl Into<f64>,
        max: impl Into<f64>,
    ) -> Self {
        Self::OutOfRange {
            name,
            value: value.into(),
            min: min.into(),
            max: max.into(),
        }
    }
    // ------------------------------------------------------------------------
}
// ----------------------------------------------------------------------------
