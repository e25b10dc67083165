// ----------------------------------------------------------------------------
//! Terrain clipmap engine: turns a collection of heightfield tiles with
//! stacked material layers into two ring buffered virtual textures (a
//! geometry and a material clipmap) that follow the camera with bounded
//! memory and cost.
//!
//! The per frame work is done by the [ClipmapCompositor]: it recomputes the
//! per level origins from the camera position, folds user, tile and layer
//! invalidations into minimal disjoint rectangle sets per level and issues
//! scissored draws through the host supplied [RasterBackend]. Regions still
//! valid from the previous frame are never re-rendered; camera motion only
//! refreshes the newly exposed texel strips (toroidal update).
//!
//! All compositor state is single threaded by contract. The offline helpers
//! (heightfield smoothing, mipmaps, normal synthesis, road carving) are row
//! parallel over a fork-join pool and are never invoked by the compositor.
// ----------------------------------------------------------------------------
pub mod aabb;
pub mod backend;
pub mod heightmap;
pub mod loader;
pub mod roads;

mod error;
mod terrain;
mod terrain_clipmap;
mod terrain_layers;
mod terrain_material;
mod terrain_tiles;
// ----------------------------------------------------------------------------
pub use error::TerrainError;

pub use backend::{
    BackendError, PassFlags, RasterBackend, Rectangle, RenderPass, SubmeshHandle, SurfaceFormat,
    TextureHandle,
};

pub use aabb::Aabb;
pub use terrain::Terrain;
pub use terrain_tiles::{TerrainTile, TileId, TileTexture};

pub use terrain_layers::{
    ClipmapLayer, DecalLayer, FadeRange, MaterialLayer, RoadLayer, TerrainLayer,
};
pub use terrain_material::{param, Material, MaterialParam, ParamValue};

pub use terrain_clipmap::{Clipmap, ClipmapCompositor, MAX_LEVELS, MAX_RENDER_TARGETS};

pub use heightmap::{HeightmapData, MipFilter};
pub use roads::{carve_road, RoadDescriptor};
// ----------------------------------------------------------------------------
