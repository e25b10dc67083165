// ----------------------------------------------------------------------------
/// hard limits of the clipmap core
pub const MAX_LEVELS: usize = 9;
pub const MAX_RENDER_TARGETS: usize = 4;
// largest atlas edge the column packing may produce
const MAX_ATLAS_EXTENT: u32 = 8192;
// ----------------------------------------------------------------------------
use glam::{uvec2, UVec2, Vec2};

use tracing::debug;

use crate::aabb::Aabb;
use crate::backend::{RasterBackend, Rectangle, SurfaceFormat, TextureHandle};
use crate::error::TerrainError;

pub use compositor::ClipmapCompositor;
// ----------------------------------------------------------------------------
mod compositor;
mod tracker;
// ----------------------------------------------------------------------------
/// shape of the allocated atlas textures. any change forces re-creation and
/// a full refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AtlasShape {
    size: UVec2,
    mip_levels: u32,
    format: SurfaceFormat,
    slots: usize,
    anisotropic: bool,
}
// ----------------------------------------------------------------------------
/// Multi-level ring of virtual textures following the camera. Every level
/// has the same texel count but covers a geometrically growing world extent.
/// All levels live in one column-packed 2d atlas per MRT slot: levels are
/// stacked vertically, additional columns are opened when the stack would
/// exceed the maximum atlas extent. The level to atlas-cell mapping is fixed
/// for the lifetime of the clipmap.
pub struct Clipmap {
    // settings
    num_textures: usize,
    num_levels: usize,
    cells_per_level: u32,
    level_bias: f32,
    /// user set cell sizes. NaN means "twice the previous level".
    cell_sizes: [f32; MAX_LEVELS],
    enable_mipmap: bool,
    enable_anisotropic: bool,
    /// fractional most-detailed level that is actively drawn
    min_level: f32,
    surface_format: SurfaceFormat,

    // derived per level, valid after cell size resolution
    pub(crate) actual_cell_sizes: [f32; MAX_LEVELS],
    /// world xz of texel (0,0) of each level. a corner, not a center.
    pub(crate) origins: [Vec2; MAX_LEVELS],
    pub(crate) previous_origins: [Vec2; MAX_LEVELS],
    /// toroidal wrap phase in texture coordinates, [0,1)^2
    pub(crate) offsets: [Vec2; MAX_LEVELS],

    pub(crate) invalid_regions: Vec<Vec<Aabb>>,
    pub(crate) invalid_regions_clipped: [bool; MAX_LEVELS],
    pub(crate) combined_invalid_aabb: [Option<Aabb>; MAX_LEVELS],
    /// levels that accumulated dirt while skipped below min_level. they get
    /// a full refresh once they re-enter the drawn range.
    pub(crate) stale_levels: [bool; MAX_LEVELS],

    textures: Vec<TextureHandle>,
    allocated: Option<AtlasShape>,
    pub(crate) use_incremental_update: bool,
}
// ----------------------------------------------------------------------------
impl Clipmap {
    // ------------------------------------------------------------------------
    pub fn new(
        surface_format: SurfaceFormat,
        num_textures: usize,
        num_levels: usize,
        cells_per_level: u32,
    ) -> Result<Self, TerrainError> {
        check_num_textures(num_textures)?;
        check_num_levels(num_levels)?;
        check_cells_per_level(cells_per_level)?;

        let mut cell_sizes = [f32::NAN; MAX_LEVELS];
        cell_sizes[0] = 1.0;

        Ok(Self {
            num_textures,
            num_levels,
            cells_per_level,
            level_bias: 0.0,
            cell_sizes,
            enable_mipmap: false,
            enable_anisotropic: false,
            min_level: 0.0,
            surface_format,

            actual_cell_sizes: [f32::NAN; MAX_LEVELS],
            origins: [Vec2::ZERO; MAX_LEVELS],
            previous_origins: [Vec2::ZERO; MAX_LEVELS],
            offsets: [Vec2::ZERO; MAX_LEVELS],

            invalid_regions: vec![Vec::new(); MAX_LEVELS],
            invalid_regions_clipped: [true; MAX_LEVELS],
            combined_invalid_aabb: [None; MAX_LEVELS],
            stale_levels: [false; MAX_LEVELS],

            textures: Vec::new(),
            allocated: None,
            use_incremental_update: false,
        })
    }
    // ------------------------------------------------------------------------
    // settings
    // ------------------------------------------------------------------------
    pub fn num_textures(&self) -> usize {
        self.num_textures
    }
    // ------------------------------------------------------------------------
    pub fn set_num_textures(&mut self, num_textures: usize) -> Result<(), TerrainError> {
        check_num_textures(num_textures)?;
        if self.num_textures != num_textures {
            self.num_textures = num_textures;
            self.use_incremental_update = false;
        }
        Ok(())
    }
    // ------------------------------------------------------------------------
    pub fn num_levels(&self) -> usize {
        self.num_levels
    }
    // ------------------------------------------------------------------------
    pub fn set_num_levels(&mut self, num_levels: usize) -> Result<(), TerrainError> {
        check_num_levels(num_levels)?;
        if self.num_levels != num_levels {
            self.num_levels = num_levels;
            self.min_level = self.min_level.min(num_levels as f32);
            self.use_incremental_update = false;
        }
        Ok(())
    }
    // ------------------------------------------------------------------------
    pub fn cells_per_level(&self) -> u32 {
        self.cells_per_level
    }
    // ------------------------------------------------------------------------
    pub fn set_cells_per_level(&mut self, cells_per_level: u32) -> Result<(), TerrainError> {
        check_cells_per_level(cells_per_level)?;
        if self.cells_per_level != cells_per_level {
            self.cells_per_level = cells_per_level;
            self.use_incremental_update = false;
        }
        Ok(())
    }
    // ------------------------------------------------------------------------
    pub fn enable_mipmap(&self) -> bool {
        self.enable_mipmap
    }
    // ------------------------------------------------------------------------
    pub fn set_enable_mipmap(&mut self, enable: bool) {
        if self.enable_mipmap != enable {
            self.enable_mipmap = enable;
            self.use_incremental_update = false;
        }
    }
    // ------------------------------------------------------------------------
    pub fn enable_anisotropic(&self) -> bool {
        self.enable_anisotropic
    }
    // ------------------------------------------------------------------------
    pub fn set_enable_anisotropic(&mut self, enable: bool) {
        if self.enable_anisotropic != enable {
            self.enable_anisotropic = enable;
            self.use_incremental_update = false;
        }
    }
    // ------------------------------------------------------------------------
    pub fn level_bias(&self) -> f32 {
        self.level_bias
    }
    // ------------------------------------------------------------------------
    /// sampling bias consumed by the host's shaders, no effect on updates
    pub fn set_level_bias(&mut self, bias: f32) {
        self.level_bias = bias;
    }
    // ------------------------------------------------------------------------
    pub fn min_level(&self) -> f32 {
        self.min_level
    }
    // ------------------------------------------------------------------------
    /// levels below this (fractional) level are not drawn. their atlas
    /// entries go stale and are refreshed when the level is drawn again.
    pub fn set_min_level(&mut self, min_level: f32) -> Result<(), TerrainError> {
        if !(min_level >= 0.0 && min_level <= self.num_levels as f32) {
            return Err(TerrainError::out_of_range(
                "min_level",
                min_level,
                0.0,
                self.num_levels as f32,
            ));
        }
        self.min_level = min_level;
        Ok(())
    }
    // ------------------------------------------------------------------------
    pub fn surface_format(&self) -> SurfaceFormat {
        self.surface_format
    }
    // ------------------------------------------------------------------------
    /// sets a user cell size. NaN re-enables "twice the previous level"
    /// inheritance for that level. level 0 must stay set.
    pub fn set_cell_size(&mut self, level: usize, size: f32) -> Result<(), TerrainError> {
        if level >= MAX_LEVELS {
            return Err(TerrainError::out_of_range(
                "level",
                level as f64,
                0.0,
                (MAX_LEVELS - 1) as f64,
            ));
        }
        if level == 0 && size.is_nan() {
            return Err(TerrainError::InvalidArgument(
                "cell size of level 0 must not be NaN",
            ));
        }
        if !size.is_nan() && !(size > 0.0 && size.is_finite()) {
            return Err(TerrainError::InvalidArgument("cell size must be > 0"));
        }
        if self.cell_sizes[level].to_bits() != size.to_bits() {
            self.cell_sizes[level] = size;
            // the world mapping of existing texels changed
            self.use_incremental_update = false;
        }
        Ok(())
    }
    // ------------------------------------------------------------------------
    pub(crate) fn cell_sizes(&self) -> &[f32; MAX_LEVELS] {
        &self.cell_sizes
    }
    // ------------------------------------------------------------------------
    // derived per-level state
    // ------------------------------------------------------------------------
    pub fn actual_cell_size(&self, level: usize) -> f32 {
        self.actual_cell_sizes[level]
    }
    // ------------------------------------------------------------------------
    /// world extent of one level edge
    pub fn level_size(&self, level: usize) -> f32 {
        self.actual_cell_sizes[level] * self.cells_per_level as f32
    }
    // ------------------------------------------------------------------------
    pub fn origin(&self, level: usize) -> Vec2 {
        self.origins[level]
    }
    // ------------------------------------------------------------------------
    pub fn offset(&self, level: usize) -> Vec2 {
        self.offsets[level]
    }
    // ------------------------------------------------------------------------
    pub fn level_aabb(&self, level: usize) -> Aabb {
        Aabb::from_origin_size(self.origins[level], Vec2::splat(self.level_size(level)))
    }
    // ------------------------------------------------------------------------
    pub fn invalid_regions(&self, level: usize) -> &[Aabb] {
        &self.invalid_regions[level]
    }
    // ------------------------------------------------------------------------
    pub fn combined_invalid_aabb(&self, level: usize) -> Option<Aabb> {
        self.combined_invalid_aabb[level]
    }
    // ------------------------------------------------------------------------
    pub fn use_incremental_update(&self) -> bool {
        self.use_incremental_update
    }
    // ------------------------------------------------------------------------
    /// one handle per MRT slot, empty until the first compositor pass
    pub fn textures(&self) -> &[TextureHandle] {
        &self.textures
    }
    // ------------------------------------------------------------------------
    // atlas layout
    // ------------------------------------------------------------------------
    /// levels per column and column count of the packing
    fn atlas_grid(&self) -> (u32, u32) {
        let per_column = (MAX_ATLAS_EXTENT / self.cells_per_level)
            .max(1)
            .min(self.num_levels as u32);
        let columns = (self.num_levels as u32 + per_column - 1) / per_column;
        (per_column, columns)
    }
    // ------------------------------------------------------------------------
    pub fn texture_size(&self) -> UVec2 {
        let (per_column, columns) = self.atlas_grid();
        uvec2(
            columns * self.cells_per_level,
            per_column * self.cells_per_level,
        )
    }
    // ------------------------------------------------------------------------
    /// pixel region of a level inside the atlas. fixed for the lifetime of
    /// the clipmap.
    pub fn atlas_region(&self, level: usize) -> Rectangle {
        let (per_column, _) = self.atlas_grid();
        let column = level as u32 / per_column;
        let row = level as u32 % per_column;
        Rectangle {
            pos: uvec2(column, row) * self.cells_per_level,
            size: UVec2::splat(self.cells_per_level),
        }
    }
    // ------------------------------------------------------------------------
    // texture lifecycle
    // ------------------------------------------------------------------------
    /// creates the atlas textures lazily and re-creates them whenever the
    /// required shape changed. returns true if the atlas contents are fresh
    /// and everything has to be redrawn.
    pub(crate) fn ensure_textures(
        &mut self,
        backend: &mut dyn RasterBackend,
    ) -> Result<bool, TerrainError> {
        let size = self.texture_size();
        let shape = AtlasShape {
            size,
            mip_levels: if self.enable_mipmap {
                mip_level_count(size)
            } else {
                1
            },
            format: self.surface_format,
            slots: self.num_textures,
            anisotropic: self.enable_anisotropic,
        };

        if self.allocated == Some(shape) {
            return Ok(false);
        }

        for texture in self.textures.drain(..) {
            backend.destroy_texture(texture);
        }
        for _ in 0..shape.slots {
            self.textures.push(backend.create_texture_2d(
                shape.size.x,
                shape.size.y,
                shape.mip_levels,
                shape.format,
            )?);
        }
        debug!(
            "allocated clipmap atlas: {}x{} texels, {} slots, {} mips",
            shape.size.x, shape.size.y, shape.slots, shape.mip_levels
        );
        self.allocated = Some(shape);
        self.use_incremental_update = false;
        Ok(true)
    }
    // ------------------------------------------------------------------------
}
// ----------------------------------------------------------------------------
fn mip_level_count(size: UVec2) -> u32 {
    32 - size.x.max(size.y).max(1).leading_zeros()
}
// ----------------------------------------------------------------------------
fn check_num_textures(num_textures: usize) -> Result<(), TerrainError> {
    if !(1..=MAX_RENDER_TARGETS).contains(&num_textures) {
        return Err(TerrainError::out_of_range(
            "num_textures",
            num_textures as f64,
            1.0,
            MAX_RENDER_TARGETS as f64,
        ));
    }
    Ok(())
}
// ----------------------------------------------------------------------------
fn check_num_levels(num_levels: usize) -> Result<(), TerrainError> {
    if !(1..=MAX_LEVELS).contains(&num_levels) {
        return Err(TerrainError::out_of_range(
            "num_levels",
            num_levels as f64,
            1.0,
            MAX_LEVELS as f64,
        ));
    }
    Ok(())
}
// ----------------------------------------------------------------------------
fn check_cells_per_level(cells_per_level: u32) -> Result<(), TerrainError> {
    if !(1..=MAX_ATLAS_EXTENT).contains(&cells_per_level) {
        return Err(TerrainError::out_of_range(
            "cells_per_level",
            cells_per_level,
            1,
            MAX_ATLAS_EXTENT,
        ));
    }
    Ok(())
}
// ----------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_construction_limits() {
        assert!(Clipmap::new(SurfaceFormat::Rgba8, 0, 3, 64).is_err());
        assert!(Clipmap::new(SurfaceFormat::Rgba8, 5, 3, 64).is_err());
        assert!(Clipmap::new(SurfaceFormat::Rgba8, 1, 0, 64).is_err());
        assert!(Clipmap::new(SurfaceFormat::Rgba8, 1, 10, 64).is_err());
        assert!(Clipmap::new(SurfaceFormat::Rgba8, 1, 3, 0).is_err());
        assert!(Clipmap::new(SurfaceFormat::Rgba8, 2, 3, 64).is_ok());
    }

    #[test]
    fn level_zero_cell_size_must_stay_set() {
        let mut clipmap = Clipmap::new(SurfaceFormat::Rgba8, 1, 3, 64).unwrap();
        assert!(clipmap.set_cell_size(0, f32::NAN).is_err());
        assert!(clipmap.set_cell_size(1, f32::NAN).is_ok());
        assert!(clipmap.set_cell_size(1, -2.0).is_err());
        assert!(clipmap.set_cell_size(0, 0.5).is_ok());
    }

    #[test]
    fn atlas_packs_levels_into_one_column() {
        let clipmap = Clipmap::new(SurfaceFormat::Rgba8, 1, 3, 64).unwrap();
        assert_eq!(clipmap.texture_size(), uvec2(64, 192));
        assert_eq!(clipmap.atlas_region(0), Rectangle::new(0, 0, 64, 64));
        assert_eq!(clipmap.atlas_region(2), Rectangle::new(0, 128, 64, 64));
    }

    #[test]
    fn atlas_opens_columns_when_stack_exceeds_extent() {
        // 9 levels of 4096 cells do not fit one 8192 column
        let clipmap = Clipmap::new(SurfaceFormat::Rgba8, 1, 9, 4096).unwrap();
        assert_eq!(clipmap.texture_size(), uvec2(5 * 4096, 2 * 4096));
        assert_eq!(clipmap.atlas_region(1).pos, uvec2(0, 4096));
        assert_eq!(clipmap.atlas_region(2).pos, uvec2(4096, 0));
    }

    #[test]
    fn setting_toggles_forces_full_refresh() {
        let mut clipmap = Clipmap::new(SurfaceFormat::Rgba8, 1, 3, 64).unwrap();
        clipmap.use_incremental_update = true;

        clipmap.set_enable_mipmap(true);
        assert!(!clipmap.use_incremental_update());

        clipmap.use_incremental_update = true;
        clipmap.set_enable_anisotropic(true);
        assert!(!clipmap.use_incremental_update());

        clipmap.use_incremental_update = true;
        clipmap.set_cells_per_level(128).unwrap();
        assert!(!clipmap.use_incremental_update());

        clipmap.use_incremental_update = true;
        clipmap.set_num_levels(4).unwrap();
        assert!(!clipmap.use_incremental_update());

        // unchanged values keep incremental updates
        clipmap.use_incremental_update = true;
        clipmap.set_num_levels(4).unwrap();
        clipmap.set_cells_per_level(128).unwrap();
        clipmap.set_enable_anisotropic(true);
        assert!(clipmap.use_incremental_update());
    }
}
// ----------------------------------------------------------------------------
