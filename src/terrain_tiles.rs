// ----------------------------------------------------------------------------
/// default alpha threshold below which a hole texture sample punches a hole
const DEFAULT_HOLE_THRESHOLD: f32 = 0.5;
// ----------------------------------------------------------------------------
use glam::{vec2, Vec2};

use tracing::warn;

use crate::aabb::Aabb;
use crate::backend::{SurfaceFormat, TextureHandle};
use crate::error::TerrainError;
use crate::terrain_layers::TerrainLayer;
use crate::terrain_material::Material;
// ----------------------------------------------------------------------------
/// Positional index into the terrain's ordered tile list (the draw order).
/// Removing a tile shifts the ids of all later tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileId(pub usize);
// ----------------------------------------------------------------------------
/// an already uploaded host texture plus the metadata the engine needs
#[derive(Debug, Clone, Copy)]
pub struct TileTexture {
    pub handle: TextureHandle,
    pub width: u32,
    pub height: u32,
    pub format: SurfaceFormat,
}
// ----------------------------------------------------------------------------
/// Rectangular heightfield region. Owns the ordered list of layers drawn
/// into the clipmaps; earlier layers are overwritten by later ones.
#[derive(Debug)]
pub struct TerrainTile {
    origin: Vec2,
    cell_size: f32,
    height_texture: Option<TileTexture>,
    normal_texture: Option<TileTexture>,
    hole_texture: Option<TileTexture>,
    hole_threshold: f32,
    /// geometry pass material. a tile without one contributes no heights.
    material: Option<Material>,
    pub(crate) layers: Vec<TerrainLayer>,
    aabb: Aabb,
}
// ----------------------------------------------------------------------------
impl TerrainTile {
    // ------------------------------------------------------------------------
    pub fn new(origin: Vec2, cell_size: f32) -> Result<Self, TerrainError> {
        if !(cell_size > 0.0 && cell_size.is_finite()) {
            return Err(TerrainError::InvalidArgument("cell size must be > 0"));
        }
        check_origin_alignment(origin, cell_size);

        let mut tile = Self {
            origin,
            cell_size,
            height_texture: None,
            normal_texture: None,
            hole_texture: None,
            hole_threshold: DEFAULT_HOLE_THRESHOLD,
            material: None,
            layers: Vec::new(),
            aabb: Aabb::new(origin, origin),
        };
        tile.update_aabb();
        Ok(tile)
    }
    // ------------------------------------------------------------------------
    pub fn with_material(mut self, material: Material) -> Self {
        self.material = Some(material);
        self
    }
    // ------------------------------------------------------------------------
    pub fn origin(&self) -> Vec2 {
        self.origin
    }
    // ------------------------------------------------------------------------
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }
    // ------------------------------------------------------------------------
    pub fn width_x(&self) -> f32 {
        self.height_texture
            .map_or(0.0, |t| t.width as f32 * self.cell_size)
    }
    // ------------------------------------------------------------------------
    pub fn width_z(&self) -> f32 {
        self.height_texture
            .map_or(0.0, |t| t.height as f32 * self.cell_size)
    }
    // ------------------------------------------------------------------------
    pub fn aabb(&self) -> Aabb {
        self.aabb
    }
    // ------------------------------------------------------------------------
    pub fn material(&self) -> Option<&Material> {
        self.material.as_ref()
    }
    // ------------------------------------------------------------------------
    pub fn height_texture(&self) -> Option<TileTexture> {
        self.height_texture
    }
    // ------------------------------------------------------------------------
    pub fn normal_texture(&self) -> Option<TileTexture> {
        self.normal_texture
    }
    // ------------------------------------------------------------------------
    pub fn hole_texture(&self) -> Option<TileTexture> {
        self.hole_texture
    }
    // ------------------------------------------------------------------------
    pub fn hole_threshold(&self) -> f32 {
        self.hole_threshold
    }
    // ------------------------------------------------------------------------
    pub fn layers(&self) -> &[TerrainLayer] {
        &self.layers
    }
    // ------------------------------------------------------------------------
    // mutators. every mutator returns the world region the owning terrain
    // has to invalidate (the union of the old and new tile extent).
    // ------------------------------------------------------------------------
    pub fn set_origin(&mut self, origin: Vec2) -> Aabb {
        check_origin_alignment(origin, self.cell_size);

        let old = self.aabb;
        self.origin = origin;
        self.update_aabb();
        old.grow(self.aabb)
    }
    // ------------------------------------------------------------------------
    pub fn set_cell_size(&mut self, cell_size: f32) -> Result<Aabb, TerrainError> {
        if !(cell_size > 0.0 && cell_size.is_finite()) {
            return Err(TerrainError::InvalidArgument("cell size must be > 0"));
        }
        check_origin_alignment(self.origin, cell_size);

        let old = self.aabb;
        self.cell_size = cell_size;
        self.update_aabb();
        Ok(old.grow(self.aabb))
    }
    // ------------------------------------------------------------------------
    pub fn set_height_texture(&mut self, texture: Option<TileTexture>) -> Aabb {
        let old = self.aabb;
        self.height_texture = texture;
        self.update_aabb();
        old.grow(self.aabb)
    }
    // ------------------------------------------------------------------------
    pub fn set_normal_texture(&mut self, texture: Option<TileTexture>) -> Aabb {
        self.normal_texture = texture;
        self.aabb
    }
    // ------------------------------------------------------------------------
    pub fn set_hole_texture(&mut self, texture: Option<TileTexture>) -> Aabb {
        self.hole_texture = texture;
        self.aabb
    }
    // ------------------------------------------------------------------------
    pub fn set_hole_threshold(&mut self, threshold: f32) -> Aabb {
        self.hole_threshold = threshold;
        self.aabb
    }
    // ------------------------------------------------------------------------
    fn update_aabb(&mut self) {
        self.aabb = Aabb::new(
            self.origin,
            self.origin + vec2(self.width_x(), self.width_z()),
        );
    }
    // ------------------------------------------------------------------------
}
// ----------------------------------------------------------------------------
// origins that are not multiples of the cell size produce visible seams
// between adjacent tiles
fn check_origin_alignment(origin: Vec2, cell_size: f32) {
    let misaligned =
        (origin.x / cell_size).fract() != 0.0 || (origin.y / cell_size).fract() != 0.0;
    if misaligned {
        warn!(
            "tile origin ({}, {}) is not a multiple of cell size {}, expect seams",
            origin.x, origin.y, cell_size
        );
    }
}
// ----------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;

    fn texture(width: u32, height: u32) -> TileTexture {
        TileTexture {
            handle: TextureHandle(1),
            width,
            height,
            format: SurfaceFormat::R32Float,
        }
    }

    #[test]
    fn rejects_non_positive_cell_size() {
        assert!(TerrainTile::new(Vec2::ZERO, 0.0).is_err());
        assert!(TerrainTile::new(Vec2::ZERO, -1.0).is_err());
        assert!(TerrainTile::new(Vec2::ZERO, f32::NAN).is_err());
    }

    #[test]
    fn aabb_follows_height_texture_and_cell_size() {
        let mut tile = TerrainTile::new(vec2(16.0, 32.0), 2.0).unwrap();
        assert!(tile.aabb().is_degenerate());

        tile.set_height_texture(Some(texture(128, 64)));
        assert_eq!(tile.aabb(), Aabb::new(vec2(16.0, 32.0), vec2(272.0, 160.0)));
        assert_eq!(tile.width_x(), 256.0);
        assert_eq!(tile.width_z(), 128.0);

        let delta = tile.set_cell_size(1.0).unwrap();
        assert_eq!(tile.aabb(), Aabb::new(vec2(16.0, 32.0), vec2(144.0, 96.0)));
        // delta covers the old and the new extent
        assert!(delta.contains(&Aabb::new(vec2(16.0, 32.0), vec2(272.0, 160.0))));
        assert!(delta.contains(&tile.aabb()));
    }

    #[test]
    fn moving_the_tile_invalidates_both_extents() {
        let mut tile = TerrainTile::new(Vec2::ZERO, 1.0).unwrap();
        tile.set_height_texture(Some(texture(32, 32)));

        let delta = tile.set_origin(vec2(64.0, 0.0));
        assert!(delta.contains(&Aabb::new(Vec2::ZERO, vec2(32.0, 32.0))));
        assert!(delta.contains(&Aabb::new(vec2(64.0, 0.0), vec2(96.0, 32.0))));
    }
}
// ----------------------------------------------------------------------------
