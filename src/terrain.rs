// ----------------------------------------------------------------------------
use glam::Vec4;

use crate::aabb::{combined_aabb, insert_region, Aabb};
use crate::backend::{PassFlags, RenderPass};
use crate::error::TerrainError;
use crate::terrain_layers::{ClipmapLayer, TerrainLayer};
use crate::terrain_tiles::{TerrainTile, TileId, TileTexture};
// ----------------------------------------------------------------------------
/// Aggregates the ordered tile list, the per-pass invalid region lists and
/// the per-pass clear values. All layer and tile mutations go through this
/// type so the matching invalidations are recorded automatically; the
/// compositor drains the lists once per frame.
pub struct Terrain {
    tiles: Vec<TerrainTile>,

    invalid_base_regions: Vec<Aabb>,
    invalid_detail_regions: Vec<Aabb>,
    /// advisory: true when the matching list is known to be pairwise
    /// disjoint (0 or 1 entries). the compositor re-clips any list not
    /// flagged before use.
    invalid_base_clipped: bool,
    invalid_detail_clipped: bool,

    /// one clear value per MRT slot of the respective clipmap
    base_clear_values: [Vec4; 4],
    detail_clear_values: [Vec4; 4],
}
// ----------------------------------------------------------------------------
impl Default for Terrain {
    fn default() -> Self {
        Self::new()
    }
}
// ----------------------------------------------------------------------------
impl Terrain {
    // ------------------------------------------------------------------------
    pub fn new() -> Self {
        Self {
            tiles: Vec::new(),
            invalid_base_regions: Vec::new(),
            invalid_detail_regions: Vec::new(),
            invalid_base_clipped: true,
            invalid_detail_clipped: true,
            base_clear_values: [Vec4::ZERO; 4],
            detail_clear_values: [Vec4::ZERO; 4],
        }
    }
    // ------------------------------------------------------------------------
    /// union of all tile extents (height ignored)
    pub fn aabb(&self) -> Option<Aabb> {
        combined_aabb(&self.tiles.iter().map(|t| t.aabb()).collect::<Vec<_>>())
    }
    // ------------------------------------------------------------------------
    // tiles
    // ------------------------------------------------------------------------
    pub fn add_tile(&mut self, tile: TerrainTile) -> TileId {
        let aabb = tile.aabb();
        self.tiles.push(tile);
        self.insert_invalid(aabb, PassFlags::all());
        TileId(self.tiles.len() - 1)
    }
    // ------------------------------------------------------------------------
    /// removes a tile from the draw order. ids of all later tiles shift
    /// down by one.
    pub fn remove_tile(&mut self, id: TileId) -> Result<TerrainTile, TerrainError> {
        if id.0 >= self.tiles.len() {
            return Err(TerrainError::InvalidArgument("no such tile"));
        }
        let tile = self.tiles.remove(id.0);
        self.insert_invalid(tile.aabb(), PassFlags::all());
        Ok(tile)
    }
    // ------------------------------------------------------------------------
    pub fn tile(&self, id: TileId) -> Result<&TerrainTile, TerrainError> {
        self.tiles
            .get(id.0)
            .ok_or(TerrainError::InvalidArgument("no such tile"))
    }
    // ------------------------------------------------------------------------
    pub fn tiles(&self) -> impl Iterator<Item = (TileId, &TerrainTile)> {
        self.tiles
            .iter()
            .enumerate()
            .map(|(i, tile)| (TileId(i), tile))
    }
    // ------------------------------------------------------------------------
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }
    // ------------------------------------------------------------------------
    // tile mutation wrappers. the tile mutators return the world region to
    // refresh, the terrain records it in the appropriate lists.
    // ------------------------------------------------------------------------
    pub fn set_tile_origin(&mut self, id: TileId, origin: glam::Vec2) -> Result<(), TerrainError> {
        let delta = self.tile_mut(id)?.set_origin(origin);
        self.insert_invalid(delta, PassFlags::all());
        Ok(())
    }
    // ------------------------------------------------------------------------
    pub fn set_tile_cell_size(&mut self, id: TileId, cell_size: f32) -> Result<(), TerrainError> {
        let delta = self.tile_mut(id)?.set_cell_size(cell_size)?;
        self.insert_invalid(delta, PassFlags::all());
        Ok(())
    }
    // ------------------------------------------------------------------------
    pub fn set_tile_height_texture(
        &mut self,
        id: TileId,
        texture: Option<TileTexture>,
    ) -> Result<(), TerrainError> {
        // the extent may change, which affects detail layers covering the
        // tile as well
        let delta = self.tile_mut(id)?.set_height_texture(texture);
        self.insert_invalid(delta, PassFlags::all());
        Ok(())
    }
    // ------------------------------------------------------------------------
    pub fn set_tile_normal_texture(
        &mut self,
        id: TileId,
        texture: Option<TileTexture>,
    ) -> Result<(), TerrainError> {
        let delta = self.tile_mut(id)?.set_normal_texture(texture);
        self.insert_invalid(delta, PassFlags::BASE);
        Ok(())
    }
    // ------------------------------------------------------------------------
    pub fn set_tile_hole_texture(
        &mut self,
        id: TileId,
        texture: Option<TileTexture>,
    ) -> Result<(), TerrainError> {
        let delta = self.tile_mut(id)?.set_hole_texture(texture);
        self.insert_invalid(delta, PassFlags::BASE);
        Ok(())
    }
    // ------------------------------------------------------------------------
    pub fn set_tile_hole_threshold(
        &mut self,
        id: TileId,
        threshold: f32,
    ) -> Result<(), TerrainError> {
        let delta = self.tile_mut(id)?.set_hole_threshold(threshold);
        self.insert_invalid(delta, PassFlags::BASE);
        Ok(())
    }
    // ------------------------------------------------------------------------
    // layers
    // ------------------------------------------------------------------------
    pub fn add_layer(&mut self, id: TileId, layer: TerrainLayer) -> Result<usize, TerrainError> {
        let index = self.tile(id)?.layers().len();
        self.insert_layer(id, index, layer)?;
        Ok(index)
    }
    // ------------------------------------------------------------------------
    pub fn insert_layer(
        &mut self,
        id: TileId,
        index: usize,
        layer: TerrainLayer,
    ) -> Result<(), TerrainError> {
        let tile = self.tile_mut(id)?;
        if index > tile.layers.len() {
            return Err(TerrainError::InvalidArgument("layer index out of bounds"));
        }
        tile.layers.insert(index, layer);
        self.invalidate_tile_layer(id, index)
    }
    // ------------------------------------------------------------------------
    pub fn remove_layer(
        &mut self,
        id: TileId,
        index: usize,
    ) -> Result<TerrainLayer, TerrainError> {
        self.invalidate_tile_layer(id, index)?;
        Ok(self.tile_mut(id)?.layers.remove(index))
    }
    // ------------------------------------------------------------------------
    pub fn replace_layer(
        &mut self,
        id: TileId,
        index: usize,
        layer: TerrainLayer,
    ) -> Result<TerrainLayer, TerrainError> {
        // both the outgoing and the incoming extent need a refresh
        self.invalidate_tile_layer(id, index)?;
        let old = std::mem::replace(&mut self.tile_mut(id)?.layers[index], layer);
        self.invalidate_tile_layer(id, index)?;
        Ok(old)
    }
    // ------------------------------------------------------------------------
    /// mutates a layer in place and records the invalidations for its
    /// extent before and after the edit
    pub fn update_layer(
        &mut self,
        id: TileId,
        index: usize,
        f: impl FnOnce(&mut TerrainLayer),
    ) -> Result<(), TerrainError> {
        self.invalidate_tile_layer(id, index)?;
        let tile = self.tile_mut(id)?;
        f(&mut tile.layers[index]);
        self.invalidate_tile_layer(id, index)
    }
    // ------------------------------------------------------------------------
    pub fn layer(&self, id: TileId, index: usize) -> Result<&TerrainLayer, TerrainError> {
        self.tile(id)?
            .layers()
            .get(index)
            .ok_or(TerrainError::InvalidArgument("no such layer"))
    }
    // ------------------------------------------------------------------------
    // invalidation
    // ------------------------------------------------------------------------
    /// topology changed: drop all recorded regions and refresh everything
    pub fn invalidate(&mut self) {
        let everything = self.aabb().unwrap_or(Aabb::EVERYTHING);

        self.invalid_base_regions.clear();
        self.invalid_detail_regions.clear();
        self.invalid_base_regions.push(everything);
        self.invalid_detail_regions.push(everything);
        self.invalid_base_clipped = true;
        self.invalid_detail_clipped = true;
    }
    // ------------------------------------------------------------------------
    pub fn invalidate_tile(&mut self, id: TileId) -> Result<(), TerrainError> {
        let aabb = self.tile(id)?.aabb();
        self.insert_invalid(aabb, PassFlags::all());
        Ok(())
    }
    // ------------------------------------------------------------------------
    /// refreshes the layer's extent (or the whole tile if the layer has no
    /// local aabb) in every pass the layer participates in
    pub fn invalidate_tile_layer(
        &mut self,
        id: TileId,
        layer_index: usize,
    ) -> Result<(), TerrainError> {
        let tile = self.tile(id)?;
        let layer = tile
            .layers()
            .get(layer_index)
            .ok_or(TerrainError::InvalidArgument("no such layer"))?;

        let aabb = layer.aabb().unwrap_or_else(|| tile.aabb());
        let passes = layer_passes(layer);
        self.insert_invalid(aabb, passes);
        Ok(())
    }
    // ------------------------------------------------------------------------
    /// like [Self::invalidate_tile_layer] but requires the layer to carry
    /// its own aabb
    pub fn invalidate_layer(&mut self, id: TileId, layer_index: usize) -> Result<(), TerrainError> {
        let layer = self.layer(id, layer_index)?;
        let aabb = layer.aabb().ok_or(TerrainError::MissingAabb)?;
        let passes = layer_passes(layer);
        self.insert_invalid(aabb, passes);
        Ok(())
    }
    // ------------------------------------------------------------------------
    /// marks a world region dirty in both clipmaps
    pub fn invalidate_region(&mut self, aabb: Aabb) {
        self.insert_invalid(aabb, PassFlags::all());
    }
    // ------------------------------------------------------------------------
    fn insert_invalid(&mut self, aabb: Aabb, passes: PassFlags) {
        if aabb.is_degenerate() {
            return;
        }
        if passes.contains(PassFlags::BASE) {
            insert_region(&mut self.invalid_base_regions, aabb);
            self.invalid_base_clipped = self.invalid_base_regions.len() == 1;
        }
        if passes.contains(PassFlags::DETAIL) {
            insert_region(&mut self.invalid_detail_regions, aabb);
            self.invalid_detail_clipped = self.invalid_detail_regions.len() == 1;
        }
    }
    // ------------------------------------------------------------------------
    // clear values
    // ------------------------------------------------------------------------
    pub fn clear_values(&self, pass: RenderPass) -> [Vec4; 4] {
        match pass {
            RenderPass::Base => self.base_clear_values,
            RenderPass::Detail => self.detail_clear_values,
        }
    }
    // ------------------------------------------------------------------------
    /// changing clear values repaints the whole pass
    pub fn set_clear_values(&mut self, pass: RenderPass, values: [Vec4; 4]) {
        let everything = self.aabb().unwrap_or(Aabb::EVERYTHING);
        match pass {
            RenderPass::Base => {
                self.base_clear_values = values;
                self.invalid_base_regions.clear();
                self.invalid_base_regions.push(everything);
                self.invalid_base_clipped = true;
            }
            RenderPass::Detail => {
                self.detail_clear_values = values;
                self.invalid_detail_regions.clear();
                self.invalid_detail_regions.push(everything);
                self.invalid_detail_clipped = true;
            }
        }
    }
    // ------------------------------------------------------------------------
    // compositor interface
    // ------------------------------------------------------------------------
    pub fn invalid_regions(&self, pass: RenderPass) -> &[Aabb] {
        match pass {
            RenderPass::Base => &self.invalid_base_regions,
            RenderPass::Detail => &self.invalid_detail_regions,
        }
    }
    // ------------------------------------------------------------------------
    pub fn invalid_regions_clipped(&self, pass: RenderPass) -> bool {
        match pass {
            RenderPass::Base => self.invalid_base_clipped,
            RenderPass::Detail => self.invalid_detail_clipped,
        }
    }
    // ------------------------------------------------------------------------
    /// drains the recorded regions for one pass. returns the list and
    /// whether it was already pairwise disjoint.
    pub(crate) fn take_invalid_regions(&mut self, pass: RenderPass) -> (Vec<Aabb>, bool) {
        match pass {
            RenderPass::Base => {
                let clipped = self.invalid_base_clipped;
                self.invalid_base_clipped = true;
                (std::mem::take(&mut self.invalid_base_regions), clipped)
            }
            RenderPass::Detail => {
                let clipped = self.invalid_detail_clipped;
                self.invalid_detail_clipped = true;
                (std::mem::take(&mut self.invalid_detail_regions), clipped)
            }
        }
    }
    // ------------------------------------------------------------------------
    fn tile_mut(&mut self, id: TileId) -> Result<&mut TerrainTile, TerrainError> {
        self.tiles
            .get_mut(id.0)
            .ok_or(TerrainError::InvalidArgument("no such tile"))
    }
    // ------------------------------------------------------------------------
}
// ----------------------------------------------------------------------------
fn layer_passes(layer: &TerrainLayer) -> PassFlags {
    let mut passes = PassFlags::empty();
    if layer.participates_in(RenderPass::Base) {
        passes |= PassFlags::BASE;
    }
    if layer.participates_in(RenderPass::Detail) {
        passes |= PassFlags::DETAIL;
    }
    passes
}
// ----------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{SurfaceFormat, TextureHandle};
    use crate::terrain_layers::MaterialLayer;
    use crate::terrain_material::Material;
    use glam::vec2;

    fn tile_with_extent(origin: glam::Vec2, texels: u32) -> TerrainTile {
        let mut tile = TerrainTile::new(origin, 1.0).unwrap();
        tile.set_height_texture(Some(TileTexture {
            handle: TextureHandle(1),
            width: texels,
            height: texels,
            format: SurfaceFormat::R32Float,
        }));
        tile
    }

    fn detail_material() -> Material {
        Material::new(PassFlags::DETAIL).unwrap()
    }

    #[test]
    fn contained_insert_leaves_list_unchanged() {
        let mut terrain = Terrain::new();
        terrain.add_tile(tile_with_extent(vec2(0.0, 0.0), 128));

        let before = terrain.invalid_regions(RenderPass::Base).to_vec();
        terrain.invalidate_region(Aabb::new(vec2(1.0, 1.0), vec2(2.0, 2.0)));
        assert_eq!(terrain.invalid_regions(RenderPass::Base), &before[..]);
    }

    #[test]
    fn clipped_flag_tracks_single_entry_lists() {
        let mut terrain = Terrain::new();
        assert!(terrain.invalid_regions_clipped(RenderPass::Base));

        terrain.invalidate_region(Aabb::new(vec2(0.0, 0.0), vec2(4.0, 4.0)));
        assert!(terrain.invalid_regions_clipped(RenderPass::Base));

        // second disjoint entry: the advisory flag drops
        terrain.invalidate_region(Aabb::new(vec2(10.0, 0.0), vec2(14.0, 4.0)));
        assert!(!terrain.invalid_regions_clipped(RenderPass::Base));
        assert_eq!(terrain.invalid_regions(RenderPass::Base).len(), 2);
    }

    #[test]
    fn full_invalidate_resets_to_single_region() {
        let mut terrain = Terrain::new();
        terrain.add_tile(tile_with_extent(vec2(0.0, 0.0), 64));
        terrain.invalidate_region(Aabb::new(vec2(-10.0, 0.0), vec2(-5.0, 4.0)));
        terrain.invalidate_region(Aabb::new(vec2(100.0, 0.0), vec2(105.0, 4.0)));

        terrain.invalidate();
        assert_eq!(terrain.invalid_regions(RenderPass::Base).len(), 1);
        assert_eq!(terrain.invalid_regions(RenderPass::Detail).len(), 1);
        assert!(terrain.invalid_regions_clipped(RenderPass::Base));
    }

    #[test]
    fn layer_invalidation_uses_participating_passes_only() {
        let mut terrain = Terrain::new();
        let id = terrain.add_tile(tile_with_extent(vec2(0.0, 0.0), 64));
        let (_, _) = terrain.take_invalid_regions(RenderPass::Base);
        let (_, _) = terrain.take_invalid_regions(RenderPass::Detail);

        // detail-only material layer with a local aabb
        let layer = MaterialLayer::new(detail_material())
            .with_aabb(Aabb::new(vec2(4.0, 4.0), vec2(8.0, 8.0)));
        terrain.add_layer(id, layer.into()).unwrap();

        assert!(terrain.invalid_regions(RenderPass::Base).is_empty());
        assert_eq!(terrain.invalid_regions(RenderPass::Detail).len(), 1);
    }

    #[test]
    fn invalidate_layer_requires_local_aabb() {
        let mut terrain = Terrain::new();
        let id = terrain.add_tile(tile_with_extent(vec2(0.0, 0.0), 64));
        let index = terrain
            .add_layer(id, MaterialLayer::new(detail_material()).into())
            .unwrap();

        match terrain.invalidate_layer(id, index) {
            Err(TerrainError::MissingAabb) => {}
            other => panic!("expected MissingAabb, got {:?}", other.err()),
        }
        // the tile scoped form falls back to the tile aabb
        terrain.invalidate_tile_layer(id, index).unwrap();
    }

    #[test]
    fn draining_empties_the_lists() {
        let mut terrain = Terrain::new();
        terrain.invalidate_region(Aabb::new(vec2(0.0, 0.0), vec2(4.0, 4.0)));

        let (regions, clipped) = terrain.take_invalid_regions(RenderPass::Base);
        assert_eq!(regions.len(), 1);
        assert!(clipped);
        assert!(terrain.invalid_regions(RenderPass::Base).is_empty());
    }
}
// ----------------------------------------------------------------------------
