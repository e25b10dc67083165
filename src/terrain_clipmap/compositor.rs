// ----------------------------------------------------------------------------
use glam::{vec3, Vec2};

use tracing::debug;

use crate::aabb::{clip_regions, Aabb};
use crate::backend::{RasterBackend, RenderPass};
use crate::error::TerrainError;
use crate::terrain::Terrain;
use crate::terrain_layers::{ClearLayer, ClipmapLayer, TileGeometryLayer};
use crate::terrain_material::{param, Material};
use crate::terrain_tiles::TerrainTile;

use super::Clipmap;
// ----------------------------------------------------------------------------
/// Per-frame compositor for one render pass. Recomputes the per-level
/// origins from the camera, folds the terrain's invalidations into minimal
/// per-level rectangle sets and renders the affected layers scissored into
/// the clipmap atlas.
///
/// Single threaded and not re-entrant: this is the only caller of the
/// raster backend. Invalidations posted during a frame become visible in
/// the next frame's pass.
pub struct ClipmapCompositor {
    pass: RenderPass,
}
// ----------------------------------------------------------------------------
impl ClipmapCompositor {
    // ------------------------------------------------------------------------
    pub fn new(pass: RenderPass) -> Self {
        Self { pass }
    }
    // ------------------------------------------------------------------------
    pub fn pass(&self) -> RenderPass {
        self.pass
    }
    // ------------------------------------------------------------------------
    /// Runs one compositor pass. On any backend failure the frame is
    /// aborted cleanly: the previous atlas contents remain valid and the
    /// next frame does a full refresh.
    pub fn update(
        &mut self,
        terrain: &mut Terrain,
        clipmap: &mut Clipmap,
        camera_xz: Vec2,
        backend: &mut dyn RasterBackend,
    ) -> Result<(), TerrainError> {
        match self.run(terrain, clipmap, camera_xz, backend) {
            Ok(()) => {
                clipmap.use_incremental_update = true;
                Ok(())
            }
            Err(err) => {
                clipmap.use_incremental_update = false;
                Err(err)
            }
        }
    }
    // ------------------------------------------------------------------------
    fn run(
        &mut self,
        terrain: &mut Terrain,
        clipmap: &mut Clipmap,
        camera_xz: Vec2,
        backend: &mut dyn RasterBackend,
    ) -> Result<(), TerrainError> {
        clipmap.resolve_cell_sizes()?;
        clipmap.update_origins(camera_xz);
        clipmap.ensure_textures(backend)?;

        let full_refresh = !clipmap.use_incremental_update;
        if full_refresh {
            debug!("{}: full clipmap refresh", self.pass.name());
        }

        // this frame's dirt, made pairwise disjoint unless the advisory
        // flag says it already is
        let (mut frame_regions, clipped) = terrain.take_invalid_regions(self.pass);
        if !clipped {
            clip_regions(&mut frame_regions);
        }

        let clear = ClearLayer::new(terrain.clear_values(self.pass), clipmap.num_textures());

        for level in 0..clipmap.num_levels() {
            let below_min_level = (level as f32) < clipmap.min_level();
            let level_refresh = full_refresh || clipmap.stale_levels[level];

            clipmap.rebuild_invalid_regions(level, &frame_regions, level_refresh);

            if below_min_level {
                // not drawn: the atlas entries go stale and get a full
                // refresh once the level re-enters the drawn range
                if !clipmap.invalid_regions(level).is_empty() {
                    clipmap.stale_levels[level] = true;
                }
                continue;
            }
            if clipmap.invalid_regions(level).is_empty() {
                continue;
            }

            self.render_level(terrain, clipmap, level, &clear, backend)?;
            clipmap.stale_levels[level] = false;
        }
        Ok(())
    }
    // ------------------------------------------------------------------------
    /// renders one level: clear layer first, then per tile the synthesized
    /// geometry layer and the user layers in insertion order
    fn render_level(
        &self,
        terrain: &Terrain,
        clipmap: &Clipmap,
        level: usize,
        clear: &ClearLayer,
        backend: &mut dyn RasterBackend,
    ) -> Result<(), TerrainError> {
        backend.set_render_targets(clipmap.textures(), clipmap.atlas_region(level))?;

        self.draw_layer(clipmap, level, clear, Aabb::EVERYTHING, None, 1.0, backend)?;

        for (tile_id, tile) in terrain.tiles() {
            let tile_aabb = tile.aabb();

            if self.pass == RenderPass::Base {
                if let Some(material) = tile.material() {
                    if material.contains(RenderPass::Base) {
                        publish_tile_textures(tile, material)?;
                        let geometry = TileGeometryLayer::new(tile_id);
                        self.draw_layer(
                            clipmap,
                            level,
                            &geometry,
                            tile_aabb,
                            Some(material),
                            1.0,
                            backend,
                        )?;
                    }
                }
            }

            for layer in tile.layers() {
                if !layer.participates_in(self.pass) {
                    continue;
                }
                let fade = layer.fade();
                if fade.skipped(level as i32) {
                    continue;
                }
                let layer_aabb = layer.aabb().unwrap_or(tile_aabb);
                self.draw_layer(
                    clipmap,
                    level,
                    layer,
                    layer_aabb,
                    layer.material(),
                    fade.opacity(level as i32),
                    backend,
                )?;
            }
        }
        Ok(())
    }
    // ------------------------------------------------------------------------
    /// Scissored draws of one layer into one level: the layer extent is
    /// intersected with every invalid rectangle, each piece is wrapped into
    /// the atlas (splitting at the toroidal seam) and drawn. The material
    /// is bound once, with the fade opacity published as a constant; the
    /// opacity never skips the draw, only the fade band does.
    #[allow(clippy::too_many_arguments)]
    fn draw_layer(
        &self,
        clipmap: &Clipmap,
        level: usize,
        layer: &dyn ClipmapLayer,
        layer_aabb: Aabb,
        material: Option<&Material>,
        opacity: f32,
        backend: &mut dyn RasterBackend,
    ) -> Result<(), TerrainError> {
        let mut bound = material.is_none();

        for region in clipmap.invalid_regions(level) {
            let dirty = match layer_aabb.intersection(region) {
                Some(dirty) => dirty,
                None => continue,
            };
            if !bound {
                if let Some(material) = material {
                    material.set_parameter(self.pass, param::FADE_OPACITY, opacity)?;
                    backend.bind_material(material, self.pass)?;
                }
                bound = true;
            }
            for scissor in clipmap.scissor_rects(level, &dirty).as_slice() {
                backend.set_scissor(scissor.rect)?;
                layer.on_draw(backend, scissor.rect, scissor.world_tl, scissor.world_br)?;
            }
        }
        Ok(())
    }
    // ------------------------------------------------------------------------
}
// ----------------------------------------------------------------------------
/// publishes the tile's textures and placement for the geometry shader
fn publish_tile_textures(tile: &TerrainTile, material: &Material) -> Result<(), TerrainError> {
    let pass = RenderPass::Base;

    if let Some(texture) = tile.height_texture() {
        material.set_parameter(pass, param::HEIGHT_TEXTURE, texture.handle)?;
    }
    if let Some(texture) = tile.normal_texture() {
        material.set_parameter(pass, param::NORMAL_TEXTURE, texture.handle)?;
    }
    if let Some(texture) = tile.hole_texture() {
        material.set_parameter(pass, param::HOLE_TEXTURE, texture.handle)?;
        material.set_parameter(pass, param::HOLE_THRESHOLD, tile.hole_threshold())?;
    }
    material.set_parameter(
        pass,
        param::TILE_ORIGIN,
        vec3(tile.origin().x, tile.origin().y, tile.cell_size()),
    )
}
// ----------------------------------------------------------------------------
