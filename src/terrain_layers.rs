// ----------------------------------------------------------------------------
use enum_dispatch::enum_dispatch;
use glam::{vec3, Quat, Vec2, Vec3, Vec4};

use crate::aabb::Aabb;
use crate::backend::{
    BackendError, RasterBackend, Rectangle, RenderPass, SubmeshHandle, TextureHandle,
};
use crate::error::TerrainError;
use crate::terrain_material::{param, Material};
use crate::terrain_tiles::TileId;
// ----------------------------------------------------------------------------
/// Distance based fade expressed in clipmap levels, not world distance.
/// Opacity is 0 below `fade_in_start` and above `fade_out_end`, 1 between
/// `fade_in_end` and `fade_out_start` and ramps linearly in between. The
/// default covers all levels at constant opacity 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadeRange {
    pub fade_in_start: i32,
    pub fade_in_end: i32,
    pub fade_out_start: i32,
    pub fade_out_end: i32,
}
// ----------------------------------------------------------------------------
impl Default for FadeRange {
    fn default() -> Self {
        Self {
            fade_in_start: 0,
            fade_in_end: 0,
            fade_out_start: i32::MAX,
            fade_out_end: i32::MAX,
        }
    }
}
// ----------------------------------------------------------------------------
impl FadeRange {
    // ------------------------------------------------------------------------
    pub fn new(
        fade_in_start: i32,
        fade_in_end: i32,
        fade_out_start: i32,
        fade_out_end: i32,
    ) -> Result<Self, TerrainError> {
        if fade_in_start > fade_in_end
            || fade_in_end > fade_out_start
            || fade_out_start > fade_out_end
        {
            return Err(TerrainError::InvalidArgument(
                "fade levels must be ordered: in_start <= in_end <= out_start <= out_end",
            ));
        }
        Ok(Self {
            fade_in_start,
            fade_in_end,
            fade_out_start,
            fade_out_end,
        })
    }
    // ------------------------------------------------------------------------
    /// true if the layer issues no draws at all for this level
    #[inline(always)]
    pub fn skipped(&self, level: i32) -> bool {
        level < self.fade_in_start || level > self.fade_out_end
    }
    // ------------------------------------------------------------------------
    /// opacity at a clipmap level. levels inside the band but with opacity 0
    /// (the ramp endpoints) are still drawn, only `skipped` levels are not.
    pub fn opacity(&self, level: i32) -> f32 {
        if self.skipped(level) {
            return 0.0;
        }
        if level < self.fade_in_end {
            // fade_in_end > fade_in_start here, the level < fade_in_start
            // case was handled above
            (level - self.fade_in_start) as f32 / (self.fade_in_end - self.fade_in_start) as f32
        } else if level > self.fade_out_start {
            (self.fade_out_end - level) as f32
                / (self.fade_out_end - self.fade_out_start) as f32
        } else {
            1.0
        }
    }
    // ------------------------------------------------------------------------
}
// ----------------------------------------------------------------------------
/// Capability set the compositor requires from every layer variant. The
/// default draw covers the scissor rectangle with a screen aligned quad
/// whose corners carry (pixel position, world xz).
#[enum_dispatch]
pub trait ClipmapLayer {
    // ------------------------------------------------------------------------
    /// local aabb. None means "covers the containing tile".
    fn aabb(&self) -> Option<Aabb>;
    // ------------------------------------------------------------------------
    fn fade(&self) -> FadeRange;
    // ------------------------------------------------------------------------
    fn material(&self) -> Option<&Material>;
    // ------------------------------------------------------------------------
    fn participates_in(&self, pass: RenderPass) -> bool;
    // ------------------------------------------------------------------------
    fn on_draw(
        &self,
        backend: &mut dyn RasterBackend,
        scissor: Rectangle,
        world_tl: Vec2,
        world_br: Vec2,
    ) -> Result<(), BackendError>;
    // ------------------------------------------------------------------------
}
// ----------------------------------------------------------------------------
/// Closed sum of all layer variants. `Clear` and `TileGeometry` are
/// synthesized by the compositor, the host only constructs the first three.
#[enum_dispatch(ClipmapLayer)]
#[derive(Debug, Clone)]
pub enum TerrainLayer {
    Material(MaterialLayer),
    Decal(DecalLayer),
    Road(RoadLayer),
    Clear(ClearLayer),
    TileGeometry(TileGeometryLayer),
}
// ----------------------------------------------------------------------------
// material layer
// ----------------------------------------------------------------------------
/// Tiling material contribution. All appearance parameters are pass-throughs
/// to the shared material, so layers sharing one material observe each
/// other's edits.
#[derive(Debug, Clone)]
pub struct MaterialLayer {
    material: Material,
    aabb: Option<Aabb>,
    fade: FadeRange,
}
// ----------------------------------------------------------------------------
impl MaterialLayer {
    // ------------------------------------------------------------------------
    pub fn new(material: Material) -> Self {
        Self {
            material,
            aabb: None,
            fade: FadeRange::default(),
        }
    }
    // ------------------------------------------------------------------------
    pub fn with_aabb(mut self, aabb: Aabb) -> Self {
        self.aabb = Some(aabb);
        self
    }
    // ------------------------------------------------------------------------
    pub fn with_fade(mut self, fade: FadeRange) -> Self {
        self.fade = fade;
        self
    }
    // ------------------------------------------------------------------------
    pub fn set_aabb(&mut self, aabb: Option<Aabb>) {
        self.aabb = aabb;
    }
    // ------------------------------------------------------------------------
    pub fn set_fade(&mut self, fade: FadeRange) {
        self.fade = fade;
    }
    // ------------------------------------------------------------------------
    // appearance parameters (shared material pass-throughs)
    // ------------------------------------------------------------------------
    pub fn set_tile_size(&self, size: f32) -> Result<(), TerrainError> {
        if size <= 0.0 {
            return Err(TerrainError::InvalidArgument("tile size must be > 0"));
        }
        self.material.set_shared_parameter(param::TILE_SIZE, size)
    }
    // ------------------------------------------------------------------------
    pub fn tile_size(&self) -> Option<f32> {
        self.shared_parameter(param::TILE_SIZE)
    }
    // ------------------------------------------------------------------------
    /// the tiling detail textures sampled with `tile_size` repetition.
    /// the normal texture name is shared with the tile geometry pass.
    pub fn set_tiling_textures(
        &self,
        diffuse: TextureHandle,
        normal: TextureHandle,
        specular: TextureHandle,
    ) -> Result<(), TerrainError> {
        self.material
            .set_shared_parameter(param::DIFFUSE_TEXTURE, diffuse)?;
        self.material
            .set_shared_parameter(param::NORMAL_TEXTURE, normal)?;
        self.material
            .set_shared_parameter(param::SPECULAR_TEXTURE, specular)
    }
    // ------------------------------------------------------------------------
    pub fn set_diffuse_color(&self, color: Vec3) -> Result<(), TerrainError> {
        self.material
            .set_shared_parameter(param::DIFFUSE_COLOR, color)
    }
    // ------------------------------------------------------------------------
    pub fn diffuse_color(&self) -> Option<Vec3> {
        self.shared_parameter(param::DIFFUSE_COLOR)
    }
    // ------------------------------------------------------------------------
    pub fn set_specular_color(&self, color: Vec3) -> Result<(), TerrainError> {
        self.material
            .set_shared_parameter(param::SPECULAR_COLOR, color)
    }
    // ------------------------------------------------------------------------
    pub fn set_specular_power(&self, power: f32) -> Result<(), TerrainError> {
        self.material
            .set_shared_parameter(param::SPECULAR_POWER, power)
    }
    // ------------------------------------------------------------------------
    pub fn set_alpha(&self, alpha: f32) -> Result<(), TerrainError> {
        self.material.set_shared_parameter(param::ALPHA, alpha)
    }
    // ------------------------------------------------------------------------
    /// blend weight mask and the channel to sample from it
    pub fn set_blend_mask(
        &self,
        texture: TextureHandle,
        channel: i32,
    ) -> Result<(), TerrainError> {
        if !(0..=3).contains(&channel) {
            return Err(TerrainError::out_of_range("blend channel", channel, 0, 3));
        }
        self.material
            .set_shared_parameter(param::BLEND_TEXTURE, texture)?;
        self.material
            .set_shared_parameter(param::BLEND_CHANNEL, channel)
    }
    // ------------------------------------------------------------------------
    pub fn set_blend_threshold(&self, threshold: f32) -> Result<(), TerrainError> {
        self.material
            .set_shared_parameter(param::BLEND_THRESHOLD, threshold)
    }
    // ------------------------------------------------------------------------
    pub fn set_blend_range(&self, range: f32) -> Result<(), TerrainError> {
        self.material.set_shared_parameter(param::BLEND_RANGE, range)
    }
    // ------------------------------------------------------------------------
    /// how much the sampled height shifts the blend threshold
    pub fn set_blend_height_influence(&self, influence: f32) -> Result<(), TerrainError> {
        self.material
            .set_shared_parameter(param::BLEND_HEIGHT_INFLUENCE, influence)
    }
    // ------------------------------------------------------------------------
    pub fn set_blend_noise(
        &self,
        texture: TextureHandle,
        influence: f32,
    ) -> Result<(), TerrainError> {
        self.material
            .set_shared_parameter(param::NOISE_TEXTURE, texture)?;
        self.material
            .set_shared_parameter(param::BLEND_NOISE_INFLUENCE, influence)
    }
    // ------------------------------------------------------------------------
    /// world height band outside of which the material is masked away
    pub fn set_height_limits(&self, min: f32, max: f32) -> Result<(), TerrainError> {
        if min > max {
            return Err(TerrainError::InvalidArgument("height min must be <= max"));
        }
        self.material.set_shared_parameter(param::HEIGHT_MIN, min)?;
        self.material.set_shared_parameter(param::HEIGHT_MAX, max)
    }
    // ------------------------------------------------------------------------
    /// slope band in radians outside of which the material is masked away
    pub fn set_slope_limits(&self, min: f32, max: f32) -> Result<(), TerrainError> {
        if min > max {
            return Err(TerrainError::InvalidArgument("slope min must be <= max"));
        }
        self.material.set_shared_parameter(param::SLOPE_MIN, min)?;
        self.material.set_shared_parameter(param::SLOPE_MAX, max)
    }
    // ------------------------------------------------------------------------
    fn shared_parameter<T: crate::terrain_material::ParamValue>(&self, name: &str) -> Option<T> {
        [RenderPass::Detail, RenderPass::Base]
            .into_iter()
            .filter(|pass| self.material.contains(*pass))
            .find_map(|pass| self.material.parameter(pass, name))
    }
    // ------------------------------------------------------------------------
}
// ----------------------------------------------------------------------------
impl ClipmapLayer for MaterialLayer {
    // ------------------------------------------------------------------------
    fn aabb(&self) -> Option<Aabb> {
        self.aabb
    }
    // ------------------------------------------------------------------------
    fn fade(&self) -> FadeRange {
        self.fade
    }
    // ------------------------------------------------------------------------
    fn material(&self) -> Option<&Material> {
        Some(&self.material)
    }
    // ------------------------------------------------------------------------
    fn participates_in(&self, pass: RenderPass) -> bool {
        self.material.contains(pass)
    }
    // ------------------------------------------------------------------------
    fn on_draw(
        &self,
        backend: &mut dyn RasterBackend,
        scissor: Rectangle,
        world_tl: Vec2,
        world_br: Vec2,
    ) -> Result<(), BackendError> {
        backend.draw_quad(scissor, world_tl, world_br)
    }
    // ------------------------------------------------------------------------
}
// ----------------------------------------------------------------------------
// decal layer
// ----------------------------------------------------------------------------
/// Oriented decal. Contributes to the detail clipmap only. The pose is
/// published as material parameters, the pixel shader projects the decal
/// inside the scissored footprint.
#[derive(Debug, Clone)]
pub struct DecalLayer {
    material: Material,
    position: Vec3,
    orientation: Quat,
    width: f32,
    height: f32,
    fade: FadeRange,
}
// ----------------------------------------------------------------------------
impl DecalLayer {
    // ------------------------------------------------------------------------
    pub fn new(material: Material, width: f32, height: f32) -> Result<Self, TerrainError> {
        if width <= 0.0 || height <= 0.0 {
            return Err(TerrainError::InvalidArgument(
                "decal width and height must be > 0",
            ));
        }
        if !material.contains(RenderPass::Detail) {
            return Err(TerrainError::InvalidArgument(
                "decal material must contain the detail pass",
            ));
        }
        let layer = Self {
            material,
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            width,
            height,
            fade: FadeRange::default(),
        };
        layer.publish_pose()?;
        Ok(layer)
    }
    // ------------------------------------------------------------------------
    pub fn with_fade(mut self, fade: FadeRange) -> Self {
        self.fade = fade;
        self
    }
    // ------------------------------------------------------------------------
    pub fn set_pose(&mut self, position: Vec3, orientation: Quat) -> Result<(), TerrainError> {
        self.position = position;
        self.orientation = orientation;
        self.publish_pose()
    }
    // ------------------------------------------------------------------------
    pub fn set_size(&mut self, width: f32, height: f32) -> Result<(), TerrainError> {
        if width <= 0.0 || height <= 0.0 {
            return Err(TerrainError::InvalidArgument(
                "decal width and height must be > 0",
            ));
        }
        self.width = width;
        self.height = height;
        self.publish_pose()
    }
    // ------------------------------------------------------------------------
    pub fn pose(&self) -> (Vec3, Quat) {
        (self.position, self.orientation)
    }
    // ------------------------------------------------------------------------
    fn publish_pose(&self) -> Result<(), TerrainError> {
        let pass = RenderPass::Detail;
        self.material
            .set_parameter(pass, param::DECAL_POSITION, self.position)?;
        let q = self.orientation;
        self.material
            .set_parameter(pass, param::DECAL_ORIENTATION, Vec4::new(q.x, q.y, q.z, q.w))?;
        self.material
            .set_parameter(pass, param::DECAL_WIDTH, self.width)?;
        self.material
            .set_parameter(pass, param::DECAL_HEIGHT, self.height)
    }
    // ------------------------------------------------------------------------
    /// xz bound of the pose transformed footprint corners
    fn footprint(&self) -> Aabb {
        let half_w = self.width * 0.5;
        let half_h = self.height * 0.5;

        let mut min = Vec2::INFINITY;
        let mut max = Vec2::NEG_INFINITY;
        for corner in [
            vec3(-half_w, 0.0, -half_h),
            vec3(half_w, 0.0, -half_h),
            vec3(half_w, 0.0, half_h),
            vec3(-half_w, 0.0, half_h),
        ] {
            let world = self.position + self.orientation * corner;
            let xz = Vec2::new(world.x, world.z);
            min = min.min(xz);
            max = max.max(xz);
        }
        Aabb::new(min, max)
    }
    // ------------------------------------------------------------------------
}
// ----------------------------------------------------------------------------
impl ClipmapLayer for DecalLayer {
    // ------------------------------------------------------------------------
    fn aabb(&self) -> Option<Aabb> {
        Some(self.footprint())
    }
    // ------------------------------------------------------------------------
    fn fade(&self) -> FadeRange {
        self.fade
    }
    // ------------------------------------------------------------------------
    fn material(&self) -> Option<&Material> {
        Some(&self.material)
    }
    // ------------------------------------------------------------------------
    fn participates_in(&self, pass: RenderPass) -> bool {
        pass == RenderPass::Detail && self.material.contains(pass)
    }
    // ------------------------------------------------------------------------
    fn on_draw(
        &self,
        backend: &mut dyn RasterBackend,
        scissor: Rectangle,
        world_tl: Vec2,
        world_br: Vec2,
    ) -> Result<(), BackendError> {
        backend.draw_quad(scissor, world_tl, world_br)
    }
    // ------------------------------------------------------------------------
}
// ----------------------------------------------------------------------------
// road layer
// ----------------------------------------------------------------------------
/// Road strip rendered from a host precomputed submesh in world space xz.
#[derive(Debug, Clone)]
pub struct RoadLayer {
    material: Material,
    submesh: SubmeshHandle,
    aabb: Aabb,
    fade: FadeRange,
}
// ----------------------------------------------------------------------------
impl RoadLayer {
    // ------------------------------------------------------------------------
    pub fn new(
        material: Material,
        submesh: SubmeshHandle,
        aabb: Aabb,
        road_length: f32,
    ) -> Result<Self, TerrainError> {
        if road_length <= 0.0 {
            return Err(TerrainError::InvalidArgument("road length must be > 0"));
        }
        if !aabb.is_finite() {
            return Err(TerrainError::InvalidArgument("road aabb must be finite"));
        }
        material.set_shared_parameter(param::ROAD_LENGTH, road_length)?;
        Ok(Self {
            material,
            submesh,
            aabb,
            fade: FadeRange::default(),
        })
    }
    // ------------------------------------------------------------------------
    pub fn with_fade(mut self, fade: FadeRange) -> Self {
        self.fade = fade;
        self
    }
    // ------------------------------------------------------------------------
    /// blend-out ranges for the 4 road borders (left, right, start, end)
    pub fn set_border_blend(&self, ranges: Vec4) -> Result<(), TerrainError> {
        self.material
            .set_shared_parameter(param::ROAD_BORDER_BLEND, ranges)
    }
    // ------------------------------------------------------------------------
    pub fn submesh(&self) -> SubmeshHandle {
        self.submesh
    }
    // ------------------------------------------------------------------------
}
// ----------------------------------------------------------------------------
impl ClipmapLayer for RoadLayer {
    // ------------------------------------------------------------------------
    fn aabb(&self) -> Option<Aabb> {
        Some(self.aabb)
    }
    // ------------------------------------------------------------------------
    fn fade(&self) -> FadeRange {
        self.fade
    }
    // ------------------------------------------------------------------------
    fn material(&self) -> Option<&Material> {
        Some(&self.material)
    }
    // ------------------------------------------------------------------------
    fn participates_in(&self, pass: RenderPass) -> bool {
        self.material.contains(pass)
    }
    // ------------------------------------------------------------------------
    fn on_draw(
        &self,
        backend: &mut dyn RasterBackend,
        _scissor: Rectangle,
        _world_tl: Vec2,
        _world_br: Vec2,
    ) -> Result<(), BackendError> {
        backend.draw_submesh(self.submesh)
    }
    // ------------------------------------------------------------------------
}
// ----------------------------------------------------------------------------
// internal layers
// ----------------------------------------------------------------------------
/// First layer rendered each frame: writes the per-pass clear values into
/// every invalid rectangle of the level.
#[derive(Debug, Clone)]
pub struct ClearLayer {
    values: [Vec4; 4],
    slots: usize,
}
// ----------------------------------------------------------------------------
impl ClearLayer {
    // ------------------------------------------------------------------------
    pub(crate) fn new(values: [Vec4; 4], slots: usize) -> Self {
        debug_assert!((1..=4).contains(&slots));
        Self { values, slots }
    }
    // ------------------------------------------------------------------------
}
// ----------------------------------------------------------------------------
impl ClipmapLayer for ClearLayer {
    // ------------------------------------------------------------------------
    fn aabb(&self) -> Option<Aabb> {
        None
    }
    // ------------------------------------------------------------------------
    fn fade(&self) -> FadeRange {
        FadeRange::default()
    }
    // ------------------------------------------------------------------------
    fn material(&self) -> Option<&Material> {
        None
    }
    // ------------------------------------------------------------------------
    fn participates_in(&self, _pass: RenderPass) -> bool {
        true
    }
    // ------------------------------------------------------------------------
    fn on_draw(
        &self,
        backend: &mut dyn RasterBackend,
        _scissor: Rectangle,
        _world_tl: Vec2,
        _world_br: Vec2,
    ) -> Result<(), BackendError> {
        backend.clear(&self.values[..self.slots])
    }
    // ------------------------------------------------------------------------
}
// ----------------------------------------------------------------------------
/// Synthesized from a tile each frame: writes the tile's heights, normals
/// and holes into the base clipmap. The compositor binds the owning tile's
/// material and publishes the tile textures before drawing.
#[derive(Debug, Clone)]
pub struct TileGeometryLayer {
    tile: TileId,
}
// ----------------------------------------------------------------------------
impl TileGeometryLayer {
    // ------------------------------------------------------------------------
    pub(crate) fn new(tile: TileId) -> Self {
        Self { tile }
    }
    // ------------------------------------------------------------------------
    pub fn tile(&self) -> TileId {
        self.tile
    }
    // ------------------------------------------------------------------------
}
// ----------------------------------------------------------------------------
impl ClipmapLayer for TileGeometryLayer {
    // ------------------------------------------------------------------------
    fn aabb(&self) -> Option<Aabb> {
        None
    }
    // ------------------------------------------------------------------------
    fn fade(&self) -> FadeRange {
        FadeRange::default()
    }
    // ------------------------------------------------------------------------
    fn material(&self) -> Option<&Material> {
        None
    }
    // ------------------------------------------------------------------------
    fn participates_in(&self, pass: RenderPass) -> bool {
        pass == RenderPass::Base
    }
    // ------------------------------------------------------------------------
    fn on_draw(
        &self,
        backend: &mut dyn RasterBackend,
        scissor: Rectangle,
        world_tl: Vec2,
        world_br: Vec2,
    ) -> Result<(), BackendError> {
        backend.draw_quad(scissor, world_tl, world_br)
    }
    // ------------------------------------------------------------------------
}
// ----------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::PassFlags;

    #[test]
    fn fade_defaults_are_constant_one() {
        let fade = FadeRange::default();
        assert!(!fade.skipped(0));
        assert!(!fade.skipped(8));
        assert_eq!(fade.opacity(0), 1.0);
        assert_eq!(fade.opacity(8), 1.0);
    }

    #[test]
    fn fade_band_skip_predicate() {
        let fade = FadeRange::new(2, 3, 5, 6).unwrap();
        assert!(fade.skipped(1));
        assert!(!fade.skipped(2));
        assert!(!fade.skipped(6));
        assert!(fade.skipped(7));
    }

    #[test]
    fn fade_opacity_ramps_linearly() {
        let fade = FadeRange::new(2, 4, 5, 7).unwrap();
        assert_eq!(fade.opacity(1), 0.0);
        assert_eq!(fade.opacity(2), 0.0);
        assert_eq!(fade.opacity(3), 0.5);
        assert_eq!(fade.opacity(4), 1.0);
        assert_eq!(fade.opacity(5), 1.0);
        assert_eq!(fade.opacity(6), 0.5);
        assert_eq!(fade.opacity(7), 0.0);
        assert_eq!(fade.opacity(8), 0.0);
    }

    #[test]
    fn fade_rejects_unordered_levels() {
        assert!(FadeRange::new(3, 2, 5, 6).is_err());
        assert!(FadeRange::new(0, 4, 2, 6).is_err());
    }

    #[test]
    fn decal_footprint_follows_rotation() {
        let material = Material::new(PassFlags::DETAIL).unwrap();
        let mut decal = DecalLayer::new(material, 4.0, 2.0).unwrap();

        let aabb = decal.aabb().unwrap();
        assert_eq!(aabb.min, Vec2::new(-2.0, -1.0));
        assert_eq!(aabb.max, Vec2::new(2.0, 1.0));

        // quarter turn around y swaps the footprint extents
        decal
            .set_pose(
                Vec3::new(10.0, 0.0, 0.0),
                Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
            )
            .unwrap();
        let aabb = decal.aabb().unwrap();
        assert!((aabb.min.x - 9.0).abs() < 1e-4);
        assert!((aabb.max.x - 11.0).abs() < 1e-4);
        assert!((aabb.min.y + 2.0).abs() < 1e-4);
        assert!((aabb.max.y - 2.0).abs() < 1e-4);
    }

    #[test]
    fn decal_is_detail_only() {
        let material = Material::new(PassFlags::BASE | PassFlags::DETAIL).unwrap();
        let decal = DecalLayer::new(material, 1.0, 1.0).unwrap();
        assert!(decal.participates_in(RenderPass::Detail));
        assert!(!decal.participates_in(RenderPass::Base));
    }

    #[test]
    fn blend_channel_is_range_checked() {
        let material = Material::new(PassFlags::DETAIL).unwrap();
        let layer = MaterialLayer::new(material);
        assert!(layer.set_blend_mask(TextureHandle(1), 4).is_err());
        assert!(layer.set_blend_mask(TextureHandle(1), 3).is_ok());
    }
}
// ----------------------------------------------------------------------------
