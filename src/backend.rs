// ----------------------------------------------------------------------------
use bitflags::bitflags;
use glam::{uvec2, UVec2, Vec2, Vec4};
use thiserror::Error;

use crate::terrain_material::Material;
// ----------------------------------------------------------------------------
/// The two clipmaps a layer can render into. `Base` carries the geometry
/// data (heights, normals, holes), `Detail` carries the material data
/// (albedo, specular, detail normals) packed by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderPass {
    Base,
    Detail,
}
// ----------------------------------------------------------------------------
bitflags! {
    /// render pass participation mask
    pub struct PassFlags: u8 {
        const BASE = 0b01;
        const DETAIL = 0b10;
    }
}
// ----------------------------------------------------------------------------
impl RenderPass {
    // ------------------------------------------------------------------------
    /// stable pass name as referenced by host material definitions
    pub fn name(&self) -> &'static str {
        match self {
            RenderPass::Base => "Base",
            RenderPass::Detail => "Detail",
        }
    }
    // ------------------------------------------------------------------------
    pub fn flag(&self) -> PassFlags {
        match self {
            RenderPass::Base => PassFlags::BASE,
            RenderPass::Detail => PassFlags::DETAIL,
        }
    }
    // ------------------------------------------------------------------------
}
// ----------------------------------------------------------------------------
/// opaque id of a host GPU texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);
// ----------------------------------------------------------------------------
/// opaque id of a host vertex+index buffer pair in world space xz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubmeshHandle(pub u64);
// ----------------------------------------------------------------------------
/// surface formats the engine knows how to describe to the backend. all MRT
/// slots of one clipmap share a single format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceFormat {
    R8,
    Rgba8,
    R16Float,
    R32Float,
    Rgba16Float,
}
// ----------------------------------------------------------------------------
impl SurfaceFormat {
    // ------------------------------------------------------------------------
    pub fn bytes_per_texel(&self) -> u32 {
        match self {
            SurfaceFormat::R8 => 1,
            SurfaceFormat::R16Float => 2,
            SurfaceFormat::Rgba8 | SurfaceFormat::R32Float => 4,
            SurfaceFormat::Rgba16Float => 8,
        }
    }
    // ------------------------------------------------------------------------
}
// ----------------------------------------------------------------------------
/// pixel rectangle in atlas coordinates
#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
pub struct Rectangle {
    pub pos: UVec2,
    pub size: UVec2,
}
// ----------------------------------------------------------------------------
impl Rectangle {
    // ------------------------------------------------------------------------
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            pos: uvec2(x, y),
            size: uvec2(width, height),
        }
    }
    // ------------------------------------------------------------------------
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.size.x == 0 || self.size.y == 0
    }
    // ------------------------------------------------------------------------
    #[inline(always)]
    pub fn texel_count(&self) -> u64 {
        self.size.x as u64 * self.size.y as u64
    }
    // ------------------------------------------------------------------------
    /// exclusive max corner
    #[inline(always)]
    pub fn max(&self) -> UVec2 {
        self.pos + self.size
    }
    // ------------------------------------------------------------------------
}
// ----------------------------------------------------------------------------
/// failure reported by the host rasterizer. the compositor aborts the
/// running frame on any of these and escalates to a full refresh.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct BackendError(pub String);
// ----------------------------------------------------------------------------
/// Host-supplied rasterizer abstraction. The compositor is the only caller
/// and issues all calls from a single thread.
///
/// Contract details the compositor relies on:
///  * `clear` honors the current scissor rectangle
///  * `draw_quad` emits 4 vertices carrying (pixel position, world xz) so
///    the vertex shader can map the scissor rectangle into the atlas slot
///  * render target and scissor state persist until set again
pub trait RasterBackend {
    // ------------------------------------------------------------------------
    fn create_texture_2d(
        &mut self,
        width: u32,
        height: u32,
        mip_levels: u32,
        format: SurfaceFormat,
    ) -> Result<TextureHandle, BackendError>;
    // ------------------------------------------------------------------------
    fn destroy_texture(&mut self, texture: TextureHandle);
    // ------------------------------------------------------------------------
    /// binds up to 4 MRT slots restricted to one atlas region
    fn set_render_targets(
        &mut self,
        targets: &[TextureHandle],
        region: Rectangle,
    ) -> Result<(), BackendError>;
    // ------------------------------------------------------------------------
    fn set_scissor(&mut self, rect: Rectangle) -> Result<(), BackendError>;
    // ------------------------------------------------------------------------
    /// clears the scissored region of all bound targets, one value per slot
    fn clear(&mut self, values: &[Vec4]) -> Result<(), BackendError>;
    // ------------------------------------------------------------------------
    fn bind_material(
        &mut self,
        material: &Material,
        pass: RenderPass,
    ) -> Result<(), BackendError>;
    // ------------------------------------------------------------------------
    /// screen-aligned quad covering `rect`, corner vertices annotated with
    /// the world xz positions interpolated between `world_tl` and `world_br`
    fn draw_quad(
        &mut self,
        rect: Rectangle,
        world_tl: Vec2,
        world_br: Vec2,
    ) -> Result<(), BackendError>;
    // ------------------------------------------------------------------------
    fn draw_submesh(&mut self, submesh: SubmeshHandle) -> Result<(), BackendError>;
    // ------------------------------------------------------------------------
    fn update_texture_sub_region(
        &mut self,
        texture: TextureHandle,
        mip_level: u32,
        rect: Rectangle,
        data: &[u8],
    ) -> Result<(), BackendError>;
    // ------------------------------------------------------------------------
}
// ----------------------------------------------------------------------------
