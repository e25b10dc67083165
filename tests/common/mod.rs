// ----------------------------------------------------------------------------
// test double for the host rasterizer: records every call with the scissor
// state active at the time, so tests can assert exact texel coverage
// ----------------------------------------------------------------------------
#![allow(dead_code)]

use glam::{Vec2, Vec4};

use terrain_clipmap::{
    param, BackendError, Material, RasterBackend, Rectangle, RenderPass, SubmeshHandle,
    SurfaceFormat, TextureHandle,
};
// ----------------------------------------------------------------------------
pub enum Call {
    CreateTexture {
        texture: TextureHandle,
        width: u32,
        height: u32,
        mip_levels: u32,
    },
    DestroyTexture(TextureHandle),
    SetRenderTargets {
        targets: Vec<TextureHandle>,
        region: Rectangle,
    },
    SetScissor(Rectangle),
    Clear {
        scissor: Rectangle,
        values: Vec<Vec4>,
    },
    BindMaterial {
        material: Material,
        pass: RenderPass,
        opacity: Option<f32>,
    },
    DrawQuad {
        scissor: Rectangle,
        rect: Rectangle,
        world_tl: Vec2,
        world_br: Vec2,
    },
    DrawSubmesh {
        scissor: Rectangle,
        submesh: SubmeshHandle,
    },
    UpdateTexture {
        texture: TextureHandle,
        rect: Rectangle,
    },
}
// ----------------------------------------------------------------------------
#[derive(Default)]
pub struct RecordingBackend {
    pub calls: Vec<Call>,
    /// error injection for the frame abort tests
    pub fail_draw_quad: bool,
    next_texture: u64,
    scissor: Rectangle,
}
// ----------------------------------------------------------------------------
impl RecordingBackend {
    // ------------------------------------------------------------------------
    pub fn new() -> Self {
        Self::default()
    }
    // ------------------------------------------------------------------------
    pub fn take_calls(&mut self) -> Vec<Call> {
        std::mem::take(&mut self.calls)
    }
    // ------------------------------------------------------------------------
}
// ----------------------------------------------------------------------------
impl RasterBackend for RecordingBackend {
    // ------------------------------------------------------------------------
    fn create_texture_2d(
        &mut self,
        width: u32,
        height: u32,
        mip_levels: u32,
        _format: SurfaceFormat,
    ) -> Result<TextureHandle, BackendError> {
        self.next_texture += 1;
        let texture = TextureHandle(self.next_texture);
        self.calls.push(Call::CreateTexture {
            texture,
            width,
            height,
            mip_levels,
        });
        Ok(texture)
    }
    // ------------------------------------------------------------------------
    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.calls.push(Call::DestroyTexture(texture));
    }
    // ------------------------------------------------------------------------
    fn set_render_targets(
        &mut self,
        targets: &[TextureHandle],
        region: Rectangle,
    ) -> Result<(), BackendError> {
        self.calls.push(Call::SetRenderTargets {
            targets: targets.to_vec(),
            region,
        });
        Ok(())
    }
    // ------------------------------------------------------------------------
    fn set_scissor(&mut self, rect: Rectangle) -> Result<(), BackendError> {
        self.scissor = rect;
        self.calls.push(Call::SetScissor(rect));
        Ok(())
    }
    // ------------------------------------------------------------------------
    fn clear(&mut self, values: &[Vec4]) -> Result<(), BackendError> {
        self.calls.push(Call::Clear {
            scissor: self.scissor,
            values: values.to_vec(),
        });
        Ok(())
    }
    // ------------------------------------------------------------------------
    fn bind_material(&mut self, material: &Material, pass: RenderPass) -> Result<(), BackendError> {
        self.calls.push(Call::BindMaterial {
            material: material.clone(),
            pass,
            opacity: material.parameter::<f32>(pass, param::FADE_OPACITY),
        });
        Ok(())
    }
    // ------------------------------------------------------------------------
    fn draw_quad(
        &mut self,
        rect: Rectangle,
        world_tl: Vec2,
        world_br: Vec2,
    ) -> Result<(), BackendError> {
        if self.fail_draw_quad {
            return Err(BackendError("injected draw failure".to_string()));
        }
        self.calls.push(Call::DrawQuad {
            scissor: self.scissor,
            rect,
            world_tl,
            world_br,
        });
        Ok(())
    }
    // ------------------------------------------------------------------------
    fn draw_submesh(&mut self, submesh: SubmeshHandle) -> Result<(), BackendError> {
        self.calls.push(Call::DrawSubmesh {
            scissor: self.scissor,
            submesh,
        });
        Ok(())
    }
    // ------------------------------------------------------------------------
    fn update_texture_sub_region(
        &mut self,
        texture: TextureHandle,
        _mip_level: u32,
        rect: Rectangle,
        _data: &[u8],
    ) -> Result<(), BackendError> {
        self.calls.push(Call::UpdateTexture { texture, rect });
        Ok(())
    }
    // ------------------------------------------------------------------------
}
// ----------------------------------------------------------------------------
// call log helpers
// ----------------------------------------------------------------------------
/// splits the call log into per-level segments delimited by the render
/// target binds (single column atlas layout assumed)
pub fn per_level(calls: &[Call], cells: u32) -> Vec<(usize, Vec<&Call>)> {
    let mut result = Vec::new();
    let mut current: Option<(usize, Vec<&Call>)> = None;

    for call in calls {
        match call {
            Call::SetRenderTargets { region, .. } => {
                if let Some(segment) = current.take() {
                    result.push(segment);
                }
                current = Some(((region.pos.y / cells) as usize, Vec::new()));
            }
            other => {
                if let Some((_, segment)) = &mut current {
                    segment.push(other);
                }
            }
        }
    }
    if let Some(segment) = current.take() {
        result.push(segment);
    }
    result
}
// ----------------------------------------------------------------------------
pub fn clear_texels(segment: &[&Call]) -> u64 {
    segment
        .iter()
        .map(|call| match call {
            Call::Clear { scissor, .. } => scissor.texel_count(),
            _ => 0,
        })
        .sum()
}
// ----------------------------------------------------------------------------
pub fn quad_texels(segment: &[&Call]) -> u64 {
    segment
        .iter()
        .map(|call| match call {
            Call::DrawQuad { scissor, .. } => scissor.texel_count(),
            _ => 0,
        })
        .sum()
}
// ----------------------------------------------------------------------------
pub fn quad_count(segment: &[&Call]) -> usize {
    segment
        .iter()
        .filter(|call| matches!(call, Call::DrawQuad { .. }))
        .count()
}
// ----------------------------------------------------------------------------
pub fn binds<'a>(segment: &'a [&'a Call]) -> Vec<(&'a Material, Option<f32>)> {
    segment
        .iter()
        .filter_map(|call| match call {
            Call::BindMaterial {
                material, opacity, ..
            } => Some((material, *opacity)),
            _ => None,
        })
        .collect()
}
// ----------------------------------------------------------------------------
