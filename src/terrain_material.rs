// ----------------------------------------------------------------------------
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use glam::{Vec3, Vec4};

use crate::backend::{PassFlags, RenderPass, TextureHandle};
use crate::error::TerrainError;
// ----------------------------------------------------------------------------
/// Well-known parameter names consumed by the host's clipmap shaders. Layer
/// accessors are pass-throughs keyed by these constants.
pub mod param {
    // material layer
    pub const TILE_SIZE: &str = "tile_size";
    pub const DIFFUSE_TEXTURE: &str = "diffuse_texture";
    pub const SPECULAR_TEXTURE: &str = "specular_texture";
    pub const DIFFUSE_COLOR: &str = "diffuse_color";
    pub const SPECULAR_COLOR: &str = "specular_color";
    pub const SPECULAR_POWER: &str = "specular_power";
    pub const ALPHA: &str = "alpha";
    pub const BLEND_TEXTURE: &str = "blend_texture";
    pub const BLEND_CHANNEL: &str = "blend_channel";
    pub const BLEND_THRESHOLD: &str = "blend_threshold";
    pub const BLEND_RANGE: &str = "blend_range";
    pub const BLEND_HEIGHT_INFLUENCE: &str = "blend_height_influence";
    pub const BLEND_NOISE_INFLUENCE: &str = "blend_noise_influence";
    pub const NOISE_TEXTURE: &str = "noise_texture";
    pub const HEIGHT_MIN: &str = "height_min";
    pub const HEIGHT_MAX: &str = "height_max";
    pub const SLOPE_MIN: &str = "slope_min";
    pub const SLOPE_MAX: &str = "slope_max";
    // set by the compositor for every scissored draw
    pub const FADE_OPACITY: &str = "fade_opacity";
    // decal layer
    pub const DECAL_POSITION: &str = "decal_position";
    pub const DECAL_ORIENTATION: &str = "decal_orientation";
    pub const DECAL_WIDTH: &str = "decal_width";
    pub const DECAL_HEIGHT: &str = "decal_height";
    // road layer
    pub const ROAD_LENGTH: &str = "road_length";
    pub const ROAD_BORDER_BLEND: &str = "road_border_blend";
    // tile geometry layer
    pub const HEIGHT_TEXTURE: &str = "height_texture";
    pub const NORMAL_TEXTURE: &str = "normal_texture";
    pub const HOLE_TEXTURE: &str = "hole_texture";
    pub const HOLE_THRESHOLD: &str = "hole_threshold";
    pub const TILE_ORIGIN: &str = "tile_origin";
}
// ----------------------------------------------------------------------------
/// closed set of parameter kinds replacing the source's dynamic property bag
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaterialParam {
    Float(f32),
    Int(i32),
    Vec3(Vec3),
    Vec4(Vec4),
    Texture(TextureHandle),
}
// ----------------------------------------------------------------------------
impl MaterialParam {
    // ------------------------------------------------------------------------
    pub fn kind(&self) -> &'static str {
        match self {
            MaterialParam::Float(_) => "float",
            MaterialParam::Int(_) => "int",
            MaterialParam::Vec3(_) => "vec3",
            MaterialParam::Vec4(_) => "vec4",
            MaterialParam::Texture(_) => "texture",
        }
    }
    // ------------------------------------------------------------------------
}
// ----------------------------------------------------------------------------
/// typed view into [MaterialParam] for the generic accessors
pub trait ParamValue: Copy {
    fn wrap(self) -> MaterialParam;
    fn unwrap(param: &MaterialParam) -> Option<Self>;
}
// ----------------------------------------------------------------------------
macro_rules! impl_param_value {
    ($ty:ty, $variant:ident) => {
        impl ParamValue for $ty {
            fn wrap(self) -> MaterialParam {
                MaterialParam::$variant(self)
            }
            fn unwrap(param: &MaterialParam) -> Option<Self> {
                match param {
                    MaterialParam::$variant(v) => Some(*v),
                    _ => None,
                }
            }
        }
    };
}
// ----------------------------------------------------------------------------
impl_param_value!(f32, Float);
impl_param_value!(i32, Int);
impl_param_value!(Vec3, Vec3);
impl_param_value!(Vec4, Vec4);
impl_param_value!(TextureHandle, Texture);
// ----------------------------------------------------------------------------
struct MaterialData {
    passes: PassFlags,
    // one parameter table per pass (base, detail)
    parameters: [HashMap<String, MaterialParam>; 2],
}
// ----------------------------------------------------------------------------
/// Shareable material handle. Cloning shares the interior: two layers that
/// reference the same material observe each other's parameter edits. This is
/// documented behavior the host relies on. Single render thread contract,
/// mutating from another thread during a compositor pass is not supported.
#[derive(Clone)]
pub struct Material {
    inner: Rc<RefCell<MaterialData>>,
}
// ----------------------------------------------------------------------------
impl Material {
    // ------------------------------------------------------------------------
    pub fn new(passes: PassFlags) -> Result<Self, TerrainError> {
        if passes.is_empty() {
            return Err(TerrainError::InvalidArgument(
                "material must contain at least one render pass",
            ));
        }
        Ok(Self {
            inner: Rc::new(RefCell::new(MaterialData {
                passes,
                parameters: Default::default(),
            })),
        })
    }
    // ------------------------------------------------------------------------
    pub fn contains(&self, pass: RenderPass) -> bool {
        self.inner.borrow().passes.contains(pass.flag())
    }
    // ------------------------------------------------------------------------
    pub fn passes(&self) -> PassFlags {
        self.inner.borrow().passes
    }
    // ------------------------------------------------------------------------
    /// stores a parameter value. overwriting an existing parameter with a
    /// value of a different kind is rejected and leaves the old value.
    pub fn set_parameter<T: ParamValue>(
        &self,
        pass: RenderPass,
        name: &str,
        value: T,
    ) -> Result<(), TerrainError> {
        if !self.contains(pass) {
            return Err(TerrainError::InvalidArgument(
                "material does not contain this render pass",
            ));
        }
        let mut data = self.inner.borrow_mut();
        let table = &mut data.parameters[pass_index(pass)];
        let new = value.wrap();

        if let Some(existing) = table.get(name) {
            if existing.kind() != new.kind() {
                return Err(TerrainError::InvalidArgument(
                    "parameter exists with a different kind",
                ));
            }
        }
        table.insert(name.to_string(), new);
        Ok(())
    }
    // ------------------------------------------------------------------------
    /// typed parameter lookup. None if missing or of a different kind.
    pub fn parameter<T: ParamValue>(&self, pass: RenderPass, name: &str) -> Option<T> {
        self.inner.borrow().parameters[pass_index(pass)]
            .get(name)
            .and_then(T::unwrap)
    }
    // ------------------------------------------------------------------------
    /// writes the same value into every pass the material contains
    pub fn set_shared_parameter<T: ParamValue>(
        &self,
        name: &str,
        value: T,
    ) -> Result<(), TerrainError> {
        for pass in [RenderPass::Base, RenderPass::Detail] {
            if self.contains(pass) {
                self.set_parameter(pass, name, value)?;
            }
        }
        Ok(())
    }
    // ------------------------------------------------------------------------
    /// identity of the shared interior (not the value)
    pub fn same_material(&self, other: &Material) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
    // ------------------------------------------------------------------------
}
// ----------------------------------------------------------------------------
#[inline(always)]
fn pass_index(pass: RenderPass) -> usize {
    match pass {
        RenderPass::Base => 0,
        RenderPass::Detail => 1,
    }
}
// ----------------------------------------------------------------------------
impl std::fmt::Debug for Material {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Material({:?})", self.inner.borrow().passes)
    }
}
// ----------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_pass_set() {
        assert!(Material::new(PassFlags::empty()).is_err());
    }

    #[test]
    fn kind_mismatch_keeps_old_value() {
        let material = Material::new(PassFlags::DETAIL).unwrap();
        material
            .set_parameter(RenderPass::Detail, param::TILE_SIZE, 2.0f32)
            .unwrap();

        assert!(material
            .set_parameter(RenderPass::Detail, param::TILE_SIZE, 4i32)
            .is_err());
        assert_eq!(
            material.parameter::<f32>(RenderPass::Detail, param::TILE_SIZE),
            Some(2.0)
        );
    }

    #[test]
    fn clones_share_parameter_edits() {
        let material = Material::new(PassFlags::DETAIL).unwrap();
        let alias = material.clone();

        alias
            .set_parameter(RenderPass::Detail, param::SPECULAR_POWER, 16.0f32)
            .unwrap();
        assert_eq!(
            material.parameter::<f32>(RenderPass::Detail, param::SPECULAR_POWER),
            Some(16.0)
        );
        assert!(material.same_material(&alias));
    }

    #[test]
    fn pass_membership_is_checked() {
        let material = Material::new(PassFlags::BASE).unwrap();
        assert!(material
            .set_parameter(RenderPass::Detail, param::ALPHA, 1.0f32)
            .is_err());
        assert!(!material.contains(RenderPass::Detail));
    }
}
// ----------------------------------------------------------------------------
