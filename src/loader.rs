// ----------------------------------------------------------------------------
use std::fs::File;
use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use png::{BitDepth, ColorType};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::error;

use crate::backend::{RasterBackend, Rectangle, SurfaceFormat, TextureHandle};
use crate::error::TerrainError;
use crate::heightmap::HeightmapData;
// ----------------------------------------------------------------------------
/// loads a 16 bit grayscale png heightmap, normalized to [0,1]
pub fn load_heightmap_png(filepath: &str) -> Result<HeightmapData, TerrainError> {
    use png::{BitDepth::Sixteen, ColorType::Grayscale};

    let (data, width, height) = load_png_data(Grayscale, Sixteen, filepath)?;

    // png stores 16 bit samples big endian
    let mut samples = vec![0u16; (width * height) as usize];
    let mut cursor = Cursor::new(data);
    cursor.read_u16_into::<BigEndian>(&mut samples).map_err(|e| {
        error!("failed to convert heightmap buffer into u16 values: {}", e);
        TerrainError::InvalidArgument("heightmap png has truncated sample data")
    })?;

    HeightmapData::new(
        width,
        height,
        samples
            .into_iter()
            .map(|raw| raw as f32 / u16::MAX as f32)
            .collect(),
    )
}
// ----------------------------------------------------------------------------
/// saves a heightmap as 16 bit grayscale png. heights are clamped to [0,1].
pub fn save_heightmap_png(filepath: &str, heightmap: &HeightmapData) -> Result<(), TerrainError> {
    let file = File::create(filepath).map_err(|e| {
        error!("failed to create file {}: {}", filepath, e);
        TerrainError::InvalidArgument("failed to create heightmap file")
    })?;

    let mut encoder = png::Encoder::new(file, heightmap.width(), heightmap.height());
    encoder.set_color(ColorType::Grayscale);
    encoder.set_depth(BitDepth::Sixteen);

    let mut bytes = Vec::with_capacity(heightmap.as_slice().len() * 2);
    for sample in heightmap.as_slice() {
        let raw = (sample.clamp(0.0, 1.0) * u16::MAX as f32).round() as u16;
        bytes
            .write_u16::<BigEndian>(raw)
            .expect("write into a Vec cannot fail");
    }

    encoder
        .write_header()
        .and_then(|mut writer| writer.write_image_data(&bytes))
        .map_err(|e| {
            error!("failed to encode png file {}: {}", filepath, e);
            TerrainError::InvalidArgument("failed to encode heightmap png")
        })
}
// ----------------------------------------------------------------------------
/// loads an rgba8 png texture of the given edge size (e.g. blend masks)
pub fn load_texture_rgba(
    filepath: &str,
    size: u32,
) -> Result<image::RgbaImage, TerrainError> {
    use png::{BitDepth::Eight, ColorType::Rgba};

    let (data, width, height) = load_png_data(Rgba, Eight, filepath)?;
    if width != size || height != size {
        error!(
            "file {}: expected {} x {}. found: {} x {}",
            filepath, size, size, width, height
        );
        return Err(TerrainError::InvalidArgument(
            "texture has unexpected dimensions",
        ));
    }
    Ok(image::RgbaImage::from_raw(size, size, data)
        .expect("rgba buffer length was verified by the decoder"))
}
// ----------------------------------------------------------------------------
fn load_png_data(
    colortype: ColorType,
    bitdepth: BitDepth,
    filepath: &str,
) -> Result<(Vec<u8>, u32, u32), TerrainError> {
    use png::{Decoder, Transformations};

    let file = File::open(filepath).map_err(|e| {
        error!("failed to open file {}: {}", filepath, e);
        TerrainError::InvalidArgument("failed to open texture file")
    })?;

    let mut decoder = Decoder::new(file);
    decoder.set_transformations(Transformations::IDENTITY);

    let mut reader = decoder.read_info().map_err(|e| {
        error!("failed to decode png file {}: {}", filepath, e);
        TerrainError::InvalidArgument("failed to decode png file")
    })?;

    let mut img_data = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut img_data).map_err(|e| {
        error!("failed to read image data of {}: {}", filepath, e);
        TerrainError::InvalidArgument("failed to read png image data")
    })?;

    if info.color_type != colortype || info.bit_depth != bitdepth {
        error!(
            "file {}: format must be {:?}-Bit {:?}. found {:?}-Bit {:?}",
            filepath, bitdepth, colortype, info.bit_depth, info.color_type
        );
        return Err(TerrainError::InvalidArgument(
            "png file has unexpected bit depth or color type",
        ));
    }

    img_data.truncate(info.buffer_size());
    Ok((img_data, info.width, info.height))
}
// ----------------------------------------------------------------------------
// texel codecs
// ----------------------------------------------------------------------------
/// encodes height samples into texel bytes of a single channel format
pub fn encode_height_texels(
    samples: &[f32],
    format: SurfaceFormat,
) -> Result<Vec<u8>, TerrainError> {
    match format {
        SurfaceFormat::R32Float => Ok(bytemuck::cast_slice(samples).to_vec()),
        SurfaceFormat::R16Float => {
            let mut bytes = Vec::with_capacity(samples.len() * 2);
            for sample in samples {
                bytes.extend_from_slice(&f32_to_f16_bits(*sample).to_le_bytes());
            }
            Ok(bytes)
        }
        SurfaceFormat::R8 => Ok(samples
            .iter()
            .map(|s| (s.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect()),
        format => Err(TerrainError::UnsupportedFormat(format)),
    }
}
// ----------------------------------------------------------------------------
/// decodes single channel texel bytes back into height samples
pub fn decode_height_texels(
    bytes: &[u8],
    format: SurfaceFormat,
) -> Result<Vec<f32>, TerrainError> {
    match format {
        SurfaceFormat::R32Float => {
            if bytes.len() % 4 != 0 {
                return Err(TerrainError::InvalidArgument(
                    "texel data length is not a multiple of the texel size",
                ));
            }
            // the byte slice may be unaligned, gather instead of casting
            Ok(bytemuck::pod_collect_to_vec::<u8, f32>(bytes))
        }
        SurfaceFormat::R16Float => {
            if bytes.len() % 2 != 0 {
                return Err(TerrainError::InvalidArgument(
                    "texel data length is not a multiple of the texel size",
                ));
            }
            Ok(bytes
                .chunks_exact(2)
                .map(|c| f16_bits_to_f32(u16::from_le_bytes([c[0], c[1]])))
                .collect())
        }
        SurfaceFormat::R8 => Ok(bytes.iter().map(|b| *b as f32 / 255.0).collect()),
        format => Err(TerrainError::UnsupportedFormat(format)),
    }
}
// ----------------------------------------------------------------------------
/// uploads a heightmap region into a host texture. only the top mip level
/// is supported.
pub fn upload_heightmap(
    backend: &mut dyn RasterBackend,
    texture: TextureHandle,
    format: SurfaceFormat,
    mip_level: u32,
    rect: Rectangle,
    heightmap: &HeightmapData,
) -> Result<(), TerrainError> {
    if mip_level > 0 {
        return Err(TerrainError::NotImplemented(
            "uploading heightmap mip levels",
        ));
    }
    if rect.max().x > heightmap.width() || rect.max().y > heightmap.height() {
        return Err(TerrainError::InvalidArgument(
            "upload region exceeds the heightmap",
        ));
    }

    // gather the region rows, then encode in one go
    let mut samples = Vec::with_capacity(rect.texel_count() as usize);
    for y in rect.pos.y..rect.max().y {
        for x in rect.pos.x..rect.max().x {
            samples.push(heightmap.get(x, y));
        }
    }

    let bytes = encode_height_texels(&samples, format)?;
    backend.update_texture_sub_region(texture, mip_level, rect, &bytes)?;
    Ok(())
}
// ----------------------------------------------------------------------------
/// deterministic noise tile for noise influenced material blending
pub fn blend_noise_texture(size: u32, seed: u64) -> Result<image::GrayImage, TerrainError> {
    if size == 0 {
        return Err(TerrainError::InvalidArgument("noise size must be > 0"));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let data = (0..(size * size)).map(|_| rng.gen::<u8>()).collect();
    Ok(image::GrayImage::from_raw(size, size, data)
        .expect("buffer length matches the dimensions"))
}
// ----------------------------------------------------------------------------
// f16 conversion (ieee 754 binary16, round to nearest even-ish via bias)
// ----------------------------------------------------------------------------
fn f32_to_f16_bits(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exponent = ((bits >> 23) & 0xff) as i32;
    let mantissa = bits & 0x7f_ffff;

    if exponent == 0xff {
        // inf and nan
        return sign | 0x7c00 | if mantissa != 0 { 0x200 } else { 0 };
    }

    let exponent = exponent - 127 + 15;
    if exponent >= 0x1f {
        // overflow to inf
        return sign | 0x7c00;
    }
    if exponent <= 0 {
        if exponent < -10 {
            // underflow to signed zero
            return sign;
        }
        let mantissa = (mantissa | 0x80_0000) >> (1 - exponent);
        return sign | ((mantissa + 0x1000) >> 13) as u16;
    }
    // the rounding carry may propagate into the exponent, which is correct
    sign | (((exponent as u32) << 10) + ((mantissa + 0x1000) >> 13)) as u16
}
// ----------------------------------------------------------------------------
fn f16_bits_to_f32(bits: u16) -> f32 {
    let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exponent = ((bits >> 10) & 0x1f) as i32;
    let mantissa = (bits & 0x3ff) as f32;

    sign * match exponent {
        0 => mantissa * 2f32.powi(-24),
        0x1f => {
            if mantissa == 0.0 {
                f32::INFINITY
            } else {
                f32::NAN
            }
        }
        _ => (1.0 + mantissa / 1024.0) * 2f32.powi(exponent - 15),
    }
}
// ----------------------------------------------------------------------------
