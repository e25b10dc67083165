// ----------------------------------------------------------------------------
// 3x3 tent kernel used for smoothing and filtered downsampling
const KERNEL_1_2_1: [f32; 3] = [1.0, 2.0, 1.0];
// ----------------------------------------------------------------------------
use rayon::prelude::*;

use crate::error::TerrainError;
// ----------------------------------------------------------------------------
/// downsample filter for mipmap generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MipFilter {
    /// [1,2,1] x [1,2,1] tent filter
    Filtered,
    Nearest,
}
// ----------------------------------------------------------------------------
/// CPU side heightfield for the offline helpers (smoothing, mipmaps, normal
/// synthesis, road carving). Heights are stored row major as f32. None of
/// these helpers is invoked by the compositor; rows are distributed over the
/// rayon pool and joined before returning.
#[derive(Debug, Clone)]
pub struct HeightmapData {
    width: u32,
    height: u32,
    data: Vec<f32>,
}
// ----------------------------------------------------------------------------
impl HeightmapData {
    // ------------------------------------------------------------------------
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> Result<Self, TerrainError> {
        if width == 0 || height == 0 {
            return Err(TerrainError::InvalidArgument(
                "heightmap dimensions must be > 0",
            ));
        }
        if data.len() != (width * height) as usize {
            return Err(TerrainError::InvalidArgument(
                "heightmap data length does not match dimensions",
            ));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }
    // ------------------------------------------------------------------------
    pub fn filled(width: u32, height: u32, value: f32) -> Result<Self, TerrainError> {
        Self::new(width, height, vec![value; (width * height) as usize])
    }
    // ------------------------------------------------------------------------
    pub fn width(&self) -> u32 {
        self.width
    }
    // ------------------------------------------------------------------------
    pub fn height(&self) -> u32 {
        self.height
    }
    // ------------------------------------------------------------------------
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
    // ------------------------------------------------------------------------
    #[inline(always)]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[(y * self.width + x) as usize]
    }
    // ------------------------------------------------------------------------
    #[inline(always)]
    pub fn set(&mut self, x: u32, y: u32, value: f32) {
        self.data[(y * self.width + x) as usize] = value;
    }
    // ------------------------------------------------------------------------
    /// edge clamped sample
    #[inline(always)]
    fn get_clamped(&self, x: i64, y: i64) -> f32 {
        let x = x.clamp(0, self.width as i64 - 1) as u32;
        let y = y.clamp(0, self.height as i64 - 1) as u32;
        self.get(x, y)
    }
    // ------------------------------------------------------------------------
    pub(crate) fn rows_mut(&mut self) -> rayon::slice::ChunksMut<'_, f32> {
        self.data.par_chunks_mut(self.width as usize)
    }
    // ------------------------------------------------------------------------
    /// 3x3 weighted smoothing pass. The tent kernel is attenuated by the
    /// height difference to the center sample so sharp ridges and cliffs
    /// keep their silhouette while noise is averaged away.
    pub fn smooth(&mut self) {
        let width = self.width as usize;
        let source = std::mem::take(&mut self.data);
        let mut result = vec![0.0; source.len()];

        let snapshot = Self {
            width: self.width,
            height: self.height,
            data: source,
        };

        result
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, value) in row.iter_mut().enumerate() {
                    *value = snapshot.smooth_at(x as i64, y as i64);
                }
            });

        self.data = result;
    }
    // ------------------------------------------------------------------------
    fn smooth_at(&self, x: i64, y: i64) -> f32 {
        let center = self.get_clamped(x, y);

        let mut sum = 0.0;
        let mut weights = 0.0;
        for (dy, ky) in KERNEL_1_2_1.iter().enumerate() {
            for (dx, kx) in KERNEL_1_2_1.iter().enumerate() {
                let sample = self.get_clamped(x + dx as i64 - 1, y + dy as i64 - 1);
                let weight = kx * ky / (1.0 + (sample - center).abs());
                sum += sample * weight;
                weights += weight;
            }
        }
        sum / weights
    }
    // ------------------------------------------------------------------------
    /// halves both dimensions (clamped to 1)
    pub fn downsample(&self, filter: MipFilter) -> HeightmapData {
        let width = (self.width / 2).max(1);
        let height = (self.height / 2).max(1);
        let mut result = vec![0.0; (width * height) as usize];

        result
            .par_chunks_mut(width as usize)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, value) in row.iter_mut().enumerate() {
                    let sx = x as i64 * 2;
                    let sy = y as i64 * 2;
                    *value = match filter {
                        MipFilter::Nearest => self.get_clamped(sx, sy),
                        MipFilter::Filtered => {
                            let mut sum = 0.0;
                            let mut weights = 0.0;
                            for (dy, ky) in KERNEL_1_2_1.iter().enumerate() {
                                for (dx, kx) in KERNEL_1_2_1.iter().enumerate() {
                                    let weight = kx * ky;
                                    sum += weight
                                        * self.get_clamped(
                                            sx + dx as i64 - 1,
                                            sy + dy as i64 - 1,
                                        );
                                    weights += weight;
                                }
                            }
                            sum / weights
                        }
                    };
                }
            });

        HeightmapData {
            width,
            height,
            data: result,
        }
    }
    // ------------------------------------------------------------------------
    /// full mip chain down to 1x1, finest level first
    pub fn generate_mips(&self, filter: MipFilter) -> Vec<HeightmapData> {
        let mut mips = Vec::new();
        let mut current = self.clone();
        while current.width > 1 || current.height > 1 {
            current = current.downsample(filter);
            mips.push(current.clone());
        }
        mips
    }
    // ------------------------------------------------------------------------
    /// Sobel filtered normals encoded as rgba8 with world up in the green
    /// channel. `cell_size` is the world distance between two samples,
    /// `height_scale` converts stored height values to world units (e.g.
    /// the min/max span of a normalized png heightmap).
    pub fn compute_normals(
        &self,
        cell_size: f32,
        height_scale: f32,
    ) -> Result<Vec<[u8; 4]>, TerrainError> {
        if !(cell_size > 0.0 && cell_size.is_finite()) {
            return Err(TerrainError::InvalidArgument("cell size must be > 0"));
        }
        if !(height_scale > 0.0 && height_scale.is_finite()) {
            return Err(TerrainError::InvalidArgument("height scale must be > 0"));
        }

        let width = self.width as usize;
        let mut result = vec![[0u8; 4]; self.data.len()];

        result
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, texel) in row.iter_mut().enumerate() {
                    let (x, y) = (x as i64, y as i64);
                    let h = |dx: i64, dy: i64| self.get_clamped(x + dx, y + dy);

                    // sobel gradients, 8 * cell_size normalizer
                    let gx = (h(1, -1) + 2.0 * h(1, 0) + h(1, 1))
                        - (h(-1, -1) + 2.0 * h(-1, 0) + h(-1, 1));
                    let gy = (h(-1, 1) + 2.0 * h(0, 1) + h(1, 1))
                        - (h(-1, -1) + 2.0 * h(0, -1) + h(1, -1));

                    let normal = glam::vec3(
                        -gx * height_scale / (8.0 * cell_size),
                        1.0,
                        -gy * height_scale / (8.0 * cell_size),
                    )
                    .normalize();

                    *texel = [
                        ((normal.x * 0.5 + 0.5) * 255.0).round() as u8,
                        ((normal.y * 0.5 + 0.5) * 255.0).round() as u8,
                        ((normal.z * 0.5 + 0.5) * 255.0).round() as u8,
                        255,
                    ];
                }
            });

        Ok(result)
    }
    // ------------------------------------------------------------------------
}
// ----------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_dimensions_against_data() {
        assert!(HeightmapData::new(0, 4, vec![]).is_err());
        assert!(HeightmapData::new(2, 2, vec![0.0; 3]).is_err());
        assert!(HeightmapData::new(2, 2, vec![0.0; 4]).is_ok());
    }

    #[test]
    fn smoothing_keeps_flat_fields_flat() {
        let mut map = HeightmapData::filled(16, 16, 3.5).unwrap();
        map.smooth();
        assert!(map.as_slice().iter().all(|h| (h - 3.5).abs() < 1e-5));
    }

    #[test]
    fn smoothing_reduces_an_isolated_spike() {
        let mut map = HeightmapData::filled(9, 9, 0.0).unwrap();
        map.set(4, 4, 10.0);
        map.smooth();

        let peak = map.get(4, 4);
        assert!(peak < 10.0);
        assert!(peak > 0.0);
        // neighbors picked up some of the spike
        assert!(map.get(4, 3) > 0.0);
    }

    #[test]
    fn filtered_downsample_of_constant_is_constant() {
        let map = HeightmapData::filled(8, 8, 2.0).unwrap();
        let mip = map.downsample(MipFilter::Filtered);
        assert_eq!(mip.width(), 4);
        assert_eq!(mip.height(), 4);
        assert!(mip.as_slice().iter().all(|h| (h - 2.0).abs() < 1e-6));
    }

    #[test]
    fn nearest_downsample_picks_even_samples() {
        let mut map = HeightmapData::filled(4, 4, 0.0).unwrap();
        map.set(0, 0, 1.0);
        map.set(2, 0, 2.0);
        map.set(0, 2, 3.0);
        map.set(2, 2, 4.0);

        let mip = map.downsample(MipFilter::Nearest);
        assert_eq!(mip.as_slice(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn mip_chain_ends_at_one_texel() {
        let map = HeightmapData::filled(16, 16, 1.0).unwrap();
        let mips = map.generate_mips(MipFilter::Filtered);
        assert_eq!(mips.len(), 4);
        assert_eq!(mips.last().unwrap().width(), 1);
        assert_eq!(mips.last().unwrap().height(), 1);
    }

    #[test]
    fn flat_field_normals_point_up() {
        let map = HeightmapData::filled(4, 4, 7.0).unwrap();
        let normals = map.compute_normals(1.0, 1.0).unwrap();
        assert!(normals.iter().all(|n| *n == [128, 255, 128, 255]));
    }

    #[test]
    fn slope_in_x_tilts_normals_against_x() {
        // heights rising with x: the normal leans into -x (red < 128)
        let data = (0..16).map(|i| (i % 4) as f32).collect();
        let map = HeightmapData::new(4, 4, data).unwrap();
        let normals = map.compute_normals(1.0, 1.0).unwrap();

        let center = normals[4 + 1];
        assert!(center[0] < 128);
        assert_eq!(center[2], 128);
    }

    #[test]
    fn height_scale_steepens_normals() {
        // the same stored slope leans further once heights span more world
        // units (e.g. a [0,1] normalized heightmap over a 100m range)
        let data = (0..16).map(|i| (i % 4) as f32 * 0.1).collect();
        let map = HeightmapData::new(4, 4, data).unwrap();

        let gentle = map.compute_normals(1.0, 1.0).unwrap();
        let steep = map.compute_normals(1.0, 10.0).unwrap();

        assert!(steep[4 + 1][0] < gentle[4 + 1][0]);
        assert!(steep[4 + 1][1] < gentle[4 + 1][1]);
    }

    #[test]
    fn rejects_bad_scaling_for_normals() {
        let map = HeightmapData::filled(2, 2, 0.0).unwrap();
        assert!(map.compute_normals(0.0, 1.0).is_err());
        assert!(map.compute_normals(1.0, 0.0).is_err());
        assert!(map.compute_normals(1.0, f32::NAN).is_err());
    }
}
// ----------------------------------------------------------------------------
