// ----------------------------------------------------------------------------
use glam::{uvec2, vec2, UVec2, Vec2};

use crate::aabb::{clip_regions, coalesce_regions, combined_aabb, Aabb, ClippedAabbs};
use crate::backend::Rectangle;
use crate::error::TerrainError;

use super::Clipmap;
// ----------------------------------------------------------------------------
/// one scissored sub-draw of a world rectangle after toroidal wrapping
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ScissorRect {
    /// pixel extent inside the atlas
    pub rect: Rectangle,
    /// world xz of the rectangle's min corner
    pub world_tl: Vec2,
    /// world xz of the rectangle's max corner
    pub world_br: Vec2,
}
// ----------------------------------------------------------------------------
/// a world rectangle maps to up to 4 atlas rectangles when it crosses the
/// toroidal seam. this is the only place where one logical rectangle turns
/// into multiple draws.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ScissorSplit {
    rects: [ScissorRect; 4],
    count: usize,
}
// ----------------------------------------------------------------------------
impl ScissorSplit {
    // ------------------------------------------------------------------------
    #[inline(always)]
    fn push(&mut self, rect: ScissorRect) {
        self.rects[self.count] = rect;
        self.count += 1;
    }
    // ------------------------------------------------------------------------
    #[inline(always)]
    pub fn as_slice(&self) -> &[ScissorRect] {
        &self.rects[..self.count]
    }
    // ------------------------------------------------------------------------
}
// ----------------------------------------------------------------------------
impl Clipmap {
    // ------------------------------------------------------------------------
    /// resolves the user cell sizes into per-level actual sizes: NaN entries
    /// inherit twice the previous level.
    pub(crate) fn resolve_cell_sizes(&mut self) -> Result<(), TerrainError> {
        let sizes = *self.cell_sizes();
        if sizes[0].is_nan() {
            return Err(TerrainError::InvalidArgument(
                "cell size of level 0 must not be NaN",
            ));
        }

        let mut previous = sizes[0];
        for level in 0..self.num_levels() {
            let actual = if sizes[level].is_nan() {
                previous * 2.0
            } else {
                sizes[level]
            };
            // levels could not nest otherwise
            if actual < previous {
                return Err(TerrainError::InvalidArgument(
                    "cell sizes must not decrease towards coarser levels",
                ));
            }
            self.actual_cell_sizes[level] = actual;
            previous = actual;
        }
        Ok(())
    }
    // ------------------------------------------------------------------------
    /// Recomputes all level origins and wrap offsets from the camera xz.
    /// The origin is the largest cell size multiple keeping the camera in
    /// the central half of the level extent; coarser levels are clamped so
    /// their extent nests the next finer one. The old origins are kept for
    /// the motion dirt computation of this frame.
    pub(crate) fn update_origins(&mut self, camera: Vec2) {
        self.previous_origins = self.origins;

        for level in 0..self.num_levels() {
            let cell = self.actual_cell_sizes[level];
            let size = self.level_size(level);

            let mut origin = ((camera - Vec2::splat(size * 0.5)) / cell).floor() * cell;

            if level > 0 {
                // snap outwards until the finer level extent is contained
                let inner = self.level_aabb(level - 1);
                if origin.x > inner.min.x {
                    origin.x = (inner.min.x / cell).floor() * cell;
                }
                if origin.x + size < inner.max.x {
                    origin.x = ((inner.max.x - size) / cell).ceil() * cell;
                }
                if origin.y > inner.min.y {
                    origin.y = (inner.min.y / cell).floor() * cell;
                }
                if origin.y + size < inner.max.y {
                    origin.y = ((inner.max.y - size) / cell).ceil() * cell;
                }
            }

            self.origins[level] = origin;
            self.offsets[level] = vec2(
                wrap_texel(origin.x, cell, self.cells_per_level()) as f32,
                wrap_texel(origin.y, cell, self.cells_per_level()) as f32,
            ) / self.cells_per_level() as f32;
        }
    }
    // ------------------------------------------------------------------------
    /// World rectangles newly exposed by the origin shift of this frame, in
    /// whole texels: an L shape of up to two disjoint strips, the whole
    /// level once the shift reaches the level extent. Derived from origins
    /// only, invalidation rectangles (including infinite ones) never move.
    pub(crate) fn motion_dirty(&self, level: usize) -> ClippedAabbs {
        let mut result = ClippedAabbs::default();

        let cell = self.actual_cell_sizes[level];
        let cells = self.cells_per_level() as i64;
        let delta = self.origins[level] - self.previous_origins[level];
        let dx = (delta.x / cell).round() as i64;
        let dy = (delta.y / cell).round() as i64;

        if dx == 0 && dy == 0 {
            return result;
        }

        let aabb = self.level_aabb(level);
        if dx.abs() >= cells || dy.abs() >= cells {
            result.push(aabb);
            return result;
        }

        // newly exposed columns at the leading edge
        if dx > 0 {
            result.push(Aabb::new(
                vec2(aabb.max.x - dx as f32 * cell, aabb.min.y),
                aabb.max,
            ));
        } else if dx < 0 {
            result.push(Aabb::new(
                aabb.min,
                vec2(aabb.min.x + (-dx) as f32 * cell, aabb.max.y),
            ));
        }

        // newly exposed rows, limited to the columns not covered above
        let x0 = if dx < 0 {
            aabb.min.x + (-dx) as f32 * cell
        } else {
            aabb.min.x
        };
        let x1 = if dx > 0 {
            aabb.max.x - dx as f32 * cell
        } else {
            aabb.max.x
        };
        if x0 < x1 {
            if dy > 0 {
                result.push(Aabb::new(
                    vec2(x0, aabb.max.y - dy as f32 * cell),
                    vec2(x1, aabb.max.y),
                ));
            } else if dy < 0 {
                result.push(Aabb::new(
                    vec2(x0, aabb.min.y),
                    vec2(x1, aabb.min.y + (-dy) as f32 * cell),
                ));
            }
        }
        result
    }
    // ------------------------------------------------------------------------
    /// rebuilds the invalid region list of one level: motion dirt plus the
    /// frame's terrain regions clipped to the level extent, coalesced and
    /// made pairwise disjoint
    pub(crate) fn rebuild_invalid_regions(
        &mut self,
        level: usize,
        frame_regions: &[Aabb],
        full_refresh: bool,
    ) {
        let level_aabb = self.level_aabb(level);
        let motion = self.motion_dirty(level);

        let list = &mut self.invalid_regions[level];
        list.clear();

        if full_refresh {
            list.push(level_aabb);
        } else {
            list.extend_from_slice(motion.as_slice());
            for region in frame_regions {
                if let Some(intersection) = region.intersection(&level_aabb) {
                    list.push(intersection);
                }
            }
            coalesce_regions(list);
            clip_regions(list);
        }

        self.invalid_regions_clipped[level] = true;
        self.combined_invalid_aabb[level] = combined_aabb(&self.invalid_regions[level]);
    }
    // ------------------------------------------------------------------------
    /// Maps a world rectangle to scissor rectangles inside the level's atlas
    /// cell: texel aligned cover (floor the min edge, ceil the max edge)
    /// translated by the toroidal wrap phase and split at the seam.
    pub(crate) fn scissor_rects(&self, level: usize, region: &Aabb) -> ScissorSplit {
        let mut result = ScissorSplit::default();

        let level_aabb = self.level_aabb(level);
        let region = match region.intersection(&level_aabb) {
            Some(region) => region,
            None => return result,
        };

        let origin = self.origins[level];
        let cell = self.actual_cell_sizes[level];
        let cells = self.cells_per_level();

        let t0 = ((region.min - origin) / cell).floor();
        let t1 = ((region.max - origin) / cell).ceil();
        let t0 = t0.max(Vec2::ZERO).as_uvec2().min(UVec2::splat(cells));
        let t1 = t1.max(Vec2::ZERO).as_uvec2().min(UVec2::splat(cells));
        if t0.x >= t1.x || t0.y >= t1.y {
            return result;
        }

        let wrap = uvec2(
            wrap_texel(origin.x, cell, cells),
            wrap_texel(origin.y, cell, cells),
        );
        let atlas = self.atlas_region(level);

        let (segments_x, count_x) = wrap_segments(t0.x, t1.x, wrap.x, cells);
        let (segments_y, count_y) = wrap_segments(t0.y, t1.y, wrap.y, cells);

        for (atlas_x, texel_x, width) in segments_x.iter().take(count_x) {
            for (atlas_y, texel_y, height) in segments_y.iter().take(count_y) {
                result.push(ScissorRect {
                    rect: Rectangle {
                        pos: atlas.pos + uvec2(*atlas_x, *atlas_y),
                        size: uvec2(*width, *height),
                    },
                    world_tl: origin + vec2(*texel_x as f32, *texel_y as f32) * cell,
                    world_br: origin
                        + vec2((texel_x + width) as f32, (texel_y + height) as f32) * cell,
                });
            }
        }
        result
    }
    // ------------------------------------------------------------------------
}
// ----------------------------------------------------------------------------
/// toroidal wrap phase of a level origin in whole texels
#[inline(always)]
fn wrap_texel(origin: f32, cell: f32, cells: u32) -> u32 {
    let texel = (origin / cell).round() as i64;
    texel.rem_euclid(cells as i64) as u32
}
// ----------------------------------------------------------------------------
/// shifts a level texel range [t0, t1) by the wrap phase and splits it at
/// the texture edge. yields (atlas start, level texel start, length).
fn wrap_segments(t0: u32, t1: u32, wrap: u32, cells: u32) -> ([(u32, u32, u32); 2], usize) {
    let mut segments = [(0, 0, 0); 2];

    let length = t1 - t0;
    let start = (t0 + wrap) % cells;

    if start + length <= cells {
        segments[0] = (start, t0, length);
        (segments, 1)
    } else {
        let first = cells - start;
        segments[0] = (start, t0, first);
        segments[1] = (0, t0 + first, length - first);
        (segments, 2)
    }
}
// ----------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SurfaceFormat;

    fn clipmap_64_3() -> Clipmap {
        let mut clipmap = Clipmap::new(SurfaceFormat::Rgba16Float, 1, 3, 64).unwrap();
        clipmap.resolve_cell_sizes().unwrap();
        clipmap
    }

    #[test]
    fn nan_cell_sizes_inherit_doubled() {
        let mut clipmap = Clipmap::new(SurfaceFormat::Rgba8, 1, 4, 16).unwrap();
        clipmap.set_cell_size(2, 8.0).unwrap();
        clipmap.resolve_cell_sizes().unwrap();

        assert_eq!(clipmap.actual_cell_size(0), 1.0);
        assert_eq!(clipmap.actual_cell_size(1), 2.0);
        assert_eq!(clipmap.actual_cell_size(2), 8.0);
        assert_eq!(clipmap.actual_cell_size(3), 16.0);
    }

    #[test]
    fn shrinking_cell_sizes_are_rejected() {
        let mut clipmap = Clipmap::new(SurfaceFormat::Rgba8, 1, 3, 64).unwrap();
        clipmap.set_cell_size(1, 0.5).unwrap();
        assert!(clipmap.resolve_cell_sizes().is_err());
    }

    #[test]
    fn origins_center_the_camera_and_snap_to_cells() {
        let mut clipmap = clipmap_64_3();
        clipmap.update_origins(Vec2::ZERO);

        assert_eq!(clipmap.origin(0), vec2(-32.0, -32.0));
        assert_eq!(clipmap.origin(1), vec2(-64.0, -64.0));
        assert_eq!(clipmap.origin(2), vec2(-128.0, -128.0));

        for level in 0..3 {
            let origin = clipmap.origin(level);
            let cell = clipmap.actual_cell_size(level);
            assert_eq!((origin.x / cell).fract(), 0.0);
            assert_eq!((origin.y / cell).fract(), 0.0);
        }
    }

    #[test]
    fn levels_stay_nested_for_any_camera() {
        let mut clipmap = clipmap_64_3();
        for camera in [
            Vec2::ZERO,
            vec2(1.0, 0.0),
            vec2(1117.5, -933.25),
            vec2(-0.25, 63.0),
        ] {
            clipmap.update_origins(camera);
            for level in 1..3 {
                let outer = clipmap.level_aabb(level);
                let inner = clipmap.level_aabb(level - 1);
                assert!(outer.contains(&inner), "camera {:?} level {}", camera, level);
            }
        }
    }

    #[test]
    fn single_texel_shift_dirties_one_edge_strip() {
        let mut clipmap = clipmap_64_3();
        clipmap.update_origins(Vec2::ZERO);
        clipmap.update_origins(vec2(1.0, 0.0));

        // level 0 moved one texel in +x
        assert_eq!(clipmap.origin(0), vec2(-31.0, -32.0));
        let dirty = clipmap.motion_dirty(0);
        assert_eq!(
            dirty.as_slice(),
            &[Aabb::new(vec2(32.0, -32.0), vec2(33.0, 32.0))]
        );

        // coarser levels did not cross their snap thresholds
        assert!(clipmap.motion_dirty(1).is_empty());
        assert!(clipmap.motion_dirty(2).is_empty());
    }

    #[test]
    fn diagonal_shift_dirties_two_disjoint_strips() {
        let mut clipmap = clipmap_64_3();
        clipmap.update_origins(Vec2::ZERO);
        clipmap.update_origins(vec2(3.0, -2.0));

        let dirty = clipmap.motion_dirty(0);
        assert_eq!(dirty.as_slice().len(), 2);
        let strips = dirty.as_slice();
        assert!(!strips[0].intersects(&strips[1]));

        let covered: f32 = strips
            .iter()
            .map(|s| s.size().x * s.size().y)
            .sum();
        // 3 columns + 2 rows of the remaining 61 columns
        assert_eq!(covered, 3.0 * 64.0 + 2.0 * 61.0);
    }

    #[test]
    fn shift_beyond_extent_dirties_whole_level() {
        let mut clipmap = clipmap_64_3();
        clipmap.update_origins(Vec2::ZERO);
        clipmap.update_origins(vec2(1000.0, 0.0));

        let dirty = clipmap.motion_dirty(0);
        assert_eq!(dirty.as_slice(), &[clipmap.level_aabb(0)]);
    }

    #[test]
    fn scissor_rect_splits_at_toroidal_seam() {
        let mut clipmap = clipmap_64_3();
        // camera (0, 30): level 0 origin (-32, -2), wrap (32, 62)
        clipmap.update_origins(vec2(0.0, 30.0));
        assert_eq!(clipmap.origin(0), vec2(-32.0, -2.0));
        assert_eq!(clipmap.offset(0), vec2(0.5, 62.0 / 64.0));

        // footprint crossing the seam in x only
        let region = Aabb::new(vec2(-2.0, 10.0), vec2(2.0, 14.0));
        let split = clipmap.scissor_rects(0, &region);

        assert_eq!(split.as_slice().len(), 2);
        let [a, b] = [split.as_slice()[0], split.as_slice()[1]];
        assert_eq!(a.rect, Rectangle::new(62, 10, 2, 4));
        assert_eq!(b.rect, Rectangle::new(0, 10, 2, 4));
        // the two pieces cover the region seamlessly in world space
        assert_eq!(a.world_tl, vec2(-2.0, 10.0));
        assert_eq!(a.world_br, vec2(0.0, 14.0));
        assert_eq!(b.world_tl, vec2(0.0, 10.0));
        assert_eq!(b.world_br, vec2(2.0, 14.0));
    }

    #[test]
    fn scissor_rect_aligns_to_texels_of_the_level() {
        let mut clipmap = clipmap_64_3();
        clipmap.update_origins(Vec2::ZERO);

        // 4x4 world region, level 2 cell size 4 with origin -128: the
        // unaligned region covers 2x2 texels. the wrap phase is 32, so the
        // region at the view center sits on the seam in both axes and
        // splits into 4 single-texel draws.
        let region = Aabb::new(vec2(-2.0, -2.0), vec2(2.0, 2.0));

        let split = clipmap.scissor_rects(2, &region);
        assert_eq!(split.as_slice().len(), 4);

        let texels: u64 = split.as_slice().iter().map(|s| s.rect.texel_count()).sum();
        assert_eq!(texels, 4);

        // the pieces cover the aligned 8x8 world cover of the region
        let mut min = Vec2::INFINITY;
        let mut max = Vec2::NEG_INFINITY;
        for s in split.as_slice() {
            min = min.min(s.world_tl);
            max = max.max(s.world_br);
        }
        assert_eq!(min, vec2(-4.0, -4.0));
        assert_eq!(max, vec2(4.0, 4.0));
    }
}
// ----------------------------------------------------------------------------
