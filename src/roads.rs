// ----------------------------------------------------------------------------
// tolerance for the barycentric inside test, in barycentric units
const INSIDE_EPSILON: f32 = 1e-6;
// ----------------------------------------------------------------------------
use std::collections::HashMap;

use glam::{vec2, Vec2, Vec3};
use rayon::iter::{IndexedParallelIterator, ParallelIterator};

use crate::error::TerrainError;
use crate::heightmap::HeightmapData;
// ----------------------------------------------------------------------------
/// Triangulated road strip in world space: x/z are ground coordinates, y is
/// the road height. Carving clamps the heightfield to the road surface and
/// blends the surrounding terrain towards it within `side_falloff`.
#[derive(Debug, Clone)]
pub struct RoadDescriptor {
    pub vertices: Vec<Vec3>,
    pub indices: Vec<u32>,
    /// world distance over which the terrain blends back to its own height
    pub side_falloff: f32,
}
// ----------------------------------------------------------------------------
/// Flattens the heightfield under a road. Samples inside the triangulation
/// take the barycentric interpolated road height; samples within
/// `side_falloff` of a boundary edge are smoothstep blended between the
/// nearest road height and the terrain. Offline helper, runs row parallel.
pub fn carve_road(
    heightmap: &mut HeightmapData,
    map_origin: Vec2,
    cell_size: f32,
    road: &RoadDescriptor,
) -> Result<(), TerrainError> {
    if !(cell_size > 0.0 && cell_size.is_finite()) {
        return Err(TerrainError::InvalidArgument("cell size must be > 0"));
    }
    if road.indices.is_empty() || road.indices.len() % 3 != 0 {
        return Err(TerrainError::InvalidArgument(
            "road indices must form a non-empty triangle list",
        ));
    }
    if road
        .indices
        .iter()
        .any(|i| *i as usize >= road.vertices.len())
    {
        return Err(TerrainError::InvalidArgument("road index out of bounds"));
    }
    if !(road.side_falloff >= 0.0 && road.side_falloff.is_finite()) {
        return Err(TerrainError::InvalidArgument("side falloff must be >= 0"));
    }

    let triangles: Vec<[Vec3; 3]> = road
        .indices
        .chunks_exact(3)
        .map(|tri| {
            [
                road.vertices[tri[0] as usize],
                road.vertices[tri[1] as usize],
                road.vertices[tri[2] as usize],
            ]
        })
        .collect();

    let boundary = boundary_edges(road);

    // texel range covered by the road plus the falloff margin
    let mut min = Vec2::INFINITY;
    let mut max = Vec2::NEG_INFINITY;
    for v in &road.vertices {
        min = min.min(vec2(v.x, v.z));
        max = max.max(vec2(v.x, v.z));
    }
    min -= Vec2::splat(road.side_falloff);
    max += Vec2::splat(road.side_falloff);

    let x0 = (((min.x - map_origin.x) / cell_size).floor().max(0.0)) as usize;
    let y0 = (((min.y - map_origin.y) / cell_size).floor().max(0.0)) as usize;
    let x1 = ((((max.x - map_origin.x) / cell_size).ceil()) as usize + 1)
        .min(heightmap.width() as usize);
    let y1 = ((((max.y - map_origin.y) / cell_size).ceil()) as usize + 1)
        .min(heightmap.height() as usize);
    if x0 >= x1 || y0 >= y1 {
        return Ok(());
    }

    let side_falloff = road.side_falloff;

    heightmap.rows_mut().enumerate().for_each(|(y, row)| {
        if y < y0 || y >= y1 {
            return;
        }
        for (x, height) in row.iter_mut().enumerate().take(x1).skip(x0) {
            let p = map_origin + vec2(x as f32, y as f32) * cell_size;

            if let Some(road_height) = triangles.iter().find_map(|tri| sample_triangle(tri, p)) {
                *height = road_height;
                continue;
            }

            if side_falloff > 0.0 {
                let nearest = boundary
                    .iter()
                    .map(|(a, b)| closest_on_segment(*a, *b, p))
                    .min_by(|a, b| a.0.total_cmp(&b.0));

                if let Some((distance_sq, road_height)) = nearest {
                    let distance = distance_sq.sqrt();
                    if distance < side_falloff {
                        let t = smoothstep(distance / side_falloff);
                        *height = road_height + (*height - road_height) * t;
                    }
                }
            }
        }
    });

    Ok(())
}
// ----------------------------------------------------------------------------
/// edges referenced by exactly one triangle form the road border
fn boundary_edges(road: &RoadDescriptor) -> Vec<(Vec3, Vec3)> {
    let mut counts: HashMap<(u32, u32), u32> = HashMap::new();
    for tri in road.indices.chunks_exact(3) {
        for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
            let key = (a.min(b), a.max(b));
            *counts.entry(key).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count == 1)
        .map(|((a, b), _)| (road.vertices[a as usize], road.vertices[b as usize]))
        .collect()
}
// ----------------------------------------------------------------------------
/// barycentric interpolated road height if `p` lies inside the triangle
fn sample_triangle(tri: &[Vec3; 3], p: Vec2) -> Option<f32> {
    let a = vec2(tri[0].x, tri[0].z);
    let b = vec2(tri[1].x, tri[1].z);
    let c = vec2(tri[2].x, tri[2].z);

    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;

    let den = v0.x * v1.y - v1.x * v0.y;
    if den.abs() < f32::EPSILON {
        return None;
    }

    let v = (v2.x * v1.y - v1.x * v2.y) / den;
    let w = (v0.x * v2.y - v2.x * v0.y) / den;
    let u = 1.0 - v - w;

    if u >= -INSIDE_EPSILON && v >= -INSIDE_EPSILON && w >= -INSIDE_EPSILON {
        Some(u * tri[0].y + v * tri[1].y + w * tri[2].y)
    } else {
        None
    }
}
// ----------------------------------------------------------------------------
/// squared distance to the segment and the road height at the closest point
fn closest_on_segment(a: Vec3, b: Vec3, p: Vec2) -> (f32, f32) {
    let a2 = vec2(a.x, a.z);
    let b2 = vec2(b.x, b.z);

    let edge = b2 - a2;
    let len_sq = edge.length_squared();
    let t = if len_sq > 0.0 {
        ((p - a2).dot(edge) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let closest = a2 + edge * t;
    let height = a.y + (b.y - a.y) * t;
    ((p - closest).length_squared(), height)
}
// ----------------------------------------------------------------------------
#[inline(always)]
fn smoothstep(x: f32) -> f32 {
    let x = x.clamp(0.0, 1.0);
    x * x * (3.0 - 2.0 * x)
}
// ----------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use glam::vec3;

    // a 8x8 world units road patch at height 5 covering [4,12]^2
    fn road_patch(side_falloff: f32) -> RoadDescriptor {
        RoadDescriptor {
            vertices: vec![
                vec3(4.0, 5.0, 4.0),
                vec3(12.0, 5.0, 4.0),
                vec3(12.0, 5.0, 12.0),
                vec3(4.0, 5.0, 12.0),
            ],
            indices: vec![0, 1, 2, 0, 2, 3],
            side_falloff,
        }
    }

    #[test]
    fn validates_descriptor() {
        let mut map = HeightmapData::filled(16, 16, 0.0).unwrap();
        let mut bad = road_patch(1.0);
        bad.indices.pop();
        assert!(carve_road(&mut map, Vec2::ZERO, 1.0, &bad).is_err());

        let mut bad = road_patch(1.0);
        bad.indices[0] = 99;
        assert!(carve_road(&mut map, Vec2::ZERO, 1.0, &bad).is_err());

        assert!(carve_road(&mut map, Vec2::ZERO, 0.0, &road_patch(1.0)).is_err());
    }

    #[test]
    fn carving_clamps_samples_inside_the_road() {
        let mut map = HeightmapData::filled(16, 16, 0.0).unwrap();
        carve_road(&mut map, Vec2::ZERO, 1.0, &road_patch(0.0)).unwrap();

        assert_eq!(map.get(8, 8), 5.0);
        assert_eq!(map.get(4, 4), 5.0);
        assert_eq!(map.get(12, 12), 5.0);
        // untouched outside, no falloff
        assert_eq!(map.get(14, 8), 0.0);
        assert_eq!(map.get(2, 2), 0.0);
    }

    #[test]
    fn falloff_blends_towards_the_terrain() {
        let mut map = HeightmapData::filled(16, 16, 0.0).unwrap();
        carve_road(&mut map, Vec2::ZERO, 1.0, &road_patch(3.0)).unwrap();

        // one sample outside the border: mostly road height
        let near = map.get(13, 8);
        // two samples out: closer to the terrain
        let far = map.get(14, 8);
        assert!(near > far, "{} <= {}", near, far);
        assert!(near < 5.0);
        assert!(far > 0.0);
        // beyond the falloff the terrain is untouched
        assert_eq!(map.get(15, 8), 0.0);
    }

    #[test]
    fn sloped_road_interpolates_heights() {
        let mut road = road_patch(0.0);
        // raise the far edge
        road.vertices[2].y = 9.0;
        road.vertices[3].y = 9.0;

        let mut map = HeightmapData::filled(16, 16, 0.0).unwrap();
        carve_road(&mut map, Vec2::ZERO, 1.0, &road).unwrap();

        assert_eq!(map.get(8, 4), 5.0);
        assert_eq!(map.get(8, 12), 9.0);
        assert_eq!(map.get(8, 8), 7.0);
    }
}
// ----------------------------------------------------------------------------
