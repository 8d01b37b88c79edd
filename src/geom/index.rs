use geo::{BoundingRect, Contains, Polygon};

use crate::types::GeoBounds;

/// Uniform bucket-grid index over a query bbox for point-in-polygon
/// candidate filtering. Every polygon index is inserted into every bucket
/// its axis-aligned bbox touches; queries return deduplicated candidate
/// indices into the polygon slice the index was built from.
///
/// This is the only point-in-polygon accelerator in the pipeline; the
/// classifier never scans the full polygon list per cell.
pub struct SpatialIndex {
    bounds: GeoBounds,
    buckets_per_axis: usize,
    buckets: Vec<Vec<u32>>,
}

impl SpatialIndex {
    pub const DEFAULT_BUCKETS: usize = 25;

    /// Build over `polygons` (x = lon, y = lat) covering `bounds`.
    pub fn build(polygons: &[Polygon<f64>], bounds: GeoBounds) -> Self {
        Self::build_with_buckets(polygons, bounds, Self::DEFAULT_BUCKETS)
    }

    pub fn build_with_buckets(
        polygons: &[Polygon<f64>],
        bounds: GeoBounds,
        buckets_per_axis: usize,
    ) -> Self {
        debug_assert!(buckets_per_axis > 0);
        let mut buckets = vec![Vec::new(); buckets_per_axis * buckets_per_axis];

        for (idx, poly) in polygons.iter().enumerate() {
            let Some(rect) = poly.bounding_rect() else { continue };
            let (bx0, by0) = Self::bucket_of(&bounds, buckets_per_axis, rect.min().y, rect.min().x);
            let (bx1, by1) = Self::bucket_of(&bounds, buckets_per_axis, rect.max().y, rect.max().x);
            for by in by0..=by1 {
                for bx in bx0..=bx1 {
                    buckets[by * buckets_per_axis + bx].push(idx as u32);
                }
            }
        }

        Self { bounds, buckets_per_axis, buckets }
    }

    #[inline]
    fn bucket_of(bounds: &GeoBounds, n: usize, lat: f64, lon: f64) -> (usize, usize) {
        let fx = ((lon - bounds.west) / bounds.lon_span()).clamp(0.0, 1.0);
        let fy = ((lat - bounds.south) / bounds.lat_span()).clamp(0.0, 1.0);
        let bx = ((fx * n as f64) as usize).min(n - 1);
        let by = ((fy * n as f64) as usize).min(n - 1);
        (bx, by)
    }

    /// Candidate polygon indices whose bbox bucket covers the point.
    /// Already duplicate-free (a polygon appears at most once per bucket).
    pub fn query_point(&self, lat: f64, lon: f64) -> &[u32] {
        let (bx, by) = Self::bucket_of(&self.bounds, self.buckets_per_axis, lat, lon);
        &self.buckets[by * self.buckets_per_axis + bx]
    }

    /// Deduplicated candidate indices across every bucket the rectangle
    /// touches, in ascending order.
    pub fn query_rect(&self, south: f64, north: f64, west: f64, east: f64) -> Vec<u32> {
        let (bx0, by0) = Self::bucket_of(&self.bounds, self.buckets_per_axis, south, west);
        let (bx1, by1) = Self::bucket_of(&self.bounds, self.buckets_per_axis, north, east);
        let mut out = Vec::new();
        for by in by0..=by1 {
            for bx in bx0..=bx1 {
                out.extend_from_slice(&self.buckets[by * self.buckets_per_axis + bx]);
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Highest-index polygon containing the point, filtered through the
    /// bucket candidates. With polygons sorted by ascending priority this
    /// returns the winning overlay.
    pub fn last_containing(
        &self,
        polygons: &[Polygon<f64>],
        lat: f64,
        lon: f64,
    ) -> Option<usize> {
        let point = geo::point!(x: lon, y: lat);
        self.query_point(lat, lon)
            .iter()
            .filter(|&&idx| polygons[idx as usize].contains(&point))
            .map(|&idx| idx as usize)
            .max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::ring_to_polygon;

    fn square(lat0: f64, lon0: f64, side: f64) -> Polygon<f64> {
        ring_to_polygon(&[
            (lat0, lon0),
            (lat0, lon0 + side),
            (lat0 + side, lon0 + side),
            (lat0 + side, lon0),
        ])
    }

    #[test]
    fn point_query_finds_containing_polygon() {
        let polys = vec![square(0.0, 0.0, 1.0), square(5.0, 5.0, 1.0)];
        let index = SpatialIndex::build(&polys, GeoBounds::new(0.0, 10.0, 0.0, 10.0));
        assert!(index.query_point(0.5, 0.5).contains(&0));
        assert!(!index.query_point(0.5, 0.5).contains(&1));
        assert_eq!(index.last_containing(&polys, 5.5, 5.5), Some(1));
        assert_eq!(index.last_containing(&polys, 9.5, 9.5), None);
    }

    #[test]
    fn rect_query_dedupes_across_buckets() {
        // One big polygon spanning many buckets.
        let polys = vec![square(0.0, 0.0, 9.0)];
        let index = SpatialIndex::build(&polys, GeoBounds::new(0.0, 10.0, 0.0, 10.0));
        let hits = index.query_rect(1.0, 8.0, 1.0, 8.0);
        assert_eq!(hits, vec![0]);
    }

    #[test]
    fn overlapping_polygons_prefer_higher_index() {
        let polys = vec![square(0.0, 0.0, 4.0), square(1.0, 1.0, 2.0)];
        let index = SpatialIndex::build(&polys, GeoBounds::new(0.0, 10.0, 0.0, 10.0));
        assert_eq!(index.last_containing(&polys, 2.0, 2.0), Some(1));
        assert_eq!(index.last_containing(&polys, 0.5, 0.5), Some(0));
    }
}
