use crate::hex::math::{offset_to_pixel, pixel_to_offset, SQRT3};
use crate::types::GeoBounds;

/// Bounding-box-anchored mapping between geographic coordinates and hex grid
/// cells. The sole authority for geographic↔cell conversion within one
/// generation; every component must share the same instance.
///
/// Pixel space uses unit hexes (size = 1). The grid's pixel extents are
/// `x ∈ [-√3/2, √3·(cols+0.5)-√3/2]` and `y ∈ [-1, 1.5·rows - 0.5]`,
/// mapped affinely onto the bbox (equirectangular, north up).
#[derive(Debug, Clone)]
pub struct HexProjection {
    bounds: GeoBounds,
    cols: usize,
    rows: usize,
    hx_min: f64,
    hx_span: f64,
    hy_min: f64,
    hy_span: f64,
}

impl HexProjection {
    pub fn new(bounds: GeoBounds, cols: usize, rows: usize) -> Self {
        debug_assert!(cols > 0 && rows > 0, "empty grid");
        Self {
            bounds,
            cols,
            rows,
            hx_min: -SQRT3 / 2.0,
            hx_span: SQRT3 * (cols as f64 + 0.5),
            hy_min: -1.0,
            hy_span: 1.5 * rows as f64 + 0.5,
        }
    }

    #[inline] pub fn cols(&self) -> usize { self.cols }
    #[inline] pub fn rows(&self) -> usize { self.rows }
    #[inline] pub fn bounds(&self) -> &GeoBounds { &self.bounds }
    #[inline] pub fn cell_count(&self) -> usize { self.cols * self.rows }

    /// Flat arena index for a cell; the layout every per-cell accumulator
    /// array shares.
    #[inline]
    pub fn cell_index(&self, col: i32, row: i32) -> usize {
        debug_assert!(self.in_grid(col, row), "cell out of grid");
        row as usize * self.cols + col as usize
    }

    #[inline]
    pub fn in_grid(&self, col: i32, row: i32) -> bool {
        col >= 0 && row >= 0 && (col as usize) < self.cols && (row as usize) < self.rows
    }

    #[inline]
    fn geo_to_pixel(&self, lon: f64, lat: f64) -> (f64, f64) {
        let x = (lon - self.bounds.west) / self.bounds.lon_span() * self.hx_span + self.hx_min;
        let y = (self.bounds.north - lat) / self.bounds.lat_span() * self.hy_span + self.hy_min;
        (x, y)
    }

    #[inline]
    fn pixel_to_geo(&self, x: f64, y: f64) -> (f64, f64) {
        let lon = self.bounds.west + (x - self.hx_min) / self.hx_span * self.bounds.lon_span();
        let lat = self.bounds.north - (y - self.hy_min) / self.hy_span * self.bounds.lat_span();
        (lon, lat)
    }

    /// Cell containing a geographic point, or None outside the grid.
    pub fn geo_to_cell(&self, lon: f64, lat: f64) -> Option<(i32, i32)> {
        let (x, y) = self.geo_to_pixel(lon, lat);
        let (col, row) = pixel_to_offset(x, y, 1.0);
        self.in_grid(col, row).then_some((col, row))
    }

    /// Geographic center of a cell as (lon, lat).
    pub fn cell_center(&self, col: i32, row: i32) -> (f64, f64) {
        let (x, y) = offset_to_pixel(col, row, 1.0);
        self.pixel_to_geo(x, y)
    }

    /// Axis-aligned degree rectangle bounding the hex: (north, south, west,
    /// east). The hex spans ±√3/2 horizontally and ±1 vertically in unit
    /// space.
    pub fn cell_bbox(&self, col: i32, row: i32) -> (f64, f64, f64, f64) {
        let (x, y) = offset_to_pixel(col, row, 1.0);
        let (west, north) = self.pixel_to_geo(x - SQRT3 / 2.0, y - 1.0);
        let (east, south) = self.pixel_to_geo(x + SQRT3 / 2.0, y + 1.0);
        (north, south, west, east)
    }

    /// `n × n` uniformly spaced (lat, lon) points across the cell bbox,
    /// row-major north to south. n = 1 yields the bbox center.
    pub fn cell_sample_points(&self, col: i32, row: i32, n: usize) -> Vec<(f64, f64)> {
        let (north, south, west, east) = self.cell_bbox(col, row);
        let mut points = Vec::with_capacity(n * n);
        for j in 0..n {
            let fy = (j as f64 + 0.5) / n as f64;
            let lat = north + (south - north) * fy;
            for i in 0..n {
                let fx = (i as f64 + 0.5) / n as f64;
                points.push((lat, west + (east - west) * fx));
            }
        }
        points
    }

    /// Conservative (row0, row1, col0, col1) window (inclusive) of cells
    /// whose bbox may touch the given degree rectangle. Clamped to the grid;
    /// None when the rectangle misses the grid entirely.
    pub fn geo_range_to_grid_range(
        &self,
        south: f64,
        north: f64,
        west: f64,
        east: f64,
    ) -> Option<(i32, i32, i32, i32)> {
        let (x0, y0) = self.geo_to_pixel(west, north);
        let (x1, y1) = self.geo_to_pixel(east, south);

        // One extra cell of slack on each side covers the hex overhang.
        let c0 = ((x0 - SQRT3 / 2.0) / SQRT3).floor() as i32 - 1;
        let c1 = ((x1 + SQRT3 / 2.0) / SQRT3).ceil() as i32 + 1;
        let r0 = ((y0 - 1.0) / 1.5).floor() as i32 - 1;
        let r1 = ((y1 + 1.0) / 1.5).ceil() as i32 + 1;

        let c0 = c0.max(0);
        let r0 = r0.max(0);
        let c1 = c1.min(self.cols as i32 - 1);
        let r1 = r1.min(self.rows as i32 - 1);
        (c0 <= c1 && r0 <= r1).then_some((r0, r1, c0, c1))
    }

    /// Cell size in km (hex width), inverting the row packing: `rows` hexes
    /// stack at √3/2 of the cell size per row.
    pub fn cell_km(&self) -> f64 {
        self.bounds.height_km() * 2.0 / (SQRT3 * self.rows as f64)
    }
}
