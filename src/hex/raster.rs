use crate::hex::math::{hex_line, offset_distance};
use crate::hex::HexProjection;

/// Walk a polyline of (lat, lon) nodes through the hex grid. Consecutive
/// nodes that land in non-adjacent cells are connected with [`hex_line`];
/// segments entirely outside the grid are skipped. The caller deduplicates
/// as needed (per way or per feature type).
pub fn rasterize_way(nodes: &[(f64, f64)], proj: &HexProjection) -> Vec<(i32, i32)> {
    let mut cells: Vec<(i32, i32)> = Vec::new();
    let mut prev: Option<(i32, i32)> = None;

    for &(lat, lon) in nodes {
        let Some(cell) = proj.geo_to_cell(lon, lat) else {
            prev = None; // segment leaves the grid; restart on re-entry
            continue;
        };
        match prev {
            Some(p) if p == cell => {}
            Some((pc, pr)) => {
                if offset_distance(pc, pr, cell.0, cell.1) > 1 {
                    // Fill the gap, skipping the already-recorded start cell.
                    for step in hex_line(pc, pr, cell.0, cell.1).into_iter().skip(1) {
                        cells.push(step);
                    }
                } else {
                    cells.push(cell);
                }
            }
            None => cells.push(cell),
        }
        prev = Some(cell);
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoBounds;

    fn proj() -> HexProjection {
        HexProjection::new(GeoBounds::new(0.0, 1.0, 0.0, 1.0), 30, 30)
    }

    #[test]
    fn contiguous_walk_between_distant_nodes() {
        let p = proj();
        let (lon0, lat0) = p.cell_center(2, 2);
        let (lon1, lat1) = p.cell_center(20, 15);
        let cells = rasterize_way(&[(lat0, lon0), (lat1, lon1)], &p);
        assert_eq!(*cells.first().unwrap(), (2, 2));
        assert_eq!(*cells.last().unwrap(), (20, 15));
        for pair in cells.windows(2) {
            assert!(offset_distance(pair[0].0, pair[0].1, pair[1].0, pair[1].1) <= 1);
        }
    }

    #[test]
    fn out_of_bounds_nodes_are_skipped() {
        let p = proj();
        let (lon0, lat0) = p.cell_center(1, 1);
        let cells = rasterize_way(&[(lat0, lon0), (5.0, 5.0), (-3.0, 0.5)], &p);
        assert_eq!(cells, vec![(1, 1)]);
    }

    #[test]
    fn stationary_nodes_emit_once() {
        let p = proj();
        let (lon, lat) = p.cell_center(4, 4);
        let cells = rasterize_way(&[(lat, lon), (lat, lon), (lat, lon)], &p);
        assert_eq!(cells, vec![(4, 4)]);
    }
}
