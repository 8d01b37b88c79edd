use geo::{Coord, LineString, Polygon};

/// Build a `geo::Polygon` from a ring of (lat, lon) vertices, closing it if
/// the source data left the last vertex open. Coordinates map as x = lon,
/// y = lat.
pub fn ring_to_polygon(ring: &[(f64, f64)]) -> Polygon<f64> {
    let mut coords: Vec<Coord<f64>> = ring
        .iter()
        .map(|&(lat, lon)| Coord { x: lon, y: lat })
        .collect();
    if let (Some(first), Some(last)) = (coords.first().copied(), coords.last().copied()) {
        if first != last {
            coords.push(first);
        }
    }
    Polygon::new(LineString(coords), vec![])
}

/// Vertex centroid of a ring, as (lat, lon). Robust enough for anchor-point
/// use (dam ways, area flags); not an area centroid.
pub fn ring_centroid(ring: &[(f64, f64)]) -> Option<(f64, f64)> {
    if ring.is_empty() {
        return None;
    }
    let n = ring.len() as f64;
    let (lat, lon) = ring
        .iter()
        .fold((0.0, 0.0), |(la, lo), &(lat, lon)| (la + lat, lo + lon));
    Some((lat / n, lon / n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Contains;

    #[test]
    fn open_ring_is_closed() {
        let poly = ring_to_polygon(&[(0.0, 0.0), (0.0, 2.0), (2.0, 2.0), (2.0, 0.0)]);
        assert!(poly.contains(&geo::point!(x: 1.0, y: 1.0)));
        assert!(!poly.contains(&geo::point!(x: 3.0, y: 1.0)));
    }

    #[test]
    fn centroid_of_square() {
        let c = ring_centroid(&[(0.0, 0.0), (0.0, 2.0), (2.0, 2.0), (2.0, 0.0)]).unwrap();
        assert_eq!(c, (1.0, 1.0));
    }
}
