//! Shared geometry utilities.

use geo::{Area, BoundingRect, Coord, MapCoords, MultiPolygon, Polygon, Rect, RemoveRepeatedPoints};
use rayon::prelude::*;

/// Signed area of a ring via the shoelace formula.
///
/// Positive = counter-clockwise in y-up axes, which is clockwise on screen
/// (y down). Coordinates are taken relative to the first vertex so large
/// tile offsets do not cost precision.
pub fn ring_signed_area(ring: &[Coord<f64>]) -> f64 {
    let Some(&origin) = ring.first() else {
        return 0.0;
    };
    let n = ring.len();
    if n < 3 {
        return 0.0;
    }
    let mut area = 0.0;
    for i in 0..n {
        let p = ring[i] - origin;
        let q = ring[(i + 1) % n] - origin;
        area += p.x * q.y - q.x * p.y;
    }
    area / 2.0
}

/// Number of exterior and interior rings.
pub fn ring_counts(geometry: &MultiPolygon<f64>) -> (usize, usize) {
    let exteriors = geometry.0.len();
    let interiors = geometry.0.iter().map(|p| p.interiors().len()).sum();
    (exteriors, interiors)
}

/// Total area with holes subtracted.
pub fn area(geometry: &MultiPolygon<f64>) -> f64 {
    geometry.unsigned_area()
}

pub fn bounds(polygon: &Polygon<f64>) -> Option<Rect<f64>> {
    polygon.bounding_rect()
}

/// Round every coordinate to a multiple of `precision` and drop the
/// repeated vertices that rounding creates.
pub fn snap_to_grid(geometry: &MultiPolygon<f64>, precision: f64) -> MultiPolygon<f64> {
    if !(precision > 0.0) {
        return geometry.clone();
    }
    geometry
        .map_coords(|c| Coord {
            x: (c.x / precision).round() * precision,
            y: (c.y / precision).round() * precision,
        })
        .remove_repeated_points()
}

/// Combine `parts` with a binary overlay `op`, pairing neighbours level by
/// level so every operand stays small. Pairs of one level run in parallel.
///
/// Returns `None` as soon as `op` fails on any pair; an empty input yields
/// an empty geometry.
pub(crate) fn reduce_pairwise<F>(mut parts: Vec<MultiPolygon<f64>>, op: F) -> Option<MultiPolygon<f64>>
where
    F: Fn(&MultiPolygon<f64>, &MultiPolygon<f64>) -> Option<MultiPolygon<f64>> + Sync,
{
    while parts.len() > 1 {
        parts = parts
            .par_chunks(2)
            .map(|pair| match pair {
                [a, b] => op(a, b),
                _ => Some(pair[0].clone()),
            })
            .collect::<Option<Vec<_>>>()?;
    }
    Some(parts.pop().unwrap_or_else(|| MultiPolygon::new(vec![])))
}

#[cfg(test)]
mod tests {
    use geo::{coord, polygon};

    use super::*;

    #[test]
    fn unit_square_orientations() {
        let ccw = [
            coord! { x: 0.0, y: 0.0 },
            coord! { x: 1.0, y: 0.0 },
            coord! { x: 1.0, y: 1.0 },
            coord! { x: 0.0, y: 1.0 },
            coord! { x: 0.0, y: 0.0 },
        ];
        assert!((ring_signed_area(&ccw) - 1.0).abs() < 1e-12);
        let mut cw = ccw;
        cw.reverse();
        assert!((ring_signed_area(&cw) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn far_offset_keeps_precision() {
        let o = 1.0e9;
        let ring = [
            coord! { x: o, y: o },
            coord! { x: o + 1.0, y: o },
            coord! { x: o + 1.0, y: o + 1.0 },
            coord! { x: o, y: o + 1.0 },
        ];
        assert_eq!(ring_signed_area(&ring), 1.0);
    }

    #[test]
    fn degenerate_rings_have_no_area() {
        assert_eq!(ring_signed_area(&[]), 0.0);
        assert_eq!(ring_signed_area(&[coord! { x: 0.0, y: 0.0 }, coord! { x: 1.0, y: 0.0 }]), 0.0);
    }

    #[test]
    fn snapping_merges_near_duplicates() {
        let poly = polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0 + 1e-9, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
        ];
        let snapped = snap_to_grid(&MultiPolygon::new(vec![poly]), 1e-6);
        // 4 corners plus the closing vertex.
        assert_eq!(snapped.0[0].exterior().0.len(), 5);
        assert!((area(&snapped) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn counts_exteriors_and_holes() {
        let with_hole = polygon!(
            exterior: [(x: 0.0, y: 0.0), (x: 3.0, y: 0.0), (x: 3.0, y: 3.0), (x: 0.0, y: 3.0)],
            interiors: [[(x: 1.0, y: 1.0), (x: 2.0, y: 1.0), (x: 2.0, y: 2.0), (x: 1.0, y: 2.0)]],
        );
        let geometry = MultiPolygon::new(vec![with_hole]);
        assert_eq!(ring_counts(&geometry), (1, 1));
        assert!((area(&geometry) - 8.0).abs() < 1e-12);
        assert!(bounds(&geometry.0[0]).is_some());
    }

    #[test]
    fn pairwise_reduction_visits_every_part() {
        use geo::BooleanOps;

        let squares: Vec<MultiPolygon<f64>> = (0..5)
            .map(|i| {
                let x = i as f64 * 2.0;
                MultiPolygon::new(vec![polygon![
                    (x: x, y: 0.0), (x: x + 1.0, y: 0.0), (x: x + 1.0, y: 1.0), (x: x, y: 1.0)
                ]])
            })
            .collect();
        let union = reduce_pairwise(squares, |a, b| Some(a.union(b))).unwrap();
        assert_eq!(union.0.len(), 5);
        assert!((area(&union) - 5.0).abs() < 1e-9);

        assert!(reduce_pairwise(vec![], |a, _| Some(a.clone())).unwrap().0.is_empty());
        let one = vec![MultiPolygon::new(vec![])];
        assert!(reduce_pairwise(one.clone(), |_, _| None).is_some());
        assert!(reduce_pairwise(vec![one[0].clone(), one[0].clone()], |_, _| None).is_none());
    }
}
