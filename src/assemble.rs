//! Traced rings → valid polygons with nested holes.
//!
//! Rings are not interpreted through their shell/hole tags. Every ring
//! becomes a one-ring polygon and all of them are combined by symmetric
//! difference: the overlay nodes the ring arrangement and rebuilds maximal
//! polygons, so a face enclosed by an odd number of rings is filled and an
//! even number is empty. Rings that touch at pixel corners come out as
//! valid geometry this way, where pairing shells with holes directly would
//! not.

use geo::{BooleanOps, LineString, MultiPolygon, Polygon};

use crate::geom::reduce_pairwise;
use crate::outline::{Ring, TraceOutput};

/// Geometry of one label in one tile.
#[derive(Debug, Clone)]
pub struct AssembledGeometry {
    pub label: i32,
    pub geometry: MultiPolygon<f64>,
    /// Rings as traced, before assembly.
    pub shells: usize,
    pub holes: usize,
    pub selected_pixels: u64,
}

impl AssembledGeometry {
    pub fn is_empty(&self) -> bool {
        self.geometry.0.is_empty()
    }
}

/// Assemble the rings of one trace.
pub fn assemble(rings: &[Ring]) -> MultiPolygon<f64> {
    match rings {
        [] => MultiPolygon::new(vec![]),
        [only] => MultiPolygon::new(vec![ring_polygon(only)]),
        _ => {
            let parts = rings
                .iter()
                .map(|ring| MultiPolygon::new(vec![ring_polygon(ring)]))
                .collect();
            reduce_pairwise(parts, |a, b| Some(a.xor(b))).unwrap_or_else(|| MultiPolygon::new(vec![]))
        }
    }
}

pub fn assemble_trace(label: i32, output: &TraceOutput) -> AssembledGeometry {
    AssembledGeometry {
        label,
        geometry: assemble(&output.rings),
        shells: output.shells().count(),
        holes: output.holes().count(),
        selected_pixels: output.selected_pixels,
    }
}

fn ring_polygon(ring: &Ring) -> Polygon<f64> {
    Polygon::new(LineString::new(ring.coords.clone()), vec![])
}

#[cfg(test)]
mod tests {
    use geo::{Area, Contains, Point};

    use super::*;
    use crate::geom::ring_counts;
    use crate::outline::OutlineBuilder;

    fn assemble_rows(rows: &[&str]) -> (TraceOutput, MultiPolygon<f64>) {
        let h = rows.len() as u32;
        let w = rows[0].len() as u32;
        let bits: Vec<bool> = rows.iter().flat_map(|r| r.chars().map(|c| c == '#')).collect();
        let output = OutlineBuilder::new(w, h).trace(|x, y| bits[(y * w + x) as usize]);
        let geometry = assemble(&output.rings);
        (output, geometry)
    }

    #[test]
    fn no_rings_is_empty_geometry() {
        assert!(assemble(&[]).0.is_empty());
    }

    #[test]
    fn frame_becomes_polygon_with_hole() {
        let (output, geometry) = assemble_rows(&["#####", "#####", "##.##", "#####", "#####"]);
        assert_eq!(ring_counts(&geometry), (1, 1));
        assert!((geometry.unsigned_area() - output.selected_pixels as f64).abs() < 1e-9);
        assert!(!geometry.contains(&Point::new(2.5, 2.5)));
        assert!(geometry.contains(&Point::new(0.5, 0.5)));
    }

    #[test]
    fn island_inside_hole_is_separate_polygon() {
        let (output, geometry) = assemble_rows(&[
            "#######",
            "#.....#",
            "#.###.#",
            "#.#.#.#",
            "#.###.#",
            "#.....#",
            "#######",
        ]);
        assert_eq!(ring_counts(&geometry), (2, 2));
        assert!((geometry.unsigned_area() - output.selected_pixels as f64).abs() < 1e-9);
        assert!(geometry.contains(&Point::new(2.5, 2.5)));
        assert!(!geometry.contains(&Point::new(1.5, 3.5)));
        assert!(!geometry.contains(&Point::new(3.5, 3.5)));
    }

    #[test]
    fn corner_touching_hole_keeps_area() {
        let (output, geometry) = assemble_rows(&["####", "#.##", "##.#", "####"]);
        assert!((geometry.unsigned_area() - output.selected_pixels as f64).abs() < 1e-9);
        assert!(!geometry.contains(&Point::new(1.5, 1.5)));
        assert!(!geometry.contains(&Point::new(2.5, 2.5)));
        assert!(geometry.contains(&Point::new(2.5, 1.5)));
    }

    #[test]
    fn diagonal_pixels_keep_their_area() {
        let (_, geometry) = assemble_rows(&["#..", ".#.", "..#"]);
        assert!((geometry.unsigned_area() - 3.0).abs() < 1e-9);
        for i in 0..3 {
            let centre = i as f64 + 0.5;
            assert!(geometry.contains(&Point::new(centre, centre)));
        }
        assert!(!geometry.contains(&Point::new(1.5, 0.5)));
    }

    #[test]
    fn counts_traced_rings() {
        let (output, _) = assemble_rows(&["###", "#.#", "###"]);
        let assembled = assemble_trace(4, &output);
        assert_eq!(assembled.label, 4);
        assert_eq!((assembled.shells, assembled.holes), (1, 1));
        assert_eq!(assembled.selected_pixels, 8);
        assert!(!assembled.is_empty());
    }
}
