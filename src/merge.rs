//! Stitching per-tile geometry across tile seams.
//!
//! Unioning every polygon of a label is superlinear and dominates runtime on
//! large images. Only pieces that touch an interior tile boundary can need
//! it, so those are found with a bounding-box index and unioned on their
//! own. Everything else passes through untouched.

use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};

use geo::orient::{Direction, Orient};
use geo::{Area, BooleanOps, MultiPolygon, Polygon};
use log::{debug, warn};
use rayon::prelude::*;
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, RTreeObject, AABB};

use crate::geom::{bounds, reduce_pairwise, snap_to_grid};
use crate::tile::TileDescriptor;
use crate::Diagnostic;

/// Half-width of the query band around a seam, in image pixels.
pub const DEFAULT_SEAM_TOLERANCE: f64 = 1e-6;

/// Grid used to repair pieces whose union failed.
pub const DEFAULT_SNAP_PRECISION: f64 = 1e-6;

/// A piece's bounding box tagged with its index.
type IndexedPiece = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// Interior tile boundaries of a tile layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Seams {
    /// Distinct vertical cut lines, ascending, without the outer edges.
    pub x_cuts: Vec<f64>,
    /// Distinct horizontal cut lines, ascending, without the outer edges.
    pub y_cuts: Vec<f64>,
    /// `(min, max)` corners of the area the tiles cover.
    pub extent: Option<([f64; 2], [f64; 2])>,
}

impl Seams {
    pub fn from_tiles(tiles: &[TileDescriptor]) -> Self {
        let tiles: Vec<&TileDescriptor> = tiles.iter().filter(|t| !t.is_empty()).collect();
        if tiles.is_empty() {
            return Self::default();
        }
        let mut xs = BTreeSet::new();
        let mut ys = BTreeSet::new();
        for tile in &tiles {
            xs.insert(tile.x);
            xs.insert(tile.x + tile.width);
            ys.insert(tile.y);
            ys.insert(tile.y + tile.height);
        }
        let extent = match (xs.first(), ys.first(), xs.last(), ys.last()) {
            (Some(&x0), Some(&y0), Some(&x1), Some(&y1)) => {
                Some(([x0 as f64, y0 as f64], [x1 as f64, y1 as f64]))
            }
            _ => None,
        };
        Self {
            x_cuts: interior(&xs),
            y_cuts: interior(&ys),
            extent,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.x_cuts.is_empty() && self.y_cuts.is_empty()
    }
}

fn interior(cuts: &BTreeSet<u32>) -> Vec<f64> {
    let n = cuts.len();
    cuts.iter()
        .enumerate()
        .filter(|&(i, _)| i != 0 && i + 1 != n)
        .map(|(_, &c)| c as f64)
        .collect()
}

/// Result of merging one label.
#[derive(Debug, Clone)]
pub struct LabelMerge {
    pub geometry: MultiPolygon<f64>,
    /// Polygon pieces that went in.
    pub pieces: usize,
    /// Pieces that touched a seam and were unioned.
    pub seam_pieces: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Merges the per-tile geometries of a label across the seams of one tile
/// layout.
#[derive(Debug, Clone)]
pub struct SeamMerger {
    seams: Seams,
    tolerance: f64,
    snap_precision: f64,
}

impl SeamMerger {
    pub fn new(tiles: &[TileDescriptor]) -> Self {
        Self {
            seams: Seams::from_tiles(tiles),
            tolerance: DEFAULT_SEAM_TOLERANCE,
            snap_precision: DEFAULT_SNAP_PRECISION,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_snap_precision(mut self, precision: f64) -> Self {
        self.snap_precision = precision;
        self
    }

    pub fn seams(&self) -> &Seams {
        &self.seams
    }

    /// Merge every tile's geometry for `label` into one normalized geometry.
    pub fn merge(&self, label: i32, parts: &[MultiPolygon<f64>]) -> LabelMerge {
        let (pieces, owners): (Vec<Polygon<f64>>, Vec<usize>) = parts
            .iter()
            .enumerate()
            .flat_map(|(owner, mp)| mp.0.iter().map(move |p| (p.clone(), owner)))
            .unzip();
        let count = pieces.len();
        let mut diagnostics = Vec::new();

        if count <= 1 {
            return LabelMerge {
                geometry: MultiPolygon::new(pieces).orient(Direction::Default),
                pieces: count,
                seam_pieces: 0,
                diagnostics,
            };
        }

        let flagged = self.seam_pieces(&pieces, &owners);
        let mut touching = Vec::new();
        let mut polygons = Vec::with_capacity(count);
        for (piece, on_seam) in pieces.into_iter().zip(&flagged) {
            if *on_seam {
                touching.push(piece);
            } else {
                polygons.push(piece);
            }
        }
        let seam_pieces = touching.len();
        debug!(
            "label {}: {} pieces, {} on seams ({} x-cuts, {} y-cuts)",
            label,
            count,
            seam_pieces,
            self.seams.x_cuts.len(),
            self.seams.y_cuts.len()
        );

        if !touching.is_empty() {
            let union = self.union(label, touching, &mut diagnostics);
            polygons.extend(union.0);
        }

        LabelMerge {
            geometry: MultiPolygon::new(polygons).orient(Direction::Default),
            pieces: count,
            seam_pieces,
            diagnostics,
        }
    }

    /// Flag the pieces that need the union.
    ///
    /// A piece is flagged when one seam query returns it together with
    /// another piece, when more than one seam query returns it, or when its
    /// bounding box overlaps (not just touches) that of a piece from another
    /// part. Pieces with non-finite bounds or area are always flagged so the
    /// union can reject them.
    fn seam_pieces(&self, pieces: &[Polygon<f64>], owners: &[usize]) -> Vec<bool> {
        let n = pieces.len();
        let mut flagged = vec![false; n];
        let mut lo = [f64::INFINITY; 2];
        let mut hi = [f64::NEG_INFINITY; 2];
        if let Some((min, max)) = self.seams.extent {
            lo = min;
            hi = max;
        }

        let mut entries: Vec<IndexedPiece> = Vec::with_capacity(n);
        for (i, piece) in pieces.iter().enumerate() {
            let Some(rect) = bounds(piece) else { continue };
            let (min, max) = (rect.min(), rect.max());
            // Bounds can skip a NaN vertex, the area cannot.
            let finite = [min.x, min.y, max.x, max.y].iter().all(|v| v.is_finite());
            if !finite || !piece.unsigned_area().is_finite() {
                flagged[i] = true;
                continue;
            }
            lo = [lo[0].min(min.x), lo[1].min(min.y)];
            hi = [hi[0].max(max.x), hi[1].max(max.y)];
            entries.push(GeomWithData::new(
                Rectangle::from_corners([min.x, min.y], [max.x, max.y]),
                i,
            ));
        }
        let envelopes: Vec<(usize, AABB<[f64; 2]>)> = entries.iter().map(|e| (e.data, e.envelope())).collect();
        let tree = RTree::bulk_load(entries);
        let tol = self.tolerance;

        if !self.seams.is_empty() {
            let bands: Vec<AABB<[f64; 2]>> = self
                .seams
                .x_cuts
                .iter()
                .map(|&x| AABB::from_corners([x - tol, lo[1] - tol], [x + tol, hi[1] + tol]))
                .chain(
                    self.seams
                        .y_cuts
                        .iter()
                        .map(|&y| AABB::from_corners([lo[0] - tol, y - tol], [hi[0] + tol, y + tol])),
                )
                .collect();

            let hits: Vec<Vec<usize>> = bands
                .par_iter()
                .map(|band| tree.locate_in_envelope_intersecting(band).map(|e| e.data).collect())
                .collect();

            let mut seen = vec![0u32; n];
            for hit in &hits {
                for &i in hit {
                    seen[i] += 1;
                    flagged[i] |= hit.len() > 1;
                }
            }
            for (flag, &count) in flagged.iter_mut().zip(&seen) {
                *flag |= count > 1;
            }
        }

        // Parts are expected to tile the plane. Overlap between parts means
        // geometry was supplied twice, e.g. a merged result merged again.
        let overlapping: Vec<usize> = envelopes
            .par_iter()
            .filter(|(i, envelope)| {
                tree.locate_in_envelope_intersecting(envelope)
                    .any(|other| owners[other.data] != owners[*i] && overlap(envelope, &other.envelope(), tol))
            })
            .map(|(i, _)| *i)
            .collect();
        for i in overlapping {
            flagged[i] = true;
        }
        flagged
    }

    /// Union `pieces`, repairing or excluding pieces the overlay rejects.
    fn union(&self, label: i32, pieces: Vec<Polygon<f64>>, diagnostics: &mut Vec<Diagnostic>) -> MultiPolygon<f64> {
        let parts: Vec<MultiPolygon<f64>> = pieces.into_iter().map(|p| MultiPolygon::new(vec![p])).collect();
        if let Some(union) = reduce_pairwise(parts.clone(), guarded_union) {
            return union;
        }

        warn!(
            "label {}: seam union failed, retrying on a {} grid",
            label, self.snap_precision
        );
        let snapped: Vec<MultiPolygon<f64>> = parts
            .iter()
            .map(|p| snap_to_grid(p, self.snap_precision))
            .collect();
        if let Some(union) = reduce_pairwise(snapped.clone(), guarded_union) {
            return union;
        }

        warn!("label {}: snapped union failed, merging piece by piece", label);
        let mut acc = MultiPolygon::new(vec![]);
        for (piece, (raw, repaired)) in parts.iter().zip(&snapped).enumerate() {
            match guarded_union(&acc, raw).or_else(|| guarded_union(&acc, repaired)) {
                Some(next) => acc = next,
                None => {
                    let area = raw.unsigned_area();
                    warn!("label {}: excluding seam piece {} (area {:.3})", label, piece, area);
                    diagnostics.push(Diagnostic::UnionFailed { label, piece, area });
                }
            }
        }
        acc
    }
}

/// Whether two boxes share more than an edge or a corner.
fn overlap(a: &AABB<[f64; 2]>, b: &AABB<[f64; 2]>, tol: f64) -> bool {
    let (al, au, bl, bu) = (a.lower(), a.upper(), b.lower(), b.upper());
    let dx = au[0].min(bu[0]) - al[0].max(bl[0]);
    let dy = au[1].min(bu[1]) - al[1].max(bl[1]);
    dx > tol && dy > tol
}

/// Union that reports failure instead of panicking or returning nonsense.
///
/// A union can never be smaller than its larger operand nor larger than
/// both together. Operands with non-finite area are refused outright.
fn guarded_union(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> Option<MultiPolygon<f64>> {
    let (area_a, area_b) = (a.unsigned_area(), b.unsigned_area());
    if !area_a.is_finite() || !area_b.is_finite() {
        return None;
    }
    let result = panic::catch_unwind(AssertUnwindSafe(|| a.union(b))).ok()?;
    let area = result.unsigned_area();
    let slack = 1e-9 * (area_a + area_b).max(1.0);
    if !area.is_finite() || area > area_a + area_b + slack || area + slack < area_a.max(area_b) {
        return None;
    }
    Some(result)
}
