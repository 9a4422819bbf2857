//! img2poly: thresholded raster tiles → merged polygon regions.
//!
//! Every tile is thresholded once per label, its selection boundaries are
//! traced into shell and hole rings, and the rings are assembled into valid
//! polygons. Tiles are processed independently and in parallel; the pieces
//! of each label are then stitched across tile seams into one geometry.
//!
//! # Example
//!
//! ```no_run
//! use img2poly::tile::FloatRaster;
//! use img2poly::{extract_image, ExtractionConfig, Threshold};
//!
//! let probability = FloatRaster::from_fn(2048, 2048, |x, y| ((x ^ y) % 256) as f32 / 255.0);
//! let config = ExtractionConfig::with_thresholds(vec![Threshold::above(1, 0.5)]);
//! let result = extract_image(&probability, 512, 1.0, &config)?;
//! // result.regions[&1] is a geo::MultiPolygon in full-resolution pixels
//! # Ok::<(), img2poly::ExtractError>(())
//! ```

#![forbid(unsafe_code)]

mod config;

pub mod assemble;
pub mod bitmap;
pub mod error;
pub mod geom;
pub mod mapper;
pub mod merge;
pub mod outline;
pub mod render;
pub mod threshold;
pub mod tile;

// Re-export geo and kurbo so downstream users get the versions used by
// ExtractionResult and render::to_bezpath.
pub use geo;
pub use kurbo;

pub use config::ExtractionConfig;
pub use error::ExtractError;
pub use mapper::{CoordinateMapper, PixelCalibration};
pub use threshold::Threshold;
pub use tile::{PixelSource, TileDescriptor};

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use geo::{Area, BooleanOps, MultiPolygon};
use log::{debug, info, warn};
use rayon::prelude::*;

use assemble::{assemble_trace, AssembledGeometry};
use merge::SeamMerger;
use outline::OutlineBuilder;
use tile::TileView;

/// A problem that was worked around instead of aborting the extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// The tile's pixels could not be read; it contributes nothing.
    MissingTile { x: u32, y: u32, reason: String },
    /// Traced shell-minus-hole area differs from the selected pixel count.
    AreaMismatch {
        label: i32,
        x: u32,
        y: u32,
        selected_pixels: u64,
        traced_area: f64,
    },
    /// A seam piece could not be unioned even after repair and was left out.
    /// `piece` counts among the label's seam pieces, in input order.
    UnionFailed { label: i32, piece: usize, area: f64 },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::MissingTile { x, y, reason } => {
                write!(f, "tile ({}, {}) skipped: {}", x, y, reason)
            }
            Diagnostic::AreaMismatch { label, x, y, selected_pixels, traced_area } => write!(
                f,
                "label {} in tile ({}, {}): traced area {} but {} pixels selected",
                label, x, y, traced_area, selected_pixels
            ),
            Diagnostic::UnionFailed { label, piece, area } => {
                write!(f, "label {}: seam piece {} (area {:.3}) excluded", label, piece, area)
            }
        }
    }
}

/// Per-label counters gathered along the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LabelStats {
    /// Tiles in which the label selected at least one pixel.
    pub tiles: usize,
    pub shells: usize,
    pub holes: usize,
    pub selected_pixels: u64,
    /// Polygon pieces handed to the merge.
    pub pieces: usize,
    /// Pieces that touched a seam and were unioned.
    pub seam_pieces: usize,
    /// Polygons dropped by `min_area`.
    pub filtered: usize,
}

/// Merged geometry per label.
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    /// One entry per configured label, empty when nothing was selected.
    /// Full-resolution pixel coordinates unless a calibration was set.
    pub regions: BTreeMap<i32, MultiPolygon<f64>>,
    pub stats: BTreeMap<i32, LabelStats>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ExtractionResult {
    pub fn region(&self, label: i32) -> Option<&MultiPolygon<f64>> {
        self.regions.get(&label)
    }

    pub fn is_empty(&self) -> bool {
        self.regions.values().all(|g| g.0.is_empty())
    }
}

/// Everything one tile contributed.
struct TileOutput {
    labels: Vec<AssembledGeometry>,
    diagnostics: Vec<Diagnostic>,
}

/// Full pipeline: tiles → per-label merged regions.
///
/// `source_for` supplies each tile's pixels at the tile's own resolution
/// (`tile.pixel_size()`). A tile whose source fails is left out of the merge
/// and reported as [`Diagnostic::MissingTile`].
///
/// Empty inputs (no tiles, no thresholds, zero-sized tiles) give an empty
/// result. A malformed configuration does not: a NaN bound, `min > max`, a
/// repeated label or a bad seam tolerance or calibration returns
/// [`ExtractError::InvalidThreshold`] before any tile is read.
pub fn extract_regions<S, F>(
    tiles: &[TileDescriptor],
    source_for: F,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, ExtractError>
where
    S: PixelSource,
    F: Fn(&TileDescriptor) -> Result<S, ExtractError> + Sync,
{
    config.validate()?;
    let t_start = Instant::now();
    let debug_rings = std::env::var_os("IMG2POLY_DEBUG_RINGS").is_some();

    let mut result = ExtractionResult::default();
    for threshold in &config.thresholds {
        result.regions.insert(threshold.label, MultiPolygon::new(vec![]));
        result.stats.insert(threshold.label, LabelStats::default());
    }
    if config.thresholds.is_empty() || tiles.is_empty() {
        return Ok(result);
    }

    // ── Trace ─────────────────────────────────────────────
    let outputs: Vec<TileOutput> = tiles
        .par_iter()
        .filter(|tile| !tile.is_empty())
        .map(|tile| process_tile(tile, &source_for, config, debug_rings))
        .collect();
    debug!("traced {} tiles in {}ms", outputs.len(), t_start.elapsed().as_millis());

    let mut pieces: BTreeMap<i32, Vec<MultiPolygon<f64>>> = BTreeMap::new();
    for output in outputs {
        result.diagnostics.extend(output.diagnostics);
        for assembled in output.labels {
            if let Some(stats) = result.stats.get_mut(&assembled.label) {
                stats.tiles += (assembled.selected_pixels > 0) as usize;
                stats.shells += assembled.shells;
                stats.holes += assembled.holes;
                stats.selected_pixels += assembled.selected_pixels;
            }
            if !assembled.is_empty() {
                pieces.entry(assembled.label).or_default().push(assembled.geometry);
            }
        }
    }

    // ── Merge ─────────────────────────────────────────────
    let t_merge = Instant::now();
    let merger = SeamMerger::new(tiles)
        .with_tolerance(config.seam_tolerance)
        .with_snap_precision(config.snap_precision);
    for (label, parts) in pieces {
        let merged = merger.merge(label, &parts);
        result.diagnostics.extend(merged.diagnostics);

        let mut geometry = merged.geometry;
        let before = geometry.0.len();
        if config.min_area > 0.0 {
            geometry.0.retain(|p| p.unsigned_area() >= config.min_area);
        }
        if let Some(calibration) = &config.calibration {
            geometry = calibration.to_physical(&geometry);
        }

        if let Some(stats) = result.stats.get_mut(&label) {
            stats.pieces = merged.pieces;
            stats.seam_pieces = merged.seam_pieces;
            stats.filtered = before - geometry.0.len();
        }
        result.regions.insert(label, geometry);
    }
    debug!("merged {} labels in {}ms", result.regions.len(), t_merge.elapsed().as_millis());

    info!(
        "extracted {} labels from {} tiles ({} diagnostics) in {}ms",
        result.regions.len(),
        tiles.len(),
        result.diagnostics.len(),
        t_start.elapsed().as_millis()
    );
    Ok(result)
}

/// Convenience: split one in-memory source into a `tile_size` grid and run
/// [`extract_regions`] over it.
pub fn extract_image<S: PixelSource + ?Sized>(
    source: &S,
    tile_size: u32,
    downsample: f64,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, ExtractError> {
    let tiles = tile::grid(source.width(), source.height(), tile_size, downsample);
    extract_regions(&tiles, |tile| Ok(TileView::new(source, *tile)), config)
}

fn process_tile<S, F>(tile: &TileDescriptor, source_for: &F, config: &ExtractionConfig, debug_rings: bool) -> TileOutput
where
    S: PixelSource,
    F: Fn(&TileDescriptor) -> Result<S, ExtractError>,
{
    let source = match source_for(tile) {
        Ok(source) => source,
        Err(e) => {
            warn!("tile ({}, {}) skipped: {}", tile.x, tile.y, e);
            return TileOutput {
                labels: vec![],
                diagnostics: vec![Diagnostic::MissingTile {
                    x: tile.x,
                    y: tile.y,
                    reason: e.to_string(),
                }],
            };
        }
    };

    let mapper = CoordinateMapper::for_tile(tile);
    let (tw, th) = tile.pixel_size();
    let (w, h) = (source.width().min(tw), source.height().min(th));
    let builder = if mapper.is_translation() {
        OutlineBuilder::new(w, h).with_offset(tile.x as f64, tile.y as f64)
    } else {
        OutlineBuilder::new(w, h)
    };

    let mut labels = Vec::with_capacity(config.thresholds.len());
    let mut diagnostics = Vec::new();
    for threshold in &config.thresholds {
        let output = builder.trace(|x, y| threshold.selects(source.value(x, y)));

        if debug_rings {
            for ring in &output.rings {
                debug!(
                    "tile ({}, {}) label {}: {:?} with {} vertices, area {}",
                    tile.x,
                    tile.y,
                    threshold.label,
                    ring.kind,
                    ring.coords.len(),
                    ring.signed_area()
                );
            }
        }
        if config.check_area && !output.area_matches() {
            warn!(
                "tile ({}, {}) label {}: traced area {} != {} selected pixels",
                tile.x,
                tile.y,
                threshold.label,
                output.traced_area(),
                output.selected_pixels
            );
            diagnostics.push(Diagnostic::AreaMismatch {
                label: threshold.label,
                x: tile.x,
                y: tile.y,
                selected_pixels: output.selected_pixels,
                traced_area: output.traced_area(),
            });
        }

        let mut assembled = assemble_trace(threshold.label, &output);
        if !mapper.is_translation() && !assembled.is_empty() {
            // The last downsampled pixel of a row or column can reach past
            // the tile edge.
            let mapped = mapper.apply(&assembled.geometry);
            assembled.geometry = mapped.intersection(&MultiPolygon::new(vec![tile.rect().to_polygon()]));
        }
        labels.push(assembled);
    }

    TileOutput { labels, diagnostics }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::FloatRaster;

    fn checker(size: u32, cell: u32) -> FloatRaster {
        FloatRaster::from_fn(size, size, |x, y| ((x / cell + y / cell) % 2) as f32)
    }

    #[test]
    fn every_label_gets_an_entry() {
        let config = ExtractionConfig::with_thresholds(vec![Threshold::exact(1, 1.0), Threshold::exact(7, 7.0)]);
        let result = extract_image(&checker(8, 2), 4, 1.0, &config).unwrap();
        assert_eq!(result.regions.keys().copied().collect::<Vec<_>>(), vec![1, 7]);
        assert!(result.region(7).is_some_and(|g| g.0.is_empty()));
        assert!((result.regions[&1].unsigned_area() - 32.0).abs() < 1e-9);
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn stats_follow_the_pipeline() {
        let source = FloatRaster::from_fn(8, 4, |x, y| (y == 1 && (2..6).contains(&x)) as u8 as f32);
        let config = ExtractionConfig::with_thresholds(vec![Threshold::exact(1, 1.0)]);
        let result = extract_image(&source, 4, 1.0, &config).unwrap();
        let stats = result.stats[&1];
        assert_eq!(stats.tiles, 2);
        assert_eq!(stats.shells, 2);
        assert_eq!(stats.selected_pixels, 4);
        assert_eq!((stats.pieces, stats.seam_pieces), (2, 2));
        assert_eq!(result.regions[&1].0.len(), 1);
    }

    #[test]
    fn min_area_applies_after_merge() {
        // A 2-pixel bar split 1 + 1 by the seam survives a min_area of 2.
        let source = FloatRaster::from_fn(8, 4, |x, y| {
            let bar = y == 1 && (x == 3 || x == 4);
            let speck = y == 3 && x == 0;
            (bar || speck) as u8 as f32
        });
        let config = ExtractionConfig {
            min_area: 1.5,
            ..ExtractionConfig::with_thresholds(vec![Threshold::exact(1, 1.0)])
        };
        let result = extract_image(&source, 4, 1.0, &config).unwrap();
        assert_eq!(result.regions[&1].0.len(), 1);
        assert_eq!(result.stats[&1].filtered, 1);
        assert!((result.regions[&1].unsigned_area() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn calibration_scales_output() {
        let source = FloatRaster::from_fn(4, 4, |_, _| 1.0);
        let config = ExtractionConfig {
            calibration: Some(PixelCalibration { pixel_width: 0.5, pixel_height: 2.0 }),
            ..ExtractionConfig::with_thresholds(vec![Threshold::exact(1, 1.0)])
        };
        let result = extract_image(&source, 4, 1.0, &config).unwrap();
        assert!((result.regions[&1].unsigned_area() - 16.0).abs() < 1e-9);
    }

    #[test]
    fn invalid_config_is_an_error() {
        let nan = ExtractionConfig::with_thresholds(vec![Threshold::range(1, f64::NAN, 1.0)]);
        assert!(extract_image(&checker(4, 1), 4, 1.0, &nan).is_err());

        let inverted = ExtractionConfig::with_thresholds(vec![Threshold::range(1, 2.0, 1.0)]);
        let err = extract_regions(&[], |tile: &TileDescriptor| Ok(checker(tile.width, 1)), &inverted).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidThreshold(_)));
    }

    #[test]
    fn diagnostics_display() {
        let d = Diagnostic::MissingTile { x: 4, y: 0, reason: "gone".into() };
        assert_eq!(d.to_string(), "tile (4, 0) skipped: gone");
    }
}
