use clap::Parser;
use flexi_logger::Logger;
use img2poly::{bitmap, render, ExtractionConfig, PixelCalibration, Threshold};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "img2poly", about = "Thresholded raster to merged polygon regions")]
struct Cli {
    /// Input image path (PNG, JPEG, TIFF, BMP)
    #[arg(short, long)]
    input: PathBuf,

    /// Tile edge length in full-resolution pixels
    #[arg(long, default_value = "512")]
    tile_size: u32,

    /// Trace each tile at 1/S resolution
    #[arg(long, default_value = "1.0")]
    downsample: f64,

    /// Threshold as label:min:max or label:value (repeatable; bounds accept inf/-inf)
    #[arg(short, long = "threshold", allow_hyphen_values = true)]
    thresholds: Vec<Threshold>,

    /// Treat every distinct non-zero pixel value as its own label
    #[arg(long, conflicts_with = "thresholds")]
    labels: bool,

    /// Otsu auto-threshold as label 1 (the default without -t or --labels)
    #[arg(long, conflicts_with_all = ["thresholds", "labels"])]
    otsu: bool,

    /// With --otsu: select dark pixels instead of bright ones
    #[arg(long)]
    invert: bool,

    /// Drop merged polygons smaller than this (pixels²)
    #[arg(long, default_value = "0")]
    min_area: f64,

    /// Physical pixel size, W or W,H (e.g. µm per pixel)
    #[arg(long, value_parser = parse_pixel_size)]
    pixel_size: Option<PixelCalibration>,

    /// Write all labels as an SVG document
    #[arg(long)]
    svg: Option<PathBuf>,

    /// Write a per-pixel diff PNG of the first label against its selection
    #[arg(long)]
    diff: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_pixel_size(s: &str) -> Result<PixelCalibration, String> {
    let parse = |v: &str| v.trim().parse::<f64>().map_err(|e| format!("'{}': {}", v, e));
    match s.split_once(',') {
        Some((w, h)) => Ok(PixelCalibration { pixel_width: parse(w)?, pixel_height: parse(h)? }),
        None => Ok(PixelCalibration::square(parse(s)?)),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    let _logger = Logger::try_with_env_or_str(level)?.start()?;

    eprintln!();
    eprintln!("  img2poly \u{00b7} {}", cli.input.display());
    eprintln!();

    // ── Load ──────────────────────────────────────────────
    let t_start = Instant::now();
    let gray = bitmap::load_gray(&cli.input)?;
    let (w, h) = gray.dimensions();
    eprintln!("  Load        {}x{} px", w, h);

    // ── Threshold ─────────────────────────────────────────
    let thresholds = if cli.labels {
        bitmap::label_thresholds(&gray)
    } else if cli.otsu || cli.thresholds.is_empty() {
        vec![bitmap::otsu_threshold(&gray, 1, cli.invert)]
    } else {
        cli.thresholds.clone()
    };
    let names: Vec<String> = thresholds.iter().map(|t| t.to_string()).collect();
    eprintln!("  Threshold   {}", names.join(" \u{00b7} "));

    let config = ExtractionConfig {
        min_area: cli.min_area,
        calibration: cli.pixel_size,
        ..ExtractionConfig::with_thresholds(thresholds.clone())
    };

    // ── Trace & merge ─────────────────────────────────────
    let result = img2poly::extract_image(&gray, cli.tile_size, cli.downsample, &config)?;
    let n_tiles = img2poly::tile::grid(w, h, cli.tile_size, cli.downsample).len();
    eprintln!(
        "  Trace       {} tiles of {} px (\u{00d7}{} downsample)",
        n_tiles, cli.tile_size, cli.downsample
    );
    for (label, stats) in &result.stats {
        let geometry = &result.regions[label];
        let (polygons, holes) = img2poly::geom::ring_counts(geometry);
        eprintln!(
            "  Label {:<5} {} px \u{2192} {} shells + {} holes \u{00b7} {} pieces ({} on seams) \u{2192} {} polygons, {} holes, area {:.1}",
            label,
            stats.selected_pixels,
            stats.shells,
            stats.holes,
            stats.pieces,
            stats.seam_pieces,
            polygons,
            holes,
            img2poly::geom::area(geometry),
        );
        if stats.filtered > 0 {
            eprintln!("              {} polygons below min area", stats.filtered);
        }
    }
    for diagnostic in &result.diagnostics {
        eprintln!("  Warning     {}", diagnostic);
    }

    // ── Output ────────────────────────────────────────────
    if let Some(svg_path) = &cli.svg {
        let layers: Vec<(i32, &img2poly::geo::MultiPolygon<f64>)> =
            result.regions.iter().map(|(label, g)| (*label, g)).collect();
        std::fs::write(svg_path, render::to_svg(w, h, &layers))?;
        eprintln!("  SVG         {}", svg_path.display());
    }

    if let Some(diff_path) = &cli.diff {
        if cli.pixel_size.is_some() {
            eprintln!("  Diff        skipped: geometry is in physical units");
        } else if let Some(first) = thresholds.first() {
            let mask = bitmap::selection_mask(&gray, first);
            let comparison = render::compare(&result.regions[&first.label], &mask)?;
            let diff = comparison.diff;
            render::write_png(&comparison.diff_image()?, diff_path)?;
            eprintln!(
                "  Diff        IoU {:.2}%  (overlap={} source_only={} geometry_only={})  {}",
                diff.iou() * 100.0,
                diff.overlap,
                diff.source_only,
                diff.geometry_only,
                diff_path.display()
            );
        }
    }

    eprintln!();
    eprintln!("  \u{2713} {}ms", t_start.elapsed().as_millis());
    eprintln!();

    Ok(())
}
