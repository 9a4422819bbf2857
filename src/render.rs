//! Rendering merged regions back to pixels and to SVG.
//!
//! Regions are converted to kurbo BezPaths, filled with tiny-skia at 1:1
//! scale without anti-aliasing and compared pixel by pixel against the
//! selection mask they were traced from.

use std::fmt::Write as _;
use std::path::Path;

use geo::{LineString, MultiPolygon};
use image::GrayImage;
use kurbo::{BezPath, PathEl, Point};

use crate::error::ExtractError;

/// Fill colours for SVG layers, cycled by label order.
const PALETTE: [&str; 6] = ["#d62728", "#1f77b4", "#2ca02c", "#ff7f0e", "#9467bd", "#8c564b"];

/// Convert a geometry to one BezPath with a closed subpath per ring.
///
/// Fill it with the even-odd rule so interiors cut holes.
pub fn to_bezpath(geometry: &MultiPolygon<f64>) -> BezPath {
    let mut path = BezPath::new();
    for polygon in &geometry.0 {
        push_ring(&mut path, polygon.exterior());
        for hole in polygon.interiors() {
            push_ring(&mut path, hole);
        }
    }
    path
}

fn push_ring(path: &mut BezPath, ring: &LineString<f64>) {
    let mut coords = ring.0.iter();
    let Some(first) = coords.next() else { return };
    path.move_to(Point::new(first.x, first.y));
    for c in coords {
        path.line_to(Point::new(c.x, c.y));
    }
    path.close_path();
}

/// Convert a kurbo `BezPath` to a `tiny_skia::Path`.
fn kurbo_to_tinyskia(bezpath: &BezPath) -> Option<tiny_skia::Path> {
    let mut pb = tiny_skia::PathBuilder::new();
    for el in bezpath.elements() {
        match *el {
            PathEl::MoveTo(p) => pb.move_to(p.x as f32, p.y as f32),
            PathEl::LineTo(p) => pb.line_to(p.x as f32, p.y as f32),
            PathEl::QuadTo(c, p) => pb.quad_to(c.x as f32, c.y as f32, p.x as f32, p.y as f32),
            PathEl::CurveTo(c1, c2, p) => pb.cubic_to(
                c1.x as f32,
                c1.y as f32,
                c2.x as f32,
                c2.y as f32,
                p.x as f32,
                p.y as f32,
            ),
            PathEl::ClosePath => pb.close(),
        }
    }
    pb.finish()
}

/// SVG document with one even-odd filled path per label.
pub fn to_svg(width: u32, height: u32, layers: &[(i32, &MultiPolygon<f64>)]) -> String {
    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = width,
        h = height
    );
    for (i, (label, geometry)) in layers.iter().enumerate() {
        if geometry.0.is_empty() {
            continue;
        }
        let _ = writeln!(
            svg,
            r#"  <path id="label-{}" fill="{}" fill-opacity="0.6" fill-rule="evenodd" d="{}"/>"#,
            label,
            PALETTE[i % PALETTE.len()],
            to_bezpath(geometry).to_svg()
        );
    }
    svg.push_str("</svg>\n");
    svg
}

/// Fill `geometry` into a `width × height` pixmap: black on white.
pub fn rasterize(geometry: &MultiPolygon<f64>, width: u32, height: u32) -> Result<tiny_skia::Pixmap, ExtractError> {
    let mut pixmap = tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| ExtractError::Render(format!("cannot allocate {}x{} pixmap", width, height)))?;
    pixmap.fill(tiny_skia::Color::WHITE);

    let mut black = tiny_skia::Paint::default();
    black.set_color(tiny_skia::Color::BLACK);
    black.anti_alias = false;
    if let Some(path) = kurbo_to_tinyskia(&to_bezpath(geometry)) {
        pixmap.fill_path(
            &path,
            &black,
            tiny_skia::FillRule::EvenOdd,
            tiny_skia::Transform::identity(),
            None,
        );
    }
    Ok(pixmap)
}

/// Pixel agreement between a selection mask and re-rasterized geometry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PixelDiff {
    pub overlap: u64,
    /// Selected in the mask, not covered by the geometry.
    pub source_only: u64,
    /// Covered by the geometry, not selected in the mask.
    pub geometry_only: u64,
}

impl PixelDiff {
    /// Intersection over union; 1.0 when both are empty.
    pub fn iou(&self) -> f64 {
        let union = self.overlap + self.source_only + self.geometry_only;
        if union == 0 {
            1.0
        } else {
            self.overlap as f64 / union as f64
        }
    }

    pub fn is_exact(&self) -> bool {
        self.source_only == 0 && self.geometry_only == 0
    }
}

/// Result of [`compare`]: the counts and the rendered geometry.
pub struct Comparison {
    pub diff: PixelDiff,
    pixmap: tiny_skia::Pixmap,
    mask: GrayImage,
}

/// Compare `geometry` with `mask` (non-zero = selected) at 1:1 scale.
pub fn compare(geometry: &MultiPolygon<f64>, mask: &GrayImage) -> Result<Comparison, ExtractError> {
    let (w, h) = mask.dimensions();
    let pixmap = rasterize(geometry, w, h)?;
    let mut diff = PixelDiff::default();
    for (x, y, px) in mask.enumerate_pixels() {
        let selected = px.0[0] > 0;
        let covered = pixmap.pixels()[pixel_index(x, y, w)].red() < 128;
        match (selected, covered) {
            (true, true) => diff.overlap += 1,
            (true, false) => diff.source_only += 1,
            (false, true) => diff.geometry_only += 1,
            (false, false) => {}
        }
    }
    Ok(Comparison { diff, pixmap, mask: mask.clone() })
}

impl Comparison {
    /// Diff image: green = overlap, blue = mask only, red = geometry only.
    pub fn diff_image(&self) -> Result<tiny_skia::Pixmap, ExtractError> {
        let (w, h) = self.mask.dimensions();
        let mut diff = tiny_skia::Pixmap::new(w, h)
            .ok_or_else(|| ExtractError::Render(format!("cannot allocate {}x{} pixmap", w, h)))?;
        diff.fill(tiny_skia::Color::WHITE);
        for (x, y, px) in self.mask.enumerate_pixels() {
            let i = pixel_index(x, y, w);
            let selected = px.0[0] > 0;
            let covered = self.pixmap.pixels()[i].red() < 128;
            let (r, g, b) = match (selected, covered) {
                (true, true) => (0, 128, 0),
                (true, false) => (0, 0, 255),
                (false, true) => (255, 0, 0),
                (false, false) => continue,
            };
            if let Some(color) = tiny_skia::PremultipliedColorU8::from_rgba(r, g, b, 255) {
                diff.pixels_mut()[i] = color;
            }
        }
        Ok(diff)
    }
}

/// Row-major index of `(x, y)` in a buffer `width` pixels wide.
#[inline]
fn pixel_index(x: u32, y: u32, width: u32) -> usize {
    y as usize * width as usize + x as usize
}

/// Encode a pixmap to PNG bytes.
fn encode_png(pixmap: &tiny_skia::Pixmap) -> Result<Vec<u8>, ExtractError> {
    let mut buf = Vec::new();
    let mut encoder = png::Encoder::new(&mut buf, pixmap.width(), pixmap.height());
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder
        .write_header()
        .map_err(|e| ExtractError::Render(e.to_string()))?;
    writer
        .write_image_data(pixmap.data())
        .map_err(|e| ExtractError::Render(e.to_string()))?;
    drop(writer);
    Ok(buf)
}

pub fn write_png(pixmap: &tiny_skia::Pixmap, path: &Path) -> Result<(), ExtractError> {
    std::fs::write(path, encode_png(pixmap)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use geo::polygon;
    use image::Luma;

    use super::*;

    fn frame() -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon!(
            exterior: [(x: 1.0, y: 1.0), (x: 5.0, y: 1.0), (x: 5.0, y: 5.0), (x: 1.0, y: 5.0)],
            interiors: [[(x: 2.0, y: 2.0), (x: 4.0, y: 2.0), (x: 4.0, y: 4.0), (x: 2.0, y: 4.0)]],
        )])
    }

    fn frame_mask() -> GrayImage {
        GrayImage::from_fn(6, 6, |x, y| {
            let outer = (1..5).contains(&x) && (1..5).contains(&y);
            let inner = (2..4).contains(&x) && (2..4).contains(&y);
            Luma([if outer && !inner { 255 } else { 0 }])
        })
    }

    #[test]
    fn bezpath_has_subpath_per_ring() {
        let path = to_bezpath(&frame());
        let moves = path.elements().iter().filter(|el| matches!(el, PathEl::MoveTo(_))).count();
        let closes = path.elements().iter().filter(|el| matches!(el, PathEl::ClosePath)).count();
        assert_eq!((moves, closes), (2, 2));
        assert!(to_bezpath(&MultiPolygon::new(vec![])).elements().is_empty());
    }

    #[test]
    fn frame_rasterizes_exactly() {
        let comparison = compare(&frame(), &frame_mask()).unwrap();
        assert_eq!(comparison.diff.overlap, 12);
        assert!(comparison.diff.is_exact());
        assert_eq!(comparison.diff.iou(), 1.0);
    }

    #[test]
    fn missing_geometry_shows_as_source_only() {
        let comparison = compare(&MultiPolygon::new(vec![]), &frame_mask()).unwrap();
        assert_eq!(comparison.diff.source_only, 12);
        assert_eq!(comparison.diff.iou(), 0.0);
        let diff = comparison.diff_image().unwrap();
        assert_eq!(diff.pixels()[7].blue(), 255);
    }

    #[test]
    fn svg_has_one_path_per_nonempty_label() {
        let geometry = frame();
        let empty = MultiPolygon::new(vec![]);
        let svg = to_svg(6, 6, &[(1, &geometry), (2, &empty)]);
        assert!(svg.starts_with("<svg"));
        assert_eq!(svg.matches("<path").count(), 1);
        assert!(svg.contains(r#"id="label-1""#));
        assert!(svg.contains("evenodd"));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn pixel_index_does_not_wrap_on_huge_masks() {
        assert_eq!(pixel_index(3, 2, 6), 15);
        assert_eq!(pixel_index(1, 70_000, 70_000), 4_900_000_001);
    }

    #[test]
    fn png_encoding_produces_signature() {
        let pixmap = rasterize(&frame(), 6, 6).unwrap();
        let bytes = encode_png(&pixmap).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }
}
