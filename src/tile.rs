//! Pixel access and tile layout.
//!
//! The extraction core only reads pixels through [`PixelSource`]; decoding,
//! pyramids and caching belong to whoever implements it.

use geo::{Coord, Rect};
use image::GrayImage;

/// Read-only scalar raster.
///
/// Callers never ask for coordinates outside `[0, width) × [0, height)`.
pub trait PixelSource: Sync {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn value(&self, x: u32, y: u32) -> f64;
}

impl<S: PixelSource + ?Sized> PixelSource for &S {
    fn width(&self) -> u32 {
        (**self).width()
    }
    fn height(&self) -> u32 {
        (**self).height()
    }
    fn value(&self, x: u32, y: u32) -> f64 {
        (**self).value(x, y)
    }
}

impl PixelSource for GrayImage {
    fn width(&self) -> u32 {
        self.dimensions().0
    }
    fn height(&self) -> u32 {
        self.dimensions().1
    }
    fn value(&self, x: u32, y: u32) -> f64 {
        self.get_pixel(x, y).0[0] as f64
    }
}

/// Row-major `f32` buffer, e.g. a probability map from a pixel classifier.
#[derive(Debug, Clone)]
pub struct FloatRaster {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl FloatRaster {
    /// Returns `None` when `data.len() != width * height`.
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> Option<Self> {
        if data.len() != width as usize * height as usize {
            return None;
        }
        Some(Self { width, height, data })
    }

    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> f32) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self { width, height, data }
    }
}

impl PixelSource for FloatRaster {
    fn width(&self) -> u32 {
        self.width
    }
    fn height(&self) -> u32 {
        self.height
    }
    fn value(&self, x: u32, y: u32) -> f64 {
        self.data[y as usize * self.width as usize + x as usize] as f64
    }
}

/// An independently processed rectangle of the full-resolution image.
///
/// `x`, `y`, `width` and `height` are in full-resolution pixels; the tile's
/// own pixels are `downsample` full-resolution pixels wide.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileDescriptor {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub downsample: f64,
}

impl TileDescriptor {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height, downsample: 1.0 }
    }

    pub fn with_downsample(mut self, downsample: f64) -> Self {
        self.downsample = downsample;
        self
    }

    /// Size of the tile in its own (downsampled) pixels.
    pub fn pixel_size(&self) -> (u32, u32) {
        (
            (self.width as f64 / self.downsample).ceil() as u32,
            (self.height as f64 / self.downsample).ceil() as u32,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || !(self.downsample > 0.0)
    }

    /// The tile's area in full-resolution image space.
    pub fn rect(&self) -> Rect<f64> {
        Rect::new(
            Coord { x: self.x as f64, y: self.y as f64 },
            Coord {
                x: (self.x + self.width) as f64,
                y: (self.y + self.height) as f64,
            },
        )
    }
}

/// Non-overlapping, gap-free grid of tiles covering `width × height`.
///
/// Edge tiles are clipped to the image. `tile_size` is in full-resolution
/// pixels.
pub fn grid(width: u32, height: u32, tile_size: u32, downsample: f64) -> Vec<TileDescriptor> {
    if width == 0 || height == 0 || tile_size == 0 {
        return vec![];
    }
    let mut tiles = Vec::new();
    let mut y = 0;
    while y < height {
        let h = tile_size.min(height - y);
        let mut x = 0;
        while x < width {
            let w = tile_size.min(width - x);
            tiles.push(TileDescriptor::new(x, y, w, h).with_downsample(downsample));
            x += w;
        }
        y += h;
    }
    tiles
}

/// Window of a larger source seen through one tile.
///
/// Pixels are sampled nearest-neighbour at the tile's downsample, so a
/// full-resolution source can stand in for a pyramid level.
pub struct TileView<'a, S: PixelSource + ?Sized> {
    source: &'a S,
    tile: TileDescriptor,
    width: u32,
    height: u32,
}

impl<'a, S: PixelSource + ?Sized> TileView<'a, S> {
    pub fn new(source: &'a S, tile: TileDescriptor) -> Self {
        let (mut width, mut height) = tile.pixel_size();
        // Never sample past the end of the source.
        while width > 0 && tile.x as f64 + (width - 1) as f64 * tile.downsample >= source.width() as f64 {
            width -= 1;
        }
        while height > 0
            && tile.y as f64 + (height - 1) as f64 * tile.downsample >= source.height() as f64
        {
            height -= 1;
        }
        Self { source, tile, width, height }
    }
}

impl<S: PixelSource + ?Sized> PixelSource for TileView<'_, S> {
    fn width(&self) -> u32 {
        self.width
    }
    fn height(&self) -> u32 {
        self.height
    }
    fn value(&self, x: u32, y: u32) -> f64 {
        let sx = (self.tile.x as f64 + x as f64 * self.tile.downsample).floor() as u32;
        let sy = (self.tile.y as f64 + y as f64 * self.tile.downsample).floor() as u32;
        self.source.value(sx, sy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_covers_image_without_overlap() {
        let tiles = grid(10, 7, 4, 1.0);
        assert_eq!(tiles.len(), 3 * 2);
        let covered: u32 = tiles.iter().map(|t| t.width * t.height).sum();
        assert_eq!(covered, 70);
        assert!(tiles.iter().all(|t| t.x + t.width <= 10 && t.y + t.height <= 7));
        assert_eq!(tiles.last().map(|t| (t.width, t.height)), Some((2, 3)));
    }

    #[test]
    fn grid_of_empty_image_is_empty() {
        assert!(grid(0, 10, 4, 1.0).is_empty());
        assert!(grid(10, 10, 0, 1.0).is_empty());
    }

    #[test]
    fn view_reads_through_offset() {
        let source = FloatRaster::from_fn(8, 8, |x, y| (y * 8 + x) as f32);
        let view = TileView::new(&source, TileDescriptor::new(4, 2, 4, 4));
        assert_eq!((view.width(), view.height()), (4, 4));
        assert_eq!(view.value(0, 0), (2 * 8 + 4) as f64);
        assert_eq!(view.value(3, 3), (5 * 8 + 7) as f64);
    }

    #[test]
    fn downsampled_view_samples_every_other_pixel() {
        let source = FloatRaster::from_fn(8, 8, |x, y| (y * 8 + x) as f32);
        let tile = TileDescriptor::new(0, 0, 8, 8).with_downsample(2.0);
        let view = TileView::new(&source, tile);
        assert_eq!((view.width(), view.height()), (4, 4));
        assert_eq!(view.value(1, 1), (2 * 8 + 2) as f64);
    }

    #[test]
    fn downsampled_tile_can_overhang_its_rect() {
        let tile = TileDescriptor::new(5, 0, 5, 5).with_downsample(2.0);
        assert_eq!(tile.pixel_size(), (3, 3));
        let rect = tile.rect();
        assert_eq!((rect.min().x, rect.max().x), (5.0, 10.0));
        // Three pixels of two reach 11, one past the tile.
        assert!(tile.x as f64 + 3.0 * tile.downsample > rect.max().x);
    }

    #[test]
    fn float_raster_rejects_wrong_length() {
        assert!(FloatRaster::new(2, 2, vec![0.0; 3]).is_none());
        assert!(FloatRaster::new(2, 2, vec![0.0; 4]).is_some());
    }
}
