//! Tile-local pixel space → full-resolution image space → physical units.

use geo::{Coord, MapCoords, MultiPolygon};

use crate::tile::TileDescriptor;

/// `(x, y) → (x·s + ox, y·s + oy)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    pub downsample: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl CoordinateMapper {
    pub const IDENTITY: Self = Self { downsample: 1.0, offset_x: 0.0, offset_y: 0.0 };

    /// Maps a tile's own pixel grid into full-resolution image space.
    pub fn for_tile(tile: &TileDescriptor) -> Self {
        Self {
            downsample: tile.downsample,
            offset_x: tile.x as f64,
            offset_y: tile.y as f64,
        }
    }

    /// True when the mapping is a pure translation, which the outline
    /// builder can apply while emitting vertices.
    pub fn is_translation(&self) -> bool {
        self.downsample == 1.0
    }

    #[inline]
    pub fn map(&self, x: f64, y: f64) -> Coord<f64> {
        Coord {
            x: x * self.downsample + self.offset_x,
            y: y * self.downsample + self.offset_y,
        }
    }

    pub fn apply(&self, geometry: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        geometry.map_coords(|c| self.map(c.x, c.y))
    }
}

/// Physical size of one full-resolution pixel (e.g. in µm).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelCalibration {
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl PixelCalibration {
    pub fn square(size: f64) -> Self {
        Self { pixel_width: size, pixel_height: size }
    }

    pub fn to_physical(&self, geometry: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        geometry.map_coords(|c| Coord {
            x: c.x * self.pixel_width,
            y: c.y * self.pixel_height,
        })
    }
}

#[cfg(test)]
mod tests {
    use geo::{polygon, Area};

    use super::*;

    #[test]
    fn maps_with_scale_then_offset() {
        let tile = TileDescriptor::new(100, 50, 64, 64).with_downsample(4.0);
        let mapper = CoordinateMapper::for_tile(&tile);
        assert_eq!(mapper.map(2.0, 3.0), Coord { x: 108.0, y: 62.0 });
        assert!(!mapper.is_translation());
        assert!(CoordinateMapper::for_tile(&TileDescriptor::new(1, 1, 2, 2)).is_translation());
    }

    #[test]
    fn area_scales_with_downsample_squared() {
        let square = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: 2.0), (x: 0.0, y: 2.0)
        ]]);
        let mapper = CoordinateMapper { downsample: 3.0, offset_x: 10.0, offset_y: -5.0 };
        let mapped = mapper.apply(&square);
        assert!((mapped.unsigned_area() - 36.0).abs() < 1e-9);
    }

    #[test]
    fn calibration_scales_axes_independently() {
        let square = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)
        ]]);
        let physical = PixelCalibration { pixel_width: 0.5, pixel_height: 0.25 }.to_physical(&square);
        assert!((physical.unsigned_area() - 0.125).abs() < 1e-12);
        assert_eq!(PixelCalibration::square(0.5).pixel_height, 0.5);
    }
}
