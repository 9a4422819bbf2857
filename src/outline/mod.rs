//! Scanline boundary tracing of a binary selection.
//!
//! Lattice points (pixel corners) are visited row by row. At each point the
//! 2×2 pixel pattern around it decides whether a boundary starts, turns,
//! continues, joins another fragment, or closes into a ring. Only two mask
//! rows are alive at a time, so a tile never needs a materialized mask.
//!
//! Boundaries are directed so the selected region is on the right when
//! walking them on screen (y down). Shells therefore come out with positive
//! shoelace area and holes with negative area.

mod arena;
mod pattern;

use geo::Coord;

use crate::geom::ring_signed_area;
use crate::threshold::Threshold;
use crate::tile::PixelSource;

use arena::{OutlineArena, OutlineId};
use pattern::Pattern;

/// Tolerance for the traced-area vs. pixel-count comparison.
const AREA_TOLERANCE: f64 = 1e-6;

/// Whether a ring bounds a selected region or an excluded one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingKind {
    Shell,
    Hole,
}

/// A closed boundary ring: first coordinate == last coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct Ring {
    pub kind: RingKind,
    pub coords: Vec<Coord<f64>>,
}

impl Ring {
    pub fn signed_area(&self) -> f64 {
        ring_signed_area(&self.coords)
    }
}

/// Rings of one trace plus the number of pixels that were selected.
#[derive(Debug, Clone, Default)]
pub struct TraceOutput {
    pub rings: Vec<Ring>,
    pub selected_pixels: u64,
}

impl TraceOutput {
    pub fn shells(&self) -> impl Iterator<Item = &Ring> {
        self.rings.iter().filter(|r| r.kind == RingKind::Shell)
    }

    pub fn holes(&self) -> impl Iterator<Item = &Ring> {
        self.rings.iter().filter(|r| r.kind == RingKind::Hole)
    }

    /// Shell area minus hole area, in the traced coordinate units.
    pub fn traced_area(&self) -> f64 {
        self.rings.iter().map(Ring::signed_area).sum()
    }

    /// `traced_area - selected_pixels`; zero for every well-formed trace
    /// in pixel units.
    pub fn area_discrepancy(&self) -> f64 {
        self.traced_area() - self.selected_pixels as f64
    }

    pub fn area_matches(&self) -> bool {
        self.area_discrepancy().abs() <= AREA_TOLERANCE
    }
}

/// Traces the boundaries of a `width × height` selection.
#[derive(Debug, Clone, Copy)]
pub struct OutlineBuilder {
    width: u32,
    height: u32,
    offset: (f64, f64),
}

impl OutlineBuilder {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, offset: (0.0, 0.0) }
    }

    /// Translation added to every emitted vertex.
    pub fn with_offset(mut self, x: f64, y: f64) -> Self {
        self.offset = (x, y);
        self
    }

    /// Trace the pixels of `source` that `threshold` selects.
    pub fn trace_source<S: PixelSource + ?Sized>(source: &S, threshold: &Threshold) -> TraceOutput {
        Self::new(source.width(), source.height())
            .trace(|x, y| threshold.selects(source.value(x, y)))
    }

    /// Trace the boundaries of the pixels for which `selected` returns true.
    ///
    /// `selected` is called exactly once per pixel, in raster order.
    pub fn trace<F>(&self, mut selected: F) -> TraceOutput
    where
        F: FnMut(u32, u32) -> bool,
    {
        let w = self.width as usize;
        let h = self.height as usize;
        if w == 0 || h == 0 {
            return TraceOutput::default();
        }

        // Index i holds pixel i - 1; both ends stay unselected.
        let mut prev = vec![false; w + 2];
        let mut curr = vec![false; w + 2];
        let mut state = TraceState::new(w);
        let mut selected_pixels = 0u64;

        for y in 0..=h {
            std::mem::swap(&mut prev, &mut curr);
            for x in 0..=w {
                let d = x < w && y < h && selected(x as u32, y as u32);
                curr[x + 1] = d;
                selected_pixels += d as u64;
                let pattern = Pattern::from_corners(prev[x], prev[x + 1], curr[x], d);
                state.visit(pattern, x, self.vertex(x, y));
            }
        }

        TraceOutput {
            rings: state.finish(),
            selected_pixels,
        }
    }

    #[inline]
    fn vertex(&self, x: usize, y: usize) -> Coord<f64> {
        Coord {
            x: x as f64 + self.offset.0,
            y: y as f64 + self.offset.1,
        }
    }
}

/// Mutable state of one trace.
///
/// `moving_right` owns the horizontal boundary edge reaching the current
/// lattice point from the left; `moving_down[x]` owns the vertical edge
/// reaching lattice column `x` from the row above. A slot is `Some` exactly
/// when that edge exists.
struct TraceState {
    arena: OutlineArena,
    moving_right: Option<OutlineId>,
    moving_down: Vec<Option<OutlineId>>,
    rings: Vec<Ring>,
}

impl TraceState {
    fn new(width: usize) -> Self {
        Self {
            arena: OutlineArena::default(),
            moving_right: None,
            moving_down: vec![None; width + 1],
            rings: Vec::new(),
        }
    }

    fn visit(&mut self, pattern: Pattern, x: usize, v: Coord<f64>) {
        match pattern {
            // No boundary, or a straight one passing through.
            Pattern::Empty | Pattern::Full => {}
            Pattern::AB | Pattern::CD => {}
            Pattern::AC | Pattern::BD => {}

            // Top-left corner of a region (D) or of a hole (ABC).
            Pattern::D | Pattern::ABC => self.start(x, v),

            // Vertical edge from above turns right.
            Pattern::B => {
                let id = self.take_down(x);
                self.arena.get_mut(id).prepend(v);
                self.moving_right = Some(id);
            }
            Pattern::ACD => {
                let id = self.take_down(x);
                self.arena.get_mut(id).append(v);
                self.moving_right = Some(id);
            }

            // Horizontal edge from the left turns down.
            Pattern::C => {
                let id = self.take_right();
                self.arena.get_mut(id).append(v);
                self.moving_down[x] = Some(id);
            }
            Pattern::ABD => {
                let id = self.take_right();
                self.arena.get_mut(id).prepend(v);
                self.moving_down[x] = Some(id);
            }

            // Bottom-right corner: both edges end here.
            Pattern::A => {
                let down = self.take_down(x);
                let right = self.take_right();
                self.join(down, right, v, RingKind::Shell);
            }
            Pattern::BCD => {
                let right = self.take_right();
                let down = self.take_down(x);
                self.join(right, down, v, RingKind::Hole);
            }

            // Diagonals keep the two selected pixels apart.
            Pattern::AD => {
                let down = self.take_down(x);
                let right = self.take_right();
                self.join(down, right, v, RingKind::Shell);
                self.start(x, v);
            }
            Pattern::BC => {
                let right = self.take_right();
                let down = self.take_down(x);
                self.arena.get_mut(right).append(v);
                self.arena.get_mut(down).prepend(v);
                self.moving_right = Some(down);
                self.moving_down[x] = Some(right);
            }
        }
    }

    fn start(&mut self, x: usize, v: Coord<f64>) {
        let id = self.arena.start(v);
        self.moving_right = Some(id);
        self.moving_down[x] = Some(id);
    }

    /// `incoming` ends at `v`, `outgoing` starts there. The same outline on
    /// both sides closes a ring; otherwise `outgoing` is absorbed.
    fn join(&mut self, incoming: OutlineId, outgoing: OutlineId, v: Coord<f64>, kind: RingKind) {
        self.arena.get_mut(incoming).append(v);
        if incoming == outgoing {
            let coords = self.arena.close(incoming);
            self.rings.push(Ring { kind, coords });
            return;
        }
        self.arena.merge(incoming, outgoing);
        for slot in self.moving_down.iter_mut().filter(|s| **s == Some(outgoing)) {
            *slot = Some(incoming);
        }
        if self.moving_right == Some(outgoing) {
            self.moving_right = Some(incoming);
        }
    }

    fn take_down(&mut self, x: usize) -> OutlineId {
        self.moving_down[x]
            .take()
            .expect("vertical boundary edge has an owning outline")
    }

    fn take_right(&mut self) -> OutlineId {
        self.moving_right
            .take()
            .expect("horizontal boundary edge has an owning outline")
    }

    fn finish(self) -> Vec<Ring> {
        debug_assert_eq!(self.arena.live(), 0, "every outline closes on the padding row");
        self.rings
    }
}
