//! Growing boundary fragments, stored by index.

use std::collections::VecDeque;

use geo::Coord;

/// Index of an [`Outline`] inside an [`OutlineArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OutlineId(usize);

/// A boundary fragment open at both ends.
///
/// Consecutive duplicates are never stored: appending the current last
/// coordinate (or prepending the current first) is a no-op.
#[derive(Debug, Default)]
pub(crate) struct Outline {
    coords: VecDeque<Coord<f64>>,
}

impl Outline {
    pub(crate) fn append(&mut self, c: Coord<f64>) {
        if self.coords.back() != Some(&c) {
            self.coords.push_back(c);
        }
    }

    pub(crate) fn prepend(&mut self, c: Coord<f64>) {
        if self.coords.front() != Some(&c) {
            self.coords.push_front(c);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.coords.len()
    }

    #[cfg(test)]
    pub(crate) fn coords(&self) -> Vec<Coord<f64>> {
        self.coords.iter().copied().collect()
    }
}

/// Owns every outline of one trace; cleared per tile.
#[derive(Debug, Default)]
pub(crate) struct OutlineArena {
    outlines: Vec<Outline>,
    live: usize,
}

impl OutlineArena {
    /// Start a new outline holding a single vertex.
    pub(crate) fn start(&mut self, c: Coord<f64>) -> OutlineId {
        let mut outline = Outline::default();
        outline.append(c);
        self.outlines.push(outline);
        self.live += 1;
        OutlineId(self.outlines.len() - 1)
    }

    #[cfg(test)]
    pub(crate) fn get(&self, id: OutlineId) -> &Outline {
        &self.outlines[id.0]
    }

    pub(crate) fn get_mut(&mut self, id: OutlineId) -> &mut Outline {
        &mut self.outlines[id.0]
    }

    /// Move `absorbed`'s coordinates onto the end of `survivor`.
    ///
    /// `absorbed` is left empty; the caller redirects every reference to it.
    pub(crate) fn merge(&mut self, survivor: OutlineId, absorbed: OutlineId) {
        debug_assert_ne!(survivor, absorbed);
        let coords = std::mem::take(&mut self.outlines[absorbed.0].coords);
        let target = &mut self.outlines[survivor.0];
        for c in coords {
            target.append(c);
        }
        self.live -= 1;
    }

    /// Take the outline's coordinates as a closed ring (first == last).
    pub(crate) fn close(&mut self, id: OutlineId) -> Vec<Coord<f64>> {
        let mut ring: Vec<Coord<f64>> = std::mem::take(&mut self.outlines[id.0].coords).into();
        if let (Some(&first), Some(&last)) = (ring.first(), ring.last()) {
            if first != last {
                ring.push(first);
            }
        }
        self.live -= 1;
        ring
    }

    /// Number of outlines neither closed nor merged away.
    pub(crate) fn live(&self) -> usize {
        self.live
    }
}
