//! Free-space tracking for the engraving surface
//!
//! The map keeps a list of mutually disjoint free rectangles. Together with
//! the occupied rectangles they tile the surface exactly. Allocation is
//! best-fit; occupying a rectangle cuts every free rectangle it touches with
//! a guillotine split.

use std::cmp::Ordering;

use engravekit_core::{PlacementError, Rect, Size, EPSILON};

#[derive(Debug, Clone, PartialEq)]
pub struct OccupancyMap {
    surface: Rect,
    free: Vec<Rect>,
}

impl OccupancyMap {
    /// An empty surface of `size`
    pub fn new(size: Size) -> Self {
        let surface = Rect::new(0.0, 0.0, size.width, size.height);
        let free = if surface.is_degenerate() {
            Vec::new()
        } else {
            vec![surface]
        };
        Self { surface, free }
    }

    /// Rebuild by occupying `rects` in order
    pub fn replay<'a>(
        size: Size,
        rects: impl IntoIterator<Item = &'a Rect>,
    ) -> Result<Self, PlacementError> {
        let mut map = Self::new(size);
        for rect in rects {
            map.check_bounds(rect)?;
            map.occupy(rect);
        }
        Ok(map)
    }

    pub fn surface(&self) -> Rect {
        self.surface
    }

    pub fn surface_size(&self) -> Size {
        Size::new(self.surface.width, self.surface.height)
    }

    pub fn free_rects(&self) -> &[Rect] {
        &self.free
    }

    pub fn free_area(&self) -> f64 {
        self.free.iter().map(Rect::area).sum()
    }

    /// Smallest free rectangle that holds `width` x `height`.
    ///
    /// Ties go to the lower, then further left, then older rectangle. The
    /// returned rectangle sits at the free rectangle's origin. Nothing is
    /// modified.
    pub fn find(&self, width: f64, height: f64) -> Result<Rect, PlacementError> {
        self.check_dimensions(width, height)?;

        self.free
            .iter()
            .filter(|r| r.fits(width, height))
            .min_by(|a, b| {
                a.area()
                    .total_cmp(&b.area())
                    .then_with(|| a.y.total_cmp(&b.y))
                    .then_with(|| a.x.total_cmp(&b.x))
            })
            .map(|r| Rect::new(r.x, r.y, width, height))
            .ok_or(PlacementError::NoSpaceAvailable { width, height })
    }

    /// Whether `width` x `height` is a valid request for this surface
    pub fn check_dimensions(&self, width: f64, height: f64) -> Result<(), PlacementError> {
        let invalid = |reason: &str| PlacementError::InvalidDimensions {
            width,
            height,
            reason: reason.to_string(),
        };
        if !width.is_finite() || !height.is_finite() || width <= 0.0 || height <= 0.0 {
            return Err(invalid("dimensions must be positive"));
        }
        if width > self.surface.width + EPSILON || height > self.surface.height + EPSILON {
            return Err(invalid("larger than the engraving surface"));
        }
        Ok(())
    }

    pub fn check_bounds(&self, rect: &Rect) -> Result<(), PlacementError> {
        if rect.is_degenerate() || !self.surface.contains(rect) {
            return Err(PlacementError::OutOfBounds {
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
                surface_width: self.surface.width,
                surface_height: self.surface.height,
            });
        }
        Ok(())
    }

    /// Remove `rect` from the free space
    pub fn occupy(&mut self, rect: &Rect) {
        let mut next = Vec::with_capacity(self.free.len() + 3);
        for free in &self.free {
            match free.intersection(rect) {
                Some(cut) => next.extend(split(free, &cut)),
                None => next.push(*free),
            }
        }
        self.free = next;
    }
}

/// Guillotine split of `free` around `cut`, which lies inside it.
///
/// The first cut runs along the axis with the shorter leftover so the
/// larger remainder stays in one piece.
fn split(free: &Rect, cut: &Rect) -> Vec<Rect> {
    let leftover_w = free.width - cut.width;
    let leftover_h = free.height - cut.height;

    let pieces = if leftover_w.total_cmp(&leftover_h) != Ordering::Greater {
        // horizontal cuts: full-width bands below and above, then the row
        [
            Rect::new(free.x, free.y, free.width, cut.y - free.y),
            Rect::new(free.x, cut.top(), free.width, free.top() - cut.top()),
            Rect::new(free.x, cut.y, cut.x - free.x, cut.height),
            Rect::new(cut.right(), cut.y, free.right() - cut.right(), cut.height),
        ]
    } else {
        // vertical cuts: full-height columns left and right, then the column
        [
            Rect::new(free.x, free.y, cut.x - free.x, free.height),
            Rect::new(cut.right(), free.y, free.right() - cut.right(), free.height),
            Rect::new(cut.x, free.y, cut.width, cut.y - free.y),
            Rect::new(cut.x, cut.top(), cut.width, free.top() - cut.top()),
        ]
    };

    pieces.into_iter().filter(|r| !r.is_degenerate()).collect()
}
