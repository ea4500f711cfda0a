//! Grid store: the canonical canvas behind one reader/writer lock.
//!
//! DESIGN
//! ======
//! The canvas is one contiguous row-major buffer of palette indices. Every
//! mutation path (live placement, snapshot restore, admin import) goes
//! through `GridStore::validate`, so a stored cell is always in bounds and
//! always a palette member.
//!
//! Writers that must publish the result while still excluding other writers
//! use the `*_then` variants: the closure runs with the write guard held.
//! That is how a placement and its broadcast stay in one exclusive section.
//!
//! Bulk replacement builds the new buffer outside the lock and swaps it in,
//! so readers see either the old canvas or the new one.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::message::Pixel;
use crate::services::palette::{ColorIndex, Palette};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GridError {
    #[error("coordinate ({x}, {y}) outside {width}x{height} grid")]
    OutOfBounds { x: i64, y: i64, width: u16, height: u16 },
    #[error("color not in palette: {0}")]
    UnknownColor(String),
    #[error("malformed cell key: {0:?}")]
    MalformedKey(String),
}

/// A validated cell write. Only `GridStore::validate` constructs these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    x: u16,
    y: u16,
    color: ColorIndex,
}

impl Placement {
    #[must_use]
    pub fn x(self) -> u16 {
        self.x
    }

    #[must_use]
    pub fn y(self) -> u16 {
        self.y
    }

    #[must_use]
    pub fn color(self) -> ColorIndex {
        self.color
    }
}

/// Outcome of a bulk replacement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceSummary {
    /// Entries written into the new grid.
    pub applied: usize,
    /// Entries dropped by validation (bad key, out of range, unknown color).
    pub skipped: usize,
}

/// Plain canvas buffer. Only reachable through `GridStore`'s lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    width: u16,
    height: u16,
    cells: Vec<ColorIndex>,
}

impl Grid {
    fn filled(width: u16, height: u16, color: ColorIndex) -> Self {
        Self { width, height, cells: vec![color; usize::from(width) * usize::from(height)] }
    }

    fn offset(&self, x: u16, y: u16) -> usize {
        usize::from(y) * usize::from(self.width) + usize::from(x)
    }

    fn write(&mut self, placement: Placement) {
        let idx = self.offset(placement.x, placement.y);
        self.cells[idx] = placement.color;
    }

    #[must_use]
    pub fn color_at(&self, x: u16, y: u16) -> Option<ColorIndex> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.cells[self.offset(x, y)])
    }

    /// Every cell as a pixel message, row by row.
    #[must_use]
    pub fn pixels(&self, palette: &Palette) -> Vec<Pixel> {
        let mut out = Vec::with_capacity(self.cells.len());
        for y in 0..self.height {
            for x in 0..self.width {
                out.push(Pixel {
                    x: i64::from(x),
                    y: i64::from(y),
                    color: palette.name(self.cells[self.offset(x, y)]).to_owned(),
                });
            }
        }
        out
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Shared handle to the canvas. Clone is cheap; all clones see one grid.
#[derive(Clone)]
pub struct GridStore {
    grid: Arc<RwLock<Grid>>,
    palette: Arc<Palette>,
    width: u16,
    height: u16,
}

impl GridStore {
    /// Create an all-base-color grid.
    #[must_use]
    pub fn new(width: u16, height: u16, palette: Arc<Palette>) -> Self {
        let grid = Grid::filled(width, height, palette.base());
        Self { grid: Arc::new(RwLock::new(grid)), palette, width, height }
    }

    #[must_use]
    pub fn width(&self) -> u16 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u16 {
        self.height
    }

    #[must_use]
    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// The one bounds + palette check used by every mutation path.
    ///
    /// # Errors
    ///
    /// `OutOfBounds` for coordinates outside the grid, `UnknownColor` for
    /// names that are not palette members.
    pub fn validate(&self, x: i64, y: i64, color: &str) -> Result<Placement, GridError> {
        let in_range = |v: i64, limit: u16| u16::try_from(v).ok().filter(|v| *v < limit);
        let (Some(px), Some(py)) = (in_range(x, self.width), in_range(y, self.height)) else {
            return Err(GridError::OutOfBounds { x, y, width: self.width, height: self.height });
        };
        let Some(color) = self.palette.index_of(color) else {
            return Err(GridError::UnknownColor(color.to_owned()));
        };
        Ok(Placement { x: px, y: py, color })
    }

    /// Color name at `(x, y)`, or `None` when out of bounds.
    #[cfg(test)]
    pub async fn get(&self, x: u16, y: u16) -> Option<&str> {
        let idx = self.grid.read().await.color_at(x, y)?;
        Some(self.palette.name(idx))
    }

    #[cfg(test)]
    pub async fn set(&self, placement: Placement) {
        self.set_then(placement, |_| ()).await;
    }

    /// Write one cell, then run `then` before releasing the write lock.
    pub async fn set_then<R>(&self, placement: Placement, then: impl FnOnce(&Grid) -> R) -> R {
        let mut grid = self.grid.write().await;
        grid.write(placement);
        then(&grid)
    }

    /// Run `f` against a consistent read view.
    pub async fn read_then<R>(&self, f: impl FnOnce(&Grid) -> R) -> R {
        let grid = self.grid.read().await;
        f(&grid)
    }

    /// Every cell in row-major order, handed to `f` while the read lock is
    /// still held.
    pub async fn full_snapshot_then<R>(&self, f: impl FnOnce(Vec<Pixel>) -> R) -> R {
        self.read_then(|grid| f(grid.pixels(&self.palette))).await
    }

    /// Non-base cells keyed `"x,y"`.
    pub async fn sparse_snapshot(&self) -> BTreeMap<String, String> {
        let grid = self.grid.read().await;
        let base = self.palette.base();
        let mut out = BTreeMap::new();
        for y in 0..grid.height {
            for x in 0..grid.width {
                if let Some(idx) = grid.color_at(x, y).filter(|&idx| idx != base) {
                    out.insert(format!("{x},{y}"), self.palette.name(idx).to_owned());
                }
            }
        }
        out
    }

    /// Reset every cell to base, then apply `entries`.
    pub async fn replace_all(&self, entries: &BTreeMap<String, String>) -> ReplaceSummary {
        self.replace_all_then(entries, |_| ()).await.0
    }

    /// `replace_all`, then run `then` against the new grid before releasing
    /// the write lock.
    pub async fn replace_all_then<R>(
        &self,
        entries: &BTreeMap<String, String>,
        then: impl FnOnce(&Grid) -> R,
    ) -> (ReplaceSummary, R) {
        let (next, summary) = self.build_replacement(entries);
        let mut grid = self.grid.write().await;
        *grid = next;
        (summary, then(&grid))
    }

    fn build_replacement(&self, entries: &BTreeMap<String, String>) -> (Grid, ReplaceSummary) {
        let mut next = Grid::filled(self.width, self.height, self.palette.base());
        let mut summary = ReplaceSummary::default();
        for (key, color) in entries {
            let placement = parse_cell_key(key).and_then(|(x, y)| self.validate(x, y, color));
            match placement {
                Ok(p) => {
                    next.write(p);
                    summary.applied += 1;
                }
                Err(e) => {
                    tracing::debug!(error = %e, "grid: skipping replacement entry");
                    summary.skipped += 1;
                }
            }
        }
        (next, summary)
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Parse a sparse-map key of the form `"x,y"`.
///
/// # Errors
///
/// `MalformedKey` if the key is not two comma-separated integers.
pub fn parse_cell_key(key: &str) -> Result<(i64, i64), GridError> {
    let malformed = || GridError::MalformedKey(key.to_owned());
    let (x, y) = key.split_once(',').ok_or_else(malformed)?;
    let x = x.trim().parse::<i64>().map_err(|_| malformed())?;
    let y = y.trim().parse::<i64>().map_err(|_| malformed())?;
    Ok((x, y))
}

#[cfg(test)]
#[path = "grid_test.rs"]
mod tests;
