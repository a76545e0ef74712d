//! Terrain height map.

/// Default grid rows (along the push direction, x).
pub const DEFAULT_ROWS: usize = 200;

/// Default grid columns (across the push direction, y).
pub const DEFAULT_COLS: usize = 100;

/// Row-major 2-D grid of terrain elevations in meters.
///
/// Height maps are never mutated once built; producers assemble the cell
/// vector and hand it over through [`HeightMap::from_vec`] or [`HeightMap::from_fn`].
#[derive(Clone, Debug, PartialEq)]
pub struct HeightMap {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl HeightMap {
    /// All-zero map.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Wrap row-major cell data. Returns `None` if the length does not match the shape.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Option<Self> {
        (rows.checked_mul(cols)? == data.len()).then_some(Self { rows, cols, data })
    }

    /// Build a map by evaluating `f(row, col)` for every cell.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        Self { rows, cols, data }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row < self.rows && col < self.cols {
            Some(self.data[row * self.cols + col])
        } else {
            None
        }
    }

    /// Row-major cell slice.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn row(&self, row: usize) -> &[f32] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Highest cell, or 0.0 for an empty map.
    pub fn max(&self) -> f32 {
        self.data.iter().copied().reduce(f32::max).unwrap_or(0.0)
    }

    /// Mean cell height, or 0.0 for an empty map.
    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.data.iter().map(|&v| v as f64).sum();
        (sum / self.data.len() as f64) as f32
    }

    /// Number of cells with a non-zero height.
    pub fn occupied_cells(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0.0).count()
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}
