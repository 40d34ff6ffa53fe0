// THEORY:
// The `Grid` is the most fundamental unit of the engine: a "dumb", row-major
// container for one two-dimensional image plane. Every stage of the pipeline
// speaks in grids. Raw DCS sub-frames are `Grid<u16>`, everything derived from
// them (phase, distance, amplitude, backgrounds, height maps) is `Grid<f32>`.
//
// Key principles:
// 1.  **Owned Data**: Derived frames are always fresh allocations. A distance
//     frame never aliases the raw frame it came from.
// 2.  **(row, col) Addressing**: All positions in the crate are `(row, col)`
//     tuples into a grid. `x` in a centroid is the column, `y` the row.
// 3.  **RawFrame Invariant**: The four DCS grids of a `RawFrame` always share
//     identical dimensions; this is checked once at construction.

use crate::core_modules::pixel_flags::FlagCounts;
use crate::error::FrameError;
use image::{ImageBuffer, Luma};
use std::ops::{Index, IndexMut};

/// A two-dimensional, row-major image plane.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

/// Distance image in millimetres.
pub type DistanceFrame = Grid<f32>;
/// Phase image in radians.
pub type PhaseFrame = Grid<f32>;
/// Signal amplitude image in sensor counts.
pub type AmplitudeFrame = Grid<f32>;
/// Static reference gray image used for the noise estimate.
pub type GrayFrame = Grid<f32>;

impl<T: Copy + Default> Grid<T> {
    /// Creates a grid filled with `T::default()`.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, T::default())
    }

    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Wraps row-major `data`. Fails if the length does not match `rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<T>) -> Result<Self, FrameError> {
        if data.len() != rows * cols {
            return Err(FrameError::ShapeMismatch {
                rows,
                cols,
                expected: rows * cols,
                actual: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// Builds a grid by evaluating `f(row, col)` for every cell.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                data.push(f(row, col));
            }
        }
        Self { rows, cols, data }
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> T {
        self.data[row * self.cols + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: T) {
        self.data[row * self.cols + col] = value;
    }

    /// Returns the grid with its row and column axes swapped.
    pub fn transposed(&self) -> Self {
        Self::from_fn(self.cols, self.rows, |row, col| self.get(col, row))
    }
}

impl<T> Grid<T> {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`.
    pub fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn same_dims<U>(&self, other: &Grid<U>) -> bool {
        self.dims() == other.dims()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}

impl Grid<f32> {
    /// Arithmetic mean of all cells, accumulated in `f64`. Zero for an empty grid.
    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&v| v as f64).sum::<f64>() / self.data.len() as f64
    }

    /// The global maximum and the `(row, col)` of its first occurrence in
    /// row-major order. NaN cells are skipped.
    pub fn max_with_position(&self) -> Option<(f32, (usize, usize))> {
        let mut best: Option<(f32, usize)> = None;
        for (i, &v) in self.data.iter().enumerate() {
            if v.is_nan() {
                continue;
            }
            match best {
                Some((b, _)) if v <= b => {}
                _ => best = Some((v, i)),
            }
        }
        best.map(|(v, i)| (v, (i / self.cols, i % self.cols)))
    }

    pub fn max(&self) -> Option<f32> {
        self.max_with_position().map(|(v, _)| v)
    }

    /// Converts a 16-bit luma image into a grid with `rows = height`.
    pub fn from_luma16(image: &ImageBuffer<Luma<u16>, Vec<u16>>) -> Self {
        let (width, height) = image.dimensions();
        Self::from_fn(height as usize, width as usize, |row, col| {
            image.get_pixel(col as u32, row as u32)[0] as f32
        })
    }
}

impl<T> Index<(usize, usize)> for Grid<T> {
    type Output = T;

    fn index(&self, (row, col): (usize, usize)) -> &T {
        &self.data[row * self.cols + col]
    }
}

impl<T> IndexMut<(usize, usize)> for Grid<T> {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut T {
        &mut self.data[row * self.cols + col]
    }
}

/// One raw acquisition: the four quadrature sub-frames DCS0..DCS3.
///
/// The grids are in acquisition orientation, i.e. sensor columns on the first
/// axis. The phase unwrapper transposes back to sensor `(row, col)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    dcs: [Grid<u16>; 4],
}

impl RawFrame {
    pub fn new(dcs: [Grid<u16>; 4]) -> Result<Self, FrameError> {
        let expected = dcs[0].dims();
        for (index, grid) in dcs.iter().enumerate().skip(1) {
            if grid.dims() != expected {
                return Err(FrameError::DcsMismatch {
                    index,
                    expected,
                    actual: grid.dims(),
                });
            }
        }
        Ok(Self { dcs })
    }

    /// Dimensions shared by all four DCS grids.
    pub fn dims(&self) -> (usize, usize) {
        self.dcs[0].dims()
    }

    pub fn dcs(&self, index: usize) -> &Grid<u16> {
        &self.dcs[index]
    }

    pub fn planes(&self) -> &[Grid<u16>; 4] {
        &self.dcs
    }

    /// Counts sensor sentinel codes across all four sub-frames.
    pub fn flag_counts(&self) -> FlagCounts {
        FlagCounts::tally(self.dcs.iter().flat_map(|g| g.iter().copied()))
    }
}
