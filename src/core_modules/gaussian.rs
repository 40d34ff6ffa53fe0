// gaussian.rs: separable Gaussian blur for distance-derived grids.
//
// A 2D Gaussian with kernel size (width x height) factors into a horizontal
// pass over every row with a `width`-tap kernel and a vertical pass over every
// column with a `height`-tap kernel. Both passes share one sigma.
//
// BORDER HANDLING: reflect-101 (`dcb|abcd|cba`), the edge pixel itself is not
// repeated. Kernels larger than the image keep reflecting until the index
// lands inside.

use crate::core_modules::grid::Grid;
use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct GaussianKernel {
    width: usize,
    height: usize,
    sigma: f64,
    row_taps: Vec<f32>,
    col_taps: Vec<f32>,
}

impl GaussianKernel {
    /// `width` runs along columns, `height` along rows. Both must be odd.
    pub fn new(width: usize, height: usize, sigma: f64) -> Result<Self, ConfigError> {
        if width == 0 || width % 2 == 0 || height == 0 || height % 2 == 0 {
            return Err(ConfigError::Invalid(format!(
                "gaussian kernel must have odd, non-zero dimensions (got {width}x{height})"
            )));
        }
        if !(sigma > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "gaussian sigma must be positive (got {sigma})"
            )));
        }
        Ok(Self {
            width,
            height,
            sigma,
            row_taps: taps(width, sigma),
            col_taps: taps(height, sigma),
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    pub fn blur(&self, src: &Grid<f32>) -> Grid<f32> {
        if src.is_empty() {
            return src.clone();
        }
        let horizontal = convolve_rows(src, &self.row_taps);
        convolve_cols(&horizontal, &self.col_taps)
    }
}

/// Normalized 1D Gaussian taps centered on `len / 2`.
fn taps(len: usize, sigma: f64) -> Vec<f32> {
    let center = (len / 2) as f64;
    let weights: Vec<f64> = (0..len)
        .map(|i| {
            let d = i as f64 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| (w / total) as f32).collect()
}

#[inline]
fn reflect_101(mut i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let n = n as isize;
    loop {
        if i < 0 {
            i = -i;
        } else if i >= n {
            i = 2 * n - 2 - i;
        } else {
            return i as usize;
        }
    }
}

fn convolve_rows(src: &Grid<f32>, kernel: &[f32]) -> Grid<f32> {
    let (rows, cols) = src.dims();
    let half = (kernel.len() / 2) as isize;
    Grid::from_fn(rows, cols, |row, col| {
        kernel
            .iter()
            .enumerate()
            .map(|(k, &w)| {
                let c = reflect_101(col as isize + k as isize - half, cols);
                src.get(row, c) * w
            })
            .sum::<f32>()
    })
}

fn convolve_cols(src: &Grid<f32>, kernel: &[f32]) -> Grid<f32> {
    let (rows, cols) = src.dims();
    let half = (kernel.len() / 2) as isize;
    Grid::from_fn(rows, cols, |row, col| {
        kernel
            .iter()
            .enumerate()
            .map(|(k, &w)| {
                let r = reflect_101(row as isize + k as isize - half, rows);
                src.get(r, col) * w
            })
            .sum::<f32>()
    })
}
