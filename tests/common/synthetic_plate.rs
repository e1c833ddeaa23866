//! Synthetic plate-scan generator for end-to-end tests.

use platescan::image::{Image, Matrix};

/// Layout of a generated plate.
pub struct PlateSpec {
    pub nrows: usize,
    pub ncols: usize,
    /// Center-to-center spacing between colonies, pixels.
    pub pitch: usize,
    /// Margin from the image border to the first colony center, pixels.
    pub margin: usize,
    /// Colony radius, pixels.
    pub radius: usize,
    /// Background gray level.
    pub background: f32,
    /// Colony gray level.
    pub foreground: f32,
}

impl Default for PlateSpec {
    fn default() -> Self {
        Self {
            nrows: 4,
            ncols: 6,
            pitch: 24,
            margin: 16,
            radius: 5,
            background: 0.12,
            foreground: 0.85,
        }
    }
}

impl PlateSpec {
    pub fn shape(&self) -> (usize, usize) {
        (
            2 * self.margin + (self.nrows - 1) * self.pitch + 1,
            2 * self.margin + (self.ncols - 1) * self.pitch + 1,
        )
    }

    /// Colony center for a grid position.
    pub fn center(&self, row: usize, col: usize) -> (usize, usize) {
        (
            self.margin + row * self.pitch,
            self.margin + col * self.pitch,
        )
    }
}

/// Render a plate with one disk colony at every grid position except those
/// listed in `skip` (as `(row, col)` pairs).
pub fn render_plate(spec: &PlateSpec, name: &str, skip: &[(usize, usize)]) -> Image {
    let (rows, cols) = spec.shape();
    let mut plane = Matrix::filled(rows, cols, spec.background);
    let r2 = (spec.radius * spec.radius) as i64;
    for row in 0..spec.nrows {
        for col in 0..spec.ncols {
            if skip.contains(&(row, col)) {
                continue;
            }
            let (c_rr, c_cc) = spec.center(row, col);
            for dr in -(spec.radius as i64)..=(spec.radius as i64) {
                for dc in -(spec.radius as i64)..=(spec.radius as i64) {
                    if dr * dr + dc * dc > r2 {
                        continue;
                    }
                    let rr = c_rr as i64 + dr;
                    let cc = c_cc as i64 + dc;
                    if rr >= 0 && rr < rows as i64 && cc >= 0 && cc < cols as i64 {
                        plane.set(rr as usize, cc as usize, spec.foreground);
                    }
                }
            }
        }
    }
    Image::from_gray(name, plane).expect("non-empty synthetic plate")
}
