//! Gaussian smoothing of the enhanced plane.

use imageproc::filter::gaussian_blur_f32;

use crate::error::Result;
use crate::image::io::{gray_to_luma8, luma8_to_gray};
use crate::image::Image;
use crate::pipeline::ImageOperation;

/// Blur the enhanced plane with a Gaussian kernel. Run before thresholding
/// to suppress scanner noise and agar texture.
#[derive(Clone, Debug)]
pub struct GaussianSmoother {
    sigma: f32,
}

impl GaussianSmoother {
    pub fn new(sigma: f32) -> Self {
        Self { sigma }
    }
}

impl Default for GaussianSmoother {
    fn default() -> Self {
        Self { sigma: 2.0 }
    }
}

impl ImageOperation for GaussianSmoother {
    fn name(&self) -> &'static str {
        "GaussianSmoother"
    }

    fn apply(&self, image: &mut Image) -> Result<()> {
        let blurred = gaussian_blur_f32(&gray_to_luma8(image.enhanced()), self.sigma);
        image.set_enhanced(luma8_to_gray(&blurred))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Matrix;

    #[test]
    fn smoothing_spreads_an_impulse() {
        let mut plane = Matrix::filled(9, 9, 0.0f32);
        plane.set(4, 4, 1.0);
        let mut image = Image::from_gray("impulse", plane).unwrap();
        GaussianSmoother::new(1.5).apply(&mut image).unwrap();
        let center = image.enhanced().get(4, 4);
        let neighbor = image.enhanced().get(4, 5);
        assert!(center < 1.0);
        assert!(neighbor > 0.0);
        assert!(center >= neighbor);
    }
}
