//! Percentile contrast stretching of the enhanced plane.

use crate::error::{Error, Result};
use crate::image::matrix::Matrix;
use crate::image::Image;
use crate::pipeline::ImageOperation;

/// Rescale the enhanced plane so the `[low, high]` percentile window maps to
/// `[0, 1]`, clipping values outside the window.
#[derive(Clone, Debug)]
pub struct ContrastStretcher {
    low_percentile: f32,
    high_percentile: f32,
}

impl ContrastStretcher {
    pub fn new(low_percentile: f32, high_percentile: f32) -> Result<Self> {
        if !(0.0..=100.0).contains(&low_percentile)
            || !(0.0..=100.0).contains(&high_percentile)
            || low_percentile >= high_percentile
        {
            return Err(Error::InvalidParameter {
                parameter: "percentile window".into(),
                value: format!("[{low_percentile}, {high_percentile}]"),
            });
        }
        Ok(Self {
            low_percentile,
            high_percentile,
        })
    }
}

impl Default for ContrastStretcher {
    fn default() -> Self {
        Self {
            low_percentile: 2.0,
            high_percentile: 98.0,
        }
    }
}

fn percentile(sorted: &[f32], pct: f32) -> f32 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = (pct / 100.0 * (sorted.len() - 1) as f32).round() as usize;
    sorted[pos.min(sorted.len() - 1)]
}

impl ImageOperation for ContrastStretcher {
    fn name(&self) -> &'static str {
        "ContrastStretcher"
    }

    fn apply(&self, image: &mut Image) -> Result<()> {
        let mut sorted: Vec<f32> = image.enhanced().as_slice().to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let lo = percentile(&sorted, self.low_percentile);
        let hi = percentile(&sorted, self.high_percentile);
        if hi <= lo {
            // Flat plane; stretching would divide by zero, leave it alone.
            return Ok(());
        }
        let span = hi - lo;
        let stretched: Matrix<f32> = image
            .enhanced()
            .map(|v| ((v - lo) / span).clamp(0.0, 1.0));
        image.set_enhanced(stretched)
    }
}
