//! Intensity statistics over each object's grayscale footprint.

use rayon::prelude::*;

use crate::error::Result;
use crate::image::Image;
use crate::measure::MeasurementTable;
use crate::objects::{collect_regions, Region};
use crate::pipeline::MeasureFeatures;

pub const INTEGRATED: &str = "Intensity_IntegratedIntensity";
pub const MINIMUM: &str = "Intensity_MinimumIntensity";
pub const MAXIMUM: &str = "Intensity_MaximumIntensity";
pub const MEAN: &str = "Intensity_MeanIntensity";
pub const MEDIAN: &str = "Intensity_MedianIntensity";
pub const STD_DEV: &str = "Intensity_StandardDeviationIntensity";
pub const COEFF_VAR: &str = "Intensity_CoefficientVarianceIntensity";

#[derive(Clone, Copy, Debug)]
struct Stats {
    sum: f64,
    min: f64,
    max: f64,
    mean: f64,
    median: f64,
    std_dev: f64,
    coeff_var: f64,
}

fn region_stats(region: &Region, image: &Image) -> Stats {
    let gray = image.gray();
    let mut values: Vec<f64> = region
        .coords
        .iter()
        .map(|&(rr, cc)| gray.get(rr, cc) as f64)
        .collect();
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len() as f64;
    let sum: f64 = values.iter().sum();
    let mean = sum / n;
    let median = if values.len() % 2 == 1 {
        values[values.len() / 2]
    } else {
        (values[values.len() / 2 - 1] + values[values.len() / 2]) / 2.0
    };
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    let std_dev = var.sqrt();
    Stats {
        sum,
        min: values[0],
        max: values[values.len() - 1],
        mean,
        median,
        std_dev,
        coeff_var: if mean != 0.0 { std_dev / mean } else { f64::NAN },
    }
}

/// Integrated/min/max/mean/median/σ/CV grayscale intensity per object.
#[derive(Clone, Copy, Debug, Default)]
pub struct MeasureIntensity;

impl MeasureFeatures for MeasureIntensity {
    fn name(&self) -> &'static str {
        "MeasureIntensity"
    }

    fn measure(&self, image: &Image) -> Result<MeasurementTable> {
        let regions = collect_regions(image.objmap());
        let stats: Vec<Stats> = regions
            .par_iter()
            .map(|r| region_stats(r, image))
            .collect();
        let mut table = MeasurementTable::new(regions.iter().map(|r| r.label).collect());
        table.add_float_column(INTEGRATED, stats.iter().map(|s| s.sum).collect())?;
        table.add_float_column(MINIMUM, stats.iter().map(|s| s.min).collect())?;
        table.add_float_column(MAXIMUM, stats.iter().map(|s| s.max).collect())?;
        table.add_float_column(MEAN, stats.iter().map(|s| s.mean).collect())?;
        table.add_float_column(MEDIAN, stats.iter().map(|s| s.median).collect())?;
        table.add_float_column(STD_DEV, stats.iter().map(|s| s.std_dev).collect())?;
        table.add_float_column(COEFF_VAR, stats.iter().map(|s| s.coeff_var).collect())?;
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Matrix;
    use approx::assert_relative_eq;

    #[test]
    fn statistics_match_hand_computation() {
        let gray = Matrix::from_vec(1, 4, vec![0.1f32, 0.2, 0.3, 0.9]).unwrap();
        let mut image = Image::from_gray("m", gray).unwrap();
        image
            .set_objmap(Matrix::from_vec(1, 4, vec![1u32, 1, 1, 0]).unwrap())
            .unwrap();

        let t = MeasureIntensity.measure(&image).unwrap();
        assert_eq!(t.labels(), &[1]);
        assert_relative_eq!(t.float(INTEGRATED).unwrap()[0], 0.6, max_relative = 1e-5);
        assert_relative_eq!(t.float(MEAN).unwrap()[0], 0.2, max_relative = 1e-5);
        assert_relative_eq!(t.float(MEDIAN).unwrap()[0], 0.2, max_relative = 1e-5);
        assert_relative_eq!(t.float(MINIMUM).unwrap()[0], 0.1, max_relative = 1e-5);
        assert_relative_eq!(t.float(MAXIMUM).unwrap()[0], 0.3, max_relative = 1e-5);
        let expected_sd = (0.02f64 / 3.0).sqrt();
        assert_relative_eq!(
            t.float(STD_DEV).unwrap()[0],
            expected_sd,
            max_relative = 1e-4
        );
        assert_relative_eq!(
            t.float(COEFF_VAR).unwrap()[0],
            expected_sd / 0.2,
            max_relative = 1e-4
        );
    }
}
