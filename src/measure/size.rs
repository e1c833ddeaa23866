//! Size measurements: area and integrated intensity.

use crate::error::Result;
use crate::image::Image;
use crate::measure::MeasurementTable;
use crate::objects::collect_regions;
use crate::pipeline::MeasureFeatures;

pub const AREA: &str = "Size_Area";
pub const INTEGRATED_INTENSITY: &str = "Size_IntegratedIntensity";

/// Pixel area and summed grayscale intensity per object.
#[derive(Clone, Copy, Debug, Default)]
pub struct MeasureSize;

impl MeasureFeatures for MeasureSize {
    fn name(&self) -> &'static str {
        "MeasureSize"
    }

    fn measure(&self, image: &Image) -> Result<MeasurementTable> {
        let regions = collect_regions(image.objmap());
        let gray = image.gray();
        let mut table = MeasurementTable::new(regions.iter().map(|r| r.label).collect());
        table.add_float_column(AREA, regions.iter().map(|r| r.area as f64).collect())?;
        table.add_float_column(
            INTEGRATED_INTENSITY,
            regions
                .iter()
                .map(|r| {
                    r.coords
                        .iter()
                        .map(|&(rr, cc)| gray.get(rr, cc) as f64)
                        .sum()
                })
                .collect(),
        )?;
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Matrix;

    #[test]
    fn area_and_integrated_intensity_match_hand_counts() {
        let mut image = Image::from_gray("m", Matrix::filled(4, 4, 0.25f32)).unwrap();
        let mut map = Matrix::filled(4, 4, 0u32);
        for (rr, cc) in [(0, 0), (0, 1), (1, 0)] {
            map.set(rr, cc, 1);
        }
        map.set(3, 3, 2);
        image.set_objmap(map).unwrap();

        let t = MeasureSize.measure(&image).unwrap();
        assert_eq!(t.labels(), &[1, 2]);
        assert_eq!(t.float(AREA).unwrap(), &[3.0, 1.0]);
        let ii = t.float(INTEGRATED_INTENSITY).unwrap();
        assert!((ii[0] - 0.75).abs() < 1e-6);
        assert!((ii[1] - 0.25).abs() < 1e-6);
    }
}
