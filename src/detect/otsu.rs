//! Otsu-threshold detector.
//!
//! The threshold level comes from `imageproc`; this type wires it into the
//! detection contract: binarize the enhanced plane, label connected
//! components, drop undersized objects, relabel densely.

use imageproc::contrast::otsu_level;
use log::debug;

use crate::error::{Error, Result};
use crate::image::io::gray_to_luma8;
use crate::image::Image;
use crate::objects::{self, Connectivity};
use crate::pipeline::ImageOperation;

/// Threshold the enhanced plane at the Otsu level and label the foreground.
#[derive(Clone, Debug)]
pub struct OtsuDetector {
    /// Minimum object area in pixels; smaller components are discarded.
    pub min_size: usize,
    /// Connectivity used for component labeling.
    pub connectivity: Connectivity,
    /// Treat exactly-zero pixels as background regardless of the threshold.
    /// Useful when upstream correction blanks out-of-plate pixels.
    pub ignore_zeros: bool,
}

impl Default for OtsuDetector {
    fn default() -> Self {
        Self {
            min_size: 50,
            connectivity: Connectivity::Eight,
            ignore_zeros: true,
        }
    }
}

impl OtsuDetector {
    pub fn new(min_size: usize, connectivity: Connectivity, ignore_zeros: bool) -> Self {
        Self {
            min_size,
            connectivity,
            ignore_zeros,
        }
    }
}

impl ImageOperation for OtsuDetector {
    fn name(&self) -> &'static str {
        "OtsuDetector"
    }

    fn apply(&self, image: &mut Image) -> Result<()> {
        if image.enhanced().is_empty() {
            return Err(Error::EmptyImage {
                name: image.name().to_string(),
            });
        }
        let luma = gray_to_luma8(image.enhanced());
        let level = otsu_level(&luma);
        let threshold = level as f32 / 255.0;

        let mask = image.enhanced().map(|v| {
            if self.ignore_zeros && v == 0.0 {
                false
            } else {
                v >= threshold
            }
        });
        let mut map = objects::label_mask(&mask, self.connectivity);
        objects::remove_small(&mut map, self.min_size);
        objects::relabel(&mut map);
        let found = map.as_slice().iter().copied().max().unwrap_or(0);
        debug!(
            "OtsuDetector: image={} level={} objects={}",
            image.name(),
            level,
            found
        );
        image.set_objmap(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Matrix;

    /// Dark background with two bright square blobs.
    fn two_blob_image() -> Image {
        let mut plane = Matrix::filled(20, 20, 0.1f32);
        for rr in 2..6 {
            for cc in 2..6 {
                plane.set(rr, cc, 0.9);
            }
        }
        for rr in 12..17 {
            for cc in 12..17 {
                plane.set(rr, cc, 0.85);
            }
        }
        Image::from_gray("two_blobs", plane).unwrap()
    }

    #[test]
    fn detects_both_blobs_with_dense_labels() {
        let mut image = two_blob_image();
        OtsuDetector::new(4, Connectivity::Eight, false)
            .apply(&mut image)
            .unwrap();
        assert_eq!(image.num_objects(), 2);
        let max_label = image.objmap().as_slice().iter().copied().max().unwrap();
        assert_eq!(max_label, 2);
    }

    #[test]
    fn min_size_filters_single_pixels() {
        let mut plane = Matrix::filled(10, 10, 0.05f32);
        plane.set(1, 1, 0.95); // lone pixel
        for rr in 5..9 {
            for cc in 5..9 {
                plane.set(rr, cc, 0.9);
            }
        }
        let mut image = Image::from_gray("speck", plane).unwrap();
        OtsuDetector::new(4, Connectivity::Eight, false)
            .apply(&mut image)
            .unwrap();
        assert_eq!(image.num_objects(), 1);
    }
}
