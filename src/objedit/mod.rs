//! Object-map editing operations applied after detection.

use log::debug;

use crate::error::Result;
use crate::image::Image;
use crate::objects;
use crate::pipeline::ImageOperation;

/// Remove labeled objects below a minimum pixel area, then relabel densely.
///
/// Detectors already filter by size at the mask level; this operation exists
/// for cleaning maps loaded from a store or produced by map edits.
#[derive(Clone, Debug)]
pub struct SmallObjectRemover {
    pub min_area: usize,
}

impl SmallObjectRemover {
    pub fn new(min_area: usize) -> Self {
        Self { min_area }
    }
}

impl ImageOperation for SmallObjectRemover {
    fn name(&self) -> &'static str {
        "SmallObjectRemover"
    }

    fn apply(&self, image: &mut Image) -> Result<()> {
        let before = image.num_objects();
        let mut map = image.objmap().clone();
        objects::remove_small(&mut map, self.min_area);
        objects::relabel(&mut map);
        image.set_objmap(map)?;
        debug!(
            "SmallObjectRemover: image={} kept {}/{} objects",
            image.name(),
            image.num_objects(),
            before
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Matrix;

    #[test]
    fn removes_undersized_objects_and_relabels() {
        let mut image = Image::from_gray("m", Matrix::filled(2, 3, 0.5f32)).unwrap();
        image
            .set_objmap(Matrix::from_vec(2, 3, vec![4u32, 4, 0, 7, 0, 0]).unwrap())
            .unwrap();
        SmallObjectRemover::new(2).apply(&mut image).unwrap();
        assert_eq!(image.objmap().as_slice(), &[1, 1, 0, 0, 0, 0]);
    }
}
