//! Shape descriptors derived from region geometry and central moments.
//!
//! Perimeter counts exposed pixel edges (4-connectivity), so circularity is
//! exact for axis-aligned rectangles and approximate for curved outlines.

use rayon::prelude::*;

use crate::error::Result;
use crate::image::matrix::Matrix;
use crate::image::Image;
use crate::measure::MeasurementTable;
use crate::objects::{collect_regions, Region};
use crate::pipeline::MeasureFeatures;

pub const AREA: &str = "Shape_Area";
pub const PERIMETER: &str = "Shape_Perimeter";
pub const CIRCULARITY: &str = "Shape_Circularity";
pub const COMPACTNESS: &str = "Shape_Compactness";
pub const EXTENT: &str = "Shape_Extent";
pub const BBOX_AREA: &str = "Shape_BboxArea";
pub const EQUIVALENT_DIAMETER: &str = "Shape_EquivalentDiameter";
pub const ECCENTRICITY: &str = "Shape_Eccentricity";
pub const MAJOR_AXIS_LENGTH: &str = "Shape_MajorAxisLength";
pub const MINOR_AXIS_LENGTH: &str = "Shape_MinorAxisLength";
pub const ORIENTATION: &str = "Shape_Orientation";

struct ShapeRow {
    area: f64,
    perimeter: f64,
    circularity: f64,
    compactness: f64,
    extent: f64,
    bbox_area: f64,
    equivalent_diameter: f64,
    eccentricity: f64,
    major_axis: f64,
    minor_axis: f64,
    orientation: f64,
}

fn shape_row(region: &Region, map: &Matrix<u32>) -> ShapeRow {
    let (rows, cols) = map.shape();
    let area = region.area as f64;

    // Exposed 4-neighbor edges.
    let mut perimeter = 0.0f64;
    for &(rr, cc) in &region.coords {
        let label = region.label;
        if rr == 0 || map.get(rr - 1, cc) != label {
            perimeter += 1.0;
        }
        if rr + 1 == rows || map.get(rr + 1, cc) != label {
            perimeter += 1.0;
        }
        if cc == 0 || map.get(rr, cc - 1) != label {
            perimeter += 1.0;
        }
        if cc + 1 == cols || map.get(rr, cc + 1) != label {
            perimeter += 1.0;
        }
    }

    // Central second moments.
    let (c_rr, c_cc) = region.centroid;
    let mut mu20 = 0.0f64;
    let mut mu02 = 0.0f64;
    let mut mu11 = 0.0f64;
    for &(rr, cc) in &region.coords {
        let dr = rr as f64 - c_rr;
        let dc = cc as f64 - c_cc;
        mu20 += dr * dr;
        mu02 += dc * dc;
        mu11 += dr * dc;
    }
    mu20 /= area;
    mu02 /= area;
    mu11 /= area;
    let common = (((mu20 - mu02) / 2.0).powi(2) + mu11 * mu11).sqrt();
    let lambda1 = (mu20 + mu02) / 2.0 + common;
    let lambda2 = (mu20 + mu02) / 2.0 - common;
    let eccentricity = if lambda1 > 0.0 {
        (1.0 - (lambda2 / lambda1).max(0.0)).max(0.0).sqrt()
    } else {
        0.0
    };

    let four_pi_a = 4.0 * std::f64::consts::PI * area;
    let p2 = perimeter * perimeter;
    let bbox_area = region.bbox.area() as f64;
    ShapeRow {
        area,
        perimeter,
        circularity: if p2 > 0.0 { four_pi_a / p2 } else { f64::NAN },
        compactness: if four_pi_a > 0.0 { p2 / four_pi_a } else { f64::NAN },
        extent: area / bbox_area,
        bbox_area,
        equivalent_diameter: (4.0 * area / std::f64::consts::PI).sqrt(),
        eccentricity,
        major_axis: 4.0 * lambda1.max(0.0).sqrt(),
        minor_axis: 4.0 * lambda2.max(0.0).sqrt(),
        orientation: 0.5 * (2.0 * mu11).atan2(mu20 - mu02),
    }
}

/// Moment- and boundary-based shape descriptors per object.
#[derive(Clone, Copy, Debug, Default)]
pub struct MeasureShape;

impl MeasureFeatures for MeasureShape {
    fn name(&self) -> &'static str {
        "MeasureShape"
    }

    fn measure(&self, image: &Image) -> Result<MeasurementTable> {
        let map = image.objmap();
        let regions = collect_regions(map);
        let shapes: Vec<ShapeRow> = regions.par_iter().map(|r| shape_row(r, map)).collect();
        let mut table = MeasurementTable::new(regions.iter().map(|r| r.label).collect());
        table.add_float_column(AREA, shapes.iter().map(|s| s.area).collect())?;
        table.add_float_column(PERIMETER, shapes.iter().map(|s| s.perimeter).collect())?;
        table.add_float_column(CIRCULARITY, shapes.iter().map(|s| s.circularity).collect())?;
        table.add_float_column(COMPACTNESS, shapes.iter().map(|s| s.compactness).collect())?;
        table.add_float_column(EXTENT, shapes.iter().map(|s| s.extent).collect())?;
        table.add_float_column(BBOX_AREA, shapes.iter().map(|s| s.bbox_area).collect())?;
        table.add_float_column(
            EQUIVALENT_DIAMETER,
            shapes.iter().map(|s| s.equivalent_diameter).collect(),
        )?;
        table.add_float_column(
            ECCENTRICITY,
            shapes.iter().map(|s| s.eccentricity).collect(),
        )?;
        table.add_float_column(
            MAJOR_AXIS_LENGTH,
            shapes.iter().map(|s| s.major_axis).collect(),
        )?;
        table.add_float_column(
            MINOR_AXIS_LENGTH,
            shapes.iter().map(|s| s.minor_axis).collect(),
        )?;
        table.add_float_column(ORIENTATION, shapes.iter().map(|s| s.orientation).collect())?;
        Ok(table)
    }
}
