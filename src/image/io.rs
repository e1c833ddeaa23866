//! I/O helpers: file decode, plane/PNG conversion, JSON writing, overlays.
//!
//! - [`imread`]: read a PNG/JPEG/TIFF/BMP into an [`Image`].
//! - [`gray_to_luma8`] / [`gray_to_luma16`] and inverses: plane conversion
//!   used both by the imageproc interop and by the store.
//! - [`write_json_file`]: pretty-print a serializable value to disk.
//! - [`render_overlay`]: object boundaries and grid lines burned into RGB.

use std::fs;
use std::path::Path;

use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::grid::GridEdges;
use crate::image::core::Image;
use crate::image::matrix::Matrix;

/// Extensions accepted when importing a directory of scans.
pub const ACCEPTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp"];

/// Load an image file into an [`Image`]. Color sources keep their RGB plane;
/// grayscale sources populate only the matrix planes.
pub fn imread(path: &Path) -> Result<Image> {
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let decoded = image::open(path)?;
    match decoded {
        DynamicImage::ImageLuma8(gray) => Image::from_gray(name, luma8_to_gray(&gray)),
        DynamicImage::ImageLuma16(gray) => {
            let (w, h) = gray.dimensions();
            let data = gray.as_raw().iter().map(|&v| v as f32 / 65535.0).collect();
            Image::from_gray(name, Matrix::from_vec(h as usize, w as usize, data)?)
        }
        other => {
            let rgb = other.into_rgb8();
            Image::from_rgb(name, rgb8_to_matrix(&rgb))
        }
    }
}

/// Convert a `[0, 1]` float plane to an 8-bit grayscale image.
pub fn gray_to_luma8(plane: &Matrix<f32>) -> GrayImage {
    let (rows, cols) = plane.shape();
    let data = plane
        .as_slice()
        .iter()
        .map(|&v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect();
    GrayImage::from_raw(cols as u32, rows as u32, data).expect("plane length matches dimensions")
}

/// Convert a `[0, 1]` float plane to a 16-bit grayscale image (store format).
pub fn gray_to_luma16(plane: &Matrix<f32>) -> ImageBuffer<Luma<u16>, Vec<u16>> {
    let (rows, cols) = plane.shape();
    let data = plane
        .as_slice()
        .iter()
        .map(|&v| (v.clamp(0.0, 1.0) * 65535.0).round() as u16)
        .collect();
    ImageBuffer::from_raw(cols as u32, rows as u32, data).expect("plane length matches dimensions")
}

/// Inverse of [`gray_to_luma8`].
pub fn luma8_to_gray(img: &GrayImage) -> Matrix<f32> {
    let (w, h) = img.dimensions();
    let data = img.as_raw().iter().map(|&v| v as f32 / 255.0).collect();
    Matrix::from_vec(h as usize, w as usize, data).expect("raw buffer matches dimensions")
}

/// Inverse of [`gray_to_luma16`].
pub fn luma16_to_gray(img: &ImageBuffer<Luma<u16>, Vec<u16>>) -> Matrix<f32> {
    let (w, h) = img.dimensions();
    let data = img.as_raw().iter().map(|&v| v as f32 / 65535.0).collect();
    Matrix::from_vec(h as usize, w as usize, data).expect("raw buffer matches dimensions")
}

/// Convert an RGB image to the crate's color plane.
pub fn rgb8_to_matrix(img: &RgbImage) -> Matrix<[u8; 3]> {
    let (w, h) = img.dimensions();
    let data = img.pixels().map(|p| p.0).collect();
    Matrix::from_vec(h as usize, w as usize, data).expect("raw buffer matches dimensions")
}

/// Convert the crate's color plane to an RGB image.
pub fn matrix_to_rgb8(plane: &Matrix<[u8; 3]>) -> RgbImage {
    let (rows, cols) = plane.shape();
    let mut out = RgbImage::new(cols as u32, rows as u32);
    for (rr, row) in plane.iter_rows().enumerate() {
        for (cc, px) in row.iter().enumerate() {
            out.put_pixel(cc as u32, rr as u32, Rgb(*px));
        }
    }
    out
}

/// Convert an object map to a 16-bit grayscale image for persistence.
///
/// Labels above `u16::MAX` cannot be represented; detection relabels densely
/// so this only fires on corrupted maps.
pub fn objmap_to_luma16(map: &Matrix<u32>) -> Result<ImageBuffer<Luma<u16>, Vec<u16>>> {
    let (rows, cols) = map.shape();
    let mut data = Vec::with_capacity(rows * cols);
    for &v in map.as_slice() {
        if v > u16::MAX as u32 {
            return Err(Error::InvalidObjectMap {
                reason: format!("label {v} exceeds the persistable range"),
            });
        }
        data.push(v as u16);
    }
    Ok(ImageBuffer::from_raw(cols as u32, rows as u32, data)
        .expect("plane length matches dimensions"))
}

/// Inverse of [`objmap_to_luma16`].
pub fn luma16_to_objmap(img: &ImageBuffer<Luma<u16>, Vec<u16>>) -> Matrix<u32> {
    let (w, h) = img.dimensions();
    let data = img.as_raw().iter().map(|&v| v as u32).collect();
    Matrix::from_vec(h as usize, w as usize, data).expect("raw buffer matches dimensions")
}

/// Serialize a value as pretty JSON to `path`, creating parent directories.
pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent_dir(path)?;
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

const OBJECT_COLOR: Rgb<u8> = Rgb([0, 220, 90]);
const GRID_COLOR: Rgb<u8> = Rgb([0, 200, 220]);

/// Render the image with object boundaries highlighted and, optionally, grid
/// lines drawn at the fitted edges.
pub fn render_overlay(image: &Image, edges: Option<&GridEdges>) -> RgbImage {
    let (rows, cols) = image.shape();
    let mut out = match image.rgb() {
        Some(rgb) => matrix_to_rgb8(rgb),
        None => {
            let gray = gray_to_luma8(image.gray());
            let mut rgb = RgbImage::new(cols as u32, rows as u32);
            for (x, y, px) in gray.enumerate_pixels() {
                rgb.put_pixel(x, y, Rgb([px[0], px[0], px[0]]));
            }
            rgb
        }
    };

    // Boundary pixel: labeled, with at least one 4-neighbor of another value.
    let map = image.objmap();
    for rr in 0..rows {
        for cc in 0..cols {
            let v = map.get(rr, cc);
            if v == 0 {
                continue;
            }
            let boundary = (rr == 0 || map.get(rr - 1, cc) != v)
                || (rr + 1 == rows || map.get(rr + 1, cc) != v)
                || (cc == 0 || map.get(rr, cc - 1) != v)
                || (cc + 1 == cols || map.get(rr, cc + 1) != v);
            if boundary {
                out.put_pixel(cc as u32, rr as u32, OBJECT_COLOR);
            }
        }
    }

    if let Some(edges) = edges {
        for &rr in edges.row_edges() {
            let rr = (rr.round() as i64).clamp(0, rows as i64 - 1) as u32;
            for cc in 0..cols as u32 {
                out.put_pixel(cc, rr, GRID_COLOR);
            }
        }
        for &cc in edges.col_edges() {
            let cc = (cc.round() as i64).clamp(0, cols as i64 - 1) as u32;
            for rr in 0..rows as u32 {
                out.put_pixel(cc, rr, GRID_COLOR);
            }
        }
    }
    out
}
