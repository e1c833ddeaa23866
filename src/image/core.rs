//! The central image entity.
//!
//! An [`Image`] bundles the planes the rest of the crate works on: optional
//! RGB pixel data, a derived grayscale matrix, an enhanced grayscale matrix
//! that operations refine, and an integer object map produced by detection.
//! All planes share one shape; the object mask is derived from the map so the
//! two can never disagree.

use std::path::Path;

use crate::error::{Error, Result};
use crate::image::format::{ImageFormat, ImageKind};
use crate::image::io;
use crate::image::matrix::Matrix;
use crate::image::metadata::{ImageMeta, UserData};

/// A plate-scan image with its derived planes and metadata.
#[derive(Clone, Debug)]
pub struct Image {
    meta: ImageMeta,
    userdata: UserData,
    rgb: Option<Matrix<[u8; 3]>>,
    gray: Matrix<f32>,
    enhanced: Matrix<f32>,
    objmap: Matrix<u32>,
}

impl Image {
    /// Build an image from a grayscale plane with values in `[0, 1]`.
    pub fn from_gray(name: impl Into<String>, gray: Matrix<f32>) -> Result<Self> {
        let name = name.into();
        if gray.is_empty() {
            return Err(Error::EmptyImage { name });
        }
        let (rows, cols) = gray.shape();
        Ok(Self {
            meta: ImageMeta::new(name, ImageFormat::Grayscale),
            userdata: UserData::new(),
            rgb: None,
            enhanced: gray.clone(),
            gray,
            objmap: Matrix::filled(rows, cols, 0u32),
        })
    }

    /// Build an image from an RGB plane; the grayscale plane is derived with
    /// Rec. 601 luma weights.
    pub fn from_rgb(name: impl Into<String>, rgb: Matrix<[u8; 3]>) -> Result<Self> {
        let name = name.into();
        if rgb.is_empty() {
            return Err(Error::EmptyImage { name });
        }
        let gray = rgb.map(|[r, g, b]| {
            (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32) / 255.0
        });
        let (rows, cols) = gray.shape();
        Ok(Self {
            meta: ImageMeta::new(name, ImageFormat::Rgb),
            userdata: UserData::new(),
            rgb: Some(rgb),
            enhanced: gray.clone(),
            gray,
            objmap: Matrix::filled(rows, cols, 0u32),
        })
    }

    /// Read an image file from disk. The file stem becomes the image name.
    pub fn imread(path: &Path) -> Result<Self> {
        io::imread(path)
    }

    /// Reassemble an image from previously persisted planes and metadata.
    ///
    /// Used by the store; validates that every plane agrees on shape.
    pub(crate) fn from_parts(
        meta: ImageMeta,
        userdata: UserData,
        rgb: Option<Matrix<[u8; 3]>>,
        gray: Matrix<f32>,
        enhanced: Matrix<f32>,
        objmap: Matrix<u32>,
    ) -> Result<Self> {
        gray.check_same_shape(&enhanced)?;
        gray.check_same_shape(&objmap)?;
        if let Some(rgb) = &rgb {
            gray.check_same_shape(rgb)?;
        }
        if gray.is_empty() {
            return Err(Error::EmptyImage { name: meta.name });
        }
        Ok(Self {
            meta,
            userdata,
            rgb,
            gray,
            enhanced,
            objmap,
        })
    }

    /// `(rows, cols)` of every plane.
    pub fn shape(&self) -> (usize, usize) {
        self.gray.shape()
    }

    /// Image name (unique within a set).
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// Rename the image. The identifier is left untouched.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.meta.name = name.into();
    }

    /// Protected metadata block.
    pub fn meta(&self) -> &ImageMeta {
        &self.meta
    }

    pub(crate) fn set_kind(&mut self, kind: ImageKind) {
        self.meta.kind = kind;
    }

    /// Public metadata map.
    pub fn userdata(&self) -> &UserData {
        &self.userdata
    }

    /// Mutable public metadata map.
    pub fn userdata_mut(&mut self) -> &mut UserData {
        &mut self.userdata
    }

    /// Original color plane, when the source was color.
    pub fn rgb(&self) -> Option<&Matrix<[u8; 3]>> {
        self.rgb.as_ref()
    }

    /// Grayscale plane in `[0, 1]`, untouched by enhancement.
    pub fn gray(&self) -> &Matrix<f32> {
        &self.gray
    }

    /// Enhanced grayscale plane; operations read and refine this.
    pub fn enhanced(&self) -> &Matrix<f32> {
        &self.enhanced
    }

    /// Replace the enhanced plane. Shape must match.
    pub fn set_enhanced(&mut self, enhanced: Matrix<f32>) -> Result<()> {
        self.gray.check_same_shape(&enhanced)?;
        self.enhanced = enhanced;
        Ok(())
    }

    /// Integer object map: 0 = background, positive labels = objects.
    pub fn objmap(&self) -> &Matrix<u32> {
        &self.objmap
    }

    /// Replace the object map. Shape must match.
    pub fn set_objmap(&mut self, objmap: Matrix<u32>) -> Result<()> {
        self.gray.check_same_shape(&objmap)?;
        self.objmap = objmap;
        Ok(())
    }

    /// Boolean mask of all object pixels, derived from the map.
    pub fn objmask(&self) -> Matrix<bool> {
        self.objmap.map(|v| v != 0)
    }

    /// Number of distinct object labels in the map.
    pub fn num_objects(&self) -> usize {
        let mut labels: Vec<u32> = self
            .objmap
            .as_slice()
            .iter()
            .copied()
            .filter(|&v| v != 0)
            .collect();
        labels.sort_unstable();
        labels.dedup();
        labels.len()
    }

    /// Drop detection state: the enhanced plane reverts to the grayscale
    /// plane and the object map is cleared.
    pub fn reset(&mut self) {
        self.enhanced = self.gray.clone();
        let (rows, cols) = self.shape();
        self.objmap = Matrix::filled(rows, cols, 0u32);
    }

    /// Crop a rectangular window `[rr0, rr1) x [cc0, cc1)` into a new image.
    pub fn crop(&self, rr0: usize, rr1: usize, cc0: usize, cc1: usize) -> Result<Image> {
        let (rows, cols) = self.shape();
        if rr0 >= rr1 || cc0 >= cc1 || rr1 > rows || cc1 > cols {
            return Err(Error::InvalidParameter {
                parameter: "crop window".into(),
                value: format!("[{rr0}, {rr1}) x [{cc0}, {cc1}) of {rows}x{cols}"),
            });
        }
        let ch = rr1 - rr0;
        let cw = cc1 - cc0;
        let copy_plane = |src: &Matrix<f32>| {
            let mut out = Matrix::filled(ch, cw, 0.0f32);
            for rr in 0..ch {
                out.row_mut(rr).copy_from_slice(&src.row(rr0 + rr)[cc0..cc1]);
            }
            out
        };
        let gray = copy_plane(&self.gray);
        let enhanced = copy_plane(&self.enhanced);
        let mut objmap = Matrix::filled(ch, cw, 0u32);
        for rr in 0..ch {
            objmap
                .row_mut(rr)
                .copy_from_slice(&self.objmap.row(rr0 + rr)[cc0..cc1]);
        }
        let rgb = self.rgb.as_ref().map(|src| {
            let mut out = Matrix::filled(ch, cw, [0u8; 3]);
            for rr in 0..ch {
                out.row_mut(rr).copy_from_slice(&src.row(rr0 + rr)[cc0..cc1]);
            }
            out
        });
        let mut meta = self.meta.clone();
        meta.name = format!("{}_crop_{}_{}", self.meta.name, rr0, cc0);
        meta.kind = ImageKind::Crop;
        Image::from_parts(meta, self.userdata.clone(), rgb, gray, enhanced, objmap)
    }
}
