//! On-disk image-set store.
//!
//! An [`ImageSet`] is a directory with a manifest and one group per image,
//! each holding a fixed family of subgroups:
//!
//! ```text
//! <root>/
//!   plateset.json                          manifest
//!   images/<name>/data/gray.png            16-bit grayscale plane
//!   images/<name>/data/enhanced.png        16-bit enhanced plane
//!   images/<name>/data/objmap.png          16-bit object map
//!   images/<name>/data/rgb.png             color plane, when present
//!   images/<name>/meta/meta.json           protected metadata
//!   images/<name>/userdata/userdata.json   public metadata
//!   images/<name>/status/status.json       processing status flags
//!   images/<name>/measurements/measurements.csv
//! ```
//!
//! Concurrency discipline is single-writer/multiple-readers: [`SetWriter`]
//! holds an exclusive lock file for its lifetime, and every file it writes is
//! staged to a temp name and renamed into place, so readers opened at any
//! moment see whole files. A finished set can be packed into a single zip
//! archive ([`ImageSet::pack`]) and read back with [`ArchiveReader`].

mod pack;

pub use self::pack::ArchiveReader;

use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::image::io::{
    self, gray_to_luma16, luma16_to_gray, luma16_to_objmap, matrix_to_rgb8, objmap_to_luma16,
    rgb8_to_matrix,
};
use crate::image::{Image, ImageMeta, UserData};
use crate::measure::MeasurementTable;

/// Subgroup keys of each image group.
pub mod keys {
    pub const IMAGES: &str = "images";
    pub const DATA: &str = "data";
    pub const META: &str = "meta";
    pub const USERDATA: &str = "userdata";
    pub const STATUS: &str = "status";
    pub const MEASUREMENTS: &str = "measurements";
}

pub(crate) const MANIFEST_FILE: &str = "plateset.json";
pub(crate) const LOCK_FILE: &str = ".writer.lock";
pub(crate) const GRAY_FILE: &str = "gray.png";
pub(crate) const ENHANCED_FILE: &str = "enhanced.png";
pub(crate) const OBJMAP_FILE: &str = "objmap.png";
pub(crate) const RGB_FILE: &str = "rgb.png";
pub(crate) const META_FILE: &str = "meta.json";
pub(crate) const USERDATA_FILE: &str = "userdata.json";
pub(crate) const STATUS_FILE: &str = "status.json";
pub(crate) const MEASUREMENTS_FILE: &str = "measurements.csv";

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
    name: String,
}

/// Per-image processing status flags, persisted in the `status` subgroup.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageStatus {
    /// Operations ran to completion.
    pub processed: bool,
    /// Measurements were extracted and stored.
    pub measured: bool,
    /// Failure message from the last processing attempt, if any.
    pub error: Option<String>,
    /// Segmentation judged usable (set by review tooling).
    pub segmentation_valid: Option<bool>,
    /// Measurements judged usable (set during extraction or post-processing).
    pub analysis_valid: Option<bool>,
}

/// Image names become directory names; keep them path-safe.
fn check_image_name(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.chars().any(|c| c == '/' || c == '\\' || c == '\0');
    if bad {
        return Err(Error::InvalidParameter {
            parameter: "image name".into(),
            value: name.to_string(),
        });
    }
    Ok(())
}

/// Stage-and-rename write so readers never observe partial files.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    {
        let mut f = File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn encode_png<P, C>(img: &image::ImageBuffer<P, C>) -> Result<Vec<u8>>
where
    P: image::Pixel + image::PixelWithColorType,
    C: std::ops::Deref<Target = [P::Subpixel]>,
    [P::Subpixel]: image::EncodableLayout,
{
    let mut bytes = std::io::Cursor::new(Vec::new());
    img.write_to(&mut bytes, image::ImageFormat::Png)?;
    Ok(bytes.into_inner())
}

/// A named image collection backed by one directory store.
#[derive(Clone, Debug)]
pub struct ImageSet {
    name: String,
    root: PathBuf,
}

impl ImageSet {
    /// Create a new store directory (parents included) with a manifest.
    pub fn create(root: &Path, name: &str) -> Result<Self> {
        if root.exists() && root.join(MANIFEST_FILE).exists() {
            return Err(Error::BadStore {
                path: root.to_path_buf(),
                reason: "already an image-set store".into(),
            });
        }
        fs::create_dir_all(root.join(keys::IMAGES))?;
        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            name: name.to_string(),
        };
        io::write_json_file(&root.join(MANIFEST_FILE), &manifest)?;
        debug!("ImageSet::create name='{name}' root={}", root.display());
        Ok(Self {
            name: name.to_string(),
            root: root.to_path_buf(),
        })
    }

    /// Open an existing store directory.
    pub fn open(root: &Path) -> Result<Self> {
        let manifest_path = root.join(MANIFEST_FILE);
        let raw = fs::read_to_string(&manifest_path).map_err(|_| Error::BadStore {
            path: root.to_path_buf(),
            reason: format!("missing {MANIFEST_FILE}"),
        })?;
        let manifest: Manifest = serde_json::from_str(&raw)?;
        if manifest.format_version > FORMAT_VERSION {
            return Err(Error::BadStore {
                path: root.to_path_buf(),
                reason: format!("unsupported format version {}", manifest.format_version),
            });
        }
        Ok(Self {
            name: manifest.name,
            root: root.to_path_buf(),
        })
    }

    /// Set name from the manifest.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn image_dir(&self, image: &str) -> PathBuf {
        self.root.join(keys::IMAGES).join(image)
    }

    /// Names of all stored images, sorted.
    pub fn image_names(&self) -> Result<Vec<String>> {
        let images_dir = self.root.join(keys::IMAGES);
        let mut names = Vec::new();
        for entry in fs::read_dir(&images_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Acquire the exclusive writer handle. Fails with [`Error::StoreLocked`]
    /// while another writer is alive.
    pub fn writer(&self) -> Result<SetWriter> {
        let lock_path = self.root.join(LOCK_FILE);
        match File::options().write(true).create_new(true).open(&lock_path) {
            Ok(_) => Ok(SetWriter {
                set: self.clone(),
                lock_path,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(Error::StoreLocked {
                path: self.root.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// A read-only view. Many readers may coexist with one writer.
    pub fn reader(&self) -> SetReader {
        SetReader { set: self.clone() }
    }

    /// Import every accepted image file from a directory, sorted by name.
    pub fn import_dir(&self, dir: &Path) -> Result<usize> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension()
                    .map(|ext| {
                        io::ACCEPTED_EXTENSIONS
                            .contains(&ext.to_string_lossy().to_lowercase().as_str())
                    })
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();
        let writer = self.writer()?;
        let mut count = 0usize;
        for path in paths {
            let image = Image::imread(&path)?;
            writer.put_image(&image, true)?;
            count += 1;
        }
        debug!("ImageSet::import_dir imported {count} images from {}", dir.display());
        Ok(count)
    }

    /// Pack the store into a single zip archive (stored, uncompressed PNGs).
    pub fn pack(&self, zip_path: &Path) -> Result<()> {
        pack::pack_dir(&self.root, zip_path)
    }
}

/// Exclusive writer over an [`ImageSet`]; holds the store lock until drop.
pub struct SetWriter {
    set: ImageSet,
    lock_path: PathBuf,
}

impl Drop for SetWriter {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}

impl SetWriter {
    /// Persist an image into its group. Without `overwrite`, a name collision
    /// is an error.
    pub fn put_image(&self, image: &Image, overwrite: bool) -> Result<()> {
        check_image_name(image.name())?;
        let dir = self.set.image_dir(image.name());
        if dir.exists() && !overwrite {
            return Err(Error::DuplicateImage {
                set: self.set.name.clone(),
                name: image.name().to_string(),
            });
        }
        let data = dir.join(keys::DATA);
        write_atomic(
            &data.join(GRAY_FILE),
            &encode_png(&gray_to_luma16(image.gray()))?,
        )?;
        write_atomic(
            &data.join(ENHANCED_FILE),
            &encode_png(&gray_to_luma16(image.enhanced()))?,
        )?;
        write_atomic(
            &data.join(OBJMAP_FILE),
            &encode_png(&objmap_to_luma16(image.objmap())?)?,
        )?;
        if let Some(rgb) = image.rgb() {
            write_atomic(&data.join(RGB_FILE), &encode_png(&matrix_to_rgb8(rgb))?)?;
        }
        write_atomic(
            &dir.join(keys::META).join(META_FILE),
            serde_json::to_string_pretty(image.meta())?.as_bytes(),
        )?;
        write_atomic(
            &dir.join(keys::USERDATA).join(USERDATA_FILE),
            serde_json::to_string_pretty(image.userdata())?.as_bytes(),
        )?;
        Ok(())
    }

    /// Write an image's status flags.
    pub fn write_status(&self, image: &str, status: &ImageStatus) -> Result<()> {
        check_image_name(image)?;
        write_atomic(
            &self
                .set
                .image_dir(image)
                .join(keys::STATUS)
                .join(STATUS_FILE),
            serde_json::to_string_pretty(status)?.as_bytes(),
        )
    }

    /// Pre-allocate the measurement layout: header only, rows appended later.
    pub fn declare_measurement_schema(&self, image: &str, header: &[String]) -> Result<()> {
        check_image_name(image)?;
        let mut buf = Vec::new();
        {
            let mut wtr = csv::Writer::from_writer(&mut buf);
            wtr.write_record(header)?;
            wtr.flush()?;
        }
        write_atomic(
            &self
                .set
                .image_dir(image)
                .join(keys::MEASUREMENTS)
                .join(MEASUREMENTS_FILE),
            &buf,
        )
    }

    /// Append rows to a declared layout; the table's header must match.
    pub fn append_measurements(&self, image: &str, table: &MeasurementTable) -> Result<()> {
        check_image_name(image)?;
        let path = self
            .set
            .image_dir(image)
            .join(keys::MEASUREMENTS)
            .join(MEASUREMENTS_FILE);
        let existing = fs::read(&path).map_err(|_| Error::MissingGroup {
            path: format!(
                "{}/{}/{}",
                image,
                keys::MEASUREMENTS,
                MEASUREMENTS_FILE
            ),
        })?;
        {
            let mut rdr = csv::Reader::from_reader(existing.as_slice());
            let declared: Vec<String> =
                rdr.headers()?.iter().map(|s| s.to_string()).collect();
            if declared != table.header_record() {
                return Err(Error::TableSchema {
                    reason: format!(
                        "declared layout {:?} does not match table {:?}",
                        declared,
                        table.header_record()
                    ),
                });
            }
        }
        let mut combined = existing;
        {
            let mut wtr = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(&mut combined);
            for row in 0..table.len() {
                wtr.write_record(table.row_record(row))?;
            }
            wtr.flush()?;
        }
        write_atomic(&path, &combined)
    }

    /// Replace an image's measurement table wholesale.
    pub fn write_measurements(&self, image: &str, table: &MeasurementTable) -> Result<()> {
        check_image_name(image)?;
        let mut buf = Vec::new();
        table.to_csv(&mut buf)?;
        write_atomic(
            &self
                .set
                .image_dir(image)
                .join(keys::MEASUREMENTS)
                .join(MEASUREMENTS_FILE),
            &buf,
        )
    }
}

/// Read-only view over an [`ImageSet`].
pub struct SetReader {
    set: ImageSet,
}

impl SetReader {
    fn require_image_dir(&self, image: &str) -> Result<PathBuf> {
        check_image_name(image)?;
        let dir = self.set.image_dir(image);
        if !dir.is_dir() {
            return Err(Error::ImageNotFound {
                set: self.set.name.clone(),
                name: image.to_string(),
            });
        }
        Ok(dir)
    }

    /// Names of all stored images, sorted.
    pub fn image_names(&self) -> Result<Vec<String>> {
        self.set.image_names()
    }

    /// Load an image from its group.
    pub fn get_image(&self, image: &str) -> Result<Image> {
        let dir = self.require_image_dir(image)?;
        let data = dir.join(keys::DATA);

        let meta: ImageMeta =
            serde_json::from_str(&fs::read_to_string(dir.join(keys::META).join(META_FILE))?)?;
        let userdata: UserData = match fs::read_to_string(
            dir.join(keys::USERDATA).join(USERDATA_FILE),
        ) {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(_) => UserData::new(),
        };

        let load_luma16 = |file: &str| -> Result<image::ImageBuffer<image::Luma<u16>, Vec<u16>>> {
            let decoded = image::open(data.join(file))?;
            Ok(decoded.into_luma16())
        };
        let gray = luma16_to_gray(&load_luma16(GRAY_FILE)?);
        let enhanced = luma16_to_gray(&load_luma16(ENHANCED_FILE)?);
        let objmap = luma16_to_objmap(&load_luma16(OBJMAP_FILE)?);
        let rgb_path = data.join(RGB_FILE);
        let rgb = if rgb_path.exists() {
            Some(rgb8_to_matrix(&image::open(rgb_path)?.into_rgb8()))
        } else {
            None
        };
        Image::from_parts(meta, userdata, rgb, gray, enhanced, objmap)
    }

    /// Read an image's status; a never-written status is the default.
    pub fn read_status(&self, image: &str) -> Result<ImageStatus> {
        let dir = self.require_image_dir(image)?;
        match fs::read_to_string(dir.join(keys::STATUS).join(STATUS_FILE)) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(_) => Ok(ImageStatus::default()),
        }
    }

    /// Read an image's measurement table.
    pub fn read_measurements(&self, image: &str) -> Result<MeasurementTable> {
        let dir = self.require_image_dir(image)?;
        let path = dir.join(keys::MEASUREMENTS).join(MEASUREMENTS_FILE);
        if !path.exists() {
            return Err(Error::MissingGroup {
                path: format!("{}/{}/{}", image, keys::MEASUREMENTS, MEASUREMENTS_FILE),
            });
        }
        MeasurementTable::from_csv_path(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Matrix;

    fn sample_image(name: &str) -> Image {
        let gray = Matrix::from_vec(3, 4, (0..12).map(|i| i as f32 / 12.0).collect()).unwrap();
        let mut image = Image::from_gray(name, gray).unwrap();
        let mut map = Matrix::filled(3, 4, 0u32);
        map.set(1, 1, 1);
        map.set(1, 2, 1);
        image.set_objmap(map).unwrap();
        image.userdata_mut().insert("Plate", "P-07").unwrap();
        image
    }

    #[test]
    fn create_open_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("scans.plateset");
        let set = ImageSet::create(&root, "scans").unwrap();
        assert_eq!(set.name(), "scans");
        let reopened = ImageSet::open(&root).unwrap();
        assert_eq!(reopened.name(), "scans");
        assert!(ImageSet::create(&root, "again").is_err());
        assert!(ImageSet::open(dir.path()).is_err());
    }

    #[test]
    fn image_roundtrip_preserves_planes_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let set = ImageSet::create(&dir.path().join("s"), "s").unwrap();
        let image = sample_image("plate_001");
        set.writer().unwrap().put_image(&image, false).unwrap();

        let loaded = set.reader().get_image("plate_001").unwrap();
        assert_eq!(loaded.name(), "plate_001");
        assert_eq!(loaded.shape(), (3, 4));
        assert_eq!(loaded.objmap(), image.objmap());
        assert_eq!(loaded.userdata().get("Plate"), Some("P-07"));
        for (a, b) in image
            .gray()
            .as_slice()
            .iter()
            .zip(loaded.gray().as_slice())
        {
            assert!((a - b).abs() < 1.0 / 65535.0);
        }
    }

    #[test]
    fn duplicate_names_require_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let set = ImageSet::create(&dir.path().join("s"), "s").unwrap();
        let writer = set.writer().unwrap();
        writer.put_image(&sample_image("a"), false).unwrap();
        assert!(matches!(
            writer.put_image(&sample_image("a"), false),
            Err(Error::DuplicateImage { .. })
        ));
        writer.put_image(&sample_image("a"), true).unwrap();
    }

    #[test]
    fn writer_lock_is_exclusive_and_released() {
        let dir = tempfile::tempdir().unwrap();
        let set = ImageSet::create(&dir.path().join("s"), "s").unwrap();
        let writer = set.writer().unwrap();
        assert!(matches!(set.writer(), Err(Error::StoreLocked { .. })));
        drop(writer);
        assert!(set.writer().is_ok());
    }

    #[test]
    fn status_defaults_then_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let set = ImageSet::create(&dir.path().join("s"), "s").unwrap();
        let writer = set.writer().unwrap();
        writer.put_image(&sample_image("a"), false).unwrap();
        assert_eq!(set.reader().read_status("a").unwrap(), ImageStatus::default());

        let status = ImageStatus {
            processed: true,
            measured: true,
            error: None,
            segmentation_valid: Some(true),
            analysis_valid: None,
        };
        writer.write_status("a", &status).unwrap();
        assert_eq!(set.reader().read_status("a").unwrap(), status);
        assert!(set.reader().read_status("missing").is_err());
    }

    #[test]
    fn declared_schema_gates_appends() {
        let dir = tempfile::tempdir().unwrap();
        let set = ImageSet::create(&dir.path().join("s"), "s").unwrap();
        let writer = set.writer().unwrap();
        writer.put_image(&sample_image("a"), false).unwrap();

        let mut table = MeasurementTable::new(vec![1, 2]);
        table.add_float_column("Size_Area", vec![9.0, 4.0]).unwrap();
        writer
            .declare_measurement_schema("a", &table.header_record())
            .unwrap();
        writer.append_measurements("a", &table).unwrap();
        writer.append_measurements("a", &table).unwrap();

        let read = set.reader().read_measurements("a").unwrap();
        assert_eq!(read.labels(), &[1, 2, 1, 2]);

        let mut other = MeasurementTable::new(vec![1]);
        other.add_float_column("Other", vec![1.0]).unwrap();
        assert!(matches!(
            writer.append_measurements("a", &other),
            Err(Error::TableSchema { .. })
        ));
    }

    #[test]
    fn bad_image_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let set = ImageSet::create(&dir.path().join("s"), "s").unwrap();
        let writer = set.writer().unwrap();
        let mut image = sample_image("ok");
        image.set_name("../escape");
        assert!(writer.put_image(&image, false).is_err());
    }
}
