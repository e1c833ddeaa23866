//! Zip packing of a finished image-set store.
//!
//! PNG planes are already compressed, so archive members are stored rather
//! than deflated. The archive mirrors the directory layout exactly, which
//! lets [`ArchiveReader`] address members with the same subgroup paths.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Error, Result};
use crate::image::io::{luma16_to_gray, luma16_to_objmap, rgb8_to_matrix};
use crate::image::{Image, ImageMeta, UserData};
use crate::measure::MeasurementTable;
use crate::store::{
    keys, ImageStatus, ENHANCED_FILE, GRAY_FILE, MANIFEST_FILE, META_FILE, MEASUREMENTS_FILE,
    OBJMAP_FILE, RGB_FILE, STATUS_FILE, USERDATA_FILE,
};

/// Zip a store directory into `zip_path`. The manifest goes first so a peek
/// at the archive head identifies the format.
pub fn pack_dir(root: &Path, zip_path: &Path) -> Result<()> {
    let file = File::create(zip_path)?;
    let mut zipw = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Stored);

    let mut entries: Vec<walkdir::DirEntry> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .collect();
    // Manifest first.
    entries.sort_by_key(|e| {
        (
            e.file_name().to_string_lossy() != MANIFEST_FILE,
            e.path().to_path_buf(),
        )
    });

    for entry in entries {
        let path = entry.path();
        let name = path
            .strip_prefix(root)
            .expect("walkdir yields children of root");
        // Zip member names always use forward slashes.
        let member: String = name
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        if member.is_empty() || member == super::LOCK_FILE {
            continue;
        }
        if path.is_file() {
            zipw.start_file(member.as_str(), options)?;
            let mut f = File::open(path)?;
            std::io::copy(&mut f, &mut zipw)?;
        } else {
            zipw.add_directory(member.as_str(), options)?;
        }
    }
    zipw.finish()?;
    Ok(())
}

/// Read-only access to a packed image-set archive.
pub struct ArchiveReader {
    archive: ZipArchive<File>,
    name: String,
}

impl ArchiveReader {
    pub fn open(zip_path: &Path) -> Result<Self> {
        let mut archive = ZipArchive::new(File::open(zip_path)?)?;
        let manifest: serde_json::Value = {
            let mut member = archive.by_name(MANIFEST_FILE).map_err(|_| Error::BadStore {
                path: zip_path.to_path_buf(),
                reason: format!("missing {MANIFEST_FILE}"),
            })?;
            let mut raw = String::new();
            member.read_to_string(&mut raw)?;
            serde_json::from_str(&raw)?
        };
        let name = manifest
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        Ok(Self { archive, name })
    }

    /// Set name recorded in the packed manifest.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn read_member(&mut self, member: &str) -> Result<Vec<u8>> {
        let mut file = self
            .archive
            .by_name(member)
            .map_err(|_| Error::MissingGroup {
                path: member.to_string(),
            })?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Names of all images in the archive, sorted.
    pub fn image_names(&mut self) -> Vec<String> {
        let prefix = format!("{}/", keys::IMAGES);
        let mut names: Vec<String> = self
            .archive
            .file_names()
            .filter_map(|f| {
                let rest = f.strip_prefix(&prefix)?;
                let (image, tail) = rest.split_once('/')?;
                (!tail.is_empty()).then(|| image.to_string())
            })
            .collect();
        names.sort();
        names.dedup();
        names
    }

    fn member_path(image: &str, subgroup: &str, file: &str) -> String {
        format!("{}/{image}/{subgroup}/{file}", keys::IMAGES)
    }

    /// Load an image from the archive.
    pub fn get_image(&mut self, image: &str) -> Result<Image> {
        let meta: ImageMeta = serde_json::from_slice(
            &self.read_member(&Self::member_path(image, keys::META, META_FILE))?,
        )?;
        let userdata: UserData =
            match self.read_member(&Self::member_path(image, keys::USERDATA, USERDATA_FILE)) {
                Ok(bytes) => serde_json::from_slice(&bytes)?,
                Err(_) => UserData::new(),
            };
        let gray = luma16_to_gray(&decode_luma16(
            &self.read_member(&Self::member_path(image, keys::DATA, GRAY_FILE))?,
        )?);
        let enhanced = luma16_to_gray(&decode_luma16(
            &self.read_member(&Self::member_path(image, keys::DATA, ENHANCED_FILE))?,
        )?);
        let objmap = luma16_to_objmap(&decode_luma16(
            &self.read_member(&Self::member_path(image, keys::DATA, OBJMAP_FILE))?,
        )?);
        let rgb = match self.read_member(&Self::member_path(image, keys::DATA, RGB_FILE)) {
            Ok(bytes) => Some(rgb8_to_matrix(&image::load_from_memory(&bytes)?.into_rgb8())),
            Err(_) => None,
        };
        Image::from_parts(meta, userdata, rgb, gray, enhanced, objmap)
    }

    /// Read an image's status from the archive.
    pub fn read_status(&mut self, image: &str) -> Result<ImageStatus> {
        match self.read_member(&Self::member_path(image, keys::STATUS, STATUS_FILE)) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(_) => Ok(ImageStatus::default()),
        }
    }

    /// Read an image's measurement table from the archive.
    pub fn read_measurements(&mut self, image: &str) -> Result<MeasurementTable> {
        let bytes =
            self.read_member(&Self::member_path(image, keys::MEASUREMENTS, MEASUREMENTS_FILE))?;
        MeasurementTable::from_csv(bytes.as_slice())
    }
}

fn decode_luma16(bytes: &[u8]) -> Result<image::ImageBuffer<image::Luma<u16>, Vec<u16>>> {
    Ok(image::load_from_memory(bytes)?.into_luma16())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Matrix;
    use crate::store::ImageSet;

    #[test]
    fn packed_archive_reads_back_images_and_tables() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("s");
        let set = ImageSet::create(&root, "scans").unwrap();
        {
            let writer = set.writer().unwrap();
            let mut image =
                Image::from_gray("p1", Matrix::filled(4, 4, 0.25f32)).unwrap();
            let mut map = Matrix::filled(4, 4, 0u32);
            map.set(2, 2, 1);
            image.set_objmap(map).unwrap();
            writer.put_image(&image, false).unwrap();

            let mut table = MeasurementTable::new(vec![1]);
            table.add_float_column("Size_Area", vec![1.0]).unwrap();
            writer.write_measurements("p1", &table).unwrap();
            writer
                .write_status(
                    "p1",
                    &ImageStatus {
                        processed: true,
                        ..Default::default()
                    },
                )
                .unwrap();
        }

        let zip_path = dir.path().join("scans.plateset.zip");
        set.pack(&zip_path).unwrap();

        let mut archive = ArchiveReader::open(&zip_path).unwrap();
        assert_eq!(archive.name(), "scans");
        assert_eq!(archive.image_names(), vec!["p1".to_string()]);
        let image = archive.get_image("p1").unwrap();
        assert_eq!(image.objmap().get(2, 2), 1);
        assert!(archive.read_status("p1").unwrap().processed);
        let table = archive.read_measurements("p1").unwrap();
        assert_eq!(table.float("Size_Area").unwrap(), &[1.0]);
        assert!(archive.get_image("missing").is_err());
    }
}
