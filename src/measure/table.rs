//! Label-keyed measurement tables.
//!
//! One row per detected object, keyed by object label; columns are typed
//! (float or text). Tables from independent measures merge on the shared
//! label key; tables from different images concatenate with an `ImageName`
//! column. CSV is the interchange format.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::{Error, Result};

/// Well-known column names shared across the crate.
pub mod columns {
    pub const OBJECT_LABEL: &str = "ObjectLabel";
    pub const IMAGE_NAME: &str = "ImageName";
}

/// Typed column storage. Missing float entries are NaN, missing text entries
/// are empty strings.
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnData {
    Float(Vec<f64>),
    Text(Vec<String>),
}

impl ColumnData {
    fn len(&self) -> usize {
        match self {
            ColumnData::Float(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    fn push_missing(&mut self) {
        match self {
            ColumnData::Float(v) => v.push(f64::NAN),
            ColumnData::Text(v) => v.push(String::new()),
        }
    }

    fn format_cell(&self, idx: usize) -> String {
        match self {
            ColumnData::Float(v) => {
                let x = v[idx];
                if x.is_nan() {
                    String::new()
                } else {
                    format!("{x}")
                }
            }
            ColumnData::Text(v) => v[idx].clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Column {
    name: String,
    data: ColumnData,
}

/// A tabular set of per-object measurements keyed by object label.
///
/// Within a single image the labels are unique; after [`concat`] the key is
/// the (`ImageName`, label) pair.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeasurementTable {
    labels: Vec<u32>,
    columns: Vec<Column>,
}

impl MeasurementTable {
    /// A table with rows for the given labels and no columns yet.
    pub fn new(labels: Vec<u32>) -> Self {
        Self {
            labels,
            columns: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Object labels, one per row.
    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    fn check_new_column(&self, name: &str, len: usize) -> Result<()> {
        if self.has_column(name) {
            return Err(Error::TableSchema {
                reason: format!("duplicate column '{name}'"),
            });
        }
        if len != self.labels.len() {
            return Err(Error::TableSchema {
                reason: format!(
                    "column '{name}' has {len} rows, table has {}",
                    self.labels.len()
                ),
            });
        }
        Ok(())
    }

    /// Append a float column; length must match the row count.
    pub fn add_float_column(&mut self, name: impl Into<String>, data: Vec<f64>) -> Result<()> {
        let name = name.into();
        self.check_new_column(&name, data.len())?;
        self.columns.push(Column {
            name,
            data: ColumnData::Float(data),
        });
        Ok(())
    }

    /// Append a text column; length must match the row count.
    pub fn add_text_column(&mut self, name: impl Into<String>, data: Vec<String>) -> Result<()> {
        let name = name.into();
        self.check_new_column(&name, data.len())?;
        self.columns.push(Column {
            name,
            data: ColumnData::Text(data),
        });
        Ok(())
    }

    /// Borrow a float column by name.
    pub fn float(&self, name: &str) -> Option<&[f64]> {
        self.columns.iter().find(|c| c.name == name).and_then(|c| match &c.data {
            ColumnData::Float(v) => Some(v.as_slice()),
            ColumnData::Text(_) => None,
        })
    }

    /// Mutably borrow a float column by name.
    pub fn float_mut(&mut self, name: &str) -> Option<&mut Vec<f64>> {
        self.columns
            .iter_mut()
            .find(|c| c.name == name)
            .and_then(|c| match &mut c.data {
                ColumnData::Float(v) => Some(v),
                ColumnData::Text(_) => None,
            })
    }

    /// Borrow a text column by name.
    pub fn text(&self, name: &str) -> Option<&[String]> {
        self.columns.iter().find(|c| c.name == name).and_then(|c| match &c.data {
            ColumnData::Float(_) => None,
            ColumnData::Text(v) => Some(v.as_slice()),
        })
    }

    /// Row index of an object label.
    pub fn row_of(&self, label: u32) -> Option<usize> {
        self.labels.iter().position(|&l| l == label)
    }

    /// Outer-join another table on the object-label key. Rows present in only
    /// one side get missing values for the other side's columns. Column names
    /// must not collide.
    pub fn merge(&self, other: &MeasurementTable) -> Result<MeasurementTable> {
        for c in &other.columns {
            if self.has_column(&c.name) {
                return Err(Error::TableSchema {
                    reason: format!("merge would duplicate column '{}'", c.name),
                });
            }
        }
        let mut labels: Vec<u32> = self
            .labels
            .iter()
            .chain(other.labels.iter())
            .copied()
            .collect();
        labels.sort_unstable();
        labels.dedup();

        let mut out = MeasurementTable::new(labels.clone());
        let gather = |src: &MeasurementTable, col: &Column| -> ColumnData {
            let mut data = match &col.data {
                ColumnData::Float(_) => ColumnData::Float(Vec::with_capacity(labels.len())),
                ColumnData::Text(_) => ColumnData::Text(Vec::with_capacity(labels.len())),
            };
            for &label in &labels {
                match src.row_of(label) {
                    Some(row) => match (&col.data, &mut data) {
                        (ColumnData::Float(v), ColumnData::Float(dst)) => dst.push(v[row]),
                        (ColumnData::Text(v), ColumnData::Text(dst)) => dst.push(v[row].clone()),
                        _ => unreachable!(),
                    },
                    None => data.push_missing(),
                }
            }
            data
        };
        for col in &self.columns {
            out.columns.push(Column {
                name: col.name.clone(),
                data: gather(self, col),
            });
        }
        for col in &other.columns {
            out.columns.push(Column {
                name: col.name.clone(),
                data: gather(other, col),
            });
        }
        Ok(out)
    }

    /// Stack per-image tables into one, inserting an `ImageName` text column.
    /// Columns are unioned; rows missing a column get missing values. Rows
    /// are ordered by image name, then object label.
    pub fn concat(tables: &[(String, MeasurementTable)]) -> MeasurementTable {
        let mut ordered: Vec<&(String, MeasurementTable)> = tables.iter().collect();
        ordered.sort_by(|a, b| a.0.cmp(&b.0));

        // Union of column names in first-seen order, with their kind.
        let mut names: Vec<(String, bool)> = Vec::new(); // (name, is_float)
        for (_, t) in &ordered {
            for c in &t.columns {
                if !names.iter().any(|(n, _)| n == &c.name) {
                    names.push((c.name.clone(), matches!(c.data, ColumnData::Float(_))));
                }
            }
        }

        let mut out = MeasurementTable::new(Vec::new());
        let mut image_col: Vec<String> = Vec::new();
        let mut cols: Vec<Column> = names
            .iter()
            .map(|(name, is_float)| Column {
                name: name.clone(),
                data: if *is_float {
                    ColumnData::Float(Vec::new())
                } else {
                    ColumnData::Text(Vec::new())
                },
            })
            .collect();

        for (image, table) in ordered {
            let mut order: Vec<usize> = (0..table.len()).collect();
            order.sort_by_key(|&i| table.labels[i]);
            for &row in &order {
                out.labels.push(table.labels[row]);
                image_col.push(image.clone());
                for col in cols.iter_mut() {
                    match table.columns.iter().find(|c| c.name == col.name) {
                        Some(src) => match (&src.data, &mut col.data) {
                            (ColumnData::Float(v), ColumnData::Float(dst)) => dst.push(v[row]),
                            (ColumnData::Text(v), ColumnData::Text(dst)) => {
                                dst.push(v[row].clone())
                            }
                            // Same name, different kind across images: keep
                            // the first-seen kind and mark missing.
                            _ => col.data.push_missing(),
                        },
                        None => col.data.push_missing(),
                    }
                }
            }
        }
        // ImageName leads for readability.
        out.columns.push(Column {
            name: columns::IMAGE_NAME.to_string(),
            data: ColumnData::Text(image_col),
        });
        out.columns.append(&mut cols);
        out
    }

    /// CSV header: `ObjectLabel` first, then columns in order.
    pub fn header_record(&self) -> Vec<String> {
        let mut header = vec![columns::OBJECT_LABEL.to_string()];
        header.extend(self.columns.iter().map(|c| c.name.clone()));
        header
    }

    /// One CSV row, aligned with [`header_record`].
    pub fn row_record(&self, row: usize) -> Vec<String> {
        let mut record = vec![self.labels[row].to_string()];
        record.extend(self.columns.iter().map(|c| c.data.format_cell(row)));
        record
    }

    /// Write the table as CSV: `ObjectLabel` first, then columns in order.
    pub fn to_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(self.header_record())?;
        for row in 0..self.labels.len() {
            wtr.write_record(self.row_record(row))?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn to_csv_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        self.to_csv(File::create(path)?)
    }

    /// Parse a CSV written by [`to_csv`]. Columns whose every non-empty cell
    /// parses as a number come back as float columns, others as text.
    pub fn from_csv<R: Read>(reader: R) -> Result<MeasurementTable> {
        let mut rdr = csv::Reader::from_reader(reader);
        let header = rdr.headers()?.clone();
        if header.get(0) != Some(columns::OBJECT_LABEL) {
            return Err(Error::TableSchema {
                reason: format!(
                    "first CSV column must be '{}', got '{}'",
                    columns::OBJECT_LABEL,
                    header.get(0).unwrap_or("")
                ),
            });
        }
        let ncols = header.len().saturating_sub(1);
        let mut labels = Vec::new();
        let mut cells: Vec<Vec<String>> = vec![Vec::new(); ncols];
        for record in rdr.records() {
            let record = record?;
            let label: u32 = record
                .get(0)
                .unwrap_or("")
                .parse()
                .map_err(|_| Error::TableSchema {
                    reason: format!("bad object label '{}'", record.get(0).unwrap_or("")),
                })?;
            labels.push(label);
            for (i, cell) in cells.iter_mut().enumerate() {
                cell.push(record.get(i + 1).unwrap_or("").to_string());
            }
        }
        let mut table = MeasurementTable::new(labels);
        for (i, cell) in cells.into_iter().enumerate() {
            let name = header.get(i + 1).unwrap_or("").to_string();
            let numeric = cell
                .iter()
                .all(|v| v.is_empty() || v.parse::<f64>().is_ok());
            if numeric {
                let data = cell
                    .iter()
                    .map(|v| {
                        if v.is_empty() {
                            f64::NAN
                        } else {
                            v.parse().unwrap_or(f64::NAN)
                        }
                    })
                    .collect();
                table.add_float_column(name, data)?;
            } else {
                table.add_text_column(name, cell)?;
            }
        }
        Ok(table)
    }

    pub fn from_csv_path(path: &Path) -> Result<MeasurementTable> {
        Self::from_csv(File::open(path)?)
    }
}
