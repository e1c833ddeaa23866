//! Edge-effect correction for arrayed growth measurements.
//!
//! Colonies on the boundary of the pinned array face less competition for
//! nutrients and grow larger than interior colonies. The corrector finds the
//! interior ("surrounded") sections, derives a cap from the strongest
//! interior values, and clips edge-section measurements to that cap.

use log::debug;

use crate::error::{Error, Result};
use crate::grid::grid_columns;
use crate::measure::{columns, MeasurementTable};

fn neighbor_offsets(connectivity: u8) -> &'static [(i64, i64)] {
    match connectivity {
        4 => &[(-1, 0), (1, 0), (0, -1), (0, 1)],
        _ => &[
            (-1, 0),
            (1, 0),
            (0, -1),
            (0, 1),
            (-1, -1),
            (-1, 1),
            (1, -1),
            (1, 1),
        ],
    }
}

fn validate_inputs(
    active: &[usize],
    shape: (usize, usize),
    connectivity: u8,
    min_neighbors: Option<usize>,
) -> Result<usize> {
    if connectivity != 4 && connectivity != 8 {
        return Err(Error::InvalidParameter {
            parameter: "connectivity".into(),
            value: connectivity.to_string(),
        });
    }
    if shape.0 == 0 || shape.1 == 0 {
        return Err(Error::InvalidParameter {
            parameter: "shape".into(),
            value: format!("{}x{}", shape.0, shape.1),
        });
    }
    let total = shape.0 * shape.1;
    if let Some(&bad) = active.iter().find(|&&idx| idx >= total) {
        return Err(Error::InvalidParameter {
            parameter: "active index".into(),
            value: format!("{bad} outside grid of {total} cells"),
        });
    }
    let max_neighbors = connectivity as usize;
    let required = min_neighbors.unwrap_or(max_neighbors);
    if required == 0 || required > max_neighbors {
        return Err(Error::InvalidParameter {
            parameter: "min_neighbors".into(),
            value: required.to_string(),
        });
    }
    Ok(required)
}

/// Find active grid cells surrounded by active neighbors.
///
/// `active` holds flattened section indices in row-major order
/// (`idx = row * cols + col`); duplicates are ignored. A cell qualifies when
/// at least `min_neighbors` of its 4- or 8-connectivity neighbors are active;
/// `None` requires every neighbor, so border cells can never qualify. The
/// result is sorted.
pub fn surrounded_positions(
    active: &[usize],
    shape: (usize, usize),
    connectivity: u8,
    min_neighbors: Option<usize>,
) -> Result<Vec<usize>> {
    Ok(
        surrounded_positions_with_counts(active, shape, connectivity, min_neighbors)?
            .into_iter()
            .map(|(idx, _)| idx)
            .collect(),
    )
}

/// [`surrounded_positions`] variant also reporting each selected cell's
/// active-neighbor count.
pub fn surrounded_positions_with_counts(
    active: &[usize],
    shape: (usize, usize),
    connectivity: u8,
    min_neighbors: Option<usize>,
) -> Result<Vec<(usize, usize)>> {
    let required = validate_inputs(active, shape, connectivity, min_neighbors)?;
    let (rows, cols) = shape;

    let mut active_mask = vec![false; rows * cols];
    for &idx in active {
        active_mask[idx] = true;
    }

    let offsets = neighbor_offsets(connectivity);
    let mut out = Vec::new();
    for rr in 0..rows {
        for cc in 0..cols {
            let idx = rr * cols + cc;
            if !active_mask[idx] {
                continue;
            }
            let count = offsets
                .iter()
                .filter(|&&(dr, dc)| {
                    let nr = rr as i64 + dr;
                    let nc = cc as i64 + dc;
                    nr >= 0
                        && nr < rows as i64
                        && nc >= 0
                        && nc < cols as i64
                        && active_mask[nr as usize * cols + nc as usize]
                })
                .count();
            if count >= required {
                out.push((idx, count));
            }
        }
    }
    Ok(out)
}

/// Cap edge-section values at the mean of the strongest interior values.
#[derive(Clone, Debug)]
pub struct EdgeCorrector {
    /// Float column to correct.
    pub on: String,
    pub nrows: usize,
    pub ncols: usize,
    /// Number of top interior values averaged into the cap.
    pub top_n: usize,
    /// 4 or 8.
    pub connectivity: u8,
}

impl EdgeCorrector {
    pub fn new(on: impl Into<String>, nrows: usize, ncols: usize) -> Result<Self> {
        if nrows == 0 || ncols == 0 {
            return Err(Error::InvalidParameter {
                parameter: "grid shape".into(),
                value: format!("{nrows}x{ncols}"),
            });
        }
        Ok(Self {
            on: on.into(),
            nrows,
            ncols,
            top_n: 3,
            connectivity: 4,
        })
    }

    pub fn with_top_n(mut self, top_n: usize) -> Result<Self> {
        if top_n == 0 {
            return Err(Error::InvalidParameter {
                parameter: "top_n".into(),
                value: "0".into(),
            });
        }
        self.top_n = top_n;
        Ok(self)
    }

    pub fn with_connectivity(mut self, connectivity: u8) -> Result<Self> {
        if connectivity != 4 && connectivity != 8 {
            return Err(Error::InvalidParameter {
                parameter: "connectivity".into(),
                value: connectivity.to_string(),
            });
        }
        self.connectivity = connectivity;
        Ok(self)
    }

    /// Return a corrected copy of the table. Rows are grouped by `ImageName`
    /// when that column exists, so every plate gets its own cap.
    pub fn analyze(&self, table: &MeasurementTable) -> Result<MeasurementTable> {
        if table.is_empty() {
            return Err(Error::TableSchema {
                reason: "edge correction needs a non-empty table".into(),
            });
        }
        let sections = table
            .float(grid_columns::SECTION_NUM)
            .ok_or_else(|| Error::TableSchema {
                reason: format!("edge correction needs '{}'", grid_columns::SECTION_NUM),
            })?
            .to_vec();
        if table.float(&self.on).is_none() {
            return Err(Error::TableSchema {
                reason: format!("edge correction needs float column '{}'", self.on),
            });
        }

        // Group row indices per image (single group without the column).
        let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
        match table.text(columns::IMAGE_NAME) {
            Some(names) => {
                for (row, name) in names.iter().enumerate() {
                    match groups.iter_mut().find(|(g, _)| g == name) {
                        Some((_, rows)) => rows.push(row),
                        None => groups.push((name.clone(), vec![row])),
                    }
                }
            }
            None => groups.push((String::new(), (0..table.len()).collect())),
        }

        let mut corrected = table.clone();
        let values = corrected
            .float_mut(&self.on)
            .expect("column checked above");

        for (group, rows) in &groups {
            let present: Vec<usize> = rows
                .iter()
                .filter_map(|&row| {
                    let s = sections[row];
                    s.is_finite().then_some(s as usize)
                })
                .collect();
            if present.is_empty() {
                continue;
            }
            let surrounded = surrounded_positions(
                &present,
                (self.nrows, self.ncols),
                self.connectivity,
                None,
            )?;
            if surrounded.is_empty() {
                continue;
            }

            let mut interior_values: Vec<f64> = rows
                .iter()
                .filter(|&&row| {
                    let s = sections[row];
                    s.is_finite() && surrounded.contains(&(s as usize))
                })
                .map(|&row| values[row])
                .filter(|v| v.is_finite())
                .collect();
            if interior_values.is_empty() {
                continue;
            }
            interior_values.sort_by(|a, b| b.total_cmp(a));
            let n = self.top_n.min(interior_values.len());
            let cap = interior_values[..n].iter().sum::<f64>() / n as f64;

            let mut capped = 0usize;
            for &row in rows {
                let s = sections[row];
                let is_edge = !s.is_finite() || !surrounded.contains(&(s as usize));
                if is_edge && values[row] > cap {
                    values[row] = cap;
                    capped += 1;
                }
            }
            debug!(
                "EdgeCorrector: group='{group}' cap={cap:.4} capped={capped} rows"
            );
        }
        Ok(corrected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The documented concrete case: 8x12 grid, 3x3 active block centered at
    /// (4, 6); only the center is fully 4-surrounded.
    #[test]
    fn block_center_is_the_only_surrounded_cell() {
        let cols = 12;
        let active: Vec<usize> = (3..6)
            .flat_map(|r| (5..8).map(move |c| r * cols + c))
            .collect();
        let res = surrounded_positions(&active, (8, 12), 4, None).unwrap();
        assert_eq!(res, vec![4 * cols + 6]);
    }

    #[test]
    fn threshold_relaxation_grows_the_result_monotonically() {
        let cols = 12;
        let active: Vec<usize> = (3..6)
            .flat_map(|r| (5..8).map(move |c| r * cols + c))
            .collect();
        let mut previous: Option<Vec<usize>> = None;
        for k in (1..=4).rev() {
            let res = surrounded_positions(&active, (8, 12), 4, Some(k)).unwrap();
            if let Some(prev) = &previous {
                // Higher threshold is a subset of the lower one.
                assert!(prev.iter().all(|idx| res.contains(idx)));
            }
            previous = Some(res);
        }
    }

    #[test]
    fn border_cells_never_fully_surrounded() {
        // Entire 3x3 grid active: only the center cell survives.
        let active: Vec<usize> = (0..9).collect();
        assert_eq!(surrounded_positions(&active, (3, 3), 4, None).unwrap(), vec![4]);
        assert_eq!(surrounded_positions(&active, (3, 3), 8, None).unwrap(), vec![4]);
    }

    #[test]
    fn counts_and_validation() {
        let res =
            surrounded_positions_with_counts(&[0, 1, 3, 4], (2, 2), 4, Some(2)).unwrap();
        assert_eq!(res, vec![(0, 2), (1, 2), (3, 2), (4, 2)]);
        assert!(surrounded_positions(&[9], (2, 2), 4, None).is_err());
        assert!(surrounded_positions(&[0], (2, 2), 5, None).is_err());
        assert!(surrounded_positions(&[0], (2, 2), 4, Some(9)).is_err());
    }

    #[test]
    fn duplicates_are_deduplicated() {
        let active: Vec<usize> = (0..9).chain(0..9).collect();
        assert_eq!(surrounded_positions(&active, (3, 3), 4, None).unwrap(), vec![4]);
    }

    fn full_grid_table(nrows: usize, ncols: usize, edge_value: f64) -> MeasurementTable {
        let n = nrows * ncols;
        let mut table = MeasurementTable::new((1..=n as u32).collect());
        let sections: Vec<f64> = (0..n).map(|s| s as f64).collect();
        let mut area = vec![0.0; n];
        for s in 0..n {
            let rr = s / ncols;
            let cc = s % ncols;
            let interior = rr > 0 && rr < nrows - 1 && cc > 0 && cc < ncols - 1;
            area[s] = if interior { 100.0 } else { edge_value };
        }
        table
            .add_float_column(grid_columns::SECTION_NUM, sections)
            .unwrap();
        table.add_float_column("Size_Area", area).unwrap();
        table
    }

    #[test]
    fn edge_values_are_capped_at_interior_mean() {
        let table = full_grid_table(4, 5, 250.0);
        let corrector = EdgeCorrector::new("Size_Area", 4, 5).unwrap();
        let out = corrector.analyze(&table).unwrap();
        let area = out.float("Size_Area").unwrap();
        let sections = out.float(grid_columns::SECTION_NUM).unwrap();
        for (row, &s) in sections.iter().enumerate() {
            let rr = s as usize / 5;
            let cc = s as usize % 5;
            let interior = rr > 0 && rr < 3 && cc > 0 && cc < 4;
            if interior {
                assert_eq!(area[row], 100.0);
            } else {
                // Cap equals the interior top-3 mean.
                assert_eq!(area[row], 100.0);
            }
        }
    }

    #[test]
    fn values_below_cap_are_untouched() {
        let table = full_grid_table(4, 5, 50.0);
        let corrector = EdgeCorrector::new("Size_Area", 4, 5).unwrap();
        let out = corrector.analyze(&table).unwrap();
        assert_eq!(out, table);
    }

    #[test]
    fn missing_columns_are_schema_errors() {
        let mut table = MeasurementTable::new(vec![1]);
        table.add_float_column("Size_Area", vec![1.0]).unwrap();
        let corrector = EdgeCorrector::new("Size_Area", 2, 2).unwrap();
        assert!(matches!(
            corrector.analyze(&table),
            Err(Error::TableSchema { .. })
        ));
    }
}
