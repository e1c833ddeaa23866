//! Serializable pipeline definitions.
//!
//! A [`PipelineConfig`] is the on-disk form of a pipeline (JSON). Building a
//! runnable [`Pipeline`] from it goes through one explicit constructor match
//! per step kind; there is no global name-to-type registry, so construction
//! is deterministic and new step kinds are added in exactly one place.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::analysis;
use crate::detect::OtsuDetector;
use crate::enhance::{ContrastStretcher, GaussianSmoother};
use crate::error::{Error, Result};
use crate::grid::{ManualGridFinder, OptimalBinsGridFinder, ResidualOutlierTrimmer};
use crate::measure::{MeasureIntensity, MeasureShape, MeasureSize};
use crate::objedit::SmallObjectRemover;
use crate::objects::Connectivity;
use crate::pipeline::Pipeline;

fn connectivity_from(value: u8) -> Result<Connectivity> {
    match value {
        4 => Ok(Connectivity::Four),
        8 => Ok(Connectivity::Eight),
        other => Err(Error::InvalidParameter {
            parameter: "connectivity".into(),
            value: other.to_string(),
        }),
    }
}

/// One operation step.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OpConfig {
    GaussianSmoother {
        sigma: f32,
    },
    ContrastStretcher {
        low_percentile: f32,
        high_percentile: f32,
    },
    OtsuDetector {
        min_size: usize,
        connectivity: u8,
        ignore_zeros: bool,
    },
    SmallObjectRemover {
        min_area: usize,
    },
    ResidualOutlierTrimmer {
        nrows: usize,
        ncols: usize,
    },
}

/// One measure step.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(tag = "measure", rename_all = "snake_case")]
pub enum MeasureConfig {
    Size,
    Intensity,
    Shape,
}

/// Grid-finder choice.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "finder", rename_all = "snake_case")]
pub enum GridFinderConfig {
    OptimalBins {
        nrows: usize,
        ncols: usize,
    },
    Manual {
        row_edges: Vec<f64>,
        col_edges: Vec<f64>,
    },
}

/// Serialized pipeline definition.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub ops: Vec<OpConfig>,
    #[serde(default)]
    pub measures: Vec<MeasureConfig>,
    #[serde(default)]
    pub grid: Option<GridFinderConfig>,
    /// Optional edge correction applied to the combined batch table.
    #[serde(default)]
    pub edge_correction: Option<EdgeCorrectionConfig>,
}

/// Post-measurement edge-correction settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EdgeCorrectionConfig {
    /// Float column to cap, e.g. `Size_Area`.
    pub on: String,
    pub nrows: usize,
    pub ncols: usize,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_connectivity")]
    pub connectivity: u8,
}

fn default_top_n() -> usize {
    3
}

fn default_connectivity() -> u8 {
    4
}

impl PipelineConfig {
    /// The standard plate workflow: smooth, detect, trim to the grid,
    /// measure size/intensity/shape against an optimal-bins grid.
    pub fn standard(nrows: usize, ncols: usize) -> Self {
        Self {
            ops: vec![
                OpConfig::GaussianSmoother { sigma: 2.0 },
                OpConfig::OtsuDetector {
                    min_size: 50,
                    connectivity: 8,
                    ignore_zeros: true,
                },
                OpConfig::ResidualOutlierTrimmer { nrows, ncols },
            ],
            measures: vec![
                MeasureConfig::Size,
                MeasureConfig::Intensity,
                MeasureConfig::Shape,
            ],
            grid: Some(GridFinderConfig::OptimalBins { nrows, ncols }),
            edge_correction: None,
        }
    }

    /// Load a definition from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write the definition to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        crate::image::io::write_json_file(path, self)
    }

    /// Build a runnable pipeline; the single place where step kinds map to
    /// concrete types.
    pub fn build(&self) -> Result<Pipeline> {
        let mut pipeline = Pipeline::new();
        for op in &self.ops {
            match op {
                OpConfig::GaussianSmoother { sigma } => {
                    pipeline.push_op(GaussianSmoother::new(*sigma));
                }
                OpConfig::ContrastStretcher {
                    low_percentile,
                    high_percentile,
                } => {
                    pipeline.push_op(ContrastStretcher::new(*low_percentile, *high_percentile)?);
                }
                OpConfig::OtsuDetector {
                    min_size,
                    connectivity,
                    ignore_zeros,
                } => {
                    pipeline.push_op(OtsuDetector::new(
                        *min_size,
                        connectivity_from(*connectivity)?,
                        *ignore_zeros,
                    ));
                }
                OpConfig::SmallObjectRemover { min_area } => {
                    pipeline.push_op(SmallObjectRemover::new(*min_area));
                }
                OpConfig::ResidualOutlierTrimmer { nrows, ncols } => {
                    pipeline.push_op(ResidualOutlierTrimmer::new(*nrows, *ncols));
                }
            }
        }
        for measure in &self.measures {
            match measure {
                MeasureConfig::Size => pipeline.push_measure(MeasureSize),
                MeasureConfig::Intensity => pipeline.push_measure(MeasureIntensity),
                MeasureConfig::Shape => pipeline.push_measure(MeasureShape),
            };
        }
        if let Some(grid) = &self.grid {
            match grid {
                GridFinderConfig::OptimalBins { nrows, ncols } => {
                    pipeline.set_grid_finder(OptimalBinsGridFinder::new(*nrows, *ncols));
                }
                GridFinderConfig::Manual {
                    row_edges,
                    col_edges,
                } => {
                    pipeline.set_grid_finder(ManualGridFinder::new(
                        row_edges.clone(),
                        col_edges.clone(),
                    )?);
                }
            }
        }
        Ok(pipeline)
    }

    /// Build the configured edge corrector, if any.
    pub fn build_edge_corrector(&self) -> Result<Option<analysis::EdgeCorrector>> {
        match &self.edge_correction {
            None => Ok(None),
            Some(cfg) => {
                let corrector = analysis::EdgeCorrector::new(&cfg.on, cfg.nrows, cfg.ncols)?
                    .with_top_n(cfg.top_n)?
                    .with_connectivity(cfg.connectivity)?;
                Ok(Some(corrector))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_builds() {
        let pipeline = PipelineConfig::standard(8, 12).build().unwrap();
        assert_eq!(pipeline.num_ops(), 3);
        assert_eq!(pipeline.num_measures(), 3);
    }

    #[test]
    fn json_roundtrip() {
        let cfg = PipelineConfig::standard(4, 6);
        let json = serde_json::to_string(&cfg).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.ops.len(), 3);
        assert!(matches!(
            back.grid,
            Some(GridFinderConfig::OptimalBins { nrows: 4, ncols: 6 })
        ));
        back.build().unwrap();
    }

    #[test]
    fn bad_connectivity_is_rejected_at_build() {
        let cfg = PipelineConfig {
            ops: vec![OpConfig::OtsuDetector {
                min_size: 10,
                connectivity: 6,
                ignore_zeros: true,
            }],
            ..Default::default()
        };
        assert!(cfg.build().is_err());
    }

    #[test]
    fn manual_grid_edges_validated_at_build() {
        let cfg = PipelineConfig {
            grid: Some(GridFinderConfig::Manual {
                row_edges: vec![10.0, 5.0],
                col_edges: vec![0.0, 1.0],
            }),
            ..Default::default()
        };
        assert!(cfg.build().is_err());
    }
}
