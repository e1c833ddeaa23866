//! Post-measurement analysis over measurement tables.

mod edge_correction;

pub use self::edge_correction::{surrounded_positions, surrounded_positions_with_counts, EdgeCorrector};
