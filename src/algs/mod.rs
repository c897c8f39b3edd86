//! Vertex programs built on the engine.

pub mod overlap;
pub mod topk_scan;
pub mod wcc;

pub use overlap::{compute_overlap, OverlapReport, OverlapShared, OverlapVertex, PairOverlap};
pub use topk_scan::{
    run_topk_scan, NeighborDegreeEstimator, ScanEstimator, TopKConfig, TopKOutput, TopKShared,
    TopKVertex, UnboundedEstimator,
};
pub use wcc::{compute_wcc, ComponentLabel, WccOutput, WccStage, WccVertex};
