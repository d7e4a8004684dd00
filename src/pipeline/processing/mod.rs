// Pipeline processing: outlier filtering, density clustering, and consensus selection

pub mod consensus;
pub mod dbscan;
pub mod denoise;
pub mod estimator;
pub mod iqr;
pub mod statistics;
