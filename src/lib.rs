//! Group flag images by their average color.
//!
//! Each image is reduced to its mean RGB color, the colors are partitioned
//! with seeded k-means, and the result is written as a JSON document with
//! `states` and `centroids` fields.

pub mod core;
pub mod services;

pub use crate::core::color::{ImageColorReducer, MeanColorReducer, RgbColor};
pub use crate::core::document::{FlagRecord, OutputDocument};
pub use crate::core::kmeans::{Clustering, KMeans, VectorClusterer};
pub use crate::core::scanner::{FlagFile, FlagScanner};
pub use crate::services::{ClusterPipeline, PipelineConfig, PipelineError, ReportService};
