pub mod pipeline;
pub mod report;

pub use pipeline::{ClusterPipeline, PipelineConfig, PipelineError};
pub use report::ReportService;
