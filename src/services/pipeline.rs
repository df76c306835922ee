use crate::core::color::{ImageColorReducer, MeanColorReducer, ReduceError, RgbColor};
use crate::core::document::{DocumentError, FlagRecord, OutputDocument};
use crate::core::kmeans::{ClusterError, Clustering, KMeans, VectorClusterer};
use crate::core::scanner::{FlagFile, FlagScanner, ScanError};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("Image reduction error: {0}")]
    Reduce(#[from] ReduceError),

    #[error("Clustering error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("Output error: {0}")]
    Document(#[from] DocumentError),
}

/// Everything a run needs, passed in rather than read from globals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub input_dir: PathBuf,
    pub output_path: PathBuf,
    pub clusters: usize,
    pub seed: u64,
    pub n_init: usize,
    pub max_iter: usize,
    pub extensions: Vec<String>,
    /// Reduce images on the rayon pool. Output order is unaffected.
    pub parallel: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("state_flags_png"),
            output_path: PathBuf::from("state_flags_data.json"),
            clusters: 4,
            seed: 42,
            n_init: 10,
            max_iter: 300,
            extensions: vec!["png".to_string()],
            parallel: true,
        }
    }
}

/// Per-file progress hook, called after each image is reduced.
pub type ProgressCallback = Box<dyn Fn(&FlagFile) + Send + Sync>;

pub struct ClusterPipeline<R, C> {
    config: PipelineConfig,
    reducer: R,
    clusterer: C,
    progress: Option<ProgressCallback>,
}

impl ClusterPipeline<MeanColorReducer, KMeans> {
    /// Image decoding plus k-means tuned by `n_init` and `max_iter`.
    pub fn from_config(config: PipelineConfig) -> Self {
        let kmeans = KMeans::new()
            .with_n_init(config.n_init)
            .with_max_iter(config.max_iter);
        Self::new(config, MeanColorReducer::new(), kmeans)
    }
}

impl<R, C> ClusterPipeline<R, C>
where
    R: ImageColorReducer,
    C: VectorClusterer,
{
    pub fn new(config: PipelineConfig, reducer: R, clusterer: C) -> Self {
        Self {
            config,
            reducer,
            clusterer,
            progress: None,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn scan(&self) -> Result<Vec<FlagFile>, PipelineError> {
        let scanner = FlagScanner::new(&self.config.extensions);
        Ok(scanner.scan(&self.config.input_dir)?)
    }

    /// Mean color of every file, in the order given.
    pub fn reduce(&self, files: &[FlagFile]) -> Result<Vec<RgbColor>, PipelineError> {
        let reducer = &self.reducer;
        let progress = &self.progress;
        let reduce_one = |file: &FlagFile| -> Result<RgbColor, ReduceError> {
            let color = reducer.reduce(&file.path)?;
            if let Some(callback) = progress {
                callback(file);
            }
            Ok(color)
        };

        let colors = if self.config.parallel {
            files.par_iter().map(reduce_one).collect::<Result<Vec<_>, _>>()?
        } else {
            files.iter().map(reduce_one).collect::<Result<Vec<_>, _>>()?
        };
        Ok(colors)
    }

    /// Cluster already-reduced items into a document. No filesystem access.
    pub fn cluster(
        &self,
        items: Vec<(FlagFile, RgbColor)>,
    ) -> Result<OutputDocument, PipelineError> {
        let colors: Vec<RgbColor> = items.iter().map(|(_, color)| *color).collect();
        let Clustering {
            labels,
            centroids,
            inertia,
            n_iter,
        } = self
            .clusterer
            .cluster(&colors, self.config.clusters, self.config.seed)?;
        log::info!(
            "Clustered {} item(s) into {} group(s): inertia {:.6}, {} iteration(s)",
            colors.len(),
            centroids.len(),
            inertia,
            n_iter
        );

        let records = items
            .into_iter()
            .zip(labels)
            .map(|((file, color), cluster_id)| FlagRecord {
                name: file.name,
                source_path: file.path.to_string_lossy().to_string(),
                color,
                cluster_id,
            })
            .collect();

        let document = OutputDocument::new(records, centroids);
        document.validate()?;
        Ok(document)
    }

    /// Scan, reduce and cluster, without writing anything.
    pub fn build(&self) -> Result<OutputDocument, PipelineError> {
        let files = self.scan()?;
        // Fail on a bad cluster count before paying for any decoding.
        if self.config.clusters > files.len() {
            return Err(ClusterError::TooManyClusters {
                k: self.config.clusters,
                n: files.len(),
            }
            .into());
        }
        let colors = self.reduce(&files)?;
        self.cluster(files.into_iter().zip(colors).collect())
    }

    /// Full run: build the document in memory, then write it in one step.
    pub fn run(&self) -> Result<OutputDocument, PipelineError> {
        let document = self.build()?;
        document.write(&self.config.output_path)?;
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Looks colors up by file stem instead of decoding anything.
    struct TableReducer(HashMap<String, RgbColor>);

    impl ImageColorReducer for TableReducer {
        fn reduce(&self, path: &Path) -> Result<RgbColor, ReduceError> {
            let stem = path.file_stem().unwrap().to_string_lossy().to_string();
            self.0.get(&stem).copied().ok_or(ReduceError::EmptyImage {
                path: path.to_string_lossy().to_string(),
            })
        }
    }

    fn item(name: &str, color: [f64; 3]) -> (FlagFile, RgbColor) {
        (
            FlagFile {
                name: name.to_string(),
                path: PathBuf::from(format!("{name}.png")),
            },
            RgbColor(color),
        )
    }

    fn config_for(dir: &Path, clusters: usize) -> PipelineConfig {
        PipelineConfig {
            input_dir: dir.to_path_buf(),
            output_path: dir.join("out.json"),
            clusters,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.clusters, 4);
        assert_eq!(config.seed, 42);
        assert_eq!(config.n_init, 10);
        assert_eq!(config.input_dir, PathBuf::from("state_flags_png"));
        assert_eq!(config.output_path, PathBuf::from("state_flags_data.json"));
    }

    #[test]
    fn test_cluster_in_memory() {
        let pipeline = ClusterPipeline::new(
            PipelineConfig {
                clusters: 2,
                ..PipelineConfig::default()
            },
            TableReducer(HashMap::new()),
            KMeans::new(),
        );
        let doc = pipeline
            .cluster(vec![
                item("a", [1.0, 0.0, 0.0]),
                item("b", [0.0, 0.0, 1.0]),
                item("c", [0.95, 0.05, 0.0]),
            ])
            .unwrap();

        assert_eq!(doc.records.len(), 3);
        assert_eq!(doc.centroids.len(), 2);
        assert_eq!(doc.records[0].cluster_id, doc.records[2].cluster_id);
        assert_ne!(doc.records[0].cluster_id, doc.records[1].cluster_id);
        assert_eq!(doc.records[1].source_path, "b.png");
    }

    #[test]
    fn test_run_with_injected_reducer() {
        let temp_dir = TempDir::new().unwrap();
        let mut table = HashMap::new();
        for (name, color) in [
            ("ohio", [0.8, 0.1, 0.1]),
            ("texas", [0.7, 0.2, 0.2]),
            ("maine", [0.1, 0.1, 0.7]),
        ] {
            std::fs::write(temp_dir.path().join(format!("{name}.png")), b"").unwrap();
            table.insert(name.to_string(), RgbColor(color));
        }

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        let pipeline = ClusterPipeline::new(
            config_for(temp_dir.path(), 2),
            TableReducer(table),
            KMeans::new(),
        )
        .with_progress(Box::new(move |_| {
            seen_clone.fetch_add(1, Ordering::Relaxed);
        }));

        let doc = pipeline.run().unwrap();
        assert_eq!(seen.load(Ordering::Relaxed), 3);
        let names: Vec<_> = doc.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["maine", "ohio", "texas"]);
        assert_eq!(doc.records[1].cluster_id, doc.records[2].cluster_id);

        let written = OutputDocument::read(&temp_dir.path().join("out.json")).unwrap();
        assert_eq!(written.records.len(), 3);
    }

    #[test]
    fn test_too_many_clusters_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("solo.png"), b"").unwrap();
        let pipeline = ClusterPipeline::new(
            config_for(temp_dir.path(), 2),
            TableReducer(HashMap::new()),
            KMeans::new(),
        );

        let err = pipeline.run().unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Cluster(ClusterError::TooManyClusters { k: 2, n: 1 })
        ));
        assert!(!temp_dir.path().join("out.json").exists());
    }

    #[test]
    fn test_reduce_error_aborts_run() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("known.png"), b"").unwrap();
        std::fs::write(temp_dir.path().join("unknown.png"), b"").unwrap();
        let mut table = HashMap::new();
        table.insert("known".to_string(), RgbColor::new(0.5, 0.5, 0.5));

        let mut config = config_for(temp_dir.path(), 1);
        config.parallel = false;
        let pipeline = ClusterPipeline::new(config, TableReducer(table), KMeans::new());

        assert!(matches!(pipeline.run(), Err(PipelineError::Reduce(_))));
        assert!(!temp_dir.path().join("out.json").exists());
    }

    #[test]
    fn test_empty_directory_is_scan_error() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = ClusterPipeline::new(
            config_for(temp_dir.path(), 1),
            TableReducer(HashMap::new()),
            KMeans::new(),
        );
        assert!(matches!(
            pipeline.build(),
            Err(PipelineError::Scan(ScanError::NoImages { .. }))
        ));
    }
}
