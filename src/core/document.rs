use crate::core::color::RgbColor;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Record '{name}' refers to cluster {cluster}, but only {centroids} centroid(s) exist")]
    UnknownCluster {
        name: String,
        cluster: usize,
        centroids: usize,
    },

    #[error("Record '{name}' has a non-finite color")]
    NonFiniteColor { name: String },

    #[error("Centroid {index} has a non-finite component")]
    NonFiniteCentroid { index: usize },
}

/// One flag image: its display name, source file, mean color and cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagRecord {
    #[serde(rename = "state")]
    pub name: String,
    #[serde(rename = "flag_file")]
    pub source_path: String,
    #[serde(rename = "rgb")]
    pub color: RgbColor,
    #[serde(rename = "cluster")]
    pub cluster_id: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDocument {
    #[serde(rename = "states")]
    pub records: Vec<FlagRecord>,
    pub centroids: Vec<RgbColor>,
}

impl OutputDocument {
    pub fn new(records: Vec<FlagRecord>, centroids: Vec<RgbColor>) -> Self {
        Self { records, centroids }
    }

    pub fn validate(&self) -> Result<(), DocumentError> {
        if let Some(index) = self.centroids.iter().position(|c| !c.is_finite()) {
            return Err(DocumentError::NonFiniteCentroid { index });
        }
        for record in &self.records {
            if record.cluster_id >= self.centroids.len() {
                return Err(DocumentError::UnknownCluster {
                    name: record.name.clone(),
                    cluster: record.cluster_id,
                    centroids: self.centroids.len(),
                });
            }
            if !record.color.is_finite() {
                return Err(DocumentError::NonFiniteColor {
                    name: record.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Records in each cluster, indexed by cluster id.
    pub fn members(&self) -> Vec<Vec<&FlagRecord>> {
        let mut groups = vec![Vec::new(); self.centroids.len()];
        for record in &self.records {
            if let Some(group) = groups.get_mut(record.cluster_id) {
                group.push(record);
            }
        }
        groups
    }

    pub fn find(&self, name: &str) -> Option<&FlagRecord> {
        self.records
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(name))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write the document to `path`, replacing any existing file.
    ///
    /// The JSON is rendered in memory and written to a sibling temporary
    /// file that is renamed into place, so readers never see a partial file.
    pub fn write(&self, path: &Path) -> Result<(), DocumentError> {
        self.validate()?;
        let path_str = path.to_string_lossy().to_string();
        let json = self.to_json().map_err(|source| DocumentError::Json {
            path: path_str.clone(),
            source,
        })?;

        let tmp_path = temp_sibling(path);
        let io_err = |source| DocumentError::Io {
            path: path_str.clone(),
            source,
        };

        let result = fs::File::create(&tmp_path)
            .and_then(|mut file| {
                file.write_all(json.as_bytes())?;
                file.write_all(b"\n")?;
                file.sync_all()
            })
            .and_then(|_| fs::rename(&tmp_path, path));

        if let Err(e) = result {
            let _ = fs::remove_file(&tmp_path);
            return Err(io_err(e));
        }

        log::info!(
            "Wrote {} record(s) and {} centroid(s) to {}",
            self.records.len(),
            self.centroids.len(),
            path.display()
        );
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self, DocumentError> {
        let path_str = path.to_string_lossy().to_string();
        let content = fs::read_to_string(path).map_err(|source| DocumentError::Io {
            path: path_str.clone(),
            source,
        })?;
        let document: Self =
            serde_json::from_str(&content).map_err(|source| DocumentError::Json {
                path: path_str,
                source,
            })?;
        document.validate()?;
        Ok(document)
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
