use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Input directory does not exist: {path}")]
    MissingDirectory { path: String },

    #[error("{path} is not a directory")]
    NotADirectory { path: String },

    #[error("No images with extensions [{extensions}] found in {path}")]
    NoImages { path: String, extensions: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
}

/// An image file found in the input directory, with the display name derived
/// from its file stem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagFile {
    pub name: String,
    pub path: PathBuf,
}

impl FlagFile {
    pub fn from_path(path: &Path) -> Self {
        Self {
            name: display_name(path),
            path: path.to_path_buf(),
        }
    }
}

/// `new_york.png` becomes `new york`.
pub fn display_name(path: &Path) -> String {
    path.file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .replace('_', " ")
}

pub struct FlagScanner {
    extensions: HashSet<String>,
}

impl FlagScanner {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_lowercase())
            .collect();
        Self { extensions }
    }

    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| self.extensions.contains(&ext.to_string_lossy().to_lowercase()))
            .unwrap_or(false)
    }

    /// List the image files directly inside `dir`, sorted by file name.
    ///
    /// Subdirectories are not descended into. An empty result is an error,
    /// since there is nothing to cluster.
    pub fn scan(&self, dir: &Path) -> Result<Vec<FlagFile>, ScanError> {
        if !dir.exists() {
            return Err(ScanError::MissingDirectory {
                path: dir.to_string_lossy().to_string(),
            });
        }
        if !dir.is_dir() {
            return Err(ScanError::NotADirectory {
                path: dir.to_string_lossy().to_string(),
            });
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type().is_file() {
                continue;
            }
            if self.accepts(path) {
                files.push(FlagFile::from_path(path));
            } else {
                log::debug!("Skipping {}", path.display());
            }
        }

        if files.is_empty() {
            let mut extensions: Vec<_> = self.extensions.iter().cloned().collect();
            extensions.sort();
            return Err(ScanError::NoImages {
                path: dir.to_string_lossy().to_string(),
                extensions: extensions.join(", "),
            });
        }

        log::info!("Found {} image(s) in {}", files.len(), dir.display());
        Ok(files)
    }
}

impl Default for FlagScanner {
    fn default() -> Self {
        Self::new(["png"])
    }
}
