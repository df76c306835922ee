use crate::core::color::RgbColor;
use crate::core::document::{FlagRecord, OutputDocument};
use crate::core::kmeans::nearest_centroid;
use serde::Serialize;

/// One cluster as listed to the user: its centroid and members by name.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterSummary {
    pub index: usize,
    pub centroid: RgbColor,
    pub members: Vec<String>,
}

/// Where a single record sits relative to the centroids.
#[derive(Debug, Clone, Serialize)]
pub struct RecordPlacement {
    pub record: FlagRecord,
    pub own_distance: f64,
    pub nearest_other: Option<(usize, f64)>,
}

pub struct ReportService;

impl ReportService {
    pub fn new() -> Self {
        Self
    }

    /// Clusters in id order, members sorted case-insensitively by name.
    pub fn summarize(&self, document: &OutputDocument) -> Vec<ClusterSummary> {
        document
            .members()
            .into_iter()
            .enumerate()
            .map(|(index, records)| {
                let mut members: Vec<String> = records.iter().map(|r| r.name.clone()).collect();
                members.sort_by_key(|name| name.to_lowercase());
                ClusterSummary {
                    index,
                    centroid: document.centroids[index],
                    members,
                }
            })
            .collect()
    }

    pub fn place(&self, document: &OutputDocument, name: &str) -> Option<RecordPlacement> {
        let record = document.find(name)?;
        let own_distance = record
            .color
            .distance_squared(&document.centroids[record.cluster_id])
            .sqrt();

        let others: Vec<(usize, RgbColor)> = document
            .centroids
            .iter()
            .copied()
            .enumerate()
            .filter(|(i, _)| *i != record.cluster_id)
            .collect();
        let nearest_other = if others.is_empty() {
            None
        } else {
            let centroids: Vec<RgbColor> = others.iter().map(|(_, c)| *c).collect();
            let (pos, d) = nearest_centroid(&record.color, &centroids);
            Some((others[pos].0, d.sqrt()))
        };

        Some(RecordPlacement {
            record: record.clone(),
            own_distance,
            nearest_other,
        })
    }
}

impl Default for ReportService {
    fn default() -> Self {
        Self::new()
    }
}
