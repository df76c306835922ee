use flagcluster::core::color::ReduceError;
use flagcluster::core::document::DocumentError;
use flagcluster::core::kmeans::ClusterError;
use flagcluster::{
    ClusterPipeline, KMeans, MeanColorReducer, OutputDocument, PipelineConfig, PipelineError,
};
use image::{Rgb, RgbImage};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_pixel(dir: &Path, name: &str, rgb: [u8; 3]) {
    RgbImage::from_pixel(1, 1, Rgb(rgb))
        .save(dir.join(format!("{name}.png")))
        .unwrap();
}

fn primaries(dir: &Path) {
    write_pixel(dir, "red", [255, 0, 0]);
    write_pixel(dir, "green", [0, 255, 0]);
    write_pixel(dir, "blue", [0, 0, 255]);
    write_pixel(dir, "near_red", [250, 5, 5]);
}

fn pipeline(dir: &Path, clusters: usize) -> ClusterPipeline<MeanColorReducer, KMeans> {
    let config = PipelineConfig {
        input_dir: dir.to_path_buf(),
        output_path: dir.join("state_flags_data.json"),
        clusters,
        ..PipelineConfig::default()
    };
    ClusterPipeline::from_config(config)
}

fn cluster_of(doc: &OutputDocument, name: &str) -> usize {
    doc.find(name).unwrap().cluster_id
}

#[test]
fn test_primaries_end_to_end() {
    let temp_dir = TempDir::new().unwrap();
    primaries(temp_dir.path());

    let doc = pipeline(temp_dir.path(), 3).run().unwrap();

    assert_eq!(doc.records.len(), 4);
    assert_eq!(doc.centroids.len(), 3);
    assert_eq!(cluster_of(&doc, "red"), cluster_of(&doc, "near red"));
    assert_ne!(cluster_of(&doc, "red"), cluster_of(&doc, "green"));
    assert_ne!(cluster_of(&doc, "red"), cluster_of(&doc, "blue"));
    assert_ne!(cluster_of(&doc, "green"), cluster_of(&doc, "blue"));

    let red = doc.find("red").unwrap();
    assert_eq!(red.color.0, [1.0, 0.0, 0.0]);
    assert!(red.source_path.ends_with("red.png"));

    let names: Vec<_> = doc.records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["blue", "green", "near red", "red"]);
}

#[test]
fn test_repeated_runs_are_identical() {
    let temp_dir = TempDir::new().unwrap();
    primaries(temp_dir.path());
    write_pixel(temp_dir.path(), "teal", [0, 128, 128]);
    write_pixel(temp_dir.path(), "gold", [255, 200, 0]);

    let first = pipeline(temp_dir.path(), 3).build().unwrap();
    for _ in 0..3 {
        assert_eq!(pipeline(temp_dir.path(), 3).build().unwrap(), first);
    }

    let mut config = pipeline(temp_dir.path(), 3).config().clone();
    config.parallel = false;
    let sequential = ClusterPipeline::from_config(config).build().unwrap();
    assert_eq!(sequential, first);
}

#[test]
fn test_every_record_has_valid_cluster() {
    let temp_dir = TempDir::new().unwrap();
    for i in 0..12u8 {
        write_pixel(temp_dir.path(), &format!("flag_{i:02}"), [i * 20, 255 - i * 20, i * 7]);
    }

    let doc = pipeline(temp_dir.path(), 4).build().unwrap();
    assert_eq!(doc.records.len(), 12);
    assert!(doc.records.iter().all(|r| r.cluster_id < doc.centroids.len()));

    for record in &doc.records {
        let own = record.color.distance_squared(&doc.centroids[record.cluster_id]);
        for centroid in &doc.centroids {
            assert!(own <= record.color.distance_squared(centroid) + 1e-12);
        }
    }
}

#[test]
fn test_written_document_round_trips() {
    let temp_dir = TempDir::new().unwrap();
    primaries(temp_dir.path());
    write_pixel(temp_dir.path(), "grey", [77, 77, 77]);

    let doc = pipeline(temp_dir.path(), 3).run().unwrap();
    let back = OutputDocument::read(&temp_dir.path().join("state_flags_data.json")).unwrap();

    assert_eq!(back.records.len(), doc.records.len());
    for (a, b) in back.records.iter().zip(&doc.records) {
        assert_eq!(a.name, b.name);
        assert_eq!(a.source_path, b.source_path);
        assert_eq!(a.cluster_id, b.cluster_id);
        assert!(a.color.distance_squared(&b.color) < 1e-24);
    }
    for (a, b) in back.centroids.iter().zip(&doc.centroids) {
        assert!(a.distance_squared(b) < 1e-24);
    }
}

#[test]
fn test_too_many_clusters() {
    let temp_dir = TempDir::new().unwrap();
    primaries(temp_dir.path());

    let err = pipeline(temp_dir.path(), 5).run().unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Cluster(ClusterError::TooManyClusters { k: 5, n: 4 })
    ));
    assert!(!temp_dir.path().join("state_flags_data.json").exists());
}

#[test]
fn test_corrupt_image_aborts_without_output() {
    let temp_dir = TempDir::new().unwrap();
    primaries(temp_dir.path());
    fs::write(temp_dir.path().join("torn.png"), b"\x89PNG\r\n\x1a\n garbage").unwrap();

    let err = pipeline(temp_dir.path(), 2).run().unwrap_err();
    assert!(matches!(err, PipelineError::Reduce(ReduceError::Decode { .. })));
    assert!(!temp_dir.path().join("state_flags_data.json").exists());
}

#[test]
fn test_missing_input_directory() {
    let temp_dir = TempDir::new().unwrap();
    let err = pipeline(&temp_dir.path().join("absent"), 1).run().unwrap_err();
    assert!(matches!(err, PipelineError::Scan(_)));
}

#[test]
fn test_unwritable_output() {
    let temp_dir = TempDir::new().unwrap();
    primaries(temp_dir.path());

    let mut config = pipeline(temp_dir.path(), 2).config().clone();
    config.output_path = temp_dir.path().join("missing").join("out.json");
    let err = ClusterPipeline::from_config(config).run().unwrap_err();
    assert!(matches!(err, PipelineError::Document(DocumentError::Io { .. })));
}
