pub mod color;
pub mod document;
pub mod kmeans;
pub mod scanner;
