//! Trained pipeline components

pub mod classifier;
pub mod inference;
pub mod knn;
pub mod loader;
pub mod transforms;
pub mod tree;

pub use classifier::{Classifier, ClassifierModel};
pub use inference::InferencePipeline;
pub use loader::{ArtifactLoader, PipelineArtifact};
pub use transforms::{StandardScaler, Winsorizer};
