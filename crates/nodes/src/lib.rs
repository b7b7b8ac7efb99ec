//! TripoSR Graph Nodes
//!
//! Three nodes for the node-graph host, run in order:
//! - Model loader: resolves a checkpoint and caches the loaded model
//! - Sampler: prepares each image and reconstructs one mesh per image
//! - Mesh saver: writes meshes to the output directory for the viewer

pub mod assets;
pub mod loader;
pub mod registry;
pub mod sampler;
pub mod saver;
pub mod schema;
pub mod settings;

pub use assets::{AssetResolver, FolderPaths};
pub use loader::ModelLoaderNode;
pub use registry::{NodeClass, TripoNodes, NODE_CATEGORY};
pub use sampler::{SamplerNode, SamplerParams};
pub use saver::{MeshSaverNode, SavedMesh, ViewerPayload, ViewerUi};
pub use schema::{InputKind, InputSpec, NodeSchema};
pub use settings::{NamingKind, PluginSettings};

pub use image_prep::ImageBatch;
pub use mesh_io::Mesh;
pub use reconstruction::ModelHandle;

use image_prep::PrepError;
use mesh_io::MeshError;
use reconstruction::ReconstructionError;
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Node errors, surfaced to the host as-is
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Invalid input '{name}': {reason}")]
    InvalidInput { name: String, reason: String },

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Prep(#[from] PrepError),

    #[error(transparent)]
    Reconstruction(#[from] ReconstructionError),

    #[error(transparent)]
    Mesh(#[from] MeshError),
}

/// Coarse failure category reported to the end user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ResourceNotFound,
    Format,
    DeviceResourceExhausted,
    Io,
    InvalidParameter,
    Runtime,
}

impl NodeError {
    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        NodeError::InvalidInput {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            NodeError::ResourceNotFound(_) => ErrorKind::ResourceNotFound,
            NodeError::InvalidInput { .. } => ErrorKind::InvalidParameter,
            NodeError::Schema(_) | NodeError::Config(_) => ErrorKind::Runtime,
            NodeError::Prep(e) => match e {
                PrepError::Format(_) => ErrorKind::Format,
                PrepError::InvalidParameter(_) => ErrorKind::InvalidParameter,
                PrepError::ModelNotFound(_) => ErrorKind::ResourceNotFound,
                PrepError::ModelLoad(_) | PrepError::Segmentation(_) => ErrorKind::Runtime,
            },
            NodeError::Reconstruction(e) => match e {
                ReconstructionError::ResourceNotFound(_) => ErrorKind::ResourceNotFound,
                ReconstructionError::DeviceResourceExhausted(_) => {
                    ErrorKind::DeviceResourceExhausted
                }
                ReconstructionError::InvalidParameter(_) => ErrorKind::InvalidParameter,
                _ => ErrorKind::Runtime,
            },
            NodeError::Mesh(e) => match e {
                MeshError::Io(_) => ErrorKind::Io,
                MeshError::InvalidName(_) => ErrorKind::InvalidParameter,
                MeshError::InvalidMesh(_) => ErrorKind::Format,
            },
        }
    }
}

/// Install the fmt subscriber; returns `false` if one was already set
pub fn init_logging() -> bool {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).is_ok()
}
