//! Mesh Output
//!
//! Mesh container plus everything needed to put it on disk:
//! - Homogeneous transforms (viewer axis convention)
//! - Wavefront OBJ export
//! - Counter and timestamp file naming

pub mod mesh;
pub mod naming;
pub mod obj;

pub use mesh::{Mesh, Transform, VIEWER_AXES};
pub use naming::{NamingStyle, OutputNamer};
pub use obj::{write_obj, MeshExporter, ObjExporter};

use thiserror::Error;

/// Mesh output errors
#[derive(Error, Debug)]
pub enum MeshError {
    #[error("Invalid mesh: {0}")]
    InvalidMesh(String),

    #[error("Invalid output name: {0}")]
    InvalidName(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
