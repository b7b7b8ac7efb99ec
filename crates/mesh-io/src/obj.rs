//! Wavefront OBJ export
//!
//! Emits `v` records (with trailing RGB when the mesh carries colours) and
//! 1-based triangular `f` records.

use crate::{Mesh, MeshError};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// Serializes a mesh to a file
pub trait MeshExporter {
    /// File extension without the dot
    fn extension(&self) -> &'static str;

    fn export(&self, mesh: &Mesh, path: &Path) -> Result<(), MeshError>;
}

/// Plain-text OBJ exporter
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjExporter;

impl MeshExporter for ObjExporter {
    fn extension(&self) -> &'static str {
        "obj"
    }

    fn export(&self, mesh: &Mesh, path: &Path) -> Result<(), MeshError> {
        mesh.validate()?;
        let file = File::create(path)?;
        let mut w = BufWriter::new(file);
        write_obj(mesh, &mut w)?;
        w.flush()?;
        debug!(
            "Wrote {} vertices, {} faces to {}",
            mesh.vertex_count(),
            mesh.face_count(),
            path.display()
        );
        Ok(())
    }
}

/// Write `mesh` as OBJ text
pub fn write_obj<W: Write>(mesh: &Mesh, w: &mut W) -> Result<(), MeshError> {
    match &mesh.colors {
        Some(colors) => {
            for (p, c) in mesh.vertices.iter().zip(colors) {
                writeln!(
                    w,
                    "v {:.8} {:.8} {:.8} {:.8} {:.8} {:.8}",
                    p[0], p[1], p[2], c[0], c[1], c[2]
                )?;
            }
        }
        None => {
            for p in &mesh.vertices {
                writeln!(w, "v {:.8} {:.8} {:.8}", p[0], p[1], p[2])?;
            }
        }
    }

    for f in &mesh.faces {
        writeln!(w, "f {} {} {}", f[0] + 1, f[1] + 1, f[2] + 1)?;
    }
    Ok(())
}
