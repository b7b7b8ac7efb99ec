//! Triangle mesh container and transforms

use crate::MeshError;
use serde::{Deserialize, Serialize};

/// Row-major 4x4 homogeneous transform
pub type Transform = [[f32; 4]; 4];

/// Model frame to viewer frame: `(x, y, z) -> (x, z, -y)`
pub const VIEWER_AXES: Transform = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, -1.0, 0.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Triangle mesh with optional per-vertex RGB colours in `[0, 1]`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Mesh {
    pub vertices: Vec<[f32; 3]>,
    pub faces: Vec<[u32; 3]>,
    pub colors: Option<Vec<[f32; 3]>>,
}

impl Mesh {
    /// Create a mesh, checking that every face index is in range
    pub fn new(vertices: Vec<[f32; 3]>, faces: Vec<[u32; 3]>) -> Result<Self, MeshError> {
        let mesh = Self {
            vertices,
            faces,
            colors: None,
        };
        mesh.validate()?;
        Ok(mesh)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Attach one colour per vertex
    pub fn with_colors(mut self, colors: Vec<[f32; 3]>) -> Result<Self, MeshError> {
        if colors.len() != self.vertices.len() {
            return Err(MeshError::InvalidMesh(format!(
                "{} colours for {} vertices",
                colors.len(),
                self.vertices.len()
            )));
        }
        self.colors = Some(colors);
        Ok(self)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Check face indices and colour count
    pub fn validate(&self) -> Result<(), MeshError> {
        let n = self.vertices.len() as u64;
        if let Some(face) = self
            .faces
            .iter()
            .find(|f| f.iter().any(|&i| i as u64 >= n))
        {
            return Err(MeshError::InvalidMesh(format!(
                "face {:?} references a vertex beyond {}",
                face, n
            )));
        }
        if let Some(colors) = &self.colors {
            if colors.len() != self.vertices.len() {
                return Err(MeshError::InvalidMesh("colour count mismatch".into()));
            }
        }
        Ok(())
    }

    /// Apply a homogeneous transform to every vertex in place
    pub fn apply_transform(&mut self, m: &Transform) {
        for v in &mut self.vertices {
            let [x, y, z] = *v;
            let mut out = [0.0f32; 3];
            for (row, o) in out.iter_mut().enumerate() {
                *o = m[row][0] * x + m[row][1] * y + m[row][2] * z + m[row][3];
            }
            let w = m[3][0] * x + m[3][1] * y + m[3][2] * z + m[3][3];
            if w != 0.0 && w != 1.0 {
                out.iter_mut().for_each(|o| *o /= w);
            }
            *v = out;
        }
    }
}
