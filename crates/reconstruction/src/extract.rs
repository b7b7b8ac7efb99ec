//! Mesh extraction orchestration
//!
//! The density field is sampled on a `resolution`³ lattice spanning
//! `[-radius, radius]`³, in chunks of at most `chunk_size` points per
//! decoder call. The iso-surface itself comes from a [`SurfaceExtractor`];
//! its vertices are in lattice index units and get rescaled to world space.

use crate::{ReconstructionError, SceneCode};
use mesh_io::Mesh;
use ndarray::Array3;
use tracing::debug;

/// Decodes field values at world-space points
pub trait FieldDecoder {
    /// Activated density, one value per point
    fn query_density(
        &self,
        code: &SceneCode,
        points: &[[f32; 3]],
    ) -> Result<Vec<f32>, ReconstructionError>;

    /// RGB in `[0, 1]`, one value per point
    fn query_color(
        &self,
        code: &SceneCode,
        points: &[[f32; 3]],
    ) -> Result<Vec<[f32; 3]>, ReconstructionError>;
}

/// Density samples indexed `[x, y, z]`
#[derive(Debug, Clone)]
pub struct DensityGrid {
    pub values: Array3<f32>,
}

impl DensityGrid {
    pub fn resolution(&self) -> usize {
        self.values.dim().0
    }
}

/// Iso-surface extraction. Points with `value > level` are inside; returned
/// vertex positions are in lattice index units `[0, resolution - 1]`.
pub trait SurfaceExtractor: Send + Sync {
    fn extract(&self, grid: &DensityGrid, level: f32) -> Result<Mesh, ReconstructionError>;
}

/// Extraction settings for one call
#[derive(Debug, Clone, Copy)]
pub struct ExtractionParams {
    pub resolution: u32,
    pub threshold: f32,
    pub radius: f32,
    pub chunk_size: usize,
    pub vertex_colors: bool,
}

impl ExtractionParams {
    pub fn validate(&self) -> Result<(), ReconstructionError> {
        if self.resolution == 0 {
            return Err(ReconstructionError::InvalidParameter(
                "extraction resolution must be positive".into(),
            ));
        }
        if !(self.threshold >= 0.0 && self.threshold.is_finite()) {
            return Err(ReconstructionError::InvalidParameter(format!(
                "surface threshold must be non-negative, got {}",
                self.threshold
            )));
        }
        if self.chunk_size == 0 {
            return Err(ReconstructionError::InvalidParameter("chunk size must be positive".into()));
        }
        self.lattice_len()?;
        Ok(())
    }

    /// Number of lattice points; the density grid for them must fit in memory
    pub fn lattice_len(&self) -> Result<usize, ReconstructionError> {
        let n = self.resolution as usize;
        n.checked_mul(n)
            .and_then(|nn| nn.checked_mul(n))
            .filter(|len| {
                len.checked_mul(std::mem::size_of::<f32>())
                    .is_some_and(|bytes| bytes <= isize::MAX as usize)
            })
            .ok_or_else(|| {
                ReconstructionError::InvalidParameter(format!(
                    "extraction resolution {} is too large",
                    self.resolution
                ))
            })
    }

    /// World coordinate of lattice index `i`
    fn to_world(&self, i: f32) -> f32 {
        let span = (self.resolution.saturating_sub(1)).max(1) as f32;
        -self.radius + 2.0 * self.radius * i / span
    }
}

/// World-space lattice, walked in `x`-major order to match `Array3` indexing `[x, y, z]`
struct Lattice {
    axis: Vec<f32>,
}

impl Lattice {
    fn new(params: &ExtractionParams) -> Self {
        let n = params.resolution as usize;
        Self {
            axis: (0..n).map(|i| params.to_world(i as f32)).collect(),
        }
    }

    /// Point at flat index `i`
    fn point(&self, i: usize) -> [f32; 3] {
        let n = self.axis.len();
        [self.axis[i / (n * n)], self.axis[(i / n) % n], self.axis[i % n]]
    }

    /// Points `start..end`, built only when their chunk is queried
    fn points(&self, start: usize, end: usize) -> Vec<[f32; 3]> {
        (start..end).map(|i| self.point(i)).collect()
    }
}

/// Query the density of every lattice point, `chunk_size` points at a time
fn sample_density(
    decoder: &dyn FieldDecoder,
    code: &SceneCode,
    params: &ExtractionParams,
    len: usize,
) -> Result<Vec<f32>, ReconstructionError> {
    let lattice = Lattice::new(params);
    let mut density = Vec::new();
    density.try_reserve_exact(len).map_err(|e| {
        ReconstructionError::InvalidParameter(format!(
            "density grid of {} points does not fit in memory: {}",
            len, e
        ))
    })?;

    let mut start = 0;
    while start < len {
        let end = start.saturating_add(params.chunk_size).min(len);
        let chunk = lattice.points(start, end);
        density.extend(check_len(decoder.query_density(code, &chunk)?, chunk.len())?);
        start = end;
    }
    Ok(density)
}

fn check_len<T>(values: Vec<T>, expected: usize) -> Result<Vec<T>, ReconstructionError> {
    if values.len() != expected {
        return Err(ReconstructionError::Inference(format!(
            "decoder returned {} values for {} points",
            values.len(),
            expected
        )));
    }
    Ok(values)
}

/// Run `query` over `points` in chunks, concatenating the results
fn chunked<T, F>(points: &[[f32; 3]], chunk_size: usize, mut query: F) -> Result<Vec<T>, ReconstructionError>
where
    F: FnMut(&[[f32; 3]]) -> Result<Vec<T>, ReconstructionError>,
{
    let mut out = Vec::with_capacity(points.len());
    for chunk in points.chunks(chunk_size) {
        out.extend(check_len(query(chunk)?, chunk.len())?);
    }
    Ok(out)
}

/// Sample the density field, extract the surface and move it to world space
pub fn extract_mesh(
    decoder: &dyn FieldDecoder,
    extractor: &dyn SurfaceExtractor,
    code: &SceneCode,
    params: &ExtractionParams,
) -> Result<Mesh, ReconstructionError> {
    params.validate()?;

    let n = params.resolution as usize;
    let len = params.lattice_len()?;
    debug!(
        "Querying density at {} points in chunks of {}",
        len, params.chunk_size
    );
    let density = sample_density(decoder, code, params, len)?;

    let values = Array3::from_shape_vec((n, n, n), density)
        .map_err(|e| ReconstructionError::Extraction(e.to_string()))?;
    let grid = DensityGrid { values };

    let mut mesh = extractor.extract(&grid, params.threshold)?;
    for v in &mut mesh.vertices {
        for c in v.iter_mut() {
            *c = params.to_world(*c);
        }
    }

    if params.vertex_colors && !mesh.vertices.is_empty() {
        let colors = chunked(&mesh.vertices, params.chunk_size, |c| decoder.query_color(code, c))?;
        mesh = mesh
            .with_colors(colors)
            .map_err(|e| ReconstructionError::Extraction(e.to_string()))?;
    } else {
        mesh.colors = None;
    }

    mesh.validate()
        .map_err(|e| ReconstructionError::Extraction(e.to_string()))?;
    debug!(
        "Extracted {} vertices, {} faces",
        mesh.vertex_count(),
        mesh.face_count()
    );
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};
    use std::cell::RefCell;

    /// Density of a ball of radius 0.5: 1 inside, 0 outside
    struct Ball {
        calls: RefCell<Vec<usize>>,
    }

    impl FieldDecoder for Ball {
        fn query_density(&self, _: &SceneCode, points: &[[f32; 3]]) -> Result<Vec<f32>, ReconstructionError> {
            self.calls.borrow_mut().push(points.len());
            Ok(points
                .iter()
                .map(|p| if p.iter().map(|c| c * c).sum::<f32>() < 0.25 { 1.0 } else { 0.0 })
                .collect())
        }

        fn query_color(&self, _: &SceneCode, points: &[[f32; 3]]) -> Result<Vec<[f32; 3]>, ReconstructionError> {
            Ok(points.iter().map(|p| [p[0].abs(), 0.5, 0.5]).collect())
        }
    }

    /// Emits one triangle spanning the lattice corners when anything is inside
    struct Corners;

    impl SurfaceExtractor for Corners {
        fn extract(&self, grid: &DensityGrid, level: f32) -> Result<Mesh, ReconstructionError> {
            if !grid.values.iter().any(|&v| v > level) {
                return Ok(Mesh::empty());
            }
            let last = (grid.resolution() - 1) as f32;
            Mesh::new(
                vec![[0.0, 0.0, 0.0], [last, 0.0, 0.0], [0.0, last, last]],
                vec![[0, 1, 2]],
            )
            .map_err(|e| ReconstructionError::Extraction(e.to_string()))
        }
    }

    fn code() -> SceneCode {
        SceneCode::new(ArrayD::zeros(IxDyn(&[1])))
    }

    fn params() -> ExtractionParams {
        ExtractionParams {
            resolution: 5,
            threshold: 0.5,
            radius: 1.0,
            chunk_size: 40,
            vertex_colors: true,
        }
    }

    #[test]
    fn test_chunking_covers_every_point() {
        let ball = Ball { calls: RefCell::new(Vec::new()) };
        extract_mesh(&ball, &Corners, &code(), &params()).unwrap();

        let calls = ball.calls.borrow();
        assert_eq!(calls.iter().sum::<usize>(), 125);
        assert!(calls.iter().all(|&n| n <= 40));
        assert_eq!(calls.len(), 4);
    }

    #[test]
    fn test_vertices_rescaled_to_world() {
        let ball = Ball { calls: RefCell::new(Vec::new()) };
        let mesh = extract_mesh(&ball, &Corners, &code(), &params()).unwrap();

        assert_eq!(mesh.vertices[0], [-1.0, -1.0, -1.0]);
        assert_eq!(mesh.vertices[1], [1.0, -1.0, -1.0]);
        assert_eq!(mesh.vertices[2], [-1.0, 1.0, 1.0]);
        assert_eq!(mesh.colors.as_ref().unwrap()[1], [1.0, 0.5, 0.5]);
    }

    #[test]
    fn test_high_threshold_gives_empty_mesh() {
        let ball = Ball { calls: RefCell::new(Vec::new()) };
        let p = ExtractionParams { threshold: 2.0, ..params() };
        let mesh = extract_mesh(&ball, &Corners, &code(), &p).unwrap();
        assert!(mesh.is_empty());
        assert!(mesh.colors.is_none());
    }

    #[test]
    fn test_invalid_params_rejected_before_query() {
        let ball = Ball { calls: RefCell::new(Vec::new()) };
        for p in [
            ExtractionParams { resolution: 0, ..params() },
            ExtractionParams { threshold: -0.1, ..params() },
            ExtractionParams { chunk_size: 0, ..params() },
        ] {
            assert!(matches!(
                extract_mesh(&ball, &Corners, &code(), &p),
                Err(ReconstructionError::InvalidParameter(_))
            ));
        }
        assert!(ball.calls.borrow().is_empty());
    }

    #[test]
    fn test_lattice_order_is_x_major() {
        let pts = Lattice::new(&ExtractionParams { resolution: 2, ..params() }).points(0, 8);
        assert_eq!(pts.len(), 8);
        assert_eq!(pts[0], [-1.0, -1.0, -1.0]);
        assert_eq!(pts[1], [-1.0, -1.0, 1.0]);
        assert_eq!(pts[4], [1.0, -1.0, -1.0]);
        assert_eq!(pts[7], [1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_chunks_match_whole_lattice() {
        let p = ExtractionParams { resolution: 4, ..params() };
        let lattice = Lattice::new(&p);
        let whole = lattice.points(0, 64);
        let pieced: Vec<_> = [(0, 10), (10, 37), (37, 64)]
            .into_iter()
            .flat_map(|(a, b)| lattice.points(a, b))
            .collect();
        assert_eq!(whole, pieced);
    }

    #[test]
    fn test_oversized_resolution_rejected() {
        let ball = Ball { calls: RefCell::new(Vec::new()) };
        for resolution in [u32::MAX, 1 << 21] {
            let p = ExtractionParams { resolution, ..params() };
            assert!(matches!(p.lattice_len(), Err(ReconstructionError::InvalidParameter(_))));
            assert!(matches!(
                extract_mesh(&ball, &Corners, &code(), &p),
                Err(ReconstructionError::InvalidParameter(_))
            ));
        }
        assert!(ball.calls.borrow().is_empty());
        assert_eq!(params().lattice_len().unwrap(), 125);
    }
}
