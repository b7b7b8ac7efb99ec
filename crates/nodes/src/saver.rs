//! Mesh saver / viewer node

use crate::registry::{NodeClass, NODE_CATEGORY};
use crate::schema::{InputKind, InputSpec, NodeSchema};
use crate::{NamingKind, NodeError};
use mesh_io::{Mesh, MeshExporter, NamingStyle, ObjExporter, OutputNamer, VIEWER_AXES};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

/// Default timestamp template
pub const DEFAULT_TEMPLATE: &str = "Mesh_%Y-%m-%d-%M-%S-%f.obj";

/// Default counter prefix
pub const DEFAULT_PREFIX: &str = "Mesh";

/// One written file, as reported to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedMesh {
    pub filename: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub subfolder: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewerUi {
    pub mesh: Vec<SavedMesh>,
}

/// `{"ui": {"mesh": [...]}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewerPayload {
    pub ui: ViewerUi,
}

pub struct MeshSaverNode {
    schema: NodeSchema,
    naming: NamingKind,
    output_dir: PathBuf,
    exporter: Box<dyn MeshExporter>,
}

impl MeshSaverNode {
    pub fn new(output_dir: impl Into<PathBuf>, naming: NamingKind) -> Result<Self, NodeError> {
        Self::with_exporter(output_dir, naming, Box::new(ObjExporter))
    }

    pub fn with_exporter(
        output_dir: impl Into<PathBuf>,
        naming: NamingKind,
        exporter: Box<dyn MeshExporter>,
    ) -> Result<Self, NodeError> {
        let schema = Self::build_schema(naming);
        schema.validate()?;
        Ok(Self {
            schema,
            naming,
            output_dir: output_dir.into(),
            exporter,
        })
    }

    fn pattern_input(naming: NamingKind) -> (&'static str, &'static str) {
        match naming {
            NamingKind::Timestamp => ("save_path", DEFAULT_TEMPLATE),
            NamingKind::Counter => ("filename_prefix", DEFAULT_PREFIX),
        }
    }

    fn build_schema(naming: NamingKind) -> NodeSchema {
        let class = NodeClass::Viewer;
        let (name, default) = Self::pattern_input(naming);
        NodeSchema {
            class_name: class.class_name().to_string(),
            display_name: class.display_name().to_string(),
            category: NODE_CATEGORY.to_string(),
            inputs: vec![
                InputSpec::new(
                    "mesh",
                    InputKind::Link {
                        type_name: crate::sampler::MESH_TYPE.to_string(),
                    },
                ),
                InputSpec::new(
                    name,
                    InputKind::String {
                        default: default.to_string(),
                        multiline: false,
                    },
                ),
            ],
            outputs: Vec::new(),
            output_node: true,
        }
    }

    pub fn schema(&self) -> &NodeSchema {
        &self.schema
    }

    pub fn naming(&self) -> NamingKind {
        self.naming
    }

    /// Write every mesh in viewer axes; `pattern` is the template or prefix
    pub fn save(&self, meshes: Vec<Mesh>, pattern: &str) -> Result<ViewerPayload, NodeError> {
        let (input, _) = Self::pattern_input(self.naming);
        let pattern = self.schema.check_string(input, pattern)?;
        let style = match self.naming {
            NamingKind::Timestamp => NamingStyle::timestamp(pattern),
            NamingKind::Counter => NamingStyle::counter(pattern),
        };
        let mut namer = OutputNamer::new(&self.output_dir, &style, self.exporter.extension())?;

        let mut saved = Vec::with_capacity(meshes.len());
        for mut mesh in meshes {
            mesh.apply_transform(&VIEWER_AXES);
            let filename = namer.next_name()?;
            let path = namer.folder().join(&filename);
            self.exporter.export(&mesh, &path)?;
            info!("Saved mesh to {}", path.display());

            saved.push(SavedMesh {
                filename,
                kind: "output".to_string(),
                subfolder: namer.subfolder().to_string(),
            });
        }

        Ok(ViewerPayload {
            ui: ViewerUi { mesh: saved },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn triangle() -> Mesh {
        Mesh::new(
            vec![[1.0, 2.0, 3.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            vec![[0, 1, 2]],
        )
        .unwrap()
    }

    #[test]
    fn test_counter_names() {
        let dir = tempfile::tempdir().unwrap();
        let node = MeshSaverNode::new(dir.path(), NamingKind::Counter).unwrap();
        let payload = node.save(vec![triangle(); 3], "Test").unwrap();

        let names: Vec<_> = payload.ui.mesh.iter().map(|m| m.filename.as_str()).collect();
        assert_eq!(names, ["Test_00000_.obj", "Test_00001_.obj", "Test_00002_.obj"]);
        for name in names {
            assert!(dir.path().join(name).is_file());
        }
    }

    #[test]
    fn test_subfolder_reported() {
        let dir = tempfile::tempdir().unwrap();
        let node = MeshSaverNode::new(dir.path(), NamingKind::Counter).unwrap();
        let payload = node.save(vec![triangle()], "meshes/Test").unwrap();

        assert_eq!(
            payload.ui.mesh[0],
            SavedMesh {
                filename: "Test_00000_.obj".into(),
                kind: "output".into(),
                subfolder: "meshes".into(),
            }
        );
        assert!(dir.path().join("meshes/Test_00000_.obj").is_file());
    }

    #[test]
    fn test_viewer_axes_applied() {
        let dir = tempfile::tempdir().unwrap();
        let node = MeshSaverNode::new(dir.path(), NamingKind::Counter).unwrap();
        node.save(vec![triangle()], "Axes").unwrap();

        let text = fs::read_to_string(dir.path().join("Axes_00000_.obj")).unwrap();
        let first = text.lines().find(|l| l.starts_with("v ")).unwrap();
        let coords: Vec<f32> = first[2..].split_whitespace().map(|v| v.parse().unwrap()).collect();
        assert_eq!(coords, [1.0, 3.0, -2.0]);
    }

    #[test]
    fn test_timestamp_names() {
        let dir = tempfile::tempdir().unwrap();
        let node = MeshSaverNode::new(dir.path(), NamingKind::Timestamp).unwrap();
        assert!(node.schema().input("save_path").is_ok());

        let payload = node.save(vec![triangle()], "Mesh_%Y.obj").unwrap();
        let name = &payload.ui.mesh[0].filename;
        assert!(name.starts_with("Mesh_") && name.ends_with(".obj"));
        assert_eq!(payload.ui.mesh[0].subfolder, "");
    }

    /// OBJ export followed by a short pause, so consecutive timestamps differ
    struct SlowObj;

    impl MeshExporter for SlowObj {
        fn extension(&self) -> &'static str {
            "obj"
        }

        fn export(&self, mesh: &Mesh, path: &std::path::Path) -> Result<(), mesh_io::MeshError> {
            ObjExporter.export(mesh, path)?;
            std::thread::sleep(std::time::Duration::from_millis(2));
            Ok(())
        }
    }

    #[test]
    fn test_timestamp_per_mesh() {
        let dir = tempfile::tempdir().unwrap();
        let node =
            MeshSaverNode::with_exporter(dir.path(), NamingKind::Timestamp, Box::new(SlowObj))
                .unwrap();
        let payload = node
            .save(vec![triangle(), triangle()], "Mesh_%Y-%m-%d-%M-%S-%f.obj")
            .unwrap();

        let names: Vec<_> = payload.ui.mesh.iter().map(|m| m.filename.as_str()).collect();
        assert_eq!(names.len(), 2);
        assert_ne!(names[0], names[1]);
        for name in names {
            assert!(dir.path().join(name).is_file());
        }
    }

    #[test]
    fn test_payload_json() {
        let payload = ViewerPayload {
            ui: ViewerUi {
                mesh: vec![SavedMesh {
                    filename: "a.obj".into(),
                    kind: "output".into(),
                    subfolder: String::new(),
                }],
            },
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["ui"]["mesh"][0]["type"], "output");
    }

    #[test]
    fn test_rejects_escaping_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let node = MeshSaverNode::new(dir.path().join("out"), NamingKind::Counter).unwrap();
        let err = node.save(vec![triangle()], "../Test").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidParameter);
        assert!(!dir.path().join("Test_00000_.obj").exists());
    }

    #[test]
    fn test_empty_batch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let node = MeshSaverNode::new(dir.path(), NamingKind::Counter).unwrap();
        let payload = node.save(Vec::new(), "Test").unwrap();
        assert!(payload.ui.mesh.is_empty());
    }
}
