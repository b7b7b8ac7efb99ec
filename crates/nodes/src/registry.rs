//! Node registry: class names, display names and the assembled node set

use crate::{
    AssetResolver, FolderPaths, MeshSaverNode, ModelLoaderNode, NodeError, NodeSchema, PluginSettings,
    SamplerNode,
};
use image_prep::{BackgroundRemover, U2NetSegmenter};
use reconstruction::{OnnxModelFactory, OrtDeviceSelector, SurfaceExtractor};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

/// Host menu category shared by all nodes
pub const NODE_CATEGORY: &str = "Flowty TripoSR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeClass {
    ModelLoader,
    Sampler,
    Viewer,
}

impl NodeClass {
    pub const ALL: [NodeClass; 3] = [NodeClass::ModelLoader, NodeClass::Sampler, NodeClass::Viewer];

    pub fn class_name(&self) -> &'static str {
        match self {
            NodeClass::ModelLoader => "TripoSRModelLoader",
            NodeClass::Sampler => "TripoSRSampler",
            NodeClass::Viewer => "TripoSRViewer",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            NodeClass::ModelLoader => "TripoSR Model Loader",
            NodeClass::Sampler => "TripoSR Sampler",
            NodeClass::Viewer => "TripoSR Viewer",
        }
    }

    pub fn from_class_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.class_name() == name)
    }
}

/// The three nodes, wired to one set of plugin settings
pub struct TripoNodes {
    pub loader: ModelLoaderNode,
    pub sampler: SamplerNode,
    pub saver: MeshSaverNode,
}

impl TripoNodes {
    /// Build the nodes on the ONNX backend, meshing with `extractor`
    pub fn from_settings(
        settings: &PluginSettings,
        extractor: Arc<dyn SurfaceExtractor>,
    ) -> Result<Self, NodeError> {
        settings.validate()?;
        let resolver = Arc::new(FolderPaths::new(&settings.models_root, &settings.output_dir));

        let output_dir = resolver.output_directory();
        let loader = ModelLoaderNode::new(
            settings,
            resolver,
            Box::new(OrtDeviceSelector::default()),
            Box::new(OnnxModelFactory::new(extractor)),
        )?;

        let remover = match &settings.segmentation_model {
            Some(path) => {
                let segmenter: Box<dyn BackgroundRemover> = Box::new(U2NetSegmenter::new(path)?);
                Some(segmenter)
            }
            None => {
                info!("No segmentation model configured, background removal disabled");
                None
            }
        };
        let sampler = SamplerNode::new(remover)?;
        let saver = MeshSaverNode::new(output_dir, settings.naming)?;

        Ok(Self {
            loader,
            sampler,
            saver,
        })
    }

    pub fn schema(&self, class: NodeClass) -> &NodeSchema {
        match class {
            NodeClass::ModelLoader => self.loader.schema(),
            NodeClass::Sampler => self.sampler.schema(),
            NodeClass::Viewer => self.saver.schema(),
        }
    }

    /// Every node's declaration keyed by class name
    pub fn schemas(&self) -> Value {
        let map: Map<String, Value> = NodeClass::ALL
            .iter()
            .map(|c| (c.class_name().to_string(), self.schema(*c).to_host_json()))
            .collect();
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_names_round_trip() {
        for class in NodeClass::ALL {
            assert_eq!(NodeClass::from_class_name(class.class_name()), Some(class));
        }
        assert_eq!(NodeClass::from_class_name("Unknown"), None);
    }

    struct NoSurface;

    impl SurfaceExtractor for NoSurface {
        fn extract(
            &self,
            _: &reconstruction::DensityGrid,
            _: f32,
        ) -> Result<mesh_io::Mesh, reconstruction::ReconstructionError> {
            Ok(mesh_io::Mesh::empty())
        }
    }

    #[test]
    fn test_from_settings_without_segmenter() {
        let dir = tempfile::tempdir().unwrap();
        let settings = PluginSettings {
            models_root: dir.path().join("models"),
            output_dir: dir.path().join("output"),
            naming: crate::NamingKind::Counter,
            ..Default::default()
        };
        let nodes = TripoNodes::from_settings(&settings, Arc::new(NoSurface)).unwrap();

        assert!(!nodes.sampler.has_remover());
        let schemas = nodes.schemas();
        assert_eq!(schemas.as_object().unwrap().len(), 3);
        assert_eq!(schemas["TripoSRViewer"]["output_node"], true);
        assert_eq!(schemas["TripoSRSampler"]["category"], NODE_CATEGORY);
        assert!(schemas["TripoSRViewer"]["input"]["required"]["filename_prefix"].is_array());

        let mesh = mesh_io::Mesh::new(vec![[0.0; 3]; 3], vec![[0, 1, 2]]).unwrap();
        nodes.saver.save(vec![mesh], "Test").unwrap();
        assert!(dir.path().join("output/Test_00000_.obj").is_file());
    }

    #[test]
    fn test_missing_segmentation_model() {
        let dir = tempfile::tempdir().unwrap();
        let settings = PluginSettings {
            models_root: dir.path().join("models"),
            segmentation_model: Some(dir.path().join("u2net.onnx")),
            ..Default::default()
        };
        let err = TripoNodes::from_settings(&settings, Arc::new(NoSurface)).err().unwrap();
        assert_eq!(err.kind(), crate::ErrorKind::ResourceNotFound);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(NodeClass::ModelLoader.display_name(), "TripoSR Model Loader");
        assert_eq!(NodeClass::Viewer.class_name(), "TripoSRViewer");
    }
}
