//! Asset resolution: model folders and the output directory

use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Maps logical asset names to files
pub trait AssetResolver {
    /// Path of `name` in `category`, `None` when no such file exists
    fn full_path(&self, category: &str, name: &str) -> Option<PathBuf>;

    /// Names available in `category`, sorted
    fn list(&self, category: &str) -> Vec<String>;

    fn output_directory(&self) -> PathBuf;
}

/// `<models_root>/<category>/<name>` layout on disk
#[derive(Debug, Clone)]
pub struct FolderPaths {
    models_root: PathBuf,
    output_dir: PathBuf,
    extensions: Vec<String>,
}

impl FolderPaths {
    pub fn new(models_root: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_root: models_root.into(),
            output_dir: output_dir.into(),
            extensions: vec!["onnx".to_string()],
        }
    }

    /// Restrict listings to these extensions (without the dot)
    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions = extensions.iter().map(|e| e.to_lowercase()).collect();
        self
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .is_some_and(|e| self.extensions.iter().any(|x| *x == e))
    }

    fn collect(&self, base: &Path, dir: &Path, out: &mut Vec<String>) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Cannot list {}: {}", dir.display(), e);
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                self.collect(base, &path, out);
            } else if self.matches_extension(&path) {
                if let Ok(rel) = path.strip_prefix(base) {
                    out.push(rel.to_string_lossy().replace('\\', "/"));
                }
            }
        }
    }
}

/// Relative name with no root, prefix or `..` components
fn is_contained(name: &str) -> bool {
    !name.is_empty()
        && Path::new(name)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

impl AssetResolver for FolderPaths {
    fn full_path(&self, category: &str, name: &str) -> Option<PathBuf> {
        if !is_contained(category) || !is_contained(name) {
            warn!("Rejected asset path {}/{}", category, name);
            return None;
        }
        let path = self.models_root.join(category).join(name);
        path.is_file().then_some(path)
    }

    fn list(&self, category: &str) -> Vec<String> {
        if !is_contained(category) {
            return Vec::new();
        }
        let base = self.models_root.join(category);
        let mut names = Vec::new();
        self.collect(&base, &base, &mut names);
        names.sort();
        names
    }

    fn output_directory(&self) -> PathBuf {
        self.output_dir.clone()
    }
}
