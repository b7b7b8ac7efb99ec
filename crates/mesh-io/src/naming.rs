//! Output file naming
//!
//! Two strategies share one namer:
//! - `Counter`: `{prefix}_{NNNNN}_.{ext}`, continuing after the highest
//!   counter already present in the folder
//! - `Timestamp`: a strftime template formatted afresh for every file
//!
//! Either form may carry a relative subfolder (`meshes/Test`), which is
//! created under the output directory and reported back to the host.

use crate::MeshError;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// How output files are named
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum NamingStyle {
    /// Prefix plus zero-padded counter
    Counter { prefix: String },
    /// strftime template; `%f` is microseconds
    Timestamp { template: String },
}

impl Default for NamingStyle {
    fn default() -> Self {
        NamingStyle::Timestamp {
            template: "Mesh_%Y-%m-%d-%M-%S-%f.obj".to_string(),
        }
    }
}

impl NamingStyle {
    pub fn counter(prefix: impl Into<String>) -> Self {
        NamingStyle::Counter {
            prefix: prefix.into(),
        }
    }

    pub fn timestamp(template: impl Into<String>) -> Self {
        NamingStyle::Timestamp {
            template: template.into(),
        }
    }
}

/// Split `sub/dir/name` into a validated relative subfolder and the last component
fn split_relative(pattern: &str) -> Result<(PathBuf, String), MeshError> {
    let path = Path::new(pattern);
    let mut subfolder = PathBuf::new();
    let mut last = None;

    for component in path.components() {
        match component {
            Component::Normal(part) => {
                if let Some(prev) = last.replace(part.to_string_lossy().into_owned()) {
                    subfolder.push(prev);
                }
            }
            Component::CurDir => {}
            _ => {
                return Err(MeshError::InvalidName(format!(
                    "'{}' must stay inside the output directory",
                    pattern
                )))
            }
        }
    }

    match last {
        Some(name) if !name.is_empty() => Ok((subfolder, name)),
        _ => Err(MeshError::InvalidName(format!("'{}' has no file name", pattern))),
    }
}

/// Map Python-style `%f` (microseconds) onto chrono's `%6f`
fn normalize_template(template: &str) -> String {
    let mut out = String::with_capacity(template.len() + 4);
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        out.push(c);
        if c == '%' {
            match chars.next() {
                Some('f') => out.push_str("6f"),
                Some(next) => out.push(next),
                None => {}
            }
        }
    }
    out
}

/// Format `template` at `now`, rejecting templates chrono cannot render
pub fn format_timestamp(template: &str, now: &DateTime<Local>) -> Result<String, MeshError> {
    let normalized = normalize_template(template);
    if StrftimeItems::new(&normalized).any(|item| matches!(item, Item::Error)) {
        return Err(MeshError::InvalidName(format!(
            "invalid timestamp template '{}'",
            template
        )));
    }

    let mut name = String::new();
    write!(name, "{}", now.format(&normalized))
        .map_err(|_| MeshError::InvalidName(format!("cannot format '{}'", template)))?;
    Ok(name)
}

/// Parse `NNNNN` out of `{base}_{NNNNN}_...`
fn counter_of(file_name: &str, base: &str) -> Option<u32> {
    let rest = file_name.strip_prefix(base)?.strip_prefix('_')?;
    let (digits, _) = rest.split_once('_')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Hands out file names inside one output folder
#[derive(Debug)]
pub struct OutputNamer {
    style: NamingStyle,
    folder: PathBuf,
    subfolder: String,
    /// Template or prefix with the subfolder stripped
    base: String,
    counter: u32,
    extension: String,
}

impl OutputNamer {
    /// Prepare the folder for `style` under `output_dir`, creating it if needed
    pub fn new(output_dir: &Path, style: &NamingStyle, extension: &str) -> Result<Self, MeshError> {
        let pattern = match style {
            NamingStyle::Counter { prefix } => prefix.as_str(),
            NamingStyle::Timestamp { template } => template.as_str(),
        };
        let (sub, base) = split_relative(pattern)?;
        if let NamingStyle::Timestamp { .. } = style {
            format_timestamp(&base, &Local::now())?;
        }

        let folder = output_dir.join(&sub);
        fs::create_dir_all(&folder)?;

        let counter = match style {
            NamingStyle::Counter { .. } => Self::next_free_counter(&folder, &base)?,
            NamingStyle::Timestamp { .. } => 0,
        };
        debug!(
            "Output folder {} (subfolder '{}'), starting counter {}",
            folder.display(),
            sub.display(),
            counter
        );

        Ok(Self {
            style: style.clone(),
            folder,
            subfolder: sub.to_string_lossy().replace('\\', "/"),
            base,
            counter,
            extension: extension.to_string(),
        })
    }

    fn next_free_counter(folder: &Path, base: &str) -> Result<u32, MeshError> {
        let mut highest: Option<u32> = None;
        for entry in fs::read_dir(folder)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(n) = counter_of(&name.to_string_lossy(), base) {
                highest = Some(highest.map_or(n, |h| h.max(n)));
            }
        }
        Ok(highest.map_or(0, |h| h + 1))
    }

    /// Absolute folder the files go into
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Subfolder relative to the output directory, `""` for the root
    pub fn subfolder(&self) -> &str {
        &self.subfolder
    }

    /// Next file name, stamped with the current local time
    pub fn next_name(&mut self) -> Result<String, MeshError> {
        self.next_name_at(&Local::now())
    }

    /// Next file name using `now` for timestamp templates
    pub fn next_name_at(&mut self, now: &DateTime<Local>) -> Result<String, MeshError> {
        match &self.style {
            NamingStyle::Counter { .. } => {
                let name = format!("{}_{:05}_.{}", self.base, self.counter, self.extension);
                self.counter += 1;
                Ok(name)
            }
            NamingStyle::Timestamp { .. } => {
                let name = format_timestamp(&self.base, now)?;
                if name.is_empty() || name.contains(['/', '\\']) {
                    return Err(MeshError::InvalidName(format!(
                        "template produced unusable name '{}'",
                        name
                    )));
                }
                Ok(name)
            }
        }
    }
}
