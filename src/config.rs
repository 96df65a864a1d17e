//! YAML configuration: which Drive folders to sync and where fallbacks go.
//!
//! ```yaml
//! directories:
//!   - "Reports/Q1": /local/Reports_Q1
//!   - Path/To/Folder
//!   - { id: 1AbCdEf, name: Team }
//!   - { path: Shared/Specs, name: Specs }
//! output_root: downloads
//! ```
//!
//! `directories` may also be a plain mapping of Drive path to local path.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, SyncError};
use crate::folder_id::parse_folder_id;

/// Default directory, relative to the working directory, for folders
/// configured without an explicit local path.
pub const DEFAULT_OUTPUT_ROOT: &str = "downloads";

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub directories: Directories,
    #[serde(default)]
    pub output_root: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Directories {
    List(Vec<DirectoryEntry>),
    Map(BTreeMap<String, PathBuf>),
}

impl Default for Directories {
    fn default() -> Self {
        Directories::List(Vec::new())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DirectoryEntry {
    /// A bare Drive path.
    Path(String),
    Detailed(FolderSpec),
    /// `{ "Drive/Path": "/local/path" }`
    Mapped(BTreeMap<String, PathBuf>),
}

/// `{ id, path, name, local }`, with `id` or `path` required.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FolderSpec {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub local: Option<PathBuf>,
}

/// How a configured folder is located in Drive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FolderRef {
    Path(String),
    Id(String),
}

impl std::fmt::Display for FolderRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FolderRef::Path(path) => write!(f, "{}", path),
            FolderRef::Id(id) => write!(f, "id:{}", id),
        }
    }
}

/// A Drive folder paired with its local fallback directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryMapping {
    pub folder: FolderRef,
    pub name: String,
    pub local_dir: PathBuf,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SyncError::InvalidConfig(format!(
                "config file {} not found",
                path.display()
            )));
        }
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Resolve the configured entries into mappings.
    ///
    /// Relative output roots are taken relative to `base_dir`. Entries given
    /// without a local path land in `<output_root>/<folder name>`.
    pub fn mappings(&self, base_dir: &Path) -> Result<Vec<DirectoryMapping>> {
        let output_root = base_dir.join(
            self.output_root
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_ROOT)),
        );

        let entries: Vec<DirectoryEntry> = match &self.directories {
            Directories::List(entries) => entries.clone(),
            Directories::Map(map) => map
                .iter()
                .map(|(k, v)| DirectoryEntry::Mapped(BTreeMap::from([(k.clone(), v.clone())])))
                .collect(),
        };

        let mut seen = HashSet::new();
        let mut mappings = Vec::with_capacity(entries.len());

        for entry in entries {
            let mapping = entry.into_mapping(&output_root)?;
            if !seen.insert(mapping.folder.clone()) {
                return Err(SyncError::InvalidConfig(format!(
                    "folder {} is configured more than once",
                    mapping.folder
                )));
            }
            mappings.push(mapping);
        }

        Ok(mappings)
    }
}

impl DirectoryEntry {
    fn into_mapping(self, output_root: &Path) -> Result<DirectoryMapping> {
        match self {
            DirectoryEntry::Path(path) => {
                let path = normalize_drive_path(&path)?;
                let name = last_segment(&path);
                Ok(DirectoryMapping {
                    local_dir: output_root.join(&name),
                    folder: FolderRef::Path(path),
                    name,
                })
            }
            DirectoryEntry::Mapped(map) => {
                let mut iter = map.into_iter();
                match (iter.next(), iter.next()) {
                    (Some((path, local_dir)), None) => {
                        let path = normalize_drive_path(&path)?;
                        Ok(DirectoryMapping {
                            name: last_segment(&path),
                            folder: FolderRef::Path(path),
                            local_dir,
                        })
                    }
                    _ => Err(SyncError::InvalidConfig(
                        "a mapped directory entry must have exactly one key".to_string(),
                    )),
                }
            }
            DirectoryEntry::Detailed(FolderSpec {
                id,
                path,
                name,
                local,
            }) => {
                let (folder, default_name) = match (id, path) {
                    (Some(id), _) => (FolderRef::Id(parse_folder_id(&id)?), None),
                    (None, Some(path)) => {
                        let path = normalize_drive_path(&path)?;
                        let segment = last_segment(&path);
                        (FolderRef::Path(path), Some(segment))
                    }
                    (None, None) => {
                        return Err(SyncError::InvalidConfig(
                            "directory entry needs an id or a path".to_string(),
                        ))
                    }
                };
                let name = name
                    .or(default_name)
                    .unwrap_or_else(|| "Unknown".to_string());
                let local_dir = local.unwrap_or_else(|| output_root.join(&name));
                Ok(DirectoryMapping {
                    folder,
                    name,
                    local_dir,
                })
            }
        }
    }
}

/// Strip redundant slashes: `/Reports//Q1/` → `Reports/Q1`. The drive root is `/`.
fn normalize_drive_path(path: &str) -> Result<String> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(SyncError::InvalidConfig("empty Drive path".to_string()));
    }
    let parts: Vec<&str> = trimmed.split('/').filter(|p| !p.is_empty()).collect();
    if parts.is_empty() {
        return Ok("/".to_string());
    }
    Ok(parts.join("/"))
}

fn last_segment(path: &str) -> String {
    match path.rsplit('/').next() {
        Some(segment) if !segment.is_empty() => segment.to_string(),
        _ => "root".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_drive_path() {
        assert_eq!(normalize_drive_path("/Reports//Q1/").unwrap(), "Reports/Q1");
        assert_eq!(normalize_drive_path("/").unwrap(), "/");
        assert!(normalize_drive_path("  ").is_err());
    }

    #[test]
    fn test_last_segment() {
        assert_eq!(last_segment("Reports/Q1"), "Q1");
        assert_eq!(last_segment("Reports"), "Reports");
        assert_eq!(last_segment("/"), "root");
    }
}
