//! Project identity, tree layout, and the current-project marker.
//!
//! A project is a directory under the data root holding two categories of
//! canonical rasters:
//!
//! ```text
//! data/
//! └── 2025_annual/             # project id
//!     ├── originals/           # raw imports (import-originals)
//!     │   └── BWR_T1_full.tif
//!     └── edited/              # hand-edited versions (import-edited)
//!         └── BWR_T1_full.tif
//! ```
//!
//! Every entry point receives an explicit [`ProjectContext`]. The marker file
//! is only a persistence adapter ([`MarkerStore`]) used to fill in the project
//! when the command line leaves it out.

use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid project id {0:?}: must be a single directory name")]
    InvalidId(String),
    #[error(
        "No project given and no current project recorded in {0}. \
         Run import-originals first, or pass the project name explicitly."
    )]
    NoProject(PathBuf),
    #[error("Project directory not found: {0}")]
    ProjectMissing(PathBuf),
    #[error("Category directory not found: {0}")]
    CategoryMissing(PathBuf),
}

/// Validated project identifier: one path component, no separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(id: &str) -> Result<Self, ProjectError> {
        let trimmed = id.trim();
        if !is_single_component(trimmed) {
            return Err(ProjectError::InvalidId(id.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// True when `name` can be used as a directory name directly under a root.
pub(crate) fn is_single_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.chars().any(char::is_control)
}

/// The two asset categories of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Originals,
    Edited,
}

impl Category {
    pub fn dir_name(self) -> &'static str {
        match self {
            Category::Originals => "originals",
            Category::Edited => "edited",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Explicit project context threaded through every command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectContext {
    pub data_root: PathBuf,
    pub project: ProjectId,
}

impl ProjectContext {
    pub fn new(data_root: impl Into<PathBuf>, project: ProjectId) -> Self {
        Self {
            data_root: data_root.into(),
            project,
        }
    }

    /// Use `explicit` when given, otherwise the project recorded in `marker`.
    pub fn resolve(
        data_root: impl Into<PathBuf>,
        explicit: Option<&str>,
        marker: &dyn MarkerStore,
    ) -> Result<Self, ProjectError> {
        let project = match explicit {
            Some(id) => ProjectId::new(id)?,
            None => marker
                .read()?
                .ok_or_else(|| ProjectError::NoProject(marker.location()))?,
        };
        Ok(Self::new(data_root, project))
    }

    pub fn project_dir(&self) -> PathBuf {
        self.data_root.join(self.project.as_str())
    }

    pub fn category_dir(&self, category: Category) -> PathBuf {
        self.project_dir().join(category.dir_name())
    }

    /// The category directory, or a reportable error when it does not exist.
    pub fn existing_category_dir(&self, category: Category) -> Result<PathBuf, ProjectError> {
        let project_dir = self.project_dir();
        if !project_dir.is_dir() {
            return Err(ProjectError::ProjectMissing(project_dir));
        }
        let dir = self.category_dir(category);
        if !dir.is_dir() {
            return Err(ProjectError::CategoryMissing(dir));
        }
        Ok(dir)
    }
}

/// Narrow read/write interface over the persisted current project.
///
/// Writes overwrite; concurrent writers are last-write-wins.
pub trait MarkerStore {
    /// The recorded project, or `None` when nothing has been recorded yet.
    fn read(&self) -> Result<Option<ProjectId>, ProjectError>;

    fn write(&self, project: &ProjectId) -> Result<(), ProjectError>;

    /// Where the marker lives, for error messages.
    fn location(&self) -> PathBuf;
}

/// Marker persisted as a single-line text file.
#[derive(Debug, Clone)]
pub struct FileMarker {
    path: PathBuf,
}

impl FileMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MarkerStore for FileMarker {
    fn read(&self) -> Result<Option<ProjectId>, ProjectError> {
        if !self.path.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        let line = content.lines().next().unwrap_or("").trim();
        if line.is_empty() {
            return Ok(None);
        }
        ProjectId::new(line).map(Some)
    }

    fn write(&self, project: &ProjectId) -> Result<(), ProjectError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        // Write a sibling then rename so readers never see a half-written line.
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "marker".to_string());
        let tmp = self
            .path
            .with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()));
        fs::write(&tmp, format!("{}\n", project))?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn location(&self) -> PathBuf {
        self.path.clone()
    }
}
