//! Dataset configuration and gallery planning.
//!
//! A gallery spans several datasets, each one a project whose `edited/`
//! directory holds canonical rasters. The dataset list is a JSON array in
//! display order:
//!
//! ```json
//! [
//!   {"id": "2025_annual", "label": "2025 Annual"},
//!   {"id": "2025_pbl", "label": "2025 PBL"}
//! ]
//! ```
//!
//! [`aggregate`] turns that list into a [`GalleryPlan`]: datasets in config
//! order, sites alphabetical, transects in natural order. Datasets whose
//! `edited/` directory is missing or empty are recorded as skipped and the
//! rest of the plan is still built. Nothing on disk is modified.

use crate::naming::{CanonicalName, SiteCode, TransectId};
use crate::project::{Category, ProjectContext, is_single_component};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum AggregateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Dataset config not found: {0}")]
    DatasetsMissing(PathBuf),
    #[error("Invalid dataset config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Invalid dataset entry {index}: {reason}")]
    InvalidDataset { index: usize, reason: String },
}

/// One entry of the dataset list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Dataset {
    /// Project directory name under the data root.
    pub id: String,
    /// Display label.
    pub label: String,
}

/// Read and validate the dataset list at `path`.
pub fn load_datasets(path: &Path) -> Result<Vec<Dataset>, AggregateError> {
    if !path.is_file() {
        return Err(AggregateError::DatasetsMissing(path.to_path_buf()));
    }
    let content = fs::read_to_string(path)?;
    let datasets: Vec<Dataset> =
        serde_json::from_str(&content).map_err(|source| AggregateError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    validate_datasets(&datasets)?;
    Ok(datasets)
}

/// Ids must be unique single path components; labels must not be blank.
pub fn validate_datasets(datasets: &[Dataset]) -> Result<(), AggregateError> {
    let mut seen = HashSet::new();
    for (index, dataset) in datasets.iter().enumerate() {
        let invalid = |reason: String| AggregateError::InvalidDataset { index, reason };
        if !is_single_component(&dataset.id) {
            return Err(invalid(format!(
                "id {:?} must be a single directory name",
                dataset.id
            )));
        }
        if dataset.label.trim().is_empty() {
            return Err(invalid(format!("label for {:?} is empty", dataset.id)));
        }
        if !seen.insert(dataset.id.as_str()) {
            return Err(invalid(format!("duplicate id {:?}", dataset.id)));
        }
    }
    Ok(())
}

/// Canonical files in `dir`, grouped by site and sorted naturally by transect.
pub fn discover_canonical(
    dir: &Path,
    extension: &str,
) -> Result<BTreeMap<SiteCode, Vec<(TransectId, PathBuf)>>, AggregateError> {
    let mut sites: BTreeMap<SiteCode, Vec<(TransectId, PathBuf)>> = BTreeMap::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy();
        let Some(name) = CanonicalName::parse(&file_name, extension) else {
            continue;
        };
        sites
            .entry(name.site)
            .or_default()
            .push((name.transect, entry.path().to_path_buf()));
    }
    for transects in sites.values_mut() {
        transects.sort_by(|a, b| a.0.cmp(&b.0));
    }
    Ok(sites)
}

/// One canonical raster scheduled for conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAsset {
    pub transect: TransectId,
    pub source: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitePlan {
    pub site: SiteCode,
    pub assets: Vec<PlannedAsset>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetPlan {
    pub dataset: Dataset,
    pub sites: Vec<SitePlan>,
}

impl DatasetPlan {
    pub fn image_count(&self) -> usize {
        self.sites.iter().map(|s| s.assets.len()).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipCause {
    MissingDirectory,
    NoMatchingFiles,
}

impl fmt::Display for SkipCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipCause::MissingDirectory => f.write_str("edited directory not found"),
            SkipCause::NoMatchingFiles => f.write_str("no canonical files"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDataset {
    pub dataset: Dataset,
    pub dir: PathBuf,
    pub cause: SkipCause,
}

/// Ordered work list for the gallery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GalleryPlan {
    pub datasets: Vec<DatasetPlan>,
    pub skipped: Vec<SkippedDataset>,
}

impl GalleryPlan {
    pub fn image_count(&self) -> usize {
        self.datasets.iter().map(DatasetPlan::image_count).sum()
    }
}

/// Group canonical files of a single directory into site plans.
pub fn plan_sites(dir: &Path, extension: &str) -> Result<Vec<SitePlan>, AggregateError> {
    Ok(discover_canonical(dir, extension)?
        .into_iter()
        .map(|(site, transects)| SitePlan {
            site,
            assets: transects
                .into_iter()
                .map(|(transect, source)| PlannedAsset { transect, source })
                .collect(),
        })
        .collect())
}

/// Build the gallery plan for `datasets` under `data_root`.
pub fn aggregate(
    datasets: &[Dataset],
    data_root: &Path,
    extension: &str,
) -> Result<GalleryPlan, AggregateError> {
    let mut plan = GalleryPlan::default();
    for dataset in datasets {
        let dir = data_root
            .join(&dataset.id)
            .join(Category::Edited.dir_name());
        let cause = if !dir.is_dir() {
            Some(SkipCause::MissingDirectory)
        } else {
            let sites = plan_sites(&dir, extension)?;
            if sites.is_empty() {
                Some(SkipCause::NoMatchingFiles)
            } else {
                debug!(dataset = %dataset.id, sites = sites.len(), "dataset planned");
                plan.datasets.push(DatasetPlan {
                    dataset: dataset.clone(),
                    sites,
                });
                None
            }
        };
        if let Some(cause) = cause {
            warn!(dataset = %dataset.id, dir = %dir.display(), "skipping dataset: {cause}");
            plan.skipped.push(SkippedDataset {
                dataset: dataset.clone(),
                dir,
                cause,
            });
        }
    }
    Ok(plan)
}

/// Canonical files present in one category directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryStatus {
    pub category: Category,
    pub dir: PathBuf,
    /// `false` when the directory does not exist yet.
    pub exists: bool,
    pub sites: usize,
    pub files: usize,
}

/// Counts per category for one project.
pub fn project_status(
    ctx: &ProjectContext,
    extension: &str,
) -> Result<Vec<CategoryStatus>, AggregateError> {
    [Category::Originals, Category::Edited]
        .into_iter()
        .map(|category| {
            let dir = ctx.category_dir(category);
            if !dir.is_dir() {
                return Ok(CategoryStatus {
                    category,
                    dir,
                    exists: false,
                    sites: 0,
                    files: 0,
                });
            }
            let sites = discover_canonical(&dir, extension)?;
            Ok(CategoryStatus {
                category,
                exists: true,
                sites: sites.len(),
                files: sites.values().map(Vec::len).sum(),
                dir,
            })
        })
        .collect()
}
