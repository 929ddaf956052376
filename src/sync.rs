//! Idempotent batch import into a project category.
//!
//! Merges a batch of source rasters into `originals/` or `edited/` under
//! their canonical names. Re-running with the same inputs copies nothing,
//! so batches can be added to a project over time and interrupted runs are
//! resumed simply by running again.
//!
//! ## Discovery
//!
//! ```text
//! originals batch                              edited batch
//! source/                                      source/
//! ├── TCRMP20251010_3D_BWR_T1_Proxy/           ├── BWR_T1_full.tif
//! │   └── TCRMP20251010_3D_BWR_T1_Proxy_full.tif   ├── BWR_T2_full.tif
//! └── TCRMP20251010_3D_BWR_T2_Proxy/           └── notes.txt        (ignored)
//!     └── TCRMP20251010_3D_BWR_T2_Proxy_full.tif
//! ```
//!
//! ## Copy Policy
//!
//! | Destination | `--force` | Action |
//! |---|---|---|
//! | missing | any | copy |
//! | exists | off | skip |
//! | exists | on | copy only if source mtime > destination mtime |
//!
//! Equal timestamps skip. Copies keep the source modification time and
//! permissions, so a copied file never looks newer than its source.
//!
//! ## Crash Safety
//!
//! Each copy is written to a hidden `.NAME.PID.partial` sibling and renamed
//! into place. A canonical file is therefore either absent, the previous
//! version, or the complete new version. Partial files never match the
//! canonical pattern, so discovery ignores leftovers from a killed run.
//!
//! ## Parallelism
//!
//! Assets are copied on the rayon pool. Assets that map to the same
//! destination are grouped and handled one after another in discovery
//! order, so no two copies ever target the same path at once.

use crate::naming::{CanonicalName, parse_source_dir_name};
use crate::project::{Category, MarkerStore, ProjectContext, ProjectError};
use filetime::FileTime;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error(transparent)]
    Project(#[from] ProjectError),
    #[error("Source directory not found: {0}")]
    SourceMissing(PathBuf),
    #[error("No files matching {pattern} found in {dir}")]
    NoMatchingFiles { dir: PathBuf, pattern: String },
    #[error("{failed} of {total} files could not be copied")]
    AssetsFailed { failed: usize, total: usize },
}

/// One raster found in a source batch, already mapped to its canonical name.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceAsset {
    pub source_path: PathBuf,
    pub name: CanonicalName,
    pub modified: SystemTime,
    pub size: u64,
}

impl SourceAsset {
    fn from_path(source_path: PathBuf, name: CanonicalName) -> io::Result<Self> {
        let meta = fs::metadata(&source_path)?;
        Ok(Self {
            source_path,
            name,
            modified: meta.modified()?,
            size: meta.len(),
        })
    }
}

/// Immediate children of `dir`, sorted by file name.
fn sorted_children(dir: &Path) -> impl Iterator<Item = Result<walkdir::DirEntry, walkdir::Error>> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
}

/// Find `<dir>/<dir>_full.<ext>` rasters in a photogrammetry output folder.
///
/// Subdirectories without the raster, or whose name lacks the `_3D_SITE_`
/// marker, are skipped silently.
pub fn discover_originals(source: &Path, extension: &str) -> Result<Vec<SourceAsset>, SyncError> {
    let mut assets = Vec::new();
    for entry in sorted_children(source) {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let dir_name = entry.file_name().to_string_lossy();
        let raster = entry.path().join(format!("{dir_name}_full.{extension}"));
        if !raster.is_file() {
            continue;
        }
        let Some(parsed) = parse_source_dir_name(&dir_name) else {
            debug!(dir = %dir_name, "no site code in directory name, skipping");
            continue;
        };
        let name = CanonicalName::new(parsed.site, parsed.transect, extension);
        assets.push(SourceAsset::from_path(raster, name)?);
    }
    Ok(assets)
}

/// Find files already named `{SITE}_{TRANSECT}_full.<ext>` directly in `source`.
pub fn discover_edited(source: &Path, extension: &str) -> Result<Vec<SourceAsset>, SyncError> {
    let mut assets = Vec::new();
    for entry in sorted_children(source) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy();
        if let Some(name) = CanonicalName::parse(&file_name, extension) {
            assets.push(SourceAsset::from_path(entry.path().to_path_buf(), name)?);
        }
    }
    Ok(assets)
}

/// Overwrite policy for existing destinations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncPolicy {
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Destination exists and force is off.
    Exists,
    /// Force is on but the source is not strictly newer.
    NotNewer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    Copy,
    Skip(SkipReason),
}

/// Decide what to do for one asset given the destination's mtime, if any.
pub fn decide(
    source_modified: SystemTime,
    dest_modified: Option<SystemTime>,
    policy: SyncPolicy,
) -> SyncDecision {
    match dest_modified {
        None => SyncDecision::Copy,
        Some(_) if !policy.force => SyncDecision::Skip(SkipReason::Exists),
        Some(dest) if source_modified > dest => SyncDecision::Copy,
        Some(_) => SyncDecision::Skip(SkipReason::NotNewer),
    }
}

/// Progress events emitted while syncing, one per asset.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    Copied { name: String, bytes: u64 },
    Skipped { name: String, reason: SkipReason },
    Failed { name: String, error: String },
}

/// An asset that could not be copied.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncFailure {
    pub name: String,
    pub source: PathBuf,
    pub error: String,
}

/// Counts for one sync run.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub destination: PathBuf,
    pub copied: usize,
    pub skipped: usize,
    pub bytes_copied: u64,
    pub failed: Vec<SyncFailure>,
}

impl SyncReport {
    pub fn total(&self) -> usize {
        self.copied + self.skipped + self.failed.len()
    }

    /// Turn recorded per-asset failures into an error.
    pub fn ensure_complete(&self) -> Result<(), SyncError> {
        if self.failed.is_empty() {
            Ok(())
        } else {
            Err(SyncError::AssetsFailed {
                failed: self.failed.len(),
                total: self.total(),
            })
        }
    }
}

enum Outcome {
    Copied(u64),
    Skipped(SkipReason),
    Failed(String),
}

/// Merge `assets` into `dest` according to `policy`.
///
/// Creates `dest` if needed. Per-asset I/O failures are recorded in the
/// report rather than aborting the run; use [`SyncReport::ensure_complete`]
/// to turn them into an error.
pub fn sync(
    assets: &[SourceAsset],
    dest: &Path,
    policy: SyncPolicy,
    events: Option<&Sender<SyncEvent>>,
) -> Result<SyncReport, SyncError> {
    fs::create_dir_all(dest)?;

    let groups = group_by_destination(assets);
    let outcomes: Vec<(&SourceAsset, Outcome)> = groups
        .par_iter()
        .map(|group| {
            group
                .iter()
                .map(|asset| {
                    let outcome = sync_one(asset, dest, policy);
                    if let Some(tx) = events {
                        let name = asset.name.file_name();
                        let event = match &outcome {
                            Outcome::Copied(bytes) => SyncEvent::Copied {
                                name,
                                bytes: *bytes,
                            },
                            Outcome::Skipped(reason) => SyncEvent::Skipped {
                                name,
                                reason: *reason,
                            },
                            Outcome::Failed(error) => SyncEvent::Failed {
                                name,
                                error: error.clone(),
                            },
                        };
                        tx.send(event).ok();
                    }
                    (*asset, outcome)
                })
                .collect::<Vec<_>>()
        })
        .flatten()
        .collect();

    let mut report = SyncReport {
        destination: dest.to_path_buf(),
        ..Default::default()
    };
    for (asset, outcome) in outcomes {
        match outcome {
            Outcome::Copied(bytes) => {
                report.copied += 1;
                report.bytes_copied += bytes;
            }
            Outcome::Skipped(_) => report.skipped += 1,
            Outcome::Failed(error) => report.failed.push(SyncFailure {
                name: asset.name.file_name(),
                source: asset.source_path.clone(),
                error,
            }),
        }
    }
    info!(
        copied = report.copied,
        skipped = report.skipped,
        failed = report.failed.len(),
        "sync finished"
    );
    Ok(report)
}

/// Group assets by canonical file name, keeping first-seen order both
/// between and within groups.
fn group_by_destination(assets: &[SourceAsset]) -> Vec<Vec<&SourceAsset>> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Vec<&SourceAsset>> = Vec::new();
    for asset in assets {
        let key = asset.name.file_name();
        match index.get(&key) {
            Some(&i) => groups[i].push(asset),
            None => {
                index.insert(key, groups.len());
                groups.push(vec![asset]);
            }
        }
    }
    groups
}

fn sync_one(asset: &SourceAsset, dest_dir: &Path, policy: SyncPolicy) -> Outcome {
    let dest = dest_dir.join(asset.name.file_name());
    let dest_modified = match fs::metadata(&dest) {
        Ok(meta) => match meta.modified() {
            Ok(m) => Some(m),
            Err(e) => return Outcome::Failed(e.to_string()),
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Outcome::Failed(e.to_string()),
    };

    match decide(asset.modified, dest_modified, policy) {
        SyncDecision::Skip(reason) => {
            debug!(name = %asset.name, ?reason, "skipping");
            Outcome::Skipped(reason)
        }
        SyncDecision::Copy => {
            info!(
                name = %asset.name,
                size_mb = asset.size / (1024 * 1024),
                "copying"
            );
            match copy_preserving(&asset.source_path, &dest) {
                Ok(bytes) => Outcome::Copied(bytes),
                Err(e) => Outcome::Failed(e.to_string()),
            }
        }
    }
}

/// Copy `src` to `dest` through a temporary sibling, keeping permissions
/// and access/modification times. Returns the number of bytes copied.
pub fn copy_preserving(src: &Path, dest: &Path) -> io::Result<u64> {
    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "destination has no file name"))?;
    let partial = dest.with_file_name(format!(".{}.{}.partial", file_name, std::process::id()));

    let result = (|| -> io::Result<u64> {
        let meta = fs::metadata(src)?;
        // fs::copy carries the permission bits over.
        let bytes = fs::copy(src, &partial)?;
        filetime::set_file_times(
            &partial,
            FileTime::from_last_access_time(&meta),
            FileTime::from_last_modification_time(&meta),
        )?;
        fs::rename(&partial, dest)?;
        Ok(bytes)
    })();

    if result.is_err() {
        fs::remove_file(&partial).ok();
    }
    result
}

/// What to import and where.
#[derive(Debug, Clone)]
pub struct ImportRequest<'a> {
    pub category: Category,
    pub source: &'a Path,
    /// Replaces the project's category directory as destination.
    pub dest_override: Option<&'a Path>,
    pub policy: SyncPolicy,
    pub extension: &'a str,
}

impl ImportRequest<'_> {
    fn pattern(&self) -> String {
        match self.category {
            Category::Originals => format!("*/<dir>_full.{}", self.extension),
            Category::Edited => format!("SITE_TRANSECT_full.{}", self.extension),
        }
    }
}

/// Import one batch into the project described by `ctx`.
///
/// Nothing is written when the source directory is missing or holds no
/// matching files. When `marker` is given, the project is recorded as the
/// current project once the batch is known to be valid.
pub fn import_batch(
    ctx: &ProjectContext,
    request: &ImportRequest<'_>,
    marker: Option<&dyn MarkerStore>,
    events: Option<&Sender<SyncEvent>>,
) -> Result<SyncReport, SyncError> {
    if !request.source.is_dir() {
        return Err(SyncError::SourceMissing(request.source.to_path_buf()));
    }

    let assets = match request.category {
        Category::Originals => discover_originals(request.source, request.extension)?,
        Category::Edited => discover_edited(request.source, request.extension)?,
    };
    if assets.is_empty() {
        return Err(SyncError::NoMatchingFiles {
            dir: request.source.to_path_buf(),
            pattern: request.pattern(),
        });
    }
    info!(
        count = assets.len(),
        category = %request.category,
        source = %request.source.display(),
        "discovered source files"
    );

    if let Some(marker) = marker {
        marker.write(&ctx.project)?;
    }

    let dest = request
        .dest_override
        .map(Path::to_path_buf)
        .unwrap_or_else(|| ctx.category_dir(request.category));
    sync(&assets, &dest, request.policy, events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::tests::MemoryMarker;
    use crate::project::{FileMarker, ProjectId};
    use crate::test_helpers::*;
    use std::time::Duration;
    use tempfile::TempDir;

    const DIRS: &[&str] = &["X20250101_3D_ABC_T1_Proxy", "X20250101_3D_ABC_T2_2_Proxy"];

    fn ctx(root: &Path, project: &str) -> ProjectContext {
        ProjectContext::new(root.join("data"), ProjectId::new(project).unwrap())
    }

    fn originals_request(source: &Path, force: bool) -> ImportRequest<'_> {
        ImportRequest {
            category: Category::Originals,
            source,
            dest_override: None,
            policy: SyncPolicy { force },
            extension: "tif",
        }
    }

    // =========================================================================
    // decide
    // =========================================================================

    #[test]
    fn decide_copies_missing_destination() {
        let t = SystemTime::UNIX_EPOCH;
        assert_eq!(decide(t, None, SyncPolicy::default()), SyncDecision::Copy);
        assert_eq!(decide(t, None, SyncPolicy { force: true }), SyncDecision::Copy);
    }

    #[test]
    fn decide_skips_existing_without_force() {
        let old = SystemTime::UNIX_EPOCH;
        let new = old + Duration::from_secs(10);
        assert_eq!(
            decide(new, Some(old), SyncPolicy::default()),
            SyncDecision::Skip(SkipReason::Exists)
        );
    }

    #[test]
    fn decide_force_requires_strictly_newer_source() {
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        let force = SyncPolicy { force: true };
        assert_eq!(
            decide(t, Some(t), force),
            SyncDecision::Skip(SkipReason::NotNewer)
        );
        assert_eq!(
            decide(t, Some(t + Duration::from_secs(1)), force),
            SyncDecision::Skip(SkipReason::NotNewer)
        );
        assert_eq!(
            decide(t + Duration::from_nanos(1), Some(t), force),
            SyncDecision::Copy
        );
    }

    // =========================================================================
    // Discovery
    // =========================================================================

    #[test]
    fn discover_originals_maps_to_canonical_names() {
        let tmp = TempDir::new().unwrap();
        make_source_batch(tmp.path(), DIRS, "tif");
        let assets = discover_originals(tmp.path(), "tif").unwrap();
        let names: Vec<String> = assets.iter().map(|a| a.name.file_name()).collect();
        assert_eq!(names, vec!["ABC_T1_full.tif", "ABC_T2_2_full.tif"]);
        assert_eq!(assets[0].size, DIRS[0].len() as u64);
    }

    #[test]
    fn discover_originals_skips_unmatched_directories() {
        let tmp = TempDir::new().unwrap();
        make_source_batch(tmp.path(), &["X20250101_3D_ABC_T1_Proxy", "random_dir"], "tif");
        // Directory with the marker but no raster inside
        fs::create_dir_all(tmp.path().join("X20250101_3D_DEF_T1_Proxy")).unwrap();
        // Raster named after a different directory
        write_file(
            &tmp.path().join("X20250101_3D_GHI_T1_Proxy/other_full.tif"),
            b"x",
        );
        // Loose file at the top level
        write_file(&tmp.path().join("readme.txt"), b"x");

        let assets = discover_originals(tmp.path(), "tif").unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].name.file_name(), "ABC_T1_full.tif");
    }

    #[test]
    fn discover_edited_filters_by_canonical_pattern() {
        let tmp = TempDir::new().unwrap();
        make_flat_files(
            tmp.path(),
            &[
                "ABC_T2_full.tif",
                "ABC_T1_full.tif",
                "abc_T3_full.tif",
                "ABC_T4.tif",
                "notes.txt",
                ".ABC_T5_full.tif.123.partial",
            ],
        );
        fs::create_dir_all(tmp.path().join("DEF_T1_full.tif")).unwrap();

        let assets = discover_edited(tmp.path(), "tif").unwrap();
        let names: Vec<String> = assets.iter().map(|a| a.name.file_name()).collect();
        assert_eq!(names, vec!["ABC_T1_full.tif", "ABC_T2_full.tif"]);
    }

    // =========================================================================
    // sync
    // =========================================================================

    #[test]
    fn sync_copies_then_skips_on_rerun() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("src");
        make_flat_files(&source, &["ABC_T1_full.tif", "ABC_T2_full.tif"]);
        let dest = tmp.path().join("dest");
        let assets = discover_edited(&source, "tif").unwrap();

        let first = sync(&assets, &dest, SyncPolicy::default(), None).unwrap();
        assert_eq!((first.copied, first.skipped), (2, 0));
        assert_eq!(first.bytes_copied, 30);

        let before: Vec<(String, Vec<u8>, i64)> = file_names(&dest)
            .into_iter()
            .map(|n| {
                let p = dest.join(&n);
                (n, fs::read(&p).unwrap(), mtime(&p))
            })
            .collect();

        let second = sync(&assets, &dest, SyncPolicy::default(), None).unwrap();
        assert_eq!((second.copied, second.skipped), (0, 2));

        let after: Vec<(String, Vec<u8>, i64)> = file_names(&dest)
            .into_iter()
            .map(|n| {
                let p = dest.join(&n);
                (n, fs::read(&p).unwrap(), mtime(&p))
            })
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn sync_preserves_modification_time() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("src");
        let files = make_flat_files(&source, &["ABC_T1_full.tif"]);
        set_mtime(&files[0], 1_700_000_000);
        let dest = tmp.path().join("dest");

        let assets = discover_edited(&source, "tif").unwrap();
        sync(&assets, &dest, SyncPolicy::default(), None).unwrap();

        assert_eq!(mtime(&dest.join("ABC_T1_full.tif")), 1_700_000_000);
    }

    #[cfg(unix)]
    #[test]
    fn sync_preserves_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("src");
        let files = make_flat_files(&source, &["ABC_T1_full.tif"]);
        fs::set_permissions(&files[0], fs::Permissions::from_mode(0o640)).unwrap();
        let dest = tmp.path().join("dest");

        let assets = discover_edited(&source, "tif").unwrap();
        sync(&assets, &dest, SyncPolicy::default(), None).unwrap();

        let mode = fs::metadata(dest.join("ABC_T1_full.tif"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o640);
    }

    #[test]
    fn sync_force_overwrites_only_strictly_newer() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("src");
        let files = make_flat_files(
            &source,
            &["ABC_T1_full.tif", "ABC_T2_full.tif", "ABC_T3_full.tif"],
        );
        let dest = tmp.path().join("dest");
        let existing = make_flat_files(
            &dest,
            &["ABC_T1_full.tif", "ABC_T2_full.tif", "ABC_T3_full.tif"],
        );
        for path in &existing {
            fs::write(path, b"old").unwrap();
            set_mtime(path, 1_000);
        }
        set_mtime(&files[0], 2_000); // newer → copy
        set_mtime(&files[1], 1_000); // equal → skip
        set_mtime(&files[2], 500); // older → skip

        let assets = discover_edited(&source, "tif").unwrap();
        let report = sync(&assets, &dest, SyncPolicy { force: true }, None).unwrap();

        assert_eq!((report.copied, report.skipped), (1, 2));
        assert_eq!(fs::read(dest.join("ABC_T1_full.tif")).unwrap(), b"ABC_T1_full.tif");
        assert_eq!(fs::read(dest.join("ABC_T2_full.tif")).unwrap(), b"old");
        assert_eq!(fs::read(dest.join("ABC_T3_full.tif")).unwrap(), b"old");
        assert_eq!(mtime(&dest.join("ABC_T1_full.tif")), 2_000);
    }

    #[test]
    fn sync_without_force_never_overwrites() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("src");
        let files = make_flat_files(&source, &["ABC_T1_full.tif"]);
        set_mtime(&files[0], 9_000);
        let dest = tmp.path().join("dest");
        let existing = make_flat_files(&dest, &["ABC_T1_full.tif"]);
        fs::write(&existing[0], b"keep").unwrap();
        set_mtime(&existing[0], 1_000);

        let assets = discover_edited(&source, "tif").unwrap();
        let report = sync(&assets, &dest, SyncPolicy::default(), None).unwrap();

        assert_eq!((report.copied, report.skipped), (0, 1));
        assert_eq!(fs::read(&existing[0]).unwrap(), b"keep");
    }

    #[test]
    fn sync_serializes_assets_sharing_a_destination() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("src");
        make_source_batch(
            &source,
            &["A20250101_3D_ABC_T1_Proxy", "B20250101_3D_ABC_T1_Proxy"],
            "tif",
        );
        let dest = tmp.path().join("dest");

        let assets = discover_originals(&source, "tif").unwrap();
        assert_eq!(assets.len(), 2);
        let report = sync(&assets, &dest, SyncPolicy::default(), None).unwrap();

        // First in discovery order wins, the second finds it present
        assert_eq!((report.copied, report.skipped), (1, 1));
        assert_eq!(
            fs::read(dest.join("ABC_T1_full.tif")).unwrap(),
            b"A20250101_3D_ABC_T1_Proxy"
        );
        assert_eq!(file_names(&dest), vec!["ABC_T1_full.tif"]);
    }

    #[test]
    fn sync_records_failures_and_continues() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("src");
        let files = make_flat_files(&source, &["ABC_T1_full.tif", "ABC_T2_full.tif"]);
        let dest = tmp.path().join("dest");

        let assets = discover_edited(&source, "tif").unwrap();
        // Source disappears between discovery and copy
        fs::remove_file(&files[0]).unwrap();
        let report = sync(&assets, &dest, SyncPolicy::default(), None).unwrap();

        assert_eq!(report.copied, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].name, "ABC_T1_full.tif");
        assert!(matches!(
            report.ensure_complete(),
            Err(SyncError::AssetsFailed { failed: 1, total: 2 })
        ));
        // No partial file left behind
        assert_eq!(file_names(&dest), vec!["ABC_T2_full.tif"]);
    }

    #[test]
    fn sync_emits_one_event_per_asset() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("src");
        make_flat_files(&source, &["ABC_T1_full.tif", "ABC_T2_full.tif"]);
        let dest = tmp.path().join("dest");
        make_flat_files(&dest, &["ABC_T2_full.tif"]);

        let assets = discover_edited(&source, "tif").unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        sync(&assets, &dest, SyncPolicy::default(), Some(&tx)).unwrap();
        drop(tx);

        let mut events: Vec<SyncEvent> = rx.into_iter().collect();
        events.sort_by_key(|e| match e {
            SyncEvent::Copied { name, .. }
            | SyncEvent::Skipped { name, .. }
            | SyncEvent::Failed { name, .. } => name.clone(),
        });
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], SyncEvent::Copied { name, .. } if name == "ABC_T1_full.tif"));
        assert!(matches!(
            &events[1],
            SyncEvent::Skipped { reason: SkipReason::Exists, .. }
        ));
    }

    #[test]
    fn copy_preserving_replaces_existing_file() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a");
        let dest = tmp.path().join("b");
        fs::write(&src, b"new").unwrap();
        fs::write(&dest, b"old contents").unwrap();

        assert_eq!(copy_preserving(&src, &dest).unwrap(), 3);
        assert_eq!(fs::read(&dest).unwrap(), b"new");
        assert_eq!(file_names(tmp.path()), vec!["a", "b"]);
    }

    // =========================================================================
    // import_batch
    // =========================================================================

    #[test]
    fn import_originals_end_to_end() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("batch");
        make_source_batch(&source, DIRS, "tif");
        let marker = FileMarker::new(tmp.path().join(".current_project"));
        let ctx = ctx(tmp.path(), "p1");

        let report =
            import_batch(&ctx, &originals_request(&source, false), Some(&marker), None).unwrap();

        assert_eq!((report.copied, report.skipped), (2, 0));
        let originals = tmp.path().join("data/p1/originals");
        assert_eq!(
            file_names(&originals),
            vec!["ABC_T1_full.tif", "ABC_T2_2_full.tif"]
        );
        assert_eq!(
            fs::read_to_string(tmp.path().join(".current_project")).unwrap().trim(),
            "p1"
        );
    }

    #[test]
    fn import_originals_rerun_skips_everything() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("batch");
        make_source_batch(&source, DIRS, "tif");
        let marker = MemoryMarker::default();
        let ctx = ctx(tmp.path(), "p1");
        let request = originals_request(&source, false);

        import_batch(&ctx, &request, Some(&marker), None).unwrap();
        let report = import_batch(&ctx, &request, Some(&marker), None).unwrap();

        assert_eq!((report.copied, report.skipped), (0, 2));
    }

    #[test]
    fn import_missing_source_mutates_nothing() {
        let tmp = TempDir::new().unwrap();
        let marker = FileMarker::new(tmp.path().join(".current_project"));
        let ctx = ctx(tmp.path(), "p1");
        let missing = tmp.path().join("nope");

        let err = import_batch(&ctx, &originals_request(&missing, false), Some(&marker), None)
            .unwrap_err();

        assert!(matches!(err, SyncError::SourceMissing(_)));
        assert!(!tmp.path().join(".current_project").exists());
        assert!(!tmp.path().join("data").exists());
    }

    #[test]
    fn import_without_matching_files_mutates_nothing() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("batch");
        make_flat_files(&source, &["notes.txt"]);
        let marker = FileMarker::new(tmp.path().join(".current_project"));
        let ctx = ctx(tmp.path(), "p1");

        let err = import_batch(&ctx, &originals_request(&source, false), Some(&marker), None)
            .unwrap_err();

        assert!(matches!(err, SyncError::NoMatchingFiles { .. }));
        assert!(!tmp.path().join(".current_project").exists());
        assert!(!tmp.path().join("data").exists());
    }

    #[test]
    fn import_edited_respects_dest_override_and_leaves_marker() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("exports");
        make_flat_files(&source, &["ABC_T1_full.tif", "IMG_0001.tif"]);
        let custom = tmp.path().join("custom");
        let marker = MemoryMarker::default();
        let ctx = ctx(tmp.path(), "p1");
        let request = ImportRequest {
            category: Category::Edited,
            source: &source,
            dest_override: Some(&custom),
            policy: SyncPolicy::default(),
            extension: "tif",
        };

        // Edited imports do not designate a project
        let report = import_batch(&ctx, &request, None, None).unwrap();

        assert_eq!(report.copied, 1);
        assert_eq!(report.destination, custom);
        assert_eq!(file_names(&custom), vec!["ABC_T1_full.tif"]);
        assert!(!tmp.path().join("data").exists());
        assert!(marker.read().unwrap().is_none());
    }
}
