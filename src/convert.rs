//! Derivative production.
//!
//! Turns planned canonical rasters into web-ready derivatives through a
//! [`Codec`] and builds the render model from the results.
//!
//! ## Output Names
//!
//! ```text
//! gallery   <output>/images/{dataset}_{SITE}_{TRANSECT}.webp
//! deck      <deck>_images/{SITE}_{TRANSECT}.jpg
//! ```
//!
//! Derivatives are disposable and always overwritten.
//!
//! ## Parallel Processing
//!
//! Every asset of the plan is one job on the rayon pool. Results are put
//! back in plan order, so the model never depends on scheduling.
//!
//! ## Failure Policy
//!
//! | Policy | On a failed asset |
//! |---|---|
//! | `Abort` | unstarted jobs are cancelled; the run fails naming the first failed asset in plan order |
//! | `Skip` | the asset is left out, listed in the report and logged; sites and datasets left empty are dropped |

use crate::aggregate::{GalleryPlan, SitePlan};
use crate::codec::{Codec, CodecError, ConvertParams, Quality};
use crate::config::FailurePolicy;
use crate::naming::{SiteCode, TransectId};
use crate::types::{AggregatedImage, DatasetGallery, SiteImages};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Conversion failed for {dataset} {site} {transect} ({}): {source}", .path.display())]
    Asset {
        dataset: String,
        site: SiteCode,
        transect: TransectId,
        path: PathBuf,
        source: CodecError,
    },
}

/// `{dataset}_{SITE}_{TRANSECT}.<ext>`
pub fn gallery_file_name(
    dataset: &str,
    site: &SiteCode,
    transect: &TransectId,
    ext: &str,
) -> String {
    format!("{dataset}_{site}_{transect}.{ext}")
}

/// `{SITE}_{TRANSECT}.<ext>`
pub fn deck_file_name(site: &SiteCode, transect: &TransectId, ext: &str) -> String {
    format!("{site}_{transect}.{ext}")
}

/// Where and how derivatives are written.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub output_dir: PathBuf,
    pub derivative_ext: String,
    pub quality: Quality,
    pub policy: FailurePolicy,
}

/// Progress events, one per finished asset.
#[derive(Debug, Clone)]
pub enum ConvertEvent {
    Converted {
        dataset: String,
        file: String,
        width: u32,
        height: u32,
    },
    Failed {
        dataset: String,
        file: String,
        error: String,
    },
}

/// An asset left out under [`FailurePolicy::Skip`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionFailure {
    pub dataset: String,
    pub site: SiteCode,
    pub transect: TransectId,
    pub source: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionReport {
    pub converted: usize,
    pub failures: Vec<ConversionFailure>,
}

/// Gallery model plus what happened while building it.
#[derive(Debug, Clone, PartialEq)]
pub struct GalleryConversion {
    pub datasets: Vec<DatasetGallery>,
    pub report: ConversionReport,
}

/// Deck model plus what happened while building it.
#[derive(Debug, Clone, PartialEq)]
pub struct DeckConversion {
    pub sites: Vec<SiteImages>,
    pub report: ConversionReport,
}

struct Job<'a> {
    dataset: &'a str,
    site: &'a SiteCode,
    transect: &'a TransectId,
    source: &'a Path,
    file: String,
}

enum JobResult {
    Done(AggregatedImage),
    Failed(CodecError),
    Cancelled,
}

fn convert_one(
    codec: &dyn Codec,
    job: &Job<'_>,
    options: &ConvertOptions,
) -> Result<AggregatedImage, CodecError> {
    let dims = codec.probe(job.source)?;
    let aspect = dims.aspect()?;
    codec.convert(&ConvertParams {
        input: job.source.to_path_buf(),
        output: options.output_dir.join(&job.file),
        quality: options.quality,
    })?;
    Ok(AggregatedImage {
        transect: job.transect.clone(),
        file: job.file.clone(),
        width: dims.width,
        height: dims.height,
        aspect,
    })
}

/// Run all jobs on the pool; results come back in job order.
fn run_jobs(
    codec: &dyn Codec,
    jobs: &[Job<'_>],
    options: &ConvertOptions,
    events: Option<&Sender<ConvertEvent>>,
) -> Vec<JobResult> {
    let cancelled = AtomicBool::new(false);
    jobs.par_iter()
        .map(|job| {
            if cancelled.load(Ordering::Relaxed) {
                return JobResult::Cancelled;
            }
            match convert_one(codec, job, options) {
                Ok(image) => {
                    if let Some(tx) = events {
                        tx.send(ConvertEvent::Converted {
                            dataset: job.dataset.to_string(),
                            file: image.file.clone(),
                            width: image.width,
                            height: image.height,
                        })
                        .ok();
                    }
                    JobResult::Done(image)
                }
                Err(e) => {
                    error!(dataset = job.dataset, file = %job.file, "conversion failed: {e}");
                    if options.policy == FailurePolicy::Abort {
                        cancelled.store(true, Ordering::Relaxed);
                    }
                    if let Some(tx) = events {
                        tx.send(ConvertEvent::Failed {
                            dataset: job.dataset.to_string(),
                            file: job.file.clone(),
                            error: e.to_string(),
                        })
                        .ok();
                    }
                    JobResult::Failed(e)
                }
            }
        })
        .collect()
}

/// Fold job results back into per-site image lists.
///
/// `jobs` and `results` are in plan order, so sites come out in plan order
/// and sites without a single converted image are dropped.
fn assemble(
    jobs: &[Job<'_>],
    results: Vec<JobResult>,
    policy: FailurePolicy,
    report: &mut ConversionReport,
) -> Result<Vec<(String, Vec<SiteImages>)>, ConvertError> {
    let mut datasets: Vec<(String, Vec<SiteImages>)> = Vec::new();
    for (job, result) in jobs.iter().zip(results) {
        if datasets.last().is_none_or(|(id, _)| id != job.dataset) {
            datasets.push((job.dataset.to_string(), Vec::new()));
        }
        let image = match result {
            JobResult::Done(image) => image,
            JobResult::Cancelled => continue,
            JobResult::Failed(source) => {
                if policy == FailurePolicy::Abort {
                    return Err(ConvertError::Asset {
                        dataset: job.dataset.to_string(),
                        site: job.site.clone(),
                        transect: job.transect.clone(),
                        path: job.source.to_path_buf(),
                        source,
                    });
                }
                report.failures.push(ConversionFailure {
                    dataset: job.dataset.to_string(),
                    site: job.site.clone(),
                    transect: job.transect.clone(),
                    source: job.source.to_path_buf(),
                    error: source.to_string(),
                });
                continue;
            }
        };
        report.converted += 1;
        let Some((_, sites)) = datasets.last_mut() else {
            continue;
        };
        match sites.last_mut() {
            Some(last) if &last.site == job.site => last.images.push(image),
            _ => sites.push(SiteImages {
                site: job.site.clone(),
                images: vec![image],
            }),
        }
    }
    Ok(datasets)
}

fn site_jobs<'a>(
    dataset: &'a str,
    sites: &'a [SitePlan],
    file_name: impl Fn(&SiteCode, &TransectId) -> String + Copy + 'a,
) -> impl Iterator<Item = Job<'a>> {
    sites.iter().flat_map(move |site| {
        site.assets.iter().map(move |asset| Job {
            dataset,
            site: &site.site,
            transect: &asset.transect,
            source: &asset.source,
            file: file_name(&site.site, &asset.transect),
        })
    })
}

/// Convert every asset of the gallery plan into `options.output_dir`.
pub fn convert_gallery(
    codec: &dyn Codec,
    plan: &GalleryPlan,
    options: &ConvertOptions,
    events: Option<&Sender<ConvertEvent>>,
) -> Result<GalleryConversion, ConvertError> {
    fs::create_dir_all(&options.output_dir)?;
    let ext = options.derivative_ext.as_str();
    let jobs: Vec<Job<'_>> = plan
        .datasets
        .iter()
        .flat_map(|d| {
            let id = d.dataset.id.as_str();
            site_jobs(id, &d.sites, move |site, transect| {
                gallery_file_name(id, site, transect, ext)
            })
        })
        .collect();
    info!(assets = jobs.len(), dir = %options.output_dir.display(), "converting gallery images");

    let results = run_jobs(codec, &jobs, options, events);
    let mut report = ConversionReport::default();
    let assembled = assemble(&jobs, results, options.policy, &mut report)?;

    let datasets = plan
        .datasets
        .iter()
        .filter_map(|d| {
            let (_, sites) = assembled.iter().find(|(id, _)| *id == d.dataset.id)?;
            (!sites.is_empty()).then(|| DatasetGallery {
                id: d.dataset.id.clone(),
                label: d.dataset.label.clone(),
                sites: sites.clone(),
            })
        })
        .collect();
    Ok(GalleryConversion { datasets, report })
}

/// Convert one project's sites for the slide deck.
pub fn convert_deck(
    codec: &dyn Codec,
    project: &str,
    sites: &[SitePlan],
    options: &ConvertOptions,
    events: Option<&Sender<ConvertEvent>>,
) -> Result<DeckConversion, ConvertError> {
    fs::create_dir_all(&options.output_dir)?;
    let ext = options.derivative_ext.as_str();
    let jobs: Vec<Job<'_>> =
        site_jobs(project, sites, |site, transect| deck_file_name(site, transect, ext)).collect();
    info!(assets = jobs.len(), dir = %options.output_dir.display(), "converting deck images");

    let results = run_jobs(codec, &jobs, options, events);
    let mut report = ConversionReport::default();
    let sites = assemble(&jobs, results, options.policy, &mut report)?
        .into_iter()
        .flat_map(|(_, sites)| sites)
        .collect();
    Ok(DeckConversion { sites, report })
}
