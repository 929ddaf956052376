//! CLI output formatting for all commands.
//!
//! Diagnostics go through `tracing` on stderr. What the user asked for
//! (what was copied, what the artifact contains, where it was written) is
//! printed here, on stdout.
//!
//! # Output Format
//!
//! ## Import
//!
//! ```text
//!     ABC_T1_full.tif: copied (812.4 MB)
//!     ABC_T2_full.tif: already present
//!
//! Done! 1 copied, 1 already present.
//! Project: 2025_annual → data/2025_annual/originals
//! ```
//!
//! `import-edited` adds the dataset entry to paste into `datasets.json`.
//!
//! ## Deck
//!
//! ```text
//! Found 2 sites, 4 images in data/2025_annual/edited
//!     ABC: T1, T2, T3
//!     DEF: T1
//!     converted ABC_T1.jpg (4000×1000)
//! Slide 1: ABC (T1, T2, T3)
//! Slide 2: DEF (T1)
//! Saved: output/TCRMP_2025_annual.html
//! ```
//!
//! ## Gallery
//!
//! ```text
//! 2024 Annual (2024_annual): 12 sites, 31 images
//! Skipped 2024_pbl: edited directory not found (data/2024_pbl/edited)
//!     converted 2024_annual_ABC_T1.jpg (4000×1000)
//! Gallery: 1 dataset, 31 images → gallery/index.html
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::aggregate::{CategoryStatus, Dataset, GalleryPlan, SitePlan};
use crate::convert::{ConversionReport, ConvertEvent};
use crate::deck::{DeckLayout, DeckPaths};
use crate::naming::suggested_label;
use crate::project::{Category, ProjectId};
use crate::sync::{SkipReason, SyncEvent, SyncReport};
use crate::types::DatasetGallery;
use std::path::Path;

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

/// Bytes as megabytes with one decimal.
fn megabytes(bytes: u64) -> String {
    format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
}

fn plural(n: usize, one: &str, many: &str) -> String {
    format!("{} {}", n, if n == 1 { one } else { many })
}

// ============================================================================
// Import
// ============================================================================

/// Format one per-asset sync event.
pub fn format_sync_event(event: &SyncEvent) -> Vec<String> {
    let line = match event {
        SyncEvent::Copied { name, bytes } => {
            format!("    {}: copied ({})", name, megabytes(*bytes))
        }
        SyncEvent::Skipped { name, reason } => {
            let why = match reason {
                SkipReason::Exists => "already present",
                SkipReason::NotNewer => "not newer, kept",
            };
            format!("    {}: {}", name, why)
        }
        SyncEvent::Failed { name, error } => format!("    {}: FAILED: {}", name, error),
    };
    vec![line]
}

/// Format the end-of-import summary.
///
/// For edited imports, also show the `datasets.json` entry that would add
/// the project to the gallery.
pub fn format_import_summary(
    project: &ProjectId,
    category: Category,
    report: &SyncReport,
) -> Vec<String> {
    let mut lines = vec![String::new()];
    let mut summary = format!(
        "Done! {} copied, {} already present",
        report.copied, report.skipped
    );
    if !report.failed.is_empty() {
        summary.push_str(&format!(", {} failed", report.failed.len()));
    }
    summary.push('.');
    lines.push(summary);
    lines.push(format!(
        "Project: {}  \u{2192}  {}",
        project,
        report.destination.display()
    ));

    for failure in &report.failed {
        lines.push(format!(
            "    failed: {} ({}): {}",
            failure.name,
            failure.source.display(),
            failure.error
        ));
    }

    if category == Category::Edited {
        let entry = Dataset {
            id: project.to_string(),
            label: suggested_label(project.as_str()),
        };
        let json = serde_json::to_string(&entry).unwrap_or_default();
        lines.push(String::new());
        lines.push("To include this project in the gallery, add to datasets.json:".to_string());
        lines.push(format!("    {}", json));
    }
    lines
}

pub fn print_import_summary(project: &ProjectId, category: Category, report: &SyncReport) {
    print_lines(format_import_summary(project, category, report));
}

// ============================================================================
// Conversion (shared by deck and gallery)
// ============================================================================

pub fn format_convert_event(event: &ConvertEvent) -> Vec<String> {
    match event {
        ConvertEvent::Converted {
            file,
            width,
            height,
            ..
        } => vec![format!("    converted {} ({}\u{d7}{})", file, width, height)],
        ConvertEvent::Failed {
            dataset,
            file,
            error,
        } => vec![format!("    FAILED {} [{}]: {}", file, dataset, error)],
    }
}

/// Count line plus one line per skipped asset.
pub fn format_conversion_report(report: &ConversionReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Converted {}",
        plural(report.converted, "image", "images")
    )];
    if !report.failures.is_empty() {
        lines.push(format!(
            "Skipped {} after conversion errors:",
            plural(report.failures.len(), "image", "images")
        ));
        for failure in &report.failures {
            lines.push(format!(
                "    {} {} {} ({}): {}",
                failure.dataset,
                failure.site,
                failure.transect,
                failure.source.display(),
                failure.error
            ));
        }
    }
    lines
}

pub fn print_conversion_report(report: &ConversionReport) {
    print_lines(format_conversion_report(report));
}

// ============================================================================
// Deck
// ============================================================================

/// Sites and transects found for the deck, before conversion.
pub fn format_site_listing(sites: &[SitePlan], dir: &Path) -> Vec<String> {
    let total: usize = sites.iter().map(|s| s.assets.len()).sum();
    let mut lines = vec![format!(
        "Found {}, {} in {}",
        plural(sites.len(), "site", "sites"),
        plural(total, "image", "images"),
        dir.display()
    )];
    for site in sites {
        let transects: Vec<&str> = site.assets.iter().map(|a| a.transect.as_str()).collect();
        lines.push(format!("    {}: {}", site.site, transects.join(", ")));
    }
    lines
}

pub fn print_site_listing(sites: &[SitePlan], dir: &Path) {
    print_lines(format_site_listing(sites, dir));
}

pub fn format_deck_output(deck: &DeckLayout, paths: &DeckPaths) -> Vec<String> {
    let mut lines: Vec<String> = deck
        .slides
        .iter()
        .enumerate()
        .map(|(i, slide)| {
            let transects: Vec<&str> = slide
                .placements
                .iter()
                .map(|p| p.transect.as_str())
                .collect();
            format!("Slide {}: {} ({})", i + 1, slide.heading, transects.join(", "))
        })
        .collect();
    lines.push(format!("Saved: {}", paths.html.display()));
    lines.push(format!("Layout: {}", paths.layout_json.display()));
    lines
}

pub fn print_deck_output(deck: &DeckLayout, paths: &DeckPaths) {
    print_lines(format_deck_output(deck, paths));
}

// ============================================================================
// Gallery
// ============================================================================

/// What aggregation found: one line per dataset, then the skipped ones.
pub fn format_gallery_plan(plan: &GalleryPlan) -> Vec<String> {
    let mut lines: Vec<String> = plan
        .datasets
        .iter()
        .map(|d| {
            format!(
                "{} ({}): {}, {}",
                d.dataset.label,
                d.dataset.id,
                plural(d.sites.len(), "site", "sites"),
                plural(d.image_count(), "image", "images")
            )
        })
        .collect();
    for skipped in &plan.skipped {
        lines.push(format!(
            "Skipped {}: {} ({})",
            skipped.dataset.id,
            skipped.cause,
            skipped.dir.display()
        ));
    }
    lines
}

pub fn print_gallery_plan(plan: &GalleryPlan) {
    print_lines(format_gallery_plan(plan));
}

pub fn format_gallery_output(datasets: &[DatasetGallery], index: &Path) -> Vec<String> {
    let images: usize = datasets.iter().map(|d| d.images().count()).sum();
    vec![format!(
        "Gallery: {}, {} \u{2192} {}",
        plural(datasets.len(), "dataset", "datasets"),
        plural(images, "image", "images"),
        index.display()
    )]
}

pub fn print_gallery_output(datasets: &[DatasetGallery], index: &Path) {
    print_lines(format_gallery_output(datasets, index));
}

// ============================================================================
// Status
// ============================================================================

pub fn format_status(project: &ProjectId, categories: &[CategoryStatus]) -> Vec<String> {
    let mut lines = vec![format!("Project: {}", project)];
    for status in categories {
        let detail = if status.exists {
            format!(
                "{}, {}",
                plural(status.files, "file", "files"),
                plural(status.sites, "site", "sites")
            )
        } else {
            "not imported".to_string()
        };
        lines.push(format!(
            "    {}: {} ({})",
            status.category,
            detail,
            status.dir.display()
        ));
    }
    lines
}

pub fn print_status(project: &ProjectId, categories: &[CategoryStatus]) {
    print_lines(format_status(project, categories));
}
