//! Paginated slide deck.
//!
//! Lays a project's edited images out on widescreen slides, three per slide,
//! grouped by site. A site with more than three transects continues on the
//! next slide under the heading `SITE (continued)`.
//!
//! ## Slide Geometry (inches)
//!
//! ```text
//! ┌──────────────────────── 13.333 ────────────────────────┐
//! │                     SITE  (0.1, h 0.5)                 │
//! │  0.7 ─ label T1 (h 0.25)                               │
//! │        ┌──────────── image ≤ 12.5 wide ──────────┐     │
//! │        └──────────── h ≤ 6.5/3 − 0.3 ────────────┘     │  7.5
//! │        label T2 / image                                │
//! │        label T3 / image                                │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! Slot `i` starts at `0.7 + i × (row + 0.3)`. The label takes the first
//! 0.25 in of the slot and the image sits below it, centered horizontally.
//!
//! ## Output
//!
//! ```text
//! output/
//! ├── TCRMP_2025_annual.html               # print-ready deck
//! ├── TCRMP_2025_annual.layout.json        # every placement, in inches
//! └── TCRMP_2025_annual_images/            # JPEG derivatives
//!     ├── BWR_T1.jpg
//!     └── ...
//! ```
//!
//! The HTML uses `@page` sized to the slide, so printing to PDF gives one
//! slide per page. The layout file lets an external document builder place
//! the same images without redoing the arithmetic.

use crate::naming::SiteCode;
use crate::types::{AggregatedImage, SiteImages};
use maud::{DOCTYPE, Markup, PreEscaped, html};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeckError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Deck path has no file name: {0}")]
    InvalidPath(PathBuf),
}

pub const SLIDE_WIDTH: f64 = 13.333;
pub const SLIDE_HEIGHT: f64 = 7.5;
pub const IMAGES_PER_SLIDE: usize = 3;
pub const TOP_MARGIN: f64 = 0.7;
pub const AVAILABLE_HEIGHT: f64 = 6.5;
pub const SLOT_GAP: f64 = 0.3;
pub const LABEL_HEIGHT: f64 = 0.25;
pub const MAX_IMAGE_WIDTH: f64 = 12.5;

const HEADING: Rect = Rect {
    left: 0.5,
    top: 0.1,
    width: 12.0,
    height: 0.5,
};
const LABEL_LEFT: f64 = 0.5;
const LABEL_WIDTH: f64 = 12.0;

const CSS: &str = include_str!("../static/deck.css");

/// Height available to one image.
pub fn row_height() -> f64 {
    AVAILABLE_HEIGHT / IMAGES_PER_SLIDE as f64 - SLOT_GAP
}

/// Scale an image of `aspect` into a slot: full height unless that would
/// exceed `max_width`, in which case full width.
pub fn fit_image(aspect: f64, slot_height: f64, max_width: f64) -> (f64, f64) {
    let width = slot_height * aspect;
    if width > max_width {
        (max_width, max_width / aspect)
    } else {
        (width, slot_height)
    }
}

/// One slide's worth of images for a site.
#[derive(Debug, Clone, PartialEq)]
pub struct Slide<'a> {
    pub site: &'a SiteCode,
    pub continued: bool,
    pub images: &'a [AggregatedImage],
}

impl Slide<'_> {
    pub fn heading(&self) -> String {
        if self.continued {
            format!("{} (continued)", self.site)
        } else {
            self.site.to_string()
        }
    }
}

/// Split each site into slides of at most three images, keeping order.
pub fn paginate(sites: &[SiteImages]) -> Vec<Slide<'_>> {
    sites
        .iter()
        .flat_map(|site| {
            site.images
                .chunks(IMAGES_PER_SLIDE)
                .enumerate()
                .map(move |(i, images)| Slide {
                    site: &site.site,
                    continued: i > 0,
                    images,
                })
        })
        .collect()
}

/// Axis-aligned box in inches from the slide's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    fn style(&self) -> String {
        format!(
            "left:{:.3}in;top:{:.3}in;width:{:.3}in;height:{:.3}in",
            self.left, self.top, self.width, self.height
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Placement {
    pub transect: String,
    /// Path of the derivative relative to the deck file.
    pub src: String,
    pub label: Rect,
    pub image: Rect,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlideLayout {
    pub site: String,
    pub heading: String,
    pub heading_box: Rect,
    pub placements: Vec<Placement>,
}

/// The whole deck, positioned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeckLayout {
    pub title: String,
    pub slide_width: f64,
    pub slide_height: f64,
    pub slides: Vec<SlideLayout>,
}

impl DeckLayout {
    pub fn image_count(&self) -> usize {
        self.slides.iter().map(|s| s.placements.len()).sum()
    }
}

fn place(slot: usize, image: &AggregatedImage, image_dir: &str) -> Placement {
    let row = row_height();
    let slot_top = TOP_MARGIN + slot as f64 * (row + SLOT_GAP);
    let (width, height) = fit_image(image.aspect, row, MAX_IMAGE_WIDTH);
    Placement {
        transect: image.transect.to_string(),
        src: format!("{}/{}", image_dir, image.file),
        label: Rect {
            left: LABEL_LEFT,
            top: slot_top,
            width: LABEL_WIDTH,
            height: LABEL_HEIGHT,
        },
        image: Rect {
            left: (SLIDE_WIDTH - width) / 2.0,
            top: slot_top + LABEL_HEIGHT,
            width,
            height,
        },
    }
}

/// Position every image of `sites`.
///
/// `image_dir` is the derivative directory as referenced from the deck.
pub fn layout(title: &str, image_dir: &str, sites: &[SiteImages]) -> DeckLayout {
    let slides = paginate(sites)
        .iter()
        .map(|slide| SlideLayout {
            site: slide.site.to_string(),
            heading: slide.heading(),
            heading_box: HEADING,
            placements: slide
                .images
                .iter()
                .enumerate()
                .map(|(slot, image)| place(slot, image, image_dir))
                .collect(),
        })
        .collect();
    DeckLayout {
        title: title.to_string(),
        slide_width: SLIDE_WIDTH,
        slide_height: SLIDE_HEIGHT,
        slides,
    }
}

/// Render the deck as a standalone HTML document.
pub fn render_html(deck: &DeckLayout) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (deck.title) }
                style { (PreEscaped(CSS)) }
            }
            body {
                @for slide in &deck.slides {
                    section.slide data-site=(slide.site) {
                        h1.slide-heading style=(slide.heading_box.style()) { (slide.heading) }
                        @for placement in &slide.placements {
                            p.slide-label style=(placement.label.style()) { (placement.transect) }
                            img
                                src=(placement.src)
                                alt={ (slide.site) " " (placement.transect) }
                                style=(placement.image.style());
                        }
                    }
                }
            }
        }
    }
}

/// Files belonging to one deck.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeckPaths {
    pub html: PathBuf,
    pub layout_json: PathBuf,
    pub images_dir: PathBuf,
    /// `images_dir` as referenced from the HTML.
    pub images_href: String,
}

impl DeckPaths {
    pub fn for_deck(html: &Path) -> Result<Self, DeckError> {
        let stem = html
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DeckError::InvalidPath(html.to_path_buf()))?;
        let images_href = format!("{stem}_images");
        Ok(Self {
            html: html.to_path_buf(),
            layout_json: html.with_file_name(format!("{stem}.layout.json")),
            images_dir: html.with_file_name(&images_href),
            images_href,
        })
    }

    /// Empty the derivative directory and return it.
    pub fn prepare_images(&self) -> Result<&Path, DeckError> {
        if self.images_dir.exists() {
            fs::remove_dir_all(&self.images_dir)?;
        }
        fs::create_dir_all(&self.images_dir)?;
        Ok(&self.images_dir)
    }
}

/// `<deck_dir>/<prefix>_<project>.html`
pub fn default_deck_path(deck_dir: &Path, prefix: &str, project: &str) -> PathBuf {
    deck_dir.join(format!("{prefix}_{project}.html"))
}

/// Write the HTML deck and its layout file.
pub fn write_deck(paths: &DeckPaths, deck: &DeckLayout) -> Result<(), DeckError> {
    if let Some(parent) = paths.html.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(&paths.html, render_html(deck).into_string())?;
    fs::write(&paths.layout_json, serde_json::to_string_pretty(deck)?)?;
    Ok(())
}
