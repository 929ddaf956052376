//! Gallery document.
//!
//! One self-contained `index.html` covering every dataset, next to the
//! `images/` directory the conversion stage filled.
//!
//! ## Page Structure
//!
//! ```text
//! .hero            mosaic of every image, title and subtitle on top
//! .topnav          sticky: brand + one pill per dataset (#ds-<id>)
//! section.dataset  per dataset: title bar with site anchors (#s-<id>-<SITE>)
//!   .site-block    per site: name + full-width stack of transect tiles
//! footer
//! #viewer          lightbox overlay (see [`crate::viewer`])
//! ```
//!
//! CSS and JavaScript are embedded inline so the output directory can be
//! copied anywhere. Tiles carry `data-src` / `data-title` attributes that the
//! viewer script reads on click; no user text is ever spliced into script.

use crate::config::GalleryConfig;
use crate::types::DatasetGallery;
use crate::viewer;
use maud::{DOCTYPE, Markup, PreEscaped, html};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const CSS: &str = include_str!("../static/gallery.css");
const VIEWER_JS: &str = include_str!("../static/viewer.js");

/// Image directory name inside the gallery output.
pub const IMAGES_DIR: &str = "images";

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No datasets found. Nothing to generate.")]
    NothingToRender,
}

/// Fixed text of the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryText {
    pub page_title: String,
    pub title: String,
    pub subtitle: String,
    pub brand: String,
    pub footer: String,
}

impl From<&GalleryConfig> for GalleryText {
    fn from(config: &GalleryConfig) -> Self {
        Self {
            page_title: config.page_title.clone(),
            title: config.title.clone(),
            subtitle: config.subtitle.clone(),
            brand: config.brand.clone(),
            footer: config.footer.clone(),
        }
    }
}

fn image_href(file: &str) -> String {
    format!("{IMAGES_DIR}/{file}")
}

fn dataset_anchor(id: &str) -> String {
    format!("ds-{id}")
}

fn site_anchor(id: &str, site: &str) -> String {
    format!("s-{id}-{site}")
}

fn render_hero(datasets: &[DatasetGallery], text: &GalleryText) -> Markup {
    html! {
        div.hero {
            div.hero-mosaic {
                @for dataset in datasets {
                    @for (_, image) in dataset.images() {
                        div.hero-tile style={ "flex: " (image.aspect) " 1 0%;" } {
                            img src=(image_href(&image.file)) alt="" loading="eager";
                        }
                    }
                }
            }
            div.hero-overlay {
                div.hero-title { (text.title) }
                div.hero-sub { (text.subtitle) }
            }
        }
    }
}

fn render_nav(datasets: &[DatasetGallery], text: &GalleryText) -> Markup {
    html! {
        nav.topnav {
            span.brand { (text.brand) }
            div.ds-pills {
                @for dataset in datasets {
                    a.ds-pill href={ "#" (dataset_anchor(&dataset.id)) } { (dataset.label) }
                }
            }
        }
    }
}

fn render_dataset(dataset: &DatasetGallery) -> Markup {
    html! {
        section.dataset id=(dataset_anchor(&dataset.id)) {
            div.ds-bar {
                span.ds-title { (dataset.label) }
                div.ds-sites {
                    @for site in &dataset.sites {
                        a href={ "#" (site_anchor(&dataset.id, site.site.as_str())) } { (site.site) }
                    }
                }
            }
            @for site in &dataset.sites {
                div.site-block id=(site_anchor(&dataset.id, site.site.as_str())) {
                    div.site-name { (site.site) }
                    div.wall-stack {
                        @for image in &site.images {
                            @let title = format!("{} {} \u{2014} {}", site.site, image.transect, dataset.label);
                            div.wall-tile data-src=(image_href(&image.file)) data-title=(title) {
                                img src=(image_href(&image.file))
                                    alt=(title)
                                    width=(image.width)
                                    height=(image.height)
                                    loading="lazy";
                                span.label { (image.transect) }
                            }
                        }
                    }
                }
            }
        }
    }
}

fn render_viewer() -> Markup {
    html! {
        div.viewer-overlay id="viewer" {
            div.viewer-topbar {
                span.viewer-title id="viewerTitle" {}
                div.viewer-controls {
                    button id="viewerZoomIn" type="button" title="Zoom in" { "+" }
                    button id="viewerZoomOut" type="button" title="Zoom out" { "\u{2212}" }
                    button id="viewerReset" type="button" title="Fit to screen" { "\u{21ba}" }
                    button id="viewerClose" type="button" title="Close" { "\u{d7}" }
                }
            }
            div.viewer-canvas id="viewerCanvas" {
                img id="viewerImg" draggable="false" alt="";
                div.zoom-hint id="zoomHint" {
                    "scroll to zoom \u{b7} drag to pan \u{b7} double-click to toggle \u{b7} esc to close"
                }
            }
        }
    }
}

/// Render the whole document. Pure: the same model and text always give
/// the same bytes.
pub fn render_gallery(datasets: &[DatasetGallery], text: &GalleryText) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (text.page_title) }
                style { (PreEscaped(CSS)) }
            }
            body {
                (render_hero(datasets, text))
                (render_nav(datasets, text))
                main {
                    @for dataset in datasets {
                        (render_dataset(dataset))
                    }
                }
                footer { (text.footer) }
                (render_viewer())
                script {
                    (PreEscaped(viewer::js_constants()))
                    (PreEscaped(VIEWER_JS))
                }
            }
        }
    }
}

/// Empty `<output>/images/` (derivatives are disposable) and return it.
/// Nothing else in `output_dir` is touched.
pub fn prepare_output(output_dir: &Path) -> Result<PathBuf, GalleryError> {
    let images = output_dir.join(IMAGES_DIR);
    if images.exists() {
        fs::remove_dir_all(&images)?;
    }
    fs::create_dir_all(&images)?;
    Ok(images)
}

/// Write `<output>/index.html`. Fails when there is nothing to show.
pub fn write_gallery(
    output_dir: &Path,
    datasets: &[DatasetGallery],
    text: &GalleryText,
) -> Result<PathBuf, GalleryError> {
    if datasets.is_empty() {
        return Err(GalleryError::NothingToRender);
    }
    fs::create_dir_all(output_dir)?;
    let index = output_dir.join("index.html");
    fs::write(&index, render_gallery(datasets, text).into_string())?;
    Ok(index)
}
