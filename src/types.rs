//! Render model shared by the conversion stage and both artifact renderers.
//!
//! The conversion stage produces these after derivatives exist on disk; the
//! deck and gallery renderers consume them without touching the filesystem.

use crate::naming::{SiteCode, TransectId};
use serde::Serialize;

/// One converted image ready to be placed in an artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedImage {
    pub transect: TransectId,
    /// Derivative file name, relative to the artifact's image directory.
    pub file: String,
    pub width: u32,
    pub height: u32,
    /// `width / height` rounded to four decimals. Always positive.
    pub aspect: f64,
}

/// All images of one site, transects in natural order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteImages {
    pub site: SiteCode,
    pub images: Vec<AggregatedImage>,
}

/// One dataset of the gallery, sites in alphabetical order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetGallery {
    pub id: String,
    pub label: String,
    pub sites: Vec<SiteImages>,
}

impl DatasetGallery {
    pub fn images(&self) -> impl Iterator<Item = (&SiteCode, &AggregatedImage)> {
        self.sites
            .iter()
            .flat_map(|s| s.images.iter().map(move |img| (&s.site, img)))
    }
}
