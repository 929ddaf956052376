//! Identifier parsing for the orthomosaic naming conventions.
//!
//! Two conventions meet in this module:
//!
//! - **Source directories** written by the photogrammetry tool, e.g.
//!   `TCRMP20251010_3D_BWR_T1_Proxy/`. The site code is the three uppercase
//!   letters after the `_3D_` marker; the transect id follows the site.
//! - **Canonical files** inside a project tree, e.g. `BWR_T1_full.tif`.
//!   The canonical name is the primary key of an asset within a category.
//!
//! ## Grammar
//!
//! ```text
//! source dir   .*_3D_(SITE)_(TRANSECT)?.*     SITE = [A-Z]{3}
//! canonical    ^(SITE)_(TRANSECT)_full\.EXT$  TRANSECT = T\d+(_\d+)?
//! ```
//!
//! A source directory without a transect gets `T0`. Names that do not match
//! are filtered out by the callers; nothing here returns an error.
//!
//! Parser output is typed immediately ([`SiteCode`], [`TransectId`],
//! [`CanonicalName`]) so raw strings never travel past this module.

use regex::Regex;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

/// `_3D_` marker followed by the site code. Group 1: site.
static SOURCE_SITE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_3D_([A-Z]{3})_").expect("Invalid source site regex"));

/// Marker, site, then the transect. Group 1: transect.
static SOURCE_TRANSECT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"_3D_[A-Z]{3}_(T\d+(?:_\d+)?)").expect("Invalid source transect regex")
});

/// Canonical file name. Group 1: site, group 2: transect, group 3: extension.
static CANONICAL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z]{3})_(T\d+(?:_\d+)?)_full\.([^./\\]+)$")
        .expect("Invalid canonical name regex")
});

static TRANSECT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^T\d+(?:_\d+)?$").expect("Invalid transect regex"));

static DIGIT_RUN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("Invalid digit run regex"));

/// Three uppercase ASCII letters identifying a monitoring site (`BWR`, `ABC`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SiteCode(String);

impl SiteCode {
    pub fn new(code: &str) -> Option<Self> {
        let valid = code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase());
        valid.then(|| Self(code.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transect identifier: `T<n>` or `T<n>_<m>`.
///
/// Ordering is natural: the digit runs are compared as integers, so
/// `T2 < T2_1 < T10`. Ids with equal numbers but different spelling
/// (`T01` vs `T1`) fall back to string order to keep `Ord` total.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TransectId(String);

impl TransectId {
    pub fn parse(id: &str) -> Option<Self> {
        TRANSECT_REGEX.is_match(id).then(|| Self(id.to_string()))
    }

    /// Transect assigned to source directories that carry none.
    pub fn unnumbered() -> Self {
        Self("T0".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Embedded digit runs as integers, e.g. `T2_1` → `[2, 1]`.
    pub fn natural_key(&self) -> Vec<u64> {
        natural_key(&self.0)
    }
}

impl Ord for TransectId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.natural_key()
            .cmp(&other.natural_key())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for TransectId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TransectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Digit runs of `s` parsed as integers. Runs too long for `u64` saturate.
pub fn natural_key(s: &str) -> Vec<u64> {
    DIGIT_RUN_REGEX
        .find_iter(s)
        .map(|m| m.as_str().parse::<u64>().unwrap_or(u64::MAX))
        .collect()
}

/// Identifiers recovered from a photogrammetry output directory name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSourceName {
    pub site: SiteCode,
    pub transect: TransectId,
}

/// Parse a source directory name like `TCRMP20251010_3D_BWR_T1_Proxy`.
///
/// - `"X20250101_3D_ABC_T1_Proxy"` → site `ABC`, transect `T1`
/// - `"X20250101_3D_ABC_T2_2_Proxy"` → site `ABC`, transect `T2_2`
/// - `"X20250101_3D_ABC_Proxy"` → site `ABC`, transect `T0`
/// - `"X20250101_ABC_T1"` → `None` (no `_3D_` marker)
pub fn parse_source_dir_name(name: &str) -> Option<ParsedSourceName> {
    let site = SOURCE_SITE_REGEX.captures(name)?.get(1)?.as_str();
    let transect = SOURCE_TRANSECT_REGEX
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| TransectId::parse(m.as_str()))
        .unwrap_or_else(TransectId::unnumbered);
    Some(ParsedSourceName {
        site: SiteCode::new(site)?,
        transect,
    })
}

/// A validated canonical asset name: `{SITE}_{TRANSECT}_full.{ext}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalName {
    pub site: SiteCode,
    pub transect: TransectId,
    pub extension: String,
}

impl CanonicalName {
    pub fn new(site: SiteCode, transect: TransectId, extension: &str) -> Self {
        Self {
            site,
            transect,
            extension: extension.to_string(),
        }
    }

    /// Validate `file_name` against the canonical pattern for `extension`.
    ///
    /// The extension match is exact (`tif` does not accept `TIF` or `tiff`).
    pub fn parse(file_name: &str, extension: &str) -> Option<Self> {
        let caps = CANONICAL_REGEX.captures(file_name)?;
        if &caps[3] != extension {
            return None;
        }
        Some(Self {
            site: SiteCode::new(&caps[1])?,
            transect: TransectId::parse(&caps[2])?,
            extension: extension.to_string(),
        })
    }

    pub fn file_name(&self) -> String {
        format!("{}_{}_full.{}", self.site, self.transect, self.extension)
    }
}

impl fmt::Display for CanonicalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// Human label suggested for a project id: underscores become spaces and
/// each word is capitalized (`2025_annual` → `2025 Annual`).
pub fn suggested_label(project_id: &str) -> String {
    project_id
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
