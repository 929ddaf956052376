//! Tool configuration.
//!
//! Handles loading, validating, and merging `ortho-gal.toml`. Stock defaults
//! are serialized to a TOML table, the user file is merged on top key by key,
//! and the result is deserialized and validated. The file is optional; every
//! key has a default, and command-line flags override the loaded values.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [paths]
//! data_dir = "data"                # Project trees: data/<project>/{originals,edited}
//! output_dir = "docs"              # Gallery output directory
//! datasets = "datasets.json"       # Gallery dataset list
//! marker = ".current_project"      # Current-project marker file
//! deck_dir = "output"              # Default directory for slide decks
//!
//! [naming]
//! extension = "tif"                # Raster extension of canonical files
//!
//! [gallery]
//! page_title = "TCRMP Orthomosaics"
//! title = "TCRMP"
//! subtitle = "Territorial Coral Reef Monitoring Program — Orthomosaics"
//! brand = "TCRMP Ortho"
//! footer = "TCRMP Orthomosaic Gallery"
//! derivative_ext = "jpg"           # builtin codec: jpg, jpeg, png, or webp (lossless)
//! quality = 85
//!
//! [deck]
//! title_prefix = "TCRMP"
//! derivative_ext = "jpg"
//! quality = 80
//!
//! [codec]
//! backend = "builtin"              # "builtin" or "command"
//! convert = ["magick", "{input}", "-quality", "{quality}", "{output}"]
//! probe = ["magick", "identify", "-format", "%w %h", "{input}"]
//! timeout_secs = 600
//!
//! [processing]
//! max_processes = 4                # Max parallel workers (omit for auto = CPU cores)
//! on_failure = "abort"             # "abort" or "skip" when a conversion fails
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "ortho-gal.toml";

/// Derivative extensions the built-in codec can encode.
pub const BUILTIN_DERIVATIVE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Tool configuration loaded from `ortho-gal.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrthoConfig {
    /// Locations of the project trees, marker and artifacts.
    pub paths: PathsConfig,
    /// Naming convention settings.
    pub naming: NamingConfig,
    /// Gallery document text and derivative settings.
    pub gallery: GalleryConfig,
    /// Slide deck settings.
    pub deck: DeckConfig,
    /// Raster codec selection.
    pub codec: CodecConfig,
    /// Parallelism and failure policy.
    pub processing: ProcessingConfig,
}

impl OrthoConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ext = &self.naming.extension;
        if ext.is_empty() || ext.contains(['.', '/', '\\']) {
            return Err(ConfigError::Validation(
                "naming.extension must be a bare extension like \"tif\"".into(),
            ));
        }
        for (key, quality) in [
            ("gallery.quality", self.gallery.quality),
            ("deck.quality", self.deck.quality),
        ] {
            if !(1..=100).contains(&quality) {
                return Err(ConfigError::Validation(format!("{key} must be 1-100")));
            }
        }
        if self.codec.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "codec.timeout_secs must be non-zero".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        match self.codec.backend {
            CodecBackend::Builtin => {
                for (key, ext) in [
                    ("gallery.derivative_ext", &self.gallery.derivative_ext),
                    ("deck.derivative_ext", &self.deck.derivative_ext),
                ] {
                    if !BUILTIN_DERIVATIVE_EXTENSIONS.contains(&ext.as_str()) {
                        return Err(ConfigError::Validation(format!(
                            "{key} \"{ext}\" is not supported by the builtin codec \
                             (expected one of {BUILTIN_DERIVATIVE_EXTENSIONS:?})"
                        )));
                    }
                }
                // The builtin WebP encoder is lossless only.
                for (section, ext, quality) in [
                    ("gallery", &self.gallery.derivative_ext, self.gallery.quality),
                    ("deck", &self.deck.derivative_ext, self.deck.quality),
                ] {
                    if ext == "webp" && quality != 100 {
                        return Err(ConfigError::Validation(format!(
                            "{section}.quality must be 100 for webp with the builtin codec \
                             (it writes lossless WebP); use jpg for lossy output or the \
                             command backend for lossy WebP"
                        )));
                    }
                }
            }
            CodecBackend::Command => {
                if self.codec.convert.is_empty() || self.codec.probe.is_empty() {
                    return Err(ConfigError::Validation(
                        "codec.convert and codec.probe must not be empty".into(),
                    ));
                }
                if !self.codec.convert.iter().any(|a| a.contains("{output}")) {
                    return Err(ConfigError::Validation(
                        "codec.convert must reference {output}".into(),
                    ));
                }
                if !self.codec.probe.iter().any(|a| a.contains("{input}")) {
                    return Err(ConfigError::Validation(
                        "codec.probe must reference {input}".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Filesystem locations, relative to the working directory unless absolute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub data_dir: String,
    pub output_dir: String,
    pub datasets: String,
    pub marker: String,
    pub deck_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            output_dir: "docs".to_string(),
            datasets: "datasets.json".to_string(),
            marker: ".current_project".to_string(),
            deck_dir: "output".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NamingConfig {
    /// Extension of canonical raster files (`{SITE}_{TRANSECT}_full.<ext>`).
    pub extension: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            extension: "tif".to_string(),
        }
    }
}

/// Text shown in the gallery document and how its images are encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GalleryConfig {
    /// Document `<title>`.
    pub page_title: String,
    /// Large title floating over the hero band.
    pub title: String,
    /// Line under the hero title.
    pub subtitle: String,
    /// Short label at the left of the sticky navigation bar.
    pub brand: String,
    pub footer: String,
    /// Extension of the gallery derivatives (`jpg`, `png`, `webp`).
    pub derivative_ext: String,
    /// Encoding quality (1-100). Builtin `webp` is lossless and requires 100.
    pub quality: u32,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            page_title: "TCRMP Orthomosaics".to_string(),
            title: "TCRMP".to_string(),
            subtitle: "Territorial Coral Reef Monitoring Program \u{2014} Orthomosaics".to_string(),
            brand: "TCRMP Ortho".to_string(),
            footer: "TCRMP Orthomosaic Gallery".to_string(),
            derivative_ext: "jpg".to_string(),
            quality: 85,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeckConfig {
    /// Deck file names are `<title_prefix>_<project>.html`.
    pub title_prefix: String,
    pub derivative_ext: String,
    pub quality: u32,
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            title_prefix: "TCRMP".to_string(),
            derivative_ext: "jpg".to_string(),
            quality: 80,
        }
    }
}

/// Which raster codec produces derivatives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecBackend {
    /// Pure Rust codec built on the `image` crate.
    #[default]
    Builtin,
    /// External commands from `codec.convert` and `codec.probe`.
    Command,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CodecConfig {
    pub backend: CodecBackend,
    /// Conversion command. Placeholders: `{input}`, `{output}`, `{quality}`.
    pub convert: Vec<String>,
    /// Dimension probe command. Placeholder: `{input}`. Output must contain
    /// `pixelWidth: W` / `pixelHeight: H`, or `W H`, or `WxH`.
    pub probe: Vec<String>,
    /// Upper bound on a single codec invocation.
    pub timeout_secs: u64,
}

impl Default for CodecConfig {
    fn default() -> Self {
        let args = |a: &[&str]| a.iter().map(|s| s.to_string()).collect();
        Self {
            backend: CodecBackend::Builtin,
            convert: args(&["magick", "{input}", "-quality", "{quality}", "{output}"]),
            probe: args(&["magick", "identify", "-format", "%w %h", "{input}"]),
            timeout_secs: 600,
        }
    }
}

/// What the conversion stage does when one asset fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the run and report the failing asset.
    #[default]
    Abort,
    /// Leave the asset out of the artifact, report it, and continue.
    Skip,
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel workers for copying and conversion.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
    pub on_failure: FailurePolicy,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Stock defaults as a TOML table, the base every user file is laid over.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(OrthoConfig::default()).expect("default config must serialize")
}

/// Lay `overlay` over `base`. Tables merge per key, recursively; any other
/// overlay value (scalars, command argument arrays) replaces the base value.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut table), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                let merged = match table.remove(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => value,
                };
                table.insert(key, merged);
            }
            toml::Value::Table(table)
        }
        (_, overlay) => overlay,
    }
}

/// Parse the user's `ortho-gal.toml`. A missing file is not an error: the
/// stock defaults then apply unchanged.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(toml::from_str(&content)?))
}

/// Build the effective config: defaults, then the user's overlay if any,
/// then typed deserialization (unknown keys fail here) and range checks.
pub fn resolve_config(
    defaults: toml::Value,
    user: Option<toml::Value>,
) -> Result<OrthoConfig, ConfigError> {
    let merged = match user {
        Some(user) => merge_toml(defaults, user),
        None => defaults,
    };
    let config: OrthoConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Effective config for a run, read from `path` when it exists.
pub fn load_config(path: &Path) -> Result<OrthoConfig, ConfigError> {
    resolve_config(stock_defaults_value(), load_raw_config(path)?)
}

/// Returns a fully-commented stock `ortho-gal.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# ortho-gal configuration
# =======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys cause an error.
# Command-line flags override these values.

# ---------------------------------------------------------------------------
# Paths (relative to the working directory unless absolute)
# ---------------------------------------------------------------------------
[paths]
# Project trees live at <data_dir>/<project>/originals and .../edited
data_dir = "data"

# Gallery output: <output_dir>/index.html and <output_dir>/images/
output_dir = "docs"

# Ordered list of {"id": ..., "label": ...} records for the gallery
datasets = "datasets.json"

# Single-line file naming the current project
marker = ".current_project"

# Default directory for slide decks
deck_dir = "output"

# ---------------------------------------------------------------------------
# Naming convention
# ---------------------------------------------------------------------------
[naming]
# Canonical files are {SITE}_{TRANSECT}_full.<extension>
extension = "tif"

# ---------------------------------------------------------------------------
# Gallery document
# ---------------------------------------------------------------------------
[gallery]
page_title = "TCRMP Orthomosaics"
title = "TCRMP"
subtitle = "Territorial Coral Reef Monitoring Program — Orthomosaics"
brand = "TCRMP Ortho"
footer = "TCRMP Orthomosaic Gallery"

# Derivative format with the builtin codec: jpg, jpeg, png or webp.
# Builtin webp is lossless and needs quality = 100; for lossy WebP use
# the command backend (e.g. cwebp) and set derivative_ext = "webp".
derivative_ext = "jpg"

# Encoding quality (1-100)
quality = 85

# ---------------------------------------------------------------------------
# Slide deck
# ---------------------------------------------------------------------------
[deck]
# Decks are written to <deck_dir>/<title_prefix>_<project>.html
title_prefix = "TCRMP"
derivative_ext = "jpg"
quality = 80

# ---------------------------------------------------------------------------
# Raster codec
# ---------------------------------------------------------------------------
[codec]
# "builtin" decodes TIFF/JPEG/PNG/WebP in-process.
# "command" runs the external commands below.
backend = "builtin"

# Placeholders: {input}, {output}, {quality}
convert = ["magick", "{input}", "-quality", "{quality}", "{output}"]

# Placeholder: {input}. Output must contain "pixelWidth: W" and
# "pixelHeight: H", or "W H", or "WxH".
probe = ["magick", "identify", "-format", "%w %h", "{input}"]

# A codec invocation running longer than this is killed and fails.
timeout_secs = 600

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers. Omit to use all CPU cores.
# Values above the core count are clamped down.
# max_processes = 4

# What to do when a conversion fails: "abort" the run, or "skip" the
# image and keep going (failures are still reported and counted).
on_failure = "abort"
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn default_config_paths() {
        let config = OrthoConfig::default();
        assert_eq!(config.paths.data_dir, "data");
        assert_eq!(config.paths.output_dir, "docs");
        assert_eq!(config.paths.datasets, "datasets.json");
        assert_eq!(config.paths.marker, ".current_project");
    }

    #[test]
    fn default_config_is_valid() {
        OrthoConfig::default().validate().unwrap();
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
            [gallery]
            title = "Reefs"
        "#;
        let config = resolve_config(stock_defaults_value(), Some(toml::from_str(toml).unwrap()))
            .unwrap();

        assert_eq!(config.gallery.title, "Reefs");
        // Unspecified values keep their defaults
        assert_eq!(config.gallery.brand, "TCRMP Ortho");
        assert_eq!(config.naming.extension, "tif");
    }

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("ortho-gal.toml")).unwrap();
        assert_eq!(config, OrthoConfig::default());
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ortho-gal.toml");
        fs::write(
            &path,
            r#"
[paths]
data_dir = "/mnt/ortho"

[processing]
max_processes = 2
on_failure = "skip"
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.paths.data_dir, "/mnt/ortho");
        assert_eq!(config.paths.output_dir, "docs");
        assert_eq!(config.processing.max_processes, Some(2));
        assert_eq!(config.processing.on_failure, FailurePolicy::Skip);
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ortho-gal.toml");
        fs::write(&path, "this is not valid toml [[[").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn command_codec_config() {
        let toml = r#"
            [codec]
            backend = "command"
            convert = ["cwebp", "-q", "{quality}", "{input}", "-o", "{output}"]
            probe = ["sips", "-g", "pixelWidth", "-g", "pixelHeight", "{input}"]
            timeout_secs = 30
        "#;
        let config = resolve_config(stock_defaults_value(), Some(toml::from_str(toml).unwrap()))
            .unwrap();
        assert_eq!(config.codec.backend, CodecBackend::Command);
        assert_eq!(config.codec.convert[0], "cwebp");
        assert_eq!(config.codec.timeout_secs, 30);
    }

    #[test]
    fn effective_threads_auto() {
        let config = ProcessingConfig::default();
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn effective_threads_user_constrains_down() {
        let config = ProcessingConfig {
            max_processes: Some(1),
            ..Default::default()
        };
        assert_eq!(effective_threads(&config), 1);
    }

    #[test]
    fn effective_threads_clamped_to_cores() {
        let config = ProcessingConfig {
            max_processes: Some(100_000),
            ..Default::default()
        };
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    // =========================================================================
    // merge_toml
    // =========================================================================

    #[test]
    fn overlay_replaces_only_the_keys_it_names() {
        let overlay: toml::Value = toml::from_str("[deck]\nquality = 60").unwrap();
        let merged = merge_toml(stock_defaults_value(), overlay);

        assert_eq!(merged["deck"]["quality"].as_integer(), Some(60));
        assert_eq!(merged["deck"]["title_prefix"].as_str(), Some("TCRMP"));
        assert_eq!(merged["paths"]["data_dir"].as_str(), Some("data"));
    }

    #[test]
    fn overlay_command_replaces_the_whole_argument_list() {
        let overlay: toml::Value =
            toml::from_str("[codec]\nconvert = [\"cwebp\", \"{input}\", \"-o\", \"{output}\"]")
                .unwrap();
        let merged = merge_toml(stock_defaults_value(), overlay);

        let convert = merged["codec"]["convert"].as_array().unwrap();
        assert_eq!(convert.len(), 4);
        assert_eq!(convert[0].as_str(), Some("cwebp"));
        assert_eq!(merged["codec"]["probe"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn overlay_adds_keys_absent_from_defaults() {
        // max_processes has no stock value; the overlay introduces it
        assert!(stock_defaults_value()["processing"].get("max_processes").is_none());
        let overlay: toml::Value = toml::from_str("[processing]\nmax_processes = 3").unwrap();
        let merged = merge_toml(stock_defaults_value(), overlay);
        assert_eq!(merged["processing"]["max_processes"].as_integer(), Some(3));
        assert_eq!(merged["processing"]["on_failure"].as_str(), Some("abort"));
    }

    // =========================================================================
    // Unknown keys and validation
    // =========================================================================

    #[test]
    fn unknown_key_rejected() {
        let overlay: toml::Value = toml::from_str("[gallery]\ntitel = \"typo\"").unwrap();
        assert!(resolve_config(stock_defaults_value(), Some(overlay)).is_err());
    }

    #[test]
    fn unknown_section_rejected() {
        let overlay: toml::Value = toml::from_str("[thumbnails]\nsize = 3").unwrap();
        assert!(resolve_config(stock_defaults_value(), Some(overlay)).is_err());
    }

    #[test]
    fn unknown_failure_policy_rejected() {
        let overlay: toml::Value =
            toml::from_str("[processing]\non_failure = \"ignore\"").unwrap();
        assert!(resolve_config(stock_defaults_value(), Some(overlay)).is_err());
    }

    #[test]
    fn validate_quality_bounds() {
        let mut config = OrthoConfig::default();
        config.gallery.quality = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
        config.gallery.quality = 100;
        config.deck.quality = 101;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_extension_is_bare() {
        let mut config = OrthoConfig::default();
        config.naming.extension = ".tif".into();
        assert!(config.validate().is_err());
        config.naming.extension = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_builtin_derivative_formats() {
        let mut config = OrthoConfig::default();
        config.gallery.derivative_ext = "avif".into();
        assert!(config.validate().is_err());
        // The command codec decides for itself what it can write
        config.codec.backend = CodecBackend::Command;
        config.validate().unwrap();
    }

    #[test]
    fn validate_builtin_webp_must_be_lossless() {
        let mut config = OrthoConfig::default();
        config.gallery.derivative_ext = "webp".into();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        config.gallery.quality = 100;
        config.validate().unwrap();

        config.deck.derivative_ext = "webp".into();
        assert!(config.validate().is_err());

        // An external encoder honours the quality setting
        config.codec.backend = CodecBackend::Command;
        config.gallery.quality = 85;
        config.validate().unwrap();
    }

    #[test]
    fn default_gallery_derivative_is_lossy_jpeg() {
        let config = OrthoConfig::default();
        assert_eq!(config.gallery.derivative_ext, "jpg");
        assert_eq!(config.gallery.quality, 85);
    }

    #[test]
    fn validate_command_needs_output_placeholder() {
        let mut config = OrthoConfig::default();
        config.codec.backend = CodecBackend::Command;
        config.codec.convert = vec!["cwebp".into(), "{input}".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_zero_timeout_and_workers() {
        let mut config = OrthoConfig::default();
        config.codec.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = OrthoConfig::default();
        config.processing.max_processes = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn stock_config_toml_is_valid() {
        let value: toml::Value = toml::from_str(stock_config_toml()).unwrap();
        let config = resolve_config(stock_defaults_value(), Some(value)).unwrap();
        assert_eq!(config, OrthoConfig::default());
    }
}
