//! # Ortho Gal
//!
//! Ingests orthomosaic rasters from photogrammetry exports into per-project
//! trees and assembles them into two shareable artifacts: a paginated slide
//! deck for one project and a browsable, zoomable gallery across many.
//!
//! # Architecture: Import, Aggregate, Convert, Render
//!
//! ```text
//! 1. Import     source batch  →  data/<project>/{originals,edited}/   (idempotent sync)
//! 2. Aggregate  datasets.json →  GalleryPlan / Vec<SitePlan>          (read-only)
//! 3. Convert    plan          →  derivatives + render model           (parallel, codec)
//! 4. Render     render model  →  deck HTML + layout JSON / index.html (pure)
//! ```
//!
//! Each arrow is a plain function over typed values. The project tree on
//! disk is the only state shared between runs, so any stage can be rerun on
//! its own and an interrupted import simply resumes.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`naming`] | Source directory and canonical file name parsing, natural transect order |
//! | [`project`] | Project ids, categories, the explicit [`project::ProjectContext`] and the current-project marker |
//! | [`sync`] | Discovery of source batches and the idempotent, resumable copy engine |
//! | [`aggregate`] | `datasets.json` loading and the deterministic gallery plan |
//! | [`codec`] | The [`codec::Codec`] seam: builtin `image` codec and external command codec |
//! | [`convert`] | Parallel derivative generation with an explicit failure policy |
//! | [`deck`] | Slide pagination, fit arithmetic, HTML deck and layout JSON |
//! | [`gallery`] | The gallery document rendered with Maud |
//! | [`viewer`] | Pan/zoom lightbox state machine shared with the embedded script |
//! | [`types`] | Render model passed from conversion to the renderers |
//! | [`config`] | Layered `ortho-gal.toml` loading and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Canonical Names Are Keys
//!
//! Inside a project every raster is `SITE_TRANSECT_full.EXT`. Import maps
//! whatever the photogrammetry tool produced onto that name, and everything
//! downstream (sync decisions, aggregation, derivative names) keys on it.
//! Parsing happens once in [`naming`]; later stages only see typed values.
//!
//! ## Never a Partial File Under a Canonical Name
//!
//! Copies go to a hidden sibling and are renamed into place after the
//! source mtime has been applied. A killed import leaves at most a stray
//! `.partial` file, never a truncated raster that a rerun would skip.
//!
//! ## No Ambient Current Directory
//!
//! The data root and project are resolved once in `main` and passed down as
//! a [`project::ProjectContext`]. The marker file that remembers the current
//! project sits behind the [`project::MarkerStore`] trait.
//!
//! ## Escaped Markup
//!
//! Both artifacts are rendered with [Maud](https://maud.lambda.xyz/), so
//! dataset labels and titles are escaped by construction. The gallery's
//! viewer reads `data-src` / `data-title` attributes instead of having user
//! text spliced into JavaScript.

pub mod aggregate;
pub mod codec;
pub mod config;
pub mod convert;
pub mod deck;
pub mod gallery;
pub mod naming;
pub mod output;
pub mod project;
pub mod sync;
pub mod types;
pub mod viewer;

#[cfg(test)]
pub(crate) mod test_helpers;
