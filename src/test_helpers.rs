//! Shared test utilities for the ortho-gal test suite.
//!
//! Builds the on-disk shapes the pipeline consumes: photogrammetry output
//! batches, folders of edited exports, and project trees. Timestamps are
//! pinned with `filetime` so the force policy can be tested exactly.
//!
//! ```rust
//! let tmp = TempDir::new().unwrap();
//! let batch = tmp.path().join("batch");
//! make_source_batch(&batch, &["X20250101_3D_ABC_T1_Proxy"], "tif");
//! let data = tmp.path().join("data");
//! make_category(&data, "p1", "edited", &["ABC_T1_full.tif"]);
//! ```

use filetime::FileTime;
use std::fs;
use std::path::{Path, PathBuf};

/// Write `contents` to `path`, creating parent directories.
pub fn write_file(path: &Path, contents: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// Create `<root>/<dir>/<dir>_full.<ext>` for each directory name.
///
/// File contents are the directory name, so copies can be told apart.
pub fn make_source_batch(root: &Path, dirs: &[&str], ext: &str) -> Vec<PathBuf> {
    dirs.iter()
        .map(|dir| {
            let path = root.join(dir).join(format!("{dir}_full.{ext}"));
            write_file(&path, dir.as_bytes());
            path
        })
        .collect()
}

/// Create flat files in `dir`, contents equal to the file name.
pub fn make_flat_files(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
    names
        .iter()
        .map(|name| {
            let path = dir.join(name);
            write_file(&path, name.as_bytes());
            path
        })
        .collect()
}

/// Create `<data_root>/<project>/<category>/<name>` files.
pub fn make_category(data_root: &Path, project: &str, category: &str, names: &[&str]) -> PathBuf {
    let dir = data_root.join(project).join(category);
    fs::create_dir_all(&dir).unwrap();
    make_flat_files(&dir, names);
    dir
}

/// Pin a file's modification time to `secs` since the Unix epoch.
pub fn set_mtime(path: &Path, secs: i64) {
    filetime::set_file_mtime(path, FileTime::from_unix_time(secs, 0)).unwrap();
}

/// Modification time in whole seconds since the Unix epoch.
pub fn mtime(path: &Path) -> i64 {
    let meta = fs::metadata(path).unwrap();
    FileTime::from_last_modification_time(&meta).unix_seconds()
}

/// Write a real RGB TIFF of the given size (for builtin codec tests).
pub fn write_test_tiff(path: &Path, width: u32, height: u32) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    img.save_with_format(path, image::ImageFormat::Tiff).unwrap();
}

/// Sorted file names directly inside `dir`.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
