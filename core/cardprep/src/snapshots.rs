//! Optional diagnostic channel that persists each stage's intermediate image.
//!
//! Snapshot writes never affect the pipeline result: failures are logged
//! and dropped.

use std::error::Error;
use std::path::{Path, PathBuf};

use image::{GrayImage, RgbImage};
use tracing::{debug, warn};

use crate::compress::encode_jpeg;

/// JPEG quality of RGB stage snapshots.
pub const SNAPSHOT_JPEG_QUALITY: u8 = 95;

/// Fixed snapshot file names, numbered in pipeline order.
pub mod names {
    #![allow(missing_docs)]
    pub const LOADED: &str = "01_loaded.jpg";
    pub const GRAY: &str = "02_gray.png";
    pub const FILTERED: &str = "03_filtered.png";
    pub const THRESHOLD: &str = "04_threshold.png";
    pub const EDGES: &str = "05_edges.png";
    pub const DILATED: &str = "06_dilated.png";
    pub const CROPPED: &str = "07_cropped.jpg";
    pub const CONTRAST: &str = "08_contrast.jpg";
    pub const SHARPNESS: &str = "09_sharpness.jpg";
    pub const ENHANCED: &str = "10_enhanced.jpg";
}

/// Destination for stage snapshots. Disabled unless a directory is set.
#[derive(Debug, Clone, Default)]
pub struct Snapshots {
    dir: Option<PathBuf>,
}

impl Snapshots {
    /// A sink that writes nothing.
    pub fn disabled() -> Self {
        Self { dir: None }
    }

    /// Write snapshots into `dir`, creating it on first use.
    pub fn to_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    /// Whether a destination directory is set.
    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    /// `.jpg` names are encoded at [`SNAPSHOT_JPEG_QUALITY`]; anything else
    /// goes by extension.
    pub(crate) fn save_rgb(&self, name: &str, image: &RgbImage) {
        self.write(name, |path| {
            let is_jpeg = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"));
            if is_jpeg {
                std::fs::write(path, encode_jpeg(image, SNAPSHOT_JPEG_QUALITY)?)?;
            } else {
                image.save(path)?;
            }
            Ok(())
        });
    }

    pub(crate) fn save_gray(&self, name: &str, image: &GrayImage) {
        self.write(name, |path| Ok(image.save(path)?));
    }

    fn write(&self, name: &str, save: impl FnOnce(&Path) -> Result<(), Box<dyn Error>>) {
        let Some(dir) = &self.dir else {
            return;
        };
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!(dir = %dir.display(), error = %e, "cannot create snapshot directory");
            return;
        }
        let path = dir.join(name);
        match save(&path) {
            Ok(()) => debug!(path = %path.display(), "wrote snapshot"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to write snapshot"),
        }
    }
}
