use image::RgbImage;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AnalysisError, Result};

/// `<dir>/v<visit:07>c<sensor:03>.png`
pub fn panel_path(dir: &Path, visit: u32, sensor: u32) -> PathBuf {
    dir.join(format!("v{visit:07}c{sensor:03}.png"))
}

pub fn save_image(img: &RgbImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| AnalysisError::io(parent, e))?;
    }
    img.save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_panel_path() {
        assert_eq!(
            panel_path(Path::new("out"), 1252, 43),
            PathBuf::from("out/v0001252c043.png")
        );
    }

    #[test]
    fn test_save_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = panel_path(&dir.path().join("nested"), 1, 2);
        let img = RgbImage::from_pixel(3, 2, Rgb([10, 20, 30]));
        save_image(&img, &path).unwrap();
        let back = image::open(&path).unwrap().to_rgb8();
        assert_eq!(back, img);
    }
}
