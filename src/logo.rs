use anyhow::{Context, Result};
use image::ImageFormat;
use std::io::Cursor;
use std::path::Path;

/// Logos are shown in the sidebar; anything taller is scaled down once at start-up.
const MAX_LOGO_HEIGHT: u32 = 120;

/// Decodes the logo image and re-encodes it as a PNG no taller than
/// [`MAX_LOGO_HEIGHT`].
pub fn load_logo(path: &Path) -> Result<Vec<u8>> {
    let img = image::open(path)
        .with_context(|| format!("Failed to open logo image: {:?}", path))?;

    let img = if img.height() > MAX_LOGO_HEIGHT {
        let width = (u64::from(img.width()) * u64::from(MAX_LOGO_HEIGHT) / u64::from(img.height())).max(1) as u32;
        img.thumbnail(width, MAX_LOGO_HEIGHT)
    } else {
        img
    };

    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, ImageFormat::Png)
        .context("Failed to encode logo as PNG")?;
    Ok(bytes.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn tall_logo_is_downscaled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logo.png");
        RgbaImage::from_pixel(400, 600, Rgba([0, 128, 0, 255])).save(&path).unwrap();

        let bytes = load_logo(&path).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.height(), MAX_LOGO_HEIGHT);
        assert_eq!(decoded.width(), 80);
    }

    #[test]
    fn small_logo_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logo.png");
        RgbaImage::from_pixel(40, 30, Rgba([255, 255, 255, 255])).save(&path).unwrap();

        let decoded = image::load_from_memory(&load_logo(&path).unwrap()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 30));
    }

    #[test]
    fn missing_logo_is_an_error() {
        assert!(load_logo(Path::new("/nonexistent/logo.png")).is_err());
    }
}
