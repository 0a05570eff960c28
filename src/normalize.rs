//! Upload normalization: decode, bound, re-encode, persist.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};

use crate::error::ServiceResult;

/// Maximum dimension (width or height) of a normalized image.
pub const MAX_DIMENSION: u32 = 500;

/// A normalized image written to the scratch directory.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// Decode `bytes`, bound the longer side at [`MAX_DIMENSION`] preserving
/// aspect ratio, re-encode as PNG, and write the result to a uniquely named
/// file under `scratch_dir`.
///
/// `original_name` is untrusted and used for logging only; the on-disk name
/// is derived from a random UUID so concurrent requests cannot collide.
/// Writes exactly one file per call.
pub fn normalize_upload(
    bytes: &[u8],
    original_name: &str,
    scratch_dir: &Path,
) -> ServiceResult<NormalizedImage> {
    let img = image::load_from_memory(bytes)?;
    let (orig_w, orig_h) = img.dimensions();

    let bounded = bound_image(&img);
    let (w, h) = bounded.dimensions();

    std::fs::create_dir_all(scratch_dir)?;
    let path = scratch_dir.join(format!("resized_{}.png", uuid::Uuid::new_v4()));
    if let Err(e) = bounded.save_with_format(&path, ImageFormat::Png) {
        // Never leave a partial file behind on encode failure.
        let _ = std::fs::remove_file(&path);
        return Err(e.into());
    }

    tracing::info!(
        "Normalized '{original_name}' {orig_w}x{orig_h} -> {w}x{h} at {}",
        path.display()
    );

    Ok(NormalizedImage {
        path,
        width: w,
        height: h,
    })
}

/// Resize so the longer side is at most [`MAX_DIMENSION`], no cropping,
/// no padding. Images already inside the bound are returned unchanged.
fn bound_image(img: &DynamicImage) -> DynamicImage {
    let (w, h) = img.dimensions();
    if w > MAX_DIMENSION || h > MAX_DIMENSION {
        img.resize(MAX_DIMENSION, MAX_DIMENSION, FilterType::Lanczos3)
    } else {
        img.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use std::io::Cursor;

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::new_rgb8(width, height);
        let mut buf = Vec::new();
        let mut cursor = Cursor::new(&mut buf);
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, 85);
        img.write_with_encoder(encoder).unwrap();
        buf
    }

    #[test]
    fn large_landscape_is_bounded_preserving_aspect() {
        let dir = tempfile::tempdir().unwrap();
        let out = normalize_upload(&jpeg_bytes(2000, 1000), "scan.jpg", dir.path()).unwrap();
        assert_eq!((out.width, out.height), (500, 250));

        let reloaded = image::open(&out.path).unwrap();
        assert_eq!(reloaded.dimensions(), (500, 250));
        assert_eq!(
            ImageFormat::from_path(&out.path).unwrap(),
            ImageFormat::Png
        );
    }

    #[test]
    fn tall_image_is_bounded_on_height() {
        let dir = tempfile::tempdir().unwrap();
        let out = normalize_upload(&jpeg_bytes(600, 1200), "scan.jpg", dir.path()).unwrap();
        assert_eq!((out.width, out.height), (250, 500));
    }

    #[test]
    fn small_image_keeps_its_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let out = normalize_upload(&jpeg_bytes(120, 80), "tiny.jpg", dir.path()).unwrap();
        assert_eq!((out.width, out.height), (120, 80));
        assert!(out.path.exists());
    }

    #[test]
    fn undecodable_bytes_fail_with_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = normalize_upload(b"not an image at all", "report.pdf", dir.path()).unwrap_err();
        assert!(matches!(err, ServiceError::Decode(_)));
        // Nothing was written.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn repeated_uploads_of_the_same_name_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = jpeg_bytes(64, 64);
        let a = normalize_upload(&bytes, "scan.jpg", dir.path()).unwrap();
        let b = normalize_upload(&bytes, "scan.jpg", dir.path()).unwrap();
        assert_ne!(a.path, b.path);
        assert!(a.path.exists() && b.path.exists());
    }
}
