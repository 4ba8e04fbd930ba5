use std::io::{Cursor, Write};

use camino::Utf8Path;
use image::{ImageError, ImageFormat};
use tempfile::Builder;
use tracing::debug;

use crate::error::MirrorError;
use crate::store::Store;

/// Validates `bytes` as an image and writes it to `target`, re-encoded in the
/// format implied by the target extension (or the detected format when the
/// extension names none). The file appears at `target` only once fully
/// written.
pub fn decode_and_store(bytes: &[u8], source_url: &str, target: &Utf8Path) -> Result<(), MirrorError> {
    let decode_err = |err: ImageError| MirrorError::Decode {
        url: source_url.to_string(),
        message: err.to_string(),
    };
    let detected = image::guess_format(bytes).map_err(decode_err)?;
    let decoded = image::load_from_memory_with_format(bytes, detected).map_err(decode_err)?;
    let format = ImageFormat::from_path(target.as_std_path()).unwrap_or(detected);

    let parent = target
        .parent()
        .ok_or_else(|| MirrorError::Filesystem(format!("no parent directory for {target}")))?;
    Store::ensure_dir(parent)?;
    let mut temp = Builder::new()
        .prefix(".item")
        .suffix(".part")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| MirrorError::Filesystem(err.to_string()))?;

    let mut encoded = Cursor::new(Vec::new());
    let payload = match decoded.write_to(&mut encoded, format) {
        Ok(()) => encoded.into_inner(),
        Err(ImageError::Unsupported(reason)) => {
            debug!(path = %target, %reason, "encoder unavailable, keeping original bytes");
            bytes.to_vec()
        }
        Err(err) => return Err(MirrorError::Filesystem(err.to_string())),
    };
    temp.write_all(&payload)
        .map_err(|err| MirrorError::Filesystem(err.to_string()))?;

    temp.persist(target.as_std_path())
        .map_err(|err| MirrorError::Filesystem(err.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use camino::Utf8PathBuf;
    use image::{Rgb, RgbImage};

    use super::*;

    fn png_bytes() -> Vec<u8> {
        let img = RgbImage::from_pixel(2, 2, Rgb([200, 10, 10]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn stores_reencoded_image() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let target = root.join("Work").join("Chapter 1").join("0.jpg");

        decode_and_store(&png_bytes(), "https://cdn.example/0.jpg", &target).unwrap();

        let written = std::fs::read(target.as_std_path()).unwrap();
        assert_eq!(image::guess_format(&written).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn rejects_non_image_bytes() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let target = root.join("0.png");

        let err = decode_and_store(b"<html>not found</html>", "https://cdn.example/0.png", &target)
            .unwrap_err();
        assert_matches!(err, MirrorError::Decode { .. });
        assert!(!target.as_std_path().exists());
    }
}
