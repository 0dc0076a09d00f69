//! Image thumbnails.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use tracing::{debug, warn};

use super::store::FileStore;
use crate::{HostError, Result};

/// Scale `img` to `width`, keeping the aspect ratio.
///
/// Images narrower than `width` keep their size.
fn scale_to_width(img: &DynamicImage, width: u32) -> DynamicImage {
    let (w, h) = (img.width(), img.height());
    if w <= width || w == 0 {
        return img.clone();
    }
    let height = ((h as u64 * width as u64) / w as u64).max(1) as u32;
    img.resize_exact(width, height, FilterType::Lanczos3)
}

fn encode(img: &DynamicImage, format: ImageFormat) -> std::result::Result<Vec<u8>, image::ImageError> {
    let mut out = Cursor::new(Vec::new());
    // the WebP encoder only takes 8-bit RGB(A)
    DynamicImage::ImageRgba8(img.to_rgba8()).write_to(&mut out, format)?;
    Ok(out.into_inner())
}

/// Write a thumbnail of `bytes` under `thumbnails/<hash>.webp`.
///
/// Falls back to PNG when WebP encoding fails. Returns the relative path
/// of the thumbnail. Callers treat failure as non-fatal.
pub fn generate(store: &FileStore, bytes: &[u8], hash: &str, width: u32) -> Result<String> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| HostError::Validation(format!("cannot decode image: {e}")))?;
    let thumb = scale_to_width(&img, width);

    let (ext, data) = match encode(&thumb, ImageFormat::WebP) {
        Ok(data) => ("webp", data),
        Err(e) => {
            warn!(hash, error = %e, "webp thumbnail failed, using png");
            let data = encode(&thumb, ImageFormat::Png)
                .map_err(|e| HostError::Storage(format!("cannot encode thumbnail: {e}")))?;
            ("png", data)
        }
    };

    let rel = format!("{}.{ext}", FileStore::thumbnail_stem(hash));
    store.save(&rel, &data)?;
    debug!(hash, path = %rel, width = thumb.width(), height = thumb.height(), "thumbnail written");
    Ok(rel)
}
