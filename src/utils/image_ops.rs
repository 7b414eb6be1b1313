use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::{DynamicImage, GrayImage, ImageFormat};
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Asynchronously encode an image to PNG bytes using spawn_blocking.
///
/// PNG encoding is CPU-intensive and can block the async runtime if done synchronously.
pub async fn encode_png_async(img: DynamicImage) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || encode_png(&img))
        .await
        .context("Failed to spawn blocking task for PNG encoding")?
}

pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>> {
    let mut png_bytes = Vec::new();
    let mut cursor = Cursor::new(&mut png_bytes);
    img.write_to(&mut cursor, ImageFormat::Png)
        .context("Failed to encode image as PNG")?;
    Ok(png_bytes)
}

/// PNG-encode an image and a mask and base64 both, in one blocking task.
pub async fn encode_image_and_mask_base64(
    img: DynamicImage,
    mask: GrayImage,
) -> Result<(String, String)> {
    tokio::task::spawn_blocking(move || {
        let image_png = encode_png(&img)?;
        let mask_png = encode_png(&DynamicImage::ImageLuma8(mask))?;
        Ok((BASE64.encode(image_png), BASE64.encode(mask_png)))
    })
    .await
    .context("Failed to spawn blocking task for image+mask encoding")?
}

/// Asynchronously load an image from bytes using spawn_blocking.
///
/// Image decoding is CPU-intensive, especially for large images.
pub async fn load_image_from_memory_async(bytes: &[u8]) -> Result<DynamicImage> {
    let bytes = bytes.to_vec(); // Clone to move into blocking task
    tokio::task::spawn_blocking(move || {
        image::load_from_memory(&bytes).context("Failed to load image from memory")
    })
    .await
    .context("Failed to spawn blocking task for image loading")?
}

/// Read an image file from disk without blocking the runtime.
///
/// Returns the raw bytes alongside the decoded image so callers can copy the
/// file verbatim.
pub async fn load_image_file_async(path: &Path) -> Result<(Vec<u8>, DynamicImage)> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let img = load_image_from_memory_async(&bytes)
        .await
        .with_context(|| format!("Failed to decode {}", path.display()))?;
    Ok((bytes, img))
}

/// Encode to PNG and write it to `path`.
pub async fn write_png_async(img: DynamicImage, path: PathBuf) -> Result<()> {
    let png_bytes = encode_png_async(img).await?;
    tokio::fs::write(&path, png_bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Reject images that are too small to hold readable text.
pub fn validate_image_dimensions(img: &DynamicImage, min_dimension: u32) -> Result<()> {
    let (width, height) = (img.width(), img.height());
    if width < min_dimension || height < min_dimension {
        anyhow::bail!(
            "Image too small: {}x{} (minimum {}x{})",
            width,
            height,
            min_dimension,
            min_dimension
        );
    }
    Ok(())
}
