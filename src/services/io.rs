//! Image I/O operations service
//!
//! Keeps decoding, encoding and file access out of the pipeline so that the
//! core only ever sees [`PixelBuffer`]s.

use crate::{
    error::{CutoutError, Result},
    types::PixelBuffer,
};
use image::{DynamicImage, ImageFormat};
use std::path::Path;

/// Service for handling image input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Decode image bytes in any supported format
    ///
    /// # Errors
    /// - `DecodeFailed` when the bytes are empty or not a supported image
    ///
    /// # Examples
    /// ```rust,no_run
    /// use imgly_cutout::services::ImageIOService;
    ///
    /// let data = std::fs::read("input.jpg")?;
    /// let image = ImageIOService::load_from_bytes(&data)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load_from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(CutoutError::decode_failed("input is empty"));
        }
        if let Ok(format) = image::guess_format(bytes) {
            log::debug!("Detected {:?} input ({} bytes)", format, bytes.len());
        }
        image::load_from_memory(bytes).map_err(|e| CutoutError::decode_failed(e.to_string()))
    }

    /// Decode image bytes into a pixel buffer
    ///
    /// # Errors
    /// - `DecodeFailed` when the bytes cannot be decoded or the image is empty
    pub fn decode(bytes: &[u8]) -> Result<PixelBuffer> {
        let image = Self::load_from_bytes(bytes)?;
        if image.width() == 0 || image.height() == 0 {
            return Err(CutoutError::decode_failed(format!(
                "decoded image has no pixels ({}x{})",
                image.width(),
                image.height()
            )));
        }
        Ok(PixelBuffer::from_dynamic_image(&image))
    }

    /// Load and decode an image file
    ///
    /// # Errors
    /// - `Io` when the file cannot be read
    /// - `DecodeFailed` when its contents are not a supported image
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<PixelBuffer> {
        let path_ref = path.as_ref();
        let data = std::fs::read(path_ref)?;
        log::debug!("Read {} bytes from {}", data.len(), path_ref.display());
        Self::decode(&data)
    }

    /// Encode a buffer as PNG, RGBA when it has alpha and RGB otherwise
    ///
    /// # Errors
    /// - `Encode` when the PNG encoder fails
    pub fn encode_png(buffer: &PixelBuffer) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        buffer
            .to_dynamic_image()
            .write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| CutoutError::encode(format!("Failed to encode PNG: {e}")))?;
        Ok(bytes)
    }

    /// Encode a buffer as PNG and write it to `path`
    ///
    /// # Errors
    /// - Encoding or file system failures
    pub fn save_png<P: AsRef<Path>>(buffer: &PixelBuffer, path: P) -> Result<()> {
        let bytes = Self::encode_png(buffer)?;
        Self::write_bytes(path, &bytes)
    }

    /// Write bytes to `path`, creating parent directories as needed
    ///
    /// # Errors
    /// - File system failures
    pub fn write_bytes<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path_ref, bytes)?;
        log::debug!("Wrote {} bytes to {}", bytes.len(), path_ref.display());
        Ok(())
    }

    /// Read an async stream to the end
    ///
    /// # Errors
    /// - `Io` when the stream fails
    pub async fn read_all<R: tokio::io::AsyncRead + Unpin>(mut reader: R) -> Result<Vec<u8>> {
        use tokio::io::AsyncReadExt;

        let mut buffer = Vec::new();
        AsyncReadExt::read_to_end(&mut reader, &mut buffer).await?;
        Ok(buffer)
    }

    /// Check if a file path has a supported image extension
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                matches!(
                    ext.to_lowercase().as_str(),
                    "jpg" | "jpeg" | "png" | "webp" | "tiff" | "tif"
                )
            })
    }
}
