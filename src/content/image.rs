use crate::error::{PackError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, RgbImage};
use sha2::{Digest, Sha256};
use std::io::Cursor;

/// Dedup identity of a decoded frame: dimensions plus a digest of the raw
/// RGB pixels. Two frames with equal signatures render identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageSignature {
    pub width: u32,
    pub height: u32,
    pub digest: [u8; 32],
}

/// A decoded RGB frame ready for re-encoding into an archive member.
#[derive(Debug, Clone)]
pub struct ImageFrame {
    image: RgbImage,
}

impl ImageFrame {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    /// Decode any supported input format and normalize to RGB.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let decoded = image::load_from_memory(bytes).map_err(|e| PackError::Decode {
            what: "image".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            image: decoded.to_rgb8(),
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn signature(&self) -> ImageSignature {
        let mut hasher = Sha256::new();
        hasher.update(self.image.as_raw());
        ImageSignature {
            width: self.image.width(),
            height: self.image.height(),
            digest: hasher.finalize().into(),
        }
    }

    /// Encode for the requested extension. Returns the encoded bytes and the
    /// extension actually used; formats without a lossless encoder here
    /// (bmp, tif, tiff) fall back to PNG and the member name is rewritten.
    pub fn encode(&self, ext: &str, provenance: Option<&str>) -> Result<(Vec<u8>, String)> {
        let width = self.image.width();
        let height = self.image.height();
        let raw = self.image.as_raw();

        match ext {
            "jpg" | "jpeg" => {
                let mut buf = Cursor::new(Vec::new());
                let mut encoder = JpegEncoder::new_with_quality(&mut buf, 95);
                encoder.encode(raw, width, height, ExtendedColorType::Rgb8)?;
                Ok((buf.into_inner(), ext.to_string()))
            }
            "webp" => {
                let mut buf = Cursor::new(Vec::new());
                let encoder = WebPEncoder::new_lossless(&mut buf);
                encoder.encode(raw, width, height, ExtendedColorType::Rgb8)?;
                Ok((buf.into_inner(), "webp".to_string()))
            }
            _ => {
                let bytes = self.encode_png(provenance)?;
                Ok((bytes, "png".to_string()))
            }
        }
    }

    /// PNG with an optional `provenance` tEXt chunk carrying generation
    /// parameters, readable by common metadata viewers.
    pub fn encode_png(&self, provenance: Option<&str>) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, self.image.width(), self.image.height());
            encoder.set_color(png::ColorType::Rgb);
            encoder.set_depth(png::BitDepth::Eight);
            if let Some(text) = provenance {
                encoder
                    .add_text_chunk("provenance".to_string(), text.to_string())
                    .map_err(|e| PackError::Decode {
                        what: "png metadata".to_string(),
                        reason: e.to_string(),
                    })?;
            }
            let mut writer = encoder.write_header().map_err(png_error)?;
            writer.write_image_data(self.image.as_raw()).map_err(png_error)?;
        }
        Ok(out)
    }
}

fn png_error(error: png::EncodingError) -> PackError {
    PackError::Decode {
        what: "png".to_string(),
        reason: error.to_string(),
    }
}
