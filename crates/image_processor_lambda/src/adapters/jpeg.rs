use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbImage};
use image_processor_core::media::MediaKind;

pub trait ImageConverter {
    fn to_jpeg(&self, source: &[u8], kind: &MediaKind, quality: u8) -> Result<Vec<u8>, String>;
}

/// Raster conversion backed by the `image` crate, plus libheif for HEIC when
/// the `heic` feature is enabled. Non-HEIC formats are sniffed from the
/// bytes, so a mislabelled upload still decodes.
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterJpegConverter;

impl ImageConverter for RasterJpegConverter {
    fn to_jpeg(&self, source: &[u8], kind: &MediaKind, quality: u8) -> Result<Vec<u8>, String> {
        let rgb = match kind {
            MediaKind::Video => return Err("video files are not converted".to_string()),
            MediaKind::Unsupported(extension) => {
                return Err(format!("unsupported format: {extension}"));
            }
            MediaKind::Heic => decode_heic(source)?,
            MediaKind::Tiff | MediaKind::Jpg | MediaKind::Jpeg | MediaKind::Png | MediaKind::Bmp => {
                image::load_from_memory(source)
                    .map(DynamicImage::into_rgb8)
                    .map_err(|error| format!("failed to decode image: {error}"))?
            }
        };

        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, quality.clamp(1, 100))
            .encode_image(&rgb)
            .map_err(|error| format!("failed to encode jpeg: {error}"))?;
        Ok(encoded)
    }
}

#[cfg(feature = "heic")]
fn decode_heic(source: &[u8]) -> Result<RgbImage, String> {
    use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

    let context = HeifContext::read_from_bytes(source)
        .map_err(|error| format!("failed to decode HEIC: {error}"))?;
    let handle = context
        .primary_image_handle()
        .map_err(|error| format!("failed to decode HEIC: {error}"))?;
    let decoded = LibHeif::new()
        .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)
        .map_err(|error| format!("failed to decode HEIC: {error}"))?;

    let planes = decoded.planes();
    let plane = planes
        .interleaved
        .ok_or_else(|| "failed to decode HEIC: no interleaved RGB plane".to_string())?;

    // Rows may be padded past width * 3.
    let row_bytes = plane.width as usize * 3;
    let mut pixels = Vec::with_capacity(row_bytes * plane.height as usize);
    for row in plane.data.chunks(plane.stride).take(plane.height as usize) {
        let row = row
            .get(..row_bytes)
            .ok_or_else(|| "failed to decode HEIC: truncated image row".to_string())?;
        pixels.extend_from_slice(row);
    }
    RgbImage::from_raw(plane.width, plane.height, pixels)
        .ok_or_else(|| "failed to decode HEIC: plane size mismatch".to_string())
}

#[cfg(not(feature = "heic"))]
fn decode_heic(_source: &[u8]) -> Result<RgbImage, String> {
    Err("HEIC decoding requires the `heic` feature".to_string())
}
