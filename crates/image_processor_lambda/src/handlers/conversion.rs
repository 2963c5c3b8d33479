use image_processor_core::media::{classify_key, conversion_target};

use crate::adapters::jpeg::ImageConverter;
use crate::adapters::object_store::ObjectStore;

pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";

/// Converts `key` inside `bucket` to a JPEG stored next to it, removing the
/// original when the key changes. Returns the key the JPEG was written to.
pub fn convert_in_place(
    bucket: &str,
    key: &str,
    objects: &dyn ObjectStore,
    converter: &dyn ImageConverter,
) -> Result<String, String> {
    let kind = classify_key(key);
    let target = conversion_target(key).ok_or_else(|| format!("no JPEG conversion for {key}"))?;

    let source = objects
        .get_object(bucket, key)
        .map_err(|error| format!("Failed to download {key}: {error}"))?;
    let jpeg = converter.to_jpeg(&source, &kind, target.quality)?;

    objects
        .put_object(bucket, &target.key, &jpeg, JPEG_CONTENT_TYPE)
        .map_err(|error| format!("Failed to upload {}: {error}", target.key))?;

    if target.key != key {
        objects
            .delete_object(bucket, key)
            .map_err(|error| format!("Failed to delete original {key}: {error}"))?;
    }

    Ok(target.key)
}
