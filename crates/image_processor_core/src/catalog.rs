use std::collections::BTreeMap;

use serde_json::Value;

use crate::places::is_jpg_key;

pub const CATALOG_NAME_FIELD: &str = "name";
pub const CATALOG_COUNT_FIELD: &str = "numImages";

const THUMBNAIL_MARKER: &str = "Thumbnail/";

pub fn count_catalog_images<'a>(keys: impl IntoIterator<Item = &'a str>) -> usize {
    keys.into_iter()
        .filter(|key| is_jpg_key(key) && !key.contains(THUMBNAIL_MARKER))
        .count()
}

/// Rewrites `numImages` for the named catalog entries. Unknown fields and
/// entries without a matching name pass through untouched.
pub fn apply_image_counts(
    catalog: &[u8],
    counts: &BTreeMap<String, usize>,
) -> Result<Vec<u8>, String> {
    let mut document: Value = serde_json::from_slice(catalog)
        .map_err(|error| format!("Catalog is not valid JSON: {error}"))?;

    let entries = document
        .as_array_mut()
        .ok_or_else(|| "Catalog must be a JSON array".to_string())?;

    for entry in entries.iter_mut() {
        let Some(object) = entry.as_object_mut() else {
            continue;
        };
        let Some(count) = object
            .get(CATALOG_NAME_FIELD)
            .and_then(Value::as_str)
            .and_then(|name| counts.get(name))
        else {
            continue;
        };
        object.insert(CATALOG_COUNT_FIELD.to_string(), Value::from(*count));
    }

    serde_json::to_vec_pretty(&document)
        .map_err(|error| format!("Failed to serialize catalog: {error}"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn counts_jpgs_outside_thumbnail_folders() {
        let keys = [
            "Paris/1.jpg",
            "Paris/2.JPG",
            "Paris/Thumbnail/1.jpg",
            "Paris/notes.txt",
            "Paris/2024/3.jpg",
        ];
        assert_eq!(count_catalog_images(keys), 3);
    }

    #[test]
    fn updates_named_entries_and_keeps_other_fields() {
        let catalog = serde_json::to_vec(&json!([
            {"name": "Paris", "numImages": 1, "cover": "Paris/1.jpg"},
            {"name": "Rome", "numImages": 7},
            "stray"
        ]))
        .expect("catalog should serialize");
        let counts = BTreeMap::from([("Paris".to_string(), 12)]);

        let updated = apply_image_counts(&catalog, &counts).expect("update should pass");
        let parsed: Value = serde_json::from_slice(&updated).expect("output should parse");

        assert_eq!(parsed[0]["numImages"], 12);
        assert_eq!(parsed[0]["cover"], "Paris/1.jpg");
        assert_eq!(parsed[1]["numImages"], 7);
        assert_eq!(parsed[2], "stray");
        assert!(String::from_utf8(updated)
            .expect("utf-8")
            .contains("\n  {"));
    }

    #[test]
    fn rejects_non_array_catalog() {
        let error = apply_image_counts(b"{\"name\":\"Paris\"}", &BTreeMap::new())
            .expect_err("object catalog should fail");
        assert_eq!(error, "Catalog must be a JSON array");

        let error = apply_image_counts(b"not json", &BTreeMap::new())
            .expect_err("garbage should fail");
        assert!(error.starts_with("Catalog is not valid JSON"));
    }
}
