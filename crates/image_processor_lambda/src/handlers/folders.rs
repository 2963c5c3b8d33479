use std::collections::{BTreeMap, BTreeSet};

use image_processor_core::catalog::{apply_image_counts, count_catalog_images};
use image_processor_core::places::plan_folder_renumbering;

use crate::adapters::object_store::ObjectStore;

pub const CATALOG_CONTENT_TYPE: &str = "application/json";

/// Renames the folder's JPEGs to `1.jpg`, `2.jpg`, ... and returns how many
/// moves were made. Each move is a copy followed by a delete.
pub fn renumber_folder(
    bucket: &str,
    folder: &str,
    objects: &dyn ObjectStore,
) -> Result<usize, String> {
    let prefix = format!("{}/", folder.trim_end_matches('/'));
    let keys = objects
        .list_keys(bucket, &prefix)
        .map_err(|error| format!("Failed to list {prefix}: {error}"))?;

    let steps = plan_folder_renumbering(folder, &keys);
    for step in &steps {
        objects
            .copy_object(bucket, &step.from, bucket, &step.to)
            .map_err(|error| format!("Failed to copy {} to {}: {error}", step.from, step.to))?;
        objects
            .delete_object(bucket, &step.from)
            .map_err(|error| format!("Failed to delete {}: {error}", step.from))?;
    }
    Ok(steps.len())
}

/// Recounts the JPEGs under each folder and writes the numbers back into the
/// catalog object. Returns the counts that were written.
pub fn refresh_catalog_counts(
    bucket: &str,
    catalog_key: &str,
    folders: &BTreeSet<String>,
    objects: &dyn ObjectStore,
) -> Result<BTreeMap<String, usize>, String> {
    let mut counts = BTreeMap::new();
    for folder in folders {
        let prefix = format!("{folder}/");
        let keys = objects
            .list_keys(bucket, &prefix)
            .map_err(|error| format!("Failed to list {prefix}: {error}"))?;
        counts.insert(
            folder.clone(),
            count_catalog_images(keys.iter().map(String::as_str)),
        );
    }

    let catalog = objects
        .get_object(bucket, catalog_key)
        .map_err(|error| format!("Failed to read {catalog_key}: {error}"))?;
    let updated = apply_image_counts(&catalog, &counts)?;
    objects
        .put_object(bucket, catalog_key, &updated, CATALOG_CONTENT_TYPE)
        .map_err(|error| format!("Failed to write {catalog_key}: {error}"))?;
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::handlers::fakes::MemoryStore;

    #[test]
    fn renumbers_only_direct_children() {
        let store = MemoryStore::default();
        for key in ["Paris/b.jpg", "Paris/a.jpg", "Paris/Thumbnail/a.jpg", "Paris/notes.txt"] {
            store.seed("dest", key, key.as_bytes());
        }

        let moved = renumber_folder("dest", "Paris", &store).expect("renumber should pass");

        assert_eq!(moved, 2);
        assert_eq!(
            store.keys("dest"),
            vec![
                "Paris/1.jpg".to_string(),
                "Paris/2.jpg".to_string(),
                "Paris/Thumbnail/a.jpg".to_string(),
                "Paris/notes.txt".to_string(),
            ]
        );
        assert_eq!(store.body("dest", "Paris/1.jpg"), Some(b"Paris/a.jpg".to_vec()));
    }

    #[test]
    fn renumbering_keeps_every_body_when_names_collide() {
        let store = MemoryStore::default();
        for key in ["Paris/1.jpg", "Paris/10.jpg", "Paris/2.jpg"] {
            store.seed("dest", key, key.as_bytes());
        }

        renumber_folder("dest", "Paris", &store).expect("renumber should pass");

        assert_eq!(store.body("dest", "Paris/1.jpg"), Some(b"Paris/1.jpg".to_vec()));
        assert_eq!(store.body("dest", "Paris/2.jpg"), Some(b"Paris/10.jpg".to_vec()));
        assert_eq!(store.body("dest", "Paris/3.jpg"), Some(b"Paris/2.jpg".to_vec()));
        assert_eq!(store.keys("dest").len(), 3);
    }

    #[test]
    fn catalog_counts_are_refreshed() {
        let store = MemoryStore::default();
        let catalog = json!([
            {"name": "Paris", "numImages": 0, "title": "Paris"},
            {"name": "Rome", "numImages": 4}
        ]);
        store.seed(
            "dest",
            "Json/image.json",
            &serde_json::to_vec(&catalog).expect("catalog should serialize"),
        );
        for key in ["Paris/1.jpg", "Paris/2.jpg", "Paris/Thumbnail/1.jpg", "Paris/2023/1.jpg"] {
            store.seed("dest", key, b"jpg");
        }

        let counts = refresh_catalog_counts(
            "dest",
            "Json/image.json",
            &BTreeSet::from(["Paris".to_string()]),
            &store,
        )
        .expect("refresh should pass");

        assert_eq!(counts, BTreeMap::from([("Paris".to_string(), 3)]));
        let written: Value = serde_json::from_slice(
            &store.body("dest", "Json/image.json").expect("catalog exists"),
        )
        .expect("catalog should parse");
        assert_eq!(written[0]["numImages"], 3);
        assert_eq!(written[0]["title"], "Paris");
        assert_eq!(written[1]["numImages"], 4);
    }

    #[test]
    fn missing_catalog_is_an_error() {
        let store = MemoryStore::default();
        let error = refresh_catalog_counts(
            "dest",
            "Json/image.json",
            &BTreeSet::from(["Paris".to_string()]),
            &store,
        )
        .expect_err("missing catalog should fail");
        assert!(error.starts_with("Failed to read Json/image.json"));
    }
}
