use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use image_processor_core::contract::StatusMarker;
use image_processor_core::media::MediaKind;

use crate::adapters::invalidation::CdnInvalidator;
use crate::adapters::jpeg::ImageConverter;
use crate::adapters::object_store::ObjectStore;
use crate::adapters::place_table::PlaceTable;

type ObjectId = (String, String);

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<ObjectId, Vec<u8>>>,
    failing_copies: Mutex<BTreeSet<String>>,
    failing_lists: Mutex<BTreeSet<String>>,
    copies: Mutex<Vec<ObjectId>>,
}

impl MemoryStore {
    pub fn seed(&self, bucket: &str, key: &str, body: &[u8]) {
        self.objects
            .lock()
            .expect("poisoned mutex")
            .insert((bucket.to_string(), key.to_string()), body.to_vec());
    }

    pub fn fail_copy_of(&self, key: &str) {
        self.failing_copies
            .lock()
            .expect("poisoned mutex")
            .insert(key.to_string());
    }

    pub fn fail_listing_of(&self, prefix: &str) {
        self.failing_lists
            .lock()
            .expect("poisoned mutex")
            .insert(prefix.to_string());
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects
            .lock()
            .expect("poisoned mutex")
            .keys()
            .filter(|(owner, _)| owner == bucket)
            .map(|(_, key)| key.clone())
            .collect()
    }

    pub fn body(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .expect("poisoned mutex")
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Source keys of every successful copy, in call order.
    pub fn copied_keys(&self) -> Vec<String> {
        self.copies
            .lock()
            .expect("poisoned mutex")
            .iter()
            .map(|(_, key)| key.clone())
            .collect()
    }
}

impl ObjectStore for MemoryStore {
    fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, String> {
        self.body(bucket, key)
            .ok_or_else(|| format!("NoSuchKey: {bucket}/{key}"))
    }

    fn put_object(&self, bucket: &str, key: &str, body: &[u8], _: &str) -> Result<(), String> {
        self.seed(bucket, key, body);
        Ok(())
    }

    fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> Result<(), String> {
        if self
            .failing_copies
            .lock()
            .expect("poisoned mutex")
            .contains(source_key)
        {
            return Err("AccessDenied".to_string());
        }
        let body = self.get_object(source_bucket, source_key)?;
        self.seed(dest_bucket, dest_key, &body);
        self.copies
            .lock()
            .expect("poisoned mutex")
            .push((source_bucket.to_string(), source_key.to_string()));
        Ok(())
    }

    fn delete_object(&self, bucket: &str, key: &str) -> Result<(), String> {
        self.objects
            .lock()
            .expect("poisoned mutex")
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, String> {
        if self
            .failing_lists
            .lock()
            .expect("poisoned mutex")
            .contains(prefix)
        {
            return Err("SlowDown".to_string());
        }
        Ok(self
            .keys(bucket)
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect())
    }
}

pub struct RecordingPlaces {
    pub places: Result<Vec<String>, String>,
    pub queried: Mutex<Vec<(String, String)>>,
    pub markers: Mutex<Vec<(String, StatusMarker)>>,
}

impl RecordingPlaces {
    pub fn with_places(places: &[&str]) -> Self {
        Self {
            places: Ok(places.iter().map(|place| place.to_string()).collect()),
            queried: Mutex::new(Vec::new()),
            markers: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            places: Err(message.to_string()),
            queried: Mutex::new(Vec::new()),
            markers: Mutex::new(Vec::new()),
        }
    }
}

impl PlaceTable for RecordingPlaces {
    fn places_for_day(&self, table: &str, partition: &str) -> Result<Vec<String>, String> {
        self.queried
            .lock()
            .expect("poisoned mutex")
            .push((table.to_string(), partition.to_string()));
        self.places.clone()
    }

    fn put_status_marker(&self, table: &str, marker: &StatusMarker) -> Result<(), String> {
        self.markers
            .lock()
            .expect("poisoned mutex")
            .push((table.to_string(), marker.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingCdn {
    pub fail: bool,
    pub requests: Mutex<Vec<(String, Vec<String>, String)>>,
}

impl CdnInvalidator for RecordingCdn {
    fn create_invalidation(
        &self,
        distribution_id: &str,
        paths: &[String],
        caller_reference: &str,
    ) -> Result<String, String> {
        if self.fail {
            return Err("TooManyInvalidationsInProgress".to_string());
        }
        self.requests.lock().expect("poisoned mutex").push((
            distribution_id.to_string(),
            paths.to_vec(),
            caller_reference.to_string(),
        ));
        Ok("I2J0EXAMPLE".to_string())
    }
}

/// Emits a fake JPEG whose third byte records the requested quality.
/// Sources whose body starts with [`CORRUPT_BODY`] fail to decode.
pub struct QualityEcho;

pub const CORRUPT_BODY: &[u8] = b"corrupt";

impl ImageConverter for QualityEcho {
    fn to_jpeg(&self, source: &[u8], kind: &MediaKind, quality: u8) -> Result<Vec<u8>, String> {
        if source.starts_with(CORRUPT_BODY) {
            return Err(format!("failed to decode image: corrupt {kind:?} data"));
        }
        Ok(vec![0xFF, 0xD8, quality])
    }
}
