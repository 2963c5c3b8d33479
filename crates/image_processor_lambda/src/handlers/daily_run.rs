use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::json;

use image_processor_core::config::{ProcessorConfig, INVALIDATION_PATH};
use image_processor_core::contract::{
    completion_body, invalidation_caller_reference, place_partition, ProcessorResponse,
    StatusMarker, QUERY_FAILURE_MESSAGE,
};
use image_processor_core::media::classify_key;
use image_processor_core::places::{catalog_folders, decode_place, folders_to_renumber};

use crate::adapters::invalidation::CdnInvalidator;
use crate::adapters::jpeg::ImageConverter;
use crate::adapters::object_store::ObjectStore;
use crate::adapters::place_table::PlaceTable;
use crate::handlers::conversion::convert_in_place;
use crate::handlers::folders::{refresh_catalog_counts, renumber_folder};
use crate::logging::{log_error, log_info, log_warn};

const COMPONENT: &str = "image_processor";

/// Backends a daily run talks to.
#[derive(Clone, Copy)]
pub struct RunDependencies<'a> {
    pub objects: &'a dyn ObjectStore,
    pub places: &'a dyn PlaceTable,
    pub cdn: &'a dyn CdnInvalidator,
    pub converter: &'a dyn ImageConverter,
}

/// Publishes today's uploads: copy each place from the source bucket,
/// convert it to JPEG, renumber the touched folders, invalidate the CDN,
/// refresh the catalog counts and record completion.
///
/// Only the place query is fatal. Every later failure is logged and the run
/// carries on.
pub fn handle_daily_run(
    config: &ProcessorConfig,
    now: &DateTime<Utc>,
    deps: RunDependencies<'_>,
) -> ProcessorResponse {
    let started_at = Instant::now();
    let partition = place_partition(*now);

    let places: Vec<String> = match deps.places.places_for_day(&config.place_table, &partition) {
        Ok(raw) => raw.iter().map(|place| decode_place(place)).collect(),
        Err(error) => {
            log_error(
                COMPONENT,
                "place_query_failed",
                json!({
                    "table": config.place_table.clone(),
                    "partition": partition,
                    "error": error,
                }),
            );
            return ProcessorResponse::error(500, QUERY_FAILURE_MESSAGE);
        }
    };
    log_info(
        COMPONENT,
        "run_started",
        json!({
            "partition": partition,
            "places": places.len(),
            "source_bucket": config.source_bucket.clone(),
            "dest_bucket": config.dest_bucket.clone(),
        }),
    );

    let success_count = places
        .iter()
        .filter(|place| publish_place(config, place, deps))
        .count();

    for folder in folders_to_renumber(&places) {
        match renumber_folder(&config.dest_bucket, &folder, deps.objects) {
            Ok(moved) => log_info(
                COMPONENT,
                "folder_renumbered",
                json!({"folder": folder, "moved": moved}),
            ),
            Err(error) => log_error(
                COMPONENT,
                "folder_renumber_failed",
                json!({"folder": folder, "error": error}),
            ),
        }
    }

    invalidate_cdn(config, now, deps.cdn);

    // With no folder touched the catalog is not rewritten.
    let folders = catalog_folders(&places);
    if !folders.is_empty() {
        match refresh_catalog_counts(
            &config.dest_bucket,
            &config.catalog_key,
            &folders,
            deps.objects,
        ) {
            Ok(counts) => log_info(COMPONENT, "catalog_updated", json!({"counts": counts})),
            Err(error) => log_error(
                COMPONENT,
                "catalog_update_failed",
                json!({"catalog_key": config.catalog_key.clone(), "error": error}),
            ),
        }
    }

    let marker = StatusMarker::success(&config.status_key, *now);
    if let Err(error) = deps.places.put_status_marker(&config.status_table, &marker) {
        log_error(
            COMPONENT,
            "status_marker_failed",
            json!({"table": config.status_table.clone(), "error": error}),
        );
    }

    log_info(
        COMPONENT,
        "run_completed",
        json!({
            "processed": success_count,
            "places": places.len(),
            "duration_ms": started_at.elapsed().as_millis(),
        }),
    );
    ProcessorResponse::ok(&completion_body(success_count, places.len()))
}

/// Copies one place into the destination bucket and converts it there.
/// Returns whether the converted JPEG was written.
fn publish_place(config: &ProcessorConfig, place: &str, deps: RunDependencies<'_>) -> bool {
    if classify_key(place).is_video() {
        log_info(COMPONENT, "video_skipped", json!({"key": place}));
        return false;
    }

    if let Err(error) =
        deps.objects
            .copy_object(&config.source_bucket, place, &config.dest_bucket, place)
    {
        log_error(
            COMPONENT,
            "copy_failed",
            json!({"key": place, "error": error}),
        );
        return false;
    }

    match convert_in_place(&config.dest_bucket, place, deps.objects, deps.converter) {
        Ok(converted_key) => {
            log_info(
                COMPONENT,
                "image_converted",
                json!({"key": place, "converted_key": converted_key}),
            );
            true
        }
        Err(error) => {
            log_warn(
                COMPONENT,
                "conversion_failed",
                json!({"key": place, "error": error}),
            );
            false
        }
    }
}

fn invalidate_cdn(config: &ProcessorConfig, now: &DateTime<Utc>, cdn: &dyn CdnInvalidator) {
    let paths = vec![INVALIDATION_PATH.to_string()];
    match cdn.create_invalidation(
        &config.distribution_id,
        &paths,
        &invalidation_caller_reference(*now),
    ) {
        Ok(invalidation_id) => log_info(
            COMPONENT,
            "cdn_invalidated",
            json!({
                "distribution_id": config.distribution_id.clone(),
                "invalidation_id": invalidation_id,
            }),
        ),
        Err(error) => log_error(
            COMPONENT,
            "cdn_invalidation_failed",
            json!({"distribution_id": config.distribution_id.clone(), "error": error}),
        ),
    }
}
