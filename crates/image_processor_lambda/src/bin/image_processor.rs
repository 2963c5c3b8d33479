use std::collections::HashMap;

use aws_sdk_cloudfront::types::{InvalidationBatch, Paths};
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use chrono::Utc;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::json;

use image_processor_core::config::ProcessorConfig;
use image_processor_core::contract::{ProcessorResponse, StatusMarker};
use image_processor_lambda::adapters::invalidation::CdnInvalidator;
use image_processor_lambda::adapters::jpeg::RasterJpegConverter;
use image_processor_lambda::adapters::object_store::ObjectStore;
use image_processor_lambda::adapters::place_table::PlaceTable;
use image_processor_lambda::handlers::daily_run::{handle_daily_run, RunDependencies};
use image_processor_lambda::logging::log_info;

const PLACE_PARTITION_ATTRIBUTE: &str = "timestamp";
const PLACE_VALUE_ATTRIBUTE: &str = "place";

/// Characters left unescaped in an S3 `CopySource` key.
const COPY_SOURCE_KEY: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn run_blocking<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}

fn copy_source(bucket: &str, key: &str) -> String {
    format!("{bucket}/{}", utf8_percent_encode(key, COPY_SOURCE_KEY))
}

struct S3ObjectStore {
    s3_client: aws_sdk_s3::Client,
}

impl ObjectStore for S3ObjectStore {
    fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, String> {
        let request = self.s3_client.get_object().bucket(bucket).key(key);
        run_blocking(async move {
            let output = request
                .send()
                .await
                .map_err(|error| format!("failed to read object: {}", DisplayErrorContext(error)))?;
            output
                .body
                .collect()
                .await
                .map(|body| body.into_bytes().to_vec())
                .map_err(|error| format!("failed to read object body: {error}"))
        })
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        content_type: &str,
    ) -> Result<(), String> {
        let request = self
            .s3_client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body.to_vec()));
        run_blocking(async move {
            request
                .send()
                .await
                .map(|_| ())
                .map_err(|error| format!("failed to write object: {}", DisplayErrorContext(error)))
        })
    }

    fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> Result<(), String> {
        let request = self
            .s3_client
            .copy_object()
            .copy_source(copy_source(source_bucket, source_key))
            .bucket(dest_bucket)
            .key(dest_key);
        run_blocking(async move {
            request
                .send()
                .await
                .map(|_| ())
                .map_err(|error| format!("failed to copy object: {}", DisplayErrorContext(error)))
        })
    }

    fn delete_object(&self, bucket: &str, key: &str) -> Result<(), String> {
        let request = self.s3_client.delete_object().bucket(bucket).key(key);
        run_blocking(async move {
            request
                .send()
                .await
                .map(|_| ())
                .map_err(|error| format!("failed to delete object: {}", DisplayErrorContext(error)))
        })
    }

    fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, String> {
        let client = self.s3_client.clone();
        let bucket = bucket.to_string();
        let prefix = prefix.to_string();
        run_blocking(async move {
            let mut keys = Vec::new();
            let mut continuation_token: Option<String> = None;
            loop {
                let output = client
                    .list_objects_v2()
                    .bucket(&bucket)
                    .prefix(&prefix)
                    .set_continuation_token(continuation_token.take())
                    .send()
                    .await
                    .map_err(|error| {
                        format!("failed to list objects: {}", DisplayErrorContext(error))
                    })?;
                keys.extend(
                    output
                        .contents()
                        .iter()
                        .filter_map(|object| object.key().map(str::to_string)),
                );
                match output.next_continuation_token() {
                    Some(token) if output.is_truncated().unwrap_or(false) => {
                        continuation_token = Some(token.to_string());
                    }
                    _ => break,
                }
            }
            Ok(keys)
        })
    }
}

struct DynamoPlaceTable {
    dynamodb_client: aws_sdk_dynamodb::Client,
}

impl PlaceTable for DynamoPlaceTable {
    fn places_for_day(&self, table: &str, partition: &str) -> Result<Vec<String>, String> {
        let client = self.dynamodb_client.clone();
        let table = table.to_string();
        let partition = partition.to_string();
        run_blocking(async move {
            let mut places = Vec::new();
            let mut start_key: Option<HashMap<String, AttributeValue>> = None;
            loop {
                let output = client
                    .query()
                    .table_name(&table)
                    .key_condition_expression("#ts = :day")
                    .projection_expression("#place")
                    .expression_attribute_names("#ts", PLACE_PARTITION_ATTRIBUTE)
                    .expression_attribute_names("#place", PLACE_VALUE_ATTRIBUTE)
                    .expression_attribute_values(":day", AttributeValue::S(partition.clone()))
                    .set_exclusive_start_key(start_key.take())
                    .send()
                    .await
                    .map_err(|error| {
                        format!(
                            "failed to query place table: {}",
                            aws_sdk_dynamodb::error::DisplayErrorContext(error)
                        )
                    })?;
                places.extend(output.items().iter().filter_map(|item| {
                    item.get(PLACE_VALUE_ATTRIBUTE)
                        .and_then(|value| value.as_s().ok())
                        .cloned()
                }));
                match output.last_evaluated_key() {
                    Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                    _ => break,
                }
            }
            Ok(places)
        })
    }

    fn put_status_marker(&self, table: &str, marker: &StatusMarker) -> Result<(), String> {
        let request = self
            .dynamodb_client
            .put_item()
            .table_name(table)
            .item("key", AttributeValue::S(marker.key.clone()))
            .item("Result", AttributeValue::S(marker.result.clone()))
            .item("Timestamp", AttributeValue::S(marker.timestamp.clone()));
        run_blocking(async move {
            request.send().await.map(|_| ()).map_err(|error| {
                format!(
                    "failed to write status marker: {}",
                    aws_sdk_dynamodb::error::DisplayErrorContext(error)
                )
            })
        })
    }
}

struct CloudFrontInvalidator {
    cloudfront_client: aws_sdk_cloudfront::Client,
}

impl CdnInvalidator for CloudFrontInvalidator {
    fn create_invalidation(
        &self,
        distribution_id: &str,
        paths: &[String],
        caller_reference: &str,
    ) -> Result<String, String> {
        let paths = Paths::builder()
            .quantity(paths.len() as i32)
            .set_items(Some(paths.to_vec()))
            .build()
            .map_err(|error| format!("invalid invalidation paths: {error}"))?;
        let batch = InvalidationBatch::builder()
            .paths(paths)
            .caller_reference(caller_reference)
            .build()
            .map_err(|error| format!("invalid invalidation batch: {error}"))?;
        let request = self
            .cloudfront_client
            .create_invalidation()
            .distribution_id(distribution_id)
            .invalidation_batch(batch);
        run_blocking(async move {
            let output = request.send().await.map_err(|error| {
                format!(
                    "failed to create invalidation: {}",
                    aws_sdk_cloudfront::error::DisplayErrorContext(error)
                )
            })?;
            Ok(output
                .invalidation()
                .map(|invalidation| invalidation.id().to_string())
                .unwrap_or_default())
        })
    }
}

struct Backends {
    objects: S3ObjectStore,
    places: DynamoPlaceTable,
    cdn: CloudFrontInvalidator,
    converter: RasterJpegConverter,
}

impl Backends {
    async fn load(region: &str) -> Self {
        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;
        Self {
            objects: S3ObjectStore {
                s3_client: aws_sdk_s3::Client::new(&aws_config),
            },
            places: DynamoPlaceTable {
                dynamodb_client: aws_sdk_dynamodb::Client::new(&aws_config),
            },
            cdn: CloudFrontInvalidator {
                cloudfront_client: aws_sdk_cloudfront::Client::new(&aws_config),
            },
            converter: RasterJpegConverter,
        }
    }

    fn dependencies(&self) -> RunDependencies<'_> {
        RunDependencies {
            objects: &self.objects,
            places: &self.places,
            cdn: &self.cdn,
            converter: &self.converter,
        }
    }
}

async fn handle_request(
    event: LambdaEvent<serde_json::Value>,
    backends: &Backends,
) -> Result<ProcessorResponse, Error> {
    log_info(
        "image_processor",
        "invocation_received",
        json!({
            "request_id": event.context.request_id,
            "source": event.payload.get("source").cloned(),
        }),
    );

    let config = ProcessorConfig::from_env();
    let now = Utc::now();
    Ok(handle_daily_run(&config, &now, backends.dependencies()))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = ProcessorConfig::from_env();
    let backends = Backends::load(&config.region).await;
    let backends = &backends;
    lambda_runtime::run(service_fn(move |event| handle_request(event, backends))).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_source_escapes_keys_but_keeps_separators() {
        assert_eq!(
            copy_source("masrikdahir-image", "New York/IMG 1+2.jpg"),
            "masrikdahir-image/New%20York/IMG%201%2B2.jpg"
        );
        assert_eq!(
            copy_source("bucket", "café/a_b-c.~d.png"),
            "bucket/caf%C3%A9/a_b-c.~d.png"
        );
    }
}
