use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const STATUS_RESULT_SUCCESS: &str = "Success";
pub const QUERY_FAILURE_MESSAGE: &str = "Failed to query DynamoDB";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessorResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

impl ProcessorResponse {
    pub fn ok(message: &str) -> Self {
        Self {
            status_code: 200,
            body: encode_body(message),
        }
    }

    pub fn error(status_code: u16, message: &str) -> Self {
        Self {
            status_code,
            body: encode_body(message),
        }
    }
}

/// Completion record written to the status table after every run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusMarker {
    pub key: String,
    #[serde(rename = "Result")]
    pub result: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
}

impl StatusMarker {
    pub fn success(key: &str, now: DateTime<Utc>) -> Self {
        Self {
            key: key.to_string(),
            result: STATUS_RESULT_SUCCESS.to_string(),
            timestamp: now.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ValidationError {}

pub fn completion_body(success_count: usize, total_places: usize) -> String {
    format!("Copied and processed {success_count} of {total_places} images.")
}

/// Partition key value the uploader writes for a given day.
pub fn place_partition(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d").to_string()
}

pub fn invalidation_caller_reference(now: DateTime<Utc>) -> String {
    format!("{}.{:06}", now.timestamp(), now.timestamp_subsec_micros())
}

pub fn contract_fingerprint(value: impl Serialize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(stable_contract_json(value));
    format!("{:x}", hasher.finalize())
}

pub fn stable_contract_json(value: impl Serialize) -> String {
    serde_json::to_string(&value).expect("serialization of contract value should not fail")
}

fn encode_body(message: &str) -> String {
    serde_json::Value::String(message.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn sample_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 7, 14, 5, 9)
            .single()
            .expect("valid timestamp")
    }

    #[test]
    fn response_body_is_a_json_string() {
        let response = ProcessorResponse::ok(&completion_body(3, 5));
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body, "\"Copied and processed 3 of 5 images.\"");

        let value = serde_json::to_value(&response).expect("response should serialize");
        assert_eq!(value["statusCode"], 200);
    }

    #[test]
    fn query_failure_response_matches_contract() {
        let response = ProcessorResponse::error(500, QUERY_FAILURE_MESSAGE);
        assert_eq!(response.status_code, 500);
        assert_eq!(response.body, "\"Failed to query DynamoDB\"");
    }

    #[test]
    fn status_marker_uses_microsecond_utc_timestamp() {
        let marker = StatusMarker::success("ImageProcessor", sample_now());
        assert_eq!(marker.timestamp, "2025-03-07T14:05:09.000000Z");
        let value = serde_json::to_value(&marker).expect("marker should serialize");
        assert_eq!(value["Result"], "Success");
        assert_eq!(value["key"], "ImageProcessor");
    }

    #[test]
    fn place_partition_is_compact_date() {
        assert_eq!(place_partition(sample_now()), "20250307");
    }

    #[test]
    fn fingerprint_is_stable_for_equal_values() {
        let a = contract_fingerprint(serde_json::json!({"a": 1, "b": [1, 2]}));
        let b = contract_fingerprint(serde_json::json!({"a": 1, "b": [1, 2]}));
        let c = contract_fingerprint(serde_json::json!({"a": 1, "b": [2, 1]}));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
