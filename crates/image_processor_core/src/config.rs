use serde::{Deserialize, Serialize};

use crate::descriptor::{
    CLOUDFRONT_DISTRIBUTION_ID, DEST_BUCKET, REGION_NAME, SECRET_NAME, SOURCE_BUCKET,
};

pub const DEFAULT_PLACE_TABLE: &str = "masrikdahir_image_place";
pub const DEFAULT_STATUS_TABLE: &str = "last_updated";
pub const DEFAULT_STATUS_KEY: &str = "ImageProcessor";
pub const DEFAULT_CATALOG_KEY: &str = "Json/image.json";
pub const INVALIDATION_PATH: &str = "/*";

/// Runtime settings for one handler invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessorConfig {
    pub region: String,
    pub secret_name: String,
    pub place_table: String,
    pub status_table: String,
    pub status_key: String,
    pub source_bucket: String,
    pub dest_bucket: String,
    pub distribution_id: String,
    pub catalog_key: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            region: REGION_NAME.to_string(),
            secret_name: SECRET_NAME.to_string(),
            place_table: DEFAULT_PLACE_TABLE.to_string(),
            status_table: DEFAULT_STATUS_TABLE.to_string(),
            status_key: DEFAULT_STATUS_KEY.to_string(),
            source_bucket: SOURCE_BUCKET.to_string(),
            dest_bucket: DEST_BUCKET.to_string(),
            distribution_id: CLOUDFRONT_DISTRIBUTION_ID.to_string(),
            catalog_key: DEFAULT_CATALOG_KEY.to_string(),
        }
    }
}

impl ProcessorConfig {
    /// Builds the config from a variable lookup; unset or blank variables
    /// keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let read = |name: &str, fallback: String| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or(fallback)
        };

        Self {
            region: read("REGION_NAME", defaults.region),
            secret_name: read("SECRET_NAME", defaults.secret_name),
            place_table: read("PLACE_TABLE", defaults.place_table),
            status_table: read("STATUS_TABLE", defaults.status_table),
            status_key: read("STATUS_KEY", defaults.status_key),
            source_bucket: read("SOURCE_BUCKET", defaults.source_bucket),
            dest_bucket: read("DEST_BUCKET", defaults.dest_bucket),
            distribution_id: read("CLOUDFRONT_DISTRIBUTION_ID", defaults.distribution_id),
            catalog_key: read("CATALOG_KEY", defaults.catalog_key),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn empty_environment_uses_deployment_defaults() {
        let config = ProcessorConfig::from_lookup(|_| None);
        assert_eq!(config, ProcessorConfig::default());
        assert_eq!(config.place_table, "masrikdahir_image_place");
        assert_eq!(config.catalog_key, "Json/image.json");
    }

    #[test]
    fn overrides_apply_and_blanks_are_ignored() {
        let env = HashMap::from([
            ("REGION_NAME", "eu-west-1"),
            ("DEST_BUCKET", "gallery-bucket"),
            ("STATUS_TABLE", "   "),
        ]);
        let config =
            ProcessorConfig::from_lookup(|name| env.get(name).map(|value| value.to_string()));

        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.dest_bucket, "gallery-bucket");
        assert_eq!(config.status_table, "last_updated");
    }
}
