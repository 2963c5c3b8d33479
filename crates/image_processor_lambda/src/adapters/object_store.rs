/// Bucket-level object operations the daily run needs.
pub trait ObjectStore {
    fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, String>;

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        content_type: &str,
    ) -> Result<(), String>;

    fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> Result<(), String>;

    fn delete_object(&self, bucket: &str, key: &str) -> Result<(), String>;

    /// Every key under `prefix`, across all listing pages.
    fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, String>;
}
