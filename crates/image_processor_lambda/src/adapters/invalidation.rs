pub trait CdnInvalidator {
    /// Returns the provider's invalidation id.
    fn create_invalidation(
        &self,
        distribution_id: &str,
        paths: &[String],
        caller_reference: &str,
    ) -> Result<String, String>;
}
