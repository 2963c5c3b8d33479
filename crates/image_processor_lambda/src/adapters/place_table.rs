use image_processor_core::contract::StatusMarker;

pub trait PlaceTable {
    /// Raw `place` values stored under the given day partition.
    fn places_for_day(&self, table: &str, partition: &str) -> Result<Vec<String>, String>;

    fn put_status_marker(&self, table: &str, marker: &StatusMarker) -> Result<(), String>;
}
