pub mod invalidation;
pub mod jpeg;
pub mod object_store;
pub mod place_table;
