//! File-backed implementations of the core storage seams.

pub mod csv_storage;
pub mod error;
pub mod file_provider;
pub mod json_store;

pub use csv_storage::CsvStorage;
pub use error::DataError;
pub use file_provider::FileSnapshotProvider;
pub use json_store::JsonFileStore;
