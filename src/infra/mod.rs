// Adapters implementing the application ports

pub mod csv_source;
pub mod file_exporter;
pub mod http_source;
pub mod json_source;
pub mod synthetic_source;

pub use csv_source::CsvSource;
pub use file_exporter::FileExporter;
pub use http_source::HttpJsonSource;
pub use json_source::JsonSource;
pub use synthetic_source::SyntheticSource;
