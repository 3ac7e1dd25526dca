//! Importing expenses and income from CSV files.

mod import_records;
mod parse;

pub use import_records::import_records_endpoint;
pub use parse::RecordKind;
