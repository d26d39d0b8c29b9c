//! Export of result tables

pub mod csv;

pub use self::csv::{rows_to_csv, write_csv_file, write_rows};
