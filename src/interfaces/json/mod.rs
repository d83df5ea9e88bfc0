pub mod field_reader;
pub mod field_writer;
