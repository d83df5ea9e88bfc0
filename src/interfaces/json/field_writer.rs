use crate::error::Result;
use serde::Serialize;
use std::io::Write;

/// Writes request forms, payments and gateway field sets as pretty JSON.
pub struct FieldWriter<W: Write> {
    writer: W,
}

impl<W: Write> FieldWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        serde_json::to_writer_pretty(&mut self.writer, value)?;
        writeln!(self.writer)?;
        self.writer.flush()?;
        Ok(())
    }
}
