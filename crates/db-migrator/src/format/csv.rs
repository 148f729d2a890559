//! Delimited text entries.
//!
//! The first record holds the column names. NULL is written as `\N`; a string
//! that itself starts with a backslash gets one more so it cannot be mistaken
//! for the marker. Binary columns are hex encoded.

use std::io::{Read, Write};

use ::csv::{ReaderBuilder, StringRecord, Writer, WriterBuilder};

use super::{check_width, decode_text, encode_text, FormatColumn, FormatType, InputFormat, OutputFormat};
use crate::core::value::{Value, ValueType};
use crate::error::{MigrateError, Result};

const NULL_MARKER: &str = "\\N";

pub struct CsvOutput<W: Write> {
    entry: String,
    writer: Writer<W>,
    value_types: Vec<ValueType>,
}

impl<W: Write> CsvOutput<W> {
    pub fn new(entry: &str, sink: W) -> Self {
        Self {
            entry: entry.to_string(),
            writer: WriterBuilder::new().has_headers(false).from_writer(sink),
            value_types: Vec::new(),
        }
    }

    fn error(&self, err: impl ToString) -> MigrateError {
        MigrateError::format(&self.entry, err)
    }
}

fn escape(value: &Value, value_type: ValueType) -> String {
    match encode_text(value, value_type) {
        None => NULL_MARKER.to_string(),
        Some(text) if text.starts_with('\\') => format!("\\{}", text),
        Some(text) => text,
    }
}

impl<W: Write + Send> OutputFormat for CsvOutput<W> {
    fn format_type(&self) -> FormatType {
        FormatType::Csv
    }

    fn write_start(&mut self, columns: &[FormatColumn]) -> Result<()> {
        self.value_types = columns.iter().map(|c| c.value_type).collect();
        self.writer
            .write_record(columns.iter().map(|c| c.name.as_str()))
            .map_err(|e| self.error(e))
    }

    fn write_row(&mut self, values: &[Value]) -> Result<()> {
        check_width(&self.entry, self.value_types.len(), values.len())?;
        let record: Vec<String> = values
            .iter()
            .zip(&self.value_types)
            .map(|(value, value_type)| escape(value, *value_type))
            .collect();
        self.writer.write_record(&record).map_err(|e| self.error(e))
    }

    fn write_end(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

pub struct CsvInput<R: Read> {
    entry: String,
    reader: ::csv::Reader<R>,
    declared: Vec<FormatColumn>,
    value_types: Vec<ValueType>,
    record: StringRecord,
}

impl<R: Read> CsvInput<R> {
    pub fn new(entry: &str, source: R, declared: &[FormatColumn]) -> Self {
        Self {
            entry: entry.to_string(),
            reader: ReaderBuilder::new().has_headers(false).from_reader(source),
            declared: declared.to_vec(),
            value_types: Vec::new(),
            record: StringRecord::new(),
        }
    }

    fn next_record(&mut self) -> Result<bool> {
        self.reader
            .read_record(&mut self.record)
            .map_err(|e| MigrateError::format(&self.entry, e))
    }

    /// Variant of the column named `name` at `index` in the header.
    fn declared_type(&self, index: usize, name: &str) -> ValueType {
        self.declared
            .iter()
            .find(|c| c.name == name)
            .or_else(|| self.declared.get(index))
            .map(|c| c.value_type)
            .unwrap_or_default()
    }
}

impl<R: Read + Send> InputFormat for CsvInput<R> {
    fn format_type(&self) -> FormatType {
        FormatType::Csv
    }

    fn read_header(&mut self) -> Result<Vec<FormatColumn>> {
        if !self.next_record()? {
            return Err(MigrateError::format(&self.entry, "missing header record"));
        }
        let names: Vec<String> = self.record.iter().map(str::to_string).collect();
        let columns: Vec<FormatColumn> = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let value_type = self.declared_type(i, &name);
                FormatColumn::new(name, value_type)
            })
            .collect();
        self.value_types = columns.iter().map(|c| c.value_type).collect();
        Ok(columns)
    }

    fn read_row(&mut self) -> Result<Option<Vec<Value>>> {
        if !self.next_record()? {
            return Ok(None);
        }
        check_width(&self.entry, self.value_types.len(), self.record.len())?;
        let mut values = Vec::with_capacity(self.record.len());
        for (field, value_type) in self.record.iter().zip(&self.value_types) {
            let value = if field == NULL_MARKER {
                Value::Null
            } else {
                let text = field.strip_prefix('\\').unwrap_or(field);
                decode_text(&self.entry, text, *value_type)?
            };
            values.push(value);
        }
        Ok(Some(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::tests::{columns, encode};

    #[test]
    fn test_csv_wire_form() {
        let rows = vec![
            vec![Value::string("1"), Value::string("a,b"), Value::binary(vec![0xde, 0xad])],
            vec![Value::string("\\x"), Value::Null, Value::Null],
        ];
        let text = String::from_utf8(encode(FormatType::Csv, &columns(), &rows)).unwrap();
        assert_eq!(text, "id,note,payload\n1,\"a,b\",dead\n\\\\x,\\N,\\N\n");
    }

    #[test]
    fn test_csv_uses_declared_variants_by_name() {
        let data = "payload,id\nff00,7\n";
        let declared = columns();
        let mut input = CsvInput::new("t", data.as_bytes(), &declared);
        let header = input.read_header().unwrap();
        assert_eq!(header[0], FormatColumn::new("payload", ValueType::Binary));
        assert_eq!(header[1], FormatColumn::string("id"));
        assert_eq!(
            input.read_row().unwrap(),
            Some(vec![Value::binary(vec![0xff, 0x00]), Value::string("7")])
        );
    }

    #[test]
    fn test_csv_rejects_bad_hex() {
        let data = "id,note,payload\n1,x,zz\n";
        let mut input = CsvInput::new("t", data.as_bytes(), &columns());
        input.read_header().unwrap();
        assert!(matches!(input.read_row(), Err(MigrateError::Format { .. })));
    }

    #[test]
    fn test_csv_missing_header() {
        let mut input = CsvInput::new("t", "".as_bytes(), &[]);
        assert!(input.read_header().is_err());
    }
}
