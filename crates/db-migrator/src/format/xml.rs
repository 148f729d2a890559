//! XML entries.
//!
//! ```xml
//! <rows xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
//!   <columns><column name="id" variant="string"/></columns>
//!   <row><c>1</c></row>
//!   <row><c xsi:nil="true"/></row>
//! </rows>
//! ```
//!
//! Text is escaped by the XML writer and unescaped on read; binary columns
//! are hex encoded so the file stays editable.

use std::borrow::Cow;
use std::io::{BufReader, Read, Write};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use super::{check_width, decode_text, encode_text, FormatColumn, FormatType, InputFormat, OutputFormat};
use crate::core::value::{Value, ValueType};
use crate::error::{MigrateError, Result};

const ROWS: &str = "rows";
const COLUMNS: &str = "columns";
const COLUMN: &str = "column";
const ROW: &str = "row";
const CELL: &str = "c";
const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

pub struct XmlOutput<W: Write> {
    entry: String,
    writer: Writer<W>,
    value_types: Vec<ValueType>,
}

impl<W: Write> XmlOutput<W> {
    pub fn new(entry: &str, sink: W) -> Self {
        Self {
            entry: entry.to_string(),
            writer: Writer::new(sink),
            value_types: Vec::new(),
        }
    }

    fn write(&mut self, event: Event<'_>) -> Result<()> {
        self.writer
            .write_event(event)
            .map_err(|e| MigrateError::format(&self.entry, e))
    }

    fn newline(&mut self) -> Result<()> {
        self.writer.get_mut().write_all(b"\n")?;
        Ok(())
    }
}

impl<W: Write + Send> OutputFormat for XmlOutput<W> {
    fn format_type(&self) -> FormatType {
        FormatType::Xml
    }

    fn write_start(&mut self, columns: &[FormatColumn]) -> Result<()> {
        self.value_types = columns.iter().map(|c| c.value_type).collect();
        self.write(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        self.newline()?;
        let mut rows = BytesStart::new(ROWS);
        rows.push_attribute(("xmlns:xsi", XSI_NAMESPACE));
        self.write(Event::Start(rows))?;
        self.newline()?;
        self.write(Event::Start(BytesStart::new(COLUMNS)))?;
        for column in columns {
            let mut element = BytesStart::new(COLUMN);
            element.push_attribute(("name", column.name.as_str()));
            element.push_attribute(("variant", column.value_type.as_str()));
            self.write(Event::Empty(element))?;
        }
        self.write(Event::End(BytesEnd::new(COLUMNS)))?;
        self.newline()
    }

    fn write_row(&mut self, values: &[Value]) -> Result<()> {
        check_width(&self.entry, self.value_types.len(), values.len())?;
        self.write(Event::Start(BytesStart::new(ROW)))?;
        for i in 0..values.len() {
            match encode_text(&values[i], self.value_types[i]) {
                None => {
                    let mut cell = BytesStart::new(CELL);
                    cell.push_attribute(("xsi:nil", "true"));
                    self.write(Event::Empty(cell))?;
                }
                Some(text) => {
                    self.write(Event::Start(BytesStart::new(CELL)))?;
                    self.write(Event::Text(BytesText::new(&text)))?;
                    self.write(Event::End(BytesEnd::new(CELL)))?;
                }
            }
        }
        self.write(Event::End(BytesEnd::new(ROW)))?;
        self.newline()
    }

    fn write_end(&mut self) -> Result<()> {
        self.write(Event::End(BytesEnd::new(ROWS)))?;
        self.newline()?;
        self.writer.get_mut().flush()?;
        Ok(())
    }
}

pub struct XmlInput<R: Read> {
    entry: String,
    reader: Reader<BufReader<R>>,
    value_types: Vec<ValueType>,
    finished: bool,
}

impl<R: Read> XmlInput<R> {
    pub fn new(entry: &str, source: R) -> Self {
        let mut reader = Reader::from_reader(BufReader::new(source));
        reader.config_mut().trim_text(false);
        Self {
            entry: entry.to_string(),
            reader,
            value_types: Vec::new(),
            finished: false,
        }
    }

    fn error(&self, message: impl ToString) -> MigrateError {
        MigrateError::format(&self.entry, message)
    }

    /// Text content up to the closing `</c>`.
    fn read_cell_text(&mut self) -> Result<String> {
        let mut buf = Vec::new();
        let mut text = String::new();
        loop {
            match self.reader.read_event_into(&mut buf) {
                Ok(Event::Text(t)) => {
                    let unescaped = t.unescape().map_err(|e| MigrateError::format(&self.entry, e))?;
                    text.push_str(&unescaped);
                }
                Ok(Event::CData(t)) => text.push_str(&String::from_utf8_lossy(&t)),
                Ok(Event::End(e)) if e.name().as_ref() == CELL.as_bytes() => return Ok(text),
                Ok(Event::Eof) => return Err(MigrateError::format(&self.entry, "unexpected end inside cell")),
                Err(e) => return Err(MigrateError::format(&self.entry, e)),
                _ => {}
            }
            buf.clear();
        }
    }

    fn cell(&self, text: &str, index: usize) -> Result<Value> {
        let value_type = self
            .value_types
            .get(index)
            .copied()
            .ok_or_else(|| self.error(format!("row has more than {} cells", self.value_types.len())))?;
        decode_text(&self.entry, text, value_type)
    }
}

fn attribute(element: &BytesStart<'_>, local_name: &[u8]) -> Result<Option<String>> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| MigrateError::Xml(e.to_string()))?;
        if attr.key.local_name().as_ref() == local_name {
            let value: Cow<'_, str> = attr.unescape_value()?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn is_nil(element: &BytesStart<'_>) -> Result<bool> {
    Ok(attribute(element, b"nil")?.is_some_and(|v| v == "true"))
}

impl<R: Read + Send> InputFormat for XmlInput<R> {
    fn format_type(&self) -> FormatType {
        FormatType::Xml
    }

    fn read_header(&mut self) -> Result<Vec<FormatColumn>> {
        let mut buf = Vec::new();
        let mut columns = Vec::new();
        loop {
            match self.reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == COLUMN.as_bytes() => {
                    let name = attribute(&e, b"name")?
                        .ok_or_else(|| MigrateError::format(&self.entry, "column element without a name"))?;
                    let variant = attribute(&e, b"variant")?;
                    columns.push(FormatColumn::new(name, ValueType::from_alias(variant.as_deref())));
                }
                Ok(Event::End(e)) if e.name().as_ref() == COLUMNS.as_bytes() => break,
                Ok(Event::Empty(e)) if e.name().as_ref() == COLUMNS.as_bytes() => break,
                Ok(Event::Eof) => return Err(self.error("missing columns element")),
                Err(e) => return Err(self.error(e)),
                _ => {}
            }
            buf.clear();
        }
        self.value_types = columns.iter().map(|c| c.value_type).collect();
        Ok(columns)
    }

    fn read_row(&mut self) -> Result<Option<Vec<Value>>> {
        if self.finished {
            return Ok(None);
        }
        let mut buf = Vec::new();
        let mut row: Option<Vec<Value>> = None;
        loop {
            let event = self.reader.read_event_into(&mut buf);
            match event {
                Ok(Event::Start(e)) if e.name().as_ref() == ROW.as_bytes() => row = Some(Vec::new()),
                Ok(Event::Empty(e)) if e.name().as_ref() == ROW.as_bytes() => {
                    check_width(&self.entry, self.value_types.len(), 0)?;
                    return Ok(Some(Vec::new()));
                }
                Ok(Event::Start(e)) if e.name().as_ref() == CELL.as_bytes() => {
                    let nil = is_nil(&e)?;
                    let index = row.as_ref().map_or(0, Vec::len);
                    let value = if nil {
                        self.read_cell_text()?;
                        Value::Null
                    } else {
                        let text = self.read_cell_text()?;
                        self.cell(&text, index)?
                    };
                    row.get_or_insert_with(Vec::new).push(value);
                }
                Ok(Event::Empty(e)) if e.name().as_ref() == CELL.as_bytes() => {
                    let index = row.as_ref().map_or(0, Vec::len);
                    let value = if is_nil(&e)? { Value::Null } else { self.cell("", index)? };
                    row.get_or_insert_with(Vec::new).push(value);
                }
                Ok(Event::End(e)) if e.name().as_ref() == ROW.as_bytes() => {
                    let values = row.take().unwrap_or_default();
                    check_width(&self.entry, self.value_types.len(), values.len())?;
                    return Ok(Some(values));
                }
                Ok(Event::End(e)) if e.name().as_ref() == ROWS.as_bytes() => {
                    self.finished = true;
                    return Ok(None);
                }
                Ok(Event::Eof) => {
                    return Err(match row {
                        Some(_) => self.error("unexpected end inside row"),
                        None => self.error("entry ends without its end marker"),
                    });
                }
                Err(e) => return Err(self.error(e)),
                _ => {}
            }
            buf.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::tests::{columns, encode};

    #[test]
    fn test_xml_wire_form() {
        let rows = vec![vec![Value::string("1"), Value::string("a<b & c"), Value::Null]];
        let text = String::from_utf8(encode(FormatType::Xml, &columns(), &rows)).unwrap();
        assert!(text.contains("<column name=\"payload\" variant=\"binary\"/>"));
        assert!(text.contains("<row><c>1</c><c>a&lt;b &amp; c</c><c xsi:nil=\"true\"/></row>"));
        assert!(text.trim_end().ends_with("</rows>"));
    }

    #[test]
    fn test_xml_variant_defaults_to_string() {
        let data = "<rows><columns><column name=\"a\"/></columns><row><c>x</c></row></rows>";
        let mut input = XmlInput::new("t", data.as_bytes());
        assert_eq!(input.read_header().unwrap(), vec![FormatColumn::string("a")]);
        assert_eq!(input.read_row().unwrap(), Some(vec![Value::string("x")]));
        assert_eq!(input.read_row().unwrap(), None);
    }

    #[test]
    fn test_xml_column_without_name() {
        let data = "<rows><columns><column variant=\"binary\"/></columns></rows>";
        let mut input = XmlInput::new("t", data.as_bytes());
        assert!(matches!(input.read_header(), Err(MigrateError::Format { .. })));
    }

    #[test]
    fn test_xml_missing_rows_end_is_an_error() {
        let rows = vec![vec![Value::string("1"), Value::string("a"), Value::Null]];
        let text = String::from_utf8(encode(FormatType::Xml, &columns(), &rows)).unwrap();
        let cut = text.rfind("</rows>").unwrap();
        let mut input = XmlInput::new("t", text[..cut].as_bytes());
        input.read_header().unwrap();
        assert_eq!(input.read_row().unwrap(), Some(rows[0].clone()));
        match input.read_row() {
            Err(MigrateError::Format { entry, message }) => {
                assert_eq!(entry, "t");
                assert!(message.contains("end marker"));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_xml_truncated_row() {
        let data = "<rows><columns><column name=\"a\"/></columns><row><c>x</c>";
        let mut input = XmlInput::new("t", data.as_bytes());
        input.read_header().unwrap();
        assert!(input.read_row().is_err());
    }
}
