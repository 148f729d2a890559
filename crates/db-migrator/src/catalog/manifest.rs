//! `catalog.xml` reading and writing.

use std::io::{BufRead, Write};

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use super::{Catalog, CatalogEntry, EntryType};
use crate::core::value::ValueType;
use crate::error::{MigrateError, Result};
use crate::format::{FormatColumn, FormatType};

const CATALOG: &[u8] = b"catalog";
const ENTRY: &[u8] = b"entry";
const COLUMN: &[u8] = b"column";

fn write_event<W: Write>(writer: &mut Writer<W>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| MigrateError::Catalog(format!("cannot write manifest: {}", e)))
}

pub(super) fn write_manifest<W: Write>(catalog: &Catalog, sink: W) -> Result<()> {
    let mut writer = Writer::new_with_indent(sink, b' ', 2);
    write_event(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new("catalog");
    root.push_attribute(("version", catalog.version.as_str()));
    root.push_attribute(("created", catalog.created.to_rfc3339().as_str()));
    write_event(&mut writer, Event::Start(root))?;

    for entry in &catalog.entries {
        let mut element = BytesStart::new("entry");
        element.push_attribute(("name", entry.name.as_str()));
        element.push_attribute(("format", entry.format.name()));
        element.push_attribute(("type", entry.entry_type.as_str()));
        if let Some(source) = &entry.source {
            element.push_attribute(("source", source.as_str()));
        }
        if let Some(rows) = entry.rows {
            element.push_attribute(("rows", rows.to_string().as_str()));
        }
        if entry.columns.is_empty() {
            write_event(&mut writer, Event::Empty(element))?;
            continue;
        }
        write_event(&mut writer, Event::Start(element))?;
        for column in &entry.columns {
            let mut element = BytesStart::new("column");
            element.push_attribute(("name", column.name.as_str()));
            element.push_attribute(("variant", column.value_type.as_str()));
            write_event(&mut writer, Event::Empty(element))?;
        }
        write_event(&mut writer, Event::End(BytesEnd::new("entry")))?;
    }

    write_event(&mut writer, Event::End(BytesEnd::new("catalog")))?;
    writer.get_mut().write_all(b"\n")?;
    writer.get_mut().flush()?;
    Ok(())
}

fn attributes(element: &BytesStart<'_>) -> Result<Vec<(Vec<u8>, String)>> {
    let mut result = Vec::new();
    for attr in element.attributes() {
        let attr = attr.map_err(|e| MigrateError::Xml(e.to_string()))?;
        let value = attr.unescape_value()?.into_owned();
        result.push((attr.key.as_ref().to_vec(), value));
    }
    Ok(result)
}

fn find<'a>(attributes: &'a [(Vec<u8>, String)], key: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|(k, _)| k.as_slice() == key.as_bytes())
        .map(|(_, v)| v.as_str())
}

fn required<'a>(attributes: &'a [(Vec<u8>, String)], key: &str, element: &str) -> Result<&'a str> {
    find(attributes, key).ok_or_else(|| MigrateError::Catalog(format!("<{}> is missing the {} attribute", element, key)))
}

fn parse_entry(element: &BytesStart<'_>) -> Result<CatalogEntry> {
    let attrs = attributes(element)?;
    let name = required(&attrs, "name", "entry")?;
    let format = required(&attrs, "format", "entry")?;
    let format = FormatType::from_name(format)
        .ok_or_else(|| MigrateError::Catalog(format!("entry {} has unknown format {}", name, format)))?;
    let entry_type = match find(&attrs, "type") {
        Some(t) => EntryType::from_name(t)
            .ok_or_else(|| MigrateError::Catalog(format!("entry {} has unknown type {}", name, t)))?,
        None => EntryType::Table,
    };
    let rows = match find(&attrs, "rows") {
        Some(rows) => Some(
            rows.parse()
                .map_err(|_| MigrateError::Catalog(format!("entry {} has invalid row count {}", name, rows)))?,
        ),
        None => None,
    };
    Ok(CatalogEntry {
        name: name.to_string(),
        format,
        entry_type,
        source: find(&attrs, "source").map(str::to_string),
        rows,
        columns: Vec::new(),
    })
}

fn parse_column(element: &BytesStart<'_>) -> Result<FormatColumn> {
    let attrs = attributes(element)?;
    let name = required(&attrs, "name", "column")?;
    Ok(FormatColumn::new(name, ValueType::from_alias(find(&attrs, "variant"))))
}

pub(super) fn read_manifest<R: BufRead>(source: R) -> Result<Catalog> {
    let mut reader = Reader::from_reader(source);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut catalog: Option<Catalog> = None;
    let mut current: Option<CatalogEntry> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == CATALOG => {
                let attrs = attributes(&e)?;
                let created = match find(&attrs, "created") {
                    Some(created) => DateTime::parse_from_rfc3339(created)
                        .map_err(|err| MigrateError::Catalog(format!("invalid created timestamp {}: {}", created, err)))?
                        .with_timezone(&Utc),
                    None => Utc::now(),
                };
                catalog = Some(Catalog {
                    version: find(&attrs, "version").unwrap_or(super::CATALOG_VERSION).to_string(),
                    created,
                    entries: Vec::new(),
                });
            }
            Ok(Event::Start(e)) if e.name().as_ref() == ENTRY => current = Some(parse_entry(&e)?),
            Ok(Event::Empty(e)) if e.name().as_ref() == ENTRY => {
                let entry = parse_entry(&e)?;
                push_entry(catalog.as_mut(), entry)?;
            }
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == COLUMN => {
                let column = parse_column(&e)?;
                current
                    .as_mut()
                    .ok_or_else(|| MigrateError::Catalog("<column> outside of <entry>".into()))?
                    .columns
                    .push(column);
            }
            Ok(Event::End(e)) if e.name().as_ref() == ENTRY => {
                if let Some(entry) = current.take() {
                    push_entry(catalog.as_mut(), entry)?;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }

    catalog.ok_or_else(|| MigrateError::Catalog("manifest has no <catalog> element".into()))
}

fn push_entry(catalog: Option<&mut Catalog>, entry: CatalogEntry) -> Result<()> {
    catalog
        .ok_or_else(|| MigrateError::Catalog("<entry> outside of <catalog>".into()))?
        .entries
        .push(entry);
    Ok(())
}
