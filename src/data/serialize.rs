//! Serialized form of the installer database.
//!
//! The serialized form is a structured-text document with a root
//! `installerData` element carrying `type`, optional `codepage` (only written
//! when non-zero) and `version` attributes. The body holds one
//! `tableDefinitions` block, the `table` blocks sorted by name, and any
//! `subStorage` blocks. The writer always emits table definitions before any
//! table contents, which guarantees the loader's ordering precondition.
//!
//! Parsing is strict: unknown elements, a `table` element before any
//! `tableDefinitions` element, and truncated documents are all format errors.
//! The recorded format version is checked unless explicitly suppressed.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::data::{
    ColumnDefinition, ColumnKind, FieldValue, InstallerData, OutputType, Row, SubStorage, Table,
    TableDefinition,
};
use crate::messaging::SourcePosition;
use crate::Result;

/// Version of the serialized document format this library reads and writes.
pub const FORMAT_VERSION: &str = "4.0.0.0";

const ROOT_ELEMENT: &str = "installerData";

impl InstallerData {
    /// Saves this database to `path` in the serialized form.
    ///
    /// # Errors
    ///
    /// Returns an error when the destination cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let mut writer = Writer::new(std::io::BufWriter::new(file));
        write_data(self, &mut writer)
    }

    /// Renders this database as a serialized-form document string.
    ///
    /// # Errors
    ///
    /// Returns an error when serialization fails.
    pub fn to_document(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        write_data(self, &mut writer)?;
        String::from_utf8(writer.into_inner())
            .map_err(|e| malformed_error!("Serialized document is not valid UTF-8: {}", e))
    }

    /// Loads a database from a serialized-form document at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read, the document is
    /// malformed, or its recorded format version differs from
    /// [`FORMAT_VERSION`] and `suppress_version_check` is `false`.
    pub fn load(path: &Path, suppress_version_check: bool) -> Result<InstallerData> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text, &path.display().to_string(), suppress_version_check)
    }

    /// Parses a database from a serialized-form document string.
    ///
    /// `source_file` names the document for the database's own source
    /// position and for diagnostics.
    ///
    /// # Errors
    ///
    /// Returns an error when the document is malformed or fails the version
    /// check.
    pub fn parse(
        text: &str,
        source_file: &str,
        suppress_version_check: bool,
    ) -> Result<InstallerData> {
        let mut reader = Reader::from_str(text);

        loop {
            match read_event(&mut reader)? {
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) => {}
                Event::Text(text) if is_whitespace(&text) => {}
                Event::Start(start) => {
                    return read_data(
                        &mut reader,
                        &start,
                        false,
                        source_file,
                        suppress_version_check,
                    )
                }
                Event::Empty(start) => {
                    return read_data(
                        &mut reader,
                        &start,
                        true,
                        source_file,
                        suppress_version_check,
                    )
                }
                Event::Eof => {
                    return Err(malformed_error!(
                        "Document '{}' ended before its root element",
                        source_file
                    ))
                }
                _ => {
                    return Err(malformed_error!(
                        "Unexpected content before the root element of '{}'",
                        source_file
                    ))
                }
            }
        }
    }
}

// ------------------------------------------------------------------------
// Writing
// ------------------------------------------------------------------------

fn emit<W: Write>(writer: &mut Writer<W>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| crate::Error::Error(format!("Failed to write document: {e}")))
}

fn write_data<W: Write>(data: &InstallerData, writer: &mut Writer<W>) -> Result<()> {
    let mut root = BytesStart::new(ROOT_ELEMENT);
    root.push_attribute(("type", data.output_type.to_string().as_str()));
    if data.codepage != 0 {
        root.push_attribute(("codepage", data.codepage.to_string().as_str()));
    }
    root.push_attribute(("version", FORMAT_VERSION));
    emit(writer, Event::Start(root))?;

    let tables = data.sorted_tables();

    // The definitions block always precedes any table contents so the loader
    // can type row fields on first sight.
    emit(writer, Event::Start(BytesStart::new("tableDefinitions")))?;
    for table in &tables {
        write_table_definition(table.definition(), writer)?;
    }
    emit(writer, Event::End(BytesEnd::new("tableDefinitions")))?;

    for table in &tables {
        write_table(table, writer)?;
    }

    for substorage in &data.substorages {
        let mut element = BytesStart::new("subStorage");
        element.push_attribute(("name", substorage.name.as_str()));
        emit(writer, Event::Start(element))?;
        write_data(&substorage.data, writer)?;
        emit(writer, Event::End(BytesEnd::new("subStorage")))?;
    }

    emit(writer, Event::End(BytesEnd::new(ROOT_ELEMENT)))
}

fn write_table_definition<W: Write>(
    definition: &TableDefinition,
    writer: &mut Writer<W>,
) -> Result<()> {
    let mut element = BytesStart::new("tableDefinition");
    element.push_attribute(("name", definition.name.as_str()));
    if definition.unreal {
        element.push_attribute(("unreal", "yes"));
    }
    emit(writer, Event::Start(element))?;

    for column in &definition.columns {
        let mut element = BytesStart::new("columnDefinition");
        element.push_attribute(("name", column.name.as_str()));
        element.push_attribute(("type", column.kind.to_string().as_str()));
        if column.primary_key {
            element.push_attribute(("primaryKey", "yes"));
        }
        if column.nullable {
            element.push_attribute(("nullable", "yes"));
        }
        emit(writer, Event::Empty(element))?;
    }

    emit(writer, Event::End(BytesEnd::new("tableDefinition")))
}

fn write_table<W: Write>(table: &Table, writer: &mut Writer<W>) -> Result<()> {
    let mut element = BytesStart::new("table");
    element.push_attribute(("name", table.name()));
    emit(writer, Event::Start(element))?;

    for row in table.rows() {
        let mut element = BytesStart::new("row");
        if let Some(source) = row.source() {
            element.push_attribute(("sourceFile", source.file.as_str()));
            if let Some(line) = source.line {
                element.push_attribute(("sourceLine", line.to_string().as_str()));
            }
        }
        emit(writer, Event::Start(element))?;

        for field in row.fields() {
            match field {
                Some(value) => {
                    emit(writer, Event::Start(BytesStart::new("field")))?;
                    emit(writer, Event::Text(BytesText::new(&value.to_string())))?;
                    emit(writer, Event::End(BytesEnd::new("field")))?;
                }
                None => emit(writer, Event::Empty(BytesStart::new("field")))?,
            }
        }

        emit(writer, Event::End(BytesEnd::new("row")))?;
    }

    emit(writer, Event::End(BytesEnd::new("table")))
}

// ------------------------------------------------------------------------
// Reading
// ------------------------------------------------------------------------

fn read_event<'a>(reader: &mut Reader<&'a [u8]>) -> Result<Event<'a>> {
    reader
        .read_event()
        .map_err(|e| malformed_error!("Invalid document: {}", e))
}

fn is_whitespace(text: &BytesText<'_>) -> bool {
    text.iter().all(|byte| byte.is_ascii_whitespace())
}

fn attr_value(element: &BytesStart<'_>, key: &str) -> Result<Option<String>> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| malformed_error!("Invalid attribute: {}", e))?;
        if attr.key.as_ref() == key.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(|e| malformed_error!("Invalid attribute value: {}", e))?;
            return Ok(Some(value.into_owned()));
        }
    }

    Ok(None)
}

fn required_attr(element: &BytesStart<'_>, key: &str, source_file: &str) -> Result<String> {
    attr_value(element, key)?.ok_or_else(|| {
        malformed_error!(
            "Element '{}' in '{}' is missing its '{}' attribute",
            element_name(element),
            source_file,
            key
        )
    })
}

fn element_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.name().as_ref()).into_owned()
}

fn read_data(
    reader: &mut Reader<&[u8]>,
    root: &BytesStart<'_>,
    empty: bool,
    source_file: &str,
    suppress_version_check: bool,
) -> Result<InstallerData> {
    if root.name().as_ref() != ROOT_ELEMENT.as_bytes() {
        return Err(malformed_error!(
            "Unexpected root element '{}' in '{}'",
            element_name(root),
            source_file
        ));
    }

    let type_value = required_attr(root, "type", source_file)?;
    let output_type = OutputType::from_str(&type_value).map_err(|_| {
        malformed_error!("Unknown output type '{}' in '{}'", type_value, source_file)
    })?;

    let codepage = match attr_value(root, "codepage")? {
        Some(value) => value
            .parse::<i32>()
            .map_err(|_| malformed_error!("Invalid codepage '{}' in '{}'", value, source_file))?,
        None => 0,
    };

    if let Some(version) = attr_value(root, "version")? {
        if !suppress_version_check && version != FORMAT_VERSION {
            return Err(crate::Error::VersionMismatch {
                found: version,
                expected: FORMAT_VERSION.to_string(),
            });
        }
    }

    let mut data = InstallerData::new(output_type, Some(SourcePosition::new(source_file)));
    data.codepage = codepage;

    if empty {
        return Ok(data);
    }

    let mut definitions: Option<HashMap<String, TableDefinition>> = None;

    loop {
        match read_event(reader)? {
            Event::Comment(_) => {}
            Event::Text(text) if is_whitespace(&text) => {}
            Event::Start(element) if element.name().as_ref() == b"tableDefinitions" => {
                if definitions.is_some() {
                    return Err(malformed_error!(
                        "Duplicate tableDefinitions element in '{}'",
                        source_file
                    ));
                }
                let mut map = HashMap::new();
                read_table_definitions(reader, &mut map, source_file)?;
                definitions = Some(map);
            }
            Event::Empty(element) if element.name().as_ref() == b"tableDefinitions" => {
                if definitions.is_some() {
                    return Err(malformed_error!(
                        "Duplicate tableDefinitions element in '{}'",
                        source_file
                    ));
                }
                definitions = Some(HashMap::new());
            }
            Event::Start(element) if element.name().as_ref() == b"table" => {
                let Some(definitions) = definitions.as_ref() else {
                    return Err(malformed_error!(
                        "A table element appears before any tableDefinitions element in '{}'",
                        source_file
                    ));
                };
                let table = read_table(reader, &element, definitions, source_file)?;
                data.add_table(table)?;
            }
            Event::Start(element) if element.name().as_ref() == b"subStorage" => {
                let substorage =
                    read_substorage(reader, &element, source_file, suppress_version_check)?;
                data.substorages.push(substorage);
            }
            Event::End(end) if end.name().as_ref() == ROOT_ELEMENT.as_bytes() => {
                return Ok(data);
            }
            Event::Eof => {
                return Err(malformed_error!(
                    "Document '{}' ended before its root element was terminated",
                    source_file
                ))
            }
            Event::Start(element) | Event::Empty(element) => {
                return Err(malformed_error!(
                    "Unexpected element '{}' in '{}'",
                    element_name(&element),
                    source_file
                ))
            }
            _ => {
                return Err(malformed_error!(
                    "Unexpected content in the body of '{}'",
                    source_file
                ))
            }
        }
    }
}

fn read_table_definitions(
    reader: &mut Reader<&[u8]>,
    definitions: &mut HashMap<String, TableDefinition>,
    source_file: &str,
) -> Result<()> {
    loop {
        match read_event(reader)? {
            Event::Comment(_) => {}
            Event::Text(text) if is_whitespace(&text) => {}
            Event::Start(element) if element.name().as_ref() == b"tableDefinition" => {
                let definition = read_table_definition(reader, &element, false, source_file)?;
                definitions.insert(definition.name.clone(), definition);
            }
            Event::Empty(element) if element.name().as_ref() == b"tableDefinition" => {
                let definition = read_table_definition(reader, &element, true, source_file)?;
                definitions.insert(definition.name.clone(), definition);
            }
            Event::End(end) if end.name().as_ref() == b"tableDefinitions" => return Ok(()),
            Event::Eof => {
                return Err(malformed_error!(
                    "Document '{}' ended inside its tableDefinitions element",
                    source_file
                ))
            }
            other => {
                return Err(malformed_error!(
                    "Unexpected content inside tableDefinitions of '{}': {:?}",
                    source_file,
                    other
                ))
            }
        }
    }
}

fn read_table_definition(
    reader: &mut Reader<&[u8]>,
    element: &BytesStart<'_>,
    empty: bool,
    source_file: &str,
) -> Result<TableDefinition> {
    let name = required_attr(element, "name", source_file)?;
    let unreal = attr_value(element, "unreal")?.as_deref() == Some("yes");

    let mut definition = TableDefinition::new(name, Vec::new());
    definition.unreal = unreal;

    if empty {
        return Ok(definition);
    }

    loop {
        match read_event(reader)? {
            Event::Comment(_) => {}
            Event::Text(text) if is_whitespace(&text) => {}
            Event::Empty(element) | Event::Start(element)
                if element.name().as_ref() == b"columnDefinition" =>
            {
                // Column definitions are written as empty elements; tolerate
                // an expanded start/end pair as long as it has no children.
                let column_name = required_attr(&element, "name", source_file)?;
                let kind_value = required_attr(&element, "type", source_file)?;
                let kind = ColumnKind::from_str(&kind_value).map_err(|_| {
                    malformed_error!(
                        "Unknown column type '{}' in '{}'",
                        kind_value,
                        source_file
                    )
                })?;

                let mut column = ColumnDefinition::new(column_name, kind);
                column.primary_key = attr_value(&element, "primaryKey")?.as_deref() == Some("yes");
                column.nullable = attr_value(&element, "nullable")?.as_deref() == Some("yes");
                definition.columns.push(column);
            }
            Event::End(end) if end.name().as_ref() == b"columnDefinition" => {}
            Event::End(end) if end.name().as_ref() == b"tableDefinition" => {
                return Ok(definition)
            }
            Event::Eof => {
                return Err(malformed_error!(
                    "Document '{}' ended inside a tableDefinition element",
                    source_file
                ))
            }
            _ => {
                return Err(malformed_error!(
                    "Unexpected content inside a tableDefinition of '{}'",
                    source_file
                ))
            }
        }
    }
}

fn read_table(
    reader: &mut Reader<&[u8]>,
    element: &BytesStart<'_>,
    definitions: &HashMap<String, TableDefinition>,
    source_file: &str,
) -> Result<Table> {
    let name = required_attr(element, "name", source_file)?;
    let definition = definitions.get(&name).ok_or_else(|| {
        malformed_error!(
            "Table '{}' in '{}' has no matching table definition",
            name,
            source_file
        )
    })?;

    let mut table = Table::new(definition.clone());

    loop {
        match read_event(reader)? {
            Event::Comment(_) => {}
            Event::Text(text) if is_whitespace(&text) => {}
            Event::Start(element) if element.name().as_ref() == b"row" => {
                let row = read_row(reader, &element, table.definition(), source_file)?;
                table.add_row(row)?;
            }
            Event::Empty(element) if element.name().as_ref() == b"row" => {
                let source = read_row_source(&element)?;
                table.add_row(Row::from_parts(Vec::new(), source))?;
            }
            Event::End(end) if end.name().as_ref() == b"table" => return Ok(table),
            Event::Eof => {
                return Err(malformed_error!(
                    "Document '{}' ended inside table '{}'",
                    source_file,
                    name
                ))
            }
            _ => {
                return Err(malformed_error!(
                    "Unexpected content inside table '{}' of '{}'",
                    name,
                    source_file
                ))
            }
        }
    }
}

fn read_row_source(element: &BytesStart<'_>) -> Result<Option<SourcePosition>> {
    let Some(file) = attr_value(element, "sourceFile")? else {
        return Ok(None);
    };

    let line = match attr_value(element, "sourceLine")? {
        Some(value) => Some(
            value
                .parse::<u32>()
                .map_err(|_| malformed_error!("Invalid source line '{}'", value))?,
        ),
        None => None,
    };

    Ok(Some(SourcePosition { file, line }))
}

fn read_row(
    reader: &mut Reader<&[u8]>,
    element: &BytesStart<'_>,
    definition: &TableDefinition,
    source_file: &str,
) -> Result<Row> {
    let source = read_row_source(element)?;
    let mut fields: Vec<Option<FieldValue>> = Vec::with_capacity(definition.columns.len());

    loop {
        if fields.len() > definition.columns.len() {
            break;
        }

        match read_event(reader)? {
            Event::Comment(_) => {}
            Event::Text(text) if is_whitespace(&text) => {}
            Event::Start(element) if element.name().as_ref() == b"field" => {
                let text = read_field_text(reader, source_file)?;
                fields.push(parse_field(definition, fields.len(), &text, source_file)?);
            }
            Event::Empty(element) if element.name().as_ref() == b"field" => {
                fields.push(None);
            }
            Event::End(end) if end.name().as_ref() == b"row" => {
                if fields.len() != definition.columns.len() {
                    return Err(malformed_error!(
                        "Row in table '{}' of '{}' has {} fields but the table has {} columns",
                        definition.name,
                        source_file,
                        fields.len(),
                        definition.columns.len()
                    ));
                }
                return Ok(Row::from_parts(fields, source));
            }
            Event::Eof => {
                return Err(malformed_error!(
                    "Document '{}' ended inside a row of table '{}'",
                    source_file,
                    definition.name
                ))
            }
            _ => {
                return Err(malformed_error!(
                    "Unexpected content inside a row of table '{}' in '{}'",
                    definition.name,
                    source_file
                ))
            }
        }
    }

    Err(malformed_error!(
        "Row in table '{}' of '{}' has more fields than the table has columns",
        definition.name,
        source_file
    ))
}

fn read_field_text(reader: &mut Reader<&[u8]>, source_file: &str) -> Result<String> {
    let mut value = String::new();

    loop {
        match read_event(reader)? {
            Event::Text(text) => {
                let unescaped = text
                    .unescape()
                    .map_err(|e| malformed_error!("Invalid field text: {}", e))?;
                value.push_str(&unescaped);
            }
            Event::CData(data) => {
                value.push_str(&String::from_utf8_lossy(&data));
            }
            Event::End(end) if end.name().as_ref() == b"field" => return Ok(value),
            Event::Eof => {
                return Err(malformed_error!(
                    "Document '{}' ended inside a field element",
                    source_file
                ))
            }
            _ => {
                return Err(malformed_error!(
                    "Unexpected content inside a field element of '{}'",
                    source_file
                ))
            }
        }
    }
}

fn parse_field(
    definition: &TableDefinition,
    index: usize,
    text: &str,
    source_file: &str,
) -> Result<Option<FieldValue>> {
    let column = definition.columns.get(index).ok_or_else(|| {
        malformed_error!(
            "Row in table '{}' of '{}' has more fields than the table has columns",
            definition.name,
            source_file
        )
    })?;

    if text.is_empty() {
        return Ok(None);
    }

    let value = match column.kind {
        ColumnKind::String => FieldValue::String(text.to_string()),
        ColumnKind::Stream => FieldValue::Stream(text.to_string()),
        ColumnKind::Number => FieldValue::Integer(text.parse::<i32>().map_err(|_| {
            malformed_error!(
                "Invalid number '{}' in column '{}' of table '{}' in '{}'",
                text,
                column.name,
                definition.name,
                source_file
            )
        })?),
    };

    Ok(Some(value))
}

fn read_substorage(
    reader: &mut Reader<&[u8]>,
    element: &BytesStart<'_>,
    source_file: &str,
    suppress_version_check: bool,
) -> Result<SubStorage> {
    let name = required_attr(element, "name", source_file)?;
    let mut data: Option<InstallerData> = None;

    loop {
        match read_event(reader)? {
            Event::Comment(_) => {}
            Event::Text(text) if is_whitespace(&text) => {}
            Event::Start(element) if element.name().as_ref() == ROOT_ELEMENT.as_bytes() => {
                data = Some(read_data(
                    reader,
                    &element,
                    false,
                    source_file,
                    suppress_version_check,
                )?);
            }
            Event::Empty(element) if element.name().as_ref() == ROOT_ELEMENT.as_bytes() => {
                data = Some(read_data(
                    reader,
                    &element,
                    true,
                    source_file,
                    suppress_version_check,
                )?);
            }
            Event::End(end) if end.name().as_ref() == b"subStorage" => {
                return match data {
                    Some(data) => Ok(SubStorage::new(name, data)),
                    None => Err(malformed_error!(
                        "Substorage '{}' in '{}' has no nested database",
                        name,
                        source_file
                    )),
                };
            }
            Event::Eof => {
                return Err(malformed_error!(
                    "Document '{}' ended inside substorage '{}'",
                    source_file,
                    name
                ))
            }
            _ => {
                return Err(malformed_error!(
                    "Unexpected content inside substorage '{}' of '{}'",
                    name,
                    source_file
                ))
            }
        }
    }
}
