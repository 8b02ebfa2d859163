//! XML metadata document for extracted fields.
//!
//! Document layout:
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8" standalone="no"?>
//! <record>
//!     <field data-type="string" name="Caption">
//!         <value>first line</value>
//!         <value>second line</value>
//!     </field>
//!     <field data-type="table" name="Rights">
//!         <table>
//!             <row>
//!                 <field name="Holder">
//!                     <value>Royal Library</value>
//!                 </field>
//!             </row>
//!         </table>
//!     </field>
//!     <field data-type="binary" name="Related Sub Assets">
//!         <value>
//!             <name>peerA</name>
//!             <uuid>0f5c…</uuid>
//!             <order>0</order>
//!         </value>
//!     </field>
//! </record>
//! ```
//!
//! String values are XML-escaped before they are split into lines, and the
//! writer escapes text content again. Readers must unescape every `<value>`
//! of a string or table field twice.

use crate::{
    Result,
    error::DamError,
    models::{AssetEntry, Field, Row},
};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::borrow::Cow;
use std::io::Write;

const INDENT_SIZE: usize = 4;

/// Writes the given fields as a metadata document.
///
/// Empty fields are left out.
///
/// # Errors
/// Returns error if writing to `out` fails
pub fn write_metadata<'a, I, W>(fields: I, out: W) -> Result<()>
where
    I: IntoIterator<Item = &'a Field>,
    W: Write,
{
    let fields: Vec<&Field> = fields
        .into_iter()
        .filter(|field| match field {
            Field::Empty(_) => {
                tracing::warn!("Could not handle empty field: '{}'", field.name());
                false
            }
            _ if field.is_empty() => {
                tracing::trace!("Skipping field without data: '{}'", field.name());
                false
            }
            _ => true,
        })
        .collect();

    let mut writer = MetadataWriter::new(out);
    writer.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("no"))))?;
    if fields.is_empty() {
        writer.event(Event::Empty(BytesStart::new("record")))?;
    } else {
        writer.start(BytesStart::new("record"))?;
        for field in fields {
            writer.field(field)?;
        }
        writer.end("record")?;
    }
    writer.finish()
}

/// Renders the given fields as a metadata document string.
///
/// # Errors
/// Returns error if the document cannot be rendered
pub fn metadata_document<'a, I>(fields: I) -> Result<String>
where
    I: IntoIterator<Item = &'a Field>,
{
    let mut buffer = Vec::new();
    write_metadata(fields, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| DamError::serialization("Metadata document is not valid UTF-8", e))
}

/// Splits a string value into the `<value>` segments of the document.
///
/// The value is escaped first. A value without line breaks is a single
/// segment (even when empty); otherwise trailing empty segments are dropped.
pub fn value_segments(value: &str) -> Vec<Cow<'_, str>> {
    let encoded = quick_xml::escape::escape(value);
    if !encoded.contains('\n') {
        return vec![encoded];
    }

    let mut segments: Vec<Cow<'_, str>> = encoded
        .split('\n')
        .map(|segment| Cow::Owned(segment.to_string()))
        .collect();
    while segments.last().is_some_and(|segment| segment.is_empty()) {
        segments.pop();
    }
    segments
}

struct MetadataWriter<W: Write> {
    writer: Writer<W>,
}

fn xml_error<E>(error: E) -> DamError
where
    E: std::error::Error + Send + Sync + 'static,
{
    DamError::serialization("Failed to write metadata document", error)
}

impl<W: Write> MetadataWriter<W> {
    fn new(out: W) -> Self {
        Self {
            writer: Writer::new_with_indent(out, b' ', INDENT_SIZE),
        }
    }

    fn event(&mut self, event: Event<'_>) -> Result<()> {
        self.writer.write_event(event).map_err(xml_error)
    }

    fn start(&mut self, start: BytesStart<'_>) -> Result<()> {
        self.event(Event::Start(start))
    }

    fn end(&mut self, name: &str) -> Result<()> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn text_element(&mut self, name: &str, text: &str) -> Result<()> {
        self.start(BytesStart::new(name))?;
        self.event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    fn field(&mut self, field: &Field) -> Result<()> {
        let data_type = field.data_type().to_string();
        let mut start = BytesStart::new("field");
        start.push_attribute(("data-type", data_type.as_str()));
        start.push_attribute(("name", field.name()));

        match field {
            Field::String(string) => self.values(start, string.value()),
            Field::Table(table) => {
                self.start(start)?;
                self.table(table.rows())?;
                self.end("field")
            }
            Field::Assets(assets) => {
                self.start(start)?;
                for entry in assets.entries() {
                    self.asset(entry)?;
                }
                self.end("field")
            }
            Field::Empty(_) => Ok(()),
        }
    }

    /// Writes `start` with one `<value>` child per segment of `value`.
    fn values(&mut self, start: BytesStart<'_>, value: &str) -> Result<()> {
        let segments = value_segments(value);
        if segments.is_empty() {
            return self.event(Event::Empty(start));
        }

        self.start(start)?;
        for segment in &segments {
            self.text_element("value", segment)?;
        }
        self.end("field")
    }

    fn table(&mut self, rows: &[Row]) -> Result<()> {
        self.start(BytesStart::new("table"))?;
        for row in rows {
            if row.is_empty() {
                self.event(Event::Empty(BytesStart::new("row")))?;
                continue;
            }
            self.start(BytesStart::new("row"))?;
            for (column, value) in row {
                let mut start = BytesStart::new("field");
                start.push_attribute(("name", column.as_str()));
                self.values(start, value)?;
            }
            self.end("row")?;
        }
        self.end("table")
    }

    fn asset(&mut self, entry: &AssetEntry) -> Result<()> {
        self.start(BytesStart::new("value"))?;
        self.text_element("name", &entry.name)?;
        self.text_element("uuid", &entry.identifier)?;
        self.text_element("order", &entry.position.to_string())?;
        self.end("value")
    }

    fn finish(mut self) -> Result<()> {
        let out = self.writer.get_mut();
        out.write_all(b"\n")
            .and_then(|()| out.flush())
            .map_err(|e| DamError::io("Failed to write metadata document", e))
    }
}
