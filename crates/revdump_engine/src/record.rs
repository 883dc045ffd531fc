use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("page {title:?} has no usable revision content ({detail})")]
    MissingContent { title: String, detail: String },
    #[error("export document contains no <page> element")]
    NoPage,
    #[error("xml error: {0}")]
    Xml(String),
}

/// Turns server data into `<page>` fragments of an XML dump.
pub trait RecordBuilder: Send + Sync {
    /// Builds a fragment from one page object of a revisions query.
    fn from_api_record(&self, page: &Value) -> Result<String, RecordError>;
    /// Extracts the `<page>` element from a complete `<mediawiki>` export.
    fn from_raw_export(&self, xml: &str) -> Result<String, RecordError>;
}

/// Writes fragments in the MediaWiki export schema layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlRecordBuilder;

impl RecordBuilder for XmlRecordBuilder {
    fn from_api_record(&self, page: &Value) -> Result<String, RecordError> {
        let title = page
            .get("title")
            .and_then(Value::as_str)
            .ok_or_else(|| missing("<unknown>", "title"))?;
        let revisions = page
            .get("revisions")
            .and_then(Value::as_array)
            .filter(|revs| !revs.is_empty())
            .ok_or_else(|| missing(title, "revisions"))?;

        let mut out = PageWriter::new();
        out.start("page", &[])?;
        out.text_element("title", title)?;
        let namespace = scalar(page.get("ns")).unwrap_or_else(|| "0".into());
        out.text_element("ns", &namespace)?;
        if let Some(id) = scalar(page.get("pageid")) {
            out.text_element("id", &id)?;
        }
        for revision in revisions {
            write_revision(&mut out, title, revision)?;
        }
        out.end("page")?;
        out.finish()
    }

    fn from_raw_export(&self, xml: &str) -> Result<String, RecordError> {
        let mut reader = Reader::from_str(xml);
        let mut writer = Writer::new(Vec::new());
        let mut depth = 0usize;

        loop {
            let event = reader
                .read_event()
                .map_err(|err| RecordError::Xml(err.to_string()))?;
            let page_tag = match &event {
                Event::Start(start) | Event::Empty(start) => start.local_name().as_ref() == b"page",
                _ => false,
            };

            if depth == 0 {
                match event {
                    Event::Eof => return Err(RecordError::NoPage),
                    Event::Start(_) if page_tag => {
                        depth = 1;
                        write_raw(&mut writer, event)?;
                    }
                    Event::Empty(_) if page_tag => {
                        write_raw(&mut writer, event)?;
                        break;
                    }
                    _ => {}
                }
                continue;
            }

            match event {
                Event::Eof => {
                    return Err(RecordError::Xml("unterminated <page> element".into()));
                }
                Event::Start(_) => {
                    depth += 1;
                    write_raw(&mut writer, event)?;
                }
                Event::End(_) => {
                    depth -= 1;
                    write_raw(&mut writer, event)?;
                    if depth == 0 {
                        break;
                    }
                }
                other => write_raw(&mut writer, other)?,
            }
        }

        String::from_utf8(writer.into_inner()).map_err(|err| RecordError::Xml(err.to_string()))
    }
}

fn write_raw(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), RecordError> {
    writer
        .write_event(event)
        .map_err(|err| RecordError::Xml(err.to_string()))
}

fn write_revision(out: &mut PageWriter, title: &str, rev: &Value) -> Result<(), RecordError> {
    let revid = scalar(rev.get("revid")).ok_or_else(|| missing(title, "revid"))?;
    let timestamp = rev
        .get("timestamp")
        .and_then(Value::as_str)
        .ok_or_else(|| missing(title, "timestamp"))?;
    let main_slot = rev.get("slots").and_then(|slots| slots.get("main"));
    let size = scalar(rev.get("size")).unwrap_or_else(|| "0".into());

    out.start("revision", &[])?;
    out.text_element("id", &revid)?;
    if let Some(parent) = scalar(rev.get("parentid")) {
        out.text_element("parentid", &parent)?;
    }
    out.text_element("timestamp", timestamp)?;

    if flag(rev, "userhidden") {
        out.empty("contributor", &[("deleted", "deleted")])?;
    } else {
        let user = rev.get("user").and_then(Value::as_str).unwrap_or_default();
        out.start("contributor", &[])?;
        if flag(rev, "anon") {
            out.text_element("ip", user)?;
        } else {
            out.text_element("username", user)?;
            let userid = scalar(rev.get("userid")).unwrap_or_else(|| "0".into());
            out.text_element("id", &userid)?;
        }
        out.end("contributor")?;
    }

    if flag(rev, "minor") {
        out.empty("minor", &[])?;
    }
    if flag(rev, "commenthidden") {
        out.empty("comment", &[("deleted", "deleted")])?;
    } else if let Some(comment) = rev.get("comment").and_then(Value::as_str) {
        if !comment.is_empty() {
            out.text_element("comment", comment)?;
        }
    }

    let model = rev
        .get("contentmodel")
        .or_else(|| main_slot.and_then(|slot| slot.get("contentmodel")));
    if let Some(model) = model.and_then(Value::as_str) {
        out.text_element("model", model)?;
    }
    let format = rev
        .get("contentformat")
        .or_else(|| main_slot.and_then(|slot| slot.get("contentformat")));
    if let Some(format) = format.and_then(Value::as_str) {
        out.text_element("format", format)?;
    }

    let text_hidden =
        flag(rev, "texthidden") || main_slot.is_some_and(|slot| flag(slot, "texthidden"));
    if text_hidden {
        out.empty("text", &[("bytes", size.as_str()), ("deleted", "deleted")])?;
    } else {
        let content = content_of(rev)
            .or_else(|| main_slot.and_then(content_of))
            .ok_or_else(|| missing(title, "revision text"))?;
        out.start("text", &[("bytes", size.as_str()), ("xml:space", "preserve")])?;
        out.text(content)?;
        out.end("text")?;
    }

    if let Some(sha1) = rev.get("sha1").and_then(Value::as_str) {
        out.text_element("sha1", sha1)?;
    } else if flag(rev, "sha1hidden") {
        out.empty("sha1", &[])?;
    }
    out.end("revision")
}

fn content_of(value: &Value) -> Option<&str> {
    value
        .get("*")
        .or_else(|| value.get("content"))
        .and_then(Value::as_str)
}

/// Formatversion 1 marks flags with an empty string, formatversion 2 with booleans.
fn flag(value: &Value, key: &str) -> bool {
    match value.get(key) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(set)) => *set,
        Some(_) => true,
    }
}

fn scalar(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn missing(title: &str, detail: &str) -> RecordError {
    RecordError::MissingContent {
        title: title.to_string(),
        detail: format!("missing {detail}"),
    }
}

struct PageWriter {
    writer: Writer<Vec<u8>>,
}

impl PageWriter {
    fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
        }
    }

    fn emit(&mut self, event: Event<'_>) -> Result<(), RecordError> {
        write_raw(&mut self.writer, event)
    }

    fn start(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), RecordError> {
        let start = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.emit(Event::Start(start))
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), RecordError> {
        let start = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.emit(Event::Empty(start))
    }

    fn end(&mut self, name: &str) -> Result<(), RecordError> {
        self.emit(Event::End(BytesEnd::new(name)))
    }

    fn text(&mut self, content: &str) -> Result<(), RecordError> {
        self.emit(Event::Text(BytesText::new(content)))
    }

    fn text_element(&mut self, name: &str, content: &str) -> Result<(), RecordError> {
        self.start(name, &[])?;
        self.text(content)?;
        self.end(name)
    }

    fn finish(self) -> Result<String, RecordError> {
        String::from_utf8(self.writer.into_inner())
            .map_err(|err| RecordError::Xml(err.to_string()))
    }
}
