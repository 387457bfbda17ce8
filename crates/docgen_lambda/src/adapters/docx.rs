//! Office Open XML (`.docx`) document engine.
//!
//! A package is kept as its ordered list of zip parts. Only the WordprocessingML
//! text parts are parsed, and only parts that actually change are rewritten;
//! every other part is written back byte-for-byte.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};

use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use regex::{Captures, Regex};
use thiserror::Error;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::adapters::document_engine::DocumentEngine;

pub const MAIN_DOCUMENT_PART: &str = "word/document.xml";

const PARAGRAPH_TAG: &[u8] = b"w:p";
const TEXT_TAG: &[u8] = b"w:t";
const PLACEHOLDER_PATTERN: &str = r"\$\{\s*([^{}\s][^{}]*?)\s*\}|\{\{\s*([^{}\s][^{}]*?)\s*\}\}";

#[derive(Debug, Error)]
pub enum DocxError {
    #[error("invalid document package: {0}")]
    Package(#[from] zip::result::ZipError),
    #[error("failed to copy package part '{name}': {source}")]
    Io {
        name: String,
        source: std::io::Error,
    },
    #[error("document package has no word/document.xml part")]
    MissingMainDocument,
    #[error("part '{0}' is not valid UTF-8")]
    Encoding(String),
    #[error("malformed XML in part '{name}': {message}")]
    Xml { name: String, message: String },
    #[error("invalid placeholder pattern: {0}")]
    Pattern(#[from] regex::Error),
}

fn xml_error(name: &str, error: impl std::fmt::Display) -> DocxError {
    DocxError::Xml {
        name: name.to_string(),
        message: error.to_string(),
    }
}

#[derive(Debug, Clone)]
struct DocxPart {
    name: String,
    body: Vec<u8>,
    compression: CompressionMethod,
    is_dir: bool,
}

impl DocxPart {
    fn text(&self) -> Result<&str, DocxError> {
        std::str::from_utf8(&self.body).map_err(|_| DocxError::Encoding(self.name.clone()))
    }
}

/// In-memory model of a loaded package.
#[derive(Debug, Clone)]
pub struct DocxDocument {
    parts: Vec<DocxPart>,
}

impl DocxDocument {
    pub fn load(bytes: &[u8]) -> Result<Self, DocxError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut parts = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let mut file = archive.by_index(index)?;
            let name = file.name().to_string();
            let mut body = Vec::new();
            file.read_to_end(&mut body)
                .map_err(|source| DocxError::Io {
                    name: name.clone(),
                    source,
                })?;
            parts.push(DocxPart {
                is_dir: file.is_dir(),
                compression: file.compression(),
                name,
                body,
            });
        }

        if !parts.iter().any(|part| part.name == MAIN_DOCUMENT_PART) {
            return Err(DocxError::MissingMainDocument);
        }
        Ok(Self { parts })
    }

    pub fn save(&self) -> Result<Vec<u8>, DocxError> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for part in &self.parts {
            let options =
                FileOptions::default().compression_method(writable_compression(part.compression));
            if part.is_dir {
                writer.add_directory(part.name.clone(), options)?;
                continue;
            }
            writer.start_file(part.name.clone(), options)?;
            writer
                .write_all(&part.body)
                .map_err(|source| DocxError::Io {
                    name: part.name.clone(),
                    source,
                })?;
        }
        Ok(writer.finish()?.into_inner())
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|part| part.name.as_str())
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|part| part.name == name)
            .map(|part| part.body.as_slice())
    }

    /// Visible text of the main document, one line per paragraph.
    pub fn plain_text(&self) -> Result<String, DocxError> {
        let part = self
            .parts
            .iter()
            .find(|part| part.name == MAIN_DOCUMENT_PART)
            .ok_or(DocxError::MissingMainDocument)?;
        let events = read_events(&part.name, part.text()?)?;

        let mut text = String::new();
        let mut in_text = false;
        for event in &events {
            match event {
                Event::Start(start) if start.name().as_ref() == TEXT_TAG => in_text = true,
                Event::End(end) if end.name().as_ref() == TEXT_TAG => in_text = false,
                Event::End(end) if end.name().as_ref() == PARAGRAPH_TAG => text.push('\n'),
                Event::Text(content) if in_text => {
                    text.push_str(&content.unescape().map_err(|error| xml_error(&part.name, error))?)
                }
                _ => {}
            }
        }
        Ok(text)
    }

    fn rewrite_text_parts(
        &mut self,
        mut rewrite: impl FnMut(&str, &str) -> Result<Option<String>, DocxError>,
    ) -> Result<(), DocxError> {
        for part in self.parts.iter_mut().filter(|part| is_text_part(&part.name)) {
            if let Some(updated) = rewrite(&part.name, part.text()?)? {
                part.body = updated.into_bytes();
            }
        }
        Ok(())
    }
}

/// Parts that carry user-visible WordprocessingML text.
pub fn is_text_part(name: &str) -> bool {
    if name == MAIN_DOCUMENT_PART || name == "word/footnotes.xml" || name == "word/endnotes.xml" {
        return true;
    }
    (name.starts_with("word/header") || name.starts_with("word/footer")) && name.ends_with(".xml")
}

fn writable_compression(method: CompressionMethod) -> CompressionMethod {
    match method {
        CompressionMethod::Stored => CompressionMethod::Stored,
        _ => CompressionMethod::Deflated,
    }
}

/// `${name}` and `{{name}}` placeholders; surrounding whitespace inside the
/// braces is not part of the name.
#[derive(Debug, Clone)]
pub struct PlaceholderSyntax {
    pattern: Regex,
}

impl PlaceholderSyntax {
    pub fn new() -> Result<Self, DocxError> {
        Ok(Self {
            pattern: Regex::new(PLACEHOLDER_PATTERN)?,
        })
    }

    /// Returns the rewritten text, or `None` when nothing changed.
    pub fn replace(&self, text: &str, substitutions: &BTreeMap<String, String>) -> Option<String> {
        let replaced = self.pattern.replace_all(text, |captures: &Captures| {
            match placeholder_name(captures).and_then(|name| substitutions.get(name)) {
                Some(value) => value.clone(),
                None => captures[0].to_string(),
            }
        });
        match replaced {
            Cow::Owned(replaced) if replaced != text => Some(replaced),
            _ => None,
        }
    }

    fn spans(&self, text: &str) -> Vec<(usize, usize)> {
        self.pattern
            .find_iter(text)
            .map(|found| (found.start(), found.end()))
            .collect()
    }
}

fn placeholder_name<'t>(captures: &Captures<'t>) -> Option<&'t str> {
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .map(|found| found.as_str())
}

#[derive(Debug, Clone)]
pub struct DocxEngine {
    syntax: PlaceholderSyntax,
}

impl DocxEngine {
    pub fn new() -> Result<Self, DocxError> {
        Ok(Self {
            syntax: PlaceholderSyntax::new()?,
        })
    }

    /// Word splits text into runs at arbitrary points (spell checking,
    /// revision marks, formatting). Every placeholder that spans several
    /// `<w:t>` nodes of one paragraph is moved into the first of them.
    pub fn prepare_document(&self, document: &mut DocxDocument) -> Result<(), DocxError> {
        document.rewrite_text_parts(|name, xml| self.merge_split_placeholders(name, xml))
    }

    pub fn substitute_document(
        &self,
        document: &mut DocxDocument,
        substitutions: &BTreeMap<String, String>,
    ) -> Result<(), DocxError> {
        document.rewrite_text_parts(|name, xml| self.replace_placeholders(name, xml, substitutions))
    }

    fn merge_split_placeholders(&self, name: &str, xml: &str) -> Result<Option<String>, DocxError> {
        let mut events = read_events(name, xml)?;
        let mut changed = false;
        let mut depth = 0usize;
        let mut paragraph_start = 0usize;

        for index in 0..events.len() {
            match paragraph_boundary(&events[index]) {
                Some(Boundary::Open) => {
                    if depth == 0 {
                        paragraph_start = index;
                    }
                    depth += 1;
                }
                Some(Boundary::Close) => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        changed |=
                            self.merge_paragraph(name, &mut events[paragraph_start..=index])?;
                    }
                }
                None => {}
            }
        }

        if !changed {
            return Ok(None);
        }
        write_events(name, events).map(Some)
    }

    fn merge_paragraph(&self, name: &str, events: &mut [Event<'_>]) -> Result<bool, DocxError> {
        let segments = text_segments(name, events)?;
        let joined: String = segments.iter().map(|segment| segment.text.as_str()).collect();

        let mut offsets = Vec::with_capacity(segments.len());
        let mut offset = 0usize;
        for segment in &segments {
            offsets.push(offset);
            offset += segment.text.len();
        }
        let segment_at = |position: usize| {
            segments.iter().zip(&offsets).position(|(segment, start)| {
                *start <= position && position < start + segment.text.len()
            })
        };

        let mut groups: Vec<(usize, usize)> = Vec::new();
        for (start, end) in self.syntax.spans(&joined) {
            let (Some(first), Some(last)) = (segment_at(start), segment_at(end - 1)) else {
                continue;
            };
            if first == last {
                continue;
            }
            match groups.last_mut() {
                Some(group) if group.1 >= first => group.1 = group.1.max(last),
                _ => groups.push((first, last)),
            }
        }

        for &(first, last) in &groups {
            let merged: String = segments[first..=last]
                .iter()
                .map(|segment| segment.text.as_str())
                .collect();
            events[segments[first].start_index] = Event::Start(preserved_text_start());
            segments[first].write(events, &merged);
            for segment in &segments[first + 1..=last] {
                segment.write(events, "");
            }
        }

        Ok(!groups.is_empty())
    }

    fn replace_placeholders(
        &self,
        name: &str,
        xml: &str,
        substitutions: &BTreeMap<String, String>,
    ) -> Result<Option<String>, DocxError> {
        let mut events = read_events(name, xml)?;
        let mut changed = false;
        let mut open_text: Option<usize> = None;

        for index in 0..events.len() {
            let replaced = match &events[index] {
                Event::Start(start) if start.name().as_ref() == TEXT_TAG => {
                    open_text = Some(index);
                    None
                }
                Event::End(end) if end.name().as_ref() == TEXT_TAG => {
                    open_text = None;
                    None
                }
                Event::Text(content) if open_text.is_some() => {
                    let original = content.unescape().map_err(|error| xml_error(name, error))?;
                    self.syntax.replace(&original, substitutions)
                }
                _ => None,
            };

            let Some(replaced) = replaced else {
                continue;
            };
            if replaced.starts_with(char::is_whitespace) || replaced.ends_with(char::is_whitespace)
            {
                if let Some(start_index) = open_text {
                    events[start_index] = Event::Start(preserved_text_start());
                }
            }
            events[index] = Event::Text(BytesText::new(&replaced).into_owned());
            changed = true;
        }

        if !changed {
            return Ok(None);
        }
        write_events(name, events).map(Some)
    }
}

impl DocumentEngine for DocxEngine {
    type Document = DocxDocument;

    fn load_document(&self, bytes: &[u8]) -> Result<DocxDocument, String> {
        DocxDocument::load(bytes).map_err(|error| error.to_string())
    }

    fn prepare(&self, document: &mut DocxDocument) -> Result<(), String> {
        self.prepare_document(document)
            .map_err(|error| error.to_string())
    }

    fn substitute(
        &self,
        document: &mut DocxDocument,
        substitutions: &BTreeMap<String, String>,
    ) -> Result<(), String> {
        self.substitute_document(document, substitutions)
            .map_err(|error| error.to_string())
    }

    fn serialize(&self, document: DocxDocument) -> Result<Vec<u8>, String> {
        document.save().map_err(|error| error.to_string())
    }
}

enum Boundary {
    Open,
    Close,
}

fn paragraph_boundary(event: &Event<'_>) -> Option<Boundary> {
    match event {
        Event::Start(start) if start.name().as_ref() == PARAGRAPH_TAG => Some(Boundary::Open),
        Event::End(end) if end.name().as_ref() == PARAGRAPH_TAG => Some(Boundary::Close),
        _ => None,
    }
}

/// One `<w:t>` element: the index of its start tag, the indices of its text
/// events and their unescaped content.
struct TextSegment {
    start_index: usize,
    text_indices: Vec<usize>,
    text: String,
}

impl TextSegment {
    fn write(&self, events: &mut [Event<'_>], text: &str) {
        for (position, &index) in self.text_indices.iter().enumerate() {
            let content = if position == 0 { text } else { "" };
            events[index] = Event::Text(BytesText::new(content).into_owned());
        }
    }
}

fn text_segments(name: &str, events: &[Event<'_>]) -> Result<Vec<TextSegment>, DocxError> {
    let mut segments: Vec<TextSegment> = Vec::new();
    let mut in_text = false;
    for (index, event) in events.iter().enumerate() {
        match event {
            Event::Start(start) if start.name().as_ref() == TEXT_TAG => {
                in_text = true;
                segments.push(TextSegment {
                    start_index: index,
                    text_indices: Vec::new(),
                    text: String::new(),
                });
            }
            Event::End(end) if end.name().as_ref() == TEXT_TAG => in_text = false,
            Event::Text(content) if in_text => {
                if let Some(segment) = segments.last_mut() {
                    segment.text_indices.push(index);
                    segment
                        .text
                        .push_str(&content.unescape().map_err(|error| xml_error(name, error))?);
                }
            }
            _ => {}
        }
    }
    Ok(segments)
}

fn preserved_text_start() -> BytesStart<'static> {
    BytesStart::new("w:t").with_attributes([("xml:space", "preserve")])
}

fn read_events<'a>(name: &str, xml: &'a str) -> Result<Vec<Event<'a>>, DocxError> {
    let mut reader = Reader::from_str(xml);
    let mut events = Vec::new();
    loop {
        match reader.read_event().map_err(|error| xml_error(name, error))? {
            Event::Eof => return Ok(events),
            event => events.push(event),
        }
    }
}

fn write_events(name: &str, events: Vec<Event<'_>>) -> Result<String, DocxError> {
    let mut writer = Writer::new(Vec::new());
    for event in events {
        writer
            .write_event(event)
            .map_err(|error| xml_error(name, error))?;
    }
    String::from_utf8(writer.into_inner()).map_err(|_| DocxError::Encoding(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORD_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

    fn document_xml(paragraphs: &[&str]) -> String {
        let body: String = paragraphs
            .iter()
            .map(|runs| format!("<w:p>{runs}</w:p>"))
            .collect();
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
             <w:document xmlns:w=\"{WORD_NS}\"><w:body>{body}</w:body></w:document>"
        )
    }

    fn run(text: &str) -> String {
        format!("<w:r><w:t>{text}</w:t></w:r>")
    }

    fn build_package(parts: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, body) in parts {
            writer
                .start_file(name.to_string(), options)
                .expect("zip entry should start");
            writer
                .write_all(body.as_bytes())
                .expect("zip entry should write");
        }
        writer
            .finish()
            .expect("zip should finish")
            .into_inner()
    }

    fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
        build_package(&[
            (
                "[Content_Types].xml",
                "<?xml version=\"1.0\"?><Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\"/>",
            ),
            (MAIN_DOCUMENT_PART, document_xml(paragraphs).as_str()),
        ])
    }

    fn substitutions(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    fn render(bytes: &[u8], pairs: &[(&str, &str)]) -> DocxDocument {
        let engine = DocxEngine::new().expect("engine should build");
        let mut document = DocxDocument::load(bytes).expect("package should load");
        engine
            .prepare_document(&mut document)
            .expect("prepare should succeed");
        engine
            .substitute_document(&mut document, &substitutions(pairs))
            .expect("substitute should succeed");
        let saved = document.save().expect("package should save");
        DocxDocument::load(&saved).expect("saved package should reload")
    }

    #[test]
    fn replaces_both_placeholder_styles() {
        let bytes = docx_with_paragraphs(&[run("Hello {{name}}, ${ role }!").as_str()]);
        let document = render(&bytes, &[("name", "Ada"), ("role", "engineer")]);
        assert_eq!(
            document.plain_text().expect("text"),
            "Hello Ada, engineer!\n"
        );
    }

    #[test]
    fn merges_placeholders_split_across_runs() {
        let paragraph = format!("{}{}{}", run("Dear {{na"), run("me"), run("}} and {{x}}"));
        let bytes = docx_with_paragraphs(&[paragraph.as_str()]);
        let document = render(&bytes, &[("name", "Ada"), ("x", "y")]);

        let text = document.plain_text().expect("text");
        assert_eq!(text, "Dear Ada and y\n");
        assert!(!text.contains("{{"));
    }

    #[test]
    fn leaves_unknown_placeholders_untouched() {
        let bytes = docx_with_paragraphs(&[run("{{known}} {{unknown}}").as_str()]);
        let document = render(&bytes, &[("known", "yes")]);
        assert_eq!(document.plain_text().expect("text"), "yes {{unknown}}\n");
    }

    #[test]
    fn escapes_substituted_values() {
        let bytes = docx_with_paragraphs(&[run("{{company}}").as_str()]);
        let document = render(&bytes, &[("company", "A & B <Ltd>")]);

        assert_eq!(document.plain_text().expect("text"), "A & B <Ltd>\n");
        let xml = std::str::from_utf8(document.part(MAIN_DOCUMENT_PART).expect("main part"))
            .expect("utf-8");
        assert!(xml.contains("A &amp; B &lt;Ltd&gt;"));
    }

    #[test]
    fn substitutes_in_headers_and_keeps_other_parts_verbatim() {
        let header = format!(
            "<w:hdr xmlns:w=\"{WORD_NS}\"><w:p>{}</w:p></w:hdr>",
            run("Client: {{client}}")
        );
        let styles = "<w:styles>{{client}}</w:styles>";
        let bytes = build_package(&[
            (MAIN_DOCUMENT_PART, document_xml(&[run("body").as_str()]).as_str()),
            ("word/header1.xml", header.as_str()),
            ("word/styles.xml", styles),
        ]);

        let document = render(&bytes, &[("client", "Acme")]);
        let header = std::str::from_utf8(document.part("word/header1.xml").expect("header"))
            .expect("utf-8");
        assert!(header.contains("Client: Acme"));
        assert_eq!(document.part("word/styles.xml"), Some(styles.as_bytes()));
        assert_eq!(
            document.part_names().collect::<Vec<_>>(),
            vec![MAIN_DOCUMENT_PART, "word/header1.xml", "word/styles.xml"]
        );
    }

    #[test]
    fn rejects_bytes_that_are_not_a_package() {
        let error = DocxDocument::load(b"definitely not a zip").expect_err("should fail");
        assert!(matches!(error, DocxError::Package(_)));
    }

    #[test]
    fn rejects_package_without_main_document() {
        let bytes = build_package(&[("word/styles.xml", "<w:styles/>")]);
        let error = DocxDocument::load(&bytes).expect_err("should fail");
        assert!(matches!(error, DocxError::MissingMainDocument));
    }

    #[test]
    fn reports_malformed_xml_during_substitution() {
        let bytes = build_package(&[(MAIN_DOCUMENT_PART, "<w:document><w:p></w:document>")]);
        let engine = DocxEngine::new().expect("engine should build");
        let mut document = DocxDocument::load(&bytes).expect("package should load");
        let error = engine
            .prepare_document(&mut document)
            .expect_err("mismatched tags should fail");
        assert!(matches!(error, DocxError::Xml { .. }));
    }

    #[test]
    fn placeholder_names_are_trimmed() {
        let syntax = PlaceholderSyntax::new().expect("pattern should compile");
        assert_eq!(
            syntax.replace("{{ a }} ${b} {{}}", &substitutions(&[("a", "1"), ("b", "2")])),
            Some("1 2 {{}}".to_string())
        );
        assert_eq!(syntax.replace("plain", &substitutions(&[("a", "1")])), None);
    }

    #[test]
    fn one_engine_renders_many_documents() {
        let engine = DocxEngine::new().expect("engine should build");
        let shared = engine.clone();

        for (engine, value) in [(&engine, "first"), (&shared, "second")] {
            let bytes = docx_with_paragraphs(&[run("{{value}}").as_str()]);
            let mut document = DocxDocument::load(&bytes).expect("package should load");
            engine
                .prepare_document(&mut document)
                .expect("prepare should succeed");
            engine
                .substitute_document(&mut document, &substitutions(&[("value", value)]))
                .expect("substitute should succeed");
            assert_eq!(document.plain_text().expect("text"), format!("{value}\n"));
        }
    }
}
