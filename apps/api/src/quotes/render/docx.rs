//! DOCX rendering: merges values into `word/document.xml` text runs.
//!
//! Word splits typed text into runs freely, so a token like `{{customerName}}`
//! can arrive as `{{cust` + `omerName}}`. Within a paragraph, the runs between
//! two tab or break elements are joined, merged as one string, and written back
//! into the first of those runs; the others are emptied. Formatting of that
//! first run wins for the group, which only matters for groups with tokens.

use std::io::{Cursor, Read, Write};

use async_trait::async_trait;
use bytes::Bytes;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::{debug, warn};
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::models::quote::OutputFormat;
use crate::placeholder::scanner::token_regex;
use crate::placeholder::{merge, FallbackPolicy, FieldDescriptor, ValueMap};
use crate::quotes::render::{DocumentRenderer, PdfConverter, RenderError, RenderedDocument};

const DOCUMENT_PART: &str = "word/document.xml";

/// Default renderer. PDF output goes through `PdfConverter` when configured.
pub struct DocxRenderer {
    converter: Option<PdfConverter>,
}

impl DocxRenderer {
    pub fn new(converter: Option<PdfConverter>) -> Self {
        Self { converter }
    }

    async fn to_pdf(&self, docx: Bytes) -> RenderedDocument {
        let Some(converter) = &self.converter else {
            warn!("PDF requested but no converter is configured; returning DOCX");
            return RenderedDocument::new(docx, OutputFormat::Docx);
        };

        match converter.convert(docx.clone()).await {
            Ok(pdf) => RenderedDocument::new(pdf, OutputFormat::Pdf),
            Err(e) => {
                warn!("PDF conversion failed, returning DOCX instead: {e}");
                RenderedDocument::new(docx, OutputFormat::Docx)
            }
        }
    }
}

#[async_trait]
impl DocumentRenderer for DocxRenderer {
    async fn render(
        &self,
        template: Bytes,
        values: &ValueMap,
        fields: &[FieldDescriptor],
        format: OutputFormat,
    ) -> Result<RenderedDocument, RenderError> {
        let values = values.clone();
        let fields = fields.to_vec();
        let docx = tokio::task::spawn_blocking(move || render_docx(&template, &values, &fields))
            .await
            .map_err(|e| RenderError::Worker(e.to_string()))??;
        let docx = Bytes::from(docx);
        debug!("Rendered DOCX ({} bytes) for {format} output", docx.len());

        match format {
            OutputFormat::Docx => Ok(RenderedDocument::new(docx, OutputFormat::Docx)),
            OutputFormat::Pdf => Ok(self.to_pdf(docx).await),
            OutputFormat::Html => {
                let body = paragraphs_to_html(&extract_paragraphs(&docx)?);
                Ok(RenderedDocument::new(html_document(&body), OutputFormat::Html))
            }
            OutputFormat::Txt => Ok(RenderedDocument::new(extract_text(&docx)?, OutputFormat::Txt)),
        }
    }

    fn extract_text(&self, template: &[u8]) -> Result<String, RenderError> {
        extract_text(template)
    }
}

/// Merges `values` into a DOCX template and returns the new archive.
pub fn render_docx(
    template: &[u8],
    values: &ValueMap,
    fields: &[FieldDescriptor],
) -> Result<Vec<u8>, RenderError> {
    let xml = read_document_part(template)?;
    let rewritten = rewrite_document(&xml, values, fields)?;
    replace_document_part(template, &rewritten)
}

/// Checks that a template renders cleanly with no values supplied.
pub fn validate_template(template: &[u8]) -> Result<(), RenderError> {
    render_docx(template, &ValueMap::new(), &[]).map(|_| ())
}

/// Plain text of a DOCX: paragraphs separated by a blank line.
pub fn extract_text(docx: &[u8]) -> Result<String, RenderError> {
    Ok(extract_paragraphs(docx)?.join("\n\n"))
}

/// Text of each paragraph in document order. `w:tab` becomes `\t`,
/// `w:br`/`w:cr` become `\n`.
pub fn extract_paragraphs(docx: &[u8]) -> Result<Vec<String>, RenderError> {
    let xml = read_document_part(docx)?;
    paragraphs_of(&xml)
}

/// One `<p>` per non-blank paragraph, text escaped.
pub fn paragraphs_to_html(paragraphs: &[String]) -> String {
    paragraphs
        .iter()
        .filter(|p| !p.trim().is_empty())
        .map(|p| format!("<p>{}</p>", escape(p.as_str()).replace('\n', "<br>")))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn html_document(body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"UTF-8\"></head>\n<body>\n{body}\n</body>\n</html>\n"
    )
}

fn malformed(e: impl std::fmt::Display) -> RenderError {
    RenderError::MalformedXml(e.to_string())
}

fn archive_error(e: ZipError) -> RenderError {
    RenderError::Archive(e.to_string())
}

fn read_document_part(docx: &[u8]) -> Result<String, RenderError> {
    let mut archive = ZipArchive::new(Cursor::new(docx)).map_err(archive_error)?;
    let mut part = match archive.by_name(DOCUMENT_PART) {
        Ok(part) => part,
        Err(ZipError::FileNotFound) => return Err(RenderError::MissingDocumentPart),
        Err(e) => return Err(archive_error(e)),
    };

    let mut xml = String::new();
    part.read_to_string(&mut xml)
        .map_err(|e| RenderError::Archive(e.to_string()))?;
    Ok(xml)
}

fn replace_document_part(docx: &[u8], xml: &str) -> Result<Vec<u8>, RenderError> {
    let mut archive = ZipArchive::new(Cursor::new(docx)).map_err(archive_error)?;
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for i in 0..archive.len() {
        let file = archive.by_index_raw(i).map_err(archive_error)?;
        if file.name() == DOCUMENT_PART {
            drop(file);
            writer
                .start_file(DOCUMENT_PART, options)
                .map_err(archive_error)?;
            writer
                .write_all(xml.as_bytes())
                .map_err(|e| RenderError::Archive(e.to_string()))?;
        } else {
            writer.raw_copy_file(file).map_err(archive_error)?;
        }
    }

    Ok(writer.finish().map_err(archive_error)?.into_inner())
}

enum Step {
    Done,
    OpenParagraph,
    CloseParagraph,
    Pass,
}

fn rewrite_document(
    xml: &str,
    values: &ValueMap,
    fields: &[FieldDescriptor],
) -> Result<String, RenderError> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());
    // Paragraphs can nest (text boxes); buffer each until its end tag.
    let mut open: Vec<Vec<Event<'static>>> = Vec::new();

    loop {
        let event = reader.read_event().map_err(malformed)?;
        let step = match &event {
            Event::Eof => Step::Done,
            Event::Start(e) if e.name().as_ref() == b"w:p" => Step::OpenParagraph,
            Event::End(e) if e.name().as_ref() == b"w:p" => Step::CloseParagraph,
            _ => Step::Pass,
        };

        match step {
            Step::Done => break,
            Step::OpenParagraph => open.push(vec![event.into_owned()]),
            Step::CloseParagraph => {
                let mut paragraph = open
                    .pop()
                    .ok_or_else(|| malformed("closing w:p without an opening tag"))?;
                paragraph.push(event.into_owned());
                let merged = merge_paragraph(paragraph, values, fields)?;
                emit(&mut open, &mut writer, merged)?;
            }
            Step::Pass => emit(&mut open, &mut writer, vec![event.into_owned()])?,
        }
    }

    if !open.is_empty() {
        return Err(malformed("unterminated w:p"));
    }
    String::from_utf8(writer.into_inner()).map_err(malformed)
}

fn emit(
    open: &mut [Vec<Event<'static>>],
    writer: &mut Writer<Vec<u8>>,
    events: Vec<Event<'static>>,
) -> Result<(), RenderError> {
    match open.last_mut() {
        Some(parent) => parent.extend(events),
        None => {
            for event in events {
                writer.write_event(event).map_err(malformed)?;
            }
        }
    }
    Ok(())
}

/// Text runs of a paragraph between two tab or break elements.
#[derive(Default)]
struct TextGroup {
    /// (index of <w:t>, index of its text)
    runs: Vec<(usize, usize)>,
    text: String,
}

fn is_break(name: &[u8]) -> bool {
    matches!(name, b"w:tab" | b"w:br" | b"w:cr")
}

/// Merges one buffered paragraph. Text of nested paragraphs is left alone;
/// they were merged when their own end tag was read.
///
/// Tabs and breaks split the paragraph into groups that are merged
/// separately, so those elements keep their place relative to the text.
fn merge_paragraph(
    mut events: Vec<Event<'static>>,
    values: &ValueMap,
    fields: &[FieldDescriptor],
) -> Result<Vec<Event<'static>>, RenderError> {
    let mut groups = vec![TextGroup::default()];
    let mut depth = 0usize;
    let mut open_text: Option<usize> = None;

    for (i, event) in events.iter().enumerate() {
        match event {
            Event::Start(e) if e.name().as_ref() == b"w:p" => depth += 1,
            Event::End(e) if e.name().as_ref() == b"w:p" => depth = depth.saturating_sub(1),
            Event::Start(e) if depth == 1 && e.name().as_ref() == b"w:t" => open_text = Some(i),
            Event::End(e) if e.name().as_ref() == b"w:t" => open_text = None,
            Event::Empty(e) if depth == 1 && is_break(e.name().as_ref()) => {
                groups.push(TextGroup::default())
            }
            Event::Text(t) if depth == 1 => {
                if let (Some(start), Some(group)) = (open_text, groups.last_mut()) {
                    group.text.push_str(&t.unescape().map_err(malformed)?);
                    group.runs.push((start, i));
                }
            }
            _ => {}
        }
    }

    for group in groups.iter().filter(|g| g.text.contains("{{")) {
        let leftover = token_regex().replace_all(&group.text, "");
        if leftover.contains("{{") {
            let paragraph = groups.iter().map(|g| g.text.as_str()).collect::<Vec<_>>();
            return Err(RenderError::UnclosedTag {
                paragraph: paragraph.join(""),
            });
        }

        let merged = merge(&group.text, values, FallbackPolicy::BracketLabel(fields));
        for (n, &(start, text)) in group.runs.iter().enumerate() {
            if n == 0 {
                events[start] = Event::Start(
                    BytesStart::new("w:t").with_attributes([("xml:space", "preserve")]),
                );
                events[text] = Event::Text(BytesText::new(&merged).into_owned());
            } else {
                events[text] = Event::Text(BytesText::new(""));
            }
        }
    }
    Ok(events)
}

fn paragraphs_of(xml: &str) -> Result<Vec<String>, RenderError> {
    let mut reader = Reader::from_str(xml);
    let mut open: Vec<String> = Vec::new();
    let mut paragraphs = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Eof => break,
            Event::Start(e) => match e.name().as_ref() {
                b"w:p" => open.push(String::new()),
                b"w:t" => in_text = true,
                _ => {}
            },
            Event::End(e) => match e.name().as_ref() {
                b"w:p" => {
                    if let Some(paragraph) = open.pop() {
                        paragraphs.push(paragraph);
                    }
                }
                b"w:t" => in_text = false,
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:p" => paragraphs.push(String::new()),
                b"w:tab" => push_to(&mut open, "\t"),
                b"w:br" | b"w:cr" => push_to(&mut open, "\n"),
                _ => {}
            },
            Event::Text(t) if in_text => {
                let text = t.unescape().map_err(malformed)?;
                push_to(&mut open, &text);
            }
            _ => {}
        }
    }

    Ok(paragraphs)
}

fn push_to(open: &mut [String], text: &str) {
    if let Some(current) = open.last_mut() {
        current.push_str(text);
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Builds a minimal .docx archive whose body is `body_xml`.
    pub(crate) fn docx_with_body(body_xml: &str) -> Vec<u8> {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body_xml}</w:body></w:document>"#
        );
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default();
        writer.start_file("[Content_Types].xml", options).unwrap();
        writer.write_all(b"<Types/>").unwrap();
        writer.start_file(DOCUMENT_PART, options).unwrap();
        writer.write_all(xml.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    /// One paragraph per entry, each entry a list of run texts.
    pub(crate) fn docx_with_paragraphs(paragraphs: &[&[&str]]) -> Vec<u8> {
        let body: String = paragraphs
            .iter()
            .map(|runs| {
                let runs: String = runs
                    .iter()
                    .map(|t| format!("<w:r><w:t>{}</w:t></w:r>", escape(*t)))
                    .collect();
                format!("<w:p>{runs}</w:p>")
            })
            .collect();
        docx_with_body(&body)
    }
}
