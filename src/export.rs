//! Rebuild a downloadable `.docx` from the current paragraph texts.
//!
//! When the original upload is a readable `.docx`, its package is copied
//! and only `word/document.xml` is rewritten: the k-th non-blank top-level
//! `w:p` receives the k-th stored paragraph, keeping its `w:pPr` and the
//! first run's `w:rPr`. Blank paragraphs and every other part are copied
//! untouched. Anything else falls back to a minimal fresh document.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;

use crate::error::{PcError, PcResult};
use crate::extract::{read_zip_entry_bounded, DOCUMENT_XML, MAX_XML_ENTRY_BYTES};

/// How an export was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    /// Paragraph text substituted into the original package.
    InPlace,
    /// Fresh document built from the texts alone.
    Fresh,
}

impl ExportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportMode::InPlace => "in-place",
            ExportMode::Fresh => "fresh",
        }
    }
}

/// Build the export artifact, preferring in-place substitution.
///
/// Only a failure of the fresh fallback is an error.
pub fn build_docx(original: Option<&[u8]>, texts: &[String]) -> PcResult<(Vec<u8>, ExportMode)> {
    if let Some(bytes) = original {
        match rewrite_docx(bytes, texts) {
            Ok(out) => return Ok((out, ExportMode::InPlace)),
            Err(e) => {
                tracing::warn!(error = %e, "original document unusable, exporting a fresh one")
            }
        }
    }
    Ok((fresh_docx(texts)?, ExportMode::Fresh))
}

fn xml_err(e: impl std::fmt::Display) -> PcError {
    PcError::Export(e.to_string())
}

/// Copy the package, replacing paragraph text in `word/document.xml`.
pub fn rewrite_docx(original: &[u8], texts: &[String]) -> PcResult<Vec<u8>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(original)).map_err(xml_err)?;
    let document_xml = read_zip_entry_bounded(&mut archive, DOCUMENT_XML, MAX_XML_ENTRY_BYTES)
        .map_err(xml_err)?;
    let rewritten = rewrite_document_xml(&document_xml, texts)?;

    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    let mut out = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(xml_err)?;
        let name = entry.name().to_string();
        if entry.is_dir() {
            out.add_directory(name, options).map_err(xml_err)?;
            continue;
        }
        let data = if name == DOCUMENT_XML {
            rewritten.clone()
        } else {
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            data
        };
        out.start_file(name, options).map_err(xml_err)?;
        out.write_all(&data)?;
    }
    Ok(out.finish().map_err(xml_err)?.into_inner())
}

fn rewrite_document_xml(xml: &[u8], texts: &[String]) -> PcResult<Vec<u8>> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut buf = Vec::new();
    let mut paragraph: Vec<Event<'static>> = Vec::new();
    let mut depth = 0usize;
    let mut next_text = texts.iter();

    loop {
        let event = reader.read_event_into(&mut buf).map_err(xml_err)?.into_owned();
        buf.clear();
        let mark = match &event {
            Event::Eof => break,
            Event::Start(e) if e.local_name().as_ref() == b"p" => Mark::ParagraphStart,
            Event::End(e) if e.local_name().as_ref() == b"p" => Mark::ParagraphEnd,
            Event::End(e) if e.local_name().as_ref() == b"body" => Mark::BodyEnd,
            _ => Mark::Other,
        };
        match mark {
            Mark::ParagraphStart => {
                depth += 1;
                paragraph.push(event);
                continue;
            }
            Mark::ParagraphEnd if depth > 0 => {
                depth -= 1;
                paragraph.push(event);
                if depth == 0 {
                    let events = std::mem::take(&mut paragraph);
                    let replacement = if paragraph_text(&events).trim().is_empty() {
                        None
                    } else {
                        next_text.next()
                    };
                    match replacement {
                        Some(text) => write_all(&mut writer, substitute(&events, text))?,
                        None => write_all(&mut writer, events)?,
                    }
                }
                continue;
            }
            Mark::BodyEnd if depth == 0 => {
                // Paragraphs the original never had go at the end of the body.
                for text in next_text.by_ref() {
                    write_all(&mut writer, plain_paragraph(text))?;
                }
            }
            _ => {}
        }
        if depth > 0 {
            paragraph.push(event);
        } else {
            writer.write_event(event).map_err(xml_err)?;
        }
    }

    if depth != 0 {
        return Err(PcError::Export(format!(
            "{} ends inside a paragraph",
            DOCUMENT_XML
        )));
    }
    Ok(writer.into_inner().into_inner())
}

enum Mark {
    ParagraphStart,
    ParagraphEnd,
    BodyEnd,
    Other,
}

fn write_all(writer: &mut Writer<Cursor<Vec<u8>>>, events: Vec<Event<'static>>) -> PcResult<()> {
    for event in events {
        writer.write_event(event).map_err(xml_err)?;
    }
    Ok(())
}

/// Visible text of a buffered paragraph.
fn paragraph_text(events: &[Event<'static>]) -> String {
    let mut out = String::new();
    let mut in_text = false;
    for event in events {
        match event {
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_text = true,
            Event::End(e) if e.local_name().as_ref() == b"t" => in_text = false,
            Event::Text(t) if in_text => {
                if let Ok(s) = t.unescape() {
                    out.push_str(&s);
                }
            }
            Event::Empty(e) if e.local_name().as_ref() == b"tab" => out.push('\t'),
            _ => {}
        }
    }
    out
}

/// Index one past the end of the element starting at `start`.
fn element_end(events: &[Event<'static>], start: usize) -> usize {
    if !matches!(events[start], Event::Start(_)) {
        return start + 1;
    }
    let mut depth = 0usize;
    for (i, event) in events.iter().enumerate().skip(start) {
        match event {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
    }
    events.len()
}

fn local_name_is(event: &Event<'static>, name: &[u8]) -> bool {
    match event {
        Event::Start(e) | Event::Empty(e) => e.local_name().as_ref() == name,
        _ => false,
    }
}

/// Rebuild one paragraph: original start tag, `w:pPr`, then a single run
/// carrying the first run's `w:rPr` and the new text.
fn substitute(events: &[Event<'static>], text: &str) -> Vec<Event<'static>> {
    let last = events.len() - 1;
    let mut p_pr: Vec<Event<'static>> = Vec::new();
    let mut r_pr: Option<Vec<Event<'static>>> = None;

    let mut i = 1;
    while i < last {
        let end = element_end(events, i);
        if local_name_is(&events[i], b"pPr") {
            p_pr.extend_from_slice(&events[i..end]);
        } else if r_pr.is_none() && local_name_is(&events[i], b"r") {
            let mut j = i + 1;
            let mut found = Vec::new();
            while j < end.saturating_sub(1) {
                let child_end = element_end(events, j);
                if local_name_is(&events[j], b"rPr") {
                    found.extend_from_slice(&events[j..child_end]);
                    break;
                }
                j = child_end;
            }
            r_pr = Some(found);
        }
        i = end;
    }

    let mut out = Vec::with_capacity(p_pr.len() + 8);
    out.push(events[0].clone());
    out.extend(p_pr);
    out.extend(run(r_pr.unwrap_or_default(), text));
    out.push(events[last].clone());
    out
}

fn plain_paragraph(text: &str) -> Vec<Event<'static>> {
    let mut out = vec![Event::Start(BytesStart::new("w:p"))];
    out.extend(run(Vec::new(), text));
    out.push(Event::End(BytesEnd::new("w:p")));
    out
}

/// A `w:r` holding `text`, with tabs and line breaks as their own elements.
fn run(r_pr: Vec<Event<'static>>, text: &str) -> Vec<Event<'static>> {
    let mut out = vec![Event::Start(BytesStart::new("w:r"))];
    out.extend(r_pr);
    for (n, line) in text.split('\n').enumerate() {
        if n > 0 {
            out.push(Event::Empty(BytesStart::new("w:br")));
        }
        for (m, piece) in line.split('\t').enumerate() {
            if m > 0 {
                out.push(Event::Empty(BytesStart::new("w:tab")));
            }
            if !piece.is_empty() {
                out.push(Event::Start(
                    BytesStart::new("w:t").with_attributes([("xml:space", "preserve")]),
                ));
                out.push(Event::Text(BytesText::new(piece).into_owned()));
                out.push(Event::End(BytesEnd::new("w:t")));
            }
        }
    }
    out.push(Event::End(BytesEnd::new("w:r")));
    out
}

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

const WORDML_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

/// A minimal package with one paragraph per text.
pub fn fresh_docx(texts: &[String]) -> PcResult<Vec<u8>> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer
        .write_event(Event::Decl(quick_xml::events::BytesDecl::new(
            "1.0",
            Some("UTF-8"),
            Some("yes"),
        )))
        .map_err(xml_err)?;
    writer
        .write_event(Event::Start(
            BytesStart::new("w:document").with_attributes([("xmlns:w", WORDML_NS)]),
        ))
        .map_err(xml_err)?;
    writer
        .write_event(Event::Start(BytesStart::new("w:body")))
        .map_err(xml_err)?;
    for text in texts {
        write_all(&mut writer, plain_paragraph(text))?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("w:body")))
        .map_err(xml_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("w:document")))
        .map_err(xml_err)?;
    let document_xml = writer.into_inner().into_inner();

    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in [
        ("[Content_Types].xml", CONTENT_TYPES_XML.as_bytes()),
        ("_rels/.rels", ROOT_RELS_XML.as_bytes()),
        (DOCUMENT_XML, document_xml.as_slice()),
    ] {
        zip.start_file(name, options).map_err(xml_err)?;
        zip.write_all(data).map_err(xml_err)?;
    }
    Ok(zip.finish().map_err(xml_err)?.into_inner())
}

/// Download name for an exported document: the title with a `.docx` extension.
pub fn export_filename(title: &str) -> String {
    let stem = match title.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => title,
    };
    format!("{}.docx", stem)
}
