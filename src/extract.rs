//! Paragraph extraction from uploaded files.
//!
//! Supported: `.docx` (one paragraph per top-level `w:p` of
//! `word/document.xml`), `.txt` and `.md` (blank-line separated blocks) and
//! `.pdf` (text via `pdf-extract`, then blank-line separated blocks).
//! Every format yields trimmed, non-blank paragraphs in document order.

use quick_xml::events::Event;
use std::io::Read;

use crate::error::{PcError, PcResult};

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
pub(crate) const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

pub(crate) const DOCUMENT_XML: &str = "word/document.xml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Docx,
    Text,
    Markdown,
    Pdf,
}

impl FileFormat {
    /// Detect the format from a declared filename. Case-insensitive.
    pub fn from_filename(filename: &str) -> PcResult<Self> {
        let ext = extension(filename).ok_or_else(|| {
            PcError::Validation(format!("file has no extension: {}", filename))
        })?;
        match ext.as_str() {
            "docx" => Ok(FileFormat::Docx),
            "txt" => Ok(FileFormat::Text),
            "md" | "markdown" => Ok(FileFormat::Markdown),
            "pdf" => Ok(FileFormat::Pdf),
            other => Err(PcError::Validation(format!(
                "unsupported file type: .{}",
                other
            ))),
        }
    }
}

/// Lower-cased extension of a filename, without the dot.
pub fn extension(filename: &str) -> Option<String> {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Extract ordered, trimmed, non-blank paragraphs.
///
/// Empty input and unsupported extensions are validation errors; a file
/// that parses to nothing, or a broken container, is a parse error.
pub fn extract_paragraphs(bytes: &[u8], filename: &str) -> PcResult<Vec<String>> {
    if filename.trim().is_empty() {
        return Err(PcError::Validation("filename is required".to_string()));
    }
    let format = FileFormat::from_filename(filename)?;
    if bytes.is_empty() {
        return Err(PcError::Validation("file is empty".to_string()));
    }

    let paragraphs = match format {
        FileFormat::Docx => extract_docx(bytes)?,
        FileFormat::Text | FileFormat::Markdown => split_blocks(&decode_text(bytes)),
        FileFormat::Pdf => split_blocks(&extract_pdf(bytes)?),
    };

    if paragraphs.is_empty() {
        return Err(PcError::Parse(format!(
            "no paragraphs found in {}",
            filename
        )));
    }
    Ok(paragraphs)
}

fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Split on blank lines; lines inside one block are kept together.
pub(crate) fn split_blocks(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        let line = line.trim_end_matches('\u{c}');
        if line.trim().is_empty() {
            flush_block(&mut current, &mut out);
        } else {
            current.push(line.trim());
        }
    }
    flush_block(&mut current, &mut out);
    out
}

fn flush_block(current: &mut Vec<&str>, out: &mut Vec<String>) {
    if !current.is_empty() {
        out.push(current.join("\n"));
        current.clear();
    }
}

fn extract_pdf(bytes: &[u8]) -> PcResult<String> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| PcError::Parse(format!("PDF extraction failed: {}", e)))
}

pub(crate) fn read_zip_entry_bounded<R: Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
    max_bytes: u64,
) -> PcResult<Vec<u8>> {
    let entry = archive
        .by_name(name)
        .map_err(|e| PcError::Parse(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| PcError::Parse(format!("{}: {}", name, e)))?;
    if out.len() as u64 >= max_bytes {
        return Err(PcError::Parse(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> PcResult<Vec<String>> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| PcError::Parse(format!("not a valid .docx package: {}", e)))?;
    let xml = read_zip_entry_bounded(&mut archive, DOCUMENT_XML, MAX_XML_ENTRY_BYTES)?;
    Ok(docx_paragraph_texts(&xml)?
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect())
}

/// Raw text of every top-level `w:p`, blank ones included, in order.
///
/// Export walks paragraphs with the same rules, so the k-th non-blank entry
/// here is the k-th paragraph it rewrites.
pub(crate) fn docx_paragraph_texts(xml: &[u8]) -> PcResult<Vec<String>> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut in_text = false;
    let mut current = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => depth += 1,
                b"t" if depth > 0 => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"p" if depth == 0 => out.push(String::new()),
                b"tab" if depth > 0 => current.push('\t'),
                b"br" if depth > 0 => current.push('\n'),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| PcError::Parse(format!("{}: {}", DOCUMENT_XML, e)))?;
                current.push_str(&text);
            }
            Ok(Event::CData(cd)) if in_text => {
                current.push_str(&String::from_utf8_lossy(&cd.into_inner()));
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" if depth > 0 => {
                    depth -= 1;
                    if depth == 0 {
                        out.push(std::mem::take(&mut current));
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(PcError::Parse(format!("{}: {}", DOCUMENT_XML, e))),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}
