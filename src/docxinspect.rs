use crate::flate_native::inflate_raw;
use crate::package::{CENTRAL_HEADER_SIG, END_OF_CENTRAL_DIR_SIG, LOCAL_HEADER_SIG, METHOD_DEFLATE, METHOD_STORED};
use crate::wordml::{PART_DOCUMENT, W_NS};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocxInspectErrorCode {
    DocxZipInvalid,
    DocxPartMissing,
    DocxXmlInvalid,
    DocxUnsupportedCompression,
    DocxIoError,
}

impl DocxInspectErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocxInspectErrorCode::DocxZipInvalid => "DOCX_ZIP_INVALID",
            DocxInspectErrorCode::DocxPartMissing => "DOCX_PART_MISSING",
            DocxInspectErrorCode::DocxXmlInvalid => "DOCX_XML_INVALID",
            DocxInspectErrorCode::DocxUnsupportedCompression => "DOCX_UNSUPPORTED_COMPRESSION",
            DocxInspectErrorCode::DocxIoError => "DOCX_IO_ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocxInspectError {
    pub code: DocxInspectErrorCode,
    pub message: String,
}

impl DocxInspectError {
    fn new(code: DocxInspectErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn zip(message: impl Into<String>) -> Self {
        Self::new(DocxInspectErrorCode::DocxZipInvalid, message)
    }
}

impl std::fmt::Display for DocxInspectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for DocxInspectError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectedParagraph {
    pub style: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocxInspectReport {
    pub part_names: Vec<String>,
    pub paragraphs: Vec<InspectedParagraph>,
    pub tables: Vec<Vec<Vec<String>>>,
    pub file_size_bytes: usize,
}

impl DocxInspectReport {
    pub fn table_shape(&self, index: usize) -> Option<(usize, usize)> {
        let table = self.tables.get(index)?;
        let columns = table.iter().map(Vec::len).max().unwrap_or(0);
        Some((table.len(), columns))
    }

    pub fn paragraphs_with_style<'a>(&'a self, style: &'a str) -> impl Iterator<Item = &'a str> {
        self.paragraphs
            .iter()
            .filter(move |p| p.style.as_deref() == Some(style))
            .map(|p| p.text.as_str())
    }

    pub fn body_text(&self) -> String {
        let mut out = String::new();
        for paragraph in &self.paragraphs {
            out.push_str(&paragraph.text);
            out.push('\n');
        }
        out
    }
}

struct ZipEntry {
    name: String,
    method: u16,
    compressed_size: usize,
    uncompressed_size: usize,
    local_header_offset: usize,
}

fn read_u16(data: &[u8], at: usize) -> Result<u16, DocxInspectError> {
    data.get(at..at + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| DocxInspectError::zip("truncated record"))
}

fn read_u32(data: &[u8], at: usize) -> Result<u32, DocxInspectError> {
    data.get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| DocxInspectError::zip("truncated record"))
}

fn find_end_of_central_directory(data: &[u8]) -> Result<usize, DocxInspectError> {
    if data.len() < 22 {
        return Err(DocxInspectError::zip("file too small for a zip archive"));
    }
    // The record is 22 bytes plus a comment of at most 65535 bytes.
    let lowest = data.len().saturating_sub(22 + u16::MAX as usize);
    (lowest..=data.len() - 22)
        .rev()
        .find(|&at| read_u32(data, at).ok() == Some(END_OF_CENTRAL_DIR_SIG))
        .ok_or_else(|| DocxInspectError::zip("end of central directory not found"))
}

fn read_central_directory(data: &[u8]) -> Result<Vec<ZipEntry>, DocxInspectError> {
    let eocd = find_end_of_central_directory(data)?;
    let count = read_u16(data, eocd + 10)? as usize;
    let mut at = read_u32(data, eocd + 16)? as usize;

    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        if read_u32(data, at)? != CENTRAL_HEADER_SIG {
            return Err(DocxInspectError::zip("bad central directory header"));
        }
        let method = read_u16(data, at + 10)?;
        let compressed_size = read_u32(data, at + 20)? as usize;
        let uncompressed_size = read_u32(data, at + 24)? as usize;
        let name_len = read_u16(data, at + 28)? as usize;
        let extra_len = read_u16(data, at + 30)? as usize;
        let comment_len = read_u16(data, at + 32)? as usize;
        let local_header_offset = read_u32(data, at + 42)? as usize;
        let name_bytes = data
            .get(at + 46..at + 46 + name_len)
            .ok_or_else(|| DocxInspectError::zip("truncated entry name"))?;
        let name = String::from_utf8_lossy(name_bytes).into_owned();
        entries.push(ZipEntry {
            name,
            method,
            compressed_size,
            uncompressed_size,
            local_header_offset,
        });
        at += 46 + name_len + extra_len + comment_len;
    }
    Ok(entries)
}

fn read_entry(data: &[u8], entry: &ZipEntry) -> Result<Vec<u8>, DocxInspectError> {
    let at = entry.local_header_offset;
    if read_u32(data, at)? != LOCAL_HEADER_SIG {
        return Err(DocxInspectError::zip(format!(
            "bad local header for '{}'",
            entry.name
        )));
    }
    let name_len = read_u16(data, at + 26)? as usize;
    let extra_len = read_u16(data, at + 28)? as usize;
    let start = at + 30 + name_len + extra_len;
    let payload = data
        .get(start..start + entry.compressed_size)
        .ok_or_else(|| DocxInspectError::zip(format!("truncated data for '{}'", entry.name)))?;
    match entry.method {
        METHOD_STORED => Ok(payload.to_vec()),
        METHOD_DEFLATE => inflate_raw(payload, entry.uncompressed_size)
            .map_err(|err| DocxInspectError::zip(format!("{}: {}", entry.name, err))),
        other => Err(DocxInspectError::new(
            DocxInspectErrorCode::DocxUnsupportedCompression,
            format!("'{}' uses zip method {}", entry.name, other),
        )),
    }
}

fn is_w(node: &roxmltree::Node<'_, '_>, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name && node.tag_name().namespace() == Some(W_NS)
}

fn paragraph_text(paragraph: roxmltree::Node<'_, '_>) -> String {
    let mut out = String::new();
    for node in paragraph.descendants() {
        if is_w(&node, "t") {
            out.push_str(node.text().unwrap_or(""));
        } else if is_w(&node, "br") {
            out.push('\n');
        } else if is_w(&node, "tab") {
            out.push('\t');
        }
    }
    out
}

fn paragraph_style(paragraph: roxmltree::Node<'_, '_>) -> Option<String> {
    paragraph
        .children()
        .find(|n| is_w(n, "pPr"))?
        .children()
        .find(|n| is_w(n, "pStyle"))?
        .attribute((W_NS, "val"))
        .map(str::to_string)
}

fn table_rows(table: roxmltree::Node<'_, '_>) -> Vec<Vec<String>> {
    table
        .children()
        .filter(|n| is_w(n, "tr"))
        .map(|row| {
            row.children()
                .filter(|n| is_w(n, "tc"))
                .map(|cell| {
                    cell.children()
                        .filter(|n| is_w(n, "p"))
                        .map(paragraph_text)
                        .collect::<Vec<_>>()
                        .join("\n")
                })
                .collect()
        })
        .collect()
}

pub fn inspect_docx_bytes(bytes: &[u8]) -> Result<DocxInspectReport, DocxInspectError> {
    let entries = read_central_directory(bytes)?;
    let document_entry = entries
        .iter()
        .find(|entry| entry.name == PART_DOCUMENT)
        .ok_or_else(|| {
            DocxInspectError::new(
                DocxInspectErrorCode::DocxPartMissing,
                format!("package has no '{}'", PART_DOCUMENT),
            )
        })?;
    let document_bytes = read_entry(bytes, document_entry)?;
    let xml = std::str::from_utf8(&document_bytes).map_err(|err| {
        DocxInspectError::new(DocxInspectErrorCode::DocxXmlInvalid, err.to_string())
    })?;
    let parsed = roxmltree::Document::parse(xml).map_err(|err| {
        DocxInspectError::new(DocxInspectErrorCode::DocxXmlInvalid, err.to_string())
    })?;
    let body = parsed
        .root_element()
        .children()
        .find(|n| is_w(n, "body"))
        .ok_or_else(|| {
            DocxInspectError::new(DocxInspectErrorCode::DocxXmlInvalid, "document has no body")
        })?;

    let mut paragraphs = Vec::new();
    let mut tables = Vec::new();
    for node in body.children() {
        if is_w(&node, "p") {
            paragraphs.push(InspectedParagraph {
                style: paragraph_style(node),
                text: paragraph_text(node),
            });
        } else if is_w(&node, "tbl") {
            tables.push(table_rows(node));
        }
    }

    Ok(DocxInspectReport {
        part_names: entries.into_iter().map(|entry| entry.name).collect(),
        paragraphs,
        tables,
        file_size_bytes: bytes.len(),
    })
}

pub fn inspect_docx_path(path: &Path) -> Result<DocxInspectReport, DocxInspectError> {
    let data = std::fs::read(path)
        .map_err(|err| DocxInspectError::new(DocxInspectErrorCode::DocxIoError, err.to_string()))?;
    inspect_docx_bytes(&data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{PackageOptions, write_package};

    fn package_with_document(xml: &str, compress: bool) -> Vec<u8> {
        let mut out = Vec::new();
        write_package(
            &mut out,
            &[
                ("[Content_Types].xml", b"<Types/>".to_vec()),
                (PART_DOCUMENT, xml.as_bytes().to_vec()),
            ],
            PackageOptions { compress },
        )
        .expect("package");
        out
    }

    const SAMPLE: &str = "<w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>\
        <w:p><w:pPr><w:pStyle w:val=\"Heading1\"/></w:pPr><w:r><w:t>Initials</w:t></w:r></w:p>\
        <w:tbl><w:tr><w:tc><w:p><w:r><w:t>Page</w:t></w:r></w:p></w:tc><w:tc><w:p/></w:tc></w:tr></w:tbl>\
        <w:p><w:r><w:t>a</w:t><w:br/><w:t>b</w:t></w:r></w:p>\
        </w:body></w:document>";

    #[test]
    fn reads_paragraphs_and_tables_from_stored_and_deflated_packages() {
        for compress in [false, true] {
            let bytes = package_with_document(SAMPLE, compress);
            let report = inspect_docx_bytes(&bytes).expect("inspect");
            assert_eq!(report.part_names, vec!["[Content_Types].xml", PART_DOCUMENT]);
            assert_eq!(report.paragraphs.len(), 2);
            assert_eq!(report.paragraphs[0].style.as_deref(), Some("Heading1"));
            assert_eq!(report.paragraphs[1].text, "a\nb");
            assert_eq!(report.table_shape(0), Some((1, 2)));
            assert_eq!(report.tables[0][0], vec!["Page".to_string(), String::new()]);
            assert_eq!(report.paragraphs_with_style("Heading1").collect::<Vec<_>>(), vec!["Initials"]);
            assert_eq!(report.file_size_bytes, bytes.len());
        }
    }

    #[test]
    fn rejects_non_zip_data() {
        let err = inspect_docx_bytes(b"not a docx").expect_err("invalid");
        assert_eq!(err.code, DocxInspectErrorCode::DocxZipInvalid);
        let err = inspect_docx_bytes(&[0u8; 64]).expect_err("invalid");
        assert_eq!(err.code, DocxInspectErrorCode::DocxZipInvalid);
    }

    #[test]
    fn reports_missing_document_part() {
        let mut out = Vec::new();
        write_package(
            &mut out,
            &[("[Content_Types].xml", b"<Types/>".to_vec())],
            PackageOptions::default(),
        )
        .expect("package");
        let err = inspect_docx_bytes(&out).expect_err("missing");
        assert_eq!(err.code, DocxInspectErrorCode::DocxPartMissing);
        assert!(err.to_string().starts_with("DOCX_PART_MISSING"));
    }

    #[test]
    fn reports_malformed_document_xml() {
        let bytes = package_with_document("<w:document><unclosed>", false);
        let err = inspect_docx_bytes(&bytes).expect_err("bad xml");
        assert_eq!(err.code, DocxInspectErrorCode::DocxXmlInvalid);
    }

    #[test]
    fn inspect_docx_path_reports_io_error_for_missing_file() {
        let missing = std::env::temp_dir().join(format!(
            "illustration_agreement_missing_{}_{}.docx",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        let err = inspect_docx_path(&missing).expect_err("missing");
        assert_eq!(err.code, DocxInspectErrorCode::DocxIoError);
    }
}
