use crate::document::{Block, RenderedDocument, Table};
use crate::error::AgreementError;

pub const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

pub(crate) const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const XML_DECL: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n";

pub(crate) const PART_CONTENT_TYPES: &str = "[Content_Types].xml";
pub(crate) const PART_ROOT_RELS: &str = "_rels/.rels";
pub(crate) const PART_CORE: &str = "docProps/core.xml";
pub(crate) const PART_APP: &str = "docProps/app.xml";
pub(crate) const PART_DOCUMENT: &str = "word/document.xml";
pub(crate) const PART_STYLES: &str = "word/styles.xml";
pub(crate) const PART_DOCUMENT_RELS: &str = "word/_rels/document.xml.rels";

// US Letter with one-inch margins, in twentieths of a point.
const PAGE_WIDTH_TWIPS: u32 = 12_240;
const PAGE_HEIGHT_TWIPS: u32 = 15_840;
const MARGIN_TWIPS: u32 = 1_440;
const TEXT_WIDTH_TWIPS: u32 = PAGE_WIDTH_TWIPS - 2 * MARGIN_TWIPS;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CoreProperties {
    pub title: String,
    pub creator: String,
}

/// Escapes text for element content and attribute values. Characters XML 1.0
/// cannot carry are a serialization error rather than being dropped.
pub(crate) fn xml_escape(raw: &str) -> Result<String, AgreementError> {
    let mut out = String::with_capacity(raw.len() + 8);
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' | '\n' | '\r' => out.push(ch),
            c if (c as u32) < 0x20 || c == '\u{FFFE}' || c == '\u{FFFF}' => {
                return Err(AgreementError::Serialization(format!(
                    "character U+{:04X} cannot be encoded in XML",
                    c as u32
                )));
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

fn push_runs(out: &mut String, text: &str, bold: bool) -> Result<(), AgreementError> {
    if text.is_empty() {
        return Ok(());
    }
    out.push_str("<w:r>");
    if bold {
        out.push_str("<w:rPr><w:b/></w:rPr>");
    }
    for (line_idx, line) in text.split('\n').enumerate() {
        if line_idx > 0 {
            out.push_str("<w:br/>");
        }
        let line = line.strip_suffix('\r').unwrap_or(line);
        for (tab_idx, piece) in line.split('\t').enumerate() {
            if tab_idx > 0 {
                out.push_str("<w:tab/>");
            }
            if !piece.is_empty() {
                out.push_str("<w:t xml:space=\"preserve\">");
                out.push_str(&xml_escape(piece)?);
                out.push_str("</w:t>");
            }
        }
    }
    out.push_str("</w:r>");
    Ok(())
}

fn push_paragraph(
    out: &mut String,
    style: Option<&str>,
    text: &str,
    bold: bool,
) -> Result<(), AgreementError> {
    out.push_str("<w:p>");
    if let Some(style) = style {
        out.push_str("<w:pPr><w:pStyle w:val=\"");
        out.push_str(style);
        out.push_str("\"/></w:pPr>");
    }
    push_runs(out, text, bold)?;
    out.push_str("</w:p>");
    Ok(())
}

pub(crate) fn heading_style(level: u8) -> String {
    match level {
        0 => "Title".to_string(),
        n => format!("Heading{}", n.min(9)),
    }
}

fn push_table(out: &mut String, table: &Table) -> Result<(), AgreementError> {
    let columns = table.column_count().max(1) as u32;
    let column_width = TEXT_WIDTH_TWIPS / columns;

    out.push_str("<w:tbl><w:tblPr><w:tblStyle w:val=\"TableGrid\"/>");
    out.push_str("<w:tblW w:w=\"0\" w:type=\"auto\"/><w:tblLook w:val=\"04A0\"/></w:tblPr>");
    out.push_str("<w:tblGrid>");
    for _ in 0..columns {
        out.push_str(&format!("<w:gridCol w:w=\"{}\"/>", column_width));
    }
    out.push_str("</w:tblGrid>");

    for (row_idx, row) in table.rows.iter().enumerate() {
        let is_header = table.header && row_idx == 0;
        out.push_str("<w:tr>");
        if is_header {
            out.push_str("<w:trPr><w:tblHeader/></w:trPr>");
        }
        for column in 0..columns as usize {
            let text = row.get(column).map(String::as_str).unwrap_or("");
            out.push_str(&format!(
                "<w:tc><w:tcPr><w:tcW w:w=\"{}\" w:type=\"dxa\"/></w:tcPr>",
                column_width
            ));
            // Every cell needs at least one paragraph, even when empty.
            push_paragraph(out, None, text, is_header)?;
            out.push_str("</w:tc>");
        }
        out.push_str("</w:tr>");
    }
    out.push_str("</w:tbl>");
    Ok(())
}

pub(crate) fn document_xml(doc: &RenderedDocument) -> Result<String, AgreementError> {
    let mut out = String::with_capacity(16 * 1024);
    out.push_str(XML_DECL);
    out.push_str("<w:document xmlns:w=\"");
    out.push_str(W_NS);
    out.push_str("\"><w:body>");

    for block in &doc.blocks {
        match block {
            Block::Heading { level, text } => {
                let style = heading_style(*level);
                push_paragraph(&mut out, Some(style.as_str()), text, false)?
            }
            Block::Paragraph { text } => push_paragraph(&mut out, None, text, false)?,
            Block::Table(table) => push_table(&mut out, table)?,
        }
    }
    if matches!(doc.blocks.last(), Some(Block::Table(_))) {
        out.push_str("<w:p/>");
    }

    out.push_str(&format!(
        "<w:sectPr><w:pgSz w:w=\"{}\" w:h=\"{}\"/><w:pgMar w:top=\"{m}\" w:right=\"{m}\" w:bottom=\"{m}\" w:left=\"{m}\" w:header=\"720\" w:footer=\"720\" w:gutter=\"0\"/></w:sectPr>",
        PAGE_WIDTH_TWIPS,
        PAGE_HEIGHT_TWIPS,
        m = MARGIN_TWIPS
    ));
    out.push_str("</w:body></w:document>");
    Ok(out)
}

fn heading_style_xml(id: &str, name: &str, size_half_points: u32, outline: Option<u8>) -> String {
    let outline = outline
        .map(|level| format!("<w:outlineLvl w:val=\"{}\"/>", level))
        .unwrap_or_default();
    format!(
        "<w:style w:type=\"paragraph\" w:styleId=\"{id}\"><w:name w:val=\"{name}\"/><w:basedOn w:val=\"Normal\"/><w:next w:val=\"Normal\"/><w:qFormat/><w:pPr><w:keepNext/><w:spacing w:before=\"240\" w:after=\"120\"/>{outline}</w:pPr><w:rPr><w:b/><w:sz w:val=\"{size_half_points}\"/></w:rPr></w:style>"
    )
}

pub(crate) fn styles_xml() -> String {
    let mut out = String::with_capacity(4096);
    out.push_str(XML_DECL);
    out.push_str("<w:styles xmlns:w=\"");
    out.push_str(W_NS);
    out.push_str("\">");
    out.push_str("<w:docDefaults><w:rPrDefault><w:rPr><w:rFonts w:ascii=\"Calibri\" w:hAnsi=\"Calibri\" w:cs=\"Calibri\"/><w:sz w:val=\"22\"/></w:rPr></w:rPrDefault><w:pPrDefault><w:pPr><w:spacing w:after=\"160\" w:line=\"259\" w:lineRule=\"auto\"/></w:pPr></w:pPrDefault></w:docDefaults>");
    out.push_str("<w:style w:type=\"paragraph\" w:default=\"1\" w:styleId=\"Normal\"><w:name w:val=\"Normal\"/><w:qFormat/></w:style>");
    out.push_str(&heading_style_xml("Title", "Title", 40, None));
    out.push_str(&heading_style_xml("Heading1", "heading 1", 28, Some(0)));
    out.push_str(&heading_style_xml("Heading2", "heading 2", 24, Some(1)));
    out.push_str("<w:style w:type=\"table\" w:default=\"1\" w:styleId=\"TableNormal\"><w:name w:val=\"Normal Table\"/><w:tblPr><w:tblInd w:w=\"0\" w:type=\"dxa\"/><w:tblCellMar><w:top w:w=\"0\" w:type=\"dxa\"/><w:left w:w=\"108\" w:type=\"dxa\"/><w:bottom w:w=\"0\" w:type=\"dxa\"/><w:right w:w=\"108\" w:type=\"dxa\"/></w:tblCellMar></w:tblPr></w:style>");
    out.push_str("<w:style w:type=\"table\" w:styleId=\"TableGrid\"><w:name w:val=\"Table Grid\"/><w:basedOn w:val=\"TableNormal\"/><w:pPr><w:spacing w:after=\"0\" w:line=\"240\" w:lineRule=\"auto\"/></w:pPr><w:tblPr><w:tblBorders>");
    for edge in ["top", "left", "bottom", "right", "insideH", "insideV"] {
        out.push_str(&format!(
            "<w:{edge} w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"auto\"/>"
        ));
    }
    out.push_str("</w:tblBorders></w:tblPr></w:style>");
    out.push_str("</w:styles>");
    out
}

fn content_types_xml() -> String {
    let mut out = String::from(XML_DECL);
    out.push_str("<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">");
    out.push_str("<Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>");
    out.push_str("<Default Extension=\"xml\" ContentType=\"application/xml\"/>");
    let overrides = [
        (PART_DOCUMENT, "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"),
        (PART_STYLES, "application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"),
        (PART_CORE, "application/vnd.openxmlformats-package.core-properties+xml"),
        (PART_APP, "application/vnd.openxmlformats-officedocument.extended-properties+xml"),
    ];
    for (part, content_type) in overrides {
        out.push_str(&format!(
            "<Override PartName=\"/{}\" ContentType=\"{}\"/>",
            part, content_type
        ));
    }
    out.push_str("</Types>");
    out
}

fn relationships_xml(targets: &[(&str, &str)]) -> String {
    let mut out = String::from(XML_DECL);
    out.push_str("<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">");
    for (idx, (rel_type, target)) in targets.iter().enumerate() {
        out.push_str(&format!(
            "<Relationship Id=\"rId{}\" Type=\"{}\" Target=\"{}\"/>",
            idx + 1,
            rel_type,
            target
        ));
    }
    out.push_str("</Relationships>");
    out
}

// No timestamps: identical input must give identical bytes.
fn core_xml(props: &CoreProperties) -> Result<String, AgreementError> {
    let mut out = String::from(XML_DECL);
    out.push_str("<cp:coreProperties xmlns:cp=\"http://schemas.openxmlformats.org/package/2006/metadata/core-properties\" xmlns:dc=\"http://purl.org/dc/elements/1.1/\" xmlns:dcterms=\"http://purl.org/dc/terms/\" xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">");
    out.push_str(&format!("<dc:title>{}</dc:title>", xml_escape(&props.title)?));
    out.push_str(&format!(
        "<dc:creator>{}</dc:creator>",
        xml_escape(&props.creator)?
    ));
    out.push_str("</cp:coreProperties>");
    Ok(out)
}

fn app_xml() -> String {
    let mut out = String::from(XML_DECL);
    out.push_str("<Properties xmlns=\"http://schemas.openxmlformats.org/officeDocument/2006/extended-properties\">");
    out.push_str(&format!(
        "<Application>{} {}</Application>",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    ));
    out.push_str("</Properties>");
    out
}

/// Every part of the package, in the order they are written to the container.
pub(crate) fn package_parts(
    doc: &RenderedDocument,
    props: &CoreProperties,
) -> Result<Vec<(&'static str, Vec<u8>)>, AgreementError> {
    let root_rels = relationships_xml(&[
        (
            "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument",
            PART_DOCUMENT,
        ),
        (
            "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties",
            PART_CORE,
        ),
        (
            "http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties",
            PART_APP,
        ),
    ]);
    let document_rels = relationships_xml(&[(
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles",
        "styles.xml",
    )]);

    Ok(vec![
        (PART_CONTENT_TYPES, content_types_xml().into_bytes()),
        (PART_ROOT_RELS, root_rels.into_bytes()),
        (PART_CORE, core_xml(props)?.into_bytes()),
        (PART_APP, app_xml().into_bytes()),
        (PART_DOCUMENT, document_xml(doc)?.into_bytes()),
        (PART_STYLES, styles_xml().into_bytes()),
        (PART_DOCUMENT_RELS, document_rels.into_bytes()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xml: &str) -> roxmltree::Document<'_> {
        roxmltree::Document::parse(xml).expect("well-formed xml")
    }

    #[test]
    fn escapes_markup_characters() {
        assert_eq!(
            xml_escape("Tom & \"Jerry\" <3 'em").expect("escape"),
            "Tom &amp; &quot;Jerry&quot; &lt;3 &apos;em"
        );
    }

    #[test]
    fn rejects_characters_xml_cannot_encode() {
        let err = xml_escape("bad\u{1}value").expect_err("control char");
        assert!(matches!(err, AgreementError::Serialization(_)));
        assert!(err.to_string().contains("U+0001"));
        assert!(xml_escape("tab\tand\nnewline").is_ok());
    }

    #[test]
    fn heading_levels_map_to_styles() {
        assert_eq!(heading_style(0), "Title");
        assert_eq!(heading_style(1), "Heading1");
        assert_eq!(heading_style(2), "Heading2");
    }

    #[test]
    fn document_xml_is_well_formed_and_breaks_lines() {
        let mut doc = RenderedDocument::default();
        doc.heading(1, "Signature Canvas");
        doc.paragraph("Printed Name: A & B\nDate: [Date]");
        let xml = document_xml(&doc).expect("xml");
        let parsed = parse(&xml);
        let root = parsed.root_element();
        assert_eq!(root.tag_name().namespace(), Some(W_NS));
        assert_eq!(root.tag_name().name(), "document");
        let breaks = parsed
            .descendants()
            .filter(|n| n.tag_name().name() == "br")
            .count();
        assert_eq!(breaks, 1);
        assert!(xml.contains("<w:pStyle w:val=\"Heading1\"/>"));
        assert!(xml.contains("A &amp; B"));
    }

    #[test]
    fn tables_pad_cells_and_end_with_a_paragraph() {
        let mut doc = RenderedDocument::default();
        let mut table = Table::with_header(&["A", "B", "C"]);
        table.push_row(["1"]);
        doc.table(table);
        let xml = document_xml(&doc).expect("xml");
        let parsed = parse(&xml);
        let cells = parsed
            .descendants()
            .filter(|n| n.tag_name().name() == "tc")
            .collect::<Vec<_>>();
        assert_eq!(cells.len(), 6);
        assert!(cells.iter().all(|cell| cell
            .children()
            .any(|child| child.tag_name().name() == "p")));
        assert!(xml.contains("<w:tblHeader/>"));
        assert!(xml.contains("</w:tbl><w:p/><w:sectPr>"));
    }

    #[test]
    fn package_parts_are_well_formed_xml_in_fixed_order() {
        let mut doc = RenderedDocument::default();
        doc.paragraph("hello");
        let props = CoreProperties {
            title: "Illustration Agreement: \"Kite\"".to_string(),
            creator: "Jane".to_string(),
        };
        let parts = package_parts(&doc, &props).expect("parts");
        let names: Vec<&str> = parts.iter().map(|(name, _)| *name).collect();
        assert_eq!(
            names,
            vec![
                PART_CONTENT_TYPES,
                PART_ROOT_RELS,
                PART_CORE,
                PART_APP,
                PART_DOCUMENT,
                PART_STYLES,
                PART_DOCUMENT_RELS
            ]
        );
        for (name, bytes) in &parts {
            let text = std::str::from_utf8(bytes).expect("utf8");
            roxmltree::Document::parse(text).unwrap_or_else(|e| panic!("{name}: {e}"));
        }
        let styles = std::str::from_utf8(&parts[5].1).expect("utf8");
        for id in ["Normal", "Title", "Heading1", "Heading2", "TableGrid"] {
            assert!(styles.contains(&format!("w:styleId=\"{id}\"")), "{id}");
        }
    }
}
