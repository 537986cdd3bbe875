use crate::document::{RenderedDocument, Table};
use crate::fields::{FieldSet, ResolvedFields};
use illustration_agreement_template as template;
use illustration_agreement_template::Field;

/// Replaces `{field_key}` tokens with resolved values. Tokens that do not name
/// a known field, and unclosed braces, are kept verbatim.
pub fn interpolate(body: &str, fields: &ResolvedFields) -> String {
    let mut out = String::with_capacity(body.len() + 64);
    let mut rest = body;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        rest = &rest[start + 1..];

        let Some(end) = rest.find('}') else {
            out.push('{');
            out.push_str(rest);
            return out;
        };

        let token = &rest[..end];
        match fields.by_key(token.trim()) {
            Some(value) => out.push_str(value),
            None => {
                out.push('{');
                out.push_str(token);
                out.push('}');
            }
        }
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    out
}

pub fn compose_document(fields: &ResolvedFields) -> RenderedDocument {
    let mut doc = RenderedDocument::default();

    doc.heading(0, template::AGREEMENT_TITLE);
    doc.paragraph(template::DRAFT_NOTICE);
    doc.paragraph(interpolate(template::GOVERNING_LAW_LINE, fields));

    doc.heading(1, template::PARTIES_HEADING);
    doc.paragraph(template::PARTIES_INTRO);
    for line in template::PARTY_LINES {
        doc.paragraph(interpolate(line, fields));
    }

    for section in template::section_defs() {
        doc.heading(1, section.heading());
        doc.paragraph(interpolate(section.body, fields));
    }

    doc.heading(1, template::SIGNATURE_HEADING);
    let date = fields.get(Field::EffectiveDate);
    for signatory in template::signatory_defs() {
        doc.paragraph(format!(
            "{} Signature: {}\nPrinted Name: {}\nDate: {}",
            signatory.role,
            template::SIGNATURE_RULE,
            fields.get(signatory.name_field),
            date
        ));
    }

    doc.heading(1, template::INITIALS_HEADING);
    let mut initials = Table::with_header(&template::INITIALS_HEADER);
    for page in template::INITIALS_PAGES {
        initials.push_row([page, template::INITIALS_BLANK, template::INITIALS_BLANK]);
    }
    doc.table(initials);

    doc.heading(1, template::EXHIBIT_A_HEADING);
    let mut exhibit = Table::with_header(&template::EXHIBIT_A_HEADER);
    exhibit.push_row(template::EXHIBIT_A_HEADER.map(|_| String::new()));
    doc.table(exhibit);

    doc
}

/// `Illustration_Agreement_for_<title>.docx`, with spaces turned into
/// underscores and straight/curly quotes removed. Other characters pass
/// through unchanged.
pub fn agreement_filename(fields: &FieldSet) -> String {
    let title = fields.value_or(
        Field::BookTitle.key(),
        template::FILENAME_FALLBACK_TITLE,
    );
    format!(
        "{}{}.{}",
        template::FILENAME_PREFIX,
        sanitize_title(title),
        template::FILENAME_EXTENSION
    )
}

pub(crate) fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| !matches!(c, '\'' | '"' | '\u{2018}' | '\u{2019}' | '\u{201C}' | '\u{201D}'))
        .map(|c| if c == ' ' { '_' } else { c })
        .collect()
}
