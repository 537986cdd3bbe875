use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

pub const TEMPLATE_ID: &str = "illustration_agreement.childrens_book";

pub const AGREEMENT_TITLE: &str = "CHILDREN\u{2019}S BOOK ILLUSTRATION AGREEMENT";
pub const DRAFT_NOTICE: &str = "(Draft for creative practice only \u{2014} not legal advice)";
pub const GOVERNING_LAW_LINE: &str = "Governing Law: {governing_law}";

pub const PARTIES_HEADING: &str = "Parties";
pub const PARTIES_INTRO: &str = "This Agreement is made between:";
pub const PARTY_LINES: [&str; 4] = [
    "Author/Creator: {author_name}, residing in {author_city_state}",
    "Illustrator (Minor): {illustrator_name}",
    "Parent/Legal Guardian: {guardian_name}, residing in {guardian_city_state}",
    "Effective as of: {effective_date}",
];

pub const SIGNATURE_HEADING: &str = "Signature Canvas";
pub const SIGNATURE_RULE: &str = "________________________________";

pub const INITIALS_HEADING: &str = "Initials";
pub const INITIALS_HEADER: [&str; 3] = ["Page", "Author Initials", "Guardian Initials"];
pub const INITIALS_PAGES: [&str; 3] = ["1", "2", "3"];
pub const INITIALS_BLANK: &str = "________";

pub const EXHIBIT_A_HEADING: &str = "Exhibit A: Illustration Schedule";
pub const EXHIBIT_A_HEADER: [&str; 5] = ["Illustration", "Description", "Format", "Due Date", "Status"];

pub const FILENAME_PREFIX: &str = "Illustration_Agreement_for_";
pub const FILENAME_FALLBACK_TITLE: &str = "Book";
pub const FILENAME_EXTENSION: &str = "docx";

/// A recognized form field. The set is closed; rendering never looks up a key
/// outside of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    GoverningLaw,
    AuthorName,
    AuthorCityState,
    IllustratorName,
    GuardianName,
    GuardianCityState,
    EffectiveDate,
    BookTitle,
    Deliverables,
    FileFormat,
    Deadline,
    TotalCompensation,
}

impl Field {
    pub const ALL: [Field; 12] = [
        Field::GoverningLaw,
        Field::AuthorName,
        Field::AuthorCityState,
        Field::IllustratorName,
        Field::GuardianName,
        Field::GuardianCityState,
        Field::EffectiveDate,
        Field::BookTitle,
        Field::Deliverables,
        Field::FileFormat,
        Field::Deadline,
        Field::TotalCompensation,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Field::GoverningLaw => "governing_law",
            Field::AuthorName => "author_name",
            Field::AuthorCityState => "author_city_state",
            Field::IllustratorName => "illustrator_name",
            Field::GuardianName => "guardian_name",
            Field::GuardianCityState => "guardian_city_state",
            Field::EffectiveDate => "effective_date",
            Field::BookTitle => "book_title",
            Field::Deliverables => "deliverables",
            Field::FileFormat => "file_format",
            Field::Deadline => "deadline",
            Field::TotalCompensation => "total_compensation",
        }
    }

    pub fn default_value(self) -> &'static str {
        match self {
            Field::GoverningLaw => "Indiana",
            Field::AuthorName => "[Your Name]",
            Field::AuthorCityState => "[City, State]",
            Field::IllustratorName => "[Child's Name]",
            Field::GuardianName => "[Parent's Name]",
            Field::GuardianCityState => "[City, State]",
            Field::EffectiveDate => "[Date]",
            Field::BookTitle => "[Book Title]",
            Field::Deliverables => "[list number/type: cover, page spreads, characters, etc.]",
            Field::FileFormat => "[file format]",
            Field::Deadline => "[deadline]",
            Field::TotalCompensation => "[amount USD]",
        }
    }

    pub fn from_key(key: &str) -> Option<Field> {
        Field::ALL.iter().copied().find(|field| field.key() == key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionDef {
    pub number: u8,
    pub title: &'static str,
    pub body: &'static str,
}

impl SectionDef {
    pub fn heading(&self) -> String {
        format!("{}. {}", self.number, self.title)
    }
}

pub const SECTIONS: [SectionDef; 10] = [
    SectionDef {
        number: 1,
        title: "Scope of Work",
        body: "The Illustrator will create original artwork for a children\u{2019}s book currently titled \"{book_title}\". Deliverables: {deliverables}",
    },
    SectionDef {
        number: 2,
        title: "Compensation",
        body: "Author agrees to pay Illustrator a total of ${total_compensation} USD. Payments are made to the Parent/Legal Guardian, {guardian_name}, on the Illustrator's behalf: fifty percent upon signing and fifty percent upon acceptance of the final artwork.",
    },
    SectionDef {
        number: 3,
        title: "Delivery and Deadlines",
        body: "The Illustrator will deliver the final artwork as {file_format} files no later than {deadline}. Sketches will be shared with the Author for review before final artwork begins. A detailed schedule may be recorded in Exhibit A.",
    },
    SectionDef {
        number: 4,
        title: "Revisions and Approval",
        body: "The Author may request up to two (2) rounds of reasonable revisions for each illustration. Further revisions, or revisions requested after the Author has approved the final artwork, require the consent of the Illustrator and the Parent/Legal Guardian.",
    },
    SectionDef {
        number: 5,
        title: "Ownership and License",
        body: "The Illustrator, {illustrator_name}, keeps the copyright in the original artwork. The Illustrator grants the Author, {author_name}, an exclusive license to reproduce the artwork in all editions and formats of \"{book_title}\" and in materials promoting it.",
    },
    SectionDef {
        number: 6,
        title: "Credit",
        body: "The Illustrator will be credited as \"Illustrated by {illustrator_name}\" on the cover and title page of \"{book_title}\" and wherever the Author is credited.",
    },
    SectionDef {
        number: 7,
        title: "Protections for the Minor Illustrator",
        body: "Because the Illustrator is a minor, the Parent/Legal Guardian, {guardian_name}, consents to this Agreement, will supervise the Illustrator's work, and will receive all payments in trust for the Illustrator. Work sessions will be kept to reasonable hours that do not interfere with the Illustrator's schooling.",
    },
    SectionDef {
        number: 8,
        title: "Termination",
        body: "Either party may end this Agreement with written notice. On termination the Author will pay for all artwork completed and approved before the notice date, and rights in any unpaid artwork stay with the Illustrator.",
    },
    SectionDef {
        number: 9,
        title: "Originality",
        body: "The Illustrator and the Parent/Legal Guardian confirm that the artwork will be original and will not knowingly copy the work of anyone else. The Author confirms that the text of the book does not infringe the rights of any third party.",
    },
    SectionDef {
        number: 10,
        title: "Governing Law and Entire Agreement",
        body: "This Agreement is governed by the laws of the State of {governing_law}. It is the entire agreement between the parties, effective as of {effective_date}, and may be changed only in writing signed by the Author and the Parent/Legal Guardian.",
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatoryDef {
    pub role: &'static str,
    pub name_field: Field,
}

pub const SIGNATORIES: [SignatoryDef; 3] = [
    SignatoryDef {
        role: "Author/Creator",
        name_field: Field::AuthorName,
    },
    SignatoryDef {
        role: "Illustrator (Minor)",
        name_field: Field::IllustratorName,
    },
    SignatoryDef {
        role: "Parent/Legal Guardian",
        name_field: Field::GuardianName,
    },
];

#[derive(Debug, Clone)]
pub struct TemplateMetadata {
    pub template_id: &'static str,
    pub template_fingerprint_sha256: String,
    pub field_count: usize,
    pub section_count: usize,
    pub signatory_count: usize,
}

pub fn section_defs() -> &'static [SectionDef] {
    &SECTIONS
}

pub fn section_def(number: u8) -> Option<&'static SectionDef> {
    SECTIONS.iter().find(|s| s.number == number)
}

pub fn signatory_defs() -> &'static [SignatoryDef] {
    &SIGNATORIES
}

/// Names of the `{token}` placeholders in a body template, in order of
/// appearance. Unclosed braces end the scan.
pub fn placeholder_keys(template: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        rest = &rest[start + 1..];
        let Some(end) = rest.find('}') else {
            break;
        };
        out.push(&rest[..end]);
        rest = &rest[end + 1..];
    }
    out
}

fn hex_digest(hasher: Sha256) -> String {
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

static TEMPLATE_FINGERPRINT: OnceLock<String> = OnceLock::new();

/// SHA-256 over every fixed string that ends up in a rendered agreement.
pub fn template_fingerprint_sha256() -> String {
    TEMPLATE_FINGERPRINT
        .get_or_init(|| {
            let mut hasher = Sha256::new();
            let mut feed = |text: &str| {
                hasher.update(text.as_bytes());
                hasher.update(b"\n");
            };
            feed(TEMPLATE_ID);
            feed(AGREEMENT_TITLE);
            feed(DRAFT_NOTICE);
            feed(GOVERNING_LAW_LINE);
            feed(PARTIES_HEADING);
            feed(PARTIES_INTRO);
            for line in PARTY_LINES {
                feed(line);
            }
            for field in Field::ALL {
                feed(field.key());
                feed(field.default_value());
            }
            for section in &SECTIONS {
                feed(&section.heading());
                feed(section.body);
            }
            feed(SIGNATURE_HEADING);
            feed(SIGNATURE_RULE);
            for signatory in &SIGNATORIES {
                feed(signatory.role);
            }
            feed(INITIALS_HEADING);
            for text in INITIALS_HEADER.into_iter().chain(INITIALS_PAGES) {
                feed(text);
            }
            feed(INITIALS_BLANK);
            feed(EXHIBIT_A_HEADING);
            for text in EXHIBIT_A_HEADER {
                feed(text);
            }
            hex_digest(hasher)
        })
        .clone()
}

pub fn metadata() -> TemplateMetadata {
    TemplateMetadata {
        template_id: TEMPLATE_ID,
        template_fingerprint_sha256: template_fingerprint_sha256(),
        field_count: Field::ALL.len(),
        section_count: SECTIONS.len(),
        signatory_count: SIGNATORIES.len(),
    }
}

pub fn metadata_json() -> Value {
    let meta = metadata();
    let fields: Vec<Value> = Field::ALL
        .iter()
        .map(|field| json!({ "key": field.key(), "default": field.default_value() }))
        .collect();
    let sections: Vec<Value> = SECTIONS
        .iter()
        .map(|section| {
            json!({
                "number": section.number,
                "title": section.title,
                "placeholders": placeholder_keys(section.body),
            })
        })
        .collect();
    json!({
        "template_id": meta.template_id,
        "template_fingerprint_sha256": meta.template_fingerprint_sha256,
        "fields": fields,
        "sections": sections,
        "signatories": SIGNATORIES.iter().map(|s| s.role).collect::<Vec<_>>(),
        "initials_header": INITIALS_HEADER,
        "exhibit_a_header": EXHIBIT_A_HEADER,
    })
}
