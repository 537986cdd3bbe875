mod compose;
mod debug;
mod document;
mod docxinspect;
mod error;
mod fields;
mod flate_native;
mod metrics;
mod package;
mod perf;
#[cfg(feature = "python")]
mod python;
mod wordml;

use base64::Engine;
pub use compose::{agreement_filename, compose_document, interpolate};
use debug::DebugLogger;
pub use document::{Block, RenderedDocument, Table};
pub use docxinspect::{
    DocxInspectError, DocxInspectErrorCode, DocxInspectReport, InspectedParagraph,
    inspect_docx_bytes, inspect_docx_path,
};
pub use error::AgreementError;
pub use fields::{FieldSet, ResolvedFields};
pub use illustration_agreement_template::{
    Field, SectionDef, SignatoryDef, TemplateMetadata, template_fingerprint_sha256,
};
pub use metrics::AssemblyMetrics;
use package::{PackageOptions, write_package};
use perf::PerfLogger;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;
pub use wordml::DOCX_MIME;
use wordml::{CoreProperties, package_parts};

/// A finished agreement: the `.docx` bytes and the suggested download name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputArtifact {
    pub bytes: Vec<u8>,
    pub filename: String,
}

impl OutputArtifact {
    pub fn mime_type(&self) -> &'static str {
        DOCX_MIME
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn sha256_hex(&self) -> String {
        let digest = Sha256::digest(&self.bytes);
        let mut out = String::with_capacity(digest.len() * 2);
        for byte in digest {
            out.push_str(&format!("{:02x}", byte));
        }
        out
    }

    pub fn to_data_uri(&self) -> String {
        let payload = base64::engine::general_purpose::STANDARD.encode(&self.bytes);
        format!("data:{};base64,{}", DOCX_MIME, payload)
    }
}

/// Builds the agreement with the default configuration and no logging.
pub fn assemble(fields: &FieldSet) -> Result<OutputArtifact, AgreementError> {
    Assembler::default().assemble(fields)
}

#[derive(Default)]
pub struct Assembler {
    options: PackageOptions,
    debug: Option<DebugLogger>,
    perf: Option<PerfLogger>,
}

struct Serialized {
    filename: String,
    summary: package::PackageSummary,
    resolved: ResolvedFields,
    doc: RenderedDocument,
    compose_ms: f64,
    serialize_ms: f64,
}

impl Assembler {
    pub fn builder() -> AssemblerBuilder {
        AssemblerBuilder::default()
    }

    pub fn compose(&self, fields: &FieldSet) -> RenderedDocument {
        compose_document(&fields.resolve())
    }

    pub fn assemble(&self, fields: &FieldSet) -> Result<OutputArtifact, AgreementError> {
        self.assemble_at(None, fields).map(|(artifact, _)| artifact)
    }

    pub fn assemble_with_metrics(
        &self,
        fields: &FieldSet,
    ) -> Result<(OutputArtifact, AssemblyMetrics), AgreementError> {
        self.assemble_at(None, fields)
    }

    /// Streams the package into `writer`. Returns the number of bytes written
    /// and the suggested filename. Nothing is written when serialization fails.
    pub fn assemble_to_writer<W: Write>(
        &self,
        fields: &FieldSet,
        writer: &mut W,
    ) -> Result<(usize, String), AgreementError> {
        let started = Instant::now();
        let out = self.serialize_into(None, fields, writer)?;
        self.finish_logs(None, &out, started.elapsed().as_secs_f64() * 1000.0);
        Ok((out.summary.bytes_written, out.filename))
    }

    /// Assembles each submission on the rayon pool. Results keep input order.
    pub fn assemble_many_parallel(
        &self,
        submissions: &[FieldSet],
    ) -> Vec<Result<OutputArtifact, AgreementError>> {
        use rayon::prelude::*;

        submissions
            .par_iter()
            .enumerate()
            .map(|(idx, fields)| {
                self.assemble_at(Some(idx), fields)
                    .map(|(artifact, _)| artifact)
            })
            .collect()
    }

    fn assemble_at(
        &self,
        request_id: Option<usize>,
        fields: &FieldSet,
    ) -> Result<(OutputArtifact, AssemblyMetrics), AgreementError> {
        let started = Instant::now();
        let mut bytes = Vec::new();
        let out = self.serialize_into(request_id, fields, &mut bytes)?;
        let total_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.finish_logs(request_id, &out, total_ms);

        let metrics = AssemblyMetrics {
            heading_count: out.doc.heading_count(),
            paragraph_count: out.doc.paragraph_count(),
            table_count: out.doc.tables().count(),
            defaulted_fields: out.resolved.defaulted().iter().map(|f| f.key()).collect(),
            part_count: out.summary.parts,
            deflated_part_count: out.summary.deflated_parts,
            uncompressed_bytes: out.summary.uncompressed_bytes,
            total_bytes: out.summary.bytes_written,
            compose_ms: out.compose_ms,
            serialize_ms: out.serialize_ms,
            total_ms,
        };
        Ok((
            OutputArtifact {
                bytes,
                filename: out.filename,
            },
            metrics,
        ))
    }

    fn serialize_into<W: Write>(
        &self,
        request_id: Option<usize>,
        fields: &FieldSet,
        writer: &mut W,
    ) -> Result<Serialized, AgreementError> {
        let t_compose = Instant::now();
        let resolved = fields.resolve();
        let doc = compose_document(&resolved);
        let compose_ms = t_compose.elapsed().as_secs_f64() * 1000.0;

        let t_wordml = Instant::now();
        let props = CoreProperties {
            title: format!("Illustration Agreement: {}", resolved.get(Field::BookTitle)),
            creator: resolved.get(Field::AuthorName).to_string(),
        };
        let parts = package_parts(&doc, &props)?;
        let wordml_ms = t_wordml.elapsed().as_secs_f64() * 1000.0;

        let t_package = Instant::now();
        let summary = write_package(writer, &parts, self.options)?;
        let package_ms = t_package.elapsed().as_secs_f64() * 1000.0;

        if let Some(perf) = &self.perf {
            perf.log_span_ms("compose", request_id, compose_ms);
            perf.log_span_ms("wordml", request_id, wordml_ms);
            perf.log_span_ms("package", request_id, package_ms);
            perf.log_counts(
                "package",
                request_id,
                &[
                    ("parts", summary.parts as u64),
                    ("deflated_parts", summary.deflated_parts as u64),
                    ("uncompressed_bytes", summary.uncompressed_bytes as u64),
                    ("bytes", summary.bytes_written as u64),
                ],
            );
        }

        Ok(Serialized {
            filename: agreement_filename(fields),
            summary,
            resolved,
            doc,
            compose_ms,
            serialize_ms: wordml_ms + package_ms,
        })
    }

    fn finish_logs(&self, request_id: Option<usize>, out: &Serialized, total_ms: f64) {
        if let Some(debug) = &self.debug {
            for field in out.resolved.defaulted() {
                debug.log_event(
                    "field.defaulted",
                    &[("key", field.key()), ("value", field.default_value())],
                );
            }
            debug.increment("documents", 1);
            debug.increment("fields.defaulted", out.resolved.defaulted().len() as u64);
            debug.increment("bytes", out.summary.bytes_written as u64);
            debug.emit_summary("assemble");
            debug.flush();
        }
        if let Some(perf) = &self.perf {
            perf.log_span_ms("total", request_id, total_ms);
            perf.flush();
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssemblerBuilder {
    compress: bool,
    debug_path: Option<PathBuf>,
    perf_path: Option<PathBuf>,
}

impl Default for AssemblerBuilder {
    fn default() -> Self {
        Self {
            compress: true,
            debug_path: None,
            perf_path: None,
        }
    }
}

impl AssemblerBuilder {
    // Deflate package entries. Entries that do not shrink are stored either way.
    pub fn compress(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }

    // JSONL event log: defaulted fields and per-document summary counts.
    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    // JSONL timing spans; a `<stem>_hot.log` ranking is written on drop.
    pub fn perf_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.perf_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<Assembler, AgreementError> {
        for (name, path) in [("debug_log", &self.debug_path), ("perf_log", &self.perf_path)] {
            if path.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
                return Err(AgreementError::InvalidConfiguration(format!(
                    "{name} requires a non-empty path"
                )));
            }
        }
        let debug = match self.debug_path {
            Some(path) => Some(DebugLogger::new(path)?),
            None => None,
        };
        let perf = match self.perf_path {
            Some(path) => Some(PerfLogger::new(path)?),
            None => None,
        };
        Ok(Assembler {
            options: PackageOptions {
                compress: self.compress,
            },
            debug,
            perf,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jane_doe() -> FieldSet {
        FieldSet::new()
            .with("author_name", "Jane Doe")
            .with("book_title", "My Story")
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "illustration_agreement_{}_{}_{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("mkdir");
        dir
    }

    #[test]
    fn assembles_named_author_and_title() {
        let artifact = assemble(&jane_doe()).expect("assemble");
        assert_eq!(artifact.filename, "Illustration_Agreement_for_My_Story.docx");
        assert_eq!(&artifact.bytes[..4], b"PK\x03\x04");

        let report = inspect_docx_bytes(&artifact.bytes).expect("inspect");
        let text = report.body_text();
        assert!(text.contains("Author/Creator: Jane Doe, residing in [City, State]"));
        assert!(text.contains("Printed Name: Jane Doe"));
        assert!(text.contains("currently titled \"My Story\""));
        assert!(text.contains("Governing Law: Indiana"));
    }

    #[test]
    fn empty_submission_renders_every_placeholder() {
        let artifact = assemble(&FieldSet::new()).expect("assemble");
        assert_eq!(artifact.filename, "Illustration_Agreement_for_Book.docx");

        let text = inspect_docx_bytes(&artifact.bytes)
            .expect("inspect")
            .body_text();
        for field in Field::ALL {
            assert!(
                text.contains(field.default_value()),
                "missing default for {}",
                field.key()
            );
        }
    }

    #[test]
    fn filename_strips_quotes_and_keeps_other_characters() {
        let fields = FieldSet::new().with("book_title", "A \"Test\" Book");
        let artifact = assemble(&fields).expect("assemble");
        assert_eq!(artifact.filename, "Illustration_Agreement_for_A_Test_Book.docx");
    }

    #[test]
    fn identical_input_gives_identical_bytes() {
        let a = assemble(&jane_doe()).expect("first");
        let b = assemble(&jane_doe()).expect("second");
        assert_eq!(a.bytes, b.bytes);
        assert_eq!(a.sha256_hex(), b.sha256_hex());
        assert_eq!(a.sha256_hex().len(), 64);
    }

    #[test]
    fn inspected_package_has_expected_parts_and_tables() {
        let artifact = assemble(&jane_doe()).expect("assemble");
        let report = inspect_docx_bytes(&artifact.bytes).expect("inspect");
        assert_eq!(
            report.part_names,
            vec![
                "[Content_Types].xml",
                "_rels/.rels",
                "docProps/core.xml",
                "docProps/app.xml",
                "word/document.xml",
                "word/styles.xml",
                "word/_rels/document.xml.rels",
            ]
        );
        assert_eq!(report.tables.len(), 2);
        assert_eq!(report.table_shape(0), Some((4, 3)));
        assert_eq!(report.table_shape(1), Some((2, 5)));
        assert_eq!(report.tables[0][0], vec!["Page", "Author Initials", "Guardian Initials"]);
        assert_eq!(report.tables[0][3][0], "3");

        let headings: Vec<&str> = report.paragraphs_with_style("Heading1").collect();
        assert_eq!(headings.len(), 14);
        assert_eq!(headings[0], "Parties");
        assert_eq!(headings[1], "1. Scope of Work");
        assert_eq!(headings[13], "Exhibit A: Illustration Schedule");
        assert_eq!(
            report.paragraphs_with_style("Title").collect::<Vec<_>>(),
            vec!["CHILDREN\u{2019}S BOOK ILLUSTRATION AGREEMENT"]
        );
    }

    #[test]
    fn uncompressed_output_is_larger_but_equivalent() {
        let stored = Assembler::builder()
            .compress(false)
            .build()
            .expect("build")
            .assemble(&jane_doe())
            .expect("assemble");
        let deflated = assemble(&jane_doe()).expect("assemble");
        assert!(stored.len() > deflated.len());
        assert_eq!(
            inspect_docx_bytes(&stored.bytes).expect("stored"),
            DocxInspectReport {
                file_size_bytes: stored.len(),
                ..inspect_docx_bytes(&deflated.bytes).expect("deflated")
            }
        );
    }

    #[test]
    fn control_character_in_value_is_a_serialization_error() {
        let fields = FieldSet::new().with("book_title", "Bad\u{1}Title");
        match assemble(&fields) {
            Err(AgreementError::Serialization(_)) => {}
            other => panic!("expected serialization error, got {other:?}"),
        }

        let mut sink = Vec::new();
        let err = Assembler::default()
            .assemble_to_writer(&fields, &mut sink)
            .expect_err("serialization");
        assert!(matches!(err, AgreementError::Serialization(_)));
        assert!(sink.is_empty());
    }

    #[test]
    fn writer_output_matches_buffered_output() {
        let assembler = Assembler::default();
        let mut sink = Vec::new();
        let (written, filename) = assembler
            .assemble_to_writer(&jane_doe(), &mut sink)
            .expect("write");
        let artifact = assembler.assemble(&jane_doe()).expect("assemble");
        assert_eq!(written, sink.len());
        assert_eq!(filename, artifact.filename);
        assert_eq!(sink, artifact.bytes);
    }

    #[test]
    fn metrics_report_document_shape_and_defaults() {
        let (artifact, metrics) = Assembler::default()
            .assemble_with_metrics(&jane_doe())
            .expect("assemble");
        assert_eq!(metrics.table_count, 2);
        assert_eq!(metrics.heading_count, 15);
        assert_eq!(metrics.part_count, 7);
        assert_eq!(metrics.total_bytes, artifact.len());
        assert_eq!(metrics.defaulted_fields.len(), 10);
        assert!(!metrics.defaulted_fields.contains(&"author_name"));
        assert!(metrics.defaulted_fields.contains(&"governing_law"));
    }

    #[test]
    fn parallel_assembly_preserves_order() {
        let submissions: Vec<FieldSet> = ["One", "Two", "Three", "Four"]
            .iter()
            .map(|title| FieldSet::new().with("book_title", *title))
            .collect();
        let results = Assembler::default().assemble_many_parallel(&submissions);
        let names: Vec<String> = results
            .into_iter()
            .map(|r| r.expect("assemble").filename)
            .collect();
        assert_eq!(
            names,
            vec![
                "Illustration_Agreement_for_One.docx",
                "Illustration_Agreement_for_Two.docx",
                "Illustration_Agreement_for_Three.docx",
                "Illustration_Agreement_for_Four.docx",
            ]
        );
    }

    #[test]
    fn data_uri_carries_docx_mime() {
        let artifact = assemble(&jane_doe()).expect("assemble");
        let uri = artifact.to_data_uri();
        assert!(uri.starts_with(
            "data:application/vnd.openxmlformats-officedocument.wordprocessingml.document;base64,UEsDB"
        ));
        assert_eq!(artifact.mime_type(), DOCX_MIME);
    }

    #[test]
    fn builder_rejects_empty_log_path() {
        match Assembler::builder().debug_log("").build() {
            Err(AgreementError::InvalidConfiguration(message)) => {
                assert!(message.contains("debug_log"))
            }
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("expected configuration error"),
        }
        assert!(matches!(
            Assembler::builder().perf_log("").build(),
            Err(AgreementError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn builder_surfaces_unopenable_log_as_io_error() {
        let dir = temp_dir("missing_parent");
        let path = dir.join("no_such_dir").join("debug.jsonl");
        assert!(matches!(
            Assembler::builder().debug_log(path).build(),
            Err(AgreementError::Io(_))
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn logs_record_defaulted_fields_and_spans() {
        let dir = temp_dir("logs");
        let debug_path = dir.join("debug.jsonl");
        let perf_path = dir.join("perf.jsonl");
        {
            let assembler = Assembler::builder()
                .debug_log(&debug_path)
                .perf_log(&perf_path)
                .build()
                .expect("build");
            assembler.assemble(&jane_doe()).expect("assemble");
        }

        let debug = std::fs::read_to_string(&debug_path).expect("debug log");
        assert_eq!(debug.matches("\"type\":\"field.defaulted\"").count(), 10);
        assert!(debug.contains("\"key\":\"governing_law\",\"value\":\"Indiana\""));
        assert!(debug.contains("\"fields.defaulted\":10"));

        let perf = std::fs::read_to_string(&perf_path).expect("perf log");
        for span in ["compose", "wordml", "package", "total"] {
            assert!(perf.contains(&format!("\"name\":\"{span}\"")), "missing {span}");
        }
        assert!(dir.join("perf_hot.log").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
