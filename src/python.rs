#![allow(unsafe_op_in_unsafe_fn)]

use crate::{
    AgreementError, Assembler, AssemblerBuilder, DOCX_MIME, DocxInspectError, DocxInspectReport,
    FieldSet, inspect_docx_bytes, inspect_docx_path,
};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyDict, PyList, PyModule};
use std::path::Path;

#[pyclass(name = "AgreementEngine")]
struct PyAgreementEngine {
    assembler: Assembler,
}

#[pymethods]
impl PyAgreementEngine {
    #[new]
    #[pyo3(signature = (compress=true, debug_log=None, perf_log=None))]
    fn new(compress: bool, debug_log: Option<String>, perf_log: Option<String>) -> PyResult<Self> {
        let mut builder: AssemblerBuilder = Assembler::builder().compress(compress);
        if let Some(path) = debug_log {
            builder = builder.debug_log(path);
        }
        if let Some(path) = perf_log {
            builder = builder.perf_log(path);
        }
        let assembler = builder.build().map_err(to_py_err)?;
        Ok(Self { assembler })
    }

    fn assemble(
        &self,
        py: Python<'_>,
        fields: &Bound<'_, PyAny>,
    ) -> PyResult<(PyObject, String)> {
        let fields = field_set_from_py(fields)?;
        let artifact = py
            .allow_threads(|| self.assembler.assemble(&fields))
            .map_err(to_py_err)?;
        Ok((
            PyBytes::new_bound(py, &artifact.bytes).to_object(py),
            artifact.filename,
        ))
    }

    fn assemble_many(
        &self,
        py: Python<'_>,
        submissions: Vec<Bound<'_, PyAny>>,
    ) -> PyResult<Vec<(PyObject, String)>> {
        let sets = submissions
            .iter()
            .map(field_set_from_py)
            .collect::<PyResult<Vec<_>>>()?;
        let results = py.allow_threads(|| self.assembler.assemble_many_parallel(&sets));
        let mut out = Vec::with_capacity(results.len());
        for result in results {
            let artifact = result.map_err(to_py_err)?;
            out.push((
                PyBytes::new_bound(py, &artifact.bytes).to_object(py),
                artifact.filename,
            ));
        }
        Ok(out)
    }

    /// Writes the package to `path` and returns the suggested filename.
    fn assemble_to_file(
        &self,
        py: Python<'_>,
        fields: &Bound<'_, PyAny>,
        path: &str,
    ) -> PyResult<String> {
        let fields = field_set_from_py(fields)?;
        py.allow_threads(|| {
            let mut bytes = Vec::new();
            let (_, filename) = self.assembler.assemble_to_writer(&fields, &mut bytes)?;
            std::fs::write(path, &bytes)?;
            Ok::<_, AgreementError>(filename)
        })
        .map_err(to_py_err)
    }
}

// Accepts any mapping with `.items()`. `None` values count as not submitted;
// everything else is converted with `str()`.
fn field_set_from_py(fields: &Bound<'_, PyAny>) -> PyResult<FieldSet> {
    let mut out = FieldSet::new();
    for item in fields.call_method0("items")?.iter()? {
        let (key, value): (String, Bound<'_, PyAny>) = item?.extract()?;
        if value.is_none() {
            continue;
        }
        out.insert(key, value.str()?.to_string());
    }
    Ok(out)
}

fn to_py_err(err: AgreementError) -> PyErr {
    PyValueError::new_err(err.to_string())
}

fn inspect_err_to_py(err: DocxInspectError) -> PyErr {
    PyValueError::new_err(err.to_string())
}

fn inspect_report_to_py(py: Python<'_>, report: &DocxInspectReport) -> PyResult<PyObject> {
    let out = PyDict::new_bound(py);
    out.set_item("ok", true)?;
    out.set_item("part_names", report.part_names.clone())?;
    out.set_item("file_size_bytes", report.file_size_bytes)?;

    let paragraphs = PyList::empty_bound(py);
    for paragraph in &report.paragraphs {
        let d = PyDict::new_bound(py);
        d.set_item("style", paragraph.style.clone())?;
        d.set_item("text", paragraph.text.clone())?;
        paragraphs.append(d)?;
    }
    out.set_item("paragraphs", paragraphs)?;
    out.set_item("tables", report.tables.clone())?;
    Ok(out.to_object(py))
}

#[pyfunction]
fn assemble(py: Python<'_>, fields: &Bound<'_, PyAny>) -> PyResult<(PyObject, String)> {
    let fields = field_set_from_py(fields)?;
    let artifact = py
        .allow_threads(|| crate::assemble(&fields))
        .map_err(to_py_err)?;
    Ok((
        PyBytes::new_bound(py, &artifact.bytes).to_object(py),
        artifact.filename,
    ))
}

#[pyfunction]
fn inspect_docx(py: Python<'_>, data: &[u8]) -> PyResult<PyObject> {
    let report = inspect_docx_bytes(data).map_err(inspect_err_to_py)?;
    inspect_report_to_py(py, &report)
}

#[pyfunction]
fn inspect_docx_file(py: Python<'_>, path: &str) -> PyResult<PyObject> {
    let report = inspect_docx_path(Path::new(path)).map_err(inspect_err_to_py)?;
    let out = inspect_report_to_py(py, &report)?;
    out.bind(py).downcast::<PyDict>()?.set_item("path", path)?;
    Ok(out)
}

#[pyfunction]
fn template_metadata() -> String {
    illustration_agreement_template::metadata_json().to_string()
}

#[pymodule]
fn _illustration_agreement(_py: Python<'_>, module: &Bound<'_, PyModule>) -> PyResult<()> {
    module.add_class::<PyAgreementEngine>()?;
    module.add_function(wrap_pyfunction!(assemble, module)?)?;
    module.add_function(wrap_pyfunction!(inspect_docx, module)?)?;
    module.add_function(wrap_pyfunction!(inspect_docx_file, module)?)?;
    module.add_function(wrap_pyfunction!(template_metadata, module)?)?;
    module.add("DOCX_MIME", DOCX_MIME)?;
    module.add("TEMPLATE_ID", illustration_agreement_template::TEMPLATE_ID)?;
    Ok(())
}
