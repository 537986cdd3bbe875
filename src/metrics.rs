#[derive(Debug, Clone, Default)]
pub struct AssemblyMetrics {
    pub heading_count: usize,
    pub paragraph_count: usize,
    pub table_count: usize,
    // Keys of fields that fell back to their placeholder.
    pub defaulted_fields: Vec<&'static str>,
    pub part_count: usize,
    pub deflated_part_count: usize,
    pub uncompressed_bytes: usize,
    pub total_bytes: usize,
    pub compose_ms: f64,
    pub serialize_ms: f64,
    pub total_ms: f64,
}
