use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::debug::json_escape;

#[derive(Clone)]
pub(crate) struct PerfLogger {
    inner: Arc<Mutex<PerfState>>,
}

struct PerfState {
    writer: BufWriter<File>,
    path: PathBuf,
    span_totals: HashMap<String, f64>,
    span_counts: HashMap<String, u64>,
    count_totals: HashMap<String, u64>,
}

impl PerfLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(PerfState {
                writer: BufWriter::new(file),
                path,
                span_totals: HashMap::new(),
                span_counts: HashMap::new(),
                count_totals: HashMap::new(),
            })),
        })
    }

    pub fn log_span_ms(&self, name: &str, request_id: Option<usize>, ms: f64) {
        let request = request_id
            .map(|v| v.to_string())
            .unwrap_or_else(|| "null".to_string());
        let json = format!(
            "{{\"type\":\"perf.span\",\"name\":\"{}\",\"request\":{},\"unit\":\"ms\",\"ms\":{:.3}}}",
            json_escape(name),
            request,
            ms
        );
        if let Ok(mut state) = self.inner.lock() {
            *state.span_totals.entry(name.to_string()).or_insert(0.0) += ms;
            let entry = state.span_counts.entry(name.to_string()).or_insert(0);
            *entry = entry.saturating_add(1);
            let _ = writeln!(state.writer, "{json}");
        }
    }

    pub fn log_counts(&self, name: &str, request_id: Option<usize>, counts: &[(&str, u64)]) {
        let request = request_id
            .map(|v| v.to_string())
            .unwrap_or_else(|| "null".to_string());
        let mut out = format!(
            "{{\"type\":\"perf.counts\",\"name\":\"{}\",\"request\":{},\"counts\":{{",
            json_escape(name),
            request
        );
        for (idx, (key, value)) in counts.iter().enumerate() {
            if idx > 0 {
                out.push(',');
            }
            out.push_str(&format!("\"{}\":{}", json_escape(key), value));
        }
        out.push_str("}}");
        if let Ok(mut state) = self.inner.lock() {
            for (key, value) in counts {
                let full_key = format!("{name}.{key}");
                let entry = state.count_totals.entry(full_key).or_insert(0);
                *entry = entry.saturating_add(*value);
            }
            let _ = writeln!(state.writer, "{out}");
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}

// Ranked totals go to a sibling `<stem>_hot.log` once the last handle drops.
impl Drop for PerfState {
    fn drop(&mut self) {
        let _ = self.writer.flush();
        let hot_path = hot_path_for(&self.path);
        let Ok(file) = File::create(&hot_path) else {
            return;
        };
        let mut writer = BufWriter::new(file);

        let mut spans: Vec<(&String, &f64)> = self.span_totals.iter().collect();
        spans.sort_by(|a, b| {
            b.1.partial_cmp(a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        for (rank, (name, ms)) in spans.into_iter().take(100).enumerate() {
            let count = *self.span_counts.get(name).unwrap_or(&1);
            let avg = if count == 0 { 0.0 } else { ms / count as f64 };
            let _ = writeln!(
                writer,
                "{{\"type\":\"perf.hot.span\",\"rank\":{},\"name\":\"{}\",\"unit\":\"ms\",\"agg\":\"sum\",\"ms\":{:.3},\"count\":{},\"avg_ms\":{:.3}}}",
                rank + 1,
                json_escape(name),
                ms,
                count,
                avg
            );
        }

        let mut counts: Vec<(&String, &u64)> = self.count_totals.iter().collect();
        counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (rank, (name, value)) in counts.into_iter().take(100).enumerate() {
            let _ = writeln!(
                writer,
                "{{\"type\":\"perf.hot.count\",\"rank\":{},\"name\":\"{}\",\"value\":{}}}",
                rank + 1,
                json_escape(name),
                value
            );
        }
    }
}

fn hot_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("illustration_agreement_perf.log");
    let stem = file_name
        .rsplit_once('.')
        .map(|(s, _)| s)
        .unwrap_or(file_name);
    path.with_file_name(format!("{stem}_hot.log"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hot_path_sits_next_to_the_log() {
        assert_eq!(
            hot_path_for(Path::new("/tmp/run/perf.jsonl")),
            PathBuf::from("/tmp/run/perf_hot.log")
        );
        assert_eq!(
            hot_path_for(Path::new("perf")),
            PathBuf::from("perf_hot.log")
        );
    }

    #[test]
    fn spans_counts_and_hot_ranking_are_written() {
        let dir = std::env::temp_dir().join(format!(
            "illustration_agreement_perf_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("mkdir");
        let path = dir.join("perf.log");
        {
            let logger = PerfLogger::new(&path).expect("logger");
            logger.log_span_ms("compose", Some(0), 1.5);
            logger.log_span_ms("package", Some(0), 4.0);
            logger.log_counts("package", Some(0), &[("parts", 7), ("bytes", 1200)]);
            logger.flush();
        }

        let log = std::fs::read_to_string(&path).expect("log");
        assert_eq!(log.lines().count(), 3);
        assert!(log.contains("\"name\":\"compose\",\"request\":0"));
        assert!(log.contains("\"counts\":{\"parts\":7,\"bytes\":1200}"));

        let hot = std::fs::read_to_string(dir.join("perf_hot.log")).expect("hot");
        let first = hot.lines().next().expect("first line");
        assert!(first.contains("\"rank\":1,\"name\":\"package\""));
        assert!(hot.contains("\"name\":\"package.bytes\",\"value\":1200"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
