//! In-memory accumulation of scenario results and the plain-text artifact.
//!
//! Every entry is mirrored to the log the moment it is recorded, so a run
//! that dies half way still leaves a trace; the artifact itself is written
//! once, at the end, by [`SessionReport::flush`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{info, warn};
use uuid::Uuid;

const BLOCK_RULE: &str = "========================================";
const ENTRY_RULE: &str = "----------------------------------------";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const FILE_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";

/// A named value captured by an extraction step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedValue {
    Text(String),
    List(Vec<String>),
    Link { label: String, url: String },
}

/// One extraction, stamped when it happened.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub name: String,
    pub value: ExtractedValue,
    pub at: DateTime<Local>,
}

/// A single line-oriented entry inside a scenario block.
#[derive(Debug, Clone)]
pub enum ReportEntry {
    Note(String),
    Extraction(ExtractionResult),
    Error(String),
}

/// Ordered record of one scenario run, success and failure entries alike.
#[derive(Debug)]
pub struct ScenarioReport {
    pub name: String,
    pub executed_at: DateTime<Local>,
    pub viewport: (u32, u32),
    entries: Vec<ReportEntry>,
}

impl ScenarioReport {
    pub fn begin(name: &str, viewport: (u32, u32)) -> Self {
        info!(target: "trip.scenario", scenario = %name, "scenario started");
        Self {
            name: name.to_string(),
            executed_at: Local::now(),
            viewport,
            entries: Vec::new(),
        }
    }

    /// Record a progress line.
    pub fn note(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!(target: "trip.report", scenario = %self.name, "{message}");
        self.entries.push(ReportEntry::Note(message));
    }

    /// Record a named extracted value.
    pub fn extraction(&mut self, name: &str, value: ExtractedValue) {
        info!(target: "trip.report", scenario = %self.name, result = %name, "recorded extraction");
        self.entries.push(ReportEntry::Extraction(ExtractionResult {
            name: name.to_string(),
            value,
            at: Local::now(),
        }));
    }

    /// Record a failure without ending the scenario.
    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(target: "trip.report", scenario = %self.name, "{message}");
        self.entries.push(ReportEntry::Error(message));
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn extraction_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, ReportEntry::Extraction(_)))
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, ReportEntry::Error(_)))
            .count()
    }
}

/// Everything recorded over one browser session, rendered into a single
/// plain-text artifact at the end.
#[derive(Debug)]
pub struct SessionReport {
    pub run_id: Uuid,
    pub title: String,
    pub file_prefix: String,
    pub started_at: DateTime<Local>,
    pub viewport: (u32, u32),
    scenarios: Vec<ScenarioReport>,
}

impl SessionReport {
    pub fn new(title: &str, file_prefix: &str, viewport: (u32, u32)) -> Self {
        let run_id = Uuid::new_v4();
        info!(
            target: "trip.report",
            %run_id,
            width = viewport.0,
            height = viewport.1,
            "session report opened"
        );
        Self {
            run_id,
            title: title.to_string(),
            file_prefix: file_prefix.to_string(),
            started_at: Local::now(),
            viewport,
            scenarios: Vec::new(),
        }
    }

    /// Append a finished scenario block. Blocks keep arrival order.
    pub fn record(&mut self, scenario: ScenarioReport) {
        info!(
            target: "trip.report",
            scenario = %scenario.name,
            entries = scenario.entries.len(),
            errors = scenario.error_count(),
            "scenario recorded"
        );
        self.scenarios.push(scenario);
    }

    pub fn scenarios(&self) -> &[ScenarioReport] {
        &self.scenarios
    }

    /// Render the full artifact text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.title);
        out.push('\n');
        out.push_str(&format!(
            "Date: {}\n",
            self.started_at.format(TIMESTAMP_FORMAT)
        ));
        out.push_str(&format!(
            "Screen Resolution: {}x{}\n",
            self.viewport.0, self.viewport.1
        ));
        out.push_str(BLOCK_RULE);
        out.push('\n');

        for scenario in &self.scenarios {
            out.push('\n');
            out.push_str(&format!("=== {} ===\n", scenario.name));
            out.push_str(&format!(
                "Executed at: {}\n",
                scenario.executed_at.format(TIMESTAMP_FORMAT)
            ));
            out.push_str(&format!(
                "Screen resolution: {}x{}\n",
                scenario.viewport.0, scenario.viewport.1
            ));
            out.push_str(ENTRY_RULE);
            out.push('\n');
            for entry in &scenario.entries {
                render_entry(&mut out, entry);
            }
            out.push_str(ENTRY_RULE);
            out.push('\n');
        }

        out.push_str("All tests completed.\n");
        out
    }

    /// Write the artifact under `out_dir` with a millisecond-stamped name.
    ///
    /// Write failures are logged and swallowed; teardown must not hinge on
    /// a full disk. Returns the path on success.
    pub fn flush(&self, out_dir: &Path) -> Option<PathBuf> {
        let stamp = Local::now().format(FILE_STAMP_FORMAT);
        let path = out_dir.join(format!("{}_{stamp}.txt", self.file_prefix));
        match self.write_artifact(out_dir, &path) {
            Ok(()) => {
                info!(target: "trip.report", path = %path.display(), "report artifact written");
                Some(path)
            }
            Err(e) => {
                warn!(
                    target: "trip.report",
                    path = %path.display(),
                    error = %e,
                    "report artifact not written"
                );
                None
            }
        }
    }

    fn write_artifact(&self, out_dir: &Path, path: &Path) -> fieldtrip_common::Result<()> {
        std::fs::create_dir_all(out_dir)?;
        std::fs::write(path, self.render())?;
        Ok(())
    }
}

fn render_entry(out: &mut String, entry: &ReportEntry) {
    match entry {
        ReportEntry::Note(message) => {
            out.push_str(message);
            out.push('\n');
        }
        ReportEntry::Extraction(result) => match &result.value {
            ExtractedValue::Text(text) => {
                out.push_str(&format!("{}: {text}\n", result.name));
            }
            ExtractedValue::List(items) => {
                out.push_str(&format!("{} ({} items):\n", result.name, items.len()));
                for item in items {
                    out.push_str(&format!("  - {item}\n"));
                }
            }
            ExtractedValue::Link { label, url } => {
                out.push_str(&format!("{}: {label} -> {url}\n", result.name));
            }
        },
        ReportEntry::Error(message) => {
            out.push_str(&format!("ERROR: {message}\n"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_session() -> SessionReport {
        let mut session = SessionReport::new("Site Survey Results", "site_survey", (1920, 1080));

        let mut first = ScenarioReport::begin("locations", (1920, 1080));
        first.note("opened https://example.test/");
        first.extraction(
            "locations",
            ExtractedValue::List(vec!["Tallinn".to_string(), "Tartu".to_string()]),
        );
        session.record(first);

        let mut second = ScenarioReport::begin("jobs", (1920, 1080));
        second.extraction(
            "job in Tartu",
            ExtractedValue::Link {
                label: "Senior QA".to_string(),
                url: "https://example.test/jobs/1".to_string(),
            },
        );
        second.error("item 3: no new context within 2000 ms");
        session.record(second);

        session
    }

    #[test]
    fn render_produces_one_block_per_scenario() {
        let rendered = sample_session().render();

        assert!(rendered.starts_with("Site Survey Results\n"));
        assert!(rendered.contains("Screen Resolution: 1920x1080"));
        assert!(rendered.contains("=== locations ==="));
        assert!(rendered.contains("=== jobs ==="));
        assert!(rendered.contains("locations (2 items):\n  - Tallinn\n  - Tartu\n"));
        assert!(rendered.contains("job in Tartu: Senior QA -> https://example.test/jobs/1"));
        assert!(rendered.contains("ERROR: item 3: no new context within 2000 ms"));
        assert!(rendered.ends_with("All tests completed.\n"));

        // Two scenarios still mean exactly one header block.
        assert_eq!(rendered.matches("Site Survey Results").count(), 1);
        assert_eq!(rendered.matches(BLOCK_RULE).count(), 1);
        assert_eq!(rendered.matches(ENTRY_RULE).count(), 4);
    }

    #[test]
    fn flush_writes_a_single_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample_session().flush(dir.path()).unwrap();

        assert!(path.file_name().unwrap().to_string_lossy().starts_with("site_survey_"));
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("=== locations ==="));
        assert!(written.contains("All tests completed."));

        let artifacts: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(artifacts.len(), 1);
    }

    #[test]
    fn flush_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let blocking_file = dir.path().join("occupied");
        std::fs::write(&blocking_file, b"not a directory").unwrap();

        // Using a plain file as the output directory cannot work; flush
        // must report that as None, not panic or propagate.
        assert!(sample_session().flush(&blocking_file).is_none());
    }

    #[test]
    fn counts_reflect_entry_kinds() {
        let mut report = ScenarioReport::begin("counting", (800, 600));
        report.note("one note");
        report.extraction("value", ExtractedValue::Text("x".to_string()));
        report.error("one error");
        report.error("another error");

        assert_eq!(report.entries().len(), 4);
        assert_eq!(report.extraction_count(), 1);
        assert_eq!(report.error_count(), 2);
    }
}
