//! Report fragments: one job's contribution to the shared document.

use serde::{Deserialize, Serialize};

/// Pre-rendered content for one report, tagged with the keys the merger
/// needs to place and version it.
///
/// Rendering the HTML (titles, tables, status links) happens elsewhere; the
/// merger only moves these strings around.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFragment {
    /// Stable key of the report across runs.
    pub report_id: String,

    /// Ordering key among reports in the document.
    pub job_index: i64,

    /// Logical clock: the workflow run that produced this fragment.
    pub run_number: u64,

    /// When set, only the status indicator of an existing entry is updated.
    #[serde(default)]
    pub is_running: bool,

    #[serde(default)]
    pub title: String,

    /// Status indicator shown while the job is running.
    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub summary_content: String,

    #[serde(default)]
    pub detail_content: String,

    /// Render the results section expanded.
    #[serde(default)]
    pub default_open: bool,
}

impl ReportFragment {
    pub fn new(report_id: impl Into<String>, job_index: i64, run_number: u64) -> Self {
        Self {
            report_id: report_id.into(),
            job_index,
            run_number,
            is_running: false,
            title: String::new(),
            status: String::new(),
            summary_content: String::new(),
            detail_content: String::new(),
            default_open: false,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary_content = summary.into();
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail_content = detail.into();
        self
    }

    pub fn open(mut self, default_open: bool) -> Self {
        self.default_open = default_open;
        self
    }

    /// Mark the fragment as an in-progress status update.
    pub fn running(mut self, status: impl Into<String>) -> Self {
        self.is_running = true;
        self.status = status.into();
        self
    }

    /// Parse a fragment produced by an external renderer.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_json_fills_defaults() {
        let fragment =
            ReportFragment::from_json(r#"{"report_id":"bench","job_index":2,"run_number":14}"#)
                .unwrap();
        assert_eq!(fragment, ReportFragment::new("bench", 2, 14));
        assert!(!fragment.is_running);
    }

    #[test]
    fn running_sets_status() {
        let fragment = ReportFragment::new("bench", 0, 1).running("⏱ running");
        assert!(fragment.is_running);
        assert_eq!(fragment.status, "⏱ running");
    }
}
