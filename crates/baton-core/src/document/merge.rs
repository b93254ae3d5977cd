//! DocumentMerger - folds one report fragment into the shared document.
//!
//! The merge is pure: the same document text and fragment always produce the
//! same output. Conflict resolution between writers relies on two keys
//! carried by every entry:
//!
//! - `data-run-number`: logical clock. An entry never moves backwards.
//! - `data-job-index`: ordering key. Both containers stay sorted by it.
//!
//! Both containers are gated by the run number stored on the results entry
//! (falling back to the summary's own when the results entry is missing), so
//! a report's summary and results always come from the same run.

use tracing::{info, warn};

use super::markup::{
    self, DEFAULT_HEADING, JOB_INDEX_ATTR, RESULTS_HEADING, RUN_NUMBER_ATTR, STATUS_CLASS,
    SUMMARY_HEADING,
};
use super::node::{Element, Node};
use super::parse::parse;
use crate::domain::ReportFragment;

/// What happened to one container during a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAction {
    /// No entry for the report existed; a new one was inserted.
    Inserted,
    /// The entry's content was replaced and its status cleared.
    Replaced,
    /// Only the running-status indicator was updated.
    StatusUpdated,
    /// The stored entry came from a newer run; nothing changed.
    SkippedStale,
}

/// Merge result plus per-container decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merged {
    pub text: String,
    pub summary: MergeAction,
    pub results: MergeAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMerger {
    heading: String,
}

impl Default for DocumentMerger {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy)]
enum Section {
    Summary,
    Results,
}

impl Section {
    fn container_id(self) -> String {
        match self {
            Section::Summary => markup::summary_list_id(),
            Section::Results => markup::results_container_id(),
        }
    }

    fn entry_id(self, report_id: &str) -> String {
        match self {
            Section::Summary => markup::summary_id(report_id),
            Section::Results => markup::results_id(report_id),
        }
    }

    fn empty_container(self) -> Element {
        match self {
            Section::Summary => markup::summary_container(),
            Section::Results => markup::results_container(),
        }
    }

    fn heading(self) -> &'static str {
        match self {
            Section::Summary => SUMMARY_HEADING,
            Section::Results => RESULTS_HEADING,
        }
    }

    /// Node inserted into the container for a report seen for the first time.
    fn new_child(self, fragment: &ReportFragment) -> Element {
        match self {
            Section::Summary => markup::summary_list_item(fragment),
            Section::Results => markup::results_entry(fragment),
        }
    }

    /// Node that replaces an existing entry (same id).
    fn replacement(self, fragment: &ReportFragment) -> Element {
        match self {
            Section::Summary => markup::summary_entry(fragment),
            Section::Results => markup::results_entry(fragment),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Section::Summary => "summary",
            Section::Results => "results",
        }
    }
}

impl DocumentMerger {
    pub fn new() -> Self {
        Self {
            heading: DEFAULT_HEADING.to_string(),
        }
    }

    /// Heading used when a fresh document is built.
    pub fn with_heading(mut self, heading: impl Into<String>) -> Self {
        self.heading = heading.into();
        self
    }

    pub fn merge(&self, document: Option<&str>, fragment: &ReportFragment) -> String {
        self.merge_detailed(document, fragment).text
    }

    pub fn merge_detailed(&self, document: Option<&str>, fragment: &ReportFragment) -> Merged {
        let Some(document) = document.filter(|text| !text.trim().is_empty()) else {
            info!(report = %fragment.report_id, "generating new document");
            return Merged {
                text: markup::new_document(&self.heading, fragment).to_string(),
                summary: MergeAction::Inserted,
                results: MergeAction::Inserted,
            };
        };

        info!(report = %fragment.report_id, "parsing existing document");
        let mut root = parse(document);

        let results_id = markup::results_id(&fragment.report_id);
        let summary_id = markup::summary_id(&fragment.report_id);
        let stored_run = root
            .find_by_id(&results_id)
            .or_else(|| root.find_by_id(&summary_id))
            .and_then(stored_run_number);

        let summary = self.merge_section(&mut root, Section::Summary, fragment, stored_run);
        let results = self.merge_section(&mut root, Section::Results, fragment, stored_run);

        Merged {
            text: root.to_string(),
            summary,
            results,
        }
    }

    fn merge_section(
        &self,
        root: &mut Element,
        section: Section,
        fragment: &ReportFragment,
        stored_run: Option<u64>,
    ) -> MergeAction {
        let entry_id = section.entry_id(&fragment.report_id);

        if root.find_by_id(&entry_id).is_none() {
            info!(
                section = section.name(),
                id = %entry_id,
                "no entry found, adding new one"
            );
            ensure_container(root, section);
            if let Some(container) = root.find_by_id_mut(&section.container_id()) {
                insert_by_job_index(container, fragment.job_index, section.new_child(fragment));
            }
            return MergeAction::Inserted;
        }

        if fragment.is_running {
            info!(section = section.name(), id = %entry_id, "adding status info");
            if let Some(entry) = root.find_by_id_mut(&entry_id) {
                set_status(entry, fragment);
            }
            return MergeAction::StatusUpdated;
        }

        if let Some(stored) = stored_run
            && stored > fragment.run_number
        {
            info!(
                section = section.name(),
                id = %entry_id,
                stored_run = stored,
                run = fragment.run_number,
                "existing entry is from a more recent run, not updating"
            );
            return MergeAction::SkippedStale;
        }

        info!(section = section.name(), id = %entry_id, "updating entry");
        root.replace_by_id(&entry_id, section.replacement(fragment));
        MergeAction::Replaced
    }
}

fn stored_run_number(entry: &Element) -> Option<u64> {
    entry.get_attr(RUN_NUMBER_ATTR)?.trim().parse().ok()
}

fn set_status(entry: &mut Element, fragment: &ReportFragment) {
    let status = markup::status_nodes(fragment);
    match entry.find_by_class_mut(STATUS_CLASS) {
        Some(span) => span.set_content(status),
        None => {
            warn!(
                id = ?entry.id(),
                "entry has no status indicator, adding one"
            );
            let mut span = Element::new("span").attr("class", STATUS_CLASS);
            span.set_content(status);
            entry.children.insert(0, Node::Element(span));
        }
    }
}

/// Recreate the container for `section` when the document lost it. A
/// recreated container (with its heading) goes right before the footer, or at
/// the end when there is no footer.
fn ensure_container(root: &mut Element, section: Section) {
    let container_id = section.container_id();
    if root.find_by_id(&container_id).is_some() {
        return;
    }
    warn!(
        section = section.name(),
        id = %container_id,
        "document is missing its container, recreating it"
    );
    let at = root
        .children
        .iter()
        .position(|c| c.as_element().is_some_and(markup::is_footer))
        .unwrap_or(root.children.len());
    let nodes = [
        Node::Element(markup::heading("h3", section.heading())),
        Node::Element(section.empty_container()),
    ];
    root.children.splice(at..at, nodes);
}

/// Insert before the first element child whose job index exceeds
/// `job_index`; append when there is none. Children without a readable job
/// index never stop the scan.
fn insert_by_job_index(container: &mut Element, job_index: i64, node: Element) {
    let position = container.children.iter().position(|child| {
        child
            .as_element()
            .and_then(|el| el.get_attr(JOB_INDEX_ATTR))
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .is_some_and(|existing| existing > job_index)
    });
    match position {
        Some(index) => container.children.insert(index, Node::Element(node)),
        None => container.children.push(Node::Element(node)),
    }
}
