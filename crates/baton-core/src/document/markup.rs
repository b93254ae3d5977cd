//! Markup vocabulary of the shared document: ids, classes, attributes, the
//! lock marker, the footer fingerprint, and builders for every node the
//! merger inserts.

use super::node::{Element, Node, escape_attr};
use super::parse::parse;
use crate::domain::ReportFragment;

const ID_PREFIX: &str = "baton";

pub const STATUS_CLASS: &str = "status";
pub const RESULT_ENTRY_CLASS: &str = "result-entry";
pub const RUN_NUMBER_ATTR: &str = "data-run-number";
pub const JOB_INDEX_ATTR: &str = "data-job-index";
pub const LOCKED_BY_ATTR: &str = "data-locked-by";
pub const FOOTER_ATTR: &str = "data-baton-footer";
pub const LOCK_ID: &str = "baton--lock";

pub const DEFAULT_HEADING: &str = "📊 Benchmark Results";
pub const SUMMARY_HEADING: &str = "Summary";
pub const RESULTS_HEADING: &str = "Results";

fn scoped_id(name: &str) -> String {
    format!("{ID_PREFIX}--{name}")
}

pub fn summary_list_id() -> String {
    scoped_id("summaries")
}

pub fn results_container_id() -> String {
    scoped_id("results")
}

pub fn summary_id(report_id: &str) -> String {
    scoped_id(&format!("summary-{report_id}"))
}

pub fn results_id(report_id: &str) -> String {
    scoped_id(&format!("results-{report_id}"))
}

// ---------------------------------------------------------------------------
// Lock marker
// ---------------------------------------------------------------------------

pub fn lock_marker(owner: &str) -> String {
    format!(
        r#"<span id="{LOCK_ID}" {LOCKED_BY_ATTR}="{}"></span>"#,
        escape_attr(owner)
    )
}

/// Owner named by the lock marker, if the body carries one.
pub fn locked_by(body: &str) -> Option<String> {
    if !body.contains(LOCK_ID) {
        return None;
    }
    parse(body)
        .find_by_id(LOCK_ID)
        .map(|marker| marker.get_attr(LOCKED_BY_ATTR).unwrap_or_default().to_string())
}

/// Remove every lock marker. Bodies without a marker come back unchanged
/// apart from trailing whitespace.
pub fn strip_lock(body: &str) -> String {
    if !body.contains(LOCK_ID) {
        return body.trim_end().to_string();
    }
    let mut doc = parse(body);
    doc.remove_where(&|el| el.id() == Some(LOCK_ID));
    doc.to_string().trim_end().to_string()
}

/// Replace whatever marker the body carries with one naming `owner`,
/// keeping the rest of the content.
pub fn with_lock(body: &str, owner: &str) -> String {
    format!("{}\n{}", strip_lock(body), lock_marker(owner))
}

// ---------------------------------------------------------------------------
// Footer
// ---------------------------------------------------------------------------

/// Footer fingerprint identifying documents of one coordination domain.
pub fn footer(domain_key: &str) -> String {
    format!(
        r#"<sub {FOOTER_ATTR}="{}"><em>Updated by baton for {}</em></sub>"#,
        escape_attr(domain_key),
        escape_attr(domain_key)
    )
}

/// The attribute text `matches` looks for.
pub fn footer_fingerprint(domain_key: &str) -> String {
    format!(r#"{FOOTER_ATTR}="{}""#, escape_attr(domain_key))
}

pub fn is_footer(el: &Element) -> bool {
    el.get_attr(FOOTER_ATTR).is_some()
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// Status indicator content: the fragment's status while running, else empty.
pub fn status_nodes(fragment: &ReportFragment) -> Vec<Node> {
    if fragment.is_running && !fragment.status.is_empty() {
        vec![Node::Raw(fragment.status.clone())]
    } else {
        Vec::new()
    }
}

fn status_span(fragment: &ReportFragment) -> Element {
    let mut span = Element::new("span").attr("class", STATUS_CLASS);
    span.set_content(status_nodes(fragment));
    span
}

pub fn summary_entry(fragment: &ReportFragment) -> Element {
    Element::new("div")
        .attr("id", summary_id(&fragment.report_id))
        .attr(RUN_NUMBER_ATTR, fragment.run_number.to_string())
        .child(status_span(fragment))
        .raw(fragment.title.clone())
        .raw(fragment.summary_content.clone())
}

pub fn summary_list_item(fragment: &ReportFragment) -> Element {
    Element::new("li")
        .attr(JOB_INDEX_ATTR, fragment.job_index.to_string())
        .child(summary_entry(fragment))
}

pub fn results_entry(fragment: &ReportFragment) -> Element {
    let mut details = Element::new("details");
    if fragment.default_open {
        details = details.flag("open");
    }
    let details = details
        .child(
            Element::new("summary")
                .child(status_span(fragment))
                .child(Element::new("strong").raw(fragment.title.clone())),
        )
        .child(
            Element::new("div")
                .attr("class", RESULT_ENTRY_CLASS)
                .raw(fragment.detail_content.clone()),
        );

    Element::new("div")
        .attr("id", results_id(&fragment.report_id))
        .attr(RUN_NUMBER_ATTR, fragment.run_number.to_string())
        .attr(JOB_INDEX_ATTR, fragment.job_index.to_string())
        .child(details)
}

pub fn summary_container() -> Element {
    Element::new("ul").attr("id", summary_list_id())
}

pub fn results_container() -> Element {
    Element::new("div").attr("id", results_container_id())
}

pub fn heading(level: &str, text: &str) -> Element {
    Element::new(level).raw(text.to_string())
}

/// A fresh document holding exactly one report.
pub fn new_document(heading_text: &str, fragment: &ReportFragment) -> Element {
    Element::root().child(
        Element::new("div")
            .child(heading("h2", heading_text))
            .child(heading("h3", SUMMARY_HEADING))
            .child(summary_container().child(summary_list_item(fragment)))
            .child(heading("h3", RESULTS_HEADING))
            .child(results_container().child(results_entry(fragment))),
    )
}
