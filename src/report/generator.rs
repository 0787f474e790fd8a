//! Markdown and JSON rendering.

use super::{Report, ReportMetadata};
use crate::models::{
    DetailsNode, InfoLeaf, Leaf, MetricGroupNode, SessionScopePlotsNode, SummaryNode,
};
use anyhow::Result;

/// Generate a complete Markdown outline of a control tree.
pub fn generate_markdown_report(report: &Report) -> String {
    let mut output = String::new();

    output.push_str("# Control Tree\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_summary_section(&report.tree.summary));
    output.push_str(&generate_details_section(&report.tree.details));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Sessions:** {}\n",
        metadata.sessions.join(", ")
    ));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Tests:** {}\n", metadata.tests));
    section.push_str(&format!(
        "- **Build Duration:** {:.3}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Generate an info table; empty when there are no lines.
fn generate_info_table(title: &str, info: &[InfoLeaf]) -> String {
    if info.is_empty() {
        return String::new();
    }

    let mut table = String::new();
    table.push_str(&format!("**{}**\n\n", title));
    table.push_str("| Name | Value |\n");
    table.push_str("|:---|:---|\n");
    for leaf in info {
        table.push_str(&format!("| {} | {} |\n", leaf.name, leaf.value));
    }
    table.push('\n');

    table
}

/// Render a group and its subtree as a nested bullet list.
fn generate_group_outline<M: Leaf>(group: &MetricGroupNode<M>, depth: usize) -> String {
    let mut outline = String::new();
    let indent = "  ".repeat(depth);

    for leaf in &group.leaves {
        let names: Vec<String> = leaf
            .metric_names()
            .iter()
            .map(|n| format!("`{}`", n.metric_name))
            .collect();
        outline.push_str(&format!(
            "{}- {} ({})\n",
            indent,
            leaf.display_name(),
            names.join(", ")
        ));
    }

    for child in &group.groups {
        outline.push_str(&format!(
            "{}- **{}** [{}]\n",
            indent,
            child.display_name,
            child.leaf_count()
        ));
        outline.push_str(&generate_group_outline(child, depth + 1));
    }

    outline
}

/// Generate the summary section.
fn generate_summary_section(summary: &SummaryNode) -> String {
    let mut section = String::new();

    section.push_str(&format!("## {}\n\n", summary.display_name));
    section.push_str(&generate_info_table(
        &summary.session_info.display_name,
        &summary.session_info.info,
    ));

    if summary.tests.is_empty() {
        section.push_str("No tests were found for the requested sessions.\n\n");
        return section;
    }

    section.push_str("| Test | Session | Metrics |\n");
    section.push_str("|:---|:---|:---:|\n");
    for test in &summary.tests {
        section.push_str(&format!(
            "| {} | {} | {} |\n",
            test.display_name,
            test.task.session_id,
            test.metrics.leaf_count()
        ));
    }
    section.push('\n');

    for test in &summary.tests {
        section.push_str(&format!("### {}\n\n", test.display_name));
        section.push_str(&generate_info_table(
            &test.test_info.display_name,
            &test.test_info.info,
        ));
        section.push_str(&generate_group_outline(&test.metrics, 0));
        section.push('\n');
    }

    section
}

/// Generate the session scope plots subsection.
fn generate_session_scope_section(plots: &SessionScopePlotsNode) -> String {
    let mut section = String::new();

    section.push_str(&format!("### {}\n\n", plots.display_name));
    for plot in &plots.plots {
        section.push_str(&format!("- {}\n", plot.display_name));
    }
    section.push('\n');

    section
}

/// Generate the details section.
fn generate_details_section(details: &DetailsNode) -> String {
    let mut section = String::new();

    section.push_str(&format!("## {}\n\n", details.display_name));

    if let Some(ref plots) = details.session_scope_plots {
        section.push_str(&generate_session_scope_section(plots));
    }

    for test in &details.tests {
        section.push_str(&format!(
            "### {} *({} plots)*\n\n",
            test.display_name,
            test.plots.leaf_count()
        ));
        section.push_str(&generate_group_outline(&test.plots, 0));
        section.push('\n');
    }

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Generated by control-tree v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        InfoLeaf, MetricNode, PlotNode, PlotSource, RootNode, TaskData, TestDetailsNode, TestNode,
    };
    use chrono::Utc;

    fn create_test_report() -> Report {
        let task = TaskData::new("s1", "t1", "login");

        let mut metrics = MetricGroupNode::new("summary-1", "summary-1");
        let mut latency = MetricGroupNode::new("summary-1/latency", "Latency");
        latency.leaves.push(MetricNode::new("m1", "latency-p99"));
        metrics.groups.push(latency);

        let mut plots = MetricGroupNode::new("metrics-1", "metrics-1");
        plots
            .leaves
            .push(PlotNode::new("p1", "cpu@hostA", PlotSource::Monitoring));

        let mut tree = RootNode::empty();
        tree.summary.session_info.info.push(InfoLeaf {
            name: "Duration".to_string(),
            value: "10m".to_string(),
        });
        tree.summary
            .tests
            .push(TestNode::new(metrics, task.clone(), Vec::new()));
        tree.details.tests.push(TestDetailsNode::new(plots, task));

        Report {
            metadata: ReportMetadata {
                sessions: vec!["s1".to_string()],
                generated_at: Utc::now(),
                tests: 1,
                duration_seconds: 0.25,
            },
            tree,
        }
    }

    #[test]
    fn test_generate_markdown_report() {
        let report = create_test_report();
        let markdown = generate_markdown_report(&report);

        assert!(markdown.contains("# Control Tree"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("## Summary & Trends"));
        assert!(markdown.contains("## Metrics"));
        assert!(markdown.contains("| login | s1 | 1 |"));
        assert!(markdown.contains("- **Latency** [1]"));
        assert!(markdown.contains("  - latency-p99 (`latency-p99`)"));
        assert!(markdown.contains("| Duration | 10m |"));
    }

    #[test]
    fn test_empty_summary_message() {
        let mut report = create_test_report();
        report.tree = RootNode::empty();

        let markdown = generate_markdown_report(&report);
        assert!(markdown.contains("No tests were found"));
    }

    #[test]
    fn test_generate_json_report() {
        let report = create_test_report();
        let json = generate_json_report(&report).unwrap();

        assert!(json.contains("\"sessions\""));
        assert!(json.contains("\"summary\""));
        assert!(json.contains("\"details\""));
        assert!(!json.contains("\"session_scope_plots\""));

        let parsed: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.tree, report.tree);
    }
}
