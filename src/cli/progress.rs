//! Spinner and summary reporting for CLI lifecycle commands.

use std::time::Duration;

use console::style;
use indicatif::{HumanBytes, HumanDuration, ProgressBar, ProgressStyle};

use crate::controller::{ActivateReport, InstallReport};
use crate::graph::NetworkGraph;
use crate::payload::MapMarker;
use crate::state::WorkerRecord;
use crate::worker::WorkerStatus;

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Creates a spinner shown while a lifecycle event runs.
pub fn make_spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})") {
        bar.set_style(template);
    }
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

/// Prints what an install stored.
pub fn print_install_summary(report: &InstallReport) {
    let stats = &report.stats;
    println!("\n{SEPARATOR}");
    println!("Install Summary");
    println!("{SEPARATOR}");
    println!("  Generation:        {}", style(&report.generation).green());
    println!("  Entries stored:    {}", stats.entries_stored);
    println!("  Total size:        {}", HumanBytes(stats.total_bytes));
    println!("  Total time:        {}", HumanDuration(stats.elapsed));
    println!("  Average speed:     {}/s", HumanBytes(stats.average_speed()));
    if report.skip_waiting {
        println!("  Takes over clients without waiting");
    }
    println!("{SEPARATOR}");
}

/// Prints what an activation evicted.
pub fn print_activate_summary(report: &ActivateReport) {
    println!("\n{SEPARATOR}");
    println!("Activate Summary");
    println!("{SEPARATOR}");
    if report.deleted.is_empty() && report.failed.is_empty() {
        println!("  No stale generations");
    }
    for name in &report.deleted {
        println!("  {} {name}", style("evicted").dim());
    }
    for failure in &report.failed {
        println!(
            "  {} {} ({})",
            style("lingering").yellow(),
            failure.generation,
            failure.reason
        );
    }
    println!("{SEPARATOR}");
}

/// Prints the live worker status alongside what is on disk.
pub fn print_status(status: &WorkerStatus, record: Option<&WorkerRecord>, generations: &[String]) {
    println!("\n{SEPARATOR}");
    println!("Cache Status");
    println!("{SEPARATOR}");
    println!("  Current:           {}", style(&status.generation).green());
    println!("  State:             {}", status.state);
    println!("  Controls clients:  {}", status.controls_clients);
    if let Some(record) = record {
        println!("  Last run:          {} ({})", record.id, record.state);
        if let Some(at) = record.installed_at {
            println!("  Installed at:      {}", at.to_rfc3339());
        }
        if let Some(at) = record.activated_at {
            println!("  Activated at:      {}", at.to_rfc3339());
        }
        println!("  Entries:           {}", record.entries);
        for name in &record.lingering {
            println!("  {}         {name}", style("Lingering:").yellow());
        }
    }
    println!("{SEPARATOR}");
    println!("  {} generation(s) on disk", generations.len());
    for name in generations {
        let marker = if name == status.generation.as_str() { "*" } else { " " };
        println!("  {marker} {name}");
    }
    println!("{SEPARATOR}");
}

/// Prints graph totals after building it from payload files.
pub fn print_graph_summary(graph: &NetworkGraph) {
    eprintln!("{SEPARATOR}");
    eprintln!("  Nodes:             {}", graph.nodes().count());
    eprintln!("  Edges:             {}", graph.edges().len());
    if graph.skipped_edges() > 0 {
        eprintln!(
            "  {}     {}",
            style("Skipped edges:").yellow(),
            graph.skipped_edges()
        );
    }
    if graph.duplicate_nodes() > 0 {
        eprintln!(
            "  {}   {}",
            style("Duplicate nodes:").yellow(),
            graph.duplicate_nodes()
        );
    }
    eprintln!("{SEPARATOR}");
}

/// Prints map pins, flagging those that cannot be placed.
pub fn print_markers(markers: &[MapMarker]) {
    println!("{SEPARATOR}");
    let mut unplaced = 0;
    for marker in markers {
        let position = marker.position().map_or_else(
            || format!("{:>20}", "no location"),
            |(lat, lng)| format!("{lat:>9.4}, {lng:>9.4}"),
        );
        if marker.has_valid_position() {
            println!("  {position}  {}", marker.display_name());
        } else {
            unplaced += 1;
            println!("  {}  {}", style(position).red(), marker.display_name());
        }
    }
    println!("{SEPARATOR}");
    println!("  {} marker(s), {unplaced} without a usable location", markers.len());
}
