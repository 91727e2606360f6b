//! Table formatting helpers for CLI output.

use comfy_table::{ContentArrangement, Table};
use imgmigrate_core::task::ReplicationResult;
use imgmigrate_runtime::BatchReport;

/// Create a styled table with the given headers.
pub fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.load_preset(comfy_table::presets::NOTHING);
    table.set_header(headers);
    table
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Render the replicated platforms and saved archives of a result.
pub fn result_tables(result: &ReplicationResult) -> (Table, Option<Table>) {
    let mut platforms = new_table(&["PLATFORM", "REFERENCE"]);
    for artifact in &result.succeeded {
        platforms.add_row(vec![artifact.platform.constraint(), artifact.local_ref.clone()]);
    }

    let archives = (!result.saved_files.is_empty()).then(|| {
        let mut table = new_table(&["ARCHIVE", "SIZE"]);
        for path in &result.saved_files {
            let size = std::fs::metadata(path)
                .map(|m| format_bytes(m.len()))
                .unwrap_or_else(|_| "-".to_string());
            table.add_row(vec![path.display().to_string(), size]);
        }
        table
    });

    (platforms, archives)
}

/// Print a task result: platforms, archives, warnings, then the index reference.
pub fn print_result(source: &str, result: &ReplicationResult) {
    let (platforms, archives) = result_tables(result);

    if result.succeeded.is_empty() {
        println!("No platforms of {} were replicated", source);
    } else {
        println!("{platforms}");
    }
    if let Some(archives) = archives {
        println!();
        println!("{archives}");
    }

    for warning in &result.warnings {
        eprintln!("Warning: {warning}");
    }

    if let Some(index) = &result.index_ref {
        println!("Index: {index}");
    }
}

/// Print every task of a batch followed by a summary line.
pub fn print_batch(report: &BatchReport) {
    for task in &report.reports {
        println!("[{}] {}", task.position, task.source);
        match &task.outcome {
            Ok(result) => print_result(&task.source, result),
            Err(e) => eprintln!("Error: {e}"),
        }
        println!();
    }

    let failed = report.failure_count();
    println!(
        "{} task(s) completed, {} failed",
        report.reports.len() - failed,
        failed
    );
}
