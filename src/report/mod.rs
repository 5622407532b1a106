//! Console tables for probe results.

use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};

use crate::probe::ProbeRecord;

/// Render records as a titled table with `ID`, `Value` and `Created At` columns.
pub fn render_records(title: &str, records: &[ProbeRecord]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["ID", "Value", "Created At"]);

    for record in records {
        table.add_row(vec![
            record.id.to_string(),
            record.value.clone(),
            record.created_at.to_rfc3339(),
        ]);
    }

    format!("{title}:\n{table}")
}

/// Table for the read taken before the insert; empty when the table had no rows.
pub fn render_latest(record: Option<&ProbeRecord>) -> String {
    let rows: Vec<ProbeRecord> = record.into_iter().cloned().collect();
    render_records("Latest record before probe", &rows)
}

pub fn render_inserted(record: &ProbeRecord) -> String {
    render_records("Inserted record", std::slice::from_ref(record))
}

pub fn print_latest(record: Option<&ProbeRecord>) {
    println!("\n{}\n", render_latest(record));
}

pub fn print_inserted(record: &ProbeRecord) {
    println!("\n{}\n", render_inserted(record));
}
