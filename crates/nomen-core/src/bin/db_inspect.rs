//! Dump the repository database: file records and analysis cache stats

use std::path::PathBuf;

use anyhow::Result;
use nomen_core::config;
use nomen_core::db::{AnalysisQuery, FileQuery, NomenDb};

fn main() -> Result<()> {
    env_logger::init();

    let db_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(config::default_db_path);

    println!("database: {db_path:?}");
    let db = NomenDb::open(&db_path)?;

    let records = FileQuery::get_all(&db)?;
    println!("{} file records", records.len());
    for record in &records {
        println!(
            "  [{:>3}] {:<40} {:<10} hash={} cat={}",
            record.id,
            record.filename,
            if record.flagged {
                "flagged".to_string()
            } else {
                record.status.as_str().to_string()
            },
            &record.file_hash[..record.file_hash.len().min(12)],
            record.fields.cat_id.as_deref().unwrap_or("-"),
        );
        if !record.changed_fields.is_empty() {
            let changed: Vec<&str> = record.changed_fields.iter().map(String::as_str).collect();
            println!("        dirty: {}", changed.join(", "));
        }
    }

    println!("{} cached analyses", AnalysisQuery::count(&db)?);
    Ok(())
}
