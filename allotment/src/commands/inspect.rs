// allotment/src/commands/inspect.rs
//
// USE CASE: Inspect a table of the project store (schema + sample rows).

use std::path::{Path, PathBuf};

use allotment_core::infrastructure::config::load_project_config;
use duckdb::Connection;
use duckdb::types::ValueRef;

use super::project::table;

fn render(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        other => format!("{:?}", other),
    }
}

pub fn execute(project_dir: PathBuf, table_name: String, limit: usize) -> anyhow::Result<()> {
    let config = load_project_config(&project_dir)?;
    let db_path = config.database_location(&project_dir);
    if db_path != ":memory:" && !Path::new(&db_path).exists() {
        anyhow::bail!(
            "❌ Database not found at: {}\n👉 Have you run 'allotment init'?",
            db_path
        );
    }

    let conn = Connection::open(&db_path)?;
    let quoted = format!("\"{}\"", table_name.replace('"', "\"\""));

    println!("\n🔍 Inspecting Table: '{}'", table_name);

    let mut stmt_cols = conn.prepare(&format!("PRAGMA table_info({})", quoted))?;
    let columns: Vec<(String, String)> = stmt_cols
        .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    if columns.is_empty() {
        anyhow::bail!("❌ Table '{}' not found", table_name);
    }

    let mut schema = table(vec!["Column", "Type"]);
    for (name, data_type) in &columns {
        schema.add_row(vec![name.clone(), data_type.clone()]);
    }
    println!("{schema}");

    let total: i64 = conn.query_row(&format!("SELECT count(*) FROM {}", quoted), [], |r| r.get(0))?;
    println!("   --- Rows ({} total, limit {}) ---", total, limit);

    let mut stmt = conn.prepare(&format!("SELECT * FROM {} LIMIT {}", quoted, limit))?;
    let mut rows = stmt.query([])?;
    let mut sample = table(columns.iter().map(|(n, _)| n.as_str()).collect());
    while let Some(row) = rows.next()? {
        let values: Vec<String> = (0..columns.len())
            .map(|i| match row.get_ref(i) {
                Ok(val) => render(val),
                Err(_) => "ERROR".to_string(),
            })
            .collect();
        sample.add_row(values);
    }
    println!("{sample}");

    Ok(())
}
