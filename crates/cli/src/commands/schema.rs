use std::path::PathBuf;

use idem_core::{parse_table_list, MigrateConfig};
use idem_migrate::{ColumnInfo, SchemaDump, SchemaProbe};

use super::connect;

pub async fn describe(config: &MigrateConfig, table: &str) -> anyhow::Result<()> {
    let pool = connect(config).await?;
    let mut conn = pool.acquire().await?;

    let columns = SchemaProbe::new(&mut *conn).describe_table(table).await;

    conn.close().await?;
    pool.close().await?;

    println!("📊 Table: {}", table);
    println!("{}", "=".repeat(table.len() + 10));
    for line in column_lines(&columns?) {
        println!("{}", line);
    }
    Ok(())
}

/// Dump DDL for the requested tables; returns the number of tables that failed
pub async fn dump(
    config: &MigrateConfig,
    tables: Vec<String>,
    output: Option<PathBuf>,
) -> anyhow::Result<usize> {
    let (tables, output) = dump_targets(config, tables, output)?;

    let pool = connect(config).await?;
    let mut conn = pool.acquire().await?;

    let dump = {
        let mut probe = SchemaProbe::new(&mut *conn);
        SchemaDump::collect(&mut probe, &tables[..]).await
    };

    conn.close().await?;
    pool.close().await?;

    dump.write_to(&output)?;

    let failed = dump.failed_tables();
    println!(
        "📝 Dumped {} of {} tables to {}",
        dump.len() - failed.len(),
        dump.len(),
        output.display()
    );
    for table in &failed {
        println!("  ⚠️  {}: see inline error", table);
    }
    Ok(failed.len())
}

/// Tables and output path, falling back to IDEM_DUMP_TABLES / IDEM_DUMP_OUTPUT
fn dump_targets(
    config: &MigrateConfig,
    tables: Vec<String>,
    output: Option<PathBuf>,
) -> anyhow::Result<(Vec<String>, PathBuf)> {
    let tables = if tables.is_empty() {
        config.dump_tables.clone()
    } else {
        parse_table_list(&tables.join(","))
    };

    if tables.is_empty() {
        anyhow::bail!("No tables to dump. Pass --tables or set IDEM_DUMP_TABLES");
    }

    Ok((tables, output.unwrap_or_else(|| config.dump_output.clone())))
}

fn column_lines(columns: &[ColumnInfo]) -> Vec<String> {
    let width = columns
        .iter()
        .map(|column| column.name.len())
        .max()
        .unwrap_or(0);

    columns
        .iter()
        .map(|column| {
            let mut line = format!(
                "  {:<width$}  {}",
                column.name,
                column.data_type,
                width = width
            );
            if !column.nullable {
                line.push_str(" NOT NULL");
            }
            if let Some(default) = &column.default {
                line.push_str(&format!(" DEFAULT {}", default));
            }
            line
        })
        .collect()
}
