//! Schema Dump - diagnostic `CREATE TABLE` listing
//!
//! Output format, one section per requested table, in request order:
//!
//! ```text
//! ### TABLE: users ###
//! CREATE TABLE `users` (...);
//!
//! ### TABLE: ghosts ###
//! -- ERROR: Database error: [1146] Table 'app.ghosts' doesn't exist
//! ```
//!
//! A table that cannot be probed never aborts the dump.

use std::fmt::Write as _;
use std::path::Path;

use super::probe::SchemaProbe;
use crate::error::MigrateResult;

#[derive(Debug, Clone, PartialEq, Eq)]
struct TableSection {
    table: String,
    ddl: Result<String, String>,
}

/// Collected DDL (or probe errors) for a list of tables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDump {
    sections: Vec<TableSection>,
}

impl SchemaDump {
    /// Probe every table in order, recording failures inline
    pub async fn collect<S: AsRef<str>>(probe: &mut SchemaProbe<'_>, tables: &[S]) -> Self {
        let mut sections = Vec::with_capacity(tables.len());

        for table in tables {
            let table = table.as_ref();
            let ddl = match probe.show_create_table(table).await {
                Ok(ddl) => Ok(ddl),
                Err(e) => {
                    tracing::warn!("Could not dump table '{}': {}", table, e);
                    Err(e.to_string())
                }
            };
            sections.push(TableSection {
                table: table.to_string(),
                ddl,
            });
        }

        Self { sections }
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Tables whose DDL could not be read
    pub fn failed_tables(&self) -> Vec<&str> {
        self.sections
            .iter()
            .filter(|section| section.ddl.is_err())
            .map(|section| section.table.as_str())
            .collect()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            // Writing to a String cannot fail
            let _ = writeln!(out, "### TABLE: {} ###", section.table);
            match &section.ddl {
                Ok(ddl) => {
                    let ddl = ddl.trim_end();
                    if ddl.ends_with(';') {
                        let _ = writeln!(out, "{}", ddl);
                    } else {
                        let _ = writeln!(out, "{};", ddl);
                    }
                }
                Err(message) => {
                    for line in message.lines() {
                        let _ = writeln!(out, "-- ERROR: {}", line);
                    }
                }
            }
            out.push('\n');
        }
        out
    }

    /// Write the rendered dump to `path`, replacing any existing file
    pub fn write_to(&self, path: impl AsRef<Path>) -> MigrateResult<()> {
        let path = path.as_ref();
        std::fs::write(path, self.render())?;
        tracing::info!("Schema dump written to {}", path.display());
        Ok(())
    }
}

impl<'c> SchemaProbe<'c> {
    /// Render the dump text for `tables`
    pub async fn dump<S: AsRef<str>>(&mut self, tables: &[S]) -> String {
        SchemaDump::collect(self, tables).await.render()
    }
}
