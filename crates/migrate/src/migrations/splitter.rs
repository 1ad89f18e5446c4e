//! Statement Splitter - turns a migration script into executable statements
//!
//! Two modes exist:
//!
//! * [`SplitMode::Naive`] (default) splits on every `;`. A semicolon inside a
//!   string literal, quoted identifier or comment IS treated as a terminator,
//!   so scripts relying on such text must use quote-aware mode or be given as
//!   a pre-split statement list.
//! * [`SplitMode::QuoteAware`] runs the sqlparser tokenizer over the script and
//!   only splits on semicolon tokens. Statement text is sliced from the
//!   original script, never re-rendered. Fragments made only of whitespace and
//!   comments are dropped. If tokenizing fails, the naive split is used.

use serde::{Deserialize, Serialize};
use sqlparser::tokenizer::{Token, Tokenizer};

use crate::backends::{generic_tokenizer_dialect, SqlDialect};

/// How a raw script is cut into statements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMode {
    #[default]
    Naive,
    QuoteAware,
}

impl std::str::FromStr for SplitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "naive" => Ok(SplitMode::Naive),
            "quote_aware" => Ok(SplitMode::QuoteAware),
            _ => Err(format!("unknown split mode '{}' (expected naive or quote-aware)", s)),
        }
    }
}

/// Splits SQL source into an ordered list of statements
#[derive(Debug, Clone, Copy, Default)]
pub struct StatementSplitter {
    mode: SplitMode,
    dialect: Option<SqlDialect>,
}

impl StatementSplitter {
    pub fn new(mode: SplitMode) -> Self {
        Self {
            mode,
            dialect: None,
        }
    }

    /// Use the quoting rules of a specific backend in quote-aware mode
    pub fn for_dialect(mut self, dialect: SqlDialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    /// Split `sql` into trimmed, non-empty statements in source order
    pub fn split(&self, sql: &str) -> Vec<String> {
        match self.mode {
            SplitMode::Naive => split(sql),
            SplitMode::QuoteAware => self.split_quote_aware(sql).unwrap_or_else(|reason| {
                tracing::warn!("SQL tokenizing failed, using naive semicolon splitting: {}", reason);
                split(sql)
            }),
        }
    }

    fn split_quote_aware(&self, sql: &str) -> Result<Vec<String>, String> {
        let dialect = match self.dialect {
            Some(dialect) => dialect.tokenizer_dialect(),
            None => generic_tokenizer_dialect(),
        };

        let tokens = Tokenizer::new(dialect.as_ref(), sql)
            .tokenize_with_location()
            .map_err(|e| e.to_string())?;

        let line_starts = line_starts(sql);
        let mut statements = Vec::new();
        let mut start = 0;
        let mut has_content = false;

        for token in &tokens {
            match &token.token {
                Token::SemiColon => {
                    let end = byte_offset(sql, &line_starts, token.location.line, token.location.column)
                        .ok_or_else(|| format!("bad token location {:?}", token.location))?;
                    if has_content {
                        push_statement(&mut statements, &sql[start..end]);
                    }
                    start = end + 1;
                    has_content = false;
                }
                Token::Whitespace(_) | Token::EOF => {}
                _ => has_content = true,
            }
        }

        if has_content {
            push_statement(&mut statements, &sql[start..]);
        }

        Ok(statements)
    }
}

/// Naive split on `;`, trimming and discarding empty fragments
pub fn split(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .map(str::to_string)
        .collect()
}

fn push_statement(statements: &mut Vec<String>, fragment: &str) {
    let trimmed = fragment.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
}

fn line_starts(sql: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(sql.match_indices('\n').map(|(i, _)| i + 1))
        .collect()
}

// Tokenizer locations are 1-based line and character columns.
fn byte_offset(sql: &str, line_starts: &[usize], line: u64, column: u64) -> Option<usize> {
    let line_start = *line_starts.get(usize::try_from(line.checked_sub(1)?).ok()?)?;
    let column = usize::try_from(column.checked_sub(1)?).ok()?;
    sql[line_start..]
        .char_indices()
        .nth(column)
        .map(|(offset, _)| line_start + offset)
}
