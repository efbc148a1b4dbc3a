//! SQL batch executor
//!
//! Runs a script statement by statement on one session. Statements run in
//! order and each commits on its own; the first failure stops the script
//! because later statements usually depend on earlier ones.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cancel::CancellationToken;
use crate::error::{EngineError, Result};
use crate::progress::{rounded_percent, ProgressSender};
use crate::store::Store;

/// How a script is cut into statements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Splitter {
    /// Split on every terminator. A terminator inside a string literal
    /// splits the statement.
    #[default]
    Naive,
    /// Ignore terminators inside quoted strings, quoted identifiers,
    /// dollar-quoted bodies and comments
    QuoteAware,
}

/// Split `script` into trimmed, non-empty statements
pub fn split_statements(script: &str, terminator: char, splitter: Splitter) -> Vec<String> {
    let pieces = match splitter {
        Splitter::Naive => script.split(terminator).map(str::to_string).collect(),
        Splitter::QuoteAware => split_quote_aware(script, terminator),
    };
    pieces
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
enum Scan {
    Code,
    Single,
    Double,
    LineComment,
    BlockComment(usize),
    Dollar(String),
}

fn split_quote_aware(script: &str, terminator: char) -> Vec<String> {
    let chars: Vec<char> = script.chars().collect();
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut state = Scan::Code;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match &state {
            Scan::Code => {
                if c == terminator {
                    pieces.push(std::mem::take(&mut current));
                    i += 1;
                    continue;
                }
                match (c, next) {
                    ('\'', _) => state = Scan::Single,
                    ('"', _) => state = Scan::Double,
                    ('-', Some('-')) => state = Scan::LineComment,
                    ('/', Some('*')) => {
                        state = Scan::BlockComment(1);
                        current.push_str("/*");
                        i += 2;
                        continue;
                    }
                    ('$', _) => {
                        if let Some(tag) = dollar_tag(&chars[i..]) {
                            current.push_str(&tag);
                            i += tag.chars().count();
                            state = Scan::Dollar(tag);
                            continue;
                        }
                    }
                    _ => {}
                }
            }
            Scan::Single => {
                // '' is an escaped quote and keeps the literal open
                if c == '\'' {
                    if next == Some('\'') {
                        current.push_str("''");
                        i += 2;
                        continue;
                    }
                    state = Scan::Code;
                }
            }
            Scan::Double => {
                if c == '"' {
                    state = Scan::Code;
                }
            }
            Scan::LineComment => {
                if c == '\n' {
                    state = Scan::Code;
                }
            }
            Scan::BlockComment(depth) => {
                let depth = *depth;
                if c == '*' && next == Some('/') {
                    current.push_str("*/");
                    i += 2;
                    state = if depth == 1 {
                        Scan::Code
                    } else {
                        Scan::BlockComment(depth - 1)
                    };
                    continue;
                }
                if c == '/' && next == Some('*') {
                    current.push_str("/*");
                    i += 2;
                    state = Scan::BlockComment(depth + 1);
                    continue;
                }
            }
            Scan::Dollar(tag) => {
                let tag_len = tag.chars().count();
                if c == '$' && chars[i..].iter().take(tag_len).copied().eq(tag.chars()) {
                    current.push_str(tag);
                    i += tag_len;
                    state = Scan::Code;
                    continue;
                }
            }
        }

        current.push(c);
        i += 1;
    }

    pieces.push(current);
    pieces
}

/// `$$` or `$tag$` at the start of `chars`
fn dollar_tag(chars: &[char]) -> Option<String> {
    let mut tag = String::from("$");
    for (offset, &c) in chars.iter().enumerate().skip(1) {
        if c == '$' {
            tag.push('$');
            return Some(tag);
        }
        let valid = c == '_' || c.is_alphabetic() || (offset > 1 && c.is_ascii_digit());
        if !valid {
            return None;
        }
        tag.push(c);
    }
    None
}

/// How a script run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptOutcome {
    Completed { executed: usize, rows_affected: u64 },
    Cancelled { executed: usize },
}

/// Executes scripts sequentially on one session
#[derive(Debug, Clone, Copy)]
pub struct SqlBatchExecutor {
    terminator: char,
    splitter: Splitter,
}

impl Default for SqlBatchExecutor {
    fn default() -> Self {
        Self {
            terminator: ';',
            splitter: Splitter::Naive,
        }
    }
}

impl SqlBatchExecutor {
    pub fn new(terminator: char, splitter: Splitter) -> Self {
        Self {
            terminator,
            splitter,
        }
    }

    pub fn statements(&self, script: &str) -> Vec<String> {
        split_statements(script, self.terminator, self.splitter)
    }

    /// Run every statement of `script` in order.
    ///
    /// Checks the token before each statement. Stops at the first failing
    /// statement and returns [`EngineError::Statement`]; statements already
    /// executed stay committed.
    pub async fn run<S>(
        &self,
        store: &mut S,
        script: &str,
        cancel: &CancellationToken,
        events: &ProgressSender,
    ) -> Result<ScriptOutcome>
    where
        S: Store + ?Sized,
    {
        let statements = self.statements(script);
        if statements.is_empty() {
            return Err(EngineError::EmptyScript);
        }

        let total = statements.len();
        let mut rows_affected = 0u64;

        for (i, statement) in statements.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(ScriptOutcome::Cancelled { executed: i });
            }

            events.log(format!("({}/{}) Executing: {}", i + 1, total, preview(statement)));
            let affected =
                store
                    .execute(statement)
                    .await
                    .map_err(|source| EngineError::Statement {
                        index: i + 1,
                        statement: statement.clone(),
                        source,
                    })?;
            rows_affected += affected;
            debug!(index = i + 1, affected, "Statement committed");

            let percent = rounded_percent(i + 1, total);
            events.progress(percent, format!("Statement {}/{}", i + 1, total));
        }

        Ok(ScriptOutcome::Completed {
            executed: total,
            rows_affected,
        })
    }
}

/// First line of a statement, shortened for log output
pub fn preview(statement: &str) -> String {
    const MAX: usize = 80;
    let first_line = statement.lines().next().unwrap_or_default().trim();
    if first_line.chars().count() > MAX {
        let cut: String = first_line.chars().take(MAX).collect();
        format!("{}...", cut)
    } else if statement.contains('\n') {
        format!("{}...", first_line)
    } else {
        first_line.to_string()
    }
}
