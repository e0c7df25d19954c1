//! Prompt assembly and SQL extraction.
//!
//! Turns a question plus a schema description into exactly one SQL
//! statement, or a typed failure. Models are asked for bare SQL, but their
//! answers still arrive wrapped in fences and prose often enough that
//! extraction has to peel both.

use std::time::Duration;

use crate::error::GenerateError;
use crate::introspect::Schema;
use crate::model::ModelBackend;

/// One turn's input to the generator.
#[derive(Debug)]
pub struct GenerationRequest<'a> {
    pub question: &'a str,
    pub schema: &'a Schema,
}

/// The extracted statement plus the raw model response for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedQuery {
    pub sql: String,
    pub raw: String,
}

/// Keywords a statement may begin with. Anything else after stripping is
/// "nothing usable".
const SQL_KEYWORDS: &[&str] = &[
    "SELECT", "WITH", "INSERT", "UPDATE", "DELETE", "CREATE", "DROP", "ALTER", "TRUNCATE",
    "EXPLAIN", "PRAGMA", "SHOW", "DESCRIBE", "VALUES",
];

/// Assemble the prompt. Same schema and question in, same prompt out;
/// determinism here keeps testing and prompt caching sane.
pub fn build_prompt(schema: &Schema, question: &str) -> String {
    format!(
        "You are an expert SQL engineer. Database schema:\n\
         {schema}\n\
         Rules:\n\
         1. Respond with exactly one SQL statement and nothing else.\n\
         2. No prose, no explanations, no code fences.\n\
         3. Use explicit JOIN syntax.\n\
         4. Qualify column names with table aliases when joining.\n\
         5. Include relevant WHERE clauses.\n\
         6. Handle NULL values appropriately.\n\
         \n\
         Question: {question}\n",
        schema = schema.render(),
        question = question.trim(),
    )
}

/// Run one generation turn against `backend`, bounded by `timeout`.
///
/// The bound covers the whole call, on top of whatever transport timeout
/// the backend applies itself, so a stalled backend can never hang a turn.
pub async fn generate(
    backend: &dyn ModelBackend,
    request: &GenerationRequest<'_>,
    timeout: Duration,
) -> Result<GeneratedQuery, GenerateError> {
    let prompt = build_prompt(request.schema, request.question);
    tracing::debug!(
        model = backend.name(),
        prompt_bytes = prompt.len(),
        "requesting completion"
    );

    let raw = tokio::time::timeout(timeout, backend.complete(&prompt))
        .await
        .map_err(|_| GenerateError::Timeout(timeout))??;

    let sql = extract_statement(&raw)?;
    tracing::debug!(sql = %sql, "extracted statement");
    Ok(GeneratedQuery { sql, raw })
}

/// Pull exactly one SQL statement out of a raw model response.
///
/// Strips code fences and surrounding prose, then requires the residue to
/// begin with a recognized SQL keyword. More than one semicolon-terminated
/// statement is an error, never a guess about which to run.
pub fn extract_statement(raw: &str) -> Result<String, GenerateError> {
    let body = strip_prose(strip_fences(raw));
    if body.trim().is_empty() {
        return Err(GenerateError::EmptyResponse);
    }

    let mut statements = split_statements(body.trim());
    match statements.len() {
        0 => Err(GenerateError::EmptyResponse),
        1 => Ok(statements.remove(0)),
        n => Err(GenerateError::MultiStatement(n)),
    }
}

/// If the response contains a fenced block, use the first block's body;
/// the fence line's language tag is skipped.
fn strip_fences(raw: &str) -> &str {
    let Some(open) = raw.find("```") else {
        return raw;
    };
    let after = &raw[open + 3..];
    let start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let inner = &after[start..];
    match inner.find("```") {
        Some(close) => &inner[..close],
        None => inner,
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Drop any natural-language preamble: the statement starts at the first
/// recognized keyword found at a word boundary. Returns "" when no keyword
/// appears at all.
fn strip_prose(body: &str) -> &str {
    let upper = body.to_ascii_uppercase();
    let bytes = upper.as_bytes();
    let mut best: Option<usize> = None;

    for kw in SQL_KEYWORDS {
        let mut from = 0;
        while let Some(pos) = upper[from..].find(kw) {
            let at = from + pos;
            let end = at + kw.len();
            let before_ok = at == 0 || !is_ident_byte(bytes[at - 1]);
            let after_ok = end >= bytes.len() || !is_ident_byte(bytes[end]);
            if before_ok && after_ok {
                best = Some(best.map_or(at, |b| b.min(at)));
                break;
            }
            from = end;
        }
    }

    match best {
        Some(at) => &body[at..],
        None => "",
    }
}

/// Split on semicolons outside string literals and quoted identifiers,
/// keeping only segments that read as SQL. Trailing prose after the final
/// semicolon is discarded rather than counted as a statement.
fn split_statements(text: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;

    for ch in text.chars() {
        match ch {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            ';' if !in_single && !in_double => {
                current.push(';');
                segments.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    if !current.trim().is_empty() {
        segments.push(current);
    }

    segments
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| begins_with_keyword(s))
        .collect()
}

fn begins_with_keyword(statement: &str) -> bool {
    let upper = statement.to_ascii_uppercase();
    SQL_KEYWORDS.iter().any(|kw| {
        upper.starts_with(kw)
            && upper
                .as_bytes()
                .get(kw.len())
                .map_or(true, |b| !is_ident_byte(*b))
    })
}
