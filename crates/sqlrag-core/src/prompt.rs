//! Prompt templates for SQL synthesis and answer synthesis.

/// Inputs to the SQL synthesis template.
#[derive(Debug, Clone)]
pub struct SqlPrompt {
    /// The user's question.
    pub question: String,

    /// Retrieved schema documents joined by blank lines.
    pub schema_context: String,

    /// Dialect named in the instructions (e.g. "MySQL").
    pub dialect: String,

    /// Default row cap.
    pub row_limit: usize,
}

impl SqlPrompt {
    /// Render the full prompt text.
    pub fn render(&self) -> String {
        format!(
            r#"You are a SQL expert. Given a natural language question and database schema context, generate a single valid {dialect} query.

Database Schema:
{context}

Question: {question}

Important rules:
- Use only the tables and columns that appear in the schema above
- Return ONLY the SQL query, exactly one statement, no explanation or markdown
- Use proper {dialect} syntax
- Use table and column names exactly as shown in the schema
- Include appropriate JOINs when querying related tables
- Limit results to {limit} rows unless specifically asked for more

SQL Query:"#,
            dialect = self.dialect,
            context = self.schema_context,
            question = self.question,
            limit = self.row_limit,
        )
    }
}

/// Inputs to the answer synthesis template.
#[derive(Debug, Clone)]
pub struct AnswerPrompt {
    /// The user's question.
    pub question: String,

    /// The statement that produced the results.
    pub sql: String,

    /// Serialized result rows.
    pub results_json: String,
}

impl AnswerPrompt {
    /// Render the full prompt text.
    pub fn render(&self) -> String {
        format!(
            r#"You are a helpful database assistant. A user asked a question, we executed a SQL query, and got results.

User Question: {question}

SQL Query Executed:
{sql}

Query Results:
{results}

Provide a natural language answer to the user's question based on these results. Be concise and direct. If there are many results, summarize the key findings instead of listing every row."#,
            question = self.question,
            sql = self.sql,
            results = self.results_json,
        )
    }
}

const FENCE: &str = "```";

/// Keywords that open a statement and so can never be a language tag.
const STATEMENT_KEYWORDS: [&str; 8] = [
    "SELECT", "WITH", "SHOW", "DESCRIBE", "DESC", "EXPLAIN", "VALUES", "TABLE",
];

/// Extract the statement from a model response.
///
/// If the response contains a fenced code block, the inner text of the first
/// block is used, minus an optional language tag. Surrounding whitespace is
/// always removed.
pub fn strip_code_fences(response: &str) -> String {
    let text = response.trim();

    let Some(open) = text.find(FENCE) else {
        return text.to_string();
    };

    let after_open = &text[open + FENCE.len()..];
    let inner = match after_open.find(FENCE) {
        Some(close) => &after_open[..close],
        None => after_open,
    };

    strip_language_tag(inner).trim().to_string()
}

/// Drop a leading language tag such as `sql` or `mysql`.
fn strip_language_tag(inner: &str) -> &str {
    let tag_len = inner
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '+'))
        .unwrap_or(inner.len());

    if tag_len == 0 {
        return inner;
    }

    let (tag, rest) = inner.split_at(tag_len);

    if STATEMENT_KEYWORDS
        .iter()
        .any(|keyword| tag.eq_ignore_ascii_case(keyword))
    {
        return inner;
    }

    // Tag on its own line: ```sql\nSELECT ...
    if rest.starts_with('\n') || rest.starts_with("\r\n") {
        return rest;
    }

    // Tag and statement on one line: ```sql SELECT ...
    if rest.starts_with(char::is_whitespace) && tag.to_ascii_lowercase().ends_with("sql") {
        return rest;
    }

    inner
}
