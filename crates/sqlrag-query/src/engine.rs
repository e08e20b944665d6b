//! Query engine: question in, answer or terminal outcome out.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};
use ulid::Ulid;

use sqlrag_core::{
    rows_to_json, AnswerPrompt, Embedder, Execution, QueryConfig, Result, Retrieval, RowRecord,
    SqlExecutor, SqlPrompt, TextGenerator, VectorIndex,
};

use crate::guard::check_read_only;

/// Per-engine query settings.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Schema documents retrieved per question.
    pub top_n: usize,

    /// Row cap named in the SQL prompt.
    pub row_limit: usize,

    /// Dialect named in the SQL prompt.
    pub dialect: String,

    /// Run generated statements through the read-only guard.
    pub read_only: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self::from(&QueryConfig::default())
    }
}

impl From<&QueryConfig> for QueryOptions {
    fn from(config: &QueryConfig) -> Self {
        Self {
            top_n: config.top_n,
            row_limit: config.row_limit,
            dialect: config.dialect.clone(),
            read_only: config.read_only,
        }
    }
}

/// Where a session is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Received,
    Retrieved,
    SqlGenerated,
    ExecutedOk,
    ExecutedError,
    Answered,
}

impl SessionState {
    /// Whether `next` is a legal step from this state.
    pub fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Received, Retrieved)
                | (Retrieved, SqlGenerated)
                | (SqlGenerated, ExecutedOk)
                | (SqlGenerated, ExecutedError)
                | (ExecutedOk, Answered)
        )
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryOutcome {
    /// Rows came back and were summarized.
    Answered {
        sql: String,
        rows: Vec<RowRecord>,
        answer: String,
    },

    /// The statement ran and returned nothing.
    NoResults { sql: String },

    /// The statement was refused or failed. No correction is attempted.
    ExecutionFailed { sql: String, error: String },
}

impl QueryOutcome {
    /// The statement this outcome is about.
    pub fn sql(&self) -> &str {
        match self {
            Self::Answered { sql, .. }
            | Self::NoResults { sql }
            | Self::ExecutionFailed { sql, .. } => sql,
        }
    }
}

/// One question, start to finish.
#[derive(Debug, Clone, Serialize)]
pub struct QuerySession {
    pub id: Ulid,
    pub question: String,
    pub retrieval: Retrieval,
    pub sql: String,
    pub state: SessionState,
    pub outcome: QueryOutcome,
    pub latency_ms: u64,
}

/// Tracks the state of the session being built.
struct Progress {
    id: Ulid,
    state: SessionState,
}

impl Progress {
    fn new() -> Self {
        Self {
            id: Ulid::new(),
            state: SessionState::Received,
        }
    }

    fn advance(&mut self, next: SessionState) {
        debug_assert!(self.state.can_advance_to(next));
        debug!("Session {}: {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
    }
}

/// Text-to-SQL query engine.
///
/// Holds no state between questions; every call to [`QueryEngine::ask`] is
/// independent.
pub struct QueryEngine<E: ?Sized, G: ?Sized, V: ?Sized, X: ?Sized> {
    embedder: Arc<E>,
    generator: Arc<G>,
    index: Arc<V>,
    executor: Arc<X>,
    options: QueryOptions,
}

impl<E, G, V, X> QueryEngine<E, G, V, X>
where
    E: Embedder + ?Sized,
    G: TextGenerator + ?Sized,
    V: VectorIndex + ?Sized,
    X: SqlExecutor + ?Sized,
{
    /// Create a new query engine.
    pub fn new(
        embedder: Arc<E>,
        generator: Arc<G>,
        index: Arc<V>,
        executor: Arc<X>,
        options: QueryOptions,
    ) -> Self {
        Self {
            embedder,
            generator,
            index,
            executor,
            options,
        }
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// Retrieve the `top_n` schema documents most similar to `question`.
    pub async fn retrieve(&self, question: &str, top_n: usize) -> Result<Retrieval> {
        let vector = self.embedder.embed(question).await?;
        let hits = self.index.query(&vector, top_n).await?;
        Ok(Retrieval::from_hits(hits))
    }

    /// Answer one question.
    ///
    /// Statement failures and empty results are terminal outcomes, not
    /// errors. Embedding, index and generation failures are returned as
    /// `Err`.
    pub async fn ask(&self, question: &str) -> Result<QuerySession> {
        let start = Instant::now();
        let mut progress = Progress::new();

        info!("Question {}: {:?}", progress.id, question);

        let retrieval = self.retrieve(question, self.options.top_n).await?;
        progress.advance(SessionState::Retrieved);
        info!("Retrieved tables: {}", retrieval.table_names().join(", "));

        let sql_prompt = SqlPrompt {
            question: question.to_string(),
            schema_context: retrieval.context(),
            dialect: self.options.dialect.clone(),
            row_limit: self.options.row_limit,
        };
        let sql = self.generator.generate_sql(&sql_prompt).await?;
        progress.advance(SessionState::SqlGenerated);
        debug!("Generated SQL: {}", sql);

        let outcome = match self.run(&sql).await? {
            Execution::Failed { message } => {
                progress.advance(SessionState::ExecutedError);
                warn!("Execution failed: {}", message);
                QueryOutcome::ExecutionFailed {
                    sql: sql.clone(),
                    error: message,
                }
            }
            Execution::Rows(rows) if rows.is_empty() => {
                progress.advance(SessionState::ExecutedOk);
                info!("Statement returned no rows");
                QueryOutcome::NoResults { sql: sql.clone() }
            }
            Execution::Rows(rows) => {
                progress.advance(SessionState::ExecutedOk);
                info!("Statement returned {} rows", rows.len());

                let answer_prompt = AnswerPrompt {
                    question: question.to_string(),
                    sql: sql.clone(),
                    results_json: rows_to_json(&rows)?,
                };
                let answer = self.generator.synthesize_answer(&answer_prompt).await?;
                progress.advance(SessionState::Answered);

                QueryOutcome::Answered {
                    sql: sql.clone(),
                    rows,
                    answer,
                }
            }
        };

        let latency_ms = start.elapsed().as_millis() as u64;
        info!("Question {} finished in {}ms", progress.id, latency_ms);

        Ok(QuerySession {
            id: progress.id,
            question: question.to_string(),
            retrieval,
            sql,
            state: progress.state,
            outcome,
            latency_ms,
        })
    }

    /// Guard then execute.
    async fn run(&self, sql: &str) -> Result<Execution> {
        if self.options.read_only {
            if let Err(rejection) = check_read_only(sql) {
                return Ok(Execution::failed(rejection.to_string()));
            }
        }
        self.executor.execute(sql).await
    }
}
