//! Session-scoped orchestration.
//!
//! One session owns one connection, one schema cache and one model
//! backend. Nothing here is global: two sessions in the same process
//! cannot see each other's handles or in-flight queries.

use std::time::Duration;

use crate::connect::{self, BackendKind, ConnectionSpec, Database};
use crate::error::AskdbResult;
use crate::execute::{self, ExecOptions, ExecutionOutcome, ExecutionPolicy};
use crate::generate::{self, GeneratedQuery, GenerationRequest};
use crate::introspect::{self, Schema};
use crate::model::ModelBackend;

/// Options governing a turn's two suspension points: the model call and
/// the database call.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub generation_timeout: Duration,
    pub exec: ExecOptions,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            generation_timeout: Duration::from_secs(30),
            exec: ExecOptions::default(),
        }
    }
}

/// Everything one user turn produced.
#[derive(Debug)]
pub struct Turn {
    pub query: GeneratedQuery,
    pub outcome: ExecutionOutcome,
}

pub struct Session {
    db: Database,
    model: Box<dyn ModelBackend>,
    policy: ExecutionPolicy,
    options: SessionOptions,
    schema: Option<Schema>,
}

impl Session {
    /// Connect and wrap the handle. The descriptor is only read here; it is
    /// never stored or persisted.
    pub async fn connect(
        spec: &ConnectionSpec,
        model: Box<dyn ModelBackend>,
        policy: ExecutionPolicy,
        options: SessionOptions,
    ) -> AskdbResult<Self> {
        let db = connect::connect(spec).await?;
        Ok(Self::new(db, model, policy, options))
    }

    /// Wrap an already-open handle.
    pub fn new(
        db: Database,
        model: Box<dyn ModelBackend>,
        policy: ExecutionPolicy,
        options: SessionOptions,
    ) -> Self {
        Self {
            db,
            model,
            policy,
            options,
            schema: None,
        }
    }

    pub fn backend(&self) -> BackendKind {
        self.db.kind()
    }

    /// The schema description, introspected once per connection. A new
    /// connection means a new session, which starts with an empty cache.
    pub async fn schema(&mut self) -> AskdbResult<&Schema> {
        if self.schema.is_none() {
            let schema = introspect::introspect(&mut self.db).await?;
            self.schema = Some(schema);
        }
        Ok(self.schema.as_ref().expect("schema cached above"))
    }

    /// Generate SQL for `question` without executing it (dry-run).
    pub async fn generate(&mut self, question: &str) -> AskdbResult<GeneratedQuery> {
        let timeout = self.options.generation_timeout;
        self.schema().await?;
        let schema = self.schema.as_ref().expect("schema cached above");
        let request = GenerationRequest { question, schema };
        let query = generate::generate(self.model.as_ref(), &request, timeout).await?;
        Ok(query)
    }

    /// One user turn: generate SQL for `question`, then execute it.
    ///
    /// No retries. The first failure ends the turn; the connection stays
    /// valid for the next one, never half-open.
    pub async fn ask(&mut self, question: &str) -> AskdbResult<Turn> {
        let query = self.generate(question).await?;
        let outcome =
            execute::execute(&mut self.db, &query, &self.policy, &self.options.exec).await?;
        Ok(Turn { query, outcome })
    }

    /// Release the connection. Unconditional: callable after any sequence
    /// of failed or successful turns.
    pub async fn close(self) {
        self.db.close().await;
    }
}
