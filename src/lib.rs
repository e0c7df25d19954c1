//! # askdb
//!
//! Ask a relational database questions in plain language.
//!
//! askdb introspects the connected schema, hands the description to a
//! language model together with the question, extracts exactly one SQL
//! statement from the response, and executes it behind a read-only policy
//! gate. SQLite, MySQL, PostgreSQL and SQL Server are supported.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use askdb::prelude::*;
//!
//! let mut spec = ConnectionSpec::new(BackendKind::Sqlite);
//! spec.path = Some("clinic.db".into());
//!
//! let model = askdb::model::backend_for(
//!     ModelChoice::Gemini,
//!     "http://localhost:11434",
//!     std::time::Duration::from_secs(30),
//! )?;
//!
//! let mut session = Session::connect(
//!     &spec,
//!     model,
//!     ExecutionPolicy::default(),
//!     SessionOptions::default(),
//! ).await?;
//!
//! let turn = session.ask("which patients have an appointment today?").await?;
//! session.close().await;
//! ```
//!
//! The write gate is a policy decision, not a security boundary: it keeps
//! a hallucinated `DELETE` from running in the default read-only mode and
//! nothing more.

pub mod config;
pub mod connect;
pub mod error;
pub mod execute;
pub mod generate;
pub mod introspect;
pub mod model;
pub mod render;
pub mod repl;
pub mod session;

pub mod prelude {
    pub use crate::connect::{connect, BackendKind, ConnectionSpec, Database};
    pub use crate::error::*;
    pub use crate::execute::{
        ExecOptions, ExecutionOutcome, ExecutionPolicy, ResultSet, StatementKind, Value,
    };
    pub use crate::generate::{build_prompt, extract_statement, GeneratedQuery, GenerationRequest};
    pub use crate::introspect::{introspect, Schema};
    pub use crate::model::{ModelBackend, ModelChoice};
    pub use crate::session::{Session, SessionOptions, Turn};
}
