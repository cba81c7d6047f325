//! nemu-core - Core library for nemu.
//!
//! nemu is a conversational knowledge base: it answers questions it has been
//! taught, and when it does not know an answer it asks to be taught, learning
//! from the reply.
//!
//! # Example
//!
//! ```ignore
//! use nemu_core::{IncomingMessage, KnowledgeEngine, NemuConfig, Reaction};
//!
//! let engine = KnowledgeEngine::open(&NemuConfig::from_env())?;
//!
//! match engine.dispatch(&message).await {
//!     Reaction::AskToBeTaught { scope, query, prompt } => {
//!         let sent = transport.reply(&prompt).await?;
//!         engine.on_prompt_sent(sent, scope, &query);
//!     }
//!     Reaction::Answer { text } | Reaction::Acknowledge { text, .. } => {
//!         let sent = transport.reply(&text).await?;
//!         engine.on_message_sent(sent);
//!     }
//!     Reaction::Ignore => {}
//! }
//! ```

pub mod config;
pub mod correlator;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod mediator;
pub mod phrases;
pub mod stats;
pub mod storage;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::NemuConfig;
pub use correlator::{PendingTeachingPrompt, TeachingCorrelator, TeachingLesson};
pub use engine::KnowledgeEngine;
pub use error::{ErrorCode, NemuError, NemuResult};
pub use extractor::QueryExtractor;
pub use mediator::ResponseMediator;
pub use stats::{Interaction, InteractionSink, NoopInteractionSink, SqliteInteractionStats, UserStats};
pub use storage::{KnowledgeStorage, ScoredEntry, SqliteKnowledgeStorage};
pub use store::{KnowledgeStore, LookupHit, MatchTier};
pub use types::{
    normalize_trigger, Author, Classification, IncomingMessage, KnowledgeEntry, MessageId,
    Reaction, Scope, ScopeResolver, SharingMode, TeachOutcome, TeachResult,
};
