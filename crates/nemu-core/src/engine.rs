//! The knowledge engine: nemu's entry points for a transport layer.
//!
//! One engine is shared by every in-flight message. It owns the correlator
//! state, so the "teach me" prompts it remembers live exactly as long as the
//! engine does.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::NemuConfig;
use crate::correlator::TeachingCorrelator;
use crate::error::NemuResult;
use crate::extractor::QueryExtractor;
use crate::mediator::ResponseMediator;
use crate::phrases;
use crate::stats::{Interaction, InteractionSink, NoopInteractionSink};
use crate::storage::{KnowledgeStorage, SqliteKnowledgeStorage};
use crate::store::KnowledgeStore;
use crate::types::{
    Author, Classification, IncomingMessage, MessageId, Reaction, Scope, ScopeResolver,
    TeachOutcome,
};

/// Query extraction, tiered lookup and teaching behind one handle.
pub struct KnowledgeEngine {
    resolver: ScopeResolver,
    extractor: QueryExtractor,
    store: KnowledgeStore,
    correlator: TeachingCorrelator,
    mediator: ResponseMediator,
    stats: Arc<dyn InteractionSink>,
}

impl KnowledgeEngine {
    /// Build an engine. Pass `None` to start with the storage detached.
    pub fn new(config: &NemuConfig, storage: Option<Arc<dyn KnowledgeStorage>>) -> NemuResult<Self> {
        config.validate()?;

        let store = match storage {
            Some(storage) => KnowledgeStore::new(storage, &config.knowledge),
            None => KnowledgeStore::detached(&config.knowledge),
        };

        Ok(Self {
            resolver: ScopeResolver::new(config.knowledge.sharing),
            extractor: QueryExtractor::new(&config.extractor)?,
            store,
            correlator: TeachingCorrelator::new(&config.correlator),
            mediator: ResponseMediator::new(&config.mediator),
            stats: Arc::new(NoopInteractionSink),
        })
    }

    /// Build an engine over the SQLite store named in `config`.
    pub fn open(config: &NemuConfig) -> NemuResult<Self> {
        let storage = SqliteKnowledgeStorage::from_config(&config.knowledge)?;
        Self::new(config, Some(Arc::new(storage)))
    }

    /// Record interactions into `sink`.
    pub fn with_stats(mut self, sink: Arc<dyn InteractionSink>) -> Self {
        self.stats = sink;
        self
    }

    pub fn with_mediator(mut self, mediator: ResponseMediator) -> Self {
        self.mediator = mediator;
        self
    }

    /// Attach storage that was not ready at construction.
    pub async fn attach_storage(&self, storage: Arc<dyn KnowledgeStorage>) {
        self.store.attach(storage).await;
    }

    pub async fn is_storage_attached(&self) -> bool {
        self.store.is_attached().await
    }

    /// Scope a conversation's knowledge lives in.
    pub fn scope_for(&self, conversation_id: i64) -> Scope {
        self.resolver.resolve(conversation_id)
    }

    pub fn classify(
        &self,
        raw_text: &str,
        is_reply_to_known_message: bool,
        requires_trigger: bool,
    ) -> Classification {
        self.extractor
            .classify(raw_text, is_reply_to_known_message, requires_trigger)
    }

    /// Whether `message_id` is a message nemu sent.
    pub fn is_known_message(&self, message_id: MessageId) -> bool {
        self.correlator.is_system_message(message_id)
    }

    /// Look up the (possibly decorated) answer for `query`.
    ///
    /// Storage failures are logged and reported as "no answer", so the caller
    /// falls back to asking to be taught.
    pub async fn answer(&self, scope: &Scope, query: &str) -> Option<String> {
        match self.store.lookup(scope, query).await {
            Ok(Some(hit)) => Some(self.mediator.decorate(&hit.entry.response)),
            Ok(None) => None,
            Err(e) => {
                warn!(scope = %scope, error = %e, "Lookup failed, treating as no match");
                None
            }
        }
    }

    /// The transport sent a teaching prompt for `query`.
    pub fn on_prompt_sent(&self, prompt_message_id: MessageId, scope: Scope, query: &str) {
        self.correlator.register_prompt(prompt_message_id, scope, query);
    }

    /// The transport sent any other message on nemu's behalf.
    pub fn on_message_sent(&self, message_id: MessageId) {
        self.correlator.register_system_message(message_id);
    }

    /// Handle a reply to `replied_to`, teaching nemu if it answers a pending prompt.
    pub async fn on_reply(&self, replied_to: MessageId, reply_text: &str, author: &Author) -> TeachOutcome {
        let text = reply_text.trim();
        if text.is_empty() {
            return TeachOutcome::NotATeachingReply;
        }

        let Some(lesson) = self
            .correlator
            .resolve_teaching_reply(replied_to, text, author)
        else {
            return TeachOutcome::NotATeachingReply;
        };

        match self
            .store
            .teach(&lesson.scope, &lesson.query, &lesson.text, &lesson.author)
            .await
        {
            Ok(result) => {
                self.record(author, Interaction::Taught).await;
                TeachOutcome::from(result)
            }
            Err(e) if e.is_storage() => {
                warn!(prompt = replied_to, error = %e, "Lesson not stored");
                TeachOutcome::StorageFailed
            }
            Err(e) => {
                warn!(prompt = replied_to, error = %e, "Lesson rejected");
                TeachOutcome::StorageFailed
            }
        }
    }

    /// Decide the reaction to one incoming message.
    ///
    /// The caller sends whatever text the reaction carries and reports the
    /// resulting message id through [`Self::on_prompt_sent`] or
    /// [`Self::on_message_sent`].
    pub async fn dispatch(&self, message: &IncomingMessage) -> Reaction {
        if let Some(replied_to) = message.reply_to {
            let outcome = self.on_reply(replied_to, &message.text, &message.author).await;
            let text = phrases::acknowledgement(
                outcome,
                message.author.display_name(),
                &mut rand::thread_rng(),
            );
            if let Some(text) = text {
                info!(prompt = replied_to, ?outcome, "Teaching reply handled");
                return Reaction::Acknowledge { outcome, text };
            }
        }

        let is_reply_to_known_message = message
            .reply_to
            .map_or(false, |id| self.is_known_message(id));

        // Every message addressed to nemu counts, including queries too short to answer.
        let addressed = is_reply_to_known_message
            || !message.requires_trigger
            || self.extractor.contains_trigger(&message.text);
        if addressed {
            self.record(&message.author, Interaction::Message).await;
        }

        let query = match self.classify(
            &message.text,
            is_reply_to_known_message,
            message.requires_trigger,
        ) {
            Classification::Ignore => return Reaction::Ignore,
            Classification::Respond(query) => query,
        };

        let scope = self.scope_for(message.conversation_id);
        if let Some(text) = self.answer(&scope, &query).await {
            self.record(&message.author, Interaction::Helped).await;
            return Reaction::Answer { text };
        }

        debug!(scope = %scope, "Asking to be taught");
        let prompt = phrases::teaching_prompt(&mut rand::thread_rng()).to_string();
        Reaction::AskToBeTaught {
            scope,
            query,
            prompt,
        }
    }

    async fn record(&self, author: &Author, interaction: Interaction) {
        if let Err(e) = self.stats.record(author, interaction).await {
            warn!(user_id = author.id, ?interaction, error = %e, "Failed to record interaction");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NemuError;
    use crate::stats::SqliteInteractionStats;
    use crate::storage::MockKnowledgeStorage;
    use crate::types::SharingMode;
    use async_trait::async_trait;

    fn config() -> NemuConfig {
        NemuConfig::builder()
            .db_path(":memory:")
            .decoration_probability(0.0)
            .build()
    }

    fn engine() -> KnowledgeEngine {
        KnowledgeEngine::open(&config()).unwrap()
    }

    fn private(text: &str) -> IncomingMessage {
        IncomingMessage {
            conversation_id: 1,
            text: text.to_string(),
            author: Author::new(7, "ada"),
            reply_to: None,
            requires_trigger: false,
        }
    }

    fn reply(to: MessageId, text: &str) -> IncomingMessage {
        IncomingMessage {
            reply_to: Some(to),
            ..private(text)
        }
    }

    #[tokio::test]
    async fn test_ask_teach_answer_cycle() {
        let engine = engine();

        let Reaction::AskToBeTaught { scope, query, .. } = engine.dispatch(&private("What is Rust")).await
        else {
            panic!("expected a teaching prompt");
        };
        assert_eq!(query, "What is Rust");
        engine.on_prompt_sent(10, scope, &query);

        match engine.dispatch(&reply(10, "  a language  ")).await {
            Reaction::Acknowledge { outcome, text } => {
                assert_eq!(outcome, TeachOutcome::Learned);
                assert!(text.contains("learned"));
            }
            other => panic!("unexpected reaction {:?}", other),
        }

        assert_eq!(
            engine.dispatch(&private("what is rust")).await,
            Reaction::Answer {
                text: "a language".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_group_message_needs_trigger() {
        let engine = engine();
        let message = IncomingMessage {
            requires_trigger: true,
            ..private("nobody asked")
        };
        assert_eq!(engine.dispatch(&message).await, Reaction::Ignore);
    }

    #[tokio::test]
    async fn test_reply_to_own_message_skips_trigger() {
        let engine = engine();
        engine.on_message_sent(55);
        let message = IncomingMessage {
            requires_trigger: true,
            ..reply(55, "and tomorrow")
        };
        assert!(matches!(
            engine.dispatch(&message).await,
            Reaction::AskToBeTaught { .. }
        ));
    }

    #[tokio::test]
    async fn test_reply_to_unknown_message_in_group_is_ignored() {
        let engine = engine();
        let message = IncomingMessage {
            requires_trigger: true,
            ..reply(99, "and tomorrow")
        };
        assert_eq!(engine.dispatch(&message).await, Reaction::Ignore);
    }

    #[tokio::test]
    async fn test_blank_reply_leaves_prompt_pending() {
        let engine = engine();
        engine.on_prompt_sent(3, Scope::conversation(1), "favourite colour");

        assert_eq!(
            engine.on_reply(3, "   ", &Author::anonymous(1)).await,
            TeachOutcome::NotATeachingReply
        );
        assert_eq!(
            engine.on_reply(3, "blue", &Author::anonymous(1)).await,
            TeachOutcome::Learned
        );
    }

    #[tokio::test]
    async fn test_global_sharing_answers_across_conversations() {
        let config = NemuConfig::builder()
            .db_path(":memory:")
            .sharing(SharingMode::Global)
            .decoration_probability(0.0)
            .build();
        let engine = KnowledgeEngine::open(&config).unwrap();

        engine.on_prompt_sent(1, engine.scope_for(100), "color");
        engine.on_reply(1, "blue", &Author::anonymous(1)).await;

        assert_eq!(
            engine.answer(&engine.scope_for(200), "color").await.as_deref(),
            Some("blue")
        );
    }

    #[tokio::test]
    async fn test_detached_storage_degrades() {
        let engine = KnowledgeEngine::new(&config(), None).unwrap();
        assert!(!engine.is_storage_attached().await);
        assert!(engine.answer(&Scope::global(), "anything").await.is_none());

        engine.on_prompt_sent(4, Scope::global(), "anything");
        assert_eq!(
            engine.on_reply(4, "something", &Author::anonymous(1)).await,
            TeachOutcome::StorageFailed
        );

        match engine.dispatch(&reply(4, "something")).await {
            Reaction::AskToBeTaught { .. } => {}
            other => panic!("consumed prompt should not be taught again: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_storage_failure_acknowledged_as_apology() {
        let mut mock = MockKnowledgeStorage::new();
        mock.expect_upsert()
            .returning(|_, _, _, _| Err(NemuError::storage("disk I/O error")));
        let engine = KnowledgeEngine::new(&config(), Some(Arc::new(mock))).unwrap();
        engine.on_prompt_sent(8, Scope::conversation(1), "color");

        match engine.dispatch(&reply(8, "blue")).await {
            Reaction::Acknowledge { outcome, text } => {
                assert_eq!(outcome, TeachOutcome::StorageFailed);
                assert!(text.starts_with("Sorry ada"));
            }
            other => panic!("unexpected reaction {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lookup_failure_asks_to_be_taught() {
        let mut mock = MockKnowledgeStorage::new();
        mock.expect_find_exact()
            .returning(|_, _| Err(NemuError::storage("connection reset")));
        let engine = KnowledgeEngine::new(&config(), Some(Arc::new(mock))).unwrap();

        assert!(matches!(
            engine.dispatch(&private("what now")).await,
            Reaction::AskToBeTaught { .. }
        ));
    }

    #[tokio::test]
    async fn test_interactions_are_recorded() {
        let stats = Arc::new(SqliteInteractionStats::in_memory().unwrap());
        let engine = engine().with_stats(stats.clone());

        engine.on_prompt_sent(1, Scope::conversation(1), "color");
        engine.dispatch(&reply(1, "blue")).await;
        engine.dispatch(&private("color")).await;
        engine.dispatch(&private("x")).await;
        engine
            .dispatch(&IncomingMessage {
                requires_trigger: true,
                ..private("not for us")
            })
            .await;

        let row = stats.stats(7).unwrap().unwrap();
        // The one-letter query still counts; the unaddressed group message does not.
        assert_eq!(row.total_messages, 2);
        assert_eq!(row.times_helped, 1);
        assert_eq!(row.times_taught, 1);
    }

    struct FailingSink;

    #[async_trait]
    impl InteractionSink for FailingSink {
        async fn record(&self, _author: &Author, _interaction: Interaction) -> NemuResult<()> {
            Err(NemuError::storage("stats offline"))
        }
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_change_outcome() {
        let engine = engine().with_stats(Arc::new(FailingSink));
        engine.on_prompt_sent(2, Scope::conversation(1), "color");
        assert_eq!(
            engine.on_reply(2, "blue", &Author::anonymous(7)).await,
            TeachOutcome::Learned
        );
        assert_eq!(engine.answer(&Scope::conversation(1), "color").await.as_deref(), Some("blue"));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = NemuConfig::builder().trigger_token("  ").build();
        assert!(KnowledgeEngine::new(&config, None).is_err());
    }
}
