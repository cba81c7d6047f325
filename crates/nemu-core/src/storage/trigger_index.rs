//! Tantivy full-text index over knowledge triggers.
//!
//! Gives the relevance tier a BM25 score between a query and each trigger in
//! a scope. The index lives in RAM and is derived from the SQLite table: it is
//! rebuilt whenever the store opens, so it never needs its own migration.

use std::sync::{Mutex, MutexGuard};

use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, BoostQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, Value, INDEXED, STORED,
    STRING,
};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use crate::error::{ErrorCode, NemuError, NemuResult};
use crate::types::Scope;

/// Writer heap; the per-thread minimum tantivy accepts is 15MB.
const WRITER_HEAP_BYTES: usize = 20_000_000;

const TRIGGER_TOKENIZER: &str = "nemu_trigger";

/// Function words that never count as overlap between a query and a trigger.
const STOP_WORDS: &[&str] = &[
    "a", "about", "an", "are", "as", "at", "be", "by", "com", "de", "en", "for", "from", "how",
    "i", "in", "is", "it", "la", "of", "on", "or", "that", "the", "this", "to", "was", "what",
    "when", "where", "who", "will", "with", "und", "www",
];

fn trigger_analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .filter(StopWordFilter::remove(
            STOP_WORDS.iter().map(|word| word.to_string()),
        ))
        .build()
}

/// BM25 index of `(id, scope, trigger)` documents.
///
/// Thread-safe: uses internal Mutex for IndexWriter.
pub struct TriggerIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    id_field: Field,
    scope_field: Field,
    trigger_field: Field,
}

impl TriggerIndex {
    /// Create an empty in-RAM index.
    pub fn in_memory() -> NemuResult<Self> {
        let mut schema_builder = Schema::builder();
        // Entry id, stored so hits can be resolved against SQLite.
        let id_field = schema_builder.add_i64_field("id", INDEXED | STORED);
        // STRING: the scope is matched exactly, never tokenized.
        let scope_field = schema_builder.add_text_field("scope", STRING);
        let trigger_options = TextOptions::default().set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(TRIGGER_TOKENIZER)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        );
        let trigger_field = schema_builder.add_text_field("trigger", trigger_options);
        let schema = schema_builder.build();

        // Registered on the index, so documents and parsed queries share it.
        let index = Index::create_in_ram(schema);
        index.tokenizers().register(TRIGGER_TOKENIZER, trigger_analyzer());
        let writer = index.writer_with_num_threads(1, WRITER_HEAP_BYTES)?;
        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            id_field,
            scope_field,
            trigger_field,
        })
    }

    fn writer(&self) -> NemuResult<MutexGuard<'_, IndexWriter>> {
        self.writer
            .lock()
            .map_err(|_| NemuError::search("Failed to acquire index writer lock"))
    }

    fn document(&self, id: i64, scope: &str, trigger: &str) -> TantivyDocument {
        let mut doc = TantivyDocument::default();
        doc.add_i64(self.id_field, id);
        doc.add_text(self.scope_field, scope);
        doc.add_text(self.trigger_field, trigger);
        doc
    }

    /// Index one trigger and make it searchable.
    pub fn add(&self, id: i64, scope: &Scope, trigger: &str) -> NemuResult<()> {
        let mut writer = self.writer()?;
        writer.add_document(self.document(id, scope.as_str(), trigger))?;
        writer.commit()?;
        drop(writer);

        self.reader.reload()?;
        Ok(())
    }

    /// Index many triggers with a single commit.
    pub fn add_batch<'a>(
        &self,
        entries: impl IntoIterator<Item = (i64, &'a str, &'a str)>,
    ) -> NemuResult<usize> {
        let mut writer = self.writer()?;
        let mut added = 0;
        for (id, scope, trigger) in entries {
            writer.add_document(self.document(id, scope, trigger))?;
            added += 1;
        }
        writer.commit()?;
        drop(writer);

        self.reader.reload()?;
        Ok(added)
    }

    /// Score triggers in `scope` against `query`, best first.
    ///
    /// Returns `(entry id, BM25 score)` pairs. Query syntax errors are
    /// tolerated: free text is parsed leniently.
    pub fn search(&self, scope: &Scope, query: &str, limit: usize) -> NemuResult<Vec<(i64, f32)>> {
        let parser = QueryParser::for_index(&self.index, vec![self.trigger_field]);
        let (text_query, _errors) = parser.parse_query_lenient(query);

        // Zero boost: the scope restricts the hits without adding to the score.
        let scope_term = Term::from_field_text(self.scope_field, scope.as_str());
        let scope_query: Box<dyn Query> = Box::new(BoostQuery::new(
            Box::new(TermQuery::new(scope_term, IndexRecordOption::Basic)),
            0.0,
        ));
        let combined = BooleanQuery::new(vec![(Occur::Must, scope_query), (Occur::Must, text_query)]);

        let searcher = self.reader.searcher();
        let top_docs = searcher
            .search(&combined, &TopDocs::with_limit(limit.max(1)))
            .map_err(|e| NemuError::Search {
                message: format!("Trigger search failed: {}", e),
                code: ErrorCode::IdxQueryFailed,
                source: Some(Box::new(e)),
            })?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            if let Some(id) = doc.get_first(self.id_field).and_then(|v| v.as_i64()) {
                hits.push((id, score));
            }
        }
        Ok(hits)
    }

    /// Get the number of indexed triggers.
    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }
}
