//! Embedded tantivy index, one directory per index name.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::*;
use tantivy::tokenizer::{LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use super::mapping::{
    collect_strings, FieldMapping, CATCH_ALL_FIELD, EN_STEM, ID_FIELD, SOURCE_FIELD,
};
use crate::error::{Result, SearchError};
use crate::observability::{track, IndexMetrics};
use crate::query::rewrite::restrict_to_household;
use crate::types::{DocId, Document, Fields, HouseholdId, IndexName, SearchHit, HOUSEHOLD_FIELD};

/// Upper bound on hits read back from one query.
pub const MAX_HITS: usize = 1000;

const WRITER_HEAP_BYTES: usize = 20_000_000;

/// Maximum Levenshtein distance tantivy's automaton builder supports.
const MAX_FUZZY_DISTANCE: u8 = 2;

/// Handle to one on-disk tantivy index. Clones share the same index.
#[derive(Clone)]
pub struct TextIndex {
    inner: Arc<Inner>,
}

struct Inner {
    name: IndexName,
    index: Index,
    reader: IndexReader,
    writer: Mutex<Option<IndexWriter>>,
    mapping: FieldMapping,
    fields: ResolvedFields,
    closed: AtomicBool,
    metrics: Option<IndexMetrics>,
}

struct ResolvedFields {
    id: Field,
    source: Field,
    household: Field,
    text: Vec<(String, Field)>,
}

impl ResolvedFields {
    fn resolve(schema: &Schema, mapping: &FieldMapping) -> Result<Self> {
        let get = |name: &str| schema.get_field(name).map_err(SearchError::from);
        let text = mapping
            .text_fields()
            .iter()
            .map(|name| Ok((name.clone(), get(name)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(ResolvedFields {
            id: get(ID_FIELD)?,
            source: get(SOURCE_FIELD)?,
            household: get(HOUSEHOLD_FIELD)?,
            text,
        })
    }

    fn text_field(&self, name: &str) -> Option<Field> {
        self.text
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, field)| *field)
    }

    fn all_text(&self) -> Vec<Field> {
        self.text.iter().map(|(_, field)| *field).collect()
    }
}

impl std::fmt::Debug for TextIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextIndex")
            .field("name", &self.inner.name)
            .field("text_fields", &self.inner.mapping.text_fields())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn register_tokenizers(index: &Index) {
    let en_stem = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .filter(Stemmer::new(tantivy::tokenizer::Language::English))
        .build();
    index.tokenizers().register(EN_STEM, en_stem);
}

impl TextIndex {
    /// Open the index at `path`, creating it with the mapping bound to `name`
    /// when no index exists there yet. An existing index keeps the mapping
    /// recorded in its own schema, whatever `name` says.
    pub fn open(path: &Path, name: IndexName, metrics: Option<IndexMetrics>) -> Result<Self> {
        std::fs::create_dir_all(path)?;
        let directory = MmapDirectory::open(path)?;

        let (index, mapping) = if Index::exists(&directory)? {
            let index = Index::open(directory)?;
            let mapping = FieldMapping::from_schema(&index.schema())?;
            tracing::info!(index = %name, path = %path.display(), "[OPEN] reopened text index");
            (index, mapping)
        } else {
            let mapping = FieldMapping::for_index(&name)?;
            let index = Index::create(
                directory,
                mapping.to_schema(),
                tantivy::IndexSettings::default(),
            )?;
            tracing::info!(index = %name, path = %path.display(), "[OPEN] created text index");
            (index, mapping)
        };

        register_tokenizers(&index);
        let fields = ResolvedFields::resolve(&index.schema(), &mapping)?;
        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let writer: IndexWriter = index.writer_with_num_threads(1, WRITER_HEAP_BYTES)?;

        Ok(TextIndex {
            inner: Arc::new(Inner {
                name,
                index,
                reader,
                writer: Mutex::new(Some(writer)),
                mapping,
                fields,
                closed: AtomicBool::new(false),
                metrics,
            }),
        })
    }

    pub fn name(&self) -> &IndexName {
        &self.inner.name
    }

    pub fn mapping(&self) -> &FieldMapping {
        &self.inner.mapping
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Insert or replace `doc` under its ID.
    pub async fn index(&self, doc: Document) -> Result<()> {
        let inner = self.inner.clone();
        track(self.metrics(), self.name().as_str(), "index", async move {
            inner.ensure_open()?;
            inner.mapping.check(&doc)?;
            run_blocking(move || inner.write(|writer, inner| {
                let tdoc = inner.to_tantivy(&doc)?;
                writer.delete_term(Term::from_field_text(inner.fields.id, doc.id.as_str()));
                writer.add_document(tdoc)?;
                Ok(())
            }))
            .await
        })
        .await
    }

    /// Remove the document stored under `id`. Missing documents are not an error.
    pub async fn delete(&self, id: &DocId) -> Result<()> {
        let inner = self.inner.clone();
        let id = id.clone();
        track(self.metrics(), self.name().as_str(), "delete", async move {
            inner.ensure_open()?;
            run_blocking(move || inner.write(|writer, inner| {
                writer.delete_term(Term::from_field_text(inner.fields.id, id.as_str()));
                Ok(())
            }))
            .await
        })
        .await
    }

    /// Fuzzy free-text search restricted to `household`.
    pub async fn search(&self, query: &str, household: HouseholdId) -> Result<Vec<SearchHit>> {
        let rewritten = restrict_to_household(query, household);
        self.run(query, rewritten, None, Some(household), "search")
            .await
    }

    /// Fuzzy free-text search across every household.
    pub async fn search_for_admin(&self, query: &str) -> Result<Vec<SearchHit>> {
        self.run(query, query.to_string(), None, None, "search_for_admin")
            .await
    }

    /// Like [`TextIndex::search`] but free-text terms only hit `field`.
    pub async fn search_by_field(
        &self,
        field: &str,
        query: &str,
        household: HouseholdId,
    ) -> Result<Vec<SearchHit>> {
        let rewritten = restrict_to_household(query, household);
        self.run(
            query,
            rewritten,
            Some(field.to_string()),
            Some(household),
            "search_by_field",
        )
        .await
    }

    /// Release the writer. Later operations fail with `IndexClosed`; closing
    /// twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let inner = self.inner.clone();
        run_blocking(move || {
            let writer = inner
                .writer
                .lock()
                .map_err(|_| SearchError::backend("closing index", "writer lock poisoned"))?
                .take();
            if let Some(writer) = writer {
                writer.wait_merging_threads()?;
            }
            tracing::info!(index = %inner.name, "[CLOSE] text index closed");
            Ok(())
        })
        .await
    }

    fn metrics(&self) -> Option<&IndexMetrics> {
        self.inner.metrics.as_ref()
    }

    async fn run(
        &self,
        raw: &str,
        query: String,
        field: Option<String>,
        household: Option<HouseholdId>,
        operation: &'static str,
    ) -> Result<Vec<SearchHit>> {
        let inner = self.inner.clone();
        let empty = raw.trim().is_empty();
        track(self.metrics(), self.name().as_str(), operation, async move {
            if empty {
                return Err(SearchError::EmptyQuery);
            }
            inner.ensure_open()?;
            run_blocking(move || inner.query(&query, field.as_deref(), household)).await
        })
        .await
    }
}

impl Inner {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SearchError::IndexClosed(self.name.to_string()));
        }
        Ok(())
    }

    /// Apply one mutation under the writer lock, then commit and reload.
    fn write<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut IndexWriter, &Inner) -> Result<()>,
    {
        let mut guard = self
            .writer
            .lock()
            .map_err(|_| SearchError::backend("writing index", "writer lock poisoned"))?;
        let writer = guard
            .as_mut()
            .ok_or_else(|| SearchError::IndexClosed(self.name.to_string()))?;
        apply(writer, self)?;
        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    fn to_tantivy(&self, doc: &Document) -> Result<TantivyDocument> {
        let mut tdoc = TantivyDocument::default();
        tdoc.add_text(self.fields.id, doc.id.as_str());
        tdoc.add_text(self.fields.source, serde_json::to_string(&doc.fields)?);
        if let Some(household) = doc.household() {
            tdoc.add_u64(self.fields.household, household);
        }

        if self.mapping.is_catch_all() {
            if let Some(all) = self.fields.text_field(CATCH_ALL_FIELD) {
                let mut strings = Vec::new();
                for (key, value) in &doc.fields {
                    if key != HOUSEHOLD_FIELD {
                        collect_strings(value, &mut strings);
                    }
                }
                for s in strings {
                    tdoc.add_text(all, s);
                }
            }
        } else {
            for (name, field) in &self.fields.text {
                if let Some(text) = doc.fields.get(name).and_then(|v| v.as_str()) {
                    tdoc.add_text(*field, text);
                }
            }
        }
        Ok(tdoc)
    }

    fn query(
        &self,
        query: &str,
        field: Option<&str>,
        household: Option<HouseholdId>,
    ) -> Result<Vec<SearchHit>> {
        let default_fields = match field {
            Some(name) => vec![self.fields.text_field(name).ok_or_else(|| {
                SearchError::InvalidQuery(format!(
                    "field {name:?} is not searchable in {}",
                    self.name
                ))
            })?],
            None => self.fields.all_text(),
        };

        let mut parser = QueryParser::for_index(&self.index, default_fields.clone());
        parser.set_conjunction_by_default();
        for f in &default_fields {
            parser.set_field_fuzzy(*f, false, MAX_FUZZY_DISTANCE, true);
        }
        let parsed = parser.parse_query(query)?;

        // The rewritten string already pins the household; the term clause
        // keeps operator precedence in the raw query from widening it.
        let query: Box<dyn Query> = match household {
            Some(h) => Box::new(BooleanQuery::new(vec![
                (Occur::Must, parsed),
                (
                    Occur::Must,
                    Box::new(TermQuery::new(
                        Term::from_field_u64(self.fields.household, h),
                        IndexRecordOption::Basic,
                    )),
                ),
            ])),
            None => parsed,
        };

        let searcher = self.reader.searcher();
        let top_docs = searcher.search(&*query, &TopDocs::with_limit(MAX_HITS))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (_score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            let id = doc
                .get_first(self.fields.id)
                .and_then(|v| v.as_str())
                .ok_or_else(|| SearchError::Decode(format!("hit in {} has no id", self.name)))?;
            let fields = match doc.get_first(self.fields.source).and_then(|v| v.as_str()) {
                Some(raw) => serde_json::from_str::<Fields>(raw)
                    .map_err(|e| SearchError::Decode(format!("stored fields of {id}: {e}")))?,
                None => Fields::new(),
            };
            hits.push(SearchHit {
                id: DocId::new(id),
                fields,
            });
        }
        Ok(hits)
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SearchError::backend("running index task", e))?
}
