//! SQLite Store Adapter
//!
//! Reference implementation of [`Store`] over a single SQLite database:
//! FTS5 (porter tokenizer) for BM25 lexical retrieval, BLOB-encoded
//! embeddings with an exact bank-scoped cosine scan for vector retrieval
//! (HNSW-accelerated when the `vector-search` feature is enabled), and plain
//! relational tables for facts, entities and links.
//!
//! Uses separate reader/writer connections for interior mutability. All
//! methods take `&self` (not `&mut self`), making the adapter `Send + Sync`
//! so callers can share it behind `Arc<SqliteStore>`.
//!
//! The adapter never blocks on I/O long enough for the 500 ms per-call store
//! deadline to matter in practice; the deadline contract is enforced by the
//! retrieval layer, which times out every store future.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};

use crate::embeddings::cosine_similarity;
use crate::memory::{
    Entity, EntityId, EntityObservation, Fact, FactId, FactType, Link, LinkType, ObservedFact,
};
use crate::storage::migrations::MIGRATIONS;
use crate::storage::{decode_embedding, Result, Store, StoreError, VectorFilter};

#[cfg(feature = "vector-search")]
use crate::storage::ann::AnnIndex;

#[cfg(any(test, feature = "fixtures"))]
use crate::storage::encode_embedding;

// ============================================================================
// STORE
// ============================================================================

/// SQLite-backed [`Store`] adapter.
pub struct SqliteStore {
    reader: Mutex<Connection>,
    writer: Mutex<Connection>,
    /// Lazily built per-bank HNSW indexes over the persisted embeddings
    #[cfg(feature = "vector-search")]
    ann: Mutex<HashMap<String, AnnIndex>>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path, or at the default
    /// platform data directory when `None`.
    pub fn new(path: Option<PathBuf>) -> Result<Self> {
        let db_path = match path {
            Some(p) => p,
            None => Self::default_db_path()?,
        };

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("create data dir: {}", e)))?;
        }

        let writer = Connection::open(&db_path)?;
        Self::configure_connection(&writer)?;
        Self::run_migrations(&writer)?;

        let reader = Connection::open(&db_path)?;
        Self::configure_connection(&reader)?;

        Ok(Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            #[cfg(feature = "vector-search")]
            ann: Mutex::new(HashMap::new()),
        })
    }

    /// Open a store at an explicit path
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::new(Some(path.into()))
    }

    fn default_db_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("com", "mnemon", "mnemon").ok_or_else(|| {
            StoreError::Unavailable("could not determine project directories".to_string())
        })?;
        Ok(dirs.data_dir().join("mnemon.db"))
    }

    /// Apply PRAGMAs to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;",
        )?;
        Ok(())
    }

    /// Apply pending migrations, tracked via `user_version`
    fn run_migrations(conn: &Connection) -> Result<()> {
        let current: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

        for migration in MIGRATIONS {
            if migration.version > current {
                tracing::debug!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                conn.execute_batch(migration.up)?;
                conn.pragma_update(None, "user_version", migration.version)?;
            }
        }

        Ok(())
    }

    fn lock_reader(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| StoreError::Unavailable("reader lock poisoned".to_string()))
    }

    fn lock_writer(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| StoreError::Unavailable("writer lock poisoned".to_string()))
    }

    /// SQL fragment `'a', 'b', ...` for a fact-type filter. Safe to inline:
    /// the names come from a closed enum, never from user input.
    fn type_list(fact_types: &[FactType]) -> String {
        fact_types
            .iter()
            .map(|t| format!("'{}'", t.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn link_type_list(link_types: &[LinkType]) -> String {
        link_types
            .iter()
            .map(|t| format!("'{}'", t.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn bank_dimension(conn: &Connection, bank_id: &str) -> Result<usize> {
        let dim: Option<i64> = conn
            .query_row(
                "SELECT embedding_dimension FROM banks WHERE id = ?1",
                params![bank_id],
                |row| row.get(0),
            )
            .optional()?;

        match dim {
            Some(d) if d > 0 => Ok(d as usize),
            Some(d) => Err(StoreError::Corrupt(format!(
                "bank {} has invalid embedding dimension {}",
                bank_id, d
            ))),
            None => Err(StoreError::BankNotFound(bank_id.to_string())),
        }
    }

    fn row_to_fact(row: &Row<'_>) -> rusqlite::Result<Fact> {
        let fact_type: String = row.get(2)?;
        let tags: Option<String> = row.get(11)?;
        let metadata: Option<String> = row.get(12)?;

        Ok(Fact {
            id: row.get(0)?,
            bank_id: row.get(1)?,
            fact_type: fact_type
                .parse()
                .map_err(|e: String| conversion_error(2, e))?,
            text: row.get(3)?,
            context: row.get(4)?,
            embedding: decode_embedding(&row.get::<_, Vec<u8>>(5)?),
            occurred_start: row.get(6)?,
            occurred_end: row.get(7)?,
            mentioned_at: row.get(8)?,
            document_id: row.get(9)?,
            chunk_id: row.get(10)?,
            entity_refs: vec![],
            tags: tags
                .as_deref()
                .and_then(|t| serde_json::from_str(t).ok())
                .unwrap_or_default(),
            metadata: metadata
                .as_deref()
                .and_then(|m| serde_json::from_str(m).ok())
                .unwrap_or_default(),
            confidence: row.get(13)?,
        })
    }

    /// All fact columns in `row_to_fact` order
    const FACT_COLUMNS: &'static str = "id, bank_id, fact_type, text, context, embedding, \
         occurred_start, occurred_end, mentioned_at, document_id, chunk_id, \
         tags, metadata, confidence";

    /// Attach entity_refs to hydrated facts in one batch query
    fn attach_entity_refs(conn: &Connection, facts: &mut [Fact]) -> Result<()> {
        if facts.is_empty() {
            return Ok(());
        }

        let placeholders = vec!["?"; facts.len()].join(", ");
        let sql = format!(
            "SELECT fact_id, entity_id FROM fact_entities
             WHERE fact_id IN ({})
             ORDER BY fact_id, entity_id",
            placeholders
        );

        let mut stmt = conn.prepare(&sql)?;
        let params_vec: Vec<&dyn ToSql> = facts.iter().map(|f| &f.id as &dyn ToSql).collect();
        let mut refs: HashMap<FactId, Vec<EntityId>> = HashMap::new();
        let mut rows = stmt.query(params_vec.as_slice())?;
        while let Some(row) = rows.next()? {
            let fact_id: String = row.get(0)?;
            let entity_id: String = row.get(1)?;
            refs.entry(fact_id).or_default().push(entity_id);
        }

        for fact in facts.iter_mut() {
            if let Some(entities) = refs.remove(&fact.id) {
                fact.entity_refs = entities;
            }
        }

        Ok(())
    }
}

fn conversion_error(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

// ============================================================================
// FTS5 QUERY SANITIZATION
// ============================================================================

/// Sanitize free text into an FTS5 MATCH expression.
///
/// FTS5 has its own query syntax (`AND`, `NEAR`, quotes, column filters);
/// raw user text routinely breaks it. Each alphanumeric token is quoted and
/// tokens are OR-joined so partial matches still rank by bm25.
pub fn sanitize_fts5_query(query: &str) -> String {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| format!("\"{}\"", token))
        .collect::<Vec<_>>()
        .join(" OR ")
}

// ============================================================================
// STORE IMPLEMENTATION
// ============================================================================

#[async_trait]
impl Store for SqliteStore {
    async fn bank_exists(&self, bank_id: &str) -> Result<bool> {
        let reader = self.lock_reader()?;
        let found: Option<i64> = reader
            .query_row(
                "SELECT 1 FROM banks WHERE id = ?1",
                params![bank_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    async fn embedding_dimension(&self, bank_id: &str) -> Result<usize> {
        let reader = self.lock_reader()?;
        Self::bank_dimension(&reader, bank_id)
    }

    async fn vector_topk(
        &self,
        bank_id: &str,
        fact_types: &[FactType],
        query_vec: &[f32],
        k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<(FactId, f32)>> {
        if fact_types.is_empty() || k == 0 {
            return Ok(vec![]);
        }

        {
            let reader = self.lock_reader()?;
            let dim = Self::bank_dimension(&reader, bank_id)?;
            if query_vec.len() != dim {
                return Err(StoreError::InvalidArgument(format!(
                    "query dimension {} does not match bank dimension {}",
                    query_vec.len(),
                    dim
                )));
            }
        }

        // HNSW path: only valid without a time filter, which the index
        // cannot express. Time-filtered queries take the exact scan below.
        #[cfg(feature = "vector-search")]
        if filter.time_range.is_none() {
            return self.ann_topk(bank_id, fact_types, query_vec, k, filter.min_similarity);
        }

        let reader = self.lock_reader()?;
        let sql = format!(
            "SELECT id, embedding, occurred_start, mentioned_at FROM facts
             WHERE bank_id = ?1 AND fact_type IN ({})",
            Self::type_list(fact_types)
        );
        let mut stmt = reader.prepare(&sql)?;

        let floor = filter.min_similarity.unwrap_or(f32::MIN);
        let mut scored: Vec<(FactId, f32)> = Vec::new();
        let mut rows = stmt.query(params![bank_id])?;
        while let Some(row) = rows.next()? {
            if let Some(range) = filter.time_range {
                let occurred: Option<DateTime<Utc>> = row.get(2)?;
                let effective = match occurred {
                    Some(t) => Some(t),
                    None if filter.fallback_to_mentioned_at => {
                        Some(row.get::<_, DateTime<Utc>>(3)?)
                    }
                    None => None,
                };
                match effective {
                    Some(t) if range.contains(t) => {}
                    _ => continue,
                }
            }

            let embedding = decode_embedding(&row.get::<_, Vec<u8>>(1)?);
            let similarity = cosine_similarity(query_vec, &embedding);
            if similarity >= floor {
                scored.push((row.get(0)?, similarity));
            }
        }

        scored.sort_by(|a, b| {
            b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn bm25_topk(
        &self,
        bank_id: &str,
        fact_types: &[FactType],
        query_text: &str,
        k: usize,
    ) -> Result<Vec<(FactId, f32)>> {
        if fact_types.is_empty() || k == 0 {
            return Ok(vec![]);
        }

        let sanitized = sanitize_fts5_query(query_text);
        if sanitized.is_empty() {
            return Ok(vec![]);
        }

        let reader = self.lock_reader()?;
        let sql = format!(
            "SELECT f.id, rank FROM facts f
             JOIN facts_fts fts ON f.id = fts.id
             WHERE facts_fts MATCH ?1
             AND f.bank_id = ?2
             AND f.fact_type IN ({})
             ORDER BY rank
             LIMIT ?3",
            Self::type_list(fact_types)
        );
        let mut stmt = reader.prepare(&sql)?;

        // FTS5 rank is negative bm25 (more negative = better); flip it so
        // callers see scores descending.
        let results = stmt
            .query_map(params![sanitized, bank_id, k as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)? as f32))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .map(|(id, rank)| (id, (-rank).max(0.0)))
            .collect();

        Ok(results)
    }

    async fn links_from(
        &self,
        bank_id: &str,
        fact_id: &str,
        link_types: &[LinkType],
    ) -> Result<Vec<Link>> {
        if link_types.is_empty() {
            return Ok(vec![]);
        }

        let reader = self.lock_reader()?;
        // Both endpoints are constrained to the bank: a link whose target
        // fell outside (which would violate ingestion invariants) is invisible
        // rather than a leak.
        let sql = format!(
            "SELECT l.source_id, l.target_id, l.link_type, l.weight
             FROM links l
             JOIN facts sf ON sf.id = l.source_id AND sf.bank_id = ?1
             JOIN facts tf ON tf.id = l.target_id AND tf.bank_id = ?1
             WHERE l.source_id = ?2 AND l.link_type IN ({})
             ORDER BY l.target_id, l.link_type",
            Self::link_type_list(link_types)
        );
        let mut stmt = reader.prepare(&sql)?;

        let links = stmt
            .query_map(params![bank_id, fact_id], |row| {
                let link_type: String = row.get(2)?;
                Ok(Link {
                    source_id: row.get(0)?,
                    target_id: row.get(1)?,
                    link_type: link_type
                        .parse()
                        .map_err(|e: String| conversion_error(2, e))?,
                    weight: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(links)
    }

    async fn fetch_facts(&self, bank_id: &str, ids: &[FactId]) -> Result<Vec<Fact>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let reader = self.lock_reader()?;
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM facts WHERE bank_id = ? AND id IN ({})",
            Self::FACT_COLUMNS,
            placeholders
        );
        let mut stmt = reader.prepare(&sql)?;

        let bank = bank_id.to_string();
        let mut params_vec: Vec<&dyn ToSql> = vec![&bank];
        params_vec.extend(ids.iter().map(|id| id as &dyn ToSql));

        let mut fetched = stmt
            .query_map(params_vec.as_slice(), Self::row_to_fact)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Self::attach_entity_refs(&reader, &mut fetched)?;

        // Re-order to match the input; unknown and cross-bank ids drop out.
        let mut by_id: HashMap<&str, &Fact> =
            fetched.iter().map(|f| (f.id.as_str(), f)).collect();
        let mut ordered = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(fact) = by_id.remove(id.as_str()) {
                ordered.push(fact.clone());
            }
        }
        Ok(ordered)
    }

    async fn fetch_entities(&self, bank_id: &str, ids: &[EntityId]) -> Result<Vec<Entity>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let reader = self.lock_reader()?;
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, bank_id, canonical_name, mention_count, first_seen, last_seen
             FROM entities WHERE bank_id = ? AND id IN ({})",
            placeholders
        );
        let mut stmt = reader.prepare(&sql)?;

        let bank = bank_id.to_string();
        let mut params_vec: Vec<&dyn ToSql> = vec![&bank];
        params_vec.extend(ids.iter().map(|id| id as &dyn ToSql));

        let fetched = stmt
            .query_map(params_vec.as_slice(), |row| {
                Ok(Entity {
                    id: row.get(0)?,
                    bank_id: row.get(1)?,
                    canonical_name: row.get(2)?,
                    mention_count: row.get(3)?,
                    first_seen: row.get(4)?,
                    last_seen: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut by_id: HashMap<&str, &Entity> =
            fetched.iter().map(|e| (e.id.as_str(), e)).collect();
        let mut ordered = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entity) = by_id.remove(id.as_str()) {
                ordered.push(entity.clone());
            }
        }
        Ok(ordered)
    }

    async fn entity_observations(
        &self,
        bank_id: &str,
        entity_ids: &[EntityId],
        token_cap: usize,
    ) -> Result<Vec<EntityObservation>> {
        if entity_ids.is_empty() {
            return Ok(vec![]);
        }

        let reader = self.lock_reader()?;
        let placeholders = vec!["?"; entity_ids.len()].join(", ");
        let sql = format!(
            "SELECT e.id, e.canonical_name, f.id, f.text, f.mentioned_at
             FROM entities e
             JOIN fact_entities fe ON fe.entity_id = e.id
             JOIN facts f ON f.id = fe.fact_id AND f.fact_type = 'observation'
             WHERE e.bank_id = ? AND e.id IN ({})
             ORDER BY f.mentioned_at DESC, f.id",
            placeholders
        );
        let mut stmt = reader.prepare(&sql)?;

        let bank = bank_id.to_string();
        let mut params_vec: Vec<&dyn ToSql> = vec![&bank];
        params_vec.extend(entity_ids.iter().map(|id| id as &dyn ToSql));

        let mut names: HashMap<EntityId, String> = HashMap::new();
        let mut grouped: HashMap<EntityId, Vec<ObservedFact>> = HashMap::new();
        let mut tokens_used = 0usize;

        let mut rows = stmt.query(params_vec.as_slice())?;
        while let Some(row) = rows.next()? {
            let entity_id: String = row.get(0)?;
            let canonical_name: String = row.get(1)?;
            let text: String = row.get(3)?;

            let cost = text.len().div_ceil(4);
            if tokens_used + cost > token_cap {
                break;
            }
            tokens_used += cost;

            names.entry(entity_id.clone()).or_insert(canonical_name);
            grouped.entry(entity_id).or_default().push(ObservedFact {
                fact_id: row.get(2)?,
                text,
                mentioned_at: row.get(4)?,
            });
        }

        let mut payload = Vec::new();
        for entity_id in entity_ids {
            if let Some(observations) = grouped.remove(entity_id) {
                payload.push(EntityObservation {
                    entity_id: entity_id.clone(),
                    canonical_name: names.remove(entity_id).unwrap_or_default(),
                    observations,
                });
            }
        }
        Ok(payload)
    }
}

// ============================================================================
// ANN PATH
// ============================================================================

#[cfg(feature = "vector-search")]
impl SqliteStore {
    fn ann_topk(
        &self,
        bank_id: &str,
        fact_types: &[FactType],
        query_vec: &[f32],
        k: usize,
        min_similarity: Option<f32>,
    ) -> Result<Vec<(FactId, f32)>> {
        let mut ann = self
            .ann
            .lock()
            .map_err(|_| StoreError::Unavailable("ANN cache lock poisoned".to_string()))?;

        if !ann.contains_key(bank_id) {
            let index = self.build_bank_index(bank_id)?;
            ann.insert(bank_id.to_string(), index);
        }

        let index = ann
            .get(bank_id)
            .ok_or_else(|| StoreError::Unavailable("ANN cache miss after build".to_string()))?;
        index.search(query_vec, fact_types, k, min_similarity)
    }

    fn build_bank_index(&self, bank_id: &str) -> Result<AnnIndex> {
        let reader = self.lock_reader()?;
        let dim = Self::bank_dimension(&reader, bank_id)?;
        let mut index = AnnIndex::new(dim)?;

        let mut stmt = reader
            .prepare("SELECT id, fact_type, embedding FROM facts WHERE bank_id = ?1 ORDER BY id")?;
        let mut rows = stmt.query(params![bank_id])?;
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let fact_type: String = row.get(1)?;
            let fact_type: FactType = fact_type
                .parse()
                .map_err(|e: String| StoreError::Corrupt(e))?;
            let embedding = decode_embedding(&row.get::<_, Vec<u8>>(2)?);
            index.add(&id, fact_type, &embedding)?;
        }

        tracing::debug!(bank_id, vectors = index.len(), "built ANN index");
        Ok(index)
    }

    fn invalidate_ann(&self, bank_id: &str) {
        if let Ok(mut ann) = self.ann.lock() {
            ann.remove(bank_id);
        }
    }
}

// ============================================================================
// TEST-SUPPORT WRITERS
// ============================================================================

/// Writers used by test harnesses and benchmarks to populate a store without
/// an ingestion pipeline. The retrieval engine itself never mutates facts.
#[cfg(any(test, feature = "fixtures"))]
impl SqliteStore {
    /// Create a bank with a fixed embedding dimension
    pub fn create_bank(&self, bank_id: &str, embedding_dimension: usize) -> Result<()> {
        if embedding_dimension == 0 {
            return Err(StoreError::InvalidArgument(
                "embedding dimension must be positive".to_string(),
            ));
        }
        let writer = self.lock_writer()?;
        writer.execute(
            "INSERT OR IGNORE INTO banks (id, embedding_dimension, created_at)
             VALUES (?1, ?2, ?3)",
            params![bank_id, embedding_dimension as i64, Utc::now()],
        )?;
        Ok(())
    }

    /// Insert a fact, its FTS row (via trigger), and its entity references
    pub fn insert_fact(&self, fact: &Fact) -> Result<()> {
        if let (Some(start), Some(end)) = (fact.occurred_start, fact.occurred_end) {
            if start > end {
                return Err(StoreError::InvalidArgument(format!(
                    "fact {}: occurred_start after occurred_end",
                    fact.id
                )));
            }
        }
        if let Some(confidence) = fact.confidence {
            if !(0.0..=1.0).contains(&confidence) || !confidence.is_finite() {
                return Err(StoreError::InvalidArgument(format!(
                    "fact {}: confidence outside [0, 1]",
                    fact.id
                )));
            }
        }

        let writer = self.lock_writer()?;
        let dim = Self::bank_dimension(&writer, &fact.bank_id)?;
        if fact.embedding.len() != dim {
            return Err(StoreError::InvalidArgument(format!(
                "fact {}: embedding dimension {} does not match bank dimension {}",
                fact.id,
                fact.embedding.len(),
                dim
            )));
        }

        writer.execute(
            "INSERT INTO facts (id, bank_id, fact_type, text, context, embedding,
                 occurred_start, occurred_end, mentioned_at, document_id, chunk_id,
                 tags, metadata, confidence)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                fact.id,
                fact.bank_id,
                fact.fact_type.as_str(),
                fact.text,
                fact.context,
                encode_embedding(&fact.embedding),
                fact.occurred_start,
                fact.occurred_end,
                fact.mentioned_at,
                fact.document_id,
                fact.chunk_id,
                serde_json::to_string(&fact.tags)
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                serde_json::to_string(&fact.metadata)
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                fact.confidence,
            ],
        )?;

        for entity_id in &fact.entity_refs {
            writer.execute(
                "INSERT OR IGNORE INTO fact_entities (fact_id, entity_id) VALUES (?1, ?2)",
                params![fact.id, entity_id],
            )?;
        }
        drop(writer);

        #[cfg(feature = "vector-search")]
        self.invalidate_ann(&fact.bank_id);

        Ok(())
    }

    /// Insert an entity
    pub fn insert_entity(&self, entity: &Entity) -> Result<()> {
        let writer = self.lock_writer()?;
        writer.execute(
            "INSERT INTO entities (id, bank_id, canonical_name, mention_count, first_seen, last_seen)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entity.id,
                entity.bank_id,
                entity.canonical_name,
                entity.mention_count,
                entity.first_seen,
                entity.last_seen,
            ],
        )?;
        Ok(())
    }

    /// Insert a link between two facts of the same bank
    pub fn insert_link(&self, bank_id: &str, link: &Link) -> Result<()> {
        if !(link.weight > 0.0 && link.weight <= 1.0) {
            return Err(StoreError::InvalidArgument(format!(
                "link {} -> {}: weight outside (0, 1]",
                link.source_id, link.target_id
            )));
        }

        let writer = self.lock_writer()?;
        for endpoint in [&link.source_id, &link.target_id] {
            let owner: Option<String> = writer
                .query_row(
                    "SELECT bank_id FROM facts WHERE id = ?1",
                    params![endpoint],
                    |row| row.get(0),
                )
                .optional()?;
            if owner.as_deref() != Some(bank_id) {
                return Err(StoreError::InvalidArgument(format!(
                    "link endpoint {} does not belong to bank {}",
                    endpoint, bank_id
                )));
            }
        }

        writer.execute(
            "INSERT OR REPLACE INTO links (source_id, target_id, link_type, weight)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                link.source_id,
                link.target_id,
                link.link_type.as_str(),
                link.weight,
            ],
        )?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
