//! SQLite-backed [`Store`] implementation.
//!
//! Translates every [`Store`] operation into SQL against the schema in
//! [`crate::migrate`]. Multi-row mutations run inside a transaction and
//! bump the generation counter in the same transaction, so readers never
//! observe a half-applied mutation under a stale generation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use quarry_core::embedding::{blob_to_vec, vec_to_blob};
use quarry_core::error::{Error, Result};
use quarry_core::models::{Document, DocumentChunk, KnowledgeBase, KnowledgeBaseUpdate};
use quarry_core::store::Store;

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn db_err(e: sqlx::Error) -> Error {
    Error::storage(e.to_string())
}

fn ts_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

fn doc_from_row(row: &sqlx::sqlite::SqliteRow, chunks: Vec<DocumentChunk>) -> Document {
    let tags_json: String = row.get("tags_json");
    let metadata_json: String = row.get("metadata_json");
    let doc_type_str: String = row.get("doc_type");
    let uploaded_at: i64 = row.get("uploaded_at");
    let size: i64 = row.get("size");

    Document {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        doc_type: quarry_core::models::DocumentType::parse(&doc_type_str)
            .unwrap_or(quarry_core::models::DocumentType::Plain),
        size: size as u64,
        user_id: row.get("user_id"),
        uploaded_at: ts_to_datetime(uploaded_at),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        metadata: serde_json::from_str(&metadata_json).unwrap_or(serde_json::json!({})),
        chunks,
    }
}

fn chunk_from_row(row: &sqlx::sqlite::SqliteRow) -> DocumentChunk {
    let chunk_index: i64 = row.get("chunk_index");
    let start_offset: i64 = row.get("start_offset");
    let end_offset: i64 = row.get("end_offset");
    let total_chunks: i64 = row.get("total_chunks");
    let embedding: Option<Vec<u8>> = row.get("embedding");

    DocumentChunk {
        id: row.get("id"),
        document_id: row.get("document_id"),
        content: row.get("content"),
        start_offset: start_offset as usize,
        end_offset: end_offset as usize,
        embedding: embedding.map(|b| blob_to_vec(&b)),
        chunk_index: chunk_index as usize,
        total_chunks: total_chunks as usize,
    }
}

fn kb_from_row(row: &sqlx::sqlite::SqliteRow, document_ids: Vec<String>) -> KnowledgeBase {
    let collaborators_json: String = row.get("collaborators_json");
    let tags_json: String = row.get("tags_json");
    let created_at: i64 = row.get("created_at");
    let updated_at: i64 = row.get("updated_at");
    let is_public: i64 = row.get("is_public");

    KnowledgeBase {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        user_id: row.get("user_id"),
        document_ids,
        is_public: is_public != 0,
        collaborators: serde_json::from_str(&collaborators_json).unwrap_or_default(),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        created_at: ts_to_datetime(created_at),
        updated_at: ts_to_datetime(updated_at),
    }
}

const BUMP_GENERATION: &str = "UPDATE meta SET value = value + 1 WHERE key = 'generation'";

impl SqliteStore {
    async fn member_ids(&self, kb_id: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT document_id FROM kb_documents WHERE kb_id = ? ORDER BY position ASC",
        )
        .bind(kb_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.iter().map(|r| r.get("document_id")).collect())
    }

    async fn chunks_for_document(&self, doc_id: &str) -> Result<Vec<DocumentChunk>> {
        let rows = sqlx::query(
            "SELECT id, document_id, chunk_index, content, start_offset, end_offset, \
             total_chunks, embedding FROM chunks WHERE document_id = ? ORDER BY chunk_index ASC",
        )
        .bind(doc_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.iter().map(chunk_from_row).collect())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_document(&self, doc: &Document) -> Result<()> {
        let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM documents WHERE id = ?")
            .bind(&doc.id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        if exists {
            return Err(Error::duplicate("document", &doc.id));
        }

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r#"
            INSERT INTO documents (id, title, content, doc_type, size, user_id,
                                   uploaded_at, tags_json, metadata_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.title)
        .bind(&doc.content)
        .bind(doc.doc_type.as_str())
        .bind(doc.size as i64)
        .bind(&doc.user_id)
        .bind(doc.uploaded_at.timestamp())
        .bind(serde_json::to_string(&doc.tags).unwrap_or_else(|_| "[]".to_string()))
        .bind(doc.metadata.to_string())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        for chunk in &doc.chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, chunk_index, content,
                                    start_offset, end_offset, total_chunks, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index as i64)
            .bind(&chunk.content)
            .bind(chunk.start_offset as i64)
            .bind(chunk.end_offset as i64)
            .bind(chunk.total_chunks as i64)
            .bind(chunk.embedding.as_ref().map(|e| vec_to_blob(e)))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        sqlx::query(BUMP_GENERATION)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };
        let chunks = self.chunks_for_document(id).await?;
        Ok(Some(doc_from_row(&row, chunks)))
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query("SELECT * FROM documents ORDER BY uploaded_at DESC, id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        let mut docs = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.get("id");
            let chunks = self.chunks_for_document(&id).await?;
            docs.push(doc_from_row(row, chunks));
        }
        Ok(docs)
    }

    async fn delete_document(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let deleted = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        if deleted.rows_affected() == 0 {
            return Err(Error::not_found("document", id));
        }

        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        sqlx::query(BUMP_GENERATION)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn create_knowledge_base(&self, kb: &KnowledgeBase) -> Result<()> {
        let exists: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM knowledge_bases WHERE id = ?")
                .bind(&kb.id)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;
        if exists {
            return Err(Error::duplicate("knowledge base", &kb.id));
        }

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r#"
            INSERT INTO knowledge_bases (id, name, description, user_id, is_public,
                                         collaborators_json, tags_json, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&kb.id)
        .bind(&kb.name)
        .bind(&kb.description)
        .bind(&kb.user_id)
        .bind(kb.is_public as i64)
        .bind(serde_json::to_string(&kb.collaborators).unwrap_or_else(|_| "[]".to_string()))
        .bind(serde_json::to_string(&kb.tags).unwrap_or_else(|_| "[]".to_string()))
        .bind(kb.created_at.timestamp())
        .bind(kb.updated_at.timestamp())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        for (i, doc_id) in kb.document_ids.iter().enumerate() {
            sqlx::query(
                "INSERT OR IGNORE INTO kb_documents (kb_id, document_id, position) VALUES (?, ?, ?)",
            )
            .bind(&kb.id)
            .bind(doc_id)
            .bind(i as i64)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        sqlx::query(BUMP_GENERATION)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn get_knowledge_base(&self, id: &str) -> Result<Option<KnowledgeBase>> {
        let row = sqlx::query("SELECT * FROM knowledge_bases WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };
        let member_ids = self.member_ids(id).await?;
        Ok(Some(kb_from_row(&row, member_ids)))
    }

    async fn list_knowledge_bases(&self) -> Result<Vec<KnowledgeBase>> {
        let rows = sqlx::query("SELECT * FROM knowledge_bases ORDER BY created_at DESC, id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        let mut kbs = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.get("id");
            let member_ids = self.member_ids(&id).await?;
            kbs.push(kb_from_row(row, member_ids));
        }
        Ok(kbs)
    }

    async fn update_knowledge_base(
        &self,
        id: &str,
        update: KnowledgeBaseUpdate,
    ) -> Result<KnowledgeBase> {
        let current = self
            .get_knowledge_base(id)
            .await?
            .ok_or_else(|| Error::not_found("knowledge base", id))?;

        let name = update.name.unwrap_or(current.name);
        let description = update.description.unwrap_or(current.description);
        let is_public = update.is_public.unwrap_or(current.is_public);
        let collaborators = update.collaborators.unwrap_or(current.collaborators);
        let tags = update.tags.unwrap_or(current.tags);
        let now = Utc::now();

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query(
            r#"
            UPDATE knowledge_bases
            SET name = ?, description = ?, is_public = ?,
                collaborators_json = ?, tags_json = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&name)
        .bind(&description)
        .bind(is_public as i64)
        .bind(serde_json::to_string(&collaborators).unwrap_or_else(|_| "[]".to_string()))
        .bind(serde_json::to_string(&tags).unwrap_or_else(|_| "[]".to_string()))
        .bind(now.timestamp())
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query(BUMP_GENERATION)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;

        Ok(KnowledgeBase {
            name,
            description,
            is_public,
            collaborators,
            tags,
            updated_at: now,
            ..current
        })
    }

    async fn delete_knowledge_base(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let deleted = sqlx::query("DELETE FROM knowledge_bases WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        if deleted.rows_affected() == 0 {
            return Err(Error::not_found("knowledge base", id));
        }

        sqlx::query("DELETE FROM kb_documents WHERE kb_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        sqlx::query(BUMP_GENERATION)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn add_document_to_knowledge_base(&self, kb_id: &str, doc_id: &str) -> Result<()> {
        let exists: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM knowledge_bases WHERE id = ?")
                .bind(kb_id)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;
        if !exists {
            return Err(Error::not_found("knowledge base", kb_id));
        }

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO kb_documents (kb_id, document_id, position)
            VALUES (?, ?, (SELECT COALESCE(MAX(position) + 1, 0) FROM kb_documents WHERE kb_id = ?))
            "#,
        )
        .bind(kb_id)
        .bind(doc_id)
        .bind(kb_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query("UPDATE knowledge_bases SET updated_at = ? WHERE id = ?")
            .bind(Utc::now().timestamp())
            .bind(kb_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        sqlx::query(BUMP_GENERATION)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn remove_document_from_knowledge_base(&self, kb_id: &str, doc_id: &str) -> Result<()> {
        let exists: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM knowledge_bases WHERE id = ?")
                .bind(kb_id)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;
        if !exists {
            return Err(Error::not_found("knowledge base", kb_id));
        }

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("DELETE FROM kb_documents WHERE kb_id = ? AND document_id = ?")
            .bind(kb_id)
            .bind(doc_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        sqlx::query("UPDATE knowledge_bases SET updated_at = ? WHERE id = ?")
            .bind(Utc::now().timestamp())
            .bind(kb_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        sqlx::query(BUMP_GENERATION)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn chunks_in_scope(
        &self,
        document_ids: Option<&[String]>,
    ) -> Result<Vec<DocumentChunk>> {
        let rows = match document_ids {
            None => sqlx::query(
                "SELECT id, document_id, chunk_index, content, start_offset, end_offset, \
                 total_chunks, embedding FROM chunks ORDER BY document_id, chunk_index",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?,
            Some([]) => return Ok(Vec::new()),
            Some(ids) => {
                let placeholders = vec!["?"; ids.len()].join(", ");
                let sql = format!(
                    "SELECT id, document_id, chunk_index, content, start_offset, end_offset, \
                     total_chunks, embedding FROM chunks WHERE document_id IN ({}) \
                     ORDER BY document_id, chunk_index",
                    placeholders
                );
                let mut query = sqlx::query(&sql);
                for id in ids {
                    query = query.bind(id);
                }
                query.fetch_all(&self.pool).await.map_err(db_err)?
            }
        };
        Ok(rows.iter().map(chunk_from_row).collect())
    }

    async fn document_title(&self, id: &str) -> Result<Option<String>> {
        sqlx::query_scalar("SELECT title FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn generation(&self) -> Result<u64> {
        let value: i64 = sqlx::query_scalar("SELECT value FROM meta WHERE key = 'generation'")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(value as u64)
    }
}
