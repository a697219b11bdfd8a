//! In-memory [`Store`] implementation.
//!
//! The reference backend: `HashMap`s and `Vec`s behind one `RwLock` per
//! aggregate, plus an atomic generation counter. Used by tests and by
//! embedders-only deployments that don't need persistence.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{Error, Result};
use crate::models::{Document, DocumentChunk, KnowledgeBase, KnowledgeBaseUpdate};

use super::Store;

/// In-memory store with per-aggregate locks.
#[derive(Default)]
pub struct InMemoryStore {
    /// Documents without their chunk lists; chunks live in their own
    /// aggregate so searches don't contend with document reads.
    docs: RwLock<HashMap<String, Document>>,
    chunks: RwLock<Vec<DocumentChunk>>,
    kbs: RwLock<HashMap<String, KnowledgeBase>>,
    generation: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_document(&self, doc: &Document) -> Result<()> {
        {
            let mut docs = self.docs.write().unwrap();
            if docs.contains_key(&doc.id) {
                return Err(Error::duplicate("document", &doc.id));
            }
            let mut stored = doc.clone();
            stored.chunks = Vec::new();
            docs.insert(doc.id.clone(), stored);
        }
        self.chunks
            .write()
            .unwrap()
            .extend(doc.chunks.iter().cloned());
        self.bump();
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let doc = match self.docs.read().unwrap().get(id) {
            Some(d) => d.clone(),
            None => return Ok(None),
        };
        let mut chunks: Vec<DocumentChunk> = self
            .chunks
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.document_id == id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(Some(Document { chunks, ..doc }))
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let mut docs: Vec<Document> = self.docs.read().unwrap().values().cloned().collect();
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        let chunks = self.chunks.read().unwrap();
        for doc in &mut docs {
            doc.chunks = chunks
                .iter()
                .filter(|c| c.document_id == doc.id)
                .cloned()
                .collect();
            doc.chunks.sort_by_key(|c| c.chunk_index);
        }
        Ok(docs)
    }

    async fn delete_document(&self, id: &str) -> Result<()> {
        if self.docs.write().unwrap().remove(id).is_none() {
            return Err(Error::not_found("document", id));
        }
        self.chunks.write().unwrap().retain(|c| c.document_id != id);
        self.bump();
        Ok(())
    }

    async fn create_knowledge_base(&self, kb: &KnowledgeBase) -> Result<()> {
        let mut kbs = self.kbs.write().unwrap();
        if kbs.contains_key(&kb.id) {
            return Err(Error::duplicate("knowledge base", &kb.id));
        }
        kbs.insert(kb.id.clone(), kb.clone());
        drop(kbs);
        self.bump();
        Ok(())
    }

    async fn get_knowledge_base(&self, id: &str) -> Result<Option<KnowledgeBase>> {
        Ok(self.kbs.read().unwrap().get(id).cloned())
    }

    async fn list_knowledge_bases(&self) -> Result<Vec<KnowledgeBase>> {
        let mut kbs: Vec<KnowledgeBase> = self.kbs.read().unwrap().values().cloned().collect();
        kbs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(kbs)
    }

    async fn update_knowledge_base(
        &self,
        id: &str,
        update: KnowledgeBaseUpdate,
    ) -> Result<KnowledgeBase> {
        let mut kbs = self.kbs.write().unwrap();
        let kb = kbs
            .get_mut(id)
            .ok_or_else(|| Error::not_found("knowledge base", id))?;
        if let Some(name) = update.name {
            kb.name = name;
        }
        if let Some(description) = update.description {
            kb.description = description;
        }
        if let Some(is_public) = update.is_public {
            kb.is_public = is_public;
        }
        if let Some(collaborators) = update.collaborators {
            kb.collaborators = collaborators;
        }
        if let Some(tags) = update.tags {
            kb.tags = tags;
        }
        kb.updated_at = Utc::now();
        let updated = kb.clone();
        drop(kbs);
        self.bump();
        Ok(updated)
    }

    async fn delete_knowledge_base(&self, id: &str) -> Result<()> {
        if self.kbs.write().unwrap().remove(id).is_none() {
            return Err(Error::not_found("knowledge base", id));
        }
        self.bump();
        Ok(())
    }

    async fn add_document_to_knowledge_base(&self, kb_id: &str, doc_id: &str) -> Result<()> {
        let mut kbs = self.kbs.write().unwrap();
        let kb = kbs
            .get_mut(kb_id)
            .ok_or_else(|| Error::not_found("knowledge base", kb_id))?;
        if !kb.document_ids.iter().any(|d| d == doc_id) {
            kb.document_ids.push(doc_id.to_string());
            kb.updated_at = Utc::now();
        }
        drop(kbs);
        self.bump();
        Ok(())
    }

    async fn remove_document_from_knowledge_base(&self, kb_id: &str, doc_id: &str) -> Result<()> {
        let mut kbs = self.kbs.write().unwrap();
        let kb = kbs
            .get_mut(kb_id)
            .ok_or_else(|| Error::not_found("knowledge base", kb_id))?;
        kb.document_ids.retain(|d| d != doc_id);
        kb.updated_at = Utc::now();
        drop(kbs);
        self.bump();
        Ok(())
    }

    async fn chunks_in_scope(
        &self,
        document_ids: Option<&[String]>,
    ) -> Result<Vec<DocumentChunk>> {
        let chunks = self.chunks.read().unwrap();
        Ok(match document_ids {
            None => chunks.clone(),
            Some(ids) => chunks
                .iter()
                .filter(|c| ids.iter().any(|id| *id == c.document_id))
                .cloned()
                .collect(),
        })
    }

    async fn document_title(&self, id: &str) -> Result<Option<String>> {
        Ok(self.docs.read().unwrap().get(id).map(|d| d.title.clone()))
    }

    async fn generation(&self) -> Result<u64> {
        Ok(self.generation.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::split_text;
    use crate::models::DocumentType;
    use serde_json::json;

    fn make_doc(id: &str, content: &str) -> Document {
        let chunks = split_text(id, content, 500, 50);
        Document {
            id: id.to_string(),
            title: format!("Title of {}", id),
            content: content.to_string(),
            doc_type: DocumentType::Plain,
            size: content.len() as u64,
            user_id: "user-1".to_string(),
            uploaded_at: Utc::now(),
            tags: Vec::new(),
            metadata: json!({}),
            chunks,
        }
    }

    fn make_kb(id: &str) -> KnowledgeBase {
        KnowledgeBase {
            id: id.to_string(),
            name: "Research".to_string(),
            description: String::new(),
            user_id: "user-1".to_string(),
            document_ids: Vec::new(),
            is_public: false,
            collaborators: Vec::new(),
            tags: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected_and_store_unchanged() {
        let store = InMemoryStore::new();
        store.insert_document(&make_doc("d1", "alpha")).await.unwrap();

        let err = store
            .insert_document(&make_doc("d1", "different content"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateEntity { .. }));

        let doc = store.get_document("d1").await.unwrap().unwrap();
        assert_eq!(doc.content, "alpha");
        assert_eq!(store.list_documents().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_owned_chunks() {
        let store = InMemoryStore::new();
        store
            .insert_document(&make_doc("d1", &"text ".repeat(300)))
            .await
            .unwrap();
        store.insert_document(&make_doc("d2", "other")).await.unwrap();

        store.delete_document("d1").await.unwrap();
        let remaining = store.chunks_in_scope(None).await.unwrap();
        assert!(remaining.iter().all(|c| c.document_id == "d2"));

        let err = store.delete_document("d1").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn kb_membership_is_set_union() {
        let store = InMemoryStore::new();
        store.create_knowledge_base(&make_kb("kb1")).await.unwrap();

        store
            .add_document_to_knowledge_base("kb1", "d1")
            .await
            .unwrap();
        store
            .add_document_to_knowledge_base("kb1", "d1")
            .await
            .unwrap();
        let kb = store.get_knowledge_base("kb1").await.unwrap().unwrap();
        assert_eq!(kb.document_ids, vec!["d1".to_string()]);

        store
            .remove_document_from_knowledge_base("kb1", "d1")
            .await
            .unwrap();
        let kb = store.get_knowledge_base("kb1").await.unwrap().unwrap();
        assert!(kb.document_ids.is_empty());
    }

    #[tokio::test]
    async fn chunk_scope_filters_by_document() {
        let store = InMemoryStore::new();
        store.insert_document(&make_doc("d1", "first")).await.unwrap();
        store.insert_document(&make_doc("d2", "second")).await.unwrap();

        let scoped = store
            .chunks_in_scope(Some(&["d2".to_string()]))
            .await
            .unwrap();
        assert!(!scoped.is_empty());
        assert!(scoped.iter().all(|c| c.document_id == "d2"));

        let none = store.chunks_in_scope(Some(&[])).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn generation_bumps_on_every_mutation() {
        let store = InMemoryStore::new();
        let g0 = store.generation().await.unwrap();
        store.insert_document(&make_doc("d1", "alpha")).await.unwrap();
        let g1 = store.generation().await.unwrap();
        assert!(g1 > g0);

        store.get_document("d1").await.unwrap();
        assert_eq!(store.generation().await.unwrap(), g1);

        store.delete_document("d1").await.unwrap();
        assert!(store.generation().await.unwrap() > g1);
    }

    #[tokio::test]
    async fn kb_update_applies_partial_fields() {
        let store = InMemoryStore::new();
        store.create_knowledge_base(&make_kb("kb1")).await.unwrap();

        let updated = store
            .update_knowledge_base(
                "kb1",
                KnowledgeBaseUpdate {
                    name: Some("Renamed".to_string()),
                    is_public: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Renamed");
        assert!(updated.is_public);
        assert_eq!(updated.user_id, "user-1");
    }
}
