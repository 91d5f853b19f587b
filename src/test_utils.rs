//! In-memory fakes for the capability traits.
//!
//! Used by unit tests, integration tests and anyone embedding the worker
//! without a real browser or remote store.

use crate::browser::{Browser, Tab, TabId};
use crate::error::{Result, WardenError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tabwarden_docstore::{CollectionStore, DocStoreError, Document, DocumentStore, Fields};

/// A call recorded by [`FakeBrowser`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserCall {
    /// `reload(tab)`
    Reload(TabId),
    /// `navigate(tab, url)`
    Navigate(TabId, String),
    /// `show_alert(tab, message)`
    Alert(TabId, String),
}

/// Scriptable [`Browser`] that records every mutation.
#[derive(Debug, Default)]
pub struct FakeBrowser {
    active: Mutex<Option<Tab>>,
    tabs: Mutex<HashMap<TabId, Tab>>,
    calls: Mutex<Vec<BrowserCall>>,
    fail_queries: AtomicBool,
    fail_mutations: AtomicBool,
}

impl FakeBrowser {
    /// Browser with no tabs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tab returned by [`Browser::active_tab`]. Tabs with an id are
    /// also made available to [`Browser::get_tab`].
    pub fn set_active(&self, tab: Option<Tab>) {
        if let Some(tab) = &tab {
            self.insert_tab(tab.clone());
        }
        *lock(&self.active) = tab;
    }

    /// Register a tab for [`Browser::get_tab`].
    pub fn insert_tab(&self, tab: Tab) {
        if let Some(id) = tab.id {
            lock(&self.tabs).insert(id, tab);
        }
    }

    /// Make tab queries fail.
    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    /// Make reload, navigate and alert fail.
    pub fn fail_mutations(&self, fail: bool) {
        self.fail_mutations.store(fail, Ordering::SeqCst);
    }

    /// Every mutation so far, in call order.
    pub fn calls(&self) -> Vec<BrowserCall> {
        lock(&self.calls).clone()
    }

    /// Mutations targeting `tab_id`.
    pub fn calls_for(&self, tab_id: TabId) -> Vec<BrowserCall> {
        self.calls()
            .into_iter()
            .filter(|call| match call {
                BrowserCall::Reload(id)
                | BrowserCall::Navigate(id, _)
                | BrowserCall::Alert(id, _) => *id == tab_id,
            })
            .collect()
    }

    fn record(&self, call: BrowserCall) -> Result<()> {
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(WardenError::Browser(format!("scripted failure for {call:?}")));
        }
        lock(&self.calls).push(call);
        Ok(())
    }

    fn check_queries(&self) -> Result<()> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(WardenError::Browser("scripted query failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn active_tab(&self) -> Result<Option<Tab>> {
        self.check_queries()?;
        Ok(lock(&self.active).clone())
    }

    async fn get_tab(&self, tab_id: TabId) -> Result<Option<Tab>> {
        self.check_queries()?;
        Ok(lock(&self.tabs).get(&tab_id).cloned())
    }

    async fn reload(&self, tab_id: TabId) -> Result<()> {
        self.record(BrowserCall::Reload(tab_id))
    }

    async fn navigate(&self, tab_id: TabId, url: &str) -> Result<()> {
        self.record(BrowserCall::Navigate(tab_id, url.to_owned()))?;
        if let Some(tab) = lock(&self.tabs).get_mut(&tab_id) {
            tab.url = Some(url.to_owned());
        }
        Ok(())
    }

    async fn show_alert(&self, tab_id: TabId, message: &str) -> Result<()> {
        self.record(BrowserCall::Alert(tab_id, message.to_owned()))
    }
}

/// [`DocumentStore`] holding one document in memory.
#[derive(Debug, Default)]
pub struct FakeDocumentStore {
    fields: Mutex<Fields>,
    offline: AtomicBool,
    patches: AtomicUsize,
    reads: AtomicUsize,
}

impl FakeDocumentStore {
    /// Store whose document has no fields yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose document starts with `fields`.
    pub fn with_fields(fields: Fields) -> Self {
        let store = Self::default();
        *lock(&store.fields) = fields;
        store
    }

    /// While offline every call fails with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Overwrite the `action` field, as the remote dashboard does.
    pub fn set_action(&self, action: &str) {
        lock(&self.fields).insert("action", tabwarden_docstore::FieldValue::string(action));
    }

    /// Current document fields.
    pub fn fields(&self) -> Fields {
        lock(&self.fields).clone()
    }

    /// Successful and failed patch calls.
    pub fn patch_count(&self) -> usize {
        self.patches.load(Ordering::SeqCst)
    }

    /// Successful and failed read calls.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> tabwarden_docstore::Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(DocStoreError::Transport("simulated network failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FakeDocumentStore {
    async fn patch_fields(&self, fields: &Fields) -> tabwarden_docstore::Result<Document> {
        self.patches.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        let mut current = lock(&self.fields);
        for (name, value) in fields.iter() {
            current.insert(name, value.clone());
        }
        Ok(Document {
            name: Some("fake/workerstatus".into()),
            fields: current.clone(),
            ..Document::default()
        })
    }

    async fn create_document(&self, fields: &Fields) -> tabwarden_docstore::Result<Document> {
        self.check_online()?;
        *lock(&self.fields) = fields.clone();
        Ok(Document {
            name: Some("fake/workerstatus".into()),
            fields: fields.clone(),
            ..Document::default()
        })
    }

    async fn read_fields(&self) -> tabwarden_docstore::Result<Fields> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        Ok(lock(&self.fields).clone())
    }
}

/// [`CollectionStore`] holding a whole collection in memory.
#[derive(Debug, Default)]
pub struct FakeCollectionStore {
    docs: Mutex<BTreeMap<String, Fields>>,
}

impl FakeCollectionStore {
    /// Empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a document.
    pub fn insert(&self, document_id: &str, fields: Fields) {
        lock(&self.docs).insert(document_id.to_owned(), fields);
    }

    /// Fields of one document, if present.
    pub fn fields(&self, document_id: &str) -> Option<Fields> {
        lock(&self.docs).get(document_id).cloned()
    }

    fn document(document_id: &str, fields: Fields) -> Document {
        Document {
            name: Some(format!("fake/workerstatus/{document_id}")),
            fields,
            ..Document::default()
        }
    }
}

#[async_trait]
impl CollectionStore for FakeCollectionStore {
    async fn list_documents(&self) -> tabwarden_docstore::Result<Vec<Document>> {
        Ok(lock(&self.docs)
            .iter()
            .map(|(id, fields)| Self::document(id, fields.clone()))
            .collect())
    }

    async fn read_document(&self, document_id: &str) -> tabwarden_docstore::Result<Document> {
        let fields = self
            .fields(document_id)
            .ok_or_else(|| DocStoreError::NotFound(document_id.to_owned()))?;
        Ok(Self::document(document_id, fields))
    }

    async fn update_document(
        &self,
        document_id: &str,
        fields: &Fields,
    ) -> tabwarden_docstore::Result<Document> {
        let mut docs = lock(&self.docs);
        let current = docs
            .get_mut(document_id)
            .ok_or_else(|| DocStoreError::NotFound(document_id.to_owned()))?;
        for (name, value) in fields.iter() {
            current.insert(name, value.clone());
        }
        Ok(Self::document(document_id, current.clone()))
    }

    async fn set_document(
        &self,
        document_id: &str,
        fields: &Fields,
    ) -> tabwarden_docstore::Result<Document> {
        lock(&self.docs).insert(document_id.to_owned(), fields.clone());
        Ok(Self::document(document_id, fields.clone()))
    }
}

/// Lock a test mutex, recovering the data if a panicking test poisoned it.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
