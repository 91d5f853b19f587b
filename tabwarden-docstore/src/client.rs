//! Client for the status collection.
//!
//! [`DocumentStore`] is the worker's view: one fixed document. The manager
//! side sees the whole collection through [`CollectionStore`].

use crate::config::DocStoreConfig;
use crate::error::{DocStoreError, Result};
use crate::http;
use crate::mask;
use crate::types::{Document, Fields, ListPage, WriteBody};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Documents requested per listing page.
const LIST_PAGE_SIZE: u32 = 300;

/// Read and write access to one fixed remote document.
///
/// Implemented by [`DocumentClient`] over HTTP. Callers hold it as
/// `Arc<dyn DocumentStore>` so tests can substitute an in-memory store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Partially update the document, touching exactly the given field names.
    /// Creates the document when it does not exist yet.
    async fn patch_fields(&self, fields: &Fields) -> Result<Document>;

    /// Create the document at its fixed identity with exactly `fields`.
    async fn create_document(&self, fields: &Fields) -> Result<Document>;

    /// Fetch the current field set of the document.
    async fn read_fields(&self) -> Result<Fields>;
}

/// Every document in the configured collection, addressed by id.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// All documents of the collection, following every listing page.
    async fn list_documents(&self) -> Result<Vec<Document>>;

    /// Fetch one document. [`DocStoreError::NotFound`] when it does not exist.
    async fn read_document(&self, document_id: &str) -> Result<Document>;

    /// Partially update an existing document, touching exactly the given
    /// field names. [`DocStoreError::NotFound`] when it does not exist.
    async fn update_document(&self, document_id: &str, fields: &Fields) -> Result<Document>;

    /// Replace the whole field set of a document, creating it if needed.
    async fn set_document(&self, document_id: &str, fields: &Fields) -> Result<Document>;
}

/// HTTP client for the document named by a [`DocStoreConfig`].
pub struct DocumentClient {
    config: DocStoreConfig,
    client: reqwest::Client,
}

impl std::fmt::Debug for DocumentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentClient")
            .field("config", &self.config)
            .finish()
    }
}

impl DocumentClient {
    /// Create a client after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns [`DocStoreError::Config`] if the config is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: DocStoreConfig) -> Result<Self> {
        config.validate()?;
        let client = http::build_client(&config)?;
        Ok(Self { config, client })
    }

    /// Configuration this client was built with.
    pub fn config(&self) -> &DocStoreConfig {
        &self.config
    }

    /// `.../documents/<collection>` with no query string.
    fn collection_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/{}/documents/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.project_id,
            self.config.database,
            urlencoding::encode(&self.config.collection),
        )
    }

    /// `.../documents/<collection>/<id>` with no query string.
    fn document_url(&self, document_id: &str) -> String {
        format!(
            "{}/{}",
            self.collection_url(),
            urlencoding::encode(document_id)
        )
    }

    fn key_param(&self) -> String {
        format!("key={}", urlencoding::encode(&self.config.api_key))
    }

    /// PATCH `document_id`. With `masked` only the given fields are touched;
    /// otherwise the field set is replaced. With `must_exist` a missing
    /// document is a 404 instead of being created.
    async fn send_patch(
        &self,
        document_id: &str,
        fields: &Fields,
        masked: bool,
        must_exist: bool,
    ) -> Result<Document> {
        let mut url = format!("{}?{}", self.document_url(document_id), self.key_param());
        if masked {
            let mask = mask::update_mask_query(fields);
            if !mask.is_empty() {
                url.push('&');
                url.push_str(&mask);
            }
        }
        if must_exist {
            url.push_str("&currentDocument.exists=true");
        }

        debug!(document = document_id, fields = fields.len(), "patching document");
        let response = self
            .client
            .patch(&url)
            .json(&WriteBody { fields })
            .send()
            .await
            .map_err(transport_error)?;
        decode_json(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(transport_error)?;
        decode_json(response).await
    }
}

#[async_trait]
impl CollectionStore for DocumentClient {
    async fn list_documents(&self) -> Result<Vec<Document>> {
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = format!(
                "{}?{}&pageSize={LIST_PAGE_SIZE}",
                self.collection_url(),
                self.key_param()
            );
            if let Some(token) = &page_token {
                url.push_str("&pageToken=");
                url.push_str(&urlencoding::encode(token));
            }

            let page: ListPage = self.get_json(&url).await?;
            documents.extend(page.documents);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        debug!(count = documents.len(), "listed collection");
        Ok(documents)
    }

    async fn read_document(&self, document_id: &str) -> Result<Document> {
        let url = format!("{}?{}", self.document_url(document_id), self.key_param());
        self.get_json(&url).await
    }

    async fn update_document(&self, document_id: &str, fields: &Fields) -> Result<Document> {
        self.send_patch(document_id, fields, true, true).await
    }

    async fn set_document(&self, document_id: &str, fields: &Fields) -> Result<Document> {
        self.send_patch(document_id, fields, false, false).await
    }
}

#[async_trait]
impl DocumentStore for DocumentClient {
    async fn patch_fields(&self, fields: &Fields) -> Result<Document> {
        match self
            .send_patch(&self.config.document_id, fields, true, false)
            .await
        {
            Err(e) if e.is_not_found() => {
                debug!("status document missing, creating it");
                self.create_document(fields).await
            }
            other => other,
        }
    }

    async fn create_document(&self, fields: &Fields) -> Result<Document> {
        let url = format!(
            "{}?{}&documentId={}",
            self.collection_url(),
            self.key_param(),
            urlencoding::encode(&self.config.document_id)
        );

        debug!(fields = fields.len(), "creating status document");
        let response = self
            .client
            .post(&url)
            .json(&WriteBody { fields })
            .send()
            .await
            .map_err(transport_error)?;
        decode_json(response).await
    }

    async fn read_fields(&self) -> Result<Fields> {
        Ok(self.read_document(&self.config.document_id).await?.fields)
    }
}

/// Strip the URL (and with it the API key) from transport errors.
fn transport_error(e: reqwest::Error) -> DocStoreError {
    DocStoreError::Transport(e.without_url().to_string())
}

/// Map the response status, then decode the JSON body.
async fn decode_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;

    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(DocStoreError::NotFound(body));
    }
    if !status.is_success() {
        return Err(DocStoreError::Status {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|e| DocStoreError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> DocumentClient {
        let config = DocStoreConfig::new("demo", "k&y").with_base_url("http://localhost:9/v1/");
        DocumentClient::new(config).unwrap()
    }

    #[test]
    fn new_rejects_invalid_config() {
        let err = DocumentClient::new(DocStoreConfig::default()).unwrap_err();
        assert!(matches!(err, DocStoreError::Config(_)));
    }

    #[test]
    fn document_url_layout() {
        assert_eq!(
            client().document_url("workerstatus"),
            "http://localhost:9/v1/projects/demo/databases/(default)/documents/workerstatus/workerstatus"
        );
    }

    #[test]
    fn key_param_is_encoded() {
        assert_eq!(client().key_param(), "key=k%26y");
    }

    #[test]
    fn debug_output_hides_key() {
        let rendered = format!("{:?}", client());
        assert!(!rendered.contains("k&y"));
    }
}
