//! Manager operations against the real document client on a mock server.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use tabwarden::admin::{self, DEFAULT_TEMPLATE_ID, ManagerAction};
use tabwarden::error::WardenError;
use tabwarden_docstore::{DocStoreConfig, DocStoreError, DocumentClient};
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const COLLECTION_PATH: &str = "/projects/demo/databases/(default)/documents/workerstatus";

fn client_for(server: &MockServer) -> DocumentClient {
    let config = DocStoreConfig::new("demo", "test-key").with_base_url(server.uri());
    DocumentClient::new(config).unwrap()
}

fn doc_path(id: &str) -> String {
    format!("{COLLECTION_PATH}/{id}")
}

fn doc(id: &str, fields: serde_json::Value) -> serde_json::Value {
    json!({
        "name": format!("projects/demo/databases/(default)/documents/workerstatus/{id}"),
        "fields": fields,
    })
}

fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 4, 12, 0, 0).unwrap()
}

async fn last_body(server: &MockServer) -> serde_json::Value {
    let requests = server.received_requests().await.unwrap();
    serde_json::from_slice(&requests.last().unwrap().body).unwrap()
}

#[tokio::test]
async fn rows_are_listed_newest_flag_first() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(COLLECTION_PATH))
        .and(query_param("key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documents": [
                doc("old", json!({
                    "ID": {"stringValue": "AnnB"},
                    "last flagged": {"timestampValue": "2025-03-04T08:00:00Z"},
                    "flag": {"booleanValue": true}
                })),
                doc("never", json!({"ID": {"stringValue": "BobC"}})),
                doc("new", json!({
                    "ID": {"stringValue": "JohnA"},
                    "team role": {"stringValue": "software developer"},
                    "last flagged": {"timestampValue": "2025-03-04T09:30:00Z"},
                    "action": {"stringValue": "warn"}
                }))
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let rows = admin::fetch_rows(&client_for(&server)).await.unwrap();

    let ids: Vec<&str> = rows.iter().map(|r| r.doc_id.as_str()).collect();
    assert_eq!(ids, ["new", "old", "never"]);
    assert_eq!(rows[0].role, "software developer");
    assert_eq!(rows[0].action, "warn");
    assert!(rows[1].flag);
    assert_eq!(
        rows[1].last_flagged_label(noon()),
        "2025-03-04 08:00:00 (4 hours ago)"
    );
}

#[tokio::test]
async fn action_resets_flag_on_existing_document_only() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path(doc_path("ann")))
        .and(query_param("currentDocument.exists", "true"))
        .and(query_param("updateMask.fieldPaths", "action"))
        .and(query_param("updateMask.fieldPaths", "flag"))
        .and(query_param("updateMask.fieldPaths", "action_timestamp"))
        .respond_with(ResponseTemplate::new(200).set_body_json(doc("ann", json!({}))))
        .expect(1)
        .mount(&server)
        .await;

    admin::write_action(&client_for(&server), "ann", ManagerAction::Block, noon())
        .await
        .unwrap();

    let body = last_body(&server).await;
    assert_eq!(body["fields"]["action"], json!({"stringValue": "block"}));
    assert_eq!(body["fields"]["flag"], json!({"booleanValue": false}));
    assert_eq!(
        body["fields"]["action_timestamp"],
        json!({"timestampValue": "2025-03-04T12:00:00Z"})
    );
}

#[tokio::test]
async fn action_for_unknown_document_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path(doc_path("ghost")))
        .respond_with(ResponseTemplate::new(404).set_body_string("NOT_FOUND"))
        .expect(1)
        .mount(&server)
        .await;

    let err = admin::write_action(&client_for(&server), "ghost", ManagerAction::Accept, noon())
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::Store(DocStoreError::NotFound(_))));
}

#[tokio::test]
async fn flag_copies_action_timestamp() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(doc_path("ann")))
        .respond_with(ResponseTemplate::new(200).set_body_json(doc("ann", json!({
            "action_timestamp": {"timestampValue": "2025-03-04T07:15:00Z"}
        }))))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path(doc_path("ann")))
        .and(query_param("currentDocument.exists", "true"))
        .and(query_param("updateMask.fieldPaths", "flag"))
        .and(query_param("updateMask.fieldPaths", "`last flagged`"))
        .respond_with(ResponseTemplate::new(200).set_body_json(doc("ann", json!({}))))
        .expect(1)
        .mount(&server)
        .await;

    let at = admin::flag_for_review(&client_for(&server), "ann", noon())
        .await
        .unwrap();

    assert_eq!(at, Utc.with_ymd_and_hms(2025, 3, 4, 7, 15, 0).unwrap());
    let body = last_body(&server).await;
    assert_eq!(body["fields"]["flag"], json!({"booleanValue": true}));
    assert_eq!(
        body["fields"]["last flagged"],
        json!({"timestampValue": "2025-03-04T07:15:00Z"})
    );
}

#[tokio::test]
async fn new_member_is_a_full_copy_of_the_template() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(doc_path(DEFAULT_TEMPLATE_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(doc(
            DEFAULT_TEMPLATE_ID,
            json!({
                "ID": {"stringValue": "JohnA"},
                "flag": {"booleanValue": false}
            }),
        )))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path(doc_path("carol")))
        .and(query_param_is_missing("updateMask.fieldPaths"))
        .and(query_param_is_missing("currentDocument.exists"))
        .respond_with(ResponseTemplate::new(200).set_body_json(doc("carol", json!({}))))
        .expect(1)
        .mount(&server)
        .await;

    admin::add_team_member(&client_for(&server), DEFAULT_TEMPLATE_ID, "carol")
        .await
        .unwrap();

    let body = last_body(&server).await;
    assert_eq!(body["fields"]["ID"], json!({"stringValue": "JohnA"}));
    assert_eq!(body["fields"]["flag"], json!({"booleanValue": false}));
}
