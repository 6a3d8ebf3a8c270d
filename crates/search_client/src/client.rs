use std::time::Duration;

use serde::Deserialize;

use backfill_core::{BulkOutcome, IndexHealth, IndexStatus, SearchError, SearchIndex, SinkDocument};

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Search cluster client (blocking).
#[derive(Clone)]
pub struct OpenSearchClient {
    http: reqwest::blocking::Client,
    base_url: String,
}

/// One row of `_cat/indices?format=json`.
#[derive(Debug, Deserialize)]
struct CatIndexRow {
    index: String,
    #[serde(default)]
    health: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<serde_json::Map<String, serde_json::Value>>,
}

impl OpenSearchClient {
    /// Client for the node at `node` (e.g. `http://localhost:9200`).
    pub fn new(node: &str) -> Result<Self, SearchError> {
        Self::with_base_url(node.to_string())
    }

    pub fn with_base_url(base_url: String) -> Result<Self, SearchError> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(format!("backfill/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| SearchError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ── HTTP helpers ────────────────────────────────────────────────

    fn get(&self, path: &str) -> Result<reqwest::blocking::Response, SearchError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .send()
            .map_err(|e| SearchError::Network(e.to_string()))?;
        check(response)
    }

    fn send_json(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::blocking::Response, SearchError> {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .map_err(|e| SearchError::Network(e.to_string()))
    }
}

fn check(response: reqwest::blocking::Response) -> Result<reqwest::blocking::Response, SearchError> {
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().unwrap_or_default();
        return Err(SearchError::Http(status, body));
    }
    Ok(response)
}

fn to_json(doc: &SinkDocument) -> Result<serde_json::Value, SearchError> {
    serde_json::to_value(doc).map_err(|e| SearchError::Parse(e.to_string()))
}

/// Newline-delimited `_bulk` body: one action line, one source line per document.
fn bulk_body(index: &str, docs: &[(i64, SinkDocument)]) -> Result<String, SearchError> {
    let mut body = String::new();
    for (id, doc) in docs {
        let action = serde_json::json!({ "index": { "_index": index, "_id": id.to_string() } });
        body.push_str(&action.to_string());
        body.push('\n');
        body.push_str(&to_json(doc)?.to_string());
        body.push('\n');
    }
    Ok(body)
}

fn error_type(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    json.get("error")?.get("type")?.as_str().map(String::from)
}

impl SearchIndex for OpenSearchClient {
    fn ping(&self) -> Result<(), SearchError> {
        self.get("/")?;
        Ok(())
    }

    fn index_status(&self, index: &str) -> Result<Option<IndexStatus>, SearchError> {
        let resp = self.get("/_cat/indices?format=json")?;
        let rows: Vec<CatIndexRow> = resp.json().map_err(|e| SearchError::Parse(e.to_string()))?;
        Ok(rows.into_iter().find(|r| r.index == index).map(|r| IndexStatus {
            name: r.index,
            status: r.status,
            health: IndexHealth::parse(&r.health),
        }))
    }

    fn bulk_index(&self, index: &str, docs: &[(i64, SinkDocument)]) -> Result<BulkOutcome, SearchError> {
        if docs.is_empty() {
            return Ok(BulkOutcome::default());
        }

        let response = self
            .http
            .post(format!("{}/_bulk", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(bulk_body(index, docs)?)
            .send()
            .map_err(|e| SearchError::Network(e.to_string()))?;
        let parsed: BulkResponse = check(response)?
            .json()
            .map_err(|e| SearchError::Parse(e.to_string()))?;

        let mut outcome = BulkOutcome::default();
        for item in &parsed.items {
            // Each item is keyed by its action name
            let Some(result) = item.values().next() else { continue };
            let id = result.get("_id").and_then(|v| v.as_str()).unwrap_or("?").to_string();
            match result.get("error") {
                Some(err) => {
                    let reason = err
                        .get("reason")
                        .and_then(|v| v.as_str())
                        .map(String::from)
                        .unwrap_or_else(|| err.to_string());
                    outcome.failed.push((id, reason));
                }
                None => outcome.indexed += 1,
            }
        }
        if parsed.errors && outcome.failed.is_empty() {
            log::warn!("bulk response flagged errors but no failed items were reported");
        }
        Ok(outcome)
    }

    fn update_document(&self, index: &str, id: i64, doc: &SinkDocument) -> Result<(), SearchError> {
        let body = serde_json::json!({ "doc": to_json(doc)? });
        let response = self.send_json(reqwest::Method::POST, &format!("/{index}/_update/{id}"), &body)?;

        let status = response.status().as_u16();
        if response.status().is_success() {
            return Ok(());
        }
        let text = response.text().unwrap_or_default();
        if status == 404 && error_type(&text).as_deref() == Some("document_missing_exception") {
            return Err(SearchError::DocumentMissing {
                index: index.to_string(),
                id,
            });
        }
        Err(SearchError::Http(status, text))
    }

    fn create_document(&self, index: &str, id: i64, doc: &SinkDocument) -> Result<(), SearchError> {
        let response = self.send_json(reqwest::Method::PUT, &format!("/{index}/_doc/{id}"), &to_json(doc)?)?;
        check(response)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn doc(body: &str) -> SinkDocument {
        SinkDocument {
            ip: Some("127.0.0.1".into()),
            author: "Importer".into(),
            approved: true,
            body: body.into(),
            image_id: Some(7),
            fingerprint: Some("1".into()),
            user_id: None,
            hidden_from_users: false,
            anonymous: true,
            image_tag_ids: vec![],
            posted_at: Some("2020-01-01T00:00:00.000Z".into()),
        }
    }

    fn client(server: &MockServer) -> OpenSearchClient {
        OpenSearchClient::with_base_url(server.base_url()).unwrap()
    }

    #[test]
    fn ping_hits_root() {
        let server = MockServer::start();
        let root = server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200).json_body(serde_json::json!({ "cluster_name": "test" }));
        });

        client(&server).ping().unwrap();
        root.assert();
    }

    #[test]
    fn ping_reports_http_failure() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(503).body("unavailable");
        });

        let err = client(&server).ping().unwrap_err();
        assert!(matches!(err, SearchError::Http(503, _)));
    }

    #[test]
    fn index_status_finds_named_index() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/_cat/indices").query_param("format", "json");
            then.status(200).json_body(serde_json::json!([
                { "health": "green", "status": "open", "index": "images" },
                { "health": "yellow", "status": "open", "index": "comments" }
            ]));
        });

        let c = client(&server);
        let status = c.index_status("comments").unwrap().unwrap();
        assert_eq!(status.health, IndexHealth::Yellow);
        assert_eq!(status.status, "open");
        assert!(c.index_status("posts").unwrap().is_none());
    }

    #[test]
    fn bulk_sends_ndjson_and_collects_failures() {
        let server = MockServer::start();
        let bulk = server.mock(|when, then| {
            when.method(POST)
                .path("/_bulk")
                .header("content-type", "application/x-ndjson")
                .body_includes("\"_index\":\"comments\"")
                .body_includes("\"_id\":\"11\"");
            then.status(200).json_body(serde_json::json!({
                "took": 3,
                "errors": true,
                "items": [
                    { "index": { "_id": "10", "status": 201 } },
                    { "index": { "_id": "11", "status": 400,
                        "error": { "type": "mapper_parsing_exception", "reason": "bad field" } } }
                ]
            }));
        });

        let outcome = client(&server)
            .bulk_index("comments", &[(10, doc("a")), (11, doc("b"))])
            .unwrap();
        bulk.assert();
        assert_eq!(outcome.indexed, 1);
        assert_eq!(outcome.failed, vec![("11".to_string(), "bad field".to_string())]);
    }

    #[test]
    fn empty_bulk_makes_no_request() {
        let server = MockServer::start();
        let bulk = server.mock(|when, then| {
            when.method(POST).path("/_bulk");
            then.status(200);
        });

        let outcome = client(&server).bulk_index("comments", &[]).unwrap();
        assert_eq!(outcome, BulkOutcome::default());
        bulk.assert_calls(0);
    }

    #[test]
    fn update_of_missing_document_is_distinguished() {
        let server = MockServer::start();
        let update = server.mock(|when, then| {
            when.method(POST).path("/comments/_update/42").body_includes("\"doc\"");
            then.status(404).json_body(serde_json::json!({
                "error": { "type": "document_missing_exception", "reason": "[42]: document missing" },
                "status": 404
            }));
        });

        let err = client(&server).update_document("comments", 42, &doc("x")).unwrap_err();
        update.assert();
        assert!(err.is_document_missing());
    }

    #[test]
    fn update_of_missing_index_is_plain_http_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/comments/_update/42");
            then.status(404).json_body(serde_json::json!({
                "error": { "type": "index_not_found_exception" },
                "status": 404
            }));
        });

        let err = client(&server).update_document("comments", 42, &doc("x")).unwrap_err();
        assert!(matches!(err, SearchError::Http(404, _)));
    }

    #[test]
    fn create_puts_full_document() {
        let server = MockServer::start();
        let create = server.mock(|when, then| {
            when.method(PUT)
                .path("/comments/_doc/42")
                .body_includes("\"body\":\"hello\"")
                .body_includes("\"image_tag_ids\":[]");
            then.status(201).json_body(serde_json::json!({ "result": "created" }));
        });

        client(&server).create_document("comments", 42, &doc("hello")).unwrap();
        create.assert();
    }

    #[test]
    fn connection_refused_is_network_error() {
        let c = OpenSearchClient::new("http://127.0.0.1:1/").unwrap();
        assert_eq!(c.base_url(), "http://127.0.0.1:1");
        assert!(matches!(c.ping().unwrap_err(), SearchError::Network(_)));
    }
}
