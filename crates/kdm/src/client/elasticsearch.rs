//! # 📡 THE ELASTICSEARCH CLIENT
//!
//! 🎬 COLD OPEN. INT. SERVER ROOM. 3:47 AM.
//!
//! The write alias points at an index that is 41 days old and 80 GB wide. Somebody configured
//! `max_age = "30d"` six weeks ago and then went on holiday. The rollover trigger has been
//! politely asking this module to do something about it.
//!
//! 🚀 This is the REST side of [`NetworkClient`]: index creation, alias swaps, stats, and the
//! document CRUD the repository layer needs. One `reqwest::Client`, reused for everything.
//! API key wins over basic auth. Non-2xx answers become errors with the body attached, because
//! "400 Bad Request" alone has never helped anyone at 3:47 AM.
//!
//! 🦆 (the duck has read the `_aliases` docs. the duck has questions.)

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, trace, warn};

use super::{AliasSwap, IndexRequest, IndexResponse, NetworkClient, RolloverRequest, SearchHit, SearchRequest};
use crate::clock::{Clock, SystemClock};
use crate::criteria::Criteria;
use crate::criteria::render::{render_query, render_search_body};
use crate::rollover::IndexStats;

/// 🌐 Where the cluster lives and how to get in.
///
/// 🔧 auth is tri-modal: api_key, username+password, or "I hope anonymous works".
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ClusterConfig {
    /// 📡 Scheme + host + port. Yes, all of it.
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    /// 🔒 If this is in plaintext in your config file, consider `KDM_CLUSTER__PASSWORD`.
    #[serde(default)]
    pub password: Option<String>,
    /// 🔒 Preferred over basic auth when both are present.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// ⏳ Per-call timeout. A rollover attempt that outlives it fails and waits for the next tick.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            username: None,
            password: None,
            api_key: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// 📡 [`NetworkClient`] over the Elasticsearch REST API.
#[derive(Debug, Clone)]
pub struct ElasticsearchClient {
    client: reqwest::Client,
    config: ClusterConfig,
    /// ⏰ Index age = now - creation_date. "now" is injectable, like everywhere else.
    clock: Arc<dyn Clock>,
}

impl ElasticsearchClient {
    /// 🚀 Build the HTTP client. No network traffic yet; call [`ElasticsearchClient::ping`] for that.
    pub fn new(config: ClusterConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("💀 The HTTP client refused to be born. Probably a TLS setup problem on this machine. Either way: no client, no cluster.")?;
        Ok(Self {
            client,
            config,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 📡 "Hello? Is this thing on?" Fails loudly now rather than on the first rollover tick.
    pub async fn ping(&self) -> Result<()> {
        let response = self
            .request(Method::GET, self.url("")?)
            .send()
            .await
            .with_context(|| format!("💀 Could not reach the cluster at '{}'. Check the URL, the network, and whether anything is listening.", self.config.url))?;
        ensure_success(response, "cluster ping").await?;
        debug!("✅ Cluster at {} is home and answering", self.config.url);
        Ok(())
    }

    /// 🔗 Base URL + path. `trim_end_matches('/')`: one slash of difference, infinite suffering of difference.
    fn url(&self, path: &str) -> Result<Url> {
        let raw = format!("{}/{}", self.config.url.trim_end_matches('/'), path.trim_start_matches('/'));
        Url::parse(&raw).with_context(|| format!("💀 '{raw}' is not a URL anyone can send a request to"))
    }

    /// 🔒 Auth priority: API key, then basic auth, then hope.
    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.client.request(method, url);
        if let Some(api_key) = &self.config.api_key {
            request.header("Authorization", format!("ApiKey {api_key}"))
        } else if let Some(username) = &self.config.username {
            request.basic_auth(username, self.config.password.as_ref())
        } else {
            request
        }
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        request
            .send()
            .await
            .with_context(|| format!("💀 The {what} request never made it to the cluster. Check connectivity and timeouts."))
    }

    async fn creation_date(&self, index: &str) -> Result<Option<DateTime<Utc>>> {
        let url = self.url(&format!("{index}/_settings/index.creation_date"))?;
        let response = self.send(self.request(Method::GET, url), "settings").await?;
        let body: Value = ensure_success(response, "settings lookup")
            .await?
            .json()
            .await
            .context("💀 The settings response was not JSON")?;
        // 🧭 keyed by the physical index name, which may differ from what we asked for
        let millis = body
            .as_object()
            .and_then(|indices| indices.values().next())
            .and_then(|settings| settings.pointer("/settings/index/creation_date"))
            .and_then(|raw| match raw {
                Value::String(text) => text.parse::<i64>().ok(),
                other => other.as_i64(),
            });
        Ok(millis.and_then(DateTime::from_timestamp_millis))
    }
}

/// 💀 Non-2xx → error carrying status and body. The body usually names the shard that is sad.
async fn ensure_success(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    bail!("💀 The {what} came back {status}. The cluster says: {body}")
}

#[derive(Debug, Deserialize)]
struct CatIndex {
    index: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Debug, Deserialize)]
struct SearchHits {
    #[serde(default)]
    hits: Vec<RawHit>,
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(rename = "_index")]
    index: String,
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score", default)]
    score: Option<f64>,
    #[serde(rename = "_source", default)]
    source: Value,
}

#[derive(Debug, Deserialize)]
struct RolloverResponse {
    #[serde(default)]
    rolled_over: bool,
    #[serde(default)]
    old_index: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WriteResponse {
    #[serde(rename = "_index")]
    index: String,
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_version", default)]
    version: Option<i64>,
}

#[async_trait]
impl NetworkClient for ElasticsearchClient {
    async fn create_index(&self, index: &str, body: &Value) -> Result<()> {
        debug!("🏗️ Creating index '{}'", index);
        let request = self.request(Method::PUT, self.url(index)?).json(body);
        let response = self.send(request, "create index").await?;
        ensure_success(response, &format!("creation of index '{index}'")).await?;
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        let response = self.send(self.request(Method::HEAD, self.url(index)?), "index exists").await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => bail!("💀 Asked whether index '{index}' exists, got {status}. Neither yes nor no."),
        }
    }

    async fn list_indices(&self, pattern: &str) -> Result<Vec<String>> {
        let mut url = self.url(&format!("_cat/indices/{pattern}"))?;
        url.query_pairs_mut().append_pair("format", "json").append_pair("h", "index");
        let response = self.send(self.request(Method::GET, url), "list indices").await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let rows: Vec<CatIndex> = ensure_success(response, "index listing")
            .await?
            .json()
            .await
            .context("💀 The _cat/indices response was not the JSON array we were promised")?;
        let mut names: Vec<String> = rows.into_iter().map(|row| row.index).collect();
        names.sort();
        Ok(names)
    }

    async fn write_index_for_alias(&self, alias: &str) -> Result<Option<String>> {
        let url = self.url(&format!("_alias/{alias}"))?;
        let response = self.send(self.request(Method::GET, url), "alias lookup").await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: Value = ensure_success(response, "alias lookup")
            .await?
            .json()
            .await
            .context("💀 The alias response was not JSON")?;
        let Some(indices) = body.as_object() else {
            return Ok(None);
        };
        let flagged = indices.iter().find(|(_, entry)| {
            entry
                .pointer(&format!("/aliases/{alias}/is_write_index"))
                .and_then(Value::as_bool)
                .unwrap_or(false)
        });
        // 🎯 an alias over exactly one index writes there even without the flag
        let chosen = match flagged {
            Some((index, _)) => Some(index.clone()),
            None if indices.len() == 1 => indices.keys().next().cloned(),
            None => None,
        };
        trace!("🧭 Alias '{}' writes into {:?}", alias, chosen);
        Ok(chosen)
    }

    async fn swap_alias(&self, swap: &AliasSwap) -> Result<()> {
        let mut actions = Vec::with_capacity(2);
        if let Some(from) = &swap.from {
            actions.push(json!({ "remove": { "index": from, "alias": swap.alias } }));
        }
        actions.push(json!({ "add": { "index": swap.to, "alias": swap.alias, "is_write_index": true } }));
        let request = self
            .request(Method::POST, self.url("_aliases")?)
            .json(&json!({ "actions": actions }));
        let response = self.send(request, "alias swap").await?;
        ensure_success(response, &format!("swap of alias '{}'", swap.alias)).await?;
        debug!("🔀 Alias '{}' moved {:?} → '{}'", swap.alias, swap.from, swap.to);
        Ok(())
    }

    /// 🔄 `POST /{alias}/_rollover/{to}` without conditions: the decision was already made here.
    async fn rollover(&self, request: &RolloverRequest) -> Result<()> {
        let url = self.url(&format!("{}/_rollover/{}", request.alias, request.to))?;
        let response = self
            .send(self.request(Method::POST, url).json(&request.body), "rollover")
            .await?;
        let answer: RolloverResponse = ensure_success(response, &format!("rollover of alias '{}'", request.alias))
            .await?
            .json()
            .await
            .context("💀 The rollover response was not JSON")?;
        if !answer.rolled_over {
            bail!(
                "💀 The cluster acknowledged the rollover of '{}' to '{}' but did not roll",
                request.alias,
                request.to
            );
        }
        if answer.old_index.as_deref() != Some(request.from.as_str()) {
            warn!(
                "⚠️ Rolled '{}' from {:?}, expected '{}'. Someone else moved the alias in between.",
                request.alias, answer.old_index, request.from
            );
        }
        debug!("🔄 Alias '{}' rolled '{}' → '{}'", request.alias, request.from, request.to);
        Ok(())
    }

    async fn index_stats(&self, index: &str) -> Result<IndexStats> {
        let url = self.url(&format!("{index}/_stats/docs,store"))?;
        let response = self.send(self.request(Method::GET, url), "index stats").await?;
        let body: Value = ensure_success(response, &format!("stats lookup for '{index}'"))
            .await?
            .json()
            .await
            .context("💀 The stats response was not JSON")?;
        let doc_count = body
            .pointer("/_all/primaries/docs/count")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let size_bytes = body
            .pointer("/_all/primaries/store/size_in_bytes")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let age = match self.creation_date(index).await? {
            Some(created) => (self.clock.now() - created).to_std().unwrap_or(Duration::ZERO),
            None => Duration::ZERO,
        };
        Ok(IndexStats {
            age,
            doc_count,
            size_bytes,
        })
    }

    async fn index_document(&self, request: IndexRequest) -> Result<IndexResponse> {
        let (method, mut url) = match &request.id {
            Some(id) => (Method::PUT, self.url(&format!("{}/_doc/{}", request.target, id))?),
            None => (Method::POST, self.url(&format!("{}/_doc", request.target))?),
        };
        {
            let mut query = url.query_pairs_mut();
            if let Some(routing) = &request.routing {
                query.append_pair("routing", routing);
            }
            if request.refresh {
                query.append_pair("refresh", "true");
            }
        }
        let response = self
            .send(self.request(method, url).json(&request.document), "index document")
            .await?;
        let written: WriteResponse = ensure_success(response, &format!("write into '{}'", request.target))
            .await?
            .json()
            .await
            .context("💀 The write went through but the response was not JSON we understand")?;
        Ok(IndexResponse {
            index: written.index,
            id: written.id,
            version: written.version,
        })
    }

    async fn search(&self, target: &str, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        let body = render_search_body(&request.criteria, &request.sort, request.limit);
        trace!("🔍 Searching '{}' with {}", target, body);
        let url = self.url(&format!("{target}/_search"))?;
        let response = self.send(self.request(Method::POST, url).json(&body), "search").await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let parsed: SearchResponse = ensure_success(response, &format!("search on '{target}'"))
            .await?
            .json()
            .await
            .context("💀 The search response did not have the hits.hits shape")?;
        Ok(parsed
            .hits
            .hits
            .into_iter()
            .map(|hit| SearchHit {
                index: hit.index,
                id: hit.id,
                score: hit.score,
                source: hit.source,
            })
            .collect())
    }

    async fn count(&self, target: &str, criteria: &Criteria) -> Result<u64> {
        let url = self.url(&format!("{target}/_count"))?;
        let request = self
            .request(Method::POST, url)
            .json(&json!({ "query": render_query(criteria) }));
        let response = self.send(request, "count").await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(0);
        }
        let body: Value = ensure_success(response, &format!("count on '{target}'"))
            .await?
            .json()
            .await
            .context("💀 The count response was not JSON")?;
        Ok(body.get("count").and_then(Value::as_u64).unwrap_or(0))
    }

    async fn delete_document(&self, index: &str, id: &str, routing: Option<&str>) -> Result<bool> {
        let mut url = self.url(&format!("{index}/_doc/{id}"))?;
        if let Some(routing) = routing {
            url.query_pairs_mut().append_pair("routing", routing);
        }
        let response = self.send(self.request(Method::DELETE, url), "delete").await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        ensure_success(response, &format!("delete of '{index}/{id}'")).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::TimeZone;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ElasticsearchClient {
        ElasticsearchClient::new(ClusterConfig {
            url: format!("{}/", server.uri()),
            ..ClusterConfig::default()
        })
        .expect("client should build")
    }

    #[tokio::test]
    async fn the_one_where_the_api_key_beats_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/orders-000001"))
            .and(header("Authorization", "ApiKey s3cr3t"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"acknowledged": true})))
            .expect(1)
            .mount(&server)
            .await;

        let client = ElasticsearchClient::new(ClusterConfig {
            url: server.uri(),
            username: Some("elastic".into()),
            password: Some("changeme".into()),
            api_key: Some("s3cr3t".into()),
            ..ClusterConfig::default()
        })
        .expect("client should build");
        client
            .create_index("orders-000001", &json!({"settings": {}}))
            .await
            .expect("create should succeed");
    }

    #[tokio::test]
    async fn the_one_where_the_write_index_is_the_flagged_one() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_alias/orders-write"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "orders-000001": {"aliases": {"orders-write": {"is_write_index": false}}},
                "orders-000002": {"aliases": {"orders-write": {"is_write_index": true}}}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/_alias/nobody"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "alias [nobody] missing"})))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(
            client.write_index_for_alias("orders-write").await.expect("lookup"),
            Some("orders-000002".to_string())
        );
        assert_eq!(client.write_index_for_alias("nobody").await.expect("lookup"), None);
    }

    #[tokio::test]
    async fn the_one_where_the_alias_moves_in_one_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_aliases"))
            .and(body_json(json!({"actions": [
                {"remove": {"index": "orders-000001", "alias": "orders-write"}},
                {"add": {"index": "orders-000002", "alias": "orders-write", "is_write_index": true}}
            ]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"acknowledged": true})))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .swap_alias(&AliasSwap {
                alias: "orders-write".into(),
                from: Some("orders-000001".into()),
                to: "orders-000002".into(),
            })
            .await
            .expect("swap should succeed");
    }

    #[tokio::test]
    async fn the_one_where_stats_and_settings_become_index_stats() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orders-000001/_stats/docs,store"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_all": {"primaries": {"docs": {"count": 3}, "store": {"size_in_bytes": 2048}}}
            })))
            .mount(&server)
            .await;
        let created = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).single().expect("valid date");
        Mock::given(method("GET"))
            .and(path("/orders-000001/_settings/index.creation_date"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "orders-000001": {"settings": {"index": {"creation_date": created.timestamp_millis().to_string()}}}
            })))
            .mount(&server)
            .await;

        let clock = Arc::new(FixedClock::new(created + chrono::Duration::days(2)));
        let stats = client_for(&server)
            .with_clock(clock)
            .index_stats("orders-000001")
            .await
            .expect("stats");
        assert_eq!(
            stats,
            IndexStats {
                age: Duration::from_secs(2 * 86_400),
                doc_count: 3,
                size_bytes: 2048
            }
        );
    }

    #[tokio::test]
    async fn the_one_where_writes_and_searches_round_the_cluster() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/answers-write/_doc/a-1"))
            .and(query_param("routing", "q-1"))
            .and(query_param("refresh", "true"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "_index": "answers-000003", "_id": "a-1", "_version": 1, "result": "created"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/answers-*/_search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": {"hits": [{"_index": "answers-000003", "_id": "a-1", "_score": 1.5, "_source": {"body": "use Arc"}}]}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let written = client
            .index_document(IndexRequest {
                target: "answers-write".into(),
                id: Some("a-1".into()),
                routing: Some("q-1".into()),
                document: json!({"body": "use Arc"}),
                refresh: true,
            })
            .await
            .expect("write");
        assert_eq!(written.index, "answers-000003");
        assert_eq!(written.version, Some(1));

        let hits = client
            .search("answers-*", &SearchRequest::default())
            .await
            .expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].score, Some(1.5));
        assert_eq!(hits[0].source, json!({"body": "use Arc"}));
    }

    #[tokio::test]
    async fn the_one_where_a_sad_cluster_becomes_an_error_with_the_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/orders-000002"))
            .respond_with(ResponseTemplate::new(400).set_body_string("resource_already_exists_exception"))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/orders-000009"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .create_index("orders-000002", &json!({}))
            .await
            .expect_err("400 should fail");
        let message = format!("{err:#}");
        assert!(message.contains("400"), "{message}");
        assert!(message.contains("resource_already_exists_exception"), "{message}");
        assert!(!client.index_exists("orders-000009").await.expect("head"));
    }

    #[tokio::test]
    async fn the_one_where_rollover_is_one_request_with_the_new_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders-write/_rollover/orders-000002"))
            .and(body_json(json!({"aliases": {"orders": {}}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "acknowledged": true,
                "rolled_over": true,
                "old_index": "orders-000001",
                "new_index": "orders-000002"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/orders-write/_rollover/orders-000001"))
            .respond_with(ResponseTemplate::new(400).set_body_string("resource_already_exists_exception"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let request = RolloverRequest {
            alias: "orders-write".into(),
            from: "orders-000001".into(),
            to: "orders-000002".into(),
            body: json!({"aliases": {"orders": {}}}),
        };
        client.rollover(&request).await.expect("rollover should succeed");

        let err = client
            .rollover(&RolloverRequest {
                to: "orders-000001".into(),
                ..request
            })
            .await
            .expect_err("existing target should fail");
        assert!(format!("{err:#}").contains("resource_already_exists_exception"), "{err:#}");
    }
}
