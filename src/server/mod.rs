use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use warp::{http::StatusCode, reject::Rejection, reply::Reply, Filter};

use crate::feed::{FeedCache, FeedError, FeedSource};
use crate::resolve::{resolve_batch, resolve_one, MatchOutcome, NormalizedQuery, StatusInfo};

/// One class lookup. Everything arrives as free text; normalization
/// happens in the resolver.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointRequest {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub section: String,
    #[serde(default)]
    pub session_type: String,
    #[serde(default)]
    pub start_time: String,
}

#[derive(Debug, Deserialize)]
pub struct BatchItem {
    #[serde(default)]
    pub key: String,
    #[serde(flatten)]
    pub query: PointRequest,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub classes: Vec<BatchItem>,
}

/// A resolve body is either a batch (`classes` present) or a single
/// point query. Batch first: the point variant accepts any object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ResolveRequest {
    Batch(BatchRequest),
    Point(PointRequest),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointResult {
    pub ok: bool,
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classroom: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub substitute_teacher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<MatchOutcome> for PointResult {
    fn from(outcome: MatchOutcome) -> Self {
        match outcome {
            MatchOutcome::MissingField(field) => PointResult {
                ok: false,
                found: false,
                classroom: None,
                status: None,
                substitute_teacher: None,
                observation: None,
                error: Some(format!("missing required field: {}", field)),
            },
            MatchOutcome::NotFound => PointResult {
                ok: true,
                found: false,
                classroom: None,
                status: None,
                substitute_teacher: None,
                observation: None,
                error: None,
            },
            MatchOutcome::Found(resolved) => PointResult {
                ok: true,
                found: true,
                classroom: Some(resolved.classroom),
                status: Some(resolved.status),
                substitute_teacher: Some(resolved.substitute_teacher),
                observation: Some(resolved.observation),
                error: None,
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PointEnvelope {
    #[serde(flatten)]
    result: PointResult,
    from_cache: bool,
    cooldown_ms: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchEnvelope {
    ok: bool,
    from_cache: bool,
    cooldown_ms: u64,
    results: HashMap<String, PointResult>,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    ok: bool,
    error: String,
    debug: String,
}

fn normalized(query: &PointRequest) -> NormalizedQuery {
    NormalizedQuery::new(
        &query.subject,
        &query.section,
        &query.session_type,
        &query.start_time,
    )
}

fn feed_failure(err: &FeedError) -> warp::reply::WithStatus<warp::reply::Json> {
    warn!(error = %err, debug = %err.debug_token(), "feed refresh failed");
    warp::reply::with_status(
        warp::reply::json(&ErrorEnvelope {
            ok: false,
            error: err.to_string(),
            debug: err.debug_token(),
        }),
        StatusCode::BAD_GATEWAY,
    )
}

/// Answer a resolve body. One `get_or_refresh` per request: a batch of
/// any size reads the snapshot exactly once.
pub async fn handle_resolve<S: FeedSource>(
    request: ResolveRequest,
    cache: Arc<FeedCache<S>>,
) -> Result<impl Reply, Rejection> {
    let view = match cache.get_or_refresh().await {
        Ok(view) => view,
        Err(err) => return Ok(feed_failure(&err)),
    };
    let cooldown_ms = view.remaining_ttl.as_millis() as u64;
    let cols = view.snapshot.columns();
    let data_rows = view.snapshot.data_rows();

    match request {
        ResolveRequest::Batch(batch) => {
            info!(classes = batch.classes.len(), "batch resolve");
            // Unkeyed items have no slot to report under.
            let items: Vec<(String, NormalizedQuery)> = batch
                .classes
                .iter()
                .filter(|item| !item.key.is_empty())
                .map(|item| (item.key.clone(), normalized(&item.query)))
                .collect();
            let results: HashMap<String, PointResult> = resolve_batch(items, data_rows, cols)
                .into_iter()
                .map(|(key, outcome)| (key, PointResult::from(outcome)))
                .collect();
            Ok(warp::reply::with_status(
                warp::reply::json(&BatchEnvelope {
                    ok: true,
                    from_cache: view.from_cache,
                    cooldown_ms,
                    results,
                }),
                StatusCode::OK,
            ))
        }
        ResolveRequest::Point(point) => {
            let outcome = resolve_one(&normalized(&point), data_rows, cols);
            // Caller input errors get a client-error status; "no
            // match" stays a successful empty result.
            let status = if matches!(outcome, MatchOutcome::MissingField(_)) {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::OK
            };
            Ok(warp::reply::with_status(
                warp::reply::json(&PointEnvelope {
                    result: PointResult::from(outcome),
                    from_cache: view.from_cache,
                    cooldown_ms,
                }),
                status,
            ))
        }
    }
}

pub async fn handle_health() -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&serde_json::json!({
        "status": "healthy",
        "service": "aulario-classroom-resolver"
    })))
}

fn with_cache<S: FeedSource + 'static>(
    cache: Arc<FeedCache<S>>,
) -> impl Filter<Extract = (Arc<FeedCache<S>>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&cache))
}

/// `GET /health` plus `POST /resolve`.
pub fn routes<S: FeedSource + 'static>(
    cache: Arc<FeedCache<S>>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let health = warp::path("health").and(warp::get()).and_then(handle_health);

    let resolve = warp::path("resolve")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_cache(cache))
        .and_then(handle_resolve);

    health.or(resolve)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FeedError;
    use serde_json::{json, Value};
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SAMPLE_FEED: &str = "\
id,carrera,ano,materia,seccion,tipo,prof titular,observacion,reemplazo,hora inicio,hora fin,aula,estado\n\
1,IS,1,Algebra II,A,T,Gomez,,,08:00,10:00,101,P\n\
2,IS,1,Algebra II,A,T,Gomez,,,14:00,16:00,305,\n\
3,IS,1,Quimica,B,P,Perez,traslado,Suarez,10:00,12:00,Lab 1,R\n";

    struct CountingSource {
        body: Result<String, u16>,
        fetches: Arc<AtomicUsize>,
    }

    impl FeedSource for CountingSource {
        fn fetch(&self) -> impl Future<Output = Result<String, FeedError>> + Send {
            async move {
                self.fetches.fetch_add(1, Ordering::SeqCst);
                match &self.body {
                    Ok(body) => Ok(body.clone()),
                    Err(status) => Err(FeedError::Unreachable {
                        status: Some(*status),
                        detail: format!("HTTP {}", status),
                    }),
                }
            }
        }
    }

    /// Cache over a scripted body plus a handle on the fetch counter.
    fn test_cache(
        body: Result<&str, u16>,
    ) -> (Arc<FeedCache<CountingSource>>, Arc<AtomicUsize>) {
        let fetches = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            body: body.map(str::to_string),
            fetches: Arc::clone(&fetches),
        };
        (Arc::new(FeedCache::new(source)), fetches)
    }

    async fn post_resolve(
        cache: &Arc<FeedCache<CountingSource>>,
        body: &Value,
    ) -> (StatusCode, Value) {
        let response = warp::test::request()
            .method("POST")
            .path("/resolve")
            .json(body)
            .reply(&routes(Arc::clone(cache)))
            .await;
        let parsed: Value = serde_json::from_slice(response.body()).expect("json body");
        (response.status(), parsed)
    }

    #[tokio::test]
    async fn point_query_resolves_a_classroom() {
        let (cache, _fetches) = test_cache(Ok(SAMPLE_FEED));
        let (status, body) = post_resolve(
            &cache,
            &json!({
                "subject": "álgebra II",
                "section": "a",
                "sessionType": "Teórico",
                "startTime": "8:05"
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], json!(true));
        assert_eq!(body["found"], json!(true));
        assert_eq!(body["classroom"], json!("101"));
        assert_eq!(body["status"]["code"], json!("P"));
        assert_eq!(body["fromCache"], json!(false));
        assert!(body["cooldownMs"].as_u64().unwrap() <= 60_000);
    }

    #[tokio::test]
    async fn second_request_is_served_from_cache() {
        let (cache, fetches) = test_cache(Ok(SAMPLE_FEED));
        let query = json!({"subject": "Quimica", "section": "B", "sessionType": "P"});

        let (_, first) = post_resolve(&cache, &query).await;
        let (_, second) = post_resolve(&cache, &query).await;

        assert_eq!(first["fromCache"], json!(false));
        assert_eq!(second["fromCache"], json!(true));
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        // Substitution status carries the substitute teacher through.
        assert_eq!(second["status"]["code"], json!("R"));
        assert_eq!(second["substituteTeacher"], json!("Suarez"));
        assert_eq!(second["observation"], json!("traslado"));
    }

    #[tokio::test]
    async fn missing_required_field_is_a_client_error() {
        let (cache, _fetches) = test_cache(Ok(SAMPLE_FEED));
        let (status, body) = post_resolve(
            &cache,
            &json!({"subject": "Algebra II", "sessionType": "T"}),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["ok"], json!(false));
        assert_eq!(body["found"], json!(false));
        assert_eq!(body["error"], json!("missing required field: section"));
    }

    #[tokio::test]
    async fn no_match_is_a_successful_empty_result() {
        let (cache, _fetches) = test_cache(Ok(SAMPLE_FEED));
        let (status, body) = post_resolve(
            &cache,
            &json!({"subject": "Historia", "section": "A", "sessionType": "T"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], json!(true));
        assert_eq!(body["found"], json!(false));
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn batch_of_five_issues_exactly_one_fetch() {
        let (cache, fetches) = test_cache(Ok(SAMPLE_FEED));
        let classes: Vec<Value> = (0..5)
            .map(|i| {
                json!({
                    "key": format!("c{}", i),
                    "subject": "Algebra II",
                    "section": "A",
                    "sessionType": "T",
                    "startTime": "14:00"
                })
            })
            .collect();

        let (status, body) = post_resolve(&cache, &json!({ "classes": classes })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(body["ok"], json!(true));
        let results = body["results"].as_object().unwrap();
        assert_eq!(results.len(), 5);
        assert_eq!(results["c3"]["classroom"], json!("305"));
    }

    #[tokio::test]
    async fn batch_embeds_per_item_errors_and_skips_unkeyed_items() {
        let (cache, _fetches) = test_cache(Ok(SAMPLE_FEED));
        let (status, body) = post_resolve(
            &cache,
            &json!({
                "classes": [
                    {"key": "good", "subject": "Quimica", "section": "B", "sessionType": "P"},
                    {"key": "bad", "subject": "Quimica", "sessionType": "P"},
                    {"subject": "Quimica", "section": "B", "sessionType": "P"}
                ]
            }),
        )
        .await;

        // One bad item never fails the batch.
        assert_eq!(status, StatusCode::OK);
        let results = body["results"].as_object().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results["good"]["found"], json!(true));
        assert_eq!(results["bad"]["ok"], json!(false));
        assert_eq!(
            results["bad"]["error"],
            json!("missing required field: section")
        );
    }

    #[tokio::test]
    async fn login_page_feed_maps_to_bad_gateway_with_diagnostics() {
        let (cache, _fetches) = test_cache(Ok(
            "<html><body>redirecting to accounts.google.com signin</body></html>",
        ));
        let (status, body) = post_resolve(
            &cache,
            &json!({"subject": "Algebra II", "section": "A", "sessionType": "T"}),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["ok"], json!(false));
        assert!(body["error"].as_str().unwrap().contains("login/permission"));
        assert!(body["debug"]
            .as_str()
            .unwrap()
            .starts_with("html_in_response"));
    }

    #[tokio::test]
    async fn unreachable_feed_carries_the_http_status() {
        let (cache, _fetches) = test_cache(Err(503));
        let (status, body) = post_resolve(
            &cache,
            &json!({"subject": "Algebra II", "section": "A", "sessionType": "T"}),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["debug"], json!("http=503"));
    }

    #[tokio::test]
    async fn health_endpoint_responds() {
        let (cache, _fetches) = test_cache(Ok(SAMPLE_FEED));
        let response = warp::test::request()
            .method("GET")
            .path("/health")
            .reply(&routes(cache))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["status"], json!("healthy"));
    }
}
