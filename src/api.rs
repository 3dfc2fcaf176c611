use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::cache::{CacheError, DeploymentEventCache};
use crate::errors::FailureKind;
use crate::events::Event;

/// State shared across axum handlers.
struct AppState {
    cache: Arc<DeploymentEventCache>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    from: Option<u64>,
    to: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventsResponse {
    pub events: Vec<Event>,
    /// Whether every index of the requested range is present.
    pub complete: bool,
    /// Next index the cache will assign.
    pub last_event_index: u64,
}

pub fn router(cache: Arc<DeploymentEventCache>) -> Router {
    Router::new()
        .route("/deployments/{id}/events", get(deployment_events))
        .with_state(Arc::new(AppState { cache }))
}

/// Serve the events query API until the listener fails.
pub async fn serve(
    cache: Arc<DeploymentEventCache>,
    addr: SocketAddr,
) -> Result<(), std::io::Error> {
    log::info!("Starting events API on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(cache)).await
}

async fn deployment_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, (StatusCode, String)> {
    log::debug!("Events requested for {id}: {query:?}");
    let from = query.from.unwrap_or(0);
    if let Some(to) = query.to {
        if from > to {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("Invalid range: from {from} is greater than to {to}"),
            ));
        }
    }

    let value = state.cache.get(&id).await.map_err(error_response)?;

    let to = match query.to {
        Some(to) => Some(to),
        None => value.last_assigned_index().filter(|last| from <= *last),
    };
    let (events, complete) = match to {
        Some(to) => (
            value.events.range(from, to).into_iter().cloned().collect(),
            value.events.is_complete(from, to),
        ),
        // Nothing at or after `from` has been assigned yet.
        None => (Vec::new(), false),
    };

    Ok(Json(EventsResponse {
        events,
        complete,
        last_event_index: value.last_event_index,
    }))
}

fn error_response(e: CacheError) -> (StatusCode, String) {
    let status = match e.kind() {
        FailureKind::NotFound => StatusCode::NOT_FOUND,
        FailureKind::Transport => StatusCode::SERVICE_UNAVAILABLE,
        FailureKind::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status != StatusCode::NOT_FOUND {
        log::error!("Failed to read events: {e}");
    }
    (status, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDirectory, event_line, events_cache};

    fn state(directory: &Arc<FakeDirectory>) -> State<Arc<AppState>> {
        State(Arc::new(AppState {
            cache: events_cache(directory),
        }))
    }

    fn directory() -> Arc<FakeDirectory> {
        let directory = Arc::new(FakeDirectory::new());
        directory.add_process("shop.web", &[("deployment-id", "dep-1")]);
        directory.add_container("shop.web", "web-1", "10.0.0.1");
        for step in ["one", "two", "three"] {
            directory.log("web-1", &event_line("web", step));
        }
        directory
    }

    async fn query(
        directory: &Arc<FakeDirectory>,
        id: &str,
        from: Option<u64>,
        to: Option<u64>,
    ) -> Result<EventsResponse, (StatusCode, String)> {
        deployment_events(
            state(directory),
            Path(id.to_string()),
            Query(EventsQuery { from, to }),
        )
        .await
        .map(|Json(response)| response)
    }

    #[tokio::test]
    async fn test_events_default_range() {
        let response = query(&directory(), "dep-1", None, None)
            .await
            .expect("Expected events");
        assert_eq!(response.events.len(), 3);
        assert!(response.complete);
        assert_eq!(response.last_event_index, 3);
    }

    #[tokio::test]
    async fn test_events_range_past_the_end() {
        let response = query(&directory(), "dep-1", Some(2), Some(5))
            .await
            .expect("Expected events");
        assert_eq!(response.events.len(), 1);
        assert_eq!(response.events[0].index, 2);
        assert!(!response.complete);
    }

    #[tokio::test]
    async fn test_events_from_past_the_end_is_incomplete() {
        let response = query(&directory(), "dep-1", Some(10), None)
            .await
            .expect("Expected a response");
        assert!(response.events.is_empty());
        assert!(!response.complete, "Clients must keep polling for later events");
        assert_eq!(response.last_event_index, 3);

        let response = query(&directory(), "dep-1", Some(3), None)
            .await
            .expect("Expected a response");
        assert!(response.events.is_empty());
        assert!(!response.complete);
    }

    #[tokio::test]
    async fn test_events_before_anything_was_logged() {
        let directory = Arc::new(FakeDirectory::new());
        directory.add_process("shop.web", &[("deployment-id", "dep-1")]);
        directory.add_container("shop.web", "web-1", "10.0.0.1");

        let response = query(&directory, "dep-1", None, None)
            .await
            .expect("Expected a response");
        assert!(response.events.is_empty());
        assert!(!response.complete);
        assert_eq!(response.last_event_index, 0);
    }

    #[tokio::test]
    async fn test_events_invalid_range() {
        let (status, _) = query(&directory(), "dep-1", Some(3), Some(1))
            .await
            .expect_err("Expected a bad request");
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_events_unknown_deployment() {
        let (status, message) = query(&directory(), "dep-404", None, None)
            .await
            .expect_err("Expected not found");
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(message, "Deployment with id dep-404 does not exist");
    }

    #[tokio::test]
    async fn test_events_directory_unavailable() {
        let directory = directory();
        directory.set_failing(true);
        let (status, _) = query(&directory, "dep-1", None, None)
            .await
            .expect_err("Expected a failure");
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_events_response_json() {
        let response = query(&directory(), "dep-1", Some(0), Some(0))
            .await
            .expect("Expected events");
        let json = serde_json::to_value(&response).expect("Failed to serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "events": [{ "index": 0, "description": "[web-1/10.0.0.1] - web one" }],
                "complete": true,
                "last_event_index": 3,
            })
        );
    }
}
