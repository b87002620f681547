use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{stream, Stream};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    error::{AppError, AppResult},
    middleware::RequestId,
    models::{Category, InterestTerm, RawDemographics},
    services::{
        delivery::NoopObserver, ChannelObserver, RecommendationQuery, Resolution, RunEvent,
        RunReport, RunStatus,
    },
};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct ResolveParams {
    /// Comma-separated interest terms
    pub terms: String,
}

/// Either free text for the extraction service, or explicit terms
#[derive(Debug, Default, Deserialize)]
pub struct RecommendationRequest {
    pub text: Option<String>,
    #[serde(default)]
    pub terms: Vec<String>,
    pub demographics: Option<RawDemographics>,
    #[serde(default)]
    pub categories: Vec<Category>,
    /// Single-category mode
    pub category: Option<Category>,
}

impl RecommendationRequest {
    fn categories(&self) -> Vec<Category> {
        match self.category {
            Some(category) => vec![category],
            None => self.categories.clone(),
        }
    }
}

/// Health check endpoint
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

/// Resolves terms without running the rest of the pipeline
pub async fn resolve_terms(
    State(state): State<AppState>,
    Query(params): Query<ResolveParams>,
) -> AppResult<Json<Resolution>> {
    let terms = InterestTerm::parse_list(&params.terms);
    if terms.is_empty() {
        return Err(AppError::InvalidInput(
            "At least one interest term is required".to_string(),
        ));
    }

    let resolution = state.pipeline.resolver().resolve(&terms).await;
    Ok(Json(resolution))
}

/// Runs the whole pipeline and returns the run report
pub async fn recommend(
    State(state): State<AppState>,
    request_id: RequestId,
    Json(request): Json<RecommendationRequest>,
) -> AppResult<Json<RunReport>> {
    let query = build_query(&state, &request).await?;
    let report = state
        .pipeline
        .run(request_id.uuid(), &query, &NoopObserver)
        .await;
    Ok(Json(report))
}

/// Same as [`recommend`], streamed as Server-Sent Events: `seed` (free-text
/// runs only), `progress` per delivery transition, then `done` or `failed`
pub async fn recommend_stream(
    State(state): State<AppState>,
    request_id: RequestId,
    Json(request): Json<RecommendationRequest>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let query = build_query(&state, &request).await?;

    let (tx, events) = mpsc::unbounded_channel();
    let pipeline = state.pipeline.clone();
    let run = tokio::spawn(async move {
        let observer = ChannelObserver::new(tx);
        pipeline.run(request_id.uuid(), &query, &observer).await
    });

    let stream = stream::unfold(
        StreamState::Running { events, run },
        |state| async move {
            match state {
                StreamState::Running { mut events, run } => match events.recv().await {
                    Some(event) => Some((
                        Ok(run_event(&event)),
                        StreamState::Running { events, run },
                    )),
                    // The observer is dropped when the run ends
                    None => Some((Ok(final_event(run.await)), StreamState::Finished)),
                },
                StreamState::Finished => None,
            }
        },
    );

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

enum StreamState {
    Running {
        events: mpsc::UnboundedReceiver<RunEvent>,
        run: JoinHandle<RunReport>,
    },
    Finished,
}

fn run_event(event: &RunEvent) -> Event {
    match event {
        RunEvent::SeedMatches(matches) => sse_event("seed", matches),
        RunEvent::Delivery(update) => sse_event("progress", update),
    }
}

fn final_event(outcome: Result<RunReport, tokio::task::JoinError>) -> Event {
    match outcome {
        Ok(report) if report.status == RunStatus::Failed => sse_event("failed", &report),
        Ok(report) => sse_event("done", &report),
        Err(e) => {
            tracing::error!(error = %e, "Pipeline task aborted");
            sse_event("failed", &json!({ "status": "failed", "error": e.to_string() }))
        }
    }
}

fn sse_event<T: Serialize>(name: &str, data: &T) -> Event {
    Event::default()
        .event(name)
        .json_data(data)
        .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}

async fn build_query(
    state: &AppState,
    request: &RecommendationRequest,
) -> AppResult<RecommendationQuery> {
    let text = request
        .text
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());

    let mut query = match text {
        Some(text) => state.pipeline.query_from_text(text).await?,
        None => RecommendationQuery {
            terms: InterestTerm::unique(&request.terms),
            ..RecommendationQuery::default()
        },
    };

    if query.terms.is_empty() {
        return Err(AppError::InvalidInput(
            "At least one interest term is required".to_string(),
        ));
    }

    let categories = request.categories();
    if !categories.is_empty() {
        query.categories = categories;
    }
    // Explicit demographics override whatever extraction inferred
    if let Some(demographics) = &request.demographics {
        query.demographics = Some(demographics.normalize());
    }

    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_category_wins_over_list() {
        let request: RecommendationRequest = serde_json::from_value(json!({
            "terms": ["golf"],
            "categories": ["book", "movie"],
            "category": "place"
        }))
        .unwrap();

        assert_eq!(request.categories(), vec![Category::Place]);
    }

    #[test]
    fn test_request_accepts_text_only() {
        let request: RecommendationRequest =
            serde_json::from_value(json!({ "text": "my sister loves hiking" })).unwrap();

        assert!(request.terms.is_empty());
        assert!(request.categories().is_empty());
    }
}
