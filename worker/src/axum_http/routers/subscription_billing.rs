use std::{future::Future, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::usecases::subscription_billing::{BillingError, PassReport, SubscriptionBillingUseCase};

// Run example
//   curl -X POST "http://localhost:$SERVER_PORT_WORKER/internal/v1/billing/test-payment" \
//     -H "Authorization: Bearer $INTERNAL_BILLING_TOKEN"
//   curl "http://localhost:$SERVER_PORT_WORKER/internal/v1/billing/history?limit=20" \
//     -H "Authorization: Bearer $INTERNAL_BILLING_TOKEN"

#[derive(Clone)]
pub struct BillingRouteState {
    internal_token: Option<String>,
    usecase: Arc<SubscriptionBillingUseCase>,
}

pub fn routes(internal_token: Option<String>, usecase: Arc<SubscriptionBillingUseCase>) -> Router {
    Router::new()
        .route("/test-payment", post(test_payment))
        .route("/test-retry", post(test_retry))
        .route("/subscriptions", get(list_subscriptions))
        .route("/subscriptions/:id/diagnostics", get(subscription_diagnostics))
        .route("/history", get(list_history))
        .route("/upcoming", get(list_upcoming))
        .with_state(BillingRouteState {
            internal_token,
            usecase,
        })
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

pub async fn test_payment(State(state): State<BillingRouteState>, headers: HeaderMap) -> Response {
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    info!("billing router: manual monthly pass requested");

    let active_subscriptions = match state.usecase.count_active_subscriptions().await {
        Ok(count) => count,
        Err(err) => return billing_error_response("failed to count subscriptions", err),
    };

    let usecase = Arc::clone(&state.usecase);
    let pass = async move { usecase.run_monthly_billing_pass(Utc::now()).await };

    match run_detached(pass, "monthly billing pass failed").await {
        Ok(report) => Json(json!({
            "success": true,
            "message": pass_message(report.skipped, "monthly billing pass completed"),
            "active_subscriptions": active_subscriptions,
            "report": report,
        }))
        .into_response(),
        Err(response) => response,
    }
}

pub async fn test_retry(State(state): State<BillingRouteState>, headers: HeaderMap) -> Response {
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    info!("billing router: manual retry pass requested");

    let usecase = Arc::clone(&state.usecase);
    let pass = async move { usecase.run_failed_retry_pass(Utc::now()).await };

    match run_detached(pass, "retry pass failed").await {
        Ok(report) => Json(json!({
            "success": true,
            "message": pass_message(report.skipped, "retry pass completed"),
            "report": report,
        }))
        .into_response(),
        Err(response) => response,
    }
}

pub async fn list_subscriptions(
    State(state): State<BillingRouteState>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    match state.usecase.list_active_subscriptions().await {
        Ok(subscriptions) => Json(json!({
            "success": true,
            "count": subscriptions.len(),
            "data": subscriptions,
        }))
        .into_response(),
        Err(err) => billing_error_response("failed to list subscriptions", err),
    }
}

pub async fn list_history(
    State(state): State<BillingRouteState>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Response {
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    match state.usecase.list_recent_history(query.limit).await {
        Ok(history) => Json(json!({
            "success": true,
            "count": history.len(),
            "data": history,
        }))
        .into_response(),
        Err(err) => billing_error_response("failed to list billing history", err),
    }
}

pub async fn list_upcoming(State(state): State<BillingRouteState>, headers: HeaderMap) -> Response {
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    match state.usecase.list_upcoming(Utc::now()).await {
        Ok(upcoming) => Json(json!({
            "success": true,
            "count": upcoming.len(),
            "data": upcoming,
        }))
        .into_response(),
        Err(err) => billing_error_response("failed to list upcoming billings", err),
    }
}

pub async fn subscription_diagnostics(
    State(state): State<BillingRouteState>,
    headers: HeaderMap,
    Path(subscription_id): Path<Uuid>,
) -> Response {
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    match state
        .usecase
        .diagnose_subscription(subscription_id, Utc::now())
        .await
    {
        Ok(diagnostics) => Json(json!({
            "success": true,
            "data": diagnostics,
        }))
        .into_response(),
        Err(err) => billing_error_response("failed to diagnose subscription", err),
    }
}

/// Runs a charging pass on its own task. Dropping the request (timeout or client
/// disconnect) detaches the task instead of cancelling it between charge and save.
async fn run_detached<F>(pass: F, failure: &str) -> Result<PassReport, Response>
where
    F: Future<Output = Result<PassReport, BillingError>> + Send + 'static,
{
    match tokio::spawn(pass).await {
        Ok(Ok(report)) => Ok(report),
        Ok(Err(err)) => Err(billing_error_response(failure, err)),
        Err(join_err) => {
            error!(error = %join_err, "billing router: {failure}");
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                failure,
                &join_err.to_string(),
            ))
        }
    }
}

fn pass_message(skipped: bool, completed: &'static str) -> &'static str {
    if skipped {
        "a billing pass is already running"
    } else {
        completed
    }
}

fn authorize(state: &BillingRouteState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected_token) = state.internal_token.as_deref() else {
        return Err(error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "billing endpoints are disabled",
            "internal billing token is not configured",
        ));
    };

    authorize_bearer(headers, expected_token)
        .map_err(|status| error_response(status, "unauthorized", "invalid bearer token"))
}

fn authorize_bearer(headers: &HeaderMap, expected_token: &str) -> Result<(), StatusCode> {
    let auth = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if token == expected_token {
        Ok(())
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

fn billing_error_response(message: &str, err: BillingError) -> Response {
    match err {
        BillingError::SubscriptionNotFound(_) => {
            error_response(StatusCode::NOT_FOUND, message, &err.to_string())
        }
        BillingError::Persistence(_) => {
            error!(error = %err, "billing router: {message}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, message, &err.to_string())
        }
    }
}

fn error_response(status: StatusCode, message: &str, error: &str) -> Response {
    (
        status,
        Json(json!({
            "success": false,
            "message": message,
            "error": error,
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        InMemoryBillingStore, ScriptedGateway, billing_usecase, premium_user, subscription_due,
    };
    use axum::{body::Body, http::Request};
    use chrono::Duration;
    use serde_json::Value;
    use tower::ServiceExt;
    use tower_http::timeout::TimeoutLayer;

    const TOKEN: &str = "internal-token";

    fn router_with(store: &Arc<InMemoryBillingStore>, token: Option<&str>) -> Router {
        let usecase = Arc::new(billing_usecase(store, &ScriptedGateway::new()));
        routes(token.map(str::to_string), usecase)
    }

    fn request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn unconfigured_token_disables_endpoints() {
        let router = router_with(&InMemoryBillingStore::new(), None);

        let response = router
            .oneshot(request("GET", "/subscriptions", Some(TOKEN)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn wrong_bearer_is_rejected() {
        let router = router_with(&InMemoryBillingStore::new(), Some(TOKEN));

        let response = router
            .oneshot(request("POST", "/test-payment", Some("guess")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_payment_runs_a_monthly_pass() {
        let store = InMemoryBillingStore::new();
        let due = subscription_due(Uuid::new_v4(), Utc::now() - Duration::hours(1));
        store.insert_user(premium_user(due.customer_id));
        store.insert_subscription(due.clone());
        let router = router_with(&store, Some(TOKEN));

        let response = router
            .oneshot(request("POST", "/test-payment", Some(TOKEN)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["active_subscriptions"], 1);
        assert_eq!(body["report"]["succeeded"], 1);
        assert!(store.subscription(due.id).next_billing_date > due.next_billing_date);
    }

    #[tokio::test]
    async fn timed_out_request_lets_the_pass_finish_recording_the_charge() {
        let store = InMemoryBillingStore::new();
        let gateway = ScriptedGateway::gated();
        let due = subscription_due(Uuid::new_v4(), Utc::now() - Duration::hours(1));
        store.insert_user(premium_user(due.customer_id));
        store.insert_subscription(due.clone());
        let usecase = Arc::new(billing_usecase(&store, &gateway));
        let router = routes(Some(TOKEN.to_string()), Arc::clone(&usecase))
            .layer(TimeoutLayer::new(std::time::Duration::from_millis(100)));

        let response = router
            .oneshot(request("POST", "/test-payment", Some(TOKEN)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);

        gateway.entered.notified().await;
        assert!(usecase.is_running());
        gateway.release();

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while usecase.is_running() {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let charged = store.subscription(due.id);
        assert_eq!(gateway.calls().len(), 1);
        assert!(charged.next_billing_date > due.next_billing_date);
        assert_eq!(charged.retry_count, 0);
        assert_eq!(store.history_actions_for(due.id), vec!["payment_success"]);
    }

    #[tokio::test]
    async fn lists_active_subscriptions() {
        let store = InMemoryBillingStore::new();
        let active = subscription_due(Uuid::new_v4(), Utc::now() + Duration::days(3));
        store.insert_subscription(active.clone());
        let router = router_with(&store, Some(TOKEN));

        let response = router
            .oneshot(request("GET", "/subscriptions", Some(TOKEN)))
            .await
            .unwrap();

        let body = json_body(response).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["data"][0]["customer_id"], active.customer_id.to_string());
        assert_eq!(body["data"][0]["retry_count"], 0);
    }

    #[tokio::test]
    async fn unknown_subscription_diagnostics_is_not_found() {
        let router = router_with(&InMemoryBillingStore::new(), Some(TOKEN));
        let uri = format!("/subscriptions/{}/diagnostics", Uuid::new_v4());

        let response = router.oneshot(request("GET", &uri, Some(TOKEN))).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn history_accepts_limit_query() {
        let router = router_with(&InMemoryBillingStore::new(), Some(TOKEN));

        let response = router
            .oneshot(request("GET", "/history?limit=5", Some(TOKEN)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["count"], 0);
    }
}
