//! # アプリケーション構築
//!
//! ハンドラの State を受け取り、ルーターを組み立てる。
//! `main.rs` はインフラ初期化・バックグラウンドタスク起動・サーバー起動に集中する。

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::Request,
    routing::{get, post, put},
};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::handler::{
    MessageState,
    NotifyState,
    ReadinessState,
    RegistrationState,
    get_message,
    health_check,
    notify_email,
    notify_everyone,
    notify_organization,
    notify_space,
    notify_uaa_scope,
    notify_user,
    readiness_check,
    register_notifications,
};

/// ルーターが必要とする State 一式
pub struct AppStates {
    pub readiness:    Arc<ReadinessState>,
    pub notify:       Arc<NotifyState>,
    pub registration: Arc<RegistrationState>,
    pub message:      Arc<MessageState>,
}

/// ルーターを構築する
pub fn build_app(states: AppStates) -> Router {
    // レイヤー順序: 下に書いたものが外側
    // 1. SetRequestIdLayer（最外）: X-Request-Id がなければ生成する
    // 2. TraceLayer: リクエストスパンに request_id を含める
    // 3. PropagateRequestIdLayer: レスポンスヘッダーに X-Request-Id をコピー
    Router::new()
        .route("/health", get(health_check))
        .merge(
            Router::new()
                .route("/health/ready", get(readiness_check))
                .with_state(states.readiness),
        )
        .merge(
            Router::new()
                .route("/users/{user_guid}", post(notify_user))
                .route("/spaces/{space_guid}", post(notify_space))
                .route("/organizations/{org_guid}", post(notify_organization))
                .route("/everyone", post(notify_everyone))
                .route("/uaa_scopes/{scope}", post(notify_uaa_scope))
                .route("/emails", post(notify_email))
                .with_state(states.notify),
        )
        .merge(
            Router::new()
                .route("/notifications", put(register_notifications))
                .with_state(states.registration),
        )
        .merge(
            Router::new()
                .route("/messages/{message_id}", get(get_message))
                .with_state(states.message),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

fn make_request_span(request: &Request<Body>) -> tracing::Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id,
    )
}
