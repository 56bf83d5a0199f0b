//! # GET /bridge
//!
//! ブリッジページの読み込み。クエリパラメータを検証し、セッションを初期化する。
//!
//! - signOut: ログアウト後、オリジンへ303で戻る
//! - 初期化失敗: 202と `stalled` のページ情報（リダイレクトしない）
//! - それ以外: 200と承認画面用のページ情報。ページは承認・拒否まで保持する

use std::sync::Arc;

use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use uuid::Uuid;

use bridge_core::{ActionRequest, BridgeError, BridgeRequest, LoadOutcome};
use bridge_types::{PageStatus, PageView};

use super::see_other;
use crate::config::AppState;
use crate::error::ServerError;

/// GET /bridge — ページを読み込む。
pub async fn handle_bridge(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
) -> Result<Response, ServerError> {
    let page_url = format!("{}?{}", state.public_url, query.unwrap_or_default());
    let page_id = Uuid::new_v4();
    let mut orchestrator = state.new_orchestrator()?;

    tracing::info!(page_id = %page_id, "ページを読み込みます");
    match orchestrator.load(&page_url).await? {
        LoadOutcome::Redirect(redirect) => Ok(see_other(&redirect)),
        LoadOutcome::Stalled => {
            tracing::warn!(page_id = %page_id, "セッションを初期化できないため停止しました");
            let view = page_view(page_id, PageStatus::Stalled, None);
            Ok((StatusCode::ACCEPTED, Json(view)).into_response())
        }
        LoadOutcome::AwaitingApproval => {
            let view = page_view(page_id, PageStatus::AwaitingApproval, orchestrator.request());
            state.insert_page(page_id, orchestrator).await;
            Ok((StatusCode::OK, Json(view)).into_response())
        }
    }
}

/// GET /bridge/{page_id} — 承認待ちページの内容を返す。
pub async fn handle_page(
    State(state): State<Arc<AppState>>,
    Path(page_id): Path<Uuid>,
) -> Result<Json<PageView>, ServerError> {
    let page = state
        .page(page_id)
        .await
        .ok_or(ServerError::PageNotFound(page_id))?;
    let orchestrator = page
        .try_lock()
        .map_err(|_| BridgeError::InvalidState("ページは処理中です".to_string()))?;

    Ok(Json(page_view(
        page_id,
        PageStatus::AwaitingApproval,
        orchestrator.request(),
    )))
}

/// 承認画面に表示する内容を組み立てる。
pub(crate) fn page_view(
    page_id: Uuid,
    status: PageStatus,
    request: Option<&BridgeRequest>,
) -> PageView {
    let Some(request) = request else {
        return PageView {
            page_id: page_id.to_string(),
            status,
            action: None,
            origin_url: None,
            contract_id: None,
            login_provider: None,
            transactions: Vec::new(),
        };
    };

    let login_provider = match &request.action {
        ActionRequest::SignIn { login_provider, .. } => Some(login_provider.clone()),
        _ => None,
    };
    PageView {
        page_id: page_id.to_string(),
        status,
        action: Some(request.action.kind()),
        origin_url: Some(request.action.origin_url().to_string()),
        contract_id: request.contract_id.clone(),
        login_provider,
        transactions: request.action.transactions().to_vec(),
    }
}
