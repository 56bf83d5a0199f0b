//! # POST /bridge/{page_id}/approve, POST /bridge/{page_id}/reject
//!
//! 承認待ちページの承認・拒否。処理を終えたページは破棄する。

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::Response;
use uuid::Uuid;

use bridge_core::{BridgeError, OrchestratorState};

use super::see_other;
use crate::config::AppState;
use crate::error::ServerError;

/// POST /bridge/{page_id}/approve — アクションを実行してオリジンへ戻る。
///
/// 失敗した場合はリダイレクトせずにエラーを返す。送信済みのトランザクションは取り消されない。
pub async fn handle_approve(
    State(state): State<Arc<AppState>>,
    Path(page_id): Path<Uuid>,
) -> Result<Response, ServerError> {
    let page = state
        .page(page_id)
        .await
        .ok_or(ServerError::PageNotFound(page_id))?;
    let mut orchestrator = page
        .try_lock()
        .map_err(|_| BridgeError::InvalidState("ページは処理中です".to_string()))?;

    tracing::info!(page_id = %page_id, "承認を受け付けました");
    let result = orchestrator.approve().await;
    release_if_finished(&state, page_id, orchestrator.state()).await;

    let redirect = result?;
    Ok(see_other(&redirect))
}

/// POST /bridge/{page_id}/reject — 何もせずにオリジンへ戻る。
pub async fn handle_reject(
    State(state): State<Arc<AppState>>,
    Path(page_id): Path<Uuid>,
) -> Result<Response, ServerError> {
    let page = state
        .page(page_id)
        .await
        .ok_or(ServerError::PageNotFound(page_id))?;
    let mut orchestrator = page
        .try_lock()
        .map_err(|_| BridgeError::InvalidState("ページは処理中です".to_string()))?;

    let result = orchestrator.reject();
    release_if_finished(&state, page_id, orchestrator.state()).await;

    let redirect = result?;
    Ok(see_other(&redirect))
}

async fn release_if_finished(state: &AppState, page_id: Uuid, page_state: OrchestratorState) {
    if matches!(
        page_state,
        OrchestratorState::Terminal | OrchestratorState::Failed
    ) {
        state.remove_page(page_id).await;
        tracing::info!(page_id = %page_id, state = ?page_state, "ページを破棄しました");
    }
}
