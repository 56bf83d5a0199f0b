//! # Custody Bridge Server
//!
//! 外部アプリケーションからのブラウザ遷移を受け、カストディプロバイダで
//! ログインした鍵で署名し、結果をオリジンURLへ返すブリッジページをHTTPで提供する。
//!
//! ## API エンドポイント
//! - `GET /bridge?<params>` — ページ読み込み（signOutは即時リダイレクト）
//! - `GET /bridge/{page_id}` — 承認待ちページの内容
//! - `POST /bridge/{page_id}/approve` — 承認して実行、オリジンへリダイレクト
//! - `POST /bridge/{page_id}/reject` — 拒否してオリジンへリダイレクト
//! - `GET /health` — 死活監視

mod config;
mod endpoints;
mod error;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use bridge_core::blockchain::rpc::HttpRpcConnector;
use bridge_core::CancelSignal;

use crate::config::{AppState, ServerConfig};
use crate::endpoints::{handle_approve, handle_bridge, handle_health, handle_page, handle_reject};

/// ルーティングを構築する。
fn app(state: Arc<AppState>) -> axum::Router {
    axum::Router::new()
        .route("/bridge", axum::routing::get(handle_bridge))
        .route("/bridge/{page_id}", axum::routing::get(handle_page))
        .route("/bridge/{page_id}/approve", axum::routing::post(handle_approve))
        .route("/bridge/{page_id}/reject", axum::routing::post(handle_reject))
        .route("/health", axum::routing::get(handle_health))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = ServerConfig::from_env()?;
    let http_client = reqwest::Client::new();

    let mut connector = HttpRpcConnector::new(http_client.clone());
    if let Some(rpc_url) = &config.rpc_url {
        tracing::info!(rpc_url = %rpc_url, "RPCノードURLを上書きします");
        connector = connector.with_node_override(rpc_url.clone());
    }

    let shutdown = CancelSignal::new();
    let state = Arc::new(AppState {
        public_url: config.public_url.clone(),
        settings: config.settings.clone(),
        custody: config.custody.clone(),
        connector: Arc::new(connector),
        http_client,
        shutdown: shutdown.clone(),
        page_ttl: config.page_ttl,
        pages: Default::default(),
    });
    tracing::info!(
        network_id = %config.settings.network_id,
        custody_network = %config.settings.custody_network,
        call_timeout_secs = config.settings.call_timeout.as_secs(),
        page_ttl_secs = config.page_ttl.as_secs(),
        "ブリッジ設定を読み込みました"
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("ブリッジサーバーを {} で起動します", config.bind_addr);
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    Ok(())
}

/// Ctrl-Cを待ち、処理中の外部呼び出しを打ち切る。
async fn shutdown_signal(shutdown: CancelSignal) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "シグナルの待機に失敗しました");
    }
    tracing::info!("シャットダウンします");
    shutdown.cancel();
}
