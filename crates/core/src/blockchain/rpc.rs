//! # チェーンRPCクライアント
//!
//! NEAR JSON-RPC 2.0 ノードへのアクセス。
//!
//! ## 使用するメソッド
//! - `block` (finality: final) — 最新のファイナライズ済みブロックハッシュ
//! - `query` (request_type: view_access_key) — アクセスキーのnonce
//! - `broadcast_tx_commit` — 署名済みトランザクションの送信（Base64）

use std::sync::Arc;

use base64::Engine;
use serde::Deserialize;

use bridge_types::{ExecutionOutcome, NetworkPreset};

use crate::b64;

/// RPCエラー種別。
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// HTTP送信・受信の失敗
    #[error("RPC送信失敗: {0}")]
    Transport(String),
    /// ノードがエラーを返した
    #[error("ノードがエラーを返しました: {0}")]
    Node(String),
    /// レスポンスの形式が想定外
    #[error("RPCレスポンスが不正です: {0}")]
    InvalidResponse(String),
}

/// アクセスキーの照会結果。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccessKeyView {
    pub nonce: u64,
    pub block_hash: String,
}

/// チェーンRPCの抽象インターフェース。
#[async_trait::async_trait]
pub trait ChainRpc: Send + Sync {
    /// 最新のファイナライズ済みブロックハッシュ（Base58）。
    async fn latest_final_block_hash(&self) -> Result<String, RpcError>;

    /// アカウントのアクセスキーを照会する。
    async fn view_access_key(
        &self,
        account_id: &str,
        public_key: &str,
    ) -> Result<AccessKeyView, RpcError>;

    /// 署名済みトランザクションを送信し、実行結果を待つ。
    async fn send_transaction(&self, signed_tx: &[u8]) -> Result<ExecutionOutcome, RpcError>;
}

/// ネットワークプリセットからRPCクライアントを生成する。
pub trait RpcConnector: Send + Sync {
    fn connect(&self, preset: &NetworkPreset) -> Arc<dyn ChainRpc>;
}

/// HTTP JSON-RPCクライアント。
pub struct NearRpcClient {
    node_url: String,
    http_client: reqwest::Client,
}

impl NearRpcClient {
    pub fn new(node_url: &str, http_client: reqwest::Client) -> Self {
        Self {
            node_url: node_url.to_string(),
            http_client,
        }
    }

    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, RpcError> {
        let rpc_request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let rpc_response = self
            .http_client
            .post(&self.node_url)
            .json(&rpc_request)
            .send()
            .await
            .map_err(|e| RpcError::Transport(format!("{method}: {e}")))?;

        let rpc_body: serde_json::Value = rpc_response
            .json()
            .await
            .map_err(|e| RpcError::InvalidResponse(format!("{method}のレスポンスのパースに失敗: {e}")))?;

        if let Some(error) = rpc_body.get("error") {
            return Err(RpcError::Node(format!("{method}: {error}")));
        }

        rpc_body
            .get("result")
            .cloned()
            .ok_or_else(|| RpcError::InvalidResponse(format!("{method}のレスポンスにresultがありません")))
    }
}

#[async_trait::async_trait]
impl ChainRpc for NearRpcClient {
    async fn latest_final_block_hash(&self) -> Result<String, RpcError> {
        let result = self
            .call("block", serde_json::json!({"finality": "final"}))
            .await?;
        result
            .get("header")
            .and_then(|h| h.get("hash"))
            .and_then(|h| h.as_str())
            .map(str::to_string)
            .ok_or_else(|| RpcError::InvalidResponse("blockのレスポンスにheader.hashがありません".to_string()))
    }

    async fn view_access_key(
        &self,
        account_id: &str,
        public_key: &str,
    ) -> Result<AccessKeyView, RpcError> {
        let result = self
            .call(
                "query",
                serde_json::json!({
                    "request_type": "view_access_key",
                    "finality": "final",
                    "account_id": account_id,
                    "public_key": public_key,
                }),
            )
            .await?;

        // 古いノードはresult内にerrorを入れて返す
        if let Some(error) = result.get("error") {
            return Err(RpcError::Node(format!("view_access_key: {error}")));
        }
        serde_json::from_value(result)
            .map_err(|e| RpcError::InvalidResponse(format!("アクセスキーのパースに失敗: {e}")))
    }

    async fn send_transaction(&self, signed_tx: &[u8]) -> Result<ExecutionOutcome, RpcError> {
        let tx_b64 = b64().encode(signed_tx);
        let result = self
            .call("broadcast_tx_commit", serde_json::json!([tx_b64]))
            .await?;
        Ok(ExecutionOutcome(result))
    }
}

/// `NearRpcClient` を生成する接続ファクトリ。HTTPクライアントを共有する。
#[derive(Debug, Clone, Default)]
pub struct HttpRpcConnector {
    http_client: reqwest::Client,
    /// 設定時はプリセットのノードURLの代わりに使う
    node_override: Option<String>,
}

impl HttpRpcConnector {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            node_override: None,
        }
    }

    /// 全ネットワークで指定したノードに接続する。
    pub fn with_node_override(mut self, node_url: impl Into<String>) -> Self {
        self.node_override = Some(node_url.into());
        self
    }
}

impl RpcConnector for HttpRpcConnector {
    fn connect(&self, preset: &NetworkPreset) -> Arc<dyn ChainRpc> {
        let node_url = self.node_override.as_deref().unwrap_or(&preset.node_url);
        Arc::new(NearRpcClient::new(node_url, self.http_client.clone()))
    }
}
