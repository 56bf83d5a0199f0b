//! # サーバー設定・共有状態
//!
//! 環境変数からの設定読み込みとサーバーの共有状態の定義。
//!
//! | 環境変数 | デフォルト | 内容 |
//! |---------|-----------|------|
//! | `BIND_ADDR` | `0.0.0.0:3000` | 待ち受けアドレス |
//! | `BRIDGE_PUBLIC_URL` | `http://localhost:3000/bridge` | ブリッジページの公開URL |
//! | `BRIDGE_NETWORK_ID` | `testnet` | 署名・RPCの対象ネットワーク |
//! | `CUSTODY_NETWORK` | `testnet` | カストディプロバイダ側のネットワーク |
//! | `MOCK_CUSTODY` | `false` | `true` でモックカストディを使う |
//! | `CUSTODY_ENDPOINT` | `http://localhost:4000` | カストディ中継サービスのURL |
//! | `NEAR_RPC_URL` | なし | RPCノードURLの上書き |
//! | `BRIDGE_CALL_TIMEOUT_SECS` | `60` | 外部呼び出し1回あたりのタイムアウト |
//! | `SIGN_IN_MESSAGE` | `some message` | サインイン時の署名メッセージ |
//! | `BRIDGE_PAGE_TTL_SECS` | `900` | 承認待ちページの保持期間 |

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use uuid::Uuid;

use bridge_core::blockchain::rpc::RpcConnector;
use bridge_core::config::{DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_SIGN_IN_MESSAGE};
use bridge_core::custody::http::HttpCustody;
use bridge_core::custody::mock::{MockCustody, MockCustodyOptions};
use bridge_core::custody::CustodyClient;
use bridge_core::network::resolve_preset;
use bridge_core::{BridgeError, BridgeSettings, CancelSignal, Orchestrator};

/// 承認待ちページの保持期間のデフォルト（秒）
pub const DEFAULT_PAGE_TTL_SECS: u64 = 900;

/// カストディクライアントの実装選択。ページごとに新しいクライアントを作る。
#[derive(Debug, Clone)]
pub enum CustodyBackend {
    /// ローカル開発・テスト用のモック
    Mock(MockCustodyOptions),
    /// JSON中継サービス経由の実プロバイダ
    Http { endpoint: String },
}

impl CustodyBackend {
    pub fn client(&self, http_client: &reqwest::Client) -> Box<dyn CustodyClient> {
        match self {
            CustodyBackend::Mock(options) => Box::new(MockCustody::with_options(options.clone())),
            CustodyBackend::Http { endpoint } => {
                Box::new(HttpCustody::new(endpoint, http_client.clone()))
            }
        }
    }
}

/// 環境変数から読み込むサーバー設定。
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub public_url: String,
    pub settings: BridgeSettings,
    pub custody: CustodyBackend,
    pub rpc_url: Option<String>,
    pub page_ttl: Duration,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let public_url = std::env::var("BRIDGE_PUBLIC_URL").unwrap_or_else(|_| {
            tracing::warn!("BRIDGE_PUBLIC_URLが未設定です。localhostを使用します（開発環境用）");
            "http://localhost:3000/bridge".to_string()
        });

        let network_id = std::env::var("BRIDGE_NETWORK_ID").unwrap_or_else(|_| {
            tracing::warn!("BRIDGE_NETWORK_IDが未設定です。testnetを使用します");
            "testnet".to_string()
        });
        resolve_preset(&network_id)?;
        let custody_network =
            std::env::var("CUSTODY_NETWORK").unwrap_or_else(|_| network_id.clone());

        let call_timeout = match std::env::var("BRIDGE_CALL_TIMEOUT_SECS") {
            Ok(value) => value.parse::<u64>().map_err(|e| {
                anyhow::anyhow!("BRIDGE_CALL_TIMEOUT_SECSが不正です: {value} ({e})")
            })?,
            Err(_) => DEFAULT_CALL_TIMEOUT_SECS,
        };
        let page_ttl = match std::env::var("BRIDGE_PAGE_TTL_SECS") {
            Ok(value) => match value.parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    tracing::warn!(value = %value, "BRIDGE_PAGE_TTL_SECSが不正です。デフォルト値を使用します");
                    DEFAULT_PAGE_TTL_SECS
                }
            },
            Err(_) => DEFAULT_PAGE_TTL_SECS,
        };
        let sign_in_message = std::env::var("SIGN_IN_MESSAGE")
            .unwrap_or_else(|_| DEFAULT_SIGN_IN_MESSAGE.to_string());

        let mock_custody = std::env::var("MOCK_CUSTODY").unwrap_or_default() == "true";
        let custody = if mock_custody {
            tracing::warn!("MOCK_CUSTODY=true: モックカストディを使用します（開発環境用）");
            CustodyBackend::Mock(MockCustodyOptions::default())
        } else {
            let endpoint = std::env::var("CUSTODY_ENDPOINT").unwrap_or_else(|_| {
                tracing::warn!("CUSTODY_ENDPOINTが未設定です。localhostを使用します（開発環境用）");
                "http://localhost:4000".to_string()
            });
            CustodyBackend::Http { endpoint }
        };

        Ok(Self {
            bind_addr,
            public_url,
            settings: BridgeSettings {
                network_id,
                custody_network,
                sign_in_message,
                call_timeout: Duration::from_secs(call_timeout),
            },
            custody,
            rpc_url: std::env::var("NEAR_RPC_URL").ok(),
            page_ttl: Duration::from_secs(page_ttl),
        })
    }
}

/// 読み込み済みページ（承認待ちのオーケストレータ）。
pub type PageHandle = Arc<Mutex<Orchestrator>>;

/// ページマップの1エントリ。
pub struct PageEntry {
    pub handle: PageHandle,
    pub loaded_at: Instant,
}

/// サーバーの共有状態。
pub struct AppState {
    /// ブリッジページの公開URL（クエリを付けてオーケストレータに渡す）
    pub public_url: String,
    pub settings: BridgeSettings,
    pub custody: CustodyBackend,
    pub connector: Arc<dyn RpcConnector>,
    pub http_client: reqwest::Client,
    /// シャットダウン時に全ページの外部呼び出しを打ち切る
    pub shutdown: CancelSignal,
    /// 承認・拒否されないまま `page_ttl` を過ぎたページは破棄する
    pub page_ttl: Duration,
    pub pages: RwLock<HashMap<Uuid, PageEntry>>,
}

impl AppState {
    /// ページ1件分のオーケストレータを構築する。
    pub fn new_orchestrator(&self) -> Result<Orchestrator, BridgeError> {
        Orchestrator::new(
            self.settings.clone(),
            self.custody.client(&self.http_client),
            self.connector.clone(),
            self.shutdown.clone(),
        )
    }

    /// 保持期間内のページを返す。
    pub async fn page(&self, page_id: Uuid) -> Option<PageHandle> {
        let pages = self.pages.read().await;
        let entry = pages.get(&page_id)?;
        if entry.loaded_at.elapsed() >= self.page_ttl {
            return None;
        }
        Some(entry.handle.clone())
    }

    /// ページを登録する。登録のたびに保持期間を過ぎたページを破棄する。
    pub async fn insert_page(&self, page_id: Uuid, orchestrator: Orchestrator) {
        let mut pages = self.pages.write().await;
        let before = pages.len();
        pages.retain(|_, entry| entry.loaded_at.elapsed() < self.page_ttl);
        let expired = before - pages.len();
        if expired > 0 {
            tracing::info!(expired, "保持期間を過ぎたページを破棄しました");
        }
        pages.insert(
            page_id,
            PageEntry {
                handle: Arc::new(Mutex::new(orchestrator)),
                loaded_at: Instant::now(),
            },
        );
    }

    pub async fn remove_page(&self, page_id: Uuid) {
        self.pages.write().await.remove(&page_id);
    }
}
