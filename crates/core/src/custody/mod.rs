//! # カストディプロバイダ抽象化
//!
//! 本人確認と鍵の預託を行う外部プロバイダのクライアントをトレイトで抽象化する。
//! 環境変数 `MOCK_CUSTODY` で実装を切り替える。
//!
//! 現在の実装:
//! - `mock` — ローカル開発・テスト用（決定的な秘密値をメモリ内で生成）
//! - `http` — カストディサービスへのJSON中継

pub mod http;
pub mod mock;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// ログインに使うアダプタ名
pub const OPENLOGIN_ADAPTER: &str = "openlogin";

/// 生の秘密鍵を要求するメソッド名
pub const PRIVATE_KEY_METHOD: &str = "private_key";

/// プロバイダに登録するチェーンの名前空間。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainNamespace {
    /// プロバイダが直接サポートしないチェーン（鍵のみ利用する）
    Other,
}

/// プロバイダに渡すチェーン設定。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    pub chain_namespace: ChainNamespace,
    /// チェーンのJSON-RPCノードURL
    pub rpc_target: String,
}

/// クライアント初期化時の設定。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustodyConfig {
    pub client_id: String,
    pub chain_config: ChainConfig,
}

/// ログイン画面の表示方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UxMode {
    Popup,
}

/// プロバイダが返す鍵の曲線。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Curve {
    Ed25519,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterSettings {
    pub client_id: String,
    /// プロバイダ側のネットワーク名
    pub network: String,
    pub ux_mode: UxMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginSettings {
    pub curve: Curve,
}

/// ログインアダプタの設定。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterConfig {
    pub adapter_settings: AdapterSettings,
    pub login_settings: LoginSettings,
}

impl AdapterConfig {
    /// ポップアップ方式・ed25519固定のopenloginアダプタ設定。
    pub fn openlogin(client_id: &str, network: &str) -> Self {
        Self {
            adapter_settings: AdapterSettings {
                client_id: client_id.to_string(),
                network: network.to_string(),
                ux_mode: UxMode::Popup,
            },
            login_settings: LoginSettings {
                curve: Curve::Ed25519,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        OPENLOGIN_ADAPTER
    }
}

/// 対話的ログインのオプション。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectOptions {
    /// ログインプロバイダ名 (例: "google")
    pub login_provider: String,
    /// ログインヒント（メールアドレス）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_hint: Option<String>,
}

/// プロバイダハンドルへのリクエスト。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub method: String,
}

impl ProviderRequest {
    pub fn private_key() -> Self {
        Self {
            method: PRIVATE_KEY_METHOD.to_string(),
        }
    }
}

/// カストディクライアントのエラー型。
#[derive(Debug, thiserror::Error)]
pub enum CustodyError {
    /// 指定されたアダプタが登録されていない
    #[error("アダプタが登録されていません: {0}")]
    AdapterNotConfigured(String),
    /// `init` 前の呼び出し
    #[error("カストディクライアントが初期化されていません")]
    NotInitialized,
    /// 対話的ログインの失敗
    #[error("ログインに失敗: {0}")]
    Login(String),
    /// プロバイダがエラーを返した
    #[error("カストディプロバイダがエラーを返しました: {0}")]
    Provider(String),
    /// カストディサービスとの通信失敗
    #[error("カストディサービスとの通信に失敗: {0}")]
    Transport(String),
}

/// ログイン済みプロバイダへのハンドル。
#[async_trait::async_trait]
pub trait ProviderHandle: Send + Sync {
    /// リクエストを送る。値が返らない場合は `None`。
    async fn request(&self, request: &ProviderRequest) -> Result<Option<String>, CustodyError>;
}

/// 共有可能なプロバイダハンドル
pub type SharedProvider = Arc<dyn ProviderHandle>;

/// カストディプロバイダのクライアント。
///
/// 1ページにつき1インスタンスを使い、`configure_adapter` → `init` の順で初期化する。
#[async_trait::async_trait]
pub trait CustodyClient: Send + Sync {
    /// ログインアダプタを登録する。
    fn configure_adapter(&mut self, adapter: AdapterConfig) -> Result<(), CustodyError>;

    /// クライアントを初期化する。キャッシュ済みのログインがあれば復元する。
    async fn init(&mut self, config: &CustodyConfig) -> Result<(), CustodyError>;

    /// 指定アダプタで対話的ログインを行い、プロバイダハンドルを返す。
    async fn connect_to(
        &mut self,
        adapter: &str,
        options: &ConnectOptions,
    ) -> Result<SharedProvider, CustodyError>;

    /// 接続済みのプロバイダハンドル（未接続なら `None`）。
    fn provider(&self) -> Option<SharedProvider>;

    /// セッションを終了する。
    async fn logout(&mut self) -> Result<(), CustodyError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// アダプタ設定がプロバイダの期待するJSON形式になることを確認
    #[test]
    fn test_adapter_config_json() {
        let adapter = AdapterConfig::openlogin("client-1", "testnet");
        assert_eq!(adapter.name(), "openlogin");
        assert_eq!(
            serde_json::to_value(&adapter).unwrap(),
            serde_json::json!({
                "adapterSettings": {"clientId": "client-1", "network": "testnet", "uxMode": "popup"},
                "loginSettings": {"curve": "ed25519"}
            })
        );

        let config = CustodyConfig {
            client_id: "client-1".to_string(),
            chain_config: ChainConfig {
                chain_namespace: ChainNamespace::Other,
                rpc_target: "https://rpc.testnet.near.org".to_string(),
            },
        };
        assert_eq!(
            serde_json::to_value(&config).unwrap()["chainConfig"]["chainNamespace"],
            "other"
        );
    }

    /// ログインヒントがない場合はフィールド自体を省略する
    #[test]
    fn test_connect_options_omit_hint() {
        let options = ConnectOptions {
            login_provider: "google".to_string(),
            login_hint: None,
        };
        assert_eq!(
            serde_json::to_string(&options).unwrap(),
            r#"{"loginProvider":"google"}"#
        );
    }
}
