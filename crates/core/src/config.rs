//! # ブリッジ設定
//!
//! オーケストレータ・セッション・署名エンジンが共有する設定値。
//! 環境変数からの読み込みはサーバー側（`bridge-server`）で行う。

use std::time::Duration;

/// 対象ネットワークのデフォルト値
pub const DEFAULT_NETWORK_ID: &str = "testnet";

/// カストディプロバイダ側ネットワークのデフォルト値
pub const DEFAULT_CUSTODY_NETWORK: &str = "testnet";

/// サインイン時に署名するメッセージのデフォルト値。
/// オリジンアプリケーション側の検証と一致させる必要がある。
pub const DEFAULT_SIGN_IN_MESSAGE: &str = "some message";

/// 外部呼び出し1回あたりのタイムアウト（秒）
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 60;

/// ブリッジ設定。
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// 鍵ストア・署名・RPCで使用するネットワーク ("mainnet" or "testnet")
    pub network_id: String,
    /// カストディプロバイダのアダプタに渡すネットワーク名
    pub custody_network: String,
    /// サインイン時の署名メッセージ
    pub sign_in_message: String,
    /// 外部呼び出し1回あたりのタイムアウト
    pub call_timeout: Duration,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            network_id: DEFAULT_NETWORK_ID.to_string(),
            custody_network: DEFAULT_CUSTODY_NETWORK.to_string(),
            sign_in_message: DEFAULT_SIGN_IN_MESSAGE.to_string(),
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
        }
    }
}
