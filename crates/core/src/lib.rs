//! # Custody Bridge コア
//!
//! オリジンアプリケーションから開かれたブリッジページ1回分の処理を担う。
//!
//! ## 処理フロー
//! 1. URLパラメータのパースと検証（`request`）
//! 2. カストディセッションの初期化と接続（`session`, `custody`）
//! 3. 秘密値からの鍵導出（`bridge-crypto`）
//! 4. メッセージ署名・トランザクション署名・順次ブロードキャスト（`signing`, `blockchain`）
//! 5. オリジンURLへのリダイレクト構築（`redirect`）
//!
//! 全体の状態遷移は `orchestrator::Orchestrator` が管理する。

pub mod blockchain;
pub mod config;
pub mod custody;
pub mod error;
pub mod guard;
pub mod network;
pub mod orchestrator;
pub mod redirect;
pub mod request;
pub mod session;
pub mod signing;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use config::BridgeSettings;
pub use error::BridgeError;
pub use guard::{CallGuard, CancelSignal};
pub use orchestrator::{LoadOutcome, Orchestrator, OrchestratorState};
pub use redirect::Redirect;
pub use request::{ActionRequest, BridgeRequest};

/// Base64エンジン（Standard）
pub(crate) fn b64() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::STANDARD
}
