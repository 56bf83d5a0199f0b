//! # サーバー エラー型

use axum::http::StatusCode;
use uuid::Uuid;

use bridge_core::BridgeError;

/// サーバーエラー型。
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// 読み込まれていない・処理済みのページ
    #[error("ページが見つかりません: {0}")]
    PageNotFound(Uuid),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl axum::response::IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            ServerError::PageNotFound(_) => StatusCode::NOT_FOUND,
            // バッチ中断は中断の原因で判定する
            ServerError::Bridge(e) => match e.root() {
                BridgeError::MissingParameter(_)
                | BridgeError::InvalidParameter(_)
                | BridgeError::TransactionSigning(_) => StatusCode::BAD_REQUEST,
                BridgeError::SessionNotReady(_) | BridgeError::InvalidState(_) => {
                    StatusCode::CONFLICT
                }
                BridgeError::SessionInit(_)
                | BridgeError::Custody(_)
                | BridgeError::NoSecret
                | BridgeError::Rpc(_)
                | BridgeError::BatchAborted { .. } => StatusCode::BAD_GATEWAY,
                BridgeError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                BridgeError::Cancelled(_) => StatusCode::SERVICE_UNAVAILABLE,
                BridgeError::KeyDerivation(_) | BridgeError::UnknownNetwork(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        };
        (status, self.to_string()).into_response()
    }
}
