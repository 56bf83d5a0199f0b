//! # ブリッジサーバーのエンドポイント

pub mod approve;
pub mod bridge;
pub mod health;

pub use approve::{handle_approve, handle_reject};
pub use bridge::{handle_bridge, handle_page};
pub use health::handle_health;

use axum::response::{IntoResponse, Response};

/// オリジンへの遷移（303 See Other）。
pub(crate) fn see_other(redirect: &bridge_core::Redirect) -> Response {
    axum::response::Redirect::to(redirect.as_str()).into_response()
}
