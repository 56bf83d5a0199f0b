//! # GET /health

/// GET /health — 死活監視。
pub async fn handle_health() -> &'static str {
    "ok"
}
