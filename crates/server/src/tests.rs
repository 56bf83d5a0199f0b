use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::to_bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base58::ToBase58;
use base64::Engine;
use uuid::Uuid;

use bridge_core::blockchain::rpc::HttpRpcConnector;
use bridge_core::custody::mock::{derive_mock_secret, MockCustodyOptions};
use bridge_core::custody::ConnectOptions;
use bridge_core::request::encode_payload;
use bridge_core::{BridgeError, BridgeSettings, CancelSignal};
use bridge_crypto::derive_key_material;
use bridge_types::{Action, PageStatus, PageView, Transaction, TransferAction};

use super::*;
use crate::config::CustodyBackend;
use crate::error::ServerError;

const CLIENT_ID: &str = "client-1";
const ORIGIN: &str = "https://app.example/cb";

/// broadcast_tx_commitで受け取ったトランザクション（Base64）
type Broadcasts = Arc<Mutex<Vec<String>>>;

/// モックNEARノードを起動する
async fn start_mock_node() -> (String, Broadcasts) {
    let broadcasts: Broadcasts = Arc::default();
    let recorded = broadcasts.clone();
    let app = axum::Router::new().route(
        "/",
        axum::routing::post(move |Json(body): Json<serde_json::Value>| {
            let recorded = recorded.clone();
            async move {
                let result = match body["method"].as_str().unwrap() {
                    "block" => serde_json::json!({"header": {"hash": ([7u8; 32].to_base58())}}),
                    "query" => serde_json::json!({
                        "nonce": 5, "permission": "FullAccess",
                        "block_hash": ([7u8; 32].to_base58()), "block_height": 1}),
                    "broadcast_tx_commit" => {
                        let tx = body["params"][0].as_str().unwrap().to_string();
                        let mut recorded = recorded.lock().unwrap();
                        recorded.push(tx);
                        serde_json::json!({
                            "status": {"SuccessValue": ""},
                            "transaction": {"hash": format!("tx-{}", recorded.len() - 1)}})
                    }
                    other => panic!("未知のメソッド: {other}"),
                };
                Json(serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": result}))
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    (format!("http://127.0.0.1:{port}"), broadcasts)
}

/// テスト用AppStateを構築するヘルパー
fn test_state(node_url: &str, custody: MockCustodyOptions) -> Arc<AppState> {
    test_state_with_ttl(node_url, custody, Duration::from_secs(900))
}

fn test_state_with_ttl(
    node_url: &str,
    custody: MockCustodyOptions,
    page_ttl: Duration,
) -> Arc<AppState> {
    let http_client = reqwest::Client::new();
    Arc::new(AppState {
        public_url: "http://localhost:3000/bridge".to_string(),
        settings: BridgeSettings {
            call_timeout: Duration::from_secs(5),
            ..Default::default()
        },
        custody: CustodyBackend::Mock(custody),
        connector: Arc::new(
            HttpRpcConnector::new(http_client.clone()).with_node_override(node_url),
        ),
        http_client,
        shutdown: CancelSignal::new(),
        page_ttl,
        pages: Default::default(),
    })
}

/// signInの承認待ちページを読み込み、ページIDを返す
async fn load_sign_in_page(state: &Arc<AppState>) -> Uuid {
    let response = handle_bridge(
        State(state.clone()),
        RawQuery(query(&[
            ("action", "signIn"),
            ("clientId", CLIENT_ID),
            ("loginProvider", "google"),
            ("originUrl", ORIGIN),
        ])),
    )
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    page_view(response).await.page_id.parse().unwrap()
}

fn restored_login() -> MockCustodyOptions {
    MockCustodyOptions {
        cached_login: Some(ConnectOptions {
            login_provider: "google".to_string(),
            login_hint: None,
        }),
        ..Default::default()
    }
}

fn query(params: &[(&str, &str)]) -> Option<String> {
    let mut url = url::Url::parse("http://localhost/").unwrap();
    for (k, v) in params {
        url.query_pairs_mut().append_pair(k, v);
    }
    url.query().map(str::to_string)
}

fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

async fn page_view(response: Response) -> PageView {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn status_of(error: ServerError) -> StatusCode {
    error.into_response().status()
}

/// signIn: 承認待ちページが作られ、承認で署名付きリダイレクトが返ることを確認
#[tokio::test]
async fn test_sign_in_page_flow() {
    let (node_url, _) = start_mock_node().await;
    let state = test_state(&node_url, MockCustodyOptions::default());

    let response = handle_bridge(
        State(state.clone()),
        RawQuery(query(&[
            ("action", "signIn"),
            ("clientId", CLIENT_ID),
            ("loginProvider", "google"),
            ("originUrl", ORIGIN),
        ])),
    )
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let view = page_view(response).await;
    assert_eq!(view.status, PageStatus::AwaitingApproval);
    assert_eq!(view.origin_url.as_deref(), Some(ORIGIN));
    assert_eq!(view.login_provider.as_deref(), Some("google"));
    let page_id: Uuid = view.page_id.parse().unwrap();

    let shown = handle_page(State(state.clone()), Path(page_id)).await.unwrap();
    assert_eq!(shown.0, view);

    let response = handle_approve(State(state.clone()), Path(page_id)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = location(&response);
    assert!(location.starts_with("https://app.example/cb?web3authVerify="));
    assert!(location.contains("&signature="));

    // 処理済みのページは破棄される
    let result = handle_approve(State(state), Path(page_id)).await;
    assert!(matches!(result, Err(ServerError::PageNotFound(_))));
}

/// signOut: ページを作らずに即時リダイレクトする
#[tokio::test]
async fn test_sign_out_redirects() {
    let (node_url, _) = start_mock_node().await;
    let state = test_state(&node_url, restored_login());

    let response = handle_bridge(
        State(state.clone()),
        RawQuery(query(&[
            ("action", "signOut"),
            ("clientId", CLIENT_ID),
            ("originUrl", ORIGIN),
        ])),
    )
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), ORIGIN);
    assert!(state.pages.read().await.is_empty());
}

/// 必須パラメータの欠落・クエリなしは400
#[tokio::test]
async fn test_validation_errors_are_bad_request() {
    let (node_url, _) = start_mock_node().await;
    let state = test_state(&node_url, MockCustodyOptions::default());

    let missing_origin = handle_bridge(
        State(state.clone()),
        RawQuery(query(&[("action", "signIn"), ("clientId", CLIENT_ID)])),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        missing_origin,
        ServerError::Bridge(BridgeError::MissingParameter("originUrl"))
    ));
    assert_eq!(status_of(missing_origin), StatusCode::BAD_REQUEST);

    let no_query = handle_bridge(State(state.clone()), RawQuery(None))
        .await
        .unwrap_err();
    assert_eq!(status_of(no_query), StatusCode::BAD_REQUEST);
    assert!(state.pages.read().await.is_empty());
}

/// 初期化失敗は202とstalledを返し、ページを保持しない
#[tokio::test]
async fn test_init_failure_returns_stalled() {
    let (node_url, _) = start_mock_node().await;
    let state = test_state(
        &node_url,
        MockCustodyOptions {
            fail_init: true,
            ..Default::default()
        },
    );

    let response = handle_bridge(
        State(state.clone()),
        RawQuery(query(&[
            ("action", "signOut"),
            ("clientId", CLIENT_ID),
            ("originUrl", ORIGIN),
        ])),
    )
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(response.headers().get(header::LOCATION).is_none());

    let view = page_view(response).await;
    assert_eq!(view.status, PageStatus::Stalled);
    assert!(view.action.is_none());
    assert!(state.pages.read().await.is_empty());
}

/// signAndSendTransactions: 承認で全件を順に送信し、オリジンへそのまま戻る
#[tokio::test]
async fn test_sign_and_send_page_flow() {
    let (node_url, broadcasts) = start_mock_node().await;
    let state = test_state(&node_url, restored_login());

    let account_id = derive_key_material(&derive_mock_secret(CLIENT_ID, "google", None))
        .unwrap()
        .account_id;
    let batch: Vec<Transaction> = ["first.testnet", "second.testnet"]
        .iter()
        .map(|receiver_id| Transaction {
            signer_id: account_id.clone(),
            receiver_id: receiver_id.to_string(),
            actions: vec![Action::Transfer(TransferAction {
                deposit: "1".to_string(),
            })],
        })
        .collect();

    let response = handle_bridge(
        State(state.clone()),
        RawQuery(query(&[
            ("action", "signAndSendTransactions"),
            ("clientId", CLIENT_ID),
            ("originUrl", ORIGIN),
            ("transactions", &encode_payload(&batch).unwrap()),
        ])),
    )
    .await
    .unwrap();
    let view = page_view(response).await;
    assert_eq!(view.transactions, batch);
    let page_id: Uuid = view.page_id.parse().unwrap();

    let response = handle_approve(State(state.clone()), Path(page_id)).await.unwrap();
    assert_eq!(location(&response), ORIGIN);

    let broadcasts = broadcasts.lock().unwrap().clone();
    assert_eq!(broadcasts.len(), 2);
    for tx in &broadcasts {
        assert!(base64::engine::general_purpose::STANDARD.decode(tx).is_ok());
    }
    assert!(state.pages.read().await.is_empty());
}

/// 拒否はオリジンへそのまま戻り、何も送信しない
#[tokio::test]
async fn test_reject_page() {
    let (node_url, broadcasts) = start_mock_node().await;
    let state = test_state(&node_url, restored_login());

    let response = handle_bridge(
        State(state.clone()),
        RawQuery(query(&[
            ("action", "signIn"),
            ("clientId", CLIENT_ID),
            ("loginProvider", "google"),
            ("originUrl", "https://app.example/cb?state=1"),
        ])),
    )
    .await
    .unwrap();
    let page_id: Uuid = page_view(response).await.page_id.parse().unwrap();

    let response = handle_reject(State(state.clone()), Path(page_id)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "https://app.example/cb?state=1");
    assert!(broadcasts.lock().unwrap().is_empty());
    assert!(state.pages.read().await.is_empty());
}

/// 未知のページは404
#[tokio::test]
async fn test_unknown_page_not_found() {
    let (node_url, _) = start_mock_node().await;
    let state = test_state(&node_url, MockCustodyOptions::default());

    let error = handle_reject(State(state), Path(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert_eq!(status_of(error), StatusCode::NOT_FOUND);
}

/// エラー種別とHTTPステータスの対応を確認
#[test]
fn test_error_status_mapping() {
    let cases = [
        (BridgeError::InvalidParameter("x".into()), StatusCode::BAD_REQUEST),
        (BridgeError::InvalidState("x".into()), StatusCode::CONFLICT),
        (BridgeError::SessionNotReady("x".into()), StatusCode::CONFLICT),
        (BridgeError::Rpc("x".into()), StatusCode::BAD_GATEWAY),
        (BridgeError::Custody("x".into()), StatusCode::BAD_GATEWAY),
        (BridgeError::Timeout("broadcast"), StatusCode::GATEWAY_TIMEOUT),
        (BridgeError::Cancelled("login"), StatusCode::SERVICE_UNAVAILABLE),
        (
            BridgeError::BatchAborted {
                committed: Vec::new(),
                source: Box::new(BridgeError::Timeout("broadcast")),
            },
            StatusCode::GATEWAY_TIMEOUT,
        ),
    ];
    for (error, expected) in cases {
        assert_eq!(status_of(ServerError::Bridge(error)), expected);
    }
}

/// 処理中のページへの承認・拒否・表示は409を返し、ページは残ることを確認
#[tokio::test]
async fn test_busy_page_conflicts() {
    let (node_url, _) = start_mock_node().await;
    let state = test_state(&node_url, MockCustodyOptions::default());
    let page_id = load_sign_in_page(&state).await;

    let page = state.page(page_id).await.unwrap();
    let held = page.lock().await;

    let approve = handle_approve(State(state.clone()), Path(page_id))
        .await
        .unwrap_err();
    assert!(matches!(
        approve,
        ServerError::Bridge(BridgeError::InvalidState(_))
    ));
    assert_eq!(status_of(approve), StatusCode::CONFLICT);

    let reject = handle_reject(State(state.clone()), Path(page_id))
        .await
        .unwrap_err();
    assert_eq!(status_of(reject), StatusCode::CONFLICT);

    let shown = handle_page(State(state.clone()), Path(page_id))
        .await
        .unwrap_err();
    assert_eq!(status_of(shown), StatusCode::CONFLICT);
    assert!(state.pages.read().await.contains_key(&page_id));

    // ロック解放後は通常どおり承認できる
    drop(held);
    let response = handle_approve(State(state.clone()), Path(page_id))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(state.pages.read().await.is_empty());
}

/// 保持期間を過ぎたページは参照できず、次のページ登録時に破棄されることを確認
#[tokio::test]
async fn test_expired_pages_are_evicted() {
    let (node_url, _) = start_mock_node().await;
    let state = test_state_with_ttl(
        &node_url,
        MockCustodyOptions::default(),
        Duration::from_millis(100),
    );

    let abandoned = load_sign_in_page(&state).await;
    assert!(state.page(abandoned).await.is_some());
    tokio::time::sleep(Duration::from_millis(150)).await;

    let result = handle_approve(State(state.clone()), Path(abandoned)).await;
    assert!(matches!(result, Err(ServerError::PageNotFound(id)) if id == abandoned));

    let fresh = load_sign_in_page(&state).await;
    let pages = state.pages.read().await;
    assert_eq!(pages.len(), 1);
    assert!(pages.contains_key(&fresh));
    assert!(!pages.contains_key(&abandoned));
}

/// ルーティング経由でHTTPリクエストが処理されることを確認
#[tokio::test]
async fn test_router_serves_bridge_pages() {
    let (node_url, _) = start_mock_node().await;
    let state = test_state(&node_url, restored_login());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app(state)).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();
    let base = format!("http://127.0.0.1:{port}");

    let health = client.get(format!("{base}/health")).send().await.unwrap();
    assert_eq!(health.text().await.unwrap(), "ok");

    let loaded = client
        .get(format!(
            "{base}/bridge?{}",
            query(&[
                ("action", "signIn"),
                ("clientId", CLIENT_ID),
                ("loginProvider", "google"),
                ("originUrl", ORIGIN),
            ])
            .unwrap()
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(loaded.status().as_u16(), 200);
    let view: PageView = loaded.json().await.unwrap();

    let approved = client
        .post(format!("{base}/bridge/{}/approve", view.page_id))
        .send()
        .await
        .unwrap();
    assert_eq!(approved.status().as_u16(), 303);
    let location = approved.headers()["location"].to_str().unwrap().to_string();
    assert!(location.contains("web3authVerify="));
}
