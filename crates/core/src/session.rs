//! # カストディセッション
//!
//! 1ページにつき1つ存在するカストディクライアントのライフサイクルを管理する。
//!
//! ## 状態遷移
//! ```text
//! Uninitialized →(init)→ Initializing → Ready →(connect)→ Connected →(logout)→ LoggedOut
//! ```
//! キャッシュ済みのログインが復元された場合、`init` の直後から `Connected` になる。
//! `init` が失敗した場合は `Uninitialized` に戻る。

use crate::custody::{
    AdapterConfig, ChainConfig, ChainNamespace, ConnectOptions, CustodyClient, CustodyConfig,
    ProviderHandle, ProviderRequest, SharedProvider, OPENLOGIN_ADAPTER,
};
use crate::error::BridgeError;
use crate::guard::CallGuard;

/// セッションの状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    Connected,
    LoggedOut,
}

/// カストディセッション。
pub struct Session {
    client: Box<dyn CustodyClient>,
    state: SessionState,
    guard: CallGuard,
    /// プロバイダ側のネットワーク名
    custody_network: String,
    /// チェーン設定に渡すRPCノードURL
    rpc_target: String,
}

impl Session {
    pub fn new(
        client: Box<dyn CustodyClient>,
        custody_network: &str,
        rpc_target: &str,
        guard: CallGuard,
    ) -> Self {
        Self {
            client,
            state: SessionState::Uninitialized,
            guard,
            custody_network: custody_network.to_string(),
            rpc_target: rpc_target.to_string(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// カストディクライアントを初期化する。
    ///
    /// アダプタ（ポップアップ方式、ed25519）を登録してから初期化する。
    pub async fn init(&mut self, client_id: &str) -> Result<(), BridgeError> {
        if self.state != SessionState::Uninitialized {
            return Err(BridgeError::SessionInit(format!(
                "セッションは初期化済みです: {:?}",
                self.state
            )));
        }
        if client_id.is_empty() {
            return Err(BridgeError::SessionInit("clientIdがありません".to_string()));
        }

        self.state = SessionState::Initializing;
        let result = self.run_init(client_id).await;
        self.state = match &result {
            Ok(()) if self.client.provider().is_some() => SessionState::Connected,
            Ok(()) => SessionState::Ready,
            Err(_) => SessionState::Uninitialized,
        };

        if result.is_ok() {
            tracing::info!(state = ?self.state, "カストディセッションを初期化しました");
        }
        result
    }

    async fn run_init(&mut self, client_id: &str) -> Result<(), BridgeError> {
        let config = CustodyConfig {
            client_id: client_id.to_string(),
            chain_config: ChainConfig {
                chain_namespace: ChainNamespace::Other,
                rpc_target: self.rpc_target.clone(),
            },
        };

        self.client
            .configure_adapter(AdapterConfig::openlogin(client_id, &self.custody_network))
            .map_err(|e| BridgeError::SessionInit(format!("アダプタの登録に失敗: {e}")))?;

        self.guard
            .run("custody init", self.client.init(&config))
            .await?
            .map_err(|e| BridgeError::SessionInit(e.to_string()))
    }

    /// 対話的ログインを行い、プロバイダハンドルを返す。
    ///
    /// `email` はログインヒントとして渡す。
    pub async fn connect(
        &mut self,
        login_provider: &str,
        email: Option<&str>,
    ) -> Result<SharedProvider, BridgeError> {
        self.ensure_usable()?;

        let options = ConnectOptions {
            login_provider: login_provider.to_string(),
            login_hint: email.map(str::to_string),
        };
        let provider = self
            .guard
            .run("custody login", self.client.connect_to(OPENLOGIN_ADAPTER, &options))
            .await?
            .map_err(|e| BridgeError::Custody(e.to_string()))?;

        self.state = SessionState::Connected;
        tracing::info!(login_provider, "カストディプロバイダにログインしました");
        Ok(provider)
    }

    /// 接続済みセッションのプロバイダハンドル。
    pub fn current_provider(&self) -> Result<SharedProvider, BridgeError> {
        if self.state != SessionState::Connected {
            return Err(BridgeError::SessionNotReady(format!(
                "ログインしていません: {:?}",
                self.state
            )));
        }
        self.client.provider().ok_or_else(|| {
            BridgeError::SessionNotReady("プロバイダが見つかりません".to_string())
        })
    }

    /// プロバイダハンドルに生の秘密値を要求する。
    pub async fn request_raw_secret(
        &self,
        provider: &dyn ProviderHandle,
    ) -> Result<String, BridgeError> {
        self.ensure_usable()?;

        let secret = self
            .guard
            .run("private key request", provider.request(&ProviderRequest::private_key()))
            .await?
            .map_err(|e| BridgeError::Custody(e.to_string()))?;

        match secret {
            Some(secret) if !secret.is_empty() => Ok(secret),
            _ => Err(BridgeError::NoSecret),
        }
    }

    /// セッションを終了する。ログアウト済みなら何もしない。
    pub async fn logout(&mut self) -> Result<(), BridgeError> {
        match self.state {
            SessionState::LoggedOut => return Ok(()),
            SessionState::Ready | SessionState::Connected => {}
            other => {
                return Err(BridgeError::SessionNotReady(format!(
                    "初期化されていません: {other:?}"
                )))
            }
        }

        self.guard
            .run("custody logout", self.client.logout())
            .await?
            .map_err(|e| BridgeError::Custody(e.to_string()))?;

        self.state = SessionState::LoggedOut;
        tracing::info!("カストディセッションを終了しました");
        Ok(())
    }

    fn ensure_usable(&self) -> Result<(), BridgeError> {
        match self.state {
            SessionState::Ready | SessionState::Connected => Ok(()),
            other => Err(BridgeError::SessionNotReady(format!("{other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::custody::mock::{CustodyCall, MockCustody, MockCustodyOptions, MockSecret};
    use crate::guard::CancelSignal;

    fn session_with(options: MockCustodyOptions) -> (Session, crate::custody::mock::CallJournal) {
        let custody = MockCustody::with_options(options);
        let journal = custody.journal();
        let guard = CallGuard::new(Duration::from_secs(5), CancelSignal::new());
        (
            Session::new(Box::new(custody), "testnet", "https://rpc.testnet.near.org", guard),
            journal,
        )
    }

    /// init → connect → 秘密値取得 → logout の正常系
    #[tokio::test]
    async fn test_session_lifecycle() {
        let (mut session, journal) = session_with(MockCustodyOptions::default());
        assert_eq!(session.state(), SessionState::Uninitialized);

        session.init("client-1").await.unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        assert!(session.current_provider().is_err());

        let provider = session.connect("google", Some("a@example.com")).await.unwrap();
        assert_eq!(session.state(), SessionState::Connected);
        let secret = session.request_raw_secret(provider.as_ref()).await.unwrap();
        assert_eq!(secret.len(), 64);
        assert!(session.current_provider().is_ok());

        session.logout().await.unwrap();
        assert_eq!(session.state(), SessionState::LoggedOut);
        // 2回目は何もしない
        session.logout().await.unwrap();

        let calls = journal.calls();
        assert_eq!(
            calls[2],
            CustodyCall::ConnectTo {
                adapter: "openlogin".to_string(),
                login_provider: "google".to_string(),
                login_hint: Some("a@example.com".to_string()),
            }
        );
        assert_eq!(calls.iter().filter(|c| **c == CustodyCall::Logout).count(), 1);
    }

    /// 初期化前のconnectはSessionNotReadyになり、プロバイダは呼ばれない
    #[tokio::test]
    async fn test_connect_before_init() {
        let (mut session, journal) = session_with(MockCustodyOptions::default());
        let result = session.connect("google", None).await;
        assert!(matches!(result, Err(BridgeError::SessionNotReady(_))));
        assert!(journal.is_empty());
        assert!(matches!(
            session.logout().await,
            Err(BridgeError::SessionNotReady(_))
        ));
    }

    /// キャッシュ済みログインが復元されるとinit直後からConnectedになる
    #[tokio::test]
    async fn test_init_with_cached_login() {
        let (mut session, _) = session_with(MockCustodyOptions {
            cached_login: Some(ConnectOptions {
                login_provider: "google".to_string(),
                login_hint: None,
            }),
            ..Default::default()
        });
        session.init("client-1").await.unwrap();
        assert_eq!(session.state(), SessionState::Connected);
        assert!(session.current_provider().is_ok());
    }

    /// 初期化の失敗・空のclientId・二重初期化
    #[tokio::test]
    async fn test_init_failures() {
        let (mut session, _) = session_with(MockCustodyOptions {
            fail_init: true,
            ..Default::default()
        });
        assert!(matches!(
            session.init("client-1").await,
            Err(BridgeError::SessionInit(_))
        ));
        assert_eq!(session.state(), SessionState::Uninitialized);

        let (mut session, journal) = session_with(MockCustodyOptions::default());
        assert!(matches!(session.init("").await, Err(BridgeError::SessionInit(_))));
        assert!(journal.is_empty());

        session.init("client-1").await.unwrap();
        assert!(matches!(
            session.init("client-1").await,
            Err(BridgeError::SessionInit(_))
        ));
    }

    /// プロバイダが値を返さない・空文字列を返す場合はNoSecret
    #[tokio::test]
    async fn test_missing_secret() {
        for secret in [MockSecret::Missing, MockSecret::Fixed(String::new())] {
            let (mut session, _) = session_with(MockCustodyOptions {
                secret,
                ..Default::default()
            });
            session.init("client-1").await.unwrap();
            let provider = session.connect("google", None).await.unwrap();
            assert!(matches!(
                session.request_raw_secret(provider.as_ref()).await,
                Err(BridgeError::NoSecret)
            ));
        }
    }

    /// 応答しないログインはTimeoutになる
    #[tokio::test]
    async fn test_login_timeout() {
        let custody = MockCustody::with_options(MockCustodyOptions {
            login_delay: Some(Duration::from_secs(10)),
            ..Default::default()
        });
        let guard = CallGuard::new(Duration::from_millis(50), CancelSignal::new());
        let mut session =
            Session::new(Box::new(custody), "testnet", "https://rpc.testnet.near.org", guard);
        session.init("client-1").await.unwrap();

        let result = session.connect("google", None).await;
        assert!(matches!(result, Err(BridgeError::Timeout(_))));
        assert_eq!(session.state(), SessionState::Ready);
    }
}
