//! # ローカル開発用モックカストディ
//!
//! カストディプロバイダが利用できない環境で使用するモック実装。
//! ログイン情報から決定的な秘密値を生成し、全ての呼び出しを記録する。

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::{
    AdapterConfig, ConnectOptions, CustodyClient, CustodyConfig, CustodyError, ProviderHandle,
    ProviderRequest, SharedProvider, PRIVATE_KEY_METHOD,
};

/// モックへの呼び出し記録。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustodyCall {
    ConfigureAdapter { adapter: String },
    Init { client_id: String },
    ConnectTo {
        adapter: String,
        login_provider: String,
        login_hint: Option<String>,
    },
    Request { method: String },
    Logout,
}

/// 呼び出し記録。クライアントとプロバイダハンドルで共有する。
#[derive(Debug, Clone, Default)]
pub struct CallJournal {
    calls: Arc<Mutex<Vec<CustodyCall>>>,
}

impl CallJournal {
    fn record(&self, call: CustodyCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    /// 記録済みの呼び出しを順番に返す。
    pub fn calls(&self) -> Vec<CustodyCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

/// `private_key` リクエストに返す秘密値。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MockSecret {
    /// clientId・ログインプロバイダ・メールアドレスから決定的に生成する
    #[default]
    Derived,
    /// 固定値を返す
    Fixed(String),
    /// 値を返さない
    Missing,
}

/// モックの動作設定（障害注入）。
#[derive(Debug, Clone, Default)]
pub struct MockCustodyOptions {
    /// `init` を失敗させる
    pub fail_init: bool,
    /// `connect_to` を失敗させる
    pub fail_login: bool,
    /// `init` 時に復元するキャッシュ済みログイン
    pub cached_login: Option<ConnectOptions>,
    pub secret: MockSecret,
    /// `connect_to` の応答遅延
    pub login_delay: Option<Duration>,
}

/// モックカストディクライアント。ローカル開発・テスト用。
pub struct MockCustody {
    options: MockCustodyOptions,
    journal: CallJournal,
    adapter: Option<AdapterConfig>,
    client_id: Option<String>,
    provider: Option<Arc<MockProvider>>,
}

impl MockCustody {
    pub fn new() -> Self {
        Self::with_options(MockCustodyOptions::default())
    }

    pub fn with_options(options: MockCustodyOptions) -> Self {
        Self {
            options,
            journal: CallJournal::default(),
            adapter: None,
            client_id: None,
            provider: None,
        }
    }

    /// 呼び出し記録への参照（クライアントを手放した後も参照できる）。
    pub fn journal(&self) -> CallJournal {
        self.journal.clone()
    }

    fn open_provider(&self, client_id: &str, options: &ConnectOptions) -> Arc<MockProvider> {
        let secret = match &self.options.secret {
            MockSecret::Derived => Some(derive_mock_secret(
                client_id,
                &options.login_provider,
                options.login_hint.as_deref(),
            )),
            MockSecret::Fixed(value) => Some(value.clone()),
            MockSecret::Missing => None,
        };
        Arc::new(MockProvider {
            secret,
            journal: self.journal.clone(),
        })
    }
}

impl Default for MockCustody {
    fn default() -> Self {
        Self::new()
    }
}

/// ログイン情報から64桁Hexの秘密値を生成する。
pub fn derive_mock_secret(client_id: &str, login_provider: &str, email: Option<&str>) -> String {
    let input = format!("{client_id}:{login_provider}:{}", email.unwrap_or_default());
    hex::encode(bridge_crypto::sha256(input.as_bytes()))
}

#[async_trait::async_trait]
impl CustodyClient for MockCustody {
    fn configure_adapter(&mut self, adapter: AdapterConfig) -> Result<(), CustodyError> {
        self.journal.record(CustodyCall::ConfigureAdapter {
            adapter: adapter.name().to_string(),
        });
        self.adapter = Some(adapter);
        Ok(())
    }

    async fn init(&mut self, config: &CustodyConfig) -> Result<(), CustodyError> {
        self.journal.record(CustodyCall::Init {
            client_id: config.client_id.clone(),
        });
        if self.options.fail_init {
            return Err(CustodyError::Provider("初期化に失敗しました（モック）".to_string()));
        }
        if self.adapter.is_none() {
            return Err(CustodyError::AdapterNotConfigured(
                super::OPENLOGIN_ADAPTER.to_string(),
            ));
        }

        if let Some(cached) = self.options.cached_login.clone() {
            tracing::info!(login_provider = %cached.login_provider, "キャッシュ済みログインを復元します（モック）");
            self.provider = Some(self.open_provider(&config.client_id, &cached));
        }
        self.client_id = Some(config.client_id.clone());
        Ok(())
    }

    async fn connect_to(
        &mut self,
        adapter: &str,
        options: &ConnectOptions,
    ) -> Result<SharedProvider, CustodyError> {
        self.journal.record(CustodyCall::ConnectTo {
            adapter: adapter.to_string(),
            login_provider: options.login_provider.clone(),
            login_hint: options.login_hint.clone(),
        });

        let client_id = self.client_id.clone().ok_or(CustodyError::NotInitialized)?;
        match &self.adapter {
            Some(configured) if configured.name() == adapter => {}
            _ => return Err(CustodyError::AdapterNotConfigured(adapter.to_string())),
        }
        if let Some(delay) = self.options.login_delay {
            tokio::time::sleep(delay).await;
        }
        if self.options.fail_login {
            return Err(CustodyError::Login("ユーザーがログインを中断しました（モック）".to_string()));
        }

        let provider = self.open_provider(&client_id, options);
        self.provider = Some(provider.clone());
        Ok(provider)
    }

    fn provider(&self) -> Option<SharedProvider> {
        self.provider
            .as_ref()
            .map(|p| p.clone() as SharedProvider)
    }

    async fn logout(&mut self) -> Result<(), CustodyError> {
        self.journal.record(CustodyCall::Logout);
        if self.client_id.is_none() {
            return Err(CustodyError::NotInitialized);
        }
        self.provider = None;
        Ok(())
    }
}

/// モックのプロバイダハンドル。
struct MockProvider {
    secret: Option<String>,
    journal: CallJournal,
}

#[async_trait::async_trait]
impl ProviderHandle for MockProvider {
    async fn request(&self, request: &ProviderRequest) -> Result<Option<String>, CustodyError> {
        self.journal.record(CustodyCall::Request {
            method: request.method.clone(),
        });
        if request.method != PRIVATE_KEY_METHOD {
            return Err(CustodyError::Provider(format!(
                "未対応のメソッドです: {}",
                request.method
            )));
        }
        Ok(self.secret.clone())
    }
}
