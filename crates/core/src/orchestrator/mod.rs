//! # オーケストレータ
//!
//! ブリッジページ1回分の状態遷移を管理する。
//!
//! ## 状態遷移
//! ```text
//! Idle → ParsingParams → InitializingSession → AwaitingApproval
//!      → {SigningIn | SigningTransaction | SigningAndSending} → Redirecting → Terminal
//! signOut: InitializingSession → SigningOut → Redirecting → Terminal
//! ```
//! - セッション初期化の失敗はログに記録するだけで、リダイレクトせず `Stalled` で止まる
//! - 初期化後のエラーは呼び出し元に返し、`Failed` で止まる（リダイレクトしない）
//! - 各エントリポイントは `AwaitingApproval` からのみ受け付ける


use std::sync::Arc;

use base64::Engine;
use bridge_crypto::{derive_key_material, InMemoryKeyStore, InMemorySigner};
use bridge_types::{ActionKind, ExecutionOutcome, Transaction};
use url::Url;

use crate::b64;
use crate::blockchain::rpc::RpcConnector;
use crate::config::BridgeSettings;
use crate::custody::CustodyClient;
use crate::error::BridgeError;
use crate::guard::{CallGuard, CancelSignal};
use crate::network::resolve_preset;
use crate::redirect::Redirect;
use crate::request::{parse_url_params, ActionRequest, BridgeRequest};
use crate::session::{Session, SessionState};
use crate::signing::SigningEngine;

/// オーケストレータの状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    ParsingParams,
    InitializingSession,
    AwaitingApproval,
    SigningIn,
    SigningTransaction,
    SigningAndSending,
    SigningOut,
    Redirecting,
    Terminal,
    /// セッション初期化に失敗して停止
    Stalled,
    /// 初期化後のエラーで停止
    Failed,
}

/// ページ読み込みの結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// 直ちにリダイレクトする（signOut）
    Redirect(Redirect),
    /// 利用者の承認待ち
    AwaitingApproval,
    /// セッション初期化に失敗して停止
    Stalled,
}

/// ブリッジページ1回分のオーケストレータ。
pub struct Orchestrator {
    settings: BridgeSettings,
    session: Session,
    engine: SigningEngine,
    state: OrchestratorState,
    request: Option<BridgeRequest>,
    outcomes: Vec<ExecutionOutcome>,
}

impl Orchestrator {
    /// オーケストレータを構築する。
    ///
    /// 全ての外部呼び出しは `settings.call_timeout` と `cancel` で制御される。
    pub fn new(
        settings: BridgeSettings,
        custody: Box<dyn CustodyClient>,
        connector: Arc<dyn RpcConnector>,
        cancel: CancelSignal,
    ) -> Result<Self, BridgeError> {
        let preset = resolve_preset(&settings.network_id)?;
        let guard = CallGuard::new(settings.call_timeout, cancel);
        let session = Session::new(custody, &settings.custody_network, &preset.node_url, guard.clone());
        let engine = SigningEngine::new(connector, guard);

        Ok(Self {
            settings,
            session,
            engine,
            state: OrchestratorState::Idle,
            request: None,
            outcomes: Vec::new(),
        })
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// 検証済みのリクエスト（読み込み前・検証失敗時は `None`）。
    pub fn request(&self) -> Option<&BridgeRequest> {
        self.request.as_ref()
    }

    /// 直近のバッチ送信結果（入力順）。途中で中断した場合は送信済みの分だけを持つ。
    pub fn outcomes(&self) -> &[ExecutionOutcome] {
        &self.outcomes
    }

    /// ページを読み込む。
    ///
    /// パラメータの検証エラーはそのまま返す。セッション初期化は1回だけ行い、
    /// 失敗した場合はエラーを返さず `Stalled` で停止する。
    pub async fn load(&mut self, page_url: &str) -> Result<LoadOutcome, BridgeError> {
        if self.state != OrchestratorState::Idle {
            return Err(BridgeError::InvalidState(format!(
                "ページは読み込み済みです: {:?}",
                self.state
            )));
        }

        self.state = OrchestratorState::ParsingParams;
        let request = match parse_url_params(page_url).and_then(|p| BridgeRequest::try_from(&p)) {
            Ok(request) => request,
            Err(e) => {
                self.state = OrchestratorState::Failed;
                return Err(e);
            }
        };
        let action = request.action.clone();
        let client_id = request.client_id.clone();
        self.request = Some(request);

        self.state = OrchestratorState::InitializingSession;
        if let Err(e) = self.session.init(&client_id).await {
            tracing::error!(action = %action.kind(), error = %e, "セッションの初期化に失敗しました");
            self.state = OrchestratorState::Stalled;
            return Ok(LoadOutcome::Stalled);
        }

        match action {
            ActionRequest::SignOut { origin_url } => {
                self.state = OrchestratorState::SigningOut;
                let result = self
                    .session
                    .logout()
                    .await
                    .map(|()| Redirect::to_origin(&origin_url));
                Ok(LoadOutcome::Redirect(self.complete(result)?))
            }
            other => {
                tracing::info!(action = %other.kind(), "承認待ちです");
                self.state = OrchestratorState::AwaitingApproval;
                Ok(LoadOutcome::AwaitingApproval)
            }
        }
    }

    /// ログインしてサインインメッセージに署名する。
    pub async fn sign_in(&mut self) -> Result<Redirect, BridgeError> {
        let ActionRequest::SignIn {
            origin_url,
            login_provider,
            email,
        } = self.begin(ActionKind::SignIn, OrchestratorState::SigningIn)?
        else {
            return Err(self.wrong_action(ActionKind::SignIn));
        };

        let result = self
            .run_sign_in(&origin_url, &login_provider, email.as_deref())
            .await;
        self.complete(result)
    }

    /// 接続済みセッションの鍵でトランザクション1件に署名する。
    pub async fn approve_transaction(&mut self) -> Result<Redirect, BridgeError> {
        let ActionRequest::SignTransaction {
            origin_url,
            transaction,
        } = self.begin(ActionKind::SignTransaction, OrchestratorState::SigningTransaction)?
        else {
            return Err(self.wrong_action(ActionKind::SignTransaction));
        };

        let result = self.run_sign_transaction(&origin_url, &transaction).await;
        self.complete(result)
    }

    /// 接続済みセッションの鍵でバッチに署名し、順番に送信する。
    pub async fn approve_transactions(&mut self) -> Result<Redirect, BridgeError> {
        let ActionRequest::SignAndSendTransactions {
            origin_url,
            transactions,
        } = self.begin(
            ActionKind::SignAndSendTransactions,
            OrchestratorState::SigningAndSending,
        )?
        else {
            return Err(self.wrong_action(ActionKind::SignAndSendTransactions));
        };

        let result = self.sign_and_send(&transactions).await;
        match result {
            Ok(outcomes) => {
                self.outcomes = outcomes;
                self.complete(Ok(Redirect::to_origin(&origin_url)))
            }
            Err(e) => {
                if let BridgeError::BatchAborted { committed, .. } = &e {
                    self.outcomes = committed.clone();
                }
                self.complete(Err(e))
            }
        }
    }

    /// リクエストのアクションに応じたエントリポイントを呼ぶ。
    pub async fn approve(&mut self) -> Result<Redirect, BridgeError> {
        let kind = self
            .request
            .as_ref()
            .map(|r| r.action.kind())
            .ok_or_else(|| BridgeError::InvalidState("リクエストがありません".to_string()))?;

        match kind {
            ActionKind::SignIn => self.sign_in().await,
            ActionKind::SignTransaction => self.approve_transaction().await,
            ActionKind::SignAndSendTransactions => self.approve_transactions().await,
            ActionKind::SignOut => Err(BridgeError::InvalidState(
                "signOutは承認を必要としません".to_string(),
            )),
        }
    }

    /// 承認せずにオリジンURLへそのまま戻る。
    pub fn reject(&mut self) -> Result<Redirect, BridgeError> {
        if self.state != OrchestratorState::AwaitingApproval {
            return Err(BridgeError::InvalidState(format!(
                "承認待ちではありません: {:?}",
                self.state
            )));
        }
        let origin_url = self.origin_url()?.clone();

        self.state = OrchestratorState::Redirecting;
        tracing::info!(origin_url = %origin_url, "リクエストが拒否されました");
        self.state = OrchestratorState::Terminal;
        Ok(Redirect::to_origin(&origin_url))
    }

    // -----------------------------------------------------------------------
    // 内部処理
    // -----------------------------------------------------------------------

    /// 承認待ちかつ期待するアクションであることを確認し、次の状態へ進める。
    fn begin(
        &mut self,
        expected: ActionKind,
        next: OrchestratorState,
    ) -> Result<ActionRequest, BridgeError> {
        if self.state != OrchestratorState::AwaitingApproval {
            return Err(BridgeError::InvalidState(format!(
                "{expected} は受け付けられません: {:?}",
                self.state
            )));
        }
        let action = self
            .request
            .as_ref()
            .map(|r| r.action.clone())
            .ok_or_else(|| BridgeError::InvalidState("リクエストがありません".to_string()))?;
        if action.kind() != expected {
            return Err(self.wrong_action(expected));
        }

        self.state = next;
        tracing::info!(action = %expected, "処理を開始します");
        Ok(action)
    }

    fn wrong_action(&self, expected: ActionKind) -> BridgeError {
        let actual = self
            .request
            .as_ref()
            .map(|r| r.action.kind().to_string())
            .unwrap_or_default();
        BridgeError::InvalidState(format!("アクションが一致しません: 期待={expected}, 実際={actual}"))
    }

    fn origin_url(&self) -> Result<&Url, BridgeError> {
        self.request
            .as_ref()
            .map(|r| r.action.origin_url())
            .ok_or_else(|| BridgeError::InvalidState("リクエストがありません".to_string()))
    }

    /// 処理結果に応じて `Terminal` または `Failed` に遷移する。
    fn complete(&mut self, result: Result<Redirect, BridgeError>) -> Result<Redirect, BridgeError> {
        match result {
            Ok(redirect) => {
                self.state = OrchestratorState::Redirecting;
                tracing::info!(location = %redirect.location, "オリジンへリダイレクトします");
                self.state = OrchestratorState::Terminal;
                Ok(redirect)
            }
            Err(e) => {
                tracing::error!(state = ?self.state, error = %e, "処理に失敗しました");
                self.state = OrchestratorState::Failed;
                Err(e)
            }
        }
    }

    async fn run_sign_in(
        &mut self,
        origin_url: &Url,
        login_provider: &str,
        email: Option<&str>,
    ) -> Result<Redirect, BridgeError> {
        let provider = self.session.connect(login_provider, email).await?;
        let secret = self.session.request_raw_secret(provider.as_ref()).await?;
        let (signer, account_id) = self.signer_from_secret(&secret)?;

        let signed = self
            .engine
            .sign_in_payload(
                &signer,
                &account_id,
                &self.settings.network_id,
                &self.settings.sign_in_message,
            )
            .await?;
        Ok(Redirect::sign_in(origin_url, &signed.encoded_payload, &signed.signature))
    }

    async fn run_sign_transaction(
        &self,
        origin_url: &Url,
        transaction: &Transaction,
    ) -> Result<Redirect, BridgeError> {
        let signer = self.signer_from_current_session().await?;
        let signed = self
            .engine
            .sign_transaction(transaction, &signer, &self.settings.network_id)
            .await?;
        let encoded = b64().encode(signed.encode()?);
        Ok(Redirect::signed_transaction(origin_url, &encoded))
    }

    async fn sign_and_send(
        &self,
        transactions: &[Transaction],
    ) -> Result<Vec<ExecutionOutcome>, BridgeError> {
        let signer = self.signer_from_current_session().await?;
        self.engine
            .sign_and_send_transactions(transactions, &signer, &self.settings.network_id)
            .await
    }

    /// 接続済みセッションから秘密値を取得し、署名器を作る。
    async fn signer_from_current_session(&self) -> Result<InMemorySigner, BridgeError> {
        let provider = self.session.current_provider()?;
        let secret = self.session.request_raw_secret(provider.as_ref()).await?;
        let (signer, _) = self.signer_from_secret(&secret)?;
        Ok(signer)
    }

    /// 秘密値から鍵を導出し、このアクション限りの鍵ストアに登録する。
    fn signer_from_secret(&self, secret: &str) -> Result<(InMemorySigner, String), BridgeError> {
        let material =
            derive_key_material(secret).map_err(|e| BridgeError::KeyDerivation(e.to_string()))?;
        let account_id = material.account_id;

        let mut key_store = InMemoryKeyStore::new();
        key_store.set_key(&self.settings.network_id, &account_id, material.key_pair);
        tracing::info!(account_id = %account_id, "鍵を導出しました");
        Ok((InMemorySigner::new(key_store), account_id))
    }
}
