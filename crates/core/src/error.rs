//! # ブリッジ エラー型
//!
//! パラメータ検証・セッション・鍵導出・署名・RPCの各段階で共通のエラー型。
//! 各コンポーネント固有のエラー（`CustodyError`、`RpcError`、`CryptoError`）は
//! 呼び出し箇所の文脈に応じてこの型に変換する。

use bridge_types::ExecutionOutcome;

/// ブリッジのエラー型。
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// アクションに必要なパラメータがない
    #[error("必須パラメータがありません: {0}")]
    MissingParameter(&'static str),
    /// パラメータの形式が不正（URL、Base64、JSON、未知のアクション）
    #[error("不正なパラメータ: {0}")]
    InvalidParameter(String),
    /// カストディクライアントの初期化に失敗
    #[error("セッションの初期化に失敗: {0}")]
    SessionInit(String),
    /// セッションが初期化前・未接続・ログアウト済み
    #[error("セッションが利用可能な状態ではありません: {0}")]
    SessionNotReady(String),
    /// ログイン・秘密値要求・ログアウトの失敗
    #[error("カストディプロバイダの呼び出しに失敗: {0}")]
    Custody(String),
    /// プロバイダが秘密鍵を返さなかった
    #[error("カストディプロバイダから秘密鍵が返されませんでした")]
    NoSecret,
    /// 秘密値から鍵ペアを導出できない
    #[error("鍵の導出に失敗: {0}")]
    KeyDerivation(String),
    /// 未知のネットワーク識別子
    #[error("ネットワーク設定が見つかりません: '{0}'")]
    UnknownNetwork(String),
    /// トランザクションの構築・署名に失敗
    #[error("トランザクション署名に失敗: {0}")]
    TransactionSigning(String),
    /// ブロック取得・アクセスキー取得・ブロードキャストの失敗
    #[error("RPC エラー: {0}")]
    Rpc(String),
    /// 現在の状態では受け付けられない操作
    #[error("不正な状態です: {0}")]
    InvalidState(String),
    /// 外部呼び出しのタイムアウト
    #[error("{0} がタイムアウトしました")]
    Timeout(&'static str),
    /// 外部呼び出しのキャンセル
    #[error("{0} がキャンセルされました")]
    Cancelled(&'static str),
    /// バッチ送信の途中で失敗した。`committed` は送信済み分の実行結果（入力順）
    #[error("{}件を送信した時点でバッチ送信を中断しました: {source}", .committed.len())]
    BatchAborted {
        committed: Vec<ExecutionOutcome>,
        source: Box<BridgeError>,
    },
}

impl BridgeError {
    /// バッチ中断の場合は中断の原因となったエラーを返す。
    pub fn root(&self) -> &BridgeError {
        match self {
            BridgeError::BatchAborted { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<crate::blockchain::rpc::RpcError> for BridgeError {
    fn from(e: crate::blockchain::rpc::RpcError) -> Self {
        BridgeError::Rpc(e.to_string())
    }
}
