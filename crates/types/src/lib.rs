//! # Custody Bridge 共有型定義
//!
//! ブリッジの入出力で使用するデータ構造をRust構造体として提供する。
//!
//! ## エンコーディング規則
//! - Base64: URLパラメータで受け渡すJSONペイロード、署名、署名済みトランザクション
//! - Base58: ブロックハッシュ、公開鍵文字列（`ed25519:` プレフィックス付き）
//! - Hex: アカウントID（公開鍵の生バイト列）

use serde::{Deserialize, Serialize};

/// ed25519の鍵種別番号。署名ペイロードの`keyType`フィールドに使用する。
pub const KEY_TYPE_ED25519: u8 = 0;

// ---------------------------------------------------------------------------
// 受信リクエスト
// ---------------------------------------------------------------------------

/// ページURLのクエリパラメータ（未検証）。
///
/// 全フィールドが任意。アクションごとの必須項目は検証時に確認する。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlParams {
    /// アクション名 ("signIn", "signOut", "signTransaction", "signAndSendTransactions")
    pub action: Option<String>,
    /// 結果を返却するオリジンアプリケーションのURL
    pub origin_url: Option<String>,
    /// カストディプロバイダのクライアントID
    pub client_id: Option<String>,
    /// ログインプロバイダ名 (例: "google")
    pub login_provider: Option<String>,
    /// ログインヒントとして渡すメールアドレス
    pub email: Option<String>,
    /// オリジンアプリケーションが操作するコントラクトID（表示用）
    pub contract_id: Option<String>,
    /// Base64エンコードされたJSONトランザクション（単体）
    pub transaction: Option<String>,
    /// Base64エンコードされたJSONトランザクション配列（バッチ）
    pub transactions: Option<String>,
}

/// ブリッジが受け付けるアクション種別。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    /// ログインしてメッセージ署名を返す
    SignIn,
    /// ログアウトして即座に戻る
    SignOut,
    /// トランザクション1件に署名して返す
    SignTransaction,
    /// トランザクション群に署名し、順番にブロードキャストする
    SignAndSendTransactions,
}

impl ActionKind {
    /// URLパラメータ上の名前を返す。
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::SignIn => "signIn",
            ActionKind::SignOut => "signOut",
            ActionKind::SignTransaction => "signTransaction",
            ActionKind::SignAndSendTransactions => "signAndSendTransactions",
        }
    }

    /// URLパラメータ上の名前からアクション種別を得る。
    pub fn from_param(value: &str) -> Option<Self> {
        match value {
            "signIn" => Some(ActionKind::SignIn),
            "signOut" => Some(ActionKind::SignOut),
            "signTransaction" => Some(ActionKind::SignTransaction),
            "signAndSendTransactions" => Some(ActionKind::SignAndSendTransactions),
            _ => None,
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ネットワークプリセット
// ---------------------------------------------------------------------------

/// ネットワークごとの固定エンドポイント群。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPreset {
    /// ネットワーク識別子 ("mainnet" or "testnet")
    pub network_id: String,
    /// JSON-RPCノードURL
    pub node_url: String,
    /// ヘルパーAPI URL
    pub helper_url: String,
    /// エクスプローラーURL
    pub explorer_url: String,
    /// インデクサーURL
    pub indexer_url: String,
}

// ---------------------------------------------------------------------------
// ウォレット形式のトランザクション
// ---------------------------------------------------------------------------

/// オリジンアプリケーションから受け取るトランザクション。
///
/// nonceとblock_hashは署名時にRPCから取得して補完する。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// 署名者アカウントID
    pub signer_id: String,
    /// 受信者アカウントID
    pub receiver_id: String,
    /// 実行するアクション列（順序に意味がある）
    pub actions: Vec<Action>,
}

/// トランザクション内のアクション。`{"type": ..., "params": {...}}` 形式。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum Action {
    CreateAccount,
    DeployContract(DeployContractAction),
    FunctionCall(FunctionCallAction),
    Transfer(TransferAction),
    Stake(StakeAction),
    AddKey(AddKeyAction),
    DeleteKey(DeleteKeyAction),
    DeleteAccount(DeleteAccountAction),
}

/// コントラクトのデプロイ。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployContractAction {
    /// Base64エンコードされたWASMコード
    pub code: String,
}

/// コントラクトメソッドの呼び出し。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCallAction {
    pub method_name: String,
    /// メソッド引数（JSONのままシリアライズして送る）
    pub args: serde_json::Value,
    /// ガス量（10進数文字列）
    pub gas: String,
    /// 添付するデポジット（yocto単位の10進数文字列）
    pub deposit: String,
}

/// 送金。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferAction {
    /// 送金額（yocto単位の10進数文字列）
    pub deposit: String,
}

/// ステーキング。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeAction {
    pub stake: String,
    /// `ed25519:<base58>` 形式のバリデータ公開鍵
    pub public_key: String,
}

/// アクセスキーの追加。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddKeyAction {
    pub public_key: String,
    pub access_key: AccessKey,
}

/// 追加するアクセスキーの内容。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    pub permission: AccessKeyPermission,
}

/// アクセスキーの権限。`"FullAccess"` 文字列または関数呼び出し権限オブジェクト。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AccessKeyPermission {
    FullAccess(FullAccess),
    FunctionCall(FunctionCallPermission),
}

/// `"FullAccess"` リテラル。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FullAccess {
    FullAccess,
}

/// 関数呼び出しに限定した権限。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCallPermission {
    pub receiver_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowance: Option<String>,
    #[serde(default)]
    pub method_names: Vec<String>,
}

/// アクセスキーの削除。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteKeyAction {
    pub public_key: String,
}

/// アカウントの削除。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAccountAction {
    pub beneficiary_id: String,
}

// ---------------------------------------------------------------------------
// サインイン用署名ペイロード
// ---------------------------------------------------------------------------

/// サインイン時に署名するペイロード。
///
/// JSONのフィールド順（accountId, message, blockId, publicKey, keyType）が
/// そのまま署名対象のバイト列になる。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningPayload {
    /// Hexエンコードされた公開鍵（アカウントID）
    pub account_id: String,
    /// 署名メッセージ本文
    pub message: String,
    /// 署名時点の最新ファイナライズ済みブロックハッシュ（Base58）
    pub block_id: String,
    /// Base64エンコードされた公開鍵の生バイト列
    pub public_key: String,
    /// 鍵種別番号
    pub key_type: u8,
}

// ---------------------------------------------------------------------------
// ブロードキャスト結果
// ---------------------------------------------------------------------------

/// 署名済みトランザクション1件を送信した結果（RPCが返すJSONそのまま）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionOutcome(pub serde_json::Value);

impl ExecutionOutcome {
    /// 送信したトランザクションのハッシュ。
    pub fn transaction_hash(&self) -> Option<&str> {
        self.0.get("transaction")?.get("hash")?.as_str()
    }

    /// 実行ステータスが成功かどうか。
    pub fn is_success(&self) -> bool {
        match self.0.get("status") {
            Some(status) => {
                status.get("SuccessValue").is_some() || status.get("SuccessReceiptId").is_some()
            }
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP API 型
// ---------------------------------------------------------------------------

/// ページの状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PageStatus {
    /// ユーザーの承認待ち
    AwaitingApproval,
    /// セッション初期化に失敗し、停止中
    Stalled,
}

/// GET /bridge のレスポンス。利用者がリクエスト内容を確認するための表示情報。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageView {
    pub page_id: String,
    pub status: PageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_provider: Option<String>,
    /// デコード済みトランザクション（署名系アクションのみ）
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transactions: Vec<Transaction>,
}
