//! # リクエストパーサ
//!
//! ページURLのクエリ文字列を `UrlParams` に読み込み、アクションごとの
//! 必須項目を検証して `BridgeRequest` に変換する。
//!
//! ## 処理フロー
//! 1. クエリ文字列をパースする（純粋関数、同じURLからは常に同じ結果）
//! 2. アクション名を解決する
//! 3. アクションごとの必須項目を確認し、Base64 JSONペイロードをデコードする
//!
//! 検証はカストディプロバイダへの一切の呼び出しより前に完了する。

use std::borrow::Cow;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use bridge_types::{ActionKind, Transaction, UrlParams};

use crate::b64;
use crate::error::BridgeError;

// ---------------------------------------------------------------------------
// クエリ文字列のパース
// ---------------------------------------------------------------------------

/// ページURL全体からパラメータを読み込む。
pub fn parse_url_params(page_url: &str) -> Result<UrlParams, BridgeError> {
    let url = Url::parse(page_url)
        .map_err(|e| BridgeError::InvalidParameter(format!("ページURLのパースに失敗: {e}")))?;
    Ok(params_from_pairs(url.query_pairs()))
}

/// クエリ文字列（`?` を含まない）からパラメータを読み込む。
pub fn parse_query(query: &str) -> UrlParams {
    params_from_pairs(url::form_urlencoded::parse(query.as_bytes()))
}

/// 同じキーが複数ある場合は最初の値を採用する。
fn params_from_pairs<'a>(pairs: impl Iterator<Item = (Cow<'a, str>, Cow<'a, str>)>) -> UrlParams {
    let mut params = UrlParams::default();
    for (key, value) in pairs {
        let slot = match key.as_ref() {
            "action" => &mut params.action,
            "originUrl" => &mut params.origin_url,
            "clientId" => &mut params.client_id,
            "loginProvider" => &mut params.login_provider,
            "email" => &mut params.email,
            "contractId" => &mut params.contract_id,
            "transaction" => &mut params.transaction,
            "transactions" => &mut params.transactions,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value.into_owned());
        }
    }
    params
}

// ---------------------------------------------------------------------------
// 検証済みリクエスト
// ---------------------------------------------------------------------------

/// 検証済みのブリッジリクエスト。
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeRequest {
    /// カストディプロバイダのクライアントID
    pub client_id: String,
    /// 表示用のコントラクトID
    pub contract_id: Option<String>,
    /// アクションと、そのアクションに必要な項目
    pub action: ActionRequest,
}

/// アクションごとに必要な項目だけを持つリクエスト。
#[derive(Debug, Clone, PartialEq)]
pub enum ActionRequest {
    SignIn {
        origin_url: Url,
        login_provider: String,
        email: Option<String>,
    },
    SignOut {
        origin_url: Url,
    },
    SignTransaction {
        origin_url: Url,
        transaction: Transaction,
    },
    /// `transactions` は1件以上。空のバッチは読み込み時に `InvalidParameter` で拒否し、
    /// オリジンへは戻らない
    SignAndSendTransactions {
        origin_url: Url,
        transactions: Vec<Transaction>,
    },
}

impl ActionRequest {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionRequest::SignIn { .. } => ActionKind::SignIn,
            ActionRequest::SignOut { .. } => ActionKind::SignOut,
            ActionRequest::SignTransaction { .. } => ActionKind::SignTransaction,
            ActionRequest::SignAndSendTransactions { .. } => ActionKind::SignAndSendTransactions,
        }
    }

    /// 結果の返却先URL。
    pub fn origin_url(&self) -> &Url {
        match self {
            ActionRequest::SignIn { origin_url, .. }
            | ActionRequest::SignOut { origin_url }
            | ActionRequest::SignTransaction { origin_url, .. }
            | ActionRequest::SignAndSendTransactions { origin_url, .. } => origin_url,
        }
    }

    /// 利用者の確認用に表示するトランザクション。
    pub fn transactions(&self) -> &[Transaction] {
        match self {
            ActionRequest::SignTransaction { transaction, .. } => std::slice::from_ref(transaction),
            ActionRequest::SignAndSendTransactions { transactions, .. } => transactions,
            _ => &[],
        }
    }
}

impl TryFrom<&UrlParams> for BridgeRequest {
    type Error = BridgeError;

    fn try_from(params: &UrlParams) -> Result<Self, Self::Error> {
        let action_name = required(&params.action, "action")?;
        let kind = ActionKind::from_param(action_name).ok_or_else(|| {
            BridgeError::InvalidParameter(format!("未知のアクションです: {action_name}"))
        })?;

        let client_id = required(&params.client_id, "clientId")?.to_string();
        let origin_url = parse_origin_url(required(&params.origin_url, "originUrl")?)?;

        let action = match kind {
            ActionKind::SignIn => ActionRequest::SignIn {
                origin_url,
                login_provider: required(&params.login_provider, "loginProvider")?.to_string(),
                email: optional(&params.email),
            },
            ActionKind::SignOut => ActionRequest::SignOut { origin_url },
            ActionKind::SignTransaction => ActionRequest::SignTransaction {
                origin_url,
                transaction: decode_payload(
                    "transaction",
                    required(&params.transaction, "transaction")?,
                )?,
            },
            ActionKind::SignAndSendTransactions => {
                let transactions: Vec<Transaction> = decode_payload(
                    "transactions",
                    required(&params.transactions, "transactions")?,
                )?;
                // 空のバッチは成功扱いで戻さず、不正なパラメータとして止める
                if transactions.is_empty() {
                    return Err(BridgeError::InvalidParameter(
                        "transactionsが空です".to_string(),
                    ));
                }
                ActionRequest::SignAndSendTransactions {
                    origin_url,
                    transactions,
                }
            }
        };

        Ok(BridgeRequest {
            client_id,
            contract_id: optional(&params.contract_id),
            action,
        })
    }
}

/// 空文字列は未指定として扱う。
fn required<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, BridgeError> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(BridgeError::MissingParameter(name)),
    }
}

fn optional(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|v| !v.is_empty()).map(str::to_string)
}

fn parse_origin_url(value: &str) -> Result<Url, BridgeError> {
    Url::parse(value)
        .map_err(|e| BridgeError::InvalidParameter(format!("originUrlのパースに失敗: {e}")))
}

// ---------------------------------------------------------------------------
// Base64 JSON ペイロード
// ---------------------------------------------------------------------------

/// Base64(JSON) ペイロードをデコードする。
///
/// パディングの有無、URL-safeアルファベット、クエリ上で空白に化けた `+` を許容する。
pub fn decode_payload<T: DeserializeOwned>(
    field: &'static str,
    encoded: &str,
) -> Result<T, BridgeError> {
    let bytes = decode_base64_lenient(encoded)
        .map_err(|e| BridgeError::InvalidParameter(format!("{field}のBase64デコードに失敗: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| BridgeError::InvalidParameter(format!("{field}のJSONパースに失敗: {e}")))
}

/// 値をJSONにしてBase64(Standard)でエンコードする。
pub fn encode_payload<T: Serialize>(value: &T) -> Result<String, BridgeError> {
    let json = serde_json::to_vec(value)
        .map_err(|e| BridgeError::InvalidParameter(format!("ペイロードのシリアライズに失敗: {e}")))?;
    Ok(b64().encode(json))
}

fn decode_base64_lenient(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let config = GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
    let normalized: String = encoded
        .trim()
        .chars()
        .map(|c| if c == ' ' { '+' } else { c })
        .collect();

    GeneralPurpose::new(&alphabet::STANDARD, config)
        .decode(&normalized)
        .or_else(|_| GeneralPurpose::new(&alphabet::URL_SAFE, config).decode(&normalized))
}
