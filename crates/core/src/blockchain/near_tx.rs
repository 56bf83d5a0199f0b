//! # NEARトランザクション構築ヘルパー
//!
//! ウォレット形式のJSONトランザクションをチェーンのborsh表現に変換し、署名する。
//!
//! ## エンコーディング
//! - 金額（deposit, stake, allowance）: u128 リトルエンディアン
//! - gas, nonce: u64 リトルエンディアン
//! - 公開鍵・署名: 鍵種別(u8) + 生バイト列
//! - 署名対象: SHA-256(borsh(Transaction))

use base64::Engine;
use borsh::{BorshDeserialize, BorshSerialize};

use bridge_crypto::{Ed25519Signature, PublicKey};
use bridge_types::{AccessKeyPermission, Action, Transaction};

use crate::b64;
use crate::error::BridgeError;

/// チェーン上の公開鍵表現。
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub enum ChainPublicKey {
    Ed25519([u8; 32]),
}

impl From<&PublicKey> for ChainPublicKey {
    fn from(public_key: &PublicKey) -> Self {
        ChainPublicKey::Ed25519(public_key.data)
    }
}

/// チェーン上の署名表現。
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub enum ChainSignature {
    Ed25519([u8; 64]),
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub enum ChainAccessKeyPermission {
    FunctionCall {
        allowance: Option<u128>,
        receiver_id: String,
        method_names: Vec<String>,
    },
    FullAccess,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChainAccessKey {
    pub nonce: u64,
    pub permission: ChainAccessKeyPermission,
}

/// チェーン上のアクション。バリアントの順序がborshの判別子になる。
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub enum ChainAction {
    CreateAccount,
    DeployContract {
        code: Vec<u8>,
    },
    FunctionCall {
        method_name: String,
        args: Vec<u8>,
        gas: u64,
        deposit: u128,
    },
    Transfer {
        deposit: u128,
    },
    Stake {
        stake: u128,
        public_key: ChainPublicKey,
    },
    AddKey {
        public_key: ChainPublicKey,
        access_key: ChainAccessKey,
    },
    DeleteKey {
        public_key: ChainPublicKey,
    },
    DeleteAccount {
        beneficiary_id: String,
    },
}

/// 署名前のトランザクション。
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChainTransaction {
    pub signer_id: String,
    pub public_key: ChainPublicKey,
    pub nonce: u64,
    pub receiver_id: String,
    pub block_hash: [u8; 32],
    pub actions: Vec<ChainAction>,
}

impl ChainTransaction {
    /// ウォレット形式のトランザクションから構築する。
    pub fn from_wallet(
        transaction: &Transaction,
        public_key: &PublicKey,
        nonce: u64,
        block_hash: [u8; 32],
    ) -> Result<Self, BridgeError> {
        let actions = transaction
            .actions
            .iter()
            .map(convert_action)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            signer_id: transaction.signer_id.clone(),
            public_key: public_key.into(),
            nonce,
            receiver_id: transaction.receiver_id.clone(),
            block_hash,
            actions,
        })
    }

    /// borshエンコードしたバイト列（署名対象のハッシュ前）。
    pub fn to_bytes(&self) -> Result<Vec<u8>, BridgeError> {
        borsh::to_vec(self).map_err(|e| {
            BridgeError::TransactionSigning(format!("トランザクションのシリアライズに失敗: {e}"))
        })
    }
}

/// 署名済みトランザクション。
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub transaction: ChainTransaction,
    pub signature: ChainSignature,
}

impl SignedTransaction {
    pub fn new(transaction: ChainTransaction, signature: &Ed25519Signature) -> Self {
        Self {
            transaction,
            signature: ChainSignature::Ed25519(signature.to_bytes()),
        }
    }

    /// ブロードキャスト・リダイレクトに使うborshバイト列。
    pub fn encode(&self) -> Result<Vec<u8>, BridgeError> {
        borsh::to_vec(self).map_err(|e| {
            BridgeError::TransactionSigning(format!("署名済みトランザクションのシリアライズに失敗: {e}"))
        })
    }
}

fn convert_action(action: &Action) -> Result<ChainAction, BridgeError> {
    Ok(match action {
        Action::CreateAccount => ChainAction::CreateAccount,
        Action::DeployContract(deploy) => ChainAction::DeployContract {
            code: b64().decode(&deploy.code).map_err(|e| {
                BridgeError::TransactionSigning(format!("コントラクトコードのBase64デコードに失敗: {e}"))
            })?,
        },
        Action::FunctionCall(call) => ChainAction::FunctionCall {
            method_name: call.method_name.clone(),
            args: serde_json::to_vec(&call.args).map_err(|e| {
                BridgeError::TransactionSigning(format!("引数のシリアライズに失敗: {e}"))
            })?,
            gas: parse_amount("gas", &call.gas)?,
            deposit: parse_amount("deposit", &call.deposit)?,
        },
        Action::Transfer(transfer) => ChainAction::Transfer {
            deposit: parse_amount("deposit", &transfer.deposit)?,
        },
        Action::Stake(stake) => ChainAction::Stake {
            stake: parse_amount("stake", &stake.stake)?,
            public_key: parse_public_key(&stake.public_key)?,
        },
        Action::AddKey(add) => ChainAction::AddKey {
            public_key: parse_public_key(&add.public_key)?,
            access_key: ChainAccessKey {
                nonce: add.access_key.nonce.unwrap_or(0),
                permission: match &add.access_key.permission {
                    AccessKeyPermission::FullAccess(_) => ChainAccessKeyPermission::FullAccess,
                    AccessKeyPermission::FunctionCall(permission) => {
                        ChainAccessKeyPermission::FunctionCall {
                            allowance: permission
                                .allowance
                                .as_deref()
                                .map(|a| parse_amount("allowance", a))
                                .transpose()?,
                            receiver_id: permission.receiver_id.clone(),
                            method_names: permission.method_names.clone(),
                        }
                    }
                },
            },
        },
        Action::DeleteKey(delete) => ChainAction::DeleteKey {
            public_key: parse_public_key(&delete.public_key)?,
        },
        Action::DeleteAccount(delete) => ChainAction::DeleteAccount {
            beneficiary_id: delete.beneficiary_id.clone(),
        },
    })
}

/// 10進数文字列の数量をパースする。
fn parse_amount<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, BridgeError>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| BridgeError::TransactionSigning(format!("{field}が不正です ({value}): {e}")))
}

fn parse_public_key(value: &str) -> Result<ChainPublicKey, BridgeError> {
    let public_key = PublicKey::parse(value)
        .map_err(|e| BridgeError::TransactionSigning(e.to_string()))?;
    Ok((&public_key).into())
}
