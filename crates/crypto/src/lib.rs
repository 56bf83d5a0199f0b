//! # Custody Bridge 暗号処理
//!
//! カストディプロバイダが返す秘密値からEd25519鍵ペアを決定的に導出し、
//! メモリ内の鍵ストアを使ってメッセージ・トランザクションに署名する。
//!
//! ## 暗号アルゴリズム
//! | 用途 | アルゴリズム |
//! |------|------------|
//! | 署名 | Ed25519 |
//! | 署名前ハッシュ | SHA-256 |
//! | 秘密鍵文字列 | `ed25519:` + Base58(seed ‖ 公開鍵) |
//! | アカウントID | Hex(公開鍵) |

mod keystore;

pub use keystore::{InMemoryKeyStore, InMemorySigner, MessageSignature};

use base58::{FromBase58, ToBase58};
use ed25519_dalek::{Signer, Verifier};
use sha2::{Digest, Sha256};

pub use ed25519_dalek::{
    Signature as Ed25519Signature, SigningKey as Ed25519SigningKey,
    VerifyingKey as Ed25519VerifyingKey,
};

/// 鍵文字列のプレフィックス。
const ED25519_PREFIX: &str = "ed25519:";

/// 暗号処理のエラー型
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// カストディ秘密値が鍵の種として使えない
    #[error("カストディ秘密値が不正です: {0}")]
    InvalidSecret(String),
    /// `ed25519:<base58>` 形式の鍵文字列が不正
    #[error("鍵文字列が不正です: {0}")]
    InvalidKeyString(String),
    /// 鍵ストアに該当する鍵がない
    #[error("鍵が見つかりません: network={network_id}, account={account_id}")]
    KeyNotFound {
        network_id: String,
        account_id: String,
    },
    /// Ed25519署名検証エラー
    #[error("Ed25519署名検証に失敗しました")]
    SignatureVerifyError,
}

// ---------------------------------------------------------------------------
// 公開鍵
// ---------------------------------------------------------------------------

/// 鍵種別。曲線はed25519に固定。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    Ed25519 = 0,
}

impl KeyType {
    /// 署名ペイロードに埋め込む番号
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// 鍵種別付きの公開鍵。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey {
    pub key_type: KeyType,
    pub data: [u8; 32],
}

impl PublicKey {
    /// Ed25519公開鍵から構築する。
    pub fn ed25519(verifying_key: &Ed25519VerifyingKey) -> Self {
        Self {
            key_type: KeyType::Ed25519,
            data: verifying_key.to_bytes(),
        }
    }

    /// `ed25519:<base58>` 形式の文字列をパースする。
    pub fn parse(value: &str) -> Result<Self, CryptoError> {
        let encoded = value.strip_prefix(ED25519_PREFIX).unwrap_or(value);
        let bytes = encoded
            .from_base58()
            .map_err(|e| CryptoError::InvalidKeyString(format!("Base58デコードに失敗: {e:?}")))?;
        let data: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKeyString("公開鍵は32バイトである必要があります".to_string())
        })?;
        Ok(Self {
            key_type: KeyType::Ed25519,
            data,
        })
    }

    /// 署名検証用の鍵に変換する。
    pub fn verifying_key(&self) -> Result<Ed25519VerifyingKey, CryptoError> {
        Ed25519VerifyingKey::from_bytes(&self.data)
            .map_err(|e| CryptoError::InvalidKeyString(format!("Ed25519公開鍵として不正: {e}")))
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{ED25519_PREFIX}{}", self.data.to_base58())
    }
}

// ---------------------------------------------------------------------------
// 鍵ペアと導出
// ---------------------------------------------------------------------------

/// Ed25519鍵ペア。`Debug`出力に秘密鍵は含めない。
pub struct Ed25519KeyPair {
    signing_key: Ed25519SigningKey,
}

impl Ed25519KeyPair {
    /// 32バイトのシードから鍵ペアを構築する。
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: Ed25519SigningKey::from_bytes(seed),
        }
    }

    /// `ed25519:<base58(seed ‖ 公開鍵)>` 形式の秘密鍵文字列から構築する。
    ///
    /// 後半32バイトの公開鍵がシードから計算した値と一致しない場合は拒否する。
    pub fn from_key_string(value: &str) -> Result<Self, CryptoError> {
        let encoded = value.strip_prefix(ED25519_PREFIX).ok_or_else(|| {
            CryptoError::InvalidKeyString("ed25519: プレフィックスがありません".to_string())
        })?;
        let bytes = encoded
            .from_base58()
            .map_err(|e| CryptoError::InvalidKeyString(format!("Base58デコードに失敗: {e:?}")))?;
        let keypair_bytes: [u8; 64] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKeyString("秘密鍵は64バイトである必要があります".to_string())
        })?;
        let signing_key = Ed25519SigningKey::from_keypair_bytes(&keypair_bytes)
            .map_err(|e| CryptoError::InvalidKeyString(format!("公開鍵が一致しません: {e}")))?;
        Ok(Self { signing_key })
    }

    /// 秘密鍵文字列にエンコードする。
    pub fn to_key_string(&self) -> String {
        format!(
            "{ED25519_PREFIX}{}",
            self.signing_key.to_keypair_bytes().to_base58()
        )
    }

    /// 公開鍵を返す。
    pub fn public_key(&self) -> PublicKey {
        PublicKey::ed25519(&self.signing_key.verifying_key())
    }

    /// データに署名する（ハッシュ化は呼び出し側の責務）。
    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        ed25519_sign(&self.signing_key, message)
    }
}

impl std::fmt::Debug for Ed25519KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519KeyPair")
            .field("public_key", &self.public_key().to_string())
            .finish_non_exhaustive()
    }
}

/// カストディ秘密値から導出した鍵素材。
#[derive(Debug)]
pub struct KeyMaterial {
    /// 導出したEd25519鍵ペア
    pub key_pair: Ed25519KeyPair,
    /// 公開鍵の生バイト列のHex表現
    pub account_id: String,
}

/// カストディ秘密値（Hex文字列）を32バイトのEd25519シードに変換する。
///
/// 先頭の`0x`は無視し、64桁未満（奇数桁を含む）の場合は左側を0で埋めて64桁にする。
/// 短い秘密値を切り詰めたり拒否したりはしない。64桁を超える場合はエラー。
pub fn ed25519_seed_from_secret(raw_secret: &str) -> Result<[u8; 32], CryptoError> {
    let trimmed = raw_secret.trim();
    let hex_str = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if hex_str.is_empty() {
        return Err(CryptoError::InvalidSecret("秘密値が空です".to_string()));
    }
    if hex_str.len() > 64 {
        return Err(CryptoError::InvalidSecret(format!(
            "秘密値が長すぎます: {}桁 (上限: 64桁)",
            hex_str.len()
        )));
    }
    let padded = format!("{hex_str:0>64}");
    let bytes = hex::decode(&padded)
        .map_err(|e| CryptoError::InvalidSecret(format!("Hexデコードに失敗: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidSecret("シードは32バイトである必要があります".to_string()))
}

/// カストディ秘密値から鍵ペアとアカウントIDを導出する。
///
/// 同じ秘密値からは常に同じ鍵ペアとアカウントIDが得られる。
/// シード → 秘密鍵文字列 → 鍵ペアの順に組み立て、文字列表現との往復を保証する。
pub fn derive_key_material(raw_secret: &str) -> Result<KeyMaterial, CryptoError> {
    let seed = ed25519_seed_from_secret(raw_secret)?;
    let encoded = Ed25519KeyPair::from_seed(&seed).to_key_string();
    let key_pair = Ed25519KeyPair::from_key_string(&encoded)?;
    let account_id = account_id_from_public_key(&key_pair.public_key());
    Ok(KeyMaterial {
        key_pair,
        account_id,
    })
}

/// 公開鍵の生バイト列を小文字HexにしたものをアカウントIDとする。
pub fn account_id_from_public_key(public_key: &PublicKey) -> String {
    hex::encode(public_key.data)
}

// ---------------------------------------------------------------------------
// プリミティブ
// ---------------------------------------------------------------------------

/// Ed25519による署名。
pub fn ed25519_sign(signing_key: &Ed25519SigningKey, message: &[u8]) -> Ed25519Signature {
    signing_key.sign(message)
}

/// Ed25519による署名検証。
pub fn ed25519_verify(
    verifying_key: &Ed25519VerifyingKey,
    message: &[u8],
    signature: &Ed25519Signature,
) -> Result<(), CryptoError> {
    verifying_key
        .verify(message, signature)
        .map_err(|_| CryptoError::SignatureVerifyError)
}

/// SHA-256ハッシュ計算。
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}
