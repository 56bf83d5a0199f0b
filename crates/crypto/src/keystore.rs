//! # メモリ内鍵ストアと署名器
//!
//! 導出した鍵ペアは `(network_id, account_id)` をキーとしてメモリ内にのみ保持する。
//! 永続化は行わず、ストアの破棄とともに鍵も破棄される。

use std::collections::HashMap;

use crate::{sha256, CryptoError, Ed25519KeyPair, Ed25519Signature, KeyType, PublicKey};

/// メモリ内鍵ストア。
#[derive(Debug, Default)]
pub struct InMemoryKeyStore {
    keys: HashMap<(String, String), Ed25519KeyPair>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 鍵を登録する。同じキーの既存エントリは置き換える。
    pub fn set_key(&mut self, network_id: &str, account_id: &str, key_pair: Ed25519KeyPair) {
        self.keys
            .insert((network_id.to_string(), account_id.to_string()), key_pair);
    }

    pub fn get_key(&self, network_id: &str, account_id: &str) -> Option<&Ed25519KeyPair> {
        self.keys
            .get(&(network_id.to_string(), account_id.to_string()))
    }
}

/// メッセージ署名の結果。
#[derive(Debug, Clone)]
pub struct MessageSignature {
    pub signature: Ed25519Signature,
    pub public_key: PublicKey,
}

impl MessageSignature {
    /// 署名者が報告する鍵種別。
    pub fn key_type(&self) -> KeyType {
        self.public_key.key_type
    }
}

/// 鍵ストアを使う署名器。
///
/// 署名対象はSHA-256でハッシュしてからEd25519で署名する。
#[derive(Debug, Default)]
pub struct InMemorySigner {
    key_store: InMemoryKeyStore,
}

impl InMemorySigner {
    pub fn new(key_store: InMemoryKeyStore) -> Self {
        Self { key_store }
    }

    /// アカウントの公開鍵を返す。
    pub fn get_public_key(
        &self,
        account_id: &str,
        network_id: &str,
    ) -> Result<PublicKey, CryptoError> {
        Ok(self.key_pair(account_id, network_id)?.public_key())
    }

    /// メッセージのSHA-256ハッシュに署名する。
    pub fn sign_message(
        &self,
        message: &[u8],
        account_id: &str,
        network_id: &str,
    ) -> Result<MessageSignature, CryptoError> {
        let key_pair = self.key_pair(account_id, network_id)?;
        let hash = sha256(message);
        Ok(MessageSignature {
            signature: key_pair.sign(&hash),
            public_key: key_pair.public_key(),
        })
    }

    fn key_pair(&self, account_id: &str, network_id: &str) -> Result<&Ed25519KeyPair, CryptoError> {
        self.key_store
            .get_key(network_id, account_id)
            .ok_or_else(|| CryptoError::KeyNotFound {
                network_id: network_id.to_string(),
                account_id: account_id.to_string(),
            })
    }
}
