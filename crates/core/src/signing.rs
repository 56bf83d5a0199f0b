//! # 署名エンジン
//!
//! サインイン用メッセージ署名、トランザクション署名、順次ブロードキャストを行う。
//!
//! ## バッチの扱い
//! - 署名はバッチ全体を入力順に行う。i番目のnonceは `アクセスキーのnonce + i + 1`
//! - 送信は1件ずつ入力順に行い、失敗した時点で中断する
//! - 送信済みのトランザクションは取り消さず、残りは送信しない
//! - 中断時のエラー（`BatchAborted`）には送信済み分の実行結果を含める

use std::sync::Arc;

use base58::FromBase58;
use base64::Engine;

use bridge_crypto::InMemorySigner;
use bridge_types::{ExecutionOutcome, NetworkPreset, SigningPayload, Transaction};

use crate::b64;
use crate::blockchain::near_tx::{ChainTransaction, SignedTransaction};
use crate::blockchain::rpc::{ChainRpc, RpcConnector};
use crate::error::BridgeError;
use crate::guard::CallGuard;
use crate::network::resolve_preset;
use crate::request::encode_payload;

/// サインイン用の署名結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedMessage {
    /// 署名者が報告した鍵種別を反映したペイロード
    pub payload: SigningPayload,
    /// `payload` のBase64 JSON
    pub encoded_payload: String,
    /// Base64エンコードされた署名
    pub signature: String,
}

/// 署名エンジン。
pub struct SigningEngine {
    connector: Arc<dyn RpcConnector>,
    guard: CallGuard,
}

impl SigningEngine {
    pub fn new(connector: Arc<dyn RpcConnector>, guard: CallGuard) -> Self {
        Self { connector, guard }
    }

    fn rpc_for(&self, preset: &NetworkPreset) -> Arc<dyn ChainRpc> {
        self.connector.connect(preset)
    }

    async fn latest_block_hash(&self, rpc: &dyn ChainRpc) -> Result<String, BridgeError> {
        Ok(self
            .guard
            .run("block query", rpc.latest_final_block_hash())
            .await??)
    }

    async fn broadcast(
        &self,
        rpc: &dyn ChainRpc,
        signed: &SignedTransaction,
        index: usize,
    ) -> Result<ExecutionOutcome, BridgeError> {
        let encoded = signed.encode()?;
        self.guard
            .run("broadcast", rpc.send_transaction(&encoded))
            .await?
            .map_err(|e| BridgeError::Rpc(format!("{index}番目のトランザクションの送信に失敗: {e}")))
    }

    /// サインイン用ペイロードを組み立てて署名する。
    ///
    /// 署名対象はペイロードのJSONバイト列。返却するペイロードの `keyType` は
    /// 署名者が報告した値で置き換える。
    pub async fn sign_in_payload(
        &self,
        signer: &InMemorySigner,
        account_id: &str,
        network_id: &str,
        message: &str,
    ) -> Result<SignedMessage, BridgeError> {
        let preset = resolve_preset(network_id)?;
        let rpc = self.rpc_for(&preset);

        let public_key = signer
            .get_public_key(account_id, network_id)
            .map_err(|e| BridgeError::KeyDerivation(e.to_string()))?;
        let block_id = self.latest_block_hash(rpc.as_ref()).await?;

        let payload = SigningPayload {
            account_id: account_id.to_string(),
            message: message.to_string(),
            block_id,
            public_key: b64().encode(public_key.data),
            key_type: public_key.key_type.as_u8(),
        };
        let payload_bytes = serde_json::to_vec(&payload).map_err(|e| {
            BridgeError::InvalidParameter(format!("署名ペイロードのシリアライズに失敗: {e}"))
        })?;

        let signed = signer
            .sign_message(&payload_bytes, account_id, network_id)
            .map_err(|e| BridgeError::KeyDerivation(e.to_string()))?;

        let payload = SigningPayload {
            key_type: signed.key_type().as_u8(),
            ..payload
        };
        tracing::info!(account_id, block_id = %payload.block_id, "サインインメッセージに署名しました");

        Ok(SignedMessage {
            encoded_payload: encode_payload(&payload)?,
            signature: b64().encode(signed.signature.to_bytes()),
            payload,
        })
    }

    /// トランザクション群に入力順で署名する。
    pub async fn sign_transactions(
        &self,
        transactions: &[Transaction],
        signer: &InMemorySigner,
        preset: &NetworkPreset,
    ) -> Result<Vec<SignedTransaction>, BridgeError> {
        let rpc = self.rpc_for(preset);
        let mut signed_transactions = Vec::with_capacity(transactions.len());

        for (index, transaction) in transactions.iter().enumerate() {
            let public_key = signer
                .get_public_key(&transaction.signer_id, &preset.network_id)
                .map_err(|e| BridgeError::TransactionSigning(e.to_string()))?;

            let block_hash = self.latest_block_hash(rpc.as_ref()).await?;
            let access_key = self
                .guard
                .run(
                    "access key query",
                    rpc.view_access_key(&transaction.signer_id, &public_key.to_string()),
                )
                .await??;

            let nonce = access_key
                .nonce
                .checked_add(index as u64 + 1)
                .ok_or_else(|| BridgeError::TransactionSigning("nonceがオーバーフローしました".to_string()))?;
            let chain_tx = ChainTransaction::from_wallet(
                transaction,
                &public_key,
                nonce,
                decode_block_hash(&block_hash)?,
            )?;

            let signed = signer
                .sign_message(&chain_tx.to_bytes()?, &transaction.signer_id, &preset.network_id)
                .map_err(|e| BridgeError::TransactionSigning(e.to_string()))?;

            tracing::debug!(
                index,
                signer_id = %transaction.signer_id,
                receiver_id = %transaction.receiver_id,
                nonce,
                "トランザクションに署名しました"
            );
            signed_transactions.push(SignedTransaction::new(chain_tx, &signed.signature));
        }

        Ok(signed_transactions)
    }

    /// トランザクション1件に署名する。
    pub async fn sign_transaction(
        &self,
        transaction: &Transaction,
        signer: &InMemorySigner,
        network_id: &str,
    ) -> Result<SignedTransaction, BridgeError> {
        let preset = resolve_preset(network_id)?;
        self.sign_transactions(std::slice::from_ref(transaction), signer, &preset)
            .await?
            .pop()
            .ok_or_else(|| BridgeError::TransactionSigning("署名結果がありません".to_string()))
    }

    /// バッチ全体に署名してから、1件ずつ順番に送信する。
    ///
    /// 送信に失敗した時点で `BatchAborted` を返す。それまでに送信したトランザクションは
    /// 取り消さず、その実行結果をエラーに含める。
    pub async fn sign_and_send_transactions(
        &self,
        transactions: &[Transaction],
        signer: &InMemorySigner,
        network_id: &str,
    ) -> Result<Vec<ExecutionOutcome>, BridgeError> {
        let preset = resolve_preset(network_id)?;
        let signed_transactions = self.sign_transactions(transactions, signer, &preset).await?;
        let rpc = self.rpc_for(&preset);

        let mut outcomes = Vec::with_capacity(signed_transactions.len());
        for (index, signed) in signed_transactions.iter().enumerate() {
            let outcome = match self.broadcast(rpc.as_ref(), signed, index).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(index, error = %e, "トランザクションの送信に失敗しました。以降の送信を中止します");
                    return Err(BridgeError::BatchAborted {
                        committed: outcomes,
                        source: Box::new(e),
                    });
                }
            };

            if !outcome.is_success() {
                tracing::warn!(index, outcome = %outcome.0, "トランザクションの実行が成功していません");
            }
            tracing::info!(
                index,
                tx_hash = outcome.transaction_hash().unwrap_or_default(),
                "トランザクションを送信しました"
            );
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }
}

/// Base58のブロックハッシュを32バイトに変換する。
fn decode_block_hash(block_hash: &str) -> Result<[u8; 32], BridgeError> {
    let bytes = block_hash
        .from_base58()
        .map_err(|e| BridgeError::Rpc(format!("ブロックハッシュのBase58デコードに失敗: {e:?}")))?;
    bytes
        .try_into()
        .map_err(|_| BridgeError::Rpc("ブロックハッシュは32バイトである必要があります".to_string()))
}
