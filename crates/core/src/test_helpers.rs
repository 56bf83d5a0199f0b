//! # テスト用共通ヘルパー
//!
//! 署名エンジン・オーケストレータのテストで共有するモックRPCと鍵ストア。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use base58::ToBase58;

use bridge_crypto::{derive_key_material, InMemoryKeyStore, InMemorySigner};
use bridge_types::{Action, ExecutionOutcome, NetworkPreset, Transaction, TransferAction};

use crate::blockchain::rpc::{AccessKeyView, ChainRpc, RpcConnector, RpcError};

#[derive(Debug, Clone, Default)]
pub struct MockRpcOptions {
    pub access_key_nonce: u64,
    /// 指定した番号（0始まり）の送信を失敗させる
    pub fail_submission_at: Option<usize>,
    pub submission_delay: Option<Duration>,
    pub fail_block: bool,
}

/// 送信内容を記録するモックRPC。
pub struct MockRpc {
    options: MockRpcOptions,
    submissions: Mutex<Vec<Vec<u8>>>,
    connected_nodes: Mutex<Vec<String>>,
}

impl MockRpc {
    pub fn new(options: MockRpcOptions) -> Arc<Self> {
        Arc::new(Self {
            options,
            submissions: Mutex::new(Vec::new()),
            connected_nodes: Mutex::new(Vec::new()),
        })
    }

    pub fn connector(self: &Arc<Self>) -> Arc<dyn RpcConnector> {
        Arc::new(MockConnector(self.clone()))
    }

    /// モックが返すブロックハッシュ（Base58）
    pub fn block_hash(&self) -> String {
        [7u8; 32].to_base58()
    }

    /// i番目の送信結果に入るトランザクションハッシュ
    pub fn outcome_hash(index: usize) -> String {
        format!("tx-{index}")
    }

    /// 送信された署名済みトランザクション（試行順）
    pub fn submissions(&self) -> Vec<Vec<u8>> {
        self.submissions.lock().unwrap().clone()
    }

    /// 接続に使われたノードURL
    pub fn connected_nodes(&self) -> Vec<String> {
        self.connected_nodes.lock().unwrap().clone()
    }
}

struct MockConnector(Arc<MockRpc>);

impl RpcConnector for MockConnector {
    fn connect(&self, preset: &NetworkPreset) -> Arc<dyn ChainRpc> {
        self.0
            .connected_nodes
            .lock()
            .unwrap()
            .push(preset.node_url.clone());
        self.0.clone()
    }
}

#[async_trait::async_trait]
impl ChainRpc for MockRpc {
    async fn latest_final_block_hash(&self) -> Result<String, RpcError> {
        if self.options.fail_block {
            return Err(RpcError::Node("block: UNKNOWN_BLOCK".to_string()));
        }
        Ok(self.block_hash())
    }

    async fn view_access_key(
        &self,
        _account_id: &str,
        _public_key: &str,
    ) -> Result<AccessKeyView, RpcError> {
        Ok(AccessKeyView {
            nonce: self.options.access_key_nonce,
            block_hash: self.block_hash(),
        })
    }

    async fn send_transaction(&self, signed_tx: &[u8]) -> Result<ExecutionOutcome, RpcError> {
        if let Some(delay) = self.options.submission_delay {
            tokio::time::sleep(delay).await;
        }
        let index = {
            let mut submissions = self.submissions.lock().unwrap();
            submissions.push(signed_tx.to_vec());
            submissions.len() - 1
        };
        if self.options.fail_submission_at == Some(index) {
            return Err(RpcError::Node("broadcast_tx_commit: INVALID_TRANSACTION".to_string()));
        }
        Ok(ExecutionOutcome(serde_json::json!({
            "status": {"SuccessValue": ""},
            "transaction": {"hash": MockRpc::outcome_hash(index)},
        })))
    }
}

/// 秘密値から導出した鍵を登録した署名器とアカウントIDを返す。
pub fn signer_for_secret(secret: &str, network_id: &str) -> (InMemorySigner, String) {
    let material = derive_key_material(secret).unwrap();
    let mut store = InMemoryKeyStore::new();
    store.set_key(network_id, &material.account_id, material.key_pair);
    (InMemorySigner::new(store), material.account_id)
}

/// 1 yoctoNEARを送金するトランザクション。
pub fn transfer(signer_id: &str, receiver_id: &str) -> Transaction {
    Transaction {
        signer_id: signer_id.to_string(),
        receiver_id: receiver_id.to_string(),
        actions: vec![Action::Transfer(TransferAction {
            deposit: "1".to_string(),
        })],
    }
}
