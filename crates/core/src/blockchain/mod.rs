//! # ブロックチェーン連携モジュール
//!
//! NEARトランザクションのborshエンコードと、JSON-RPCノードへのアクセスを行う。

pub mod near_tx;
pub mod rpc;
