//! # ネットワークプリセット
//!
//! ネットワーク識別子から固定のエンドポイント群を解決する。
//! 認識するのは "mainnet" と "testnet" のみで、動的な設定は持たない。

use bridge_types::NetworkPreset;

use crate::error::BridgeError;

/// ネットワーク識別子に対応するプリセットを返す。
pub fn resolve_preset(network_id: &str) -> Result<NetworkPreset, BridgeError> {
    let (node_url, helper_url, explorer_url, indexer_url) = match network_id {
        "mainnet" => (
            "https://rpc.mainnet.near.org",
            "https://helper.mainnet.near.org",
            "https://explorer.near.org",
            "https://api.kitwallet.app",
        ),
        "testnet" => (
            "https://rpc.testnet.near.org",
            "https://helper.testnet.near.org",
            "https://explorer.testnet.near.org",
            "https://testnet-api.kitwallet.app",
        ),
        other => return Err(BridgeError::UnknownNetwork(other.to_string())),
    };

    Ok(NetworkPreset {
        network_id: network_id.to_string(),
        node_url: node_url.to_string(),
        helper_url: helper_url.to_string(),
        explorer_url: explorer_url.to_string(),
        indexer_url: indexer_url.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(preset: &NetworkPreset) -> [&str; 4] {
        [
            &preset.node_url,
            &preset.helper_url,
            &preset.explorer_url,
            &preset.indexer_url,
        ]
    }

    /// mainnetとtestnetが固定値で、URLが重複しないことを確認
    #[test]
    fn test_presets_are_fixed_and_disjoint() {
        let mainnet = resolve_preset("mainnet").unwrap();
        let testnet = resolve_preset("testnet").unwrap();

        assert_eq!(mainnet.network_id, "mainnet");
        assert_eq!(mainnet.node_url, "https://rpc.mainnet.near.org");
        assert_eq!(testnet.network_id, "testnet");
        assert_eq!(testnet.node_url, "https://rpc.testnet.near.org");

        for url in urls(&mainnet) {
            assert!(!urls(&testnet).contains(&url), "重複したURL: {url}");
        }

        // 同じ識別子は常に同じ結果
        assert_eq!(resolve_preset("testnet").unwrap(), testnet);
    }

    /// 未知のネットワークはUnknownNetworkになる
    #[test]
    fn test_unknown_network() {
        for id in ["devnet", "", "Mainnet"] {
            match resolve_preset(id) {
                Err(BridgeError::UnknownNetwork(name)) => assert_eq!(name, id),
                other => panic!("UnknownNetworkではありません: {other:?}"),
            }
        }
    }
}
