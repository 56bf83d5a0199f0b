//! # リダイレクト構築
//!
//! オリジンURLに結果パラメータを設定したリダイレクト先を作る。
//! 同名のパラメータが既にある場合は最初の位置で値を置き換え、残りを削除する。
//!
//! | アクション | 追加するパラメータ |
//! |-----------|------------------|
//! | signIn | `web3authVerify`, `signature` |
//! | signTransaction | `signedTransaction` |
//! | signAndSendTransactions | なし |
//! | signOut / 拒否 | なし |

use url::Url;

/// 署名済みペイロードのパラメータ名
pub const VERIFY_PARAM: &str = "web3authVerify";
/// 署名のパラメータ名
pub const SIGNATURE_PARAM: &str = "signature";
/// 署名済みトランザクションのパラメータ名
pub const SIGNED_TRANSACTION_PARAM: &str = "signedTransaction";

/// リダイレクト先。HTTP層が303で遷移させる。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub location: Url,
}

impl Redirect {
    /// オリジンURLへそのまま戻る。
    pub fn to_origin(origin_url: &Url) -> Self {
        Self {
            location: origin_url.clone(),
        }
    }

    /// サインイン結果を付けて戻る。
    pub fn sign_in(origin_url: &Url, encoded_payload: &str, signature: &str) -> Self {
        Self::with_params(
            origin_url,
            &[(VERIFY_PARAM, encoded_payload), (SIGNATURE_PARAM, signature)],
        )
    }

    /// 署名済みトランザクションを付けて戻る。
    pub fn signed_transaction(origin_url: &Url, encoded_transaction: &str) -> Self {
        Self::with_params(origin_url, &[(SIGNED_TRANSACTION_PARAM, encoded_transaction)])
    }

    pub fn as_str(&self) -> &str {
        self.location.as_str()
    }

    fn with_params(origin_url: &Url, params: &[(&str, &str)]) -> Self {
        let mut pairs: Vec<(String, String)> = origin_url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        for (key, value) in params {
            match pairs.iter().position(|(k, _)| k == key) {
                Some(first) => {
                    pairs[first].1 = value.to_string();
                    let mut index = 0;
                    pairs.retain(|(k, _)| {
                        let keep = index <= first || k != key;
                        index += 1;
                        keep
                    });
                }
                None => pairs.push((key.to_string(), value.to_string())),
            }
        }

        let mut location = origin_url.clone();
        location.query_pairs_mut().clear().extend_pairs(pairs);
        Self { location }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// サインイン結果のパラメータが追加されることを確認
    #[test]
    fn test_sign_in_redirect() {
        let origin = Url::parse("https://app.example/cb").unwrap();
        let redirect = Redirect::sign_in(&origin, "eyJ9+/=", "c2ln");
        assert_eq!(redirect.location.path(), "/cb");

        let pairs: Vec<(String, String)> = redirect
            .location
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("web3authVerify".to_string(), "eyJ9+/=".to_string()),
                ("signature".to_string(), "c2ln".to_string()),
            ]
        );
    }

    /// 既存のパラメータは保持され、同名パラメータは置き換えられる
    #[test]
    fn test_params_are_set_not_duplicated() {
        let origin =
            Url::parse("https://app.example/cb?signedTransaction=old&keep=1&signedTransaction=dup#frag")
                .unwrap();
        let redirect = Redirect::signed_transaction(&origin, "new");
        assert_eq!(
            redirect.as_str(),
            "https://app.example/cb?signedTransaction=new&keep=1#frag"
        );
    }

    /// 送信完了・ログアウト・拒否はオリジンURLをそのまま返す
    #[test]
    fn test_origin_unchanged() {
        let origin = Url::parse("https://app.example/cb?state=xyz").unwrap();
        assert_eq!(Redirect::to_origin(&origin).location, origin);
    }
}
