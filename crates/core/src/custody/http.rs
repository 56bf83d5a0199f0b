//! # HTTP中継カストディ
//!
//! カストディサービスのエンドポイントにJSONで中継する実装。
//!
//! ## 中継するパス
//! - `POST /init` — `{config, adapter}` → `{sessionId, connected}`
//! - `POST /connect` — `{sessionId, adapter, options}` → `{}`
//! - `POST /request` — `{sessionId, method}` → `{result}`
//! - `POST /logout` — `{sessionId}` → `{}`

use std::sync::Arc;

use serde::Deserialize;

use super::{
    AdapterConfig, ConnectOptions, CustodyClient, CustodyConfig, CustodyError, ProviderHandle,
    ProviderRequest, SharedProvider,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitResponse {
    session_id: String,
    #[serde(default)]
    connected: bool,
}

#[derive(Debug, Deserialize)]
struct RequestResponse {
    #[serde(default)]
    result: Option<String>,
}

/// カストディサービスへJSONを中継する。
async fn relay(
    http_client: &reqwest::Client,
    endpoint: &str,
    path: &str,
    body: serde_json::Value,
) -> Result<serde_json::Value, CustodyError> {
    let url = format!("{}{}", endpoint.trim_end_matches('/'), path);
    let response = http_client
        .post(&url)
        .json(&body)
        .send()
        .await
        .map_err(|e| CustodyError::Transport(format!("HTTP送信失敗: {e}")))?;

    let status = response.status();
    let response_body = response
        .text()
        .await
        .map_err(|e| CustodyError::Transport(format!("レスポンス読み取り失敗: {e}")))?;

    if !status.is_success() {
        return Err(CustodyError::Provider(format!(
            "カストディサービスがエラーを返しました: HTTP {} - {}",
            status, response_body
        )));
    }

    if response_body.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_str(&response_body)
        .map_err(|e| CustodyError::Transport(format!("レスポンスのパースに失敗: {e}")))
}

/// HTTP中継カストディクライアント。
pub struct HttpCustody {
    endpoint: String,
    http_client: reqwest::Client,
    adapter: Option<AdapterConfig>,
    session_id: Option<String>,
    provider: Option<Arc<HttpProvider>>,
}

impl HttpCustody {
    pub fn new(endpoint: &str, http_client: reqwest::Client) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            http_client,
            adapter: None,
            session_id: None,
            provider: None,
        }
    }

    fn open_provider(&self, session_id: &str) -> Arc<HttpProvider> {
        Arc::new(HttpProvider {
            endpoint: self.endpoint.clone(),
            http_client: self.http_client.clone(),
            session_id: session_id.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl CustodyClient for HttpCustody {
    fn configure_adapter(&mut self, adapter: AdapterConfig) -> Result<(), CustodyError> {
        self.adapter = Some(adapter);
        Ok(())
    }

    async fn init(&mut self, config: &CustodyConfig) -> Result<(), CustodyError> {
        let adapter = self
            .adapter
            .as_ref()
            .ok_or_else(|| CustodyError::AdapterNotConfigured(super::OPENLOGIN_ADAPTER.to_string()))?;

        let body = serde_json::json!({
            "config": config,
            "adapter": {"name": adapter.name(), "settings": adapter},
        });
        let result = relay(&self.http_client, &self.endpoint, "/init", body).await?;
        let init: InitResponse = serde_json::from_value(result)
            .map_err(|e| CustodyError::Transport(format!("initレスポンスのパースに失敗: {e}")))?;

        tracing::info!(connected = init.connected, "カストディサービスのセッションを開始しました");
        if init.connected {
            self.provider = Some(self.open_provider(&init.session_id));
        }
        self.session_id = Some(init.session_id);
        Ok(())
    }

    async fn connect_to(
        &mut self,
        adapter: &str,
        options: &ConnectOptions,
    ) -> Result<SharedProvider, CustodyError> {
        let session_id = self.session_id.clone().ok_or(CustodyError::NotInitialized)?;
        let body = serde_json::json!({
            "sessionId": session_id,
            "adapter": adapter,
            "options": options,
        });
        relay(&self.http_client, &self.endpoint, "/connect", body)
            .await
            .map_err(|e| match e {
                CustodyError::Provider(msg) => CustodyError::Login(msg),
                other => other,
            })?;

        let provider = self.open_provider(&session_id);
        self.provider = Some(provider.clone());
        Ok(provider)
    }

    fn provider(&self) -> Option<SharedProvider> {
        self.provider
            .as_ref()
            .map(|p| p.clone() as SharedProvider)
    }

    async fn logout(&mut self) -> Result<(), CustodyError> {
        let session_id = self.session_id.as_deref().ok_or(CustodyError::NotInitialized)?;
        let body = serde_json::json!({ "sessionId": session_id });
        relay(&self.http_client, &self.endpoint, "/logout", body).await?;
        self.provider = None;
        Ok(())
    }
}

/// HTTP中継のプロバイダハンドル。
struct HttpProvider {
    endpoint: String,
    http_client: reqwest::Client,
    session_id: String,
}

#[async_trait::async_trait]
impl ProviderHandle for HttpProvider {
    async fn request(&self, request: &ProviderRequest) -> Result<Option<String>, CustodyError> {
        let body = serde_json::json!({
            "sessionId": self.session_id,
            "method": request.method,
        });
        let result = relay(&self.http_client, &self.endpoint, "/request", body).await?;
        let response: RequestResponse = serde_json::from_value(result)
            .map_err(|e| CustodyError::Transport(format!("requestレスポンスのパースに失敗: {e}")))?;
        Ok(response.result)
    }
}
