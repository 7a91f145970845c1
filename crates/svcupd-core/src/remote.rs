//! Client for the local remote update agent.
//!
//! Each call is one JSON POST to the configured loopback endpoint followed by
//! a full read of the reply. There are no retries; every exchange is bounded
//! by the configured timeouts.

use tracing::{debug, info, warn};

use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::protocol::{RemoteUpdateRequest, RemoteUpdateResult};

pub struct RemoteUpdateClient {
    config: RemoteConfig,
    http: reqwest::Client,
}

impl RemoteUpdateClient {
    pub fn new(config: RemoteConfig) -> Result<Self> {
        // reqwest treats a zero duration as an immediate timeout
        if config.timeout_secs == 0 {
            return Err(Error::config("remote timeout_secs must be greater than zero"));
        }
        if config.connect_timeout_secs == 0 {
            return Err(Error::config(
                "remote connect_timeout_secs must be greater than zero",
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            // loopback only; never route through an environment proxy
            .no_proxy()
            // one connection per exchange
            .pool_max_idle_per_host(0)
            .build()
            .map_err(Error::Transport)?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// Ask the agent for its state. `interactive` defaults to true when the
    /// agent does not report it.
    pub async fn info(&self) -> Result<RemoteUpdateResult> {
        self.exchange(&RemoteUpdateRequest::info(), RemoteUpdateResult::info_defaults())
            .await?
            .into_result()
    }

    /// Ask the agent to restart the named service.
    pub async fn restart(&self, name: &str) -> Result<()> {
        info!("forwarding restart of {} to remote agent", name);
        self.exchange(&RemoteUpdateRequest::restart(name), RemoteUpdateResult::default())
            .await?
            .into_result()?;
        Ok(())
    }

    /// Ask the agent to update the named service from `update_file` in `update_folder`.
    pub async fn update(
        &self,
        name: &str,
        path: &str,
        update_file: &str,
        update_folder: &str,
    ) -> Result<()> {
        info!("forwarding update of {} to remote agent", name);
        let request = RemoteUpdateRequest::update(name, path, update_file, update_folder);
        self.exchange(&request, RemoteUpdateResult::default())
            .await?
            .into_result()?;
        Ok(())
    }

    async fn exchange(
        &self,
        request: &RemoteUpdateRequest,
        seed: RemoteUpdateResult,
    ) -> Result<RemoteUpdateResult> {
        let endpoint = self.config.endpoint();
        debug!("posting {:?} request to {}", request.action(), endpoint);

        let resp = self
            .http
            .post(&endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                warn!("remote agent at {} unreachable: {}", endpoint, e);
                Error::Transport(e)
            })?;

        let status = resp.status();
        let body = resp.bytes().await.map_err(Error::Transport)?;

        let result = seed.merge_json(&body).map_err(|e| match e {
            Error::Protocol(msg) if !status.is_success() => {
                Error::Protocol(format!("HTTP {}: {}", status, msg))
            }
            other => other,
        })?;

        if !result.is_success() {
            warn!(
                "remote agent rejected {:?} request (code {}): {}",
                request.action(),
                result.code,
                result.error
            );
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::StatusCode;

    use super::*;
    use crate::testing::{closed_port, serve_once, serve_once_with_status, serve_silently};

    fn client(port: u16) -> RemoteUpdateClient {
        RemoteUpdateClient::new(RemoteConfig::with_port(port)).unwrap()
    }

    #[tokio::test]
    async fn test_info_defaults_interactive_when_omitted() {
        let (port, peer) = serve_once(r#"{"code":0}"#).await;
        let result = client(port).info().await.unwrap();
        assert!(result.interactive);
        assert_eq!(peer.await.unwrap(), serde_json::json!({ "action": "info" }));
    }

    #[tokio::test]
    async fn test_info_observes_interactive_override() {
        let (port, _peer) = serve_once(r#"{"code":0,"interactive":false}"#).await;
        let result = client(port).info().await.unwrap();
        assert!(!result.interactive);
    }

    #[tokio::test]
    async fn test_info_failure_is_remote_error() {
        let (port, _peer) = serve_once(r#"{"code":1,"error":"busy"}"#).await;
        let err = client(port).info().await.unwrap_err();
        assert!(matches!(err, Error::Remote(_)));
        assert_eq!(err.to_string(), "busy");
    }

    #[tokio::test]
    async fn test_restart_success() {
        let (port, peer) = serve_once(r#"{"code":0}"#).await;
        client(port).restart("panel").await.unwrap();
        assert_eq!(
            peer.await.unwrap(),
            serde_json::json!({ "action": "restart", "name": "panel" })
        );
    }

    #[tokio::test]
    async fn test_restart_failure_message_is_exact() {
        let (port, _peer) = serve_once(r#"{"code":1,"error":"busy"}"#).await;
        let err = client(port).restart("panel").await.unwrap_err();
        assert_eq!(err.to_string(), "busy");
    }

    #[tokio::test]
    async fn test_update_sends_all_fields() {
        let (port, peer) = serve_once(r#"{"code":0}"#).await;
        client(port)
            .update("panel", "/opt/panel", "panel.tar.gz", "/tmp/update")
            .await
            .unwrap();
        assert_eq!(
            peer.await.unwrap(),
            serde_json::json!({
                "action": "update",
                "name": "panel",
                "path": "/opt/panel",
                "updateFile": "panel.tar.gz",
                "updateFolder": "/tmp/update",
            })
        );
    }

    #[tokio::test]
    async fn test_update_failure_message_is_exact() {
        let (port, _peer) = serve_once(r#"{"code":1,"error":"busy"}"#).await;
        let err = client(port)
            .update("panel", "/opt/panel", "panel.tar.gz", "/tmp/update")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Remote(ref msg) if msg == "busy"));
    }

    #[tokio::test]
    async fn test_update_unreachable_is_transport_error() {
        let port = closed_port().await;
        let result = tokio::time::timeout(
            Duration::from_secs(10),
            client(port).update("panel", "/opt/panel", "panel.tar.gz", "/tmp/update"),
        )
        .await
        .expect("call must not hang");
        assert!(matches!(result, Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn test_silent_agent_hits_timeout() {
        let port = serve_silently().await;
        let config = RemoteConfig {
            timeout_secs: 1,
            ..RemoteConfig::with_port(port)
        };
        let client = RemoteUpdateClient::new(config).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(10), client.restart("panel"))
            .await
            .expect("call must be bounded by the client timeout");
        match result {
            Err(Error::Transport(e)) => assert!(e.is_timeout()),
            other => panic!("expected transport timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_timeouts_are_rejected() {
        let config = RemoteConfig {
            timeout_secs: 0,
            ..RemoteConfig::default()
        };
        let err = RemoteUpdateClient::new(config).err().unwrap();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("timeout_secs")));

        let config = RemoteConfig {
            connect_timeout_secs: 0,
            ..RemoteConfig::default()
        };
        let err = RemoteUpdateClient::new(config).err().unwrap();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("connect_timeout_secs")));
    }

    #[tokio::test]
    async fn test_malformed_body_is_protocol_error() {
        let (port, _peer) = serve_once_with_status(StatusCode::INTERNAL_SERVER_ERROR, "oops").await;
        let err = client(port).restart("panel").await.unwrap_err();
        match err {
            Error::Protocol(msg) => assert!(msg.contains("500")),
            other => panic!("expected protocol error, got {:?}", other),
        }
    }
}
