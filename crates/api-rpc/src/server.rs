//! JSON-RPC Server
//!
//! JSON-RPC 2.0 over HTTP on a TCP address (localhost by default).

use crate::handler::RpcHandler;
use crate::types::{CreateRequest, JobIdRequest};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use perfscope_core::application::Orchestrator;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

pub const DEFAULT_RPC_HOST: &str = "127.0.0.1";
pub const DEFAULT_RPC_PORT: u16 = 9527;

/// Method names
pub mod method {
    pub const CREATE: &str = "analysis.create.v1";
    pub const STATUS: &str = "analysis.status.v1";
    pub const RESULTS: &str = "analysis.results.v1";
    pub const DELETE: &str = "analysis.delete.v1";
    pub const REPORT: &str = "analysis.report.v1";
    pub const HEALTH: &str = "admin.health.v1";
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to register method: {0}")]
    Register(String),
}

fn register_error(err: impl std::fmt::Display) -> ServerError {
    ServerError::Register(err.to_string())
}

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    /// 0 picks a free port
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, orchestrator: Orchestrator) -> Self {
        Self {
            config,
            handler: Arc::new(RpcHandler::new(orchestrator)),
        }
    }

    fn module(&self) -> Result<RpcModule<()>, ServerError> {
        let mut module = RpcModule::new(());
        let handler = self.handler.clone();
        module
            .register_async_method(method::CREATE, move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: CreateRequest = params.parse()?;
                    handler.create(req).await
                }
            })
            .map_err(register_error)?;

        let handler = self.handler.clone();
        module
            .register_async_method(method::STATUS, move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: JobIdRequest = params.parse()?;
                    handler.status(req).await
                }
            })
            .map_err(register_error)?;

        let handler = self.handler.clone();
        module
            .register_async_method(method::RESULTS, move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: JobIdRequest = params.parse()?;
                    handler.results(req).await
                }
            })
            .map_err(register_error)?;

        let handler = self.handler.clone();
        module
            .register_async_method(method::REPORT, move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: JobIdRequest = params.parse()?;
                    handler.report(req).await
                }
            })
            .map_err(register_error)?;

        let handler = self.handler.clone();
        module
            .register_async_method(method::DELETE, move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: JobIdRequest = params.parse()?;
                    handler.delete(req).await
                }
            })
            .map_err(register_error)?;

        let handler = self.handler.clone();
        module
            .register_async_method(method::HEALTH, move |_, _, _| {
                let handler = handler.clone();
                async move { handler.health().await }
            })
            .map_err(register_error)?;

        Ok(module)
    }

    /// Bind and start serving; returns the bound address and the stop handle
    pub async fn start(self) -> Result<(SocketAddr, ServerHandle), ServerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let module = self.module()?;

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = server.local_addr().map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

        let handle = server.start(module);
        info!(addr = %local_addr, "JSON-RPC server started");
        Ok((local_addr, handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::tests::orchestrator;
    use crate::types::{CreateResponse, HealthResponse};
    use jsonrpsee::core::client::ClientT;
    use jsonrpsee::core::params::ObjectParams;
    use jsonrpsee::core::ClientError;
    use jsonrpsee::http_client::HttpClientBuilder;
    use jsonrpsee::rpc_params;

    async fn start() -> (SocketAddr, ServerHandle) {
        RpcServer::new(
            RpcServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            orchestrator(),
        )
        .start()
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_methods_over_http() {
        let (addr, handle) = start().await;
        let client = HttpClientBuilder::default()
            .build(format!("http://{}", addr))
            .unwrap();

        let health: HealthResponse = client.request(method::HEALTH, rpc_params![]).await.unwrap();
        assert_eq!(health.status, "ok");

        let mut params = ObjectParams::new();
        params.insert("main_url", "https://a.example").unwrap();
        let created: CreateResponse = client.request(method::CREATE, params).await.unwrap();
        assert!(!created.job_id.is_empty());

        handle.stop().unwrap();
    }

    #[tokio::test]
    async fn test_error_code_reaches_client() {
        let (addr, handle) = start().await;
        let client = HttpClientBuilder::default()
            .build(format!("http://{}", addr))
            .unwrap();

        for name in [method::STATUS, method::REPORT] {
            let mut params = ObjectParams::new();
            params.insert("job_id", "missing").unwrap();
            let err = client
                .request::<serde_json::Value, _>(name, params)
                .await
                .unwrap_err();
            match err {
                ClientError::Call(obj) => assert_eq!(obj.code(), crate::error::code::NOT_FOUND),
                other => panic!("unexpected error from {name}: {other:?}"),
            }
        }

        handle.stop().unwrap();
    }
}
