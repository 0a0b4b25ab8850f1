//! Minimal LSP client
//!
//! Carries exactly the protocol surface the lifecycle needs: the
//! `initialize`/`initialized` handshake that defines readiness, the
//! `shutdown`/`exit` sequence for graceful teardown, and a notification
//! hook for diagnostics. Everything else the server offers goes unused.

use crate::lsp::protocol::{JsonRpcClient, JsonRpcError, JsonRpcNotification};
use crate::io::transport::Transport;
use lsp_types::{
    ClientCapabilities, ClientInfo, DocumentFormattingClientCapabilities, InitializeParams,
    InitializeResult, InitializedParams, PublishDiagnosticsClientCapabilities,
    TextDocumentClientCapabilities, TraceValue, Uri,
};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

// ============================================================================
// LSP Client Errors
// ============================================================================

/// LSP client errors
#[derive(Debug, thiserror::Error)]
pub enum LspError {
    #[error("JSON-RPC error: {0}")]
    JsonRpc(#[from] JsonRpcError),

    #[error("LSP protocol error: {0}")]
    Protocol(String),

    #[error("LSP request timeout: {method}")]
    RequestTimeout { method: String },
}

// ============================================================================
// LSP Client
// ============================================================================

/// High-level LSP client over any transport
pub struct LspClient<T: Transport> {
    /// JSON-RPC client for communication
    rpc_client: JsonRpcClient<T>,

    /// Timeout applied to individual requests
    request_timeout: Duration,

    /// Verbose protocol tracing requested
    trace_enabled: bool,

    /// Initialization state
    initialized: bool,

    /// Server capabilities from initialization
    server_capabilities: Option<lsp_types::ServerCapabilities>,
}

impl<T: Transport + 'static> LspClient<T> {
    /// Create a new LSP client with a transport
    pub fn new(transport: T, trace_enabled: bool, request_timeout: Duration) -> Self {
        Self {
            rpc_client: JsonRpcClient::new(transport, trace_enabled),
            request_timeout,
            trace_enabled,
            initialized: false,
            server_capabilities: None,
        }
    }

    /// Initialize the LSP connection
    ///
    /// Success means the server answered the handshake; the session treats
    /// this as subprocess readiness.
    pub async fn initialize(
        &mut self,
        root_uri: Option<Uri>,
    ) -> Result<InitializeResult, LspError> {
        if self.initialized {
            return Err(LspError::Protocol("Client already initialized".to_string()));
        }

        info!("Initializing LSP client");

        let params = InitializeParams {
            process_id: Some(std::process::id()),
            #[allow(deprecated)]
            root_path: None,
            #[allow(deprecated)]
            root_uri,
            initialization_options: None,
            work_done_progress_params: lsp_types::WorkDoneProgressParams::default(),
            capabilities: ClientCapabilities {
                text_document: Some(TextDocumentClientCapabilities {
                    formatting: Some(DocumentFormattingClientCapabilities {
                        dynamic_registration: Some(false),
                    }),
                    publish_diagnostics: Some(PublishDiagnosticsClientCapabilities {
                        related_information: Some(true),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
            trace: Some(if self.trace_enabled {
                TraceValue::Verbose
            } else {
                TraceValue::Off
            }),
            workspace_folders: None,
            client_info: Some(ClientInfo {
                name: "mica-editor".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            locale: None,
        };

        let result: InitializeResult = match self
            .rpc_client
            .request("initialize", Some(params), self.request_timeout)
            .await
        {
            Ok(result) => result,
            Err(JsonRpcError::Timeout) => {
                return Err(LspError::RequestTimeout {
                    method: "initialize".to_string(),
                });
            }
            Err(e) => return Err(LspError::JsonRpc(e)),
        };

        debug!("LSP server capabilities: {:?}", result.capabilities);
        self.server_capabilities = Some(result.capabilities.clone());

        self.rpc_client
            .notify("initialized", Some(InitializedParams {}))
            .await?;

        self.initialized = true;
        info!("LSP client initialized successfully");

        Ok(result)
    }

    /// Shutdown the LSP connection
    pub async fn shutdown(&mut self) -> Result<(), LspError> {
        if !self.initialized {
            return Ok(());
        }

        info!("Shutting down LSP client");

        let _: () = match self
            .rpc_client
            .request("shutdown", None::<Value>, self.request_timeout)
            .await
        {
            Ok(result) => result,
            Err(JsonRpcError::Timeout) => {
                return Err(LspError::RequestTimeout {
                    method: "shutdown".to_string(),
                });
            }
            Err(e) => return Err(LspError::JsonRpc(e)),
        };

        self.rpc_client.notify("exit", None::<Value>).await?;

        self.initialized = false;
        info!("LSP client shutdown complete");

        Ok(())
    }

    /// Install a handler for server notifications
    pub async fn on_notification<F>(&self, handler: F)
    where
        F: Fn(JsonRpcNotification) + Send + Sync + 'static,
    {
        self.rpc_client.on_notification(handler).await;
    }

    /// Check if the client is initialized
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Get server capabilities
    pub fn server_capabilities(&self) -> Option<&lsp_types::ServerCapabilities> {
        self.server_capabilities.as_ref()
    }

    /// Check if the connection is active
    pub fn is_connected(&self) -> bool {
        self.rpc_client.is_connected()
    }

    /// Close the connection (does not stop the external process)
    pub async fn close(&mut self) -> Result<(), LspError> {
        self.rpc_client.close().await?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::transport::MockTransport;

    const TEST_TIMEOUT: Duration = Duration::from_millis(500);

    fn init_response() -> &'static str {
        r#"{"jsonrpc":"2.0","id":1,"result":{"capabilities":{}}}"#
    }

    #[tokio::test]
    async fn test_initialize_success() {
        let (transport, handle) = MockTransport::new();
        let mut client = LspClient::new(transport, false, TEST_TIMEOUT);

        assert!(!client.is_initialized());

        let initialize = client.initialize(None);
        let respond = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.push_response(init_response());
        };

        let (result, _) = tokio::join!(initialize, respond);
        result.unwrap();

        assert!(client.is_initialized());
        assert!(client.server_capabilities().is_some());

        // Request then notification were sent, in order
        tokio::time::sleep(Duration::from_millis(50)).await;
        let sent = handle.sent_messages();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].contains(r#""method":"initialize""#));
        assert!(sent[1].contains(r#""method":"initialized""#));
    }

    #[tokio::test]
    async fn test_initialize_twice_is_protocol_error() {
        let (transport, handle) = MockTransport::new();
        let mut client = LspClient::new(transport, false, TEST_TIMEOUT);

        let initialize = client.initialize(None);
        let respond = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.push_response(init_response());
        };
        let (result, _) = tokio::join!(initialize, respond);
        result.unwrap();

        let result = client.initialize(None).await;
        assert!(matches!(result, Err(LspError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_initialize_timeout() {
        let (transport, _handle) = MockTransport::new();
        let mut client = LspClient::new(transport, false, Duration::from_millis(100));

        let result = client.initialize(None).await;
        assert!(matches!(
            result,
            Err(LspError::RequestTimeout { method }) if method == "initialize"
        ));
        assert!(!client.is_initialized());
    }

    #[tokio::test]
    async fn test_shutdown_without_initialize_is_noop() {
        let (transport, handle) = MockTransport::new();
        let mut client = LspClient::new(transport, false, TEST_TIMEOUT);

        client.shutdown().await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_sequence() {
        let (transport, handle) = MockTransport::new();
        let mut client = LspClient::new(transport, false, TEST_TIMEOUT);

        let initialize = client.initialize(None);
        let respond = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.push_response(init_response());
        };
        let (result, _) = tokio::join!(initialize, respond);
        result.unwrap();

        let shutdown = client.shutdown();
        let respond = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.push_response(r#"{"jsonrpc":"2.0","id":2,"result":null}"#);
        };
        let (result, _) = tokio::join!(shutdown, respond);
        result.unwrap();

        assert!(!client.is_initialized());

        tokio::time::sleep(Duration::from_millis(50)).await;
        let sent = handle.sent_messages();
        assert_eq!(sent.len(), 4);
        assert!(sent[2].contains(r#""method":"shutdown""#));
        assert!(sent[3].contains(r#""method":"exit""#));
    }
}
