//! JSON-RPC 2.0 protocol layer
//!
//! Implements JSON-RPC 2.0 over a framed transport: request/response
//! correlation with per-request timeouts, notification dispatch, and
//! uniform method-not-found replies to server-to-client requests (this
//! client supports none).

use crate::io::transport::Transport;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, trace};

// ============================================================================
// JSON-RPC Types
// ============================================================================

/// JSON-RPC 2.0 request message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,

    /// Request identifier
    pub id: Value,

    /// Method name
    pub method: String,

    /// Optional parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 response message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,

    /// Request identifier (matches the request)
    pub id: Value,

    /// Result (present if successful)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error (present if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorObject>,
}

/// JSON-RPC 2.0 notification message (no response expected)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,

    /// Method name
    pub method: String,

    /// Optional parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    /// Error code
    pub code: i32,

    /// Error message
    pub message: String,

    /// Optional additional data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// JSON-RPC "method not found" error code
const METHOD_NOT_FOUND_CODE: i32 = -32601;

// ============================================================================
// JSON-RPC Errors
// ============================================================================

/// JSON-RPC client error type
#[derive(Debug, thiserror::Error)]
pub enum JsonRpcError {
    #[error("JSON-RPC server error ({code}): {message}")]
    Server {
        code: i32,
        message: String,
        data: Option<Value>,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(serde_json::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(serde_json::Error),

    #[error("Request timeout")]
    Timeout,

    #[error("Request was cancelled")]
    RequestCancelled,
}

// ============================================================================
// JSON-RPC Client
// ============================================================================

/// Type alias for notification handler to reduce complexity
type NotificationHandler = Arc<dyn Fn(JsonRpcNotification) + Send + Sync>;

/// JSON-RPC client with request/response correlation
pub struct JsonRpcClient<T: Transport> {
    /// Channel for sending outbound messages (requests and notifications)
    outbound_sender: mpsc::UnboundedSender<String>,

    /// Request ID counter
    request_id: AtomicU64,

    /// Pending requests waiting for responses
    pending_requests: Arc<Mutex<HashMap<u64, mpsc::UnboundedSender<JsonRpcResponse>>>>,

    /// Notification handler (shared with the transport task)
    notification_handler: Arc<Mutex<Option<NotificationHandler>>>,

    /// Log full protocol traffic
    trace_messages: bool,

    /// Type parameter marker
    _phantom: std::marker::PhantomData<T>,
}

impl<T: Transport + 'static> JsonRpcClient<T> {
    /// Create a new JSON-RPC client driving the given transport
    pub fn new(transport: T, trace_messages: bool) -> Self {
        let transport = Arc::new(Mutex::new(transport));
        let (outbound_sender, mut outbound_receiver) = mpsc::unbounded_channel::<String>();
        let pending_requests = Arc::new(Mutex::new(HashMap::new()));

        let notification_handler = Arc::new(Mutex::new(None::<NotificationHandler>));
        let handler_clone = Arc::clone(&notification_handler);

        // Transport handler task for bidirectional communication
        let transport_clone = Arc::clone(&transport);
        let pending_clone = Arc::clone(&pending_requests);
        let reply_sender = outbound_sender.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    // Outbound messages (prioritized)
                    Some(message) = outbound_receiver.recv() => {
                        let mut transport = transport_clone.lock().await;
                        if let Err(e) = transport.send(&message).await {
                            error!("Failed to send message: {}", e);
                            break;
                        }
                        drop(transport);
                    }
                    // Inbound messages
                    result = async {
                        let mut transport = transport_clone.lock().await;
                        transport.receive().await
                    } => {
                        match result {
                            Ok(message) => {
                                if trace_messages {
                                    crate::log_lsp_message!(tracing::Level::INFO, "recv", message);
                                }
                                let handler = handler_clone.lock().await.clone();
                                Self::process_inbound_message(
                                    message,
                                    &pending_clone,
                                    &handler,
                                    &reply_sender,
                                )
                                .await;
                            }
                            Err(e) => {
                                debug!("Transport receive ended: {}", e);
                                break;
                            }
                        }
                    }
                }
            }
            trace!("Transport handler task finished");
        });

        Self {
            outbound_sender,
            request_id: AtomicU64::new(1),
            pending_requests,
            notification_handler,
            trace_messages,
            _phantom: std::marker::PhantomData,
        }
    }

    /// Set the notification handler
    pub async fn on_notification<F>(&self, handler: F)
    where
        F: Fn(JsonRpcNotification) + Send + Sync + 'static,
    {
        *self.notification_handler.lock().await = Some(Arc::new(handler));
    }

    /// Process an inbound message (response, notification, or request)
    async fn process_inbound_message(
        message: String,
        pending_requests: &Arc<Mutex<HashMap<u64, mpsc::UnboundedSender<JsonRpcResponse>>>>,
        notification_handler: &Option<NotificationHandler>,
        reply_sender: &mpsc::UnboundedSender<String>,
    ) {
        trace!("JsonRpcClient: Received message: {}", message);

        let value: Value = match serde_json::from_str(&message) {
            Ok(value) => value,
            Err(e) => {
                debug!("Received unparseable message ({}): {}", e, message);
                return;
            }
        };

        let has_method = value.get("method").is_some();
        let has_id = value.get("id").is_some();

        if has_method && has_id {
            // Server-to-client request; none are supported, so reply with
            // method-not-found rather than leaving the server hanging
            if let Ok(request) = serde_json::from_value::<JsonRpcRequest>(value) {
                debug!("Rejecting unsupported server request: {}", request.method);
                let response = JsonRpcResponse {
                    jsonrpc: "2.0".to_string(),
                    id: request.id,
                    result: None,
                    error: Some(JsonRpcErrorObject {
                        code: METHOD_NOT_FOUND_CODE,
                        message: format!("Method not found: {}", request.method),
                        data: None,
                    }),
                };
                if let Ok(json) = serde_json::to_string(&response) {
                    let _ = reply_sender.send(json);
                }
            }
        } else if has_method {
            if let Ok(notification) = serde_json::from_value::<JsonRpcNotification>(value) {
                trace!("Received notification: {}", notification.method);
                if let Some(handler) = notification_handler {
                    handler(notification);
                }
            }
        } else if has_id {
            if let Ok(response) = serde_json::from_value::<JsonRpcResponse>(value) {
                if let Some(id) = response.id.as_u64() {
                    let mut pending = pending_requests.lock().await;
                    if let Some(sender) = pending.remove(&id) {
                        if sender.send(response).is_err() {
                            debug!("Response receiver dropped for request {}", id);
                        }
                    } else {
                        debug!("Received response for unknown request {}", id);
                    }
                }
            }
        } else {
            debug!("Received message that is neither request nor response");
        }
    }

    /// Send a JSON-RPC request and await its response
    pub async fn request<P, R>(
        &self,
        method: &str,
        params: Option<P>,
        timeout: Duration,
    ) -> Result<R, JsonRpcError>
    where
        P: serde::Serialize,
        R: for<'de> serde::Deserialize<'de>,
    {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let (response_sender, mut response_receiver) = mpsc::unbounded_channel();

        // Register the pending request before the message can possibly be
        // answered
        {
            let mut pending = self.pending_requests.lock().await;
            pending.insert(id, response_sender);
        }

        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Value::Number(serde_json::Number::from(id)),
            method: method.to_string(),
            params: params
                .map(|p| serde_json::to_value(p).map_err(JsonRpcError::Serialization))
                .transpose()?,
        };

        let request_json = serde_json::to_string(&request).map_err(JsonRpcError::Serialization)?;
        debug!("JsonRpcClient: Sending request: {}", method);
        if self.trace_messages {
            crate::log_lsp_message!(tracing::Level::INFO, "send", request_json);
        }

        self.outbound_sender
            .send(request_json)
            .map_err(|_| JsonRpcError::Transport("Outbound channel closed".to_string()))?;

        let response = match tokio::time::timeout(timeout, response_receiver.recv()).await {
            Ok(Some(response)) => response,
            Ok(None) => {
                let mut pending = self.pending_requests.lock().await;
                pending.remove(&id);
                return Err(JsonRpcError::RequestCancelled);
            }
            Err(_) => {
                let mut pending = self.pending_requests.lock().await;
                pending.remove(&id);
                return Err(JsonRpcError::Timeout);
            }
        };

        if let Some(error) = response.error {
            return Err(JsonRpcError::Server {
                code: error.code,
                message: error.message,
                data: error.data,
            });
        }

        // A null result arrives as None through Option<Value>; both decode
        // from Null so `shutdown`-style responses work for R = ()
        let result = response.result.unwrap_or(Value::Null);
        serde_json::from_value(result).map_err(JsonRpcError::Deserialization)
    }

    /// Send a JSON-RPC notification
    pub async fn notify<P>(&self, method: &str, params: Option<P>) -> Result<(), JsonRpcError>
    where
        P: serde::Serialize,
    {
        let notification = JsonRpcNotification {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params: params
                .map(|p| serde_json::to_value(p).map_err(JsonRpcError::Serialization))
                .transpose()?,
        };

        let notification_json =
            serde_json::to_string(&notification).map_err(JsonRpcError::Serialization)?;
        debug!("JsonRpcClient: Sending notification: {}", method);
        if self.trace_messages {
            crate::log_lsp_message!(tracing::Level::INFO, "send", notification_json);
        }

        self.outbound_sender
            .send(notification_json)
            .map_err(|_| JsonRpcError::Transport("Outbound channel closed".to_string()))?;

        Ok(())
    }

    /// Check if transport is connected
    pub fn is_connected(&self) -> bool {
        !self.outbound_sender.is_closed()
    }

    /// Fail all pending requests (e.g. during teardown)
    pub async fn cleanup_pending_requests(&self) {
        let mut pending = self.pending_requests.lock().await;
        for (id, sender) in pending.drain() {
            debug!("JsonRpcClient: Cleaning up pending request ID {}", id);
            let _ = sender.send(JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                id: Value::Number(serde_json::Number::from(id)),
                result: None,
                error: Some(JsonRpcErrorObject {
                    code: METHOD_NOT_FOUND_CODE,
                    message: "Request cancelled during connection teardown".to_string(),
                    data: None,
                }),
            });
        }
    }

    /// Close the connection
    pub async fn close(&self) -> Result<(), JsonRpcError> {
        self.cleanup_pending_requests().await;
        // The transport handler exits when the outbound channel closes,
        // which happens when this struct is dropped
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
