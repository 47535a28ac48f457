//! IPC between `chronosctl` and the long-lived `chronosd` daemon: requests
//! are newline-delimited JSON over a Unix domain socket. The daemon holds
//! the one `PartitionManager` for its lifetime; each `chronosctl` invocation
//! is a short-lived client connection.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info};

/// One request, always naming the caller so ownership checks are correct
/// regardless of which OS user's `chronosctl` invocation is connecting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", content = "args")]
pub enum IpcRequest {
    Create {
        device_idx: usize,
        memory_fraction: f32,
        duration_secs: u64,
        caller: String,
    },
    List {
        verbose: bool,
    },
    Release {
        partition_id: String,
        caller: String,
    },
    DeviceStats,
    AvailableFraction {
        device_idx: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum IpcResponse {
    Success { data: serde_json::Value },
    Error { message: String },
}

impl IpcResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self::Success {
            data: serde_json::to_value(data).unwrap_or(serde_json::Value::Null),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Implemented by the daemon side to dispatch a decoded request.
pub trait IpcHandler: Send + Sync {
    fn handle(&self, request: IpcRequest) -> impl std::future::Future<Output = IpcResponse> + Send;
}

pub struct IpcServer<H: IpcHandler> {
    socket_path: String,
    handler: Arc<H>,
}

impl<H: IpcHandler + 'static> IpcServer<H> {
    pub fn new(socket_path: impl Into<String>, handler: H) -> Self {
        Self {
            socket_path: socket_path.into(),
            handler: Arc::new(handler),
        }
    }

    pub async fn run(&self) -> Result<()> {
        let path = Path::new(&self.socket_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let _ = std::fs::remove_file(path);

        let listener = UnixListener::bind(path)?;
        info!("chronosd IPC listening on {}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let handler = self.handler.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, handler).await {
                            error!("client error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("accept error: {}", e);
                }
            }
        }
    }
}

async fn handle_client<H: IpcHandler>(stream: UnixStream, handler: Arc<H>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<IpcRequest>(&line) {
            Ok(request) => {
                debug!("IPC request: {:?}", request);
                handler.handle(request).await
            }
            Err(e) => IpcResponse::error(format!("invalid request: {e}")),
        };

        let response_json = serde_json::to_string(&response)?;
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        line.clear();
    }

    Ok(())
}

/// Client used by `chronosctl`.
pub struct IpcClient {
    socket_path: String,
}

impl IpcClient {
    pub fn new(socket_path: impl Into<String>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub async fn send(&self, request: IpcRequest) -> Result<IpcResponse> {
        let mut stream = UnixStream::connect(&self.socket_path).await?;

        let request_json = serde_json::to_string(&request)?;
        stream.write_all(request_json.as_bytes()).await?;
        stream.write_all(b"\n").await?;
        stream.flush().await?;

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).await?;

        Ok(serde_json::from_str(&line)?)
    }

    pub async fn create(
        &self,
        device_idx: usize,
        memory_fraction: f32,
        duration_secs: u64,
        caller: &str,
    ) -> Result<String> {
        match self
            .send(IpcRequest::Create {
                device_idx,
                memory_fraction,
                duration_secs,
                caller: caller.to_string(),
            })
            .await?
        {
            IpcResponse::Success { data } => Ok(serde_json::from_value(data)?),
            IpcResponse::Error { message } => Err(anyhow::anyhow!(message)),
        }
    }

    pub async fn list(&self, verbose: bool) -> Result<Vec<crate::ipc_types::PartitionWire>> {
        match self.send(IpcRequest::List { verbose }).await? {
            IpcResponse::Success { data } => Ok(serde_json::from_value(data)?),
            IpcResponse::Error { message } => Err(anyhow::anyhow!(message)),
        }
    }

    pub async fn release(&self, partition_id: &str, caller: &str) -> Result<()> {
        match self
            .send(IpcRequest::Release {
                partition_id: partition_id.to_string(),
                caller: caller.to_string(),
            })
            .await?
        {
            IpcResponse::Success { .. } => Ok(()),
            IpcResponse::Error { message } => Err(anyhow::anyhow!(message)),
        }
    }

    pub async fn device_stats(&self) -> Result<Vec<crate::ipc_types::DeviceStatsWire>> {
        match self.send(IpcRequest::DeviceStats).await? {
            IpcResponse::Success { data } => Ok(serde_json::from_value(data)?),
            IpcResponse::Error { message } => Err(anyhow::anyhow!(message)),
        }
    }

    pub async fn available_fraction(&self, device_idx: usize) -> Result<f64> {
        match self
            .send(IpcRequest::AvailableFraction { device_idx })
            .await?
        {
            IpcResponse::Success { data } => Ok(serde_json::from_value(data)?),
            IpcResponse::Error { message } => Err(anyhow::anyhow!(message)),
        }
    }
}
