//! Backend transport collaborator.
//!
//! Once the authority approves an operation, the pipeline hands execution to
//! a [`Backend`].  The production implementation connects to the store
//! address named in the approval, announces the operation with a single
//! JSON header line, and then relays the session byte streams without
//! inspecting them; the store's own protocol traffic is opaque here.

use std::io;
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::accessverifier::BackendRoute;
use crate::command::readwriter::ReadWriter;
use crate::config::BackendConfig;
use crate::error::GateError;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Executes one approved operation against the backend repository store.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// Run `operation` against the store at `route`, relaying the session
    /// streams until the store completes.
    async fn run(
        &self,
        route: &BackendRoute,
        operation: &str,
        streams: &mut ReadWriter,
        trace_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), GateError>;
}

// ---------------------------------------------------------------------------
// Socket implementation
// ---------------------------------------------------------------------------

/// Header line sent to the store before the raw stream exchange begins.
#[derive(Debug, Serialize)]
struct CallHeader<'a> {
    operation: &'a str,
    relative_path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
    correlation_id: &'a str,
}

pub struct SocketBackend {
    connect_timeout: Duration,
}

impl SocketBackend {
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
        }
    }

    async fn connect(&self, address: &str) -> Result<Box<dyn RawStream>, GateError> {
        let attempt = async {
            if let Some(path) = address.strip_prefix("unix://") {
                UnixStream::connect(path)
                    .await
                    .map(|s| Box::new(s) as Box<dyn RawStream>)
            } else if let Some(authority) = address.strip_prefix("tcp://") {
                TcpStream::connect(authority)
                    .await
                    .map(|s| Box::new(s) as Box<dyn RawStream>)
            } else {
                Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "unsupported backend address scheme",
                ))
            }
        };

        match tokio::time::timeout(self.connect_timeout, attempt).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(err)) => Err(GateError::Transport(format!("{address}: {err}"))),
            Err(_) => Err(GateError::Transport(format!("{address}: connect timed out"))),
        }
    }
}

trait RawStream: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> RawStream for T {}

#[async_trait::async_trait]
impl Backend for SocketBackend {
    async fn run(
        &self,
        route: &BackendRoute,
        operation: &str,
        streams: &mut ReadWriter,
        trace_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), GateError> {
        let header = CallHeader {
            operation,
            relative_path: &route.relative_path,
            token: route.token.as_deref(),
            correlation_id: trace_id,
        };
        let mut header_line = serde_json::to_vec(&header)
            .map_err(|err| GateError::Transport(format!("header encoding: {err}")))?;
        header_line.push(b'\n');

        debug!(
            address = %route.address,
            operation,
            relative_path = %route.relative_path,
            "delegating to backend store"
        );

        let stream = self.connect(&route.address).await?;
        relay(stream, &header_line, streams, cancel).await
    }
}

/// Write the header, then pump bytes in both directions until the store is
/// done.  Client EOF half-closes the store side so the store can finish its
/// response.
async fn relay(
    stream: Box<dyn RawStream>,
    header_line: &[u8],
    streams: &mut ReadWriter,
    cancel: &CancellationToken,
) -> Result<(), GateError> {
    let input = &mut streams.input;
    let output = &mut streams.output;

    let exchange = async {
        let (mut store_read, mut store_write) = tokio::io::split(stream);
        store_write.write_all(header_line).await?;

        let to_store = async {
            tokio::io::copy(input, &mut store_write).await?;
            store_write.shutdown().await
        };
        let to_client = async {
            tokio::io::copy(&mut store_read, output).await?;
            Ok(())
        };

        tokio::try_join!(to_store, to_client)?;
        Ok::<(), io::Error>(())
    };

    tokio::select! {
        () = cancel.cancelled() => Err(GateError::Cancelled),
        result = exchange => result.map_err(|err| GateError::Transport(err.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::readwriter::testing;

    use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
    use tokio::net::TcpListener;

    fn route_to(address: String) -> BackendRoute {
        BackendRoute {
            address,
            token: Some("store-token".to_string()),
            relative_path: "group/project.git".to_string(),
        }
    }

    /// Accept one connection, assert the header line, echo the remaining
    /// input back upper-cased, then close.
    async fn one_shot_store(listener: TcpListener) {
        let (socket, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = socket.into_split();
        let mut reader = BufReader::new(read_half);

        let mut header_line = String::new();
        reader.read_line(&mut header_line).await.unwrap();
        let header: serde_json::Value = serde_json::from_str(&header_line).unwrap();
        assert_eq!(header["operation"], "git-upload-archive");
        assert_eq!(header["relative_path"], "group/project.git");
        assert_eq!(header["token"], "store-token");
        assert_eq!(header["correlation_id"], "trace-1");

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        let reply = String::from_utf8(rest).unwrap().to_uppercase();
        write_half.write_all(reply.as_bytes()).await.unwrap();
    }

    #[tokio::test]
    async fn announces_the_call_and_relays_both_directions() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("tcp://{}", listener.local_addr().unwrap());
        let store = tokio::spawn(one_shot_store(listener));

        let backend = SocketBackend::new(&BackendConfig::default());
        let (mut streams, output, _err) = testing::in_memory(b"archive request");
        let cancel = CancellationToken::new();

        backend
            .run(
                &route_to(address),
                "git-upload-archive",
                &mut streams,
                "trace-1",
                &cancel,
            )
            .await
            .unwrap();

        store.await.unwrap();
        assert_eq!(output.contents(), "ARCHIVE REQUEST");
    }

    #[tokio::test]
    async fn unreachable_store_is_a_transport_error() {
        let backend = SocketBackend::new(&BackendConfig::default());
        let (mut streams, _out, _err) = testing::in_memory(b"");
        let cancel = CancellationToken::new();

        let err = backend
            .run(
                &route_to("tcp://127.0.0.1:1".to_string()),
                "git-upload-archive",
                &mut streams,
                "trace",
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, GateError::Transport(_)));
    }

    #[tokio::test]
    async fn unknown_address_scheme_is_rejected() {
        let backend = SocketBackend::new(&BackendConfig::default());
        let (mut streams, _out, _err) = testing::in_memory(b"");
        let cancel = CancellationToken::new();

        let err = backend
            .run(
                &route_to("smtp://store".to_string()),
                "git-upload-archive",
                &mut streams,
                "trace",
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, GateError::Transport(_)));
    }
}
