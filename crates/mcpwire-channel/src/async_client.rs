use std::io::ErrorKind;

use mcpwire_frame::{encode_json, JsonAccumulator};
use mcpwire_transport::{deadline_after, AsyncWire};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use crate::client::ChannelConfig;
use crate::error::{ChannelError, Result};

/// Async counterpart of [`send_with_config`](crate::send_with_config).
///
/// Same contract and error taxonomy: one deadline covers connect, the write
/// and every read. Dropping the future abandons the exchange and closes the
/// socket.
pub async fn send_async<T: Serialize + ?Sized>(
    host: &str,
    port: u16,
    request: &T,
    config: &ChannelConfig,
) -> Result<Value> {
    let payload = encode_json(request)?;
    let deadline = Instant::from_std(deadline_after(config.timeout));

    let mut stream =
        mcpwire_transport::connect_async_with(host, port, config.timeout, config.tls.as_ref())
            .await?;
    debug!(host, port, bytes = payload.len(), "sending request");

    let result = exchange(stream.as_mut(), &payload, deadline, config).await;
    if let Err(err) = stream.shutdown().await {
        debug!(error = %err, "shutdown on close failed");
    }
    result
}

async fn exchange(
    stream: &mut dyn AsyncWire,
    payload: &[u8],
    deadline: Instant,
    config: &ChannelConfig,
) -> Result<Value> {
    match timeout_at(deadline, stream.write_all(payload)).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => return Err(ChannelError::Io(err)),
        Err(_) => return Err(ChannelError::Timeout(config.timeout)),
    }

    let mut acc = JsonAccumulator::new(config.max_response_size);
    let mut chunk = vec![0u8; config.read_chunk_size.max(1)];
    loop {
        let read = match timeout_at(deadline, stream.read(&mut chunk)).await {
            Ok(Ok(n)) => n,
            Ok(Err(err)) if err.kind() == ErrorKind::Interrupted => continue,
            // TLS peer closed without close_notify.
            Ok(Err(err)) if err.kind() == ErrorKind::UnexpectedEof => 0,
            Ok(Err(err)) => return Err(ChannelError::Io(err)),
            Err(_) => return Err(ChannelError::Timeout(config.timeout)),
        };

        if read == 0 {
            return Ok(acc.finish()?.value);
        }
        if let Some(decoded) = acc.push(&chunk[..read])? {
            debug!(bytes = acc.buffered(), "received response");
            return Ok(decoded.value);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::net::TcpListener;

    use super::*;
    use crate::request::Request;

    async fn one_shot_server(reply: &'static [u8], delay: Duration) -> (u16, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut acc = JsonAccumulator::new(1024);
            let mut buf = [0u8; 64];
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                if acc.push(&buf[..n]).unwrap().is_some() {
                    break;
                }
            }
            tokio::time::sleep(delay).await;
            let _ = stream.write_all(reply).await;
        });
        (port, handle)
    }

    #[tokio::test]
    async fn async_roundtrip() {
        let (port, server) = one_shot_server(
            br#"{"status":"ok","deleted":"sales"}"#,
            Duration::from_millis(50),
        )
        .await;

        let request = Request::new("delete_group")
            .with_token("abc")
            .with_argument("groupName", "sales");
        let response = send_async("127.0.0.1", port, &request, &ChannelConfig::default())
            .await
            .unwrap();
        assert_eq!(response, json!({"status": "ok", "deleted": "sales"}));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn async_unbounded_timeout_is_clamped() {
        let (port, server) = one_shot_server(br#"{"status":"ok"}"#, Duration::ZERO).await;

        let config = ChannelConfig::with_timeout(Duration::MAX);
        let response = send_async("127.0.0.1", port, &Request::new("x"), &config)
            .await
            .unwrap();
        assert_eq!(response, json!({"status": "ok"}));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn async_timeout() {
        let (port, _server) = one_shot_server(b"{}", Duration::from_secs(5)).await;

        let config = ChannelConfig::with_timeout(Duration::from_millis(300));
        let err = send_async("127.0.0.1", port, &Request::new("x"), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Timeout(_)));
    }

    #[tokio::test]
    async fn async_incomplete_response() {
        let (port, server) = one_shot_server(br#"{"partial":"#, Duration::ZERO).await;

        let err = send_async("127.0.0.1", port, &Request::new("x"), &ChannelConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::IncompleteResponse { received: 11 }));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn async_refused_is_connection_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let err = send_async("127.0.0.1", port, &Request::new("x"), &ChannelConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Connection { .. }));
    }
}
