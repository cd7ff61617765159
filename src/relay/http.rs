//! Single request/response relay for plain HTTP.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::relay::{read_chunk, write_all, RelayError, RelayOptions, RelayStats, Side};

/// Send `request` upstream, then stream the response back until upstream closes.
///
/// The upstream stream is shut down and dropped on every exit path.
pub async fn relay_http<C, U>(
    client: &mut C,
    mut upstream: U,
    request: &[u8],
    options: &RelayOptions,
    cancel: &CancellationToken,
) -> Result<RelayStats, RelayError>
where
    C: AsyncWrite + Unpin + ?Sized,
    U: AsyncRead + AsyncWrite + Unpin,
{
    let result = exchange(client, &mut upstream, request, options, cancel).await;
    if let Err(e) = upstream.shutdown().await {
        tracing::trace!(error = %e, "Upstream shutdown failed");
    }
    result
}

async fn exchange<C, U>(
    client: &mut C,
    upstream: &mut U,
    request: &[u8],
    options: &RelayOptions,
    cancel: &CancellationToken,
) -> Result<RelayStats, RelayError>
where
    C: AsyncWrite + Unpin + ?Sized,
    U: AsyncRead + AsyncWrite + Unpin,
{
    write_all(upstream, request, Side::Upstream, cancel).await?;
    let mut stats = RelayStats {
        bytes_up: request.len() as u64,
        bytes_down: 0,
    };

    let mut buf = vec![0u8; options.buffer_size.max(1)];
    loop {
        let n = read_chunk(upstream, &mut buf, Side::Upstream, options, cancel).await?;
        if n == 0 {
            break;
        }
        write_all(client, &buf[..n], Side::Client, cancel).await?;
        stats.bytes_down += n as u64;
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    const RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello";

    #[tokio::test]
    async fn test_relays_full_response() {
        let (mut proxy_client, mut client) = tokio::io::duplex(64 * 1024);
        let (proxy_upstream, mut server) = tokio::io::duplex(64 * 1024);
        let request = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";

        let backend = tokio::spawn(async move {
            let mut received = vec![0u8; request.len()];
            server.read_exact(&mut received).await.unwrap();
            server.write_all(RESPONSE).await.unwrap();
            server.shutdown().await.unwrap();
            received
        });

        let stats = relay_http(
            &mut proxy_client,
            proxy_upstream,
            request,
            &RelayOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        drop(proxy_client);

        assert_eq!(backend.await.unwrap(), request.to_vec());
        let mut body = Vec::new();
        client.read_to_end(&mut body).await.unwrap();
        assert_eq!(body, RESPONSE.to_vec());
        assert_eq!(stats.bytes_up, request.len() as u64);
        assert_eq!(stats.bytes_down, RESPONSE.len() as u64);
    }

    #[tokio::test]
    async fn test_streams_in_small_chunks() {
        let (mut proxy_client, mut client) = tokio::io::duplex(64 * 1024);
        let (proxy_upstream, mut server) = tokio::io::duplex(64 * 1024);

        tokio::spawn(async move {
            let mut buf = [0u8; 256];
            let _ = server.read(&mut buf).await.unwrap();
            for part in RESPONSE.chunks(7) {
                server.write_all(part).await.unwrap();
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        });

        let options = RelayOptions {
            buffer_size: 4,
            idle_timeout: Some(Duration::from_secs(5)),
        };
        relay_http(&mut proxy_client, proxy_upstream, b"GET / HTTP/1.0\r\n\r\n", &options, &CancellationToken::new())
            .await
            .unwrap();
        drop(proxy_client);

        let mut body = Vec::new();
        client.read_to_end(&mut body).await.unwrap();
        assert_eq!(body, RESPONSE.to_vec());
    }

    #[tokio::test]
    async fn test_silent_upstream_hits_idle_timeout() {
        let (mut proxy_client, _client) = tokio::io::duplex(1024);
        let (proxy_upstream, _server) = tokio::io::duplex(1024);

        let options = RelayOptions {
            buffer_size: 1024,
            idle_timeout: Some(Duration::from_millis(30)),
        };
        let err = relay_http(&mut proxy_client, proxy_upstream, b"GET / HTTP/1.1\r\n\r\n", &options, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Idle { side: Side::Upstream, .. }));
    }
}
