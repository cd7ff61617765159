//! Opaque CONNECT tunnel.
//!
//! After the acknowledgment, two pumps run concurrently, one per direction.
//! A pump ends on end-of-stream, an I/O error, the idle timeout or
//! cancellation, and half-closes its destination when it does. The tunnel
//! finishes only after both pumps have finished.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::http::ProxyResponse;
use crate::relay::{read_chunk, write_all, RelayError, RelayOptions, RelayStats, Side};

/// Acknowledge the CONNECT and pipe bytes both ways until both sides are done.
///
/// `early_data` holds bytes the client sent after the CONNECT head; they are
/// forwarded upstream before pumping starts.
pub async fn run_tunnel<C, U>(
    client: C,
    upstream: U,
    version: &str,
    early_data: &[u8],
    options: &RelayOptions,
    cancel: &CancellationToken,
) -> Result<RelayStats, RelayError>
where
    C: AsyncRead + AsyncWrite + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_rx, mut client_tx) = tokio::io::split(client);
    let (mut upstream_rx, mut upstream_tx) = tokio::io::split(upstream);

    let ack = ProxyResponse::connection_established(version).to_wire();
    write_all(&mut client_tx, &ack, Side::Client, cancel).await?;
    if !early_data.is_empty() {
        write_all(&mut upstream_tx, early_data, Side::Upstream, cancel).await?;
    }

    let (up, down) = tokio::join!(
        pump(&mut client_rx, &mut upstream_tx, Side::Client, Side::Upstream, options, cancel),
        pump(&mut upstream_rx, &mut client_tx, Side::Upstream, Side::Client, options, cancel),
    );

    Ok(RelayStats {
        bytes_up: up + early_data.len() as u64,
        bytes_down: down,
    })
}

/// Forward `from` into `to` until either side stops. Returns bytes forwarded.
async fn pump<R, W>(
    from: &mut R,
    to: &mut W,
    from_side: Side,
    to_side: Side,
    options: &RelayOptions,
    cancel: &CancellationToken,
) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; options.buffer_size.max(1)];
    let mut forwarded = 0u64;

    let end = loop {
        match read_chunk(from, &mut buf, from_side, options, cancel).await {
            Ok(0) => break None,
            Ok(n) => {
                if let Err(e) = write_all(to, &buf[..n], to_side, cancel).await {
                    break Some(e);
                }
                forwarded += n as u64;
            }
            Err(e) => break Some(e),
        }
    };

    match end {
        None => tracing::trace!(from = %from_side, to = %to_side, bytes = forwarded, "Tunnel direction reached end of stream"),
        Some(e) => tracing::debug!(from = %from_side, to = %to_side, bytes = forwarded, error = %e, "Tunnel direction stopped"),
    }

    if let Err(e) = to.shutdown().await {
        tracing::trace!(to = %to_side, error = %e, "Half-close failed");
    }
    forwarded
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    const ACK: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

    #[tokio::test]
    async fn test_bytes_flow_both_ways() {
        let (proxy_client, mut client) = tokio::io::duplex(4096);
        let (proxy_upstream, mut server) = tokio::io::duplex(4096);

        let tunnel = tokio::spawn(async move {
            run_tunnel(
                proxy_client,
                proxy_upstream,
                "HTTP/1.1",
                b"",
                &RelayOptions::default(),
                &CancellationToken::new(),
            )
            .await
        });

        let mut ack = vec![0u8; ACK.len()];
        client.read_exact(&mut ack).await.unwrap();
        assert_eq!(ack, ACK.to_vec());

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        server.write_all(b"pong!").await.unwrap();
        let mut buf = [0u8; 5];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong!");

        client.shutdown().await.unwrap();
        let mut rest = Vec::new();
        server.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
        server.shutdown().await.unwrap();

        let stats = tunnel.await.unwrap().unwrap();
        assert_eq!(stats, RelayStats { bytes_up: 4, bytes_down: 5 });
    }

    #[tokio::test]
    async fn test_waits_for_both_directions() {
        let (proxy_client, mut client) = tokio::io::duplex(4096);
        let (proxy_upstream, mut server) = tokio::io::duplex(4096);

        let tunnel = tokio::spawn(async move {
            run_tunnel(
                proxy_client,
                proxy_upstream,
                "HTTP/1.1",
                b"",
                &RelayOptions::default(),
                &CancellationToken::new(),
            )
            .await
        });

        let mut ack = vec![0u8; ACK.len()];
        client.read_exact(&mut ack).await.unwrap();

        // Client finishes sending first; upstream keeps talking afterwards.
        client.shutdown().await.unwrap();
        let mut rest = Vec::new();
        server.read_to_end(&mut rest).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!tunnel.is_finished());

        server.write_all(b"late reply").await.unwrap();
        server.shutdown().await.unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, b"late reply".to_vec());

        let stats = tunnel.await.unwrap().unwrap();
        assert_eq!(stats.bytes_down, 10);
    }

    #[tokio::test]
    async fn test_early_data_forwarded() {
        let (proxy_client, mut client) = tokio::io::duplex(4096);
        let (proxy_upstream, mut server) = tokio::io::duplex(4096);

        let tunnel = tokio::spawn(async move {
            run_tunnel(
                proxy_client,
                proxy_upstream,
                "HTTP/1.0",
                b"\x16\x03\x01",
                &RelayOptions::default(),
                &CancellationToken::new(),
            )
            .await
        });

        let mut buf = [0u8; 3];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"\x16\x03\x01");

        drop(client);
        drop(server);
        let stats = tunnel.await.unwrap().unwrap();
        assert_eq!(stats.bytes_up, 3);
    }

    #[tokio::test]
    async fn test_cancellation_ends_tunnel() {
        let (proxy_client, _client) = tokio::io::duplex(4096);
        let (proxy_upstream, _server) = tokio::io::duplex(4096);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let tunnel = tokio::spawn(async move {
            run_tunnel(proxy_client, proxy_upstream, "HTTP/1.1", b"", &RelayOptions::default(), &token).await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(2), tunnel).await;
        assert!(result.is_ok(), "tunnel did not stop after cancellation");
    }
}
