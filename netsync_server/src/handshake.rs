//! Reliable-channel handshake.
//!
//! One request line (`username:password\n`), one reply (16 raw id bytes or
//! `ERROR:<reason>`), then the connection is closed.

use anyhow::Context;
use netsync_shared::{
    net::{Credentials, HandshakeError, HandshakeReply, MAX_HANDSHAKE_LEN},
    state::SessionId,
};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::registry::SessionRegistry;

/// Runs the server side of one handshake over `stream`.
///
/// The outer `Result` carries transport failures; the inner one is the
/// handshake decision that was already reported to the peer.
pub async fn serve_handshake<S>(
    stream: S,
    registry: &SessionRegistry,
) -> anyhow::Result<Result<SessionId, HandshakeError>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader.take(MAX_HANDSHAKE_LEN as u64));

    let mut line = String::new();
    let decision = match reader.read_line(&mut line).await {
        Ok(_) => Credentials::parse(&line).and_then(|creds| registry.authenticate(&creds)),
        // Not UTF-8.
        Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
            Err(HandshakeError::InvalidFormat)
        }
        Err(e) => return Err(e).context("handshake read"),
    };

    let reply = match &decision {
        Ok(id) => HandshakeReply::Accepted(*id),
        Err(e) => HandshakeReply::Rejected(e.to_string()),
    };
    writer
        .write_all(&reply.encode())
        .await
        .context("handshake write")?;
    writer.shutdown().await.context("handshake close")?;

    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use netsync_shared::state::SESSION_ID_LEN;

    async fn run(
        request: &[u8],
        registry: &SessionRegistry,
    ) -> (Vec<u8>, Result<SessionId, HandshakeError>) {
        let (mut client, server) = tokio::io::duplex(4096);
        client.write_all(request).await.unwrap();

        let decision = serve_handshake(server, registry).await.unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        (reply, decision)
    }

    #[tokio::test]
    async fn valid_request_issues_session_bytes() {
        let registry = SessionRegistry::default();
        let (reply, decision) = run(b"alice:hunter2\n", &registry).await;

        let id = decision.unwrap();
        assert_eq!(reply.len(), SESSION_ID_LEN);
        assert_eq!(reply, id.as_bytes());
        assert_eq!(registry.display_name(&id).as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn malformed_request_gets_text_error_and_no_session() {
        let registry = SessionRegistry::default();
        let (reply, decision) = run(b"no-separator\n", &registry).await;

        assert_eq!(decision, Err(HandshakeError::InvalidFormat));
        assert_eq!(reply, b"ERROR:Invalid format");
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn non_utf8_request_is_invalid_format() {
        let registry = SessionRegistry::default();
        let (reply, decision) = run(&[0xFF, 0xFE, b':', b'x', b'\n'], &registry).await;

        assert_eq!(decision, Err(HandshakeError::InvalidFormat));
        assert!(reply.starts_with(b"ERROR:"));
        assert!(registry.is_empty());
    }
}
