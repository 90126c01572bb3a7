//! Joining side of a session
//!
//! Joining is discovery, then connect, then a one-line nickname handshake.
//! Every failure is reported as a [`JoinError`] before any game state exists.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::discovery::{find_server, parse_session_code};
use crate::types::{HANDSHAKE_INVALID_NICKNAME, HANDSHAKE_WELCOME};

#[derive(Debug, Error)]
pub enum JoinError {
    #[error("invalid session code {0:?}")]
    InvalidCode(String),
    #[error("server not found")]
    ServerNotFound,
    #[error("could not connect to {addr}: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("nickname must not be empty or contain line breaks")]
    InvalidNickname,
    #[error("nickname rejected by the host (taken or session full)")]
    NicknameRejected,
    #[error("unexpected handshake reply {0:?}")]
    UnexpectedReply(String),
    #[error("connection closed during handshake")]
    Closed,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Nicknames travel as a single line
pub fn is_valid_nickname(nickname: &str) -> bool {
    let trimmed = nickname.trim();
    !trimmed.is_empty() && !trimmed.contains(['\n', '\r'])
}

/// Send the nickname and wait for the host's verdict
pub async fn handshake<S>(stream: &mut BufReader<S>, nickname: &str) -> Result<(), JoinError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if !is_valid_nickname(nickname) {
        return Err(JoinError::InvalidNickname);
    }

    stream.write_all(nickname.trim().as_bytes()).await?;
    stream.write_all(b"\n").await?;
    stream.flush().await?;

    let mut reply = String::new();
    if stream.read_line(&mut reply).await? == 0 {
        return Err(JoinError::Closed);
    }
    match reply.trim() {
        HANDSHAKE_WELCOME => Ok(()),
        HANDSHAKE_INVALID_NICKNAME => Err(JoinError::NicknameRejected),
        other => Err(JoinError::UnexpectedReply(other.to_string())),
    }
}

/// Connect to a known host and perform the handshake
pub async fn connect(addr: SocketAddr, nickname: &str) -> Result<BufReader<TcpStream>, JoinError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| JoinError::ConnectFailed { addr, source })?;
    let mut stream = BufReader::new(stream);
    handshake(&mut stream, nickname).await?;
    info!(%addr, nickname, "joined session");
    Ok(stream)
}

/// Discover the host announcing `code` and join it
pub async fn join(
    code: &str,
    nickname: &str,
    window: Duration,
) -> Result<BufReader<TcpStream>, JoinError> {
    if !is_valid_nickname(nickname) {
        return Err(JoinError::InvalidNickname);
    }
    let port = parse_session_code(code).ok_or_else(|| JoinError::InvalidCode(code.to_string()))?;

    info!(code = port, "looking for session");
    let Some(addr) = find_server(port, window).await? else {
        warn!(code = port, "no beacon received");
        return Err(JoinError::ServerNotFound);
    };
    connect(addr, nickname).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_handshake_welcome() {
        let mock = Builder::new().write(b"alice").write(b"\n").read(b"WELCOME\n").build();
        let mut stream = BufReader::new(mock);
        handshake(&mut stream, "alice").await.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_rejected() {
        let mock = Builder::new()
            .write(b"alice")
            .write(b"\n")
            .read(b"INVALID_NICKNAME\n")
            .build();
        let mut stream = BufReader::new(mock);
        let err = handshake(&mut stream, "alice").await.unwrap_err();
        assert!(matches!(err, JoinError::NicknameRejected));
    }

    #[tokio::test]
    async fn test_handshake_unexpected_reply() {
        let mock = Builder::new().write(b"bob").write(b"\n").read(b"HELLO\n").build();
        let mut stream = BufReader::new(mock);
        let err = handshake(&mut stream, "bob").await.unwrap_err();
        assert!(matches!(err, JoinError::UnexpectedReply(ref r) if r == "HELLO"));
    }

    #[tokio::test]
    async fn test_handshake_closed() {
        let mock = Builder::new().write(b"bob").write(b"\n").build();
        let mut stream = BufReader::new(mock);
        let err = handshake(&mut stream, "bob").await.unwrap_err();
        assert!(matches!(err, JoinError::Closed));
    }

    #[tokio::test]
    async fn test_empty_nickname_never_sent() {
        let mock = Builder::new().build();
        let mut stream = BufReader::new(mock);
        let err = handshake(&mut stream, "  ").await.unwrap_err();
        assert!(matches!(err, JoinError::InvalidNickname));
    }

    #[tokio::test]
    async fn test_join_rejects_bad_code() {
        let err = join("not-a-port", "bob", Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, JoinError::InvalidCode(_)));
    }

    #[test]
    fn test_nickname_rules() {
        assert!(is_valid_nickname("alice"));
        assert!(!is_valid_nickname(""));
        assert!(!is_valid_nickname("a\nb"));
    }
}
