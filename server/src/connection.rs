//! Per-player connection plumbing.
//!
//! Each accepted socket gets exactly one reader task for the lifetime of the
//! connection. The task forwards every received line into a single-slot
//! handoff channel; whoever currently owns the [`Connection`] (the handshake,
//! the queue purge, or a game session's round collector) is the consumer. On
//! read failure or EOF the reader injects a disconnect sentinel and exits.

use log::{debug, error};
use shared::ServerMessage;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

/// One item handed from a player's reader task to the current consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerInput {
    /// A line the player sent, trimmed of the line terminator.
    Line(String),
    /// The connection is gone; no further input will arrive.
    Disconnected,
}

/// Write handle plus the owned receiving end of the player's handoff channel.
///
/// The receiver moves with the struct as ownership passes from handshake to
/// queue to session, so there is never more than one consumer at a time.
pub struct Connection {
    writer: OwnedWriteHalf,
    inbox: mpsc::Receiver<PlayerInput>,
    peer: SocketAddr,
}

impl Connection {
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        let peer = stream.peer_addr()?;
        let (read_half, writer) = stream.into_split();
        let (tx, inbox) = mpsc::channel(1);

        tokio::spawn(read_loop(read_half, tx, peer));

        Ok(Connection {
            writer,
            inbox,
            peer,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Sends one protocol message as a wire line.
    pub async fn send(&mut self, msg: &ServerMessage) -> io::Result<()> {
        let line = format!("{}\n", msg);
        self.writer.write_all(line.as_bytes()).await
    }

    /// Waits for the next input from this player. A closed channel is
    /// reported as a disconnect rather than an error.
    pub async fn recv(&mut self) -> PlayerInput {
        self.inbox.recv().await.unwrap_or(PlayerInput::Disconnected)
    }

    /// Bounded wait for the next input. `None` means the timeout elapsed
    /// with nothing received.
    pub async fn recv_timeout(&mut self, limit: Duration) -> Option<PlayerInput> {
        match tokio::time::timeout(limit, self.inbox.recv()).await {
            Ok(Some(input)) => Some(input),
            Ok(None) => Some(PlayerInput::Disconnected),
            Err(_) => None,
        }
    }

    /// Non-blocking poll, used by the scheduler to drain input from players
    /// sitting in the queue.
    pub fn poll(&mut self) -> Option<PlayerInput> {
        match self.inbox.try_recv() {
            Ok(input) => Some(input),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(PlayerInput::Disconnected),
        }
    }

    /// Flushes and shuts down the write side. Errors are ignored; the peer
    /// may already be gone.
    pub async fn close(mut self) {
        let _ = self.writer.shutdown().await;
    }
}

async fn read_loop<R>(read_half: R, tx: mpsc::Sender<PlayerInput>, peer: SocketAddr)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(read_half).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim().to_string();
                debug!("{} sent: '{}'", peer, line);
                if tx.send(PlayerInput::Line(line)).await.is_err() {
                    // Consumer is gone; the session or handshake already ended.
                    return;
                }
            }
            Ok(None) => {
                debug!("{} closed the connection", peer);
                let _ = tx.send(PlayerInput::Disconnected).await;
                return;
            }
            Err(e) => {
                error!("read error from {}: {}", peer, e);
                let _ = tx.send(PlayerInput::Disconnected).await;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    #[tokio::test]
    async fn reader_forwards_lines_in_order() {
        let (mut client, server) = tokio::io::duplex(256);
        let (tx, mut rx) = mpsc::channel(1);
        tokio::spawn(read_loop(server, tx, test_addr()));

        client.write_all(b"hola\nB\n").await.unwrap();

        assert_eq!(rx.recv().await, Some(PlayerInput::Line("hola".to_string())));
        assert_eq!(rx.recv().await, Some(PlayerInput::Line("B".to_string())));
    }

    #[tokio::test]
    async fn reader_strips_carriage_returns() {
        let (mut client, server) = tokio::io::duplex(256);
        let (tx, mut rx) = mpsc::channel(1);
        tokio::spawn(read_loop(server, tx, test_addr()));

        client.write_all(b"cancelar\r\n").await.unwrap();

        assert_eq!(
            rx.recv().await,
            Some(PlayerInput::Line("cancelar".to_string()))
        );
    }

    #[tokio::test]
    async fn reader_injects_sentinel_on_eof() {
        let (mut client, server) = tokio::io::duplex(256);
        let (tx, mut rx) = mpsc::channel(1);
        tokio::spawn(read_loop(server, tx, test_addr()));

        client.write_all(b"A\n").await.unwrap();
        drop(client);

        assert_eq!(rx.recv().await, Some(PlayerInput::Line("A".to_string())));
        assert_eq!(rx.recv().await, Some(PlayerInput::Disconnected));
        assert_eq!(rx.recv().await, None);
    }
}
