//! TCP accept loop and server assembly.

use crate::config::GameConfig;
use crate::connection::Connection;
use crate::handshake;
use crate::matchmaking::{self, Matchmaker};
use crate::questions::QuestionSource;
use crate::storage::Store;
use log::{info, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// The assembled trivia server: listener, matchmaker and collaborators.
///
/// `run` spawns the scheduler and then accepts connections forever; each
/// accepted socket gets its own handshake task, so no single client can
/// stall the accept loop.
pub struct TriviaServer {
    listener: TcpListener,
    matchmaker: Arc<Matchmaker>,
    store: Arc<dyn Store>,
    questions: Arc<dyn QuestionSource>,
    config: GameConfig,
}

impl TriviaServer {
    pub async fn bind(
        addr: &str,
        config: GameConfig,
        store: Arc<dyn Store>,
        questions: Arc<dyn QuestionSource>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(TriviaServer {
            listener,
            matchmaker: Arc::new(Matchmaker::new()),
            store,
            questions,
            config,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> io::Result<()> {
        tokio::spawn(matchmaking::run_scheduler(
            Arc::clone(&self.matchmaker),
            Arc::clone(&self.store),
            Arc::clone(&self.questions),
            self.config.clone(),
        ));

        loop {
            let (stream, addr) = self.listener.accept().await?;
            info!("new connection from {}", addr);

            let store = Arc::clone(&self.store);
            let matchmaker = Arc::clone(&self.matchmaker);
            tokio::spawn(async move {
                match Connection::new(stream) {
                    Ok(conn) => handshake::run(conn, store, matchmaker).await,
                    Err(e) => warn!("failed to set up connection from {}: {}", addr, e),
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::questions::FileQuestionBank;
    use crate::storage::SqliteStore;

    #[tokio::test]
    async fn binds_to_an_ephemeral_port() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let questions: Arc<dyn QuestionSource> = Arc::new(FileQuestionBank::new("no-such-dir"));

        let server = TriviaServer::bind("127.0.0.1:0", GameConfig::default(), store, questions)
            .await
            .unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }
}
