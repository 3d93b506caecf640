//! Connection handshake: turns a raw accepted socket into a queued
//! [`PendingPlayer`], or terminates it.
//!
//! The protocol is short and synchronous: request a display name, then loop
//! offering the category list until the client sends a valid
//! `<category>:<mode>` selection. The stats and score side commands answer
//! from the store without leaving the loop. A multiplayer request while a
//! game is running is rejected once and the connection dropped; that is the
//! global capacity limit, not a transient condition.

use crate::connection::{Connection, PlayerInput};
use crate::matchmaking::{Matchmaker, PendingPlayer};
use crate::storage::Store;
use log::{debug, error, info, warn};
use shared::{
    is_cancel, parse_selection, Mode, SelectionError, ServerMessage, CATEGORIES, SCORE_COMMAND,
    STATS_COMMAND,
};
use std::io;
use std::sync::Arc;
use std::time::Instant;

pub async fn run(conn: Connection, store: Arc<dyn Store>, matchmaker: Arc<Matchmaker>) {
    let peer = conn.peer();
    match negotiate(conn, store.as_ref(), &matchmaker).await {
        Ok(Some(player)) => matchmaker.enqueue(player).await,
        Ok(None) => debug!("handshake with {} ended without a match request", peer),
        Err(e) => warn!("handshake with {} failed: {}", peer, e),
    }
}

async fn negotiate(
    mut conn: Connection,
    store: &dyn Store,
    matchmaker: &Matchmaker,
) -> io::Result<Option<PendingPlayer>> {
    conn.send(&ServerMessage::RequestName).await?;

    let name = match conn.recv().await {
        PlayerInput::Line(line) => line.trim().to_string(),
        PlayerInput::Disconnected => {
            conn.close().await;
            return Ok(None);
        }
    };
    if name.is_empty() || is_cancel(&name) {
        conn.send(&ServerMessage::ConnectionCancelled).await?;
        conn.close().await;
        return Ok(None);
    }

    if let Err(e) = store.ensure_player(&name) {
        error!("failed to register player {}: {}", name, e);
    }
    info!("player identified: {}", name);

    let (category, mode) = match select_category_and_mode(&mut conn, store, &name).await? {
        Some(selection) => selection,
        None => {
            conn.close().await;
            return Ok(None);
        }
    };
    info!("{} chose {} ({})", name, category, mode.as_wire());

    // Single global match at a time: a request to wait for an opponent while
    // any game runs is rejected outright rather than queued behind it.
    if mode == Mode::WaitForOpponent && matchmaker.match_in_flight() {
        conn.send(&ServerMessage::MatchInProgress(
            "Hay una partida multijugador en curso. Espera o juega solo.".to_string(),
        ))
        .await?;
        warn!("{} rejected: a game is already in progress", name);
        conn.close().await;
        return Ok(None);
    }

    Ok(Some(PendingPlayer {
        conn,
        name,
        category,
        mode,
        enqueued_at: Instant::now(),
        cancelled: false,
    }))
}

/// The selection loop. `Ok(None)` means the client cancelled or went away;
/// the caller closes the connection.
async fn select_category_and_mode(
    conn: &mut Connection,
    store: &dyn Store,
    name: &str,
) -> io::Result<Option<(String, Mode)>> {
    let categories: Vec<String> = CATEGORIES.iter().map(|c| c.to_string()).collect();

    loop {
        conn.send(&ServerMessage::AvailableCategories(categories.clone()))
            .await?;

        let line = match conn.recv().await {
            PlayerInput::Line(line) => line,
            PlayerInput::Disconnected => return Ok(None),
        };

        if is_cancel(&line) {
            conn.send(&ServerMessage::ConnectionCancelled).await?;
            return Ok(None);
        }

        if line.eq_ignore_ascii_case(STATS_COMMAND) {
            let stats = match store.statistics(name) {
                Ok(stats) => stats,
                Err(e) => {
                    error!("statistics lookup for {} failed: {}", name, e);
                    format!("Jugador no encontrado: {}", name)
                }
            };
            conn.send(&ServerMessage::Statistics(stats)).await?;
            continue;
        }

        if line.eq_ignore_ascii_case(SCORE_COMMAND) {
            let score = match store.total_score(name) {
                Ok(score) => score,
                Err(e) => {
                    error!("score lookup for {} failed: {}", name, e);
                    0
                }
            };
            conn.send(&ServerMessage::TotalScore(score)).await?;
            continue;
        }

        match parse_selection(&line) {
            Ok(selection) => return Ok(Some(selection)),
            Err(SelectionError::Format) => {
                conn.send(&ServerMessage::InvalidSelection).await?;
            }
            Err(SelectionError::UnknownCategory(cat)) => {
                conn.send(&ServerMessage::InvalidCategory(cat)).await?;
            }
            Err(SelectionError::UnknownMode(mode)) => {
                conn.send(&ServerMessage::InvalidMode(mode)).await?;
            }
        }
    }
}
