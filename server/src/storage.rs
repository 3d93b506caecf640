//! Player and game record persistence.
//!
//! The rest of the server only talks to the [`Store`] trait; the SQLite
//! implementation keeps players, games and per-player game results. Failures
//! here are reported to the caller, which logs them and keeps the session
//! alive: persistence is best-effort at finalization time.

use rusqlite::{params, Connection, OptionalExtension, Result};
use std::path::Path;
use std::sync::Mutex;

/// Kind of game being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameKind {
    Solo,
    Multiplayer,
}

impl GameKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameKind::Solo => "SOLO",
            GameKind::Multiplayer => "MULTIJUGADOR",
        }
    }
}

/// Persistence boundary used by the handshake (stats/score lookups) and by
/// session finalization (score and record updates).
pub trait Store: Send + Sync {
    /// Creates the player row if it does not exist yet. Idempotent.
    fn ensure_player(&self, name: &str) -> Result<()>;

    /// Adds points to the player's cumulative score.
    fn add_score(&self, name: &str, delta: i64) -> Result<()>;

    fn increment_games_played(&self, name: &str) -> Result<()>;

    fn increment_games_won(&self, name: &str) -> Result<()>;

    /// Records a finished game and returns its id.
    fn register_game(
        &self,
        category: &str,
        kind: GameKind,
        duration_secs: u64,
        completed: bool,
    ) -> Result<i64>;

    /// Records one player's result within a game.
    fn record_game_result(
        &self,
        name: &str,
        game_id: i64,
        correct: u32,
        points: i64,
        winner: bool,
    ) -> Result<()>;

    /// Human-readable statistics summary, fields joined with `|` for the
    /// `ESTADISTICAS` reply.
    fn statistics(&self, name: &str) -> Result<String>;

    /// The player's cumulative score; 0 for unknown players.
    fn total_score(&self, name: &str) -> Result<i64>;
}

/// SQLite-backed [`Store`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// In-memory database, used by the tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS players (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                total_score INTEGER NOT NULL DEFAULT 0,
                games_played INTEGER NOT NULL DEFAULT 0,
                games_won INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS games (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                category TEXT NOT NULL,
                kind TEXT NOT NULL,
                duration_secs INTEGER NOT NULL,
                completed BOOLEAN NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS game_players (
                game_id INTEGER NOT NULL REFERENCES games(id),
                player_id INTEGER NOT NULL REFERENCES players(id),
                correct_count INTEGER NOT NULL,
                points_awarded INTEGER NOT NULL,
                winner BOOLEAN NOT NULL DEFAULT 0,
                PRIMARY KEY (game_id, player_id)
            );
            "#,
        )?;

        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }
}

impl Store for SqliteStore {
    fn ensure_player(&self, name: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO players (name) VALUES (?1)",
            params![name],
        )?;
        Ok(())
    }

    fn add_score(&self, name: &str, delta: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE players SET total_score = total_score + ?1 WHERE name = ?2",
            params![delta, name],
        )?;
        Ok(())
    }

    fn increment_games_played(&self, name: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE players SET games_played = games_played + 1 WHERE name = ?1",
            params![name],
        )?;
        Ok(())
    }

    fn increment_games_won(&self, name: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE players SET games_won = games_won + 1 WHERE name = ?1",
            params![name],
        )?;
        Ok(())
    }

    fn register_game(
        &self,
        category: &str,
        kind: GameKind,
        duration_secs: u64,
        completed: bool,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO games (category, kind, duration_secs, completed) VALUES (?1, ?2, ?3, ?4)",
            params![category, kind.as_str(), duration_secs as i64, completed],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn record_game_result(
        &self,
        name: &str,
        game_id: i64,
        correct: u32,
        points: i64,
        winner: bool,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO game_players (game_id, player_id, correct_count, points_awarded, winner)
            SELECT ?1, id, ?2, ?3, ?4 FROM players WHERE name = ?5
            "#,
            params![game_id, correct, points, winner, name],
        )?;
        Ok(())
    }

    fn statistics(&self, name: &str) -> Result<String> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT total_score, games_played, games_won FROM players WHERE name = ?1",
                params![name],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;

        Ok(match row {
            Some((score, played, won)) => {
                let win_pct = if played > 0 {
                    won as f64 / played as f64 * 100.0
                } else {
                    0.0
                };
                format!(
                    "Estadísticas de {}|Puntos totales: {}|Partidas jugadas: {}|Partidas ganadas: {}|Porcentaje de victorias: {:.1}%",
                    name, score, played, won, win_pct
                )
            }
            None => format!("Jugador no encontrado: {}", name),
        })
    }

    fn total_score(&self, name: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let score = conn
            .query_row(
                "SELECT total_score FROM players WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(score.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    #[test]
    fn ensure_player_is_idempotent() {
        let store = store();
        store.ensure_player("ana").unwrap();
        store.ensure_player("ana").unwrap();
        assert_eq!(store.total_score("ana").unwrap(), 0);
    }

    #[test]
    fn score_deltas_accumulate() {
        let store = store();
        store.ensure_player("ana").unwrap();
        store.add_score("ana", 3).unwrap();
        store.add_score("ana", 5).unwrap();
        assert_eq!(store.total_score("ana").unwrap(), 8);
    }

    #[test]
    fn unknown_player_has_zero_score() {
        assert_eq!(store().total_score("nadie").unwrap(), 0);
    }

    #[test]
    fn game_and_results_are_recorded() {
        let store = store();
        store.ensure_player("ana").unwrap();
        store.ensure_player("luis").unwrap();

        let game_id = store
            .register_game("musica", GameKind::Multiplayer, 95, true)
            .unwrap();
        store.record_game_result("ana", game_id, 8, 3, true).unwrap();
        store
            .record_game_result("luis", game_id, 2, 0, false)
            .unwrap();

        let conn = store.conn.lock().unwrap();
        let (kind, completed): (String, bool) = conn
            .query_row(
                "SELECT kind, completed FROM games WHERE id = ?1",
                params![game_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(kind, "MULTIJUGADOR");
        assert!(completed);

        let winners: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM game_players WHERE game_id = ?1 AND winner = 1",
                params![game_id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(winners, 1);
    }

    #[test]
    fn statistics_summarize_record() {
        let store = store();
        store.ensure_player("ana").unwrap();
        store.add_score("ana", 9).unwrap();
        store.increment_games_played("ana").unwrap();
        store.increment_games_played("ana").unwrap();
        store.increment_games_won("ana").unwrap();

        let stats = store.statistics("ana").unwrap();
        assert!(stats.contains("Estadísticas de ana"));
        assert!(stats.contains("Puntos totales: 9"));
        assert!(stats.contains("Partidas jugadas: 2"));
        assert!(stats.contains("Partidas ganadas: 1"));
        assert!(stats.contains("Porcentaje de victorias: 50.0%"));
    }

    #[test]
    fn statistics_for_unknown_player() {
        let stats = store().statistics("nadie").unwrap();
        assert_eq!(stats, "Jugador no encontrado: nadie");
    }
}
