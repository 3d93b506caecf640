//! The game-session state machine.
//!
//! A session owns one committed match (one or two players), runs the fixed
//! question loop and finalizes by reporting scores and records through the
//! store. Two terminal paths exist: normal completion and cancellation. Any
//! unexpected error inside the run is mapped to the cancellation path so
//! connections are never left in an ambiguous state.

use crate::config::GameConfig;
use crate::connection::{Connection, PlayerInput};
use crate::questions::QuestionSource;
use crate::storage::{GameKind, Store};
use log::{error, info, warn};
use shared::{is_cancel, MatchOutcome, Question, ServerMessage};
use std::io;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::sleep;

/// One player inside a running session.
pub struct SessionPlayer {
    pub name: String,
    pub conn: Connection,
    pub correct: u32,
}

impl SessionPlayer {
    pub fn new(name: String, conn: Connection) -> Self {
        SessionPlayer {
            name,
            conn,
            correct: 0,
        }
    }
}

/// How the question loop ended.
enum SessionEnd {
    Finished,
    ContentUnavailable,
    Cancelled,
}

/// What one player did in one round; `None` is a timeout.
type RoundAnswer = Option<String>;

pub struct GameSession {
    category: String,
    players: Vec<SessionPlayer>,
    questions: Vec<Question>,
    question_index: usize,
    started_at: Instant,
    store: Arc<dyn Store>,
    source: Arc<dyn QuestionSource>,
    config: GameConfig,
}

impl GameSession {
    pub fn new(
        category: String,
        players: Vec<SessionPlayer>,
        store: Arc<dyn Store>,
        source: Arc<dyn QuestionSource>,
        config: GameConfig,
    ) -> Self {
        GameSession {
            category,
            players,
            questions: Vec::new(),
            question_index: 0,
            started_at: Instant::now(),
            store,
            source,
            config,
        }
    }

    /// Runs the session to a terminal state. The permit is the global match
    /// slot; dropping it when this task ends is what lets the scheduler form
    /// the next match.
    pub async fn run(mut self, _permit: OwnedSemaphorePermit) {
        match self.play().await {
            Ok(SessionEnd::Finished) => {
                if let Err(e) = self.finalize().await {
                    warn!("failed to deliver final results: {}", e);
                }
            }
            Ok(SessionEnd::ContentUnavailable) => {}
            Ok(SessionEnd::Cancelled) => self.cancel().await,
            Err(e) => {
                warn!("game aborted: {}", e);
                self.cancel().await;
            }
        }
        self.close().await;
        info!("game finished ({})", self.category);
    }

    async fn play(&mut self) -> io::Result<SessionEnd> {
        self.questions = self
            .source
            .fetch(&self.category, self.config.questions_per_game);
        if self.questions.is_empty() {
            error!("no questions available for category '{}'", self.category);
            self.broadcast(&ServerMessage::Error(
                "No hay preguntas disponibles para esta categoría".to_string(),
            ))
            .await?;
            return Ok(SessionEnd::ContentUnavailable);
        }

        self.announce().await?;

        while self.question_index < self.questions.len() {
            if !self.play_round().await? {
                return Ok(SessionEnd::Cancelled);
            }
            self.question_index += 1;

            // Pacing pause between rounds, skipped after the last question.
            if self.question_index < self.questions.len() {
                sleep(self.config.round_pause).await;
            }
        }

        Ok(SessionEnd::Finished)
    }

    async fn announce(&mut self) -> io::Result<()> {
        if self.players.len() == 1 {
            let msg = ServerMessage::SoloStarted {
                category: self.category.clone(),
            };
            self.players[0].conn.send(&msg).await?;
            info!("solo game started for {}", self.players[0].name);
        } else {
            let (name_a, name_b) = (self.players[0].name.clone(), self.players[1].name.clone());
            let msg_a = ServerMessage::MatchStarted {
                opponent: name_b.clone(),
                category: self.category.clone(),
            };
            let msg_b = ServerMessage::MatchStarted {
                opponent: name_a.clone(),
                category: self.category.clone(),
            };
            self.players[0].conn.send(&msg_a).await?;
            self.players[1].conn.send(&msg_b).await?;
            info!("multiplayer game started: {} vs {}", name_a, name_b);
        }

        sleep(self.config.start_pause).await;
        Ok(())
    }

    /// One question round. Returns `false` when the round ended in a
    /// cancellation; no scoring or result message is sent in that case.
    async fn play_round(&mut self) -> io::Result<bool> {
        let question = self.questions[self.question_index].clone();
        info!(
            "question {}/{} (id {}): {}",
            self.question_index + 1,
            self.questions.len(),
            question.id,
            question.text
        );

        self.broadcast(&ServerMessage::Question {
            number: self.question_index + 1,
            total: self.config.questions_per_game,
            text: question.text.clone(),
            options: question.options.clone(),
        })
        .await?;
        self.broadcast(&ServerMessage::RequestAnswer).await?;

        // Collect every player's answer before reacting: each gets the full
        // answer window independently, and cancellation is checked once all
        // submissions are in.
        let mut answers: Vec<RoundAnswer> = Vec::with_capacity(self.players.len());
        let mut cancelled = false;
        for player in &mut self.players {
            let answer = match player.conn.recv_timeout(self.config.answer_timeout).await {
                None => None,
                Some(PlayerInput::Disconnected) => {
                    info!("{} left the game", player.name);
                    cancelled = true;
                    None
                }
                Some(PlayerInput::Line(line)) if is_cancel(&line) => {
                    info!("{} cancelled the game", player.name);
                    cancelled = true;
                    None
                }
                Some(PlayerInput::Line(line)) => Some(line),
            };
            answers.push(answer);
        }

        if cancelled {
            return Ok(false);
        }

        for (player, answer) in self.players.iter_mut().zip(&answers) {
            match answer {
                None => {
                    info!("{} did not answer in time", player.name);
                    player.conn.send(&ServerMessage::AnswerTimeout).await?;
                }
                Some(line) => {
                    let correct = question.is_correct(line);
                    if correct {
                        player.correct += 1;
                    }
                    info!(
                        "{} answered '{}' ({})",
                        player.name,
                        line,
                        if correct { "correct" } else { "incorrect" }
                    );
                    let feedback = if correct {
                        ServerMessage::AnswerCorrect
                    } else {
                        ServerMessage::AnswerIncorrect
                    };
                    player.conn.send(&feedback).await?;
                }
            }
        }

        let result = ServerMessage::RoundResult {
            correct: question.correct_letter(),
            score_p1: self.players[0].correct,
            score_p2: self.players.get(1).map(|p| p.correct),
        };
        self.broadcast(&result).await?;

        Ok(true)
    }

    async fn finalize(&mut self) -> io::Result<()> {
        let duration = self.started_at.elapsed().as_secs();
        let total = self.config.questions_per_game;
        let kind = if self.players.len() == 2 {
            GameKind::Multiplayer
        } else {
            GameKind::Solo
        };
        info!(
            "finalizing {} game after {}s ({})",
            kind.as_str(),
            duration,
            self.category
        );

        let game_id = match self.store.register_game(&self.category, kind, duration, true) {
            Ok(id) => Some(id),
            Err(e) => {
                error!("failed to record game: {}", e);
                None
            }
        };

        if self.players.len() == 1 {
            self.finalize_solo(game_id, total).await
        } else {
            self.finalize_multiplayer(game_id, total).await
        }
    }

    async fn finalize_solo(&mut self, game_id: Option<i64>, total: usize) -> io::Result<()> {
        let correct = self.players[0].correct;
        let points = tier(correct, total);
        let name = self.players[0].name.clone();
        info!("{} finished {}/{}, {} points", name, correct, total, points);

        self.persist_result(&name, game_id, correct, points, false);

        self.players[0]
            .conn
            .send(&ServerMessage::SoloFinished {
                correct,
                total,
                points,
            })
            .await
    }

    async fn finalize_multiplayer(&mut self, game_id: Option<i64>, total: usize) -> io::Result<()> {
        let (c1, c2) = (self.players[0].correct, self.players[1].correct);

        if c1 == c2 {
            // Both counts are equal here; player 1's feeds the shared award.
            let points = tie_points(c1, total);
            info!(
                "draw: {} and {} at {}/{} each, {} points",
                self.players[0].name, self.players[1].name, c1, total, points
            );

            for i in 0..2 {
                let name = self.players[i].name.clone();
                let correct = self.players[i].correct;
                self.persist_result(&name, game_id, correct, points, false);
            }

            for i in 0..2 {
                let opponent = self.players[1 - i].correct;
                let own = self.players[i].correct;
                self.players[i]
                    .conn
                    .send(&ServerMessage::MatchFinished {
                        outcome: MatchOutcome::Draw,
                        own,
                        opponent,
                        points,
                    })
                    .await?;
            }
            return Ok(());
        }

        let winner = if c1 > c2 { 0 } else { 1 };
        let loser = 1 - winner;
        let winner_points = tier(self.players[winner].correct, total);
        let loser_points = consolation(self.players[loser].correct);
        info!(
            "{} beats {} ({} vs {}), points {} / {}",
            self.players[winner].name,
            self.players[loser].name,
            self.players[winner].correct,
            self.players[loser].correct,
            winner_points,
            loser_points
        );

        let winner_name = self.players[winner].name.clone();
        let loser_name = self.players[loser].name.clone();
        self.persist_result(
            &winner_name,
            game_id,
            self.players[winner].correct,
            winner_points,
            true,
        );
        self.persist_result(
            &loser_name,
            game_id,
            self.players[loser].correct,
            loser_points,
            false,
        );

        let winner_msg = ServerMessage::MatchFinished {
            outcome: MatchOutcome::Winner,
            own: self.players[winner].correct,
            opponent: self.players[loser].correct,
            points: winner_points,
        };
        let loser_msg = ServerMessage::MatchFinished {
            outcome: MatchOutcome::Loser,
            own: self.players[loser].correct,
            opponent: self.players[winner].correct,
            points: loser_points,
        };
        self.players[winner].conn.send(&winner_msg).await?;
        self.players[loser].conn.send(&loser_msg).await?;
        Ok(())
    }

    /// Best-effort persistence; failures are logged and the session goes on.
    fn persist_result(
        &self,
        name: &str,
        game_id: Option<i64>,
        correct: u32,
        points: u32,
        winner: bool,
    ) {
        if let Err(e) = self.store.increment_games_played(name) {
            error!("failed to update games played for {}: {}", name, e);
        }
        if winner {
            if let Err(e) = self.store.increment_games_won(name) {
                error!("failed to update games won for {}: {}", name, e);
            }
        }
        if let Err(e) = self.store.add_score(name, points as i64) {
            error!("failed to update score for {}: {}", name, e);
        }
        if let Some(id) = game_id {
            if let Err(e) = self
                .store
                .record_game_result(name, id, correct, points as i64, winner)
            {
                error!("failed to record result for {}: {}", name, e);
            }
        }
    }

    /// Cancellation notice to whoever is still reachable; no records are
    /// written for a cancelled game.
    async fn cancel(&mut self) {
        info!("game cancelled ({})", self.category);
        for player in &mut self.players {
            let _ = player.conn.send(&ServerMessage::MatchCancelled).await;
        }
    }

    async fn broadcast(&mut self, msg: &ServerMessage) -> io::Result<()> {
        for player in &mut self.players {
            player.conn.send(msg).await?;
        }
        Ok(())
    }

    async fn close(&mut self) {
        for player in self.players.drain(..) {
            player.conn.close().await;
        }
    }
}

/// Points from the fraction of correct answers: 90% → 5, 70% → 3, 50% → 1.
pub(crate) fn tier(correct: u32, total: usize) -> u32 {
    let ratio = correct as f64 / total as f64;
    if ratio >= 0.9 {
        5
    } else if ratio >= 0.7 {
        3
    } else if ratio >= 0.5 {
        1
    } else {
        0
    }
}

/// A loser still gets one point for a reasonable showing.
fn consolation(correct: u32) -> u32 {
    if correct >= 3 {
        1
    } else {
        0
    }
}

/// Shared award for an exact tie: half the tier, floor one point.
fn tie_points(correct_p1: u32, total: usize) -> u32 {
    (tier(correct_p1, total) / 2).max(1)
}
