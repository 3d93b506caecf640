//! Pending-player queue and the periodic match scheduler.
//!
//! Handshake tasks enqueue players; a single scheduler task scans the queue
//! on a fixed interval and commits at most one match at a time. Global
//! capacity is a semaphore of size one: the permit is acquired before a match
//! is committed and travels into the session task, so it is released exactly
//! when that session terminates, on any path.

use crate::config::GameConfig;
use crate::connection::{Connection, PlayerInput};
use crate::questions::QuestionSource;
use crate::session::{GameSession, SessionPlayer};
use crate::storage::Store;
use log::{debug, info, warn};
use shared::{is_cancel, Mode, ServerMessage};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::{interval, sleep, MissedTickBehavior};

/// A player who finished the handshake and is waiting to be matched.
///
/// Owned by the queue until the scheduler claims it for a session or the
/// purge step drops it.
pub struct PendingPlayer {
    pub conn: Connection,
    pub name: String,
    pub category: String,
    pub mode: Mode,
    pub enqueued_at: Instant,
    pub cancelled: bool,
}

/// What the scheduler committed this tick.
pub enum MatchIntent {
    Solo(PendingPlayer),
    /// Two players and the resolved category for the game.
    Pair(PendingPlayer, PendingPlayer, String),
}

/// Immutable per-entry view the decision function works on.
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySnapshot {
    pub mode: Mode,
    pub category: String,
    pub waited: Duration,
}

/// Queue indices chosen by [`decide`]; for a pair, `first < second`.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchDecision {
    Solo(usize),
    Pair {
        first: usize,
        second: usize,
        category: String,
    },
}

/// Picks the next match from a snapshot of the queue, in arrival order.
///
/// Solo requests always go first. Among waiting players, a same-category
/// pair found by double scan wins; failing that, any pair where one member
/// has reached the wait threshold is formed with the longer waiter's
/// category overriding the other's preference.
pub fn decide(entries: &[EntrySnapshot], wait_threshold: Duration) -> Option<MatchDecision> {
    if let Some(i) = entries.iter().position(|e| e.mode == Mode::Solo) {
        return Some(MatchDecision::Solo(i));
    }

    let waiting: Vec<usize> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.mode == Mode::WaitForOpponent)
        .map(|(i, _)| i)
        .collect();

    for (x, &i) in waiting.iter().enumerate() {
        for &j in &waiting[x + 1..] {
            if entries[i].category == entries[j].category {
                return Some(MatchDecision::Pair {
                    first: i,
                    second: j,
                    category: entries[i].category.clone(),
                });
            }
        }
    }

    for (x, &i) in waiting.iter().enumerate() {
        for &j in &waiting[x + 1..] {
            if entries[i].waited >= wait_threshold || entries[j].waited >= wait_threshold {
                let category = if entries[i].waited > entries[j].waited {
                    entries[i].category.clone()
                } else {
                    entries[j].category.clone()
                };
                return Some(MatchDecision::Pair {
                    first: i,
                    second: j,
                    category,
                });
            }
        }
    }

    None
}

/// Thread-safe pending queue plus the global single-match capacity.
pub struct Matchmaker {
    queue: Mutex<Vec<PendingPlayer>>,
    capacity: Arc<Semaphore>,
}

impl Default for Matchmaker {
    fn default() -> Self {
        Self::new()
    }
}

impl Matchmaker {
    pub fn new() -> Self {
        Matchmaker {
            queue: Mutex::new(Vec::new()),
            capacity: Arc::new(Semaphore::new(1)),
        }
    }

    pub async fn enqueue(&self, player: PendingPlayer) {
        let mut queue = self.queue.lock().await;
        info!(
            "{} added to the queue ({}, {})",
            player.name,
            player.mode.as_wire(),
            player.category
        );
        queue.push(player);
        debug!("{} players queued", queue.len());
    }

    /// True while a game session holds the capacity permit.
    pub fn match_in_flight(&self) -> bool {
        self.capacity.available_permits() == 0
    }

    /// Purges dead entries, then commits the decision over a snapshot of
    /// what is left. The capacity permit is taken under the queue lock, so
    /// removal and permit acquisition are one atomic step: either a match is
    /// committed with the slot held, or the queue is untouched.
    async fn next_match(
        &self,
        wait_threshold: Duration,
    ) -> Option<(MatchIntent, OwnedSemaphorePermit)> {
        let mut queue = self.queue.lock().await;
        purge(&mut queue).await;

        let snapshot: Vec<EntrySnapshot> = queue
            .iter()
            .map(|p| EntrySnapshot {
                mode: p.mode,
                category: p.category.clone(),
                waited: p.enqueued_at.elapsed(),
            })
            .collect();

        let decision = decide(&snapshot, wait_threshold)?;
        let permit = Arc::clone(&self.capacity).try_acquire_owned().ok()?;

        let intent = match decision {
            MatchDecision::Solo(i) => MatchIntent::Solo(queue.remove(i)),
            MatchDecision::Pair {
                first,
                second,
                category,
            } => {
                // Remove the higher index first so the lower stays valid.
                let b = queue.remove(second);
                let a = queue.remove(first);
                MatchIntent::Pair(a, b, category)
            }
        };
        Some((intent, permit))
    }
}

/// Drains queued players' input and drops anyone who cancelled or
/// disconnected while waiting.
async fn purge(queue: &mut Vec<PendingPlayer>) {
    for player in queue.iter_mut() {
        while let Some(input) = player.conn.poll() {
            match input {
                PlayerInput::Line(line) if is_cancel(&line) => {
                    info!("{} cancelled while queued", player.name);
                    player.cancelled = true;
                    let _ = player.conn.send(&ServerMessage::ConnectionCancelled).await;
                    break;
                }
                PlayerInput::Line(line) => {
                    debug!("ignoring '{}' from queued player {}", line, player.name);
                }
                PlayerInput::Disconnected => {
                    info!("{} disconnected while queued", player.name);
                    player.cancelled = true;
                    break;
                }
            }
        }
    }

    let mut i = 0;
    while i < queue.len() {
        if queue[i].cancelled {
            let player = queue.remove(i);
            player.conn.close().await;
        } else {
            i += 1;
        }
    }
}

/// The scheduler loop: one scan per interval, at most one match in flight.
pub async fn run_scheduler(
    matchmaker: Arc<Matchmaker>,
    store: Arc<dyn Store>,
    questions: Arc<dyn QuestionSource>,
    config: GameConfig,
) {
    let mut tick = interval(config.scheduler_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!("matchmaking scheduler started");

    loop {
        tick.tick().await;

        if matchmaker.match_in_flight() {
            continue;
        }

        if let Some((intent, permit)) = matchmaker.next_match(config.pairing_wait_threshold).await
        {
            start_session(
                intent,
                permit,
                Arc::clone(&store),
                Arc::clone(&questions),
                config.clone(),
            )
            .await;
        }
    }
}

/// Notifies the matched players and spawns the session task. The permit
/// moves into the task and frees the match slot when the task ends.
async fn start_session(
    intent: MatchIntent,
    permit: OwnedSemaphorePermit,
    store: Arc<dyn Store>,
    questions: Arc<dyn QuestionSource>,
    config: GameConfig,
) {
    let (players, category) = match intent {
        MatchIntent::Solo(mut player) => {
            info!("starting solo game: {} ({})", player.name, player.category);
            let found = ServerMessage::MatchFound {
                opponent: None,
                category: player.category.clone(),
            };
            if let Err(e) = player.conn.send(&found).await {
                warn!("failed to notify {}: {}", player.name, e);
            }
            let category = player.category.clone();
            (vec![SessionPlayer::new(player.name, player.conn)], category)
        }
        MatchIntent::Pair(mut a, mut b, category) => {
            info!(
                "starting multiplayer game: {} vs {} ({})",
                a.name, b.name, category
            );
            let found_a = ServerMessage::MatchFound {
                opponent: Some(b.name.clone()),
                category: category.clone(),
            };
            let found_b = ServerMessage::MatchFound {
                opponent: Some(a.name.clone()),
                category: category.clone(),
            };
            if let Err(e) = a.conn.send(&found_a).await {
                warn!("failed to notify {}: {}", a.name, e);
            }
            if let Err(e) = b.conn.send(&found_b).await {
                warn!("failed to notify {}: {}", b.name, e);
            }
            (
                vec![
                    SessionPlayer::new(a.name, a.conn),
                    SessionPlayer::new(b.name, b.conn),
                ],
                category,
            )
        }
    };

    // Let the clients process the match notice before the game starts.
    sleep(config.match_found_pause).await;

    let session = GameSession::new(category, players, store, questions, config);
    tokio::spawn(session.run(permit));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(mode: Mode, category: &str, waited_ms: u64) -> EntrySnapshot {
        EntrySnapshot {
            mode,
            category: category.to_string(),
            waited: Duration::from_millis(waited_ms),
        }
    }

    const THRESHOLD: Duration = Duration::from_secs(10);

    #[test]
    fn empty_queue_yields_nothing() {
        assert_eq!(decide(&[], THRESHOLD), None);
    }

    #[test]
    fn solo_beats_earlier_multiplayer_arrivals() {
        let entries = vec![
            entry(Mode::WaitForOpponent, "musica", 5_000),
            entry(Mode::WaitForOpponent, "musica", 4_000),
            entry(Mode::Solo, "deportes", 100),
        ];
        assert_eq!(decide(&entries, THRESHOLD), Some(MatchDecision::Solo(2)));
    }

    #[test]
    fn first_solo_in_arrival_order_wins() {
        let entries = vec![
            entry(Mode::Solo, "musica", 300),
            entry(Mode::Solo, "deportes", 200),
        ];
        assert_eq!(decide(&entries, THRESHOLD), Some(MatchDecision::Solo(0)));
    }

    #[test]
    fn same_category_pair_found_by_double_scan() {
        let entries = vec![
            entry(Mode::WaitForOpponent, "musica", 3_000),
            entry(Mode::WaitForOpponent, "deportes", 2_000),
            entry(Mode::WaitForOpponent, "deportes", 1_000),
        ];
        assert_eq!(
            decide(&entries, THRESHOLD),
            Some(MatchDecision::Pair {
                first: 1,
                second: 2,
                category: "deportes".to_string(),
            })
        );
    }

    #[test]
    fn same_category_pair_beats_wait_threshold() {
        // The first player is past the threshold, but a same-category pair
        // exists further down the queue and takes precedence.
        let entries = vec![
            entry(Mode::WaitForOpponent, "musica", 60_000),
            entry(Mode::WaitForOpponent, "geografia", 500),
            entry(Mode::WaitForOpponent, "geografia", 400),
        ];
        assert_eq!(
            decide(&entries, THRESHOLD),
            Some(MatchDecision::Pair {
                first: 1,
                second: 2,
                category: "geografia".to_string(),
            })
        );
    }

    #[test]
    fn no_pair_below_wait_threshold() {
        let entries = vec![
            entry(Mode::WaitForOpponent, "musica", 2_000),
            entry(Mode::WaitForOpponent, "deportes", 1_000),
        ];
        assert_eq!(decide(&entries, THRESHOLD), None);
    }

    #[test]
    fn cross_category_pair_uses_longer_waiters_category() {
        let entries = vec![
            entry(Mode::WaitForOpponent, "musica", 11_000),
            entry(Mode::WaitForOpponent, "deportes", 1_000),
        ];
        assert_eq!(
            decide(&entries, THRESHOLD),
            Some(MatchDecision::Pair {
                first: 0,
                second: 1,
                category: "musica".to_string(),
            })
        );
    }

    #[test]
    fn threshold_is_inclusive() {
        let entries = vec![
            entry(Mode::WaitForOpponent, "musica", 10_000),
            entry(Mode::WaitForOpponent, "deportes", 500),
        ];
        assert!(decide(&entries, THRESHOLD).is_some());
    }

    #[test]
    fn single_waiting_player_is_never_matched() {
        let entries = vec![entry(Mode::WaitForOpponent, "musica", 60_000)];
        assert_eq!(decide(&entries, THRESHOLD), None);
    }
}
