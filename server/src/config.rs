use std::time::Duration;

use shared::TOTAL_QUESTIONS;

/// Gameplay pacing and matchmaking tunables.
///
/// Production values match the original deployment; integration tests build
/// their own instance with millisecond pacing so full games run quickly.
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Questions fetched and asked per game.
    pub questions_per_game: usize,
    /// How long each player gets to answer a question.
    pub answer_timeout: Duration,
    /// Pause after `PARTIDA_ENCONTRADA` so clients can switch screens.
    pub match_found_pause: Duration,
    /// Pause after the start announcement, before the first question.
    pub start_pause: Duration,
    /// Pause between rounds, skipped after the final question.
    pub round_pause: Duration,
    /// How often the scheduler scans the pending queue.
    pub scheduler_interval: Duration,
    /// Queue time after which cross-category pairing kicks in.
    pub pairing_wait_threshold: Duration,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            questions_per_game: TOTAL_QUESTIONS,
            answer_timeout: Duration::from_secs(20),
            match_found_pause: Duration::from_millis(500),
            start_pause: Duration::from_secs(1),
            round_pause: Duration::from_secs(3),
            scheduler_interval: Duration::from_millis(200),
            pairing_wait_threshold: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_protocol_contract() {
        let config = GameConfig::default();
        assert_eq!(config.questions_per_game, 10);
        assert_eq!(config.answer_timeout, Duration::from_secs(20));
        assert_eq!(config.pairing_wait_threshold, Duration::from_secs(10));
        assert_eq!(config.scheduler_interval, Duration::from_millis(200));
    }
}
