//! Wire protocol and question model shared by the trivia server, the test
//! client and the integration tests.
//!
//! The protocol is line oriented text over TCP: one message per line, fields
//! separated by `;`, key:value sub-fields separated by `:`. The field names
//! are part of the protocol and must not be translated or renamed; existing
//! clients match on them literally.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Questions asked per game.
pub const TOTAL_QUESTIONS: usize = 10;
/// Keyword a client may send at any point to cancel its current context.
pub const CANCEL_KEYWORD: &str = "cancelar";
/// Side command: request the player's cumulative statistics.
pub const STATS_COMMAND: &str = "estadisticas";
/// Side command: request the player's total score.
pub const SCORE_COMMAND: &str = "puntuacion";

/// The fixed set of categories the server offers.
pub const CATEGORIES: [&str; 4] = ["conocimiento-general", "musica", "geografia", "deportes"];

/// A pending player's preference: play immediately or wait to be paired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Solo,
    WaitForOpponent,
}

impl Mode {
    pub fn as_wire(&self) -> &'static str {
        match self {
            Mode::Solo => "solo",
            Mode::WaitForOpponent => "esperar",
        }
    }

    pub fn from_wire(s: &str) -> Option<Mode> {
        match s {
            "solo" => Some(Mode::Solo),
            "esperar" => Some(Mode::WaitForOpponent),
            _ => None,
        }
    }
}

/// A single trivia question with four options.
///
/// Immutable once loaded; each game session owns a private copy so concurrent
/// games never share mutable question state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: u32,
    pub text: String,
    pub options: [String; 4],
    /// Index of the correct option: 0 = A, 1 = B, 2 = C, 3 = D.
    pub correct: usize,
    pub category: String,
}

impl Question {
    /// The correct option as its wire letter.
    pub fn correct_letter(&self) -> char {
        (b'A' + self.correct as u8) as char
    }

    /// Case-insensitive single-letter match against the correct option.
    /// Anything that is not exactly one letter is wrong, never an error.
    pub fn is_correct(&self, answer: &str) -> bool {
        let mut chars = answer.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => c.to_ascii_uppercase() == self.correct_letter(),
            _ => false,
        }
    }
}

/// Final outcome of a multiplayer game from one player's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Winner,
    Loser,
    Draw,
}

impl MatchOutcome {
    pub fn as_wire(&self) -> &'static str {
        match self {
            MatchOutcome::Winner => "GANADOR",
            MatchOutcome::Loser => "PERDEDOR",
            MatchOutcome::Draw => "EMPATE",
        }
    }

    pub fn from_wire(s: &str) -> Option<MatchOutcome> {
        match s {
            "GANADOR" => Some(MatchOutcome::Winner),
            "PERDEDOR" => Some(MatchOutcome::Loser),
            "EMPATE" => Some(MatchOutcome::Draw),
            _ => None,
        }
    }
}

/// Every message the server can send, decoded once at the transport boundary.
///
/// `Display` produces the exact wire form; `parse` is its inverse and is what
/// the test client and the integration tests use.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// `SOLICITUD_NOMBRE`
    RequestName,
    /// `CONEXION_CANCELADA`
    ConnectionCancelled,
    /// `CATEGORIAS_DISPONIBLES;cat1;cat2;...`
    AvailableCategories(Vec<String>),
    /// `ESTADISTICAS;<summary with | separators>`
    Statistics(String),
    /// `PUNTUACION_TOTAL;<n>`
    TotalScore(i64),
    /// `SELECCION_INVALIDA;FORMATO:categoria:modo`
    InvalidSelection,
    /// `CATEGORIA_INVALIDA;<category>`
    InvalidCategory(String),
    /// `MODO_INVALIDO;<mode>`
    InvalidMode(String),
    /// `PARTIDA_EN_CURSO;MENSAJE:<text>`
    MatchInProgress(String),
    /// `PARTIDA_ENCONTRADA;TIPO:SOLO|MULTIJUGADOR;[OPONENTE:<name>;]CATEGORIA:<cat>`
    MatchFound {
        opponent: Option<String>,
        category: String,
    },
    /// `PARTIDA_SOLO_INICIADA;CATEGORIA:<cat>`
    SoloStarted { category: String },
    /// `PARTIDA_INICIADA;OPONENTE:<name>;CATEGORIA:<cat>`
    MatchStarted { opponent: String, category: String },
    /// `PREGUNTA;NUMERO:<n>;TOTAL:<t>;TEXTO:<text>;A:<opt>;B:<opt>;C:<opt>;D:<opt>`
    Question {
        number: usize,
        total: usize,
        text: String,
        options: [String; 4],
    },
    /// `SOLICITAR_RESPUESTA`
    RequestAnswer,
    /// `RESPUESTA_CORRECTA`
    AnswerCorrect,
    /// `RESPUESTA_INCORRECTA`
    AnswerIncorrect,
    /// `TIMEOUT`
    AnswerTimeout,
    /// `RESULTADO;CORRECTA:<letter>;PUNTOS_J1:<n>[;PUNTOS_J2:<n>]`
    RoundResult {
        correct: char,
        score_p1: u32,
        score_p2: Option<u32>,
    },
    /// `FIN_PARTIDA;PUNTOS:<n>;TOTAL_PREGUNTAS:<t>;PUNTOS_GANADOS:<n>`
    SoloFinished {
        correct: u32,
        total: usize,
        points: u32,
    },
    /// `FIN_PARTIDA;RESULTADO:...;PUNTOS:<n>;OPONENTE_PUNTOS:<n>;PUNTOS_GANADOS:<n>`
    MatchFinished {
        outcome: MatchOutcome,
        own: u32,
        opponent: u32,
        points: u32,
    },
    /// `PARTIDA_CANCELADA`
    MatchCancelled,
    /// `ERROR;<text>`
    Error(String),
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::RequestName => write!(f, "SOLICITUD_NOMBRE"),
            ServerMessage::ConnectionCancelled => write!(f, "CONEXION_CANCELADA"),
            ServerMessage::AvailableCategories(cats) => {
                write!(f, "CATEGORIAS_DISPONIBLES")?;
                for cat in cats {
                    write!(f, ";{}", cat)?;
                }
                Ok(())
            }
            ServerMessage::Statistics(summary) => write!(f, "ESTADISTICAS;{}", summary),
            ServerMessage::TotalScore(points) => write!(f, "PUNTUACION_TOTAL;{}", points),
            ServerMessage::InvalidSelection => {
                write!(f, "SELECCION_INVALIDA;FORMATO:categoria:modo")
            }
            ServerMessage::InvalidCategory(cat) => write!(f, "CATEGORIA_INVALIDA;{}", cat),
            ServerMessage::InvalidMode(mode) => write!(f, "MODO_INVALIDO;{}", mode),
            ServerMessage::MatchInProgress(text) => {
                write!(f, "PARTIDA_EN_CURSO;MENSAJE:{}", text)
            }
            ServerMessage::MatchFound { opponent, category } => match opponent {
                Some(name) => write!(
                    f,
                    "PARTIDA_ENCONTRADA;TIPO:MULTIJUGADOR;OPONENTE:{};CATEGORIA:{}",
                    name, category
                ),
                None => write!(f, "PARTIDA_ENCONTRADA;TIPO:SOLO;CATEGORIA:{}", category),
            },
            ServerMessage::SoloStarted { category } => {
                write!(f, "PARTIDA_SOLO_INICIADA;CATEGORIA:{}", category)
            }
            ServerMessage::MatchStarted { opponent, category } => {
                write!(f, "PARTIDA_INICIADA;OPONENTE:{};CATEGORIA:{}", opponent, category)
            }
            ServerMessage::Question {
                number,
                total,
                text,
                options,
            } => write!(
                f,
                "PREGUNTA;NUMERO:{};TOTAL:{};TEXTO:{};A:{};B:{};C:{};D:{}",
                number, total, text, options[0], options[1], options[2], options[3]
            ),
            ServerMessage::RequestAnswer => write!(f, "SOLICITAR_RESPUESTA"),
            ServerMessage::AnswerCorrect => write!(f, "RESPUESTA_CORRECTA"),
            ServerMessage::AnswerIncorrect => write!(f, "RESPUESTA_INCORRECTA"),
            ServerMessage::AnswerTimeout => write!(f, "TIMEOUT"),
            ServerMessage::RoundResult {
                correct,
                score_p1,
                score_p2,
            } => {
                write!(f, "RESULTADO;CORRECTA:{};PUNTOS_J1:{}", correct, score_p1)?;
                if let Some(p2) = score_p2 {
                    write!(f, ";PUNTOS_J2:{}", p2)?;
                }
                Ok(())
            }
            ServerMessage::SoloFinished {
                correct,
                total,
                points,
            } => write!(
                f,
                "FIN_PARTIDA;PUNTOS:{};TOTAL_PREGUNTAS:{};PUNTOS_GANADOS:{}",
                correct, total, points
            ),
            ServerMessage::MatchFinished {
                outcome,
                own,
                opponent,
                points,
            } => write!(
                f,
                "FIN_PARTIDA;RESULTADO:{};PUNTOS:{};OPONENTE_PUNTOS:{};PUNTOS_GANADOS:{}",
                outcome.as_wire(),
                own,
                opponent,
                points
            ),
            ServerMessage::MatchCancelled => write!(f, "PARTIDA_CANCELADA"),
            ServerMessage::Error(text) => write!(f, "ERROR;{}", text),
        }
    }
}

impl ServerMessage {
    /// Decodes one wire line back into a message. Returns `None` for lines
    /// that are not a known server message.
    pub fn parse(line: &str) -> Option<ServerMessage> {
        let mut fields = line.split(';');
        let tag = fields.next()?;
        match tag {
            "SOLICITUD_NOMBRE" => Some(ServerMessage::RequestName),
            "CONEXION_CANCELADA" => Some(ServerMessage::ConnectionCancelled),
            "CATEGORIAS_DISPONIBLES" => Some(ServerMessage::AvailableCategories(
                fields.map(str::to_string).collect(),
            )),
            "ESTADISTICAS" => Some(ServerMessage::Statistics(
                fields.collect::<Vec<_>>().join(";"),
            )),
            "PUNTUACION_TOTAL" => fields.next()?.parse().ok().map(ServerMessage::TotalScore),
            "SELECCION_INVALIDA" => Some(ServerMessage::InvalidSelection),
            "CATEGORIA_INVALIDA" => Some(ServerMessage::InvalidCategory(
                fields.next().unwrap_or_default().to_string(),
            )),
            "MODO_INVALIDO" => Some(ServerMessage::InvalidMode(
                fields.next().unwrap_or_default().to_string(),
            )),
            "PARTIDA_EN_CURSO" => Some(ServerMessage::MatchInProgress(
                sub_field(fields.next()?, "MENSAJE")?.to_string(),
            )),
            "PARTIDA_ENCONTRADA" => {
                let kind = sub_field(fields.next()?, "TIPO")?;
                match kind {
                    "SOLO" => Some(ServerMessage::MatchFound {
                        opponent: None,
                        category: sub_field(fields.next()?, "CATEGORIA")?.to_string(),
                    }),
                    "MULTIJUGADOR" => Some(ServerMessage::MatchFound {
                        opponent: Some(sub_field(fields.next()?, "OPONENTE")?.to_string()),
                        category: sub_field(fields.next()?, "CATEGORIA")?.to_string(),
                    }),
                    _ => None,
                }
            }
            "PARTIDA_SOLO_INICIADA" => Some(ServerMessage::SoloStarted {
                category: sub_field(fields.next()?, "CATEGORIA")?.to_string(),
            }),
            "PARTIDA_INICIADA" => Some(ServerMessage::MatchStarted {
                opponent: sub_field(fields.next()?, "OPONENTE")?.to_string(),
                category: sub_field(fields.next()?, "CATEGORIA")?.to_string(),
            }),
            "PREGUNTA" => {
                let number = sub_field(fields.next()?, "NUMERO")?.parse().ok()?;
                let total = sub_field(fields.next()?, "TOTAL")?.parse().ok()?;
                let text = sub_field(fields.next()?, "TEXTO")?.to_string();
                let a = sub_field(fields.next()?, "A")?.to_string();
                let b = sub_field(fields.next()?, "B")?.to_string();
                let c = sub_field(fields.next()?, "C")?.to_string();
                let d = sub_field(fields.next()?, "D")?.to_string();
                Some(ServerMessage::Question {
                    number,
                    total,
                    text,
                    options: [a, b, c, d],
                })
            }
            "SOLICITAR_RESPUESTA" => Some(ServerMessage::RequestAnswer),
            "RESPUESTA_CORRECTA" => Some(ServerMessage::AnswerCorrect),
            "RESPUESTA_INCORRECTA" => Some(ServerMessage::AnswerIncorrect),
            "TIMEOUT" => Some(ServerMessage::AnswerTimeout),
            "RESULTADO" => {
                let correct = sub_field(fields.next()?, "CORRECTA")?.chars().next()?;
                let score_p1 = sub_field(fields.next()?, "PUNTOS_J1")?.parse().ok()?;
                let score_p2 = match fields.next() {
                    Some(field) => Some(sub_field(field, "PUNTOS_J2")?.parse().ok()?),
                    None => None,
                };
                Some(ServerMessage::RoundResult {
                    correct,
                    score_p1,
                    score_p2,
                })
            }
            "FIN_PARTIDA" => {
                let first = fields.next()?;
                if let Some(outcome) = sub_field(first, "RESULTADO") {
                    Some(ServerMessage::MatchFinished {
                        outcome: MatchOutcome::from_wire(outcome)?,
                        own: sub_field(fields.next()?, "PUNTOS")?.parse().ok()?,
                        opponent: sub_field(fields.next()?, "OPONENTE_PUNTOS")?.parse().ok()?,
                        points: sub_field(fields.next()?, "PUNTOS_GANADOS")?.parse().ok()?,
                    })
                } else {
                    Some(ServerMessage::SoloFinished {
                        correct: sub_field(first, "PUNTOS")?.parse().ok()?,
                        total: sub_field(fields.next()?, "TOTAL_PREGUNTAS")?.parse().ok()?,
                        points: sub_field(fields.next()?, "PUNTOS_GANADOS")?.parse().ok()?,
                    })
                }
            }
            "PARTIDA_CANCELADA" => Some(ServerMessage::MatchCancelled),
            "ERROR" => Some(ServerMessage::Error(
                fields.collect::<Vec<_>>().join(";"),
            )),
            _ => None,
        }
    }
}

/// Extracts the value of a `KEY:value` sub-field, or `None` if the key differs.
fn sub_field<'a>(field: &'a str, key: &str) -> Option<&'a str> {
    let (k, v) = field.split_once(':')?;
    if k == key {
        Some(v)
    } else {
        None
    }
}

/// True if the line is the cancel keyword, matched case-insensitively.
pub fn is_cancel(line: &str) -> bool {
    line.eq_ignore_ascii_case(CANCEL_KEYWORD)
}

/// Why a `<category>:<mode>` selection line was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    Format,
    UnknownCategory(String),
    UnknownMode(String),
}

/// Parses a client's `<category>:<mode>` selection against the fixed
/// category set. Input is lowercased and trimmed field-wise first.
pub fn parse_selection(line: &str) -> Result<(String, Mode), SelectionError> {
    let parts: Vec<&str> = line.split(':').collect();
    if parts.len() != 2 {
        return Err(SelectionError::Format);
    }

    let category = parts[0].trim().to_lowercase();
    let mode = parts[1].trim().to_lowercase();

    if !CATEGORIES.contains(&category.as_str()) {
        return Err(SelectionError::UnknownCategory(category));
    }

    match Mode::from_wire(&mode) {
        Some(mode) => Ok((category, mode)),
        None => Err(SelectionError::UnknownMode(mode)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question() -> Question {
        Question {
            id: 7,
            text: "¿Capital de Francia?".to_string(),
            options: [
                "París".to_string(),
                "Roma".to_string(),
                "Berlín".to_string(),
                "Madrid".to_string(),
            ],
            correct: 0,
            category: "geografia".to_string(),
        }
    }

    #[test]
    fn answer_matching_is_case_insensitive() {
        let q = question();
        assert!(q.is_correct("A"));
        assert!(q.is_correct("a"));
        assert!(!q.is_correct("B"));
        assert!(!q.is_correct("b"));
    }

    #[test]
    fn answer_must_be_a_single_letter() {
        let q = question();
        assert!(!q.is_correct(""));
        assert!(!q.is_correct("AB"));
        assert!(!q.is_correct("París"));
    }

    #[test]
    fn correct_letter_maps_index_to_letter() {
        let mut q = question();
        assert_eq!(q.correct_letter(), 'A');
        q.correct = 3;
        assert_eq!(q.correct_letter(), 'D');
    }

    #[test]
    fn cancel_keyword_is_case_insensitive() {
        assert!(is_cancel("cancelar"));
        assert!(is_cancel("CANCELAR"));
        assert!(is_cancel("Cancelar"));
        assert!(!is_cancel("cancel"));
        assert!(!is_cancel(""));
    }

    #[test]
    fn selection_parsing_accepts_known_pairs() {
        assert_eq!(
            parse_selection("musica:solo"),
            Ok(("musica".to_string(), Mode::Solo))
        );
        assert_eq!(
            parse_selection("GEOGRAFIA:ESPERAR"),
            Ok(("geografia".to_string(), Mode::WaitForOpponent))
        );
    }

    #[test]
    fn selection_parsing_rejects_malformed_input() {
        assert_eq!(parse_selection("musica"), Err(SelectionError::Format));
        assert_eq!(parse_selection("a:b:c"), Err(SelectionError::Format));
        assert_eq!(
            parse_selection("historia:solo"),
            Err(SelectionError::UnknownCategory("historia".to_string()))
        );
        assert_eq!(
            parse_selection("musica:duo"),
            Err(SelectionError::UnknownMode("duo".to_string()))
        );
    }

    #[test]
    fn wire_format_matches_protocol_exactly() {
        assert_eq!(ServerMessage::RequestName.to_string(), "SOLICITUD_NOMBRE");
        assert_eq!(
            ServerMessage::AvailableCategories(vec![
                "musica".to_string(),
                "deportes".to_string()
            ])
            .to_string(),
            "CATEGORIAS_DISPONIBLES;musica;deportes"
        );
        assert_eq!(
            ServerMessage::MatchFound {
                opponent: None,
                category: "musica".to_string()
            }
            .to_string(),
            "PARTIDA_ENCONTRADA;TIPO:SOLO;CATEGORIA:musica"
        );
        assert_eq!(
            ServerMessage::MatchFound {
                opponent: Some("ana".to_string()),
                category: "deportes".to_string()
            }
            .to_string(),
            "PARTIDA_ENCONTRADA;TIPO:MULTIJUGADOR;OPONENTE:ana;CATEGORIA:deportes"
        );
        assert_eq!(
            ServerMessage::Question {
                number: 3,
                total: 10,
                text: "¿Pregunta?".to_string(),
                options: [
                    "uno".to_string(),
                    "dos".to_string(),
                    "tres".to_string(),
                    "cuatro".to_string()
                ],
            }
            .to_string(),
            "PREGUNTA;NUMERO:3;TOTAL:10;TEXTO:¿Pregunta?;A:uno;B:dos;C:tres;D:cuatro"
        );
        assert_eq!(
            ServerMessage::RoundResult {
                correct: 'B',
                score_p1: 2,
                score_p2: None
            }
            .to_string(),
            "RESULTADO;CORRECTA:B;PUNTOS_J1:2"
        );
        assert_eq!(
            ServerMessage::RoundResult {
                correct: 'B',
                score_p1: 2,
                score_p2: Some(4)
            }
            .to_string(),
            "RESULTADO;CORRECTA:B;PUNTOS_J1:2;PUNTOS_J2:4"
        );
        assert_eq!(
            ServerMessage::SoloFinished {
                correct: 9,
                total: 10,
                points: 5
            }
            .to_string(),
            "FIN_PARTIDA;PUNTOS:9;TOTAL_PREGUNTAS:10;PUNTOS_GANADOS:5"
        );
        assert_eq!(
            ServerMessage::MatchFinished {
                outcome: MatchOutcome::Draw,
                own: 6,
                opponent: 6,
                points: 1
            }
            .to_string(),
            "FIN_PARTIDA;RESULTADO:EMPATE;PUNTOS:6;OPONENTE_PUNTOS:6;PUNTOS_GANADOS:1"
        );
        assert_eq!(
            ServerMessage::InvalidSelection.to_string(),
            "SELECCION_INVALIDA;FORMATO:categoria:modo"
        );
        assert_eq!(
            ServerMessage::MatchInProgress("ocupado".to_string()).to_string(),
            "PARTIDA_EN_CURSO;MENSAJE:ocupado"
        );
    }

    #[test]
    fn parse_roundtrips_every_variant() {
        let messages = vec![
            ServerMessage::RequestName,
            ServerMessage::ConnectionCancelled,
            ServerMessage::AvailableCategories(
                CATEGORIES.iter().map(|c| c.to_string()).collect(),
            ),
            ServerMessage::Statistics("Puntos totales: 12|Partidas jugadas: 3".to_string()),
            ServerMessage::TotalScore(42),
            ServerMessage::InvalidSelection,
            ServerMessage::InvalidCategory("historia".to_string()),
            ServerMessage::InvalidMode("duo".to_string()),
            ServerMessage::MatchInProgress("espera o juega solo".to_string()),
            ServerMessage::MatchFound {
                opponent: Some("luis".to_string()),
                category: "musica".to_string(),
            },
            ServerMessage::SoloStarted {
                category: "deportes".to_string(),
            },
            ServerMessage::MatchStarted {
                opponent: "ana".to_string(),
                category: "geografia".to_string(),
            },
            ServerMessage::Question {
                number: 1,
                total: 10,
                text: "¿Cuánto es 2+2?".to_string(),
                options: [
                    "3".to_string(),
                    "4".to_string(),
                    "5".to_string(),
                    "6".to_string(),
                ],
            },
            ServerMessage::RequestAnswer,
            ServerMessage::AnswerCorrect,
            ServerMessage::AnswerIncorrect,
            ServerMessage::AnswerTimeout,
            ServerMessage::RoundResult {
                correct: 'C',
                score_p1: 3,
                score_p2: Some(1),
            },
            ServerMessage::SoloFinished {
                correct: 7,
                total: 10,
                points: 3,
            },
            ServerMessage::MatchFinished {
                outcome: MatchOutcome::Winner,
                own: 8,
                opponent: 2,
                points: 3,
            },
            ServerMessage::MatchCancelled,
            ServerMessage::Error("No hay preguntas disponibles".to_string()),
        ];

        for msg in messages {
            let wire = msg.to_string();
            assert_eq!(ServerMessage::parse(&wire), Some(msg), "wire: {}", wire);
        }
    }

    #[test]
    fn parse_rejects_unknown_lines() {
        assert_eq!(ServerMessage::parse(""), None);
        assert_eq!(ServerMessage::parse("HOLA;MUNDO"), None);
        assert_eq!(ServerMessage::parse("PREGUNTA;NUMERO:x"), None);
    }
}
