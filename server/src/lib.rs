//! # Trivia Game Server
//!
//! Authoritative server for a line-protocol trivia game. Remote players
//! connect over TCP, pick a category and a play mode, and are matched into
//! solo or two-player sessions of ten timed questions each.
//!
//! ## Architecture
//!
//! Every accepted socket gets one dedicated reader task that forwards lines
//! into a single-slot channel owned by whichever component is currently
//! responsible for the player: the handshake, the matchmaking queue, or a
//! running game session. A periodic scheduler scans the queue and commits at
//! most one match at a time; the global capacity limit is a semaphore of
//! size one whose permit lives inside the session task.
//!
//! ## Module Organization
//!
//! - [`network`] — TCP accept loop and server assembly
//! - [`connection`] — per-player reader task and line-framed writes
//! - [`handshake`] — name and category/mode negotiation, busy rejection
//! - [`matchmaking`] — pending queue, scheduler, pairing rules
//! - [`session`] — the per-game state machine, scoring and finalization
//! - [`questions`] — lazily loaded JSON question banks
//! - [`storage`] — SQLite-backed player and game records
//! - [`config`] — gameplay pacing and matchmaking tunables

pub mod config;
pub mod connection;
pub mod handshake;
pub mod matchmaking;
pub mod network;
pub mod questions;
pub mod session;
pub mod storage;
