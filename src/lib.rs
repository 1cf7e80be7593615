//! # BotBranch
//!
//! Carry a chat transcript from one AI chat site into another.
//!
//! BotBranch harvests a conversation from a virtualized chat UI, dedupes
//! and orders the turns, packs them into size-bounded parts, stores the
//! transfer in a key-value store, and replays it into the target site's
//! input control part by part.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌────────────┐
//! │  Harvester   │──▶│ Chunk+Encode │──▶│  KvStore   │
//! │ scroll+dedup │   │  (core)      │   │ payload+ptr│
//! └──────────────┘   └──────────────┘   └─────┬──────┘
//!                                             │ bb_id
//!                                             ▼
//!                                       ┌────────────┐
//!                                       │  Receiver  │
//!                                       │  + Replay  │
//!                                       └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! botbranch sites
//! botbranch export page.html --from chatgpt --to gemini
//! botbranch receive "https://gemini.google.com/app?bb_id=bb_1700000000000"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`adapter`] | Page capability traits |
//! | [`commands`] | CLI command implementations |
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`poll`] | Bounded polling primitive |
//! | [`harvest`] | Scroll harvester and ordering pass |
//! | [`gateway`] | Typed payload and pointer storage |
//! | [`replay`] | Replay injector state machine |
//! | [`transfer`] | Export pipeline |
//! | [`receive`] | Receiving-side handoff |
//! | [`progress`] | Progress reporting and the trigger control |
//! | [`file_store`] | JSON-file key-value store |
//! | [`sites`] | Per-site selector profiles and adapters |

pub mod adapter;
pub mod commands;
pub mod config;
pub mod error;
pub mod file_store;
pub mod gateway;
pub mod harvest;
pub mod poll;
pub mod progress;
pub mod receive;
pub mod replay;
pub mod sites;
pub mod transfer;

pub use botbranch_core as core;
