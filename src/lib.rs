//! # docchat
//!
//! A project-scoped document retrieval engine for grounded chat.
//!
//! docchat ingests uploaded documents into per-project collections, chunks
//! them into overlapping passages with exact character-offset provenance,
//! embeds and ranks them by cosine similarity, and folds the top passages
//! into an LLM prompt so every answer can cite the exact source span it
//! came from.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────────┐
//! │ Upload   │──▶│ Extract +    │──▶│ SQLite         │
//! │ txt/pdf/ │   │ Chunk+Embed  │   │ snippet store  │
//! │ docx     │   └──────────────┘   └──────┬────────┘
//! └──────────┘                             │
//!                    ┌─────────────────────┤
//!                    ▼                     ▼
//!              ┌──────────┐         ┌────────────┐
//!              │ Persisted│◀───────▶│   Ranker    │
//!              │  index   │ rebuild │ top-k cosine│
//!              └──────────┘         └─────┬──────┘
//!                                         ▼
//!                                   ┌────────────┐
//!                                   │ Chat + cite │
//!                                   └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docchat init                          # create database
//! docchat project create "handbook"
//! docchat ingest <project> manual.pdf   # extract, chunk, embed, index
//! docchat chat <project> "how do I deploy?"
//! docchat show <doc> --start 120 --end 240   # highlight a cited span
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | Upload text extraction (plain, PDF, DOCX) |
//! | [`chunk`] | Overlapping-window chunking with char-offset spans |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Append-only snippet store (source of truth) |
//! | [`index`] | Persisted per-project index (disposable cache) |
//! | [`rank`] | Bounded top-k cosine ranking |
//! | [`chat`] | Prompt assembly and conversation log |
//! | [`llm`] | Chat model abstraction |
//! | [`engine`] | Ingest/query/delete orchestration |
//! | [`highlight`] | Cited-span highlighting |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chat;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extract;
pub mod highlight;
pub mod index;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod rank;
pub mod store;
