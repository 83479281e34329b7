//! # docchat
//!
//! Harvest a project's documentation from GitHub and chat with it.
//!
//! docchat is two stages joined by a JSONL file. The harvester walks the
//! configured repository paths through the GitHub contents API and writes one
//! record per markdown file. The retriever chunks and embeds those records
//! into a local SQLite vector store, then answers questions by retrieving the
//! closest passages and handing them to a chat completion model.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────────┐   ┌──────────┐
//! │  GitHub  │──▶│ Harvester │──▶│ JSONL record │──▶│  Index   │
//! │ contents │   │ clean+tar │   │     file     │   │ chunk+emb│
//! └──────────┘   └───────────┘   └──────────────┘   └────┬─────┘
//!                                                        │
//!                                  ┌─────────────────────┤
//!                                  ▼                     ▼
//!                            ┌──────────┐          ┌──────────┐
//!                            │  search  │          │ ask/chat │
//!                            │  top-k   │          │ LLM turn │
//!                            └──────────┘          └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docchat harvest                 # write data/documentation_en_<date>.jsonl
//! docchat index                   # chunk + embed the newest harvest
//! docchat search "install"        # inspect retrieval
//! docchat chat --mode memory      # interactive session
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`github`] | GitHub contents API client |
//! | [`preprocess`] | Text cleanup for harvested files |
//! | [`records`] | JSONL record reading and writing |
//! | [`harvest`] | Repository walk and output file |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | SQLite vector store |
//! | [`index`] | Index build and reuse |
//! | [`retrieve`] | Top-k similarity retrieval |
//! | [`prompt`] | Context and prompt assembly |
//! | [`llm`] | Chat completion client |
//! | [`chat`] | Conversation turns and the chat loop |
//! | [`progress`] | Progress reporting on stderr |

pub mod chat;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod github;
pub mod harvest;
pub mod index;
pub mod llm;
pub mod models;
pub mod preprocess;
pub mod progress;
pub mod prompt;
pub mod records;
pub mod retrieve;
mod retry;
pub mod sources;
pub mod store;
