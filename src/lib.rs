//! Confab: turn-based multi-agent conversation orchestration
//!
//! Runs conversations among a fixed set of agents under a validated
//! speaker-transition graph. Replies are memoized in a seed-scoped cache so
//! repeated runs are deterministic and cheap. An actor bridge lets
//! participants on an external message bus join in.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use confab::prelude::*;
//!
//! # async fn example(service: Arc<dyn CompletionService>) -> confab::error::Result<()> {
//! let client = Arc::new(CompletionClient::new(service).with_cache(Arc::new(InMemoryCache::new())));
//! let coder: Arc<dyn Agent> = Arc::new(CompletionAgent::new("coder", client.clone()));
//! let critic: Arc<dyn Agent> = Arc::new(CompletionAgent::new("critic", client.clone()));
//!
//! let config = ConversationConfig {
//!     speaker_selection: SelectionStrategy::RoundRobin,
//!     max_consecutive_auto_reply: Some(6),
//!     ..ConversationConfig::default()
//! };
//! let (mut chat, _warnings) = config.build(vec![coder, critic], Some(client))?;
//! chat.initiate(ChatMessage::initiate("coder".into(), "Write a haiku about Rust.")).await?;
//! chat.run(10).await?;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod cache;
pub mod completion;
pub mod config;
pub mod conversation;
pub mod error;
pub mod graph;
pub mod prelude;
pub mod selector;
pub mod types;
pub mod util;

#[cfg(feature = "bridge")]
pub mod bridge;

#[cfg(feature = "gateway")]
pub mod gateway;
