//! microgpt - an LLM assistant for 3D microstructure analysis
//!
//! A CLI that talks to a hosted assistant and answers its tool calls locally.
//!
//! # Overview
//!
//! microgpt allows you to:
//! - Compute tortuosity, diffusivity and related metrics of TIFF images
//! - Search Zenodo and filter downloaded datasets by their metadata
//! - Let the assistant write, modify and run Python scripts (with consent)
//! - Keep generated plots and tables as local files
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Settings and persona/workflow prompts
//! - `assistant` - The hosted assistant service behind a backend trait
//! - `tools` - Tool registry, schemas and local tool handlers
//! - `session` - Run driver, poll loop and tool dispatcher
//! - `workflow` - Higher-order tools driving their own sub-conversations
//! - `render` - Reply text, footnotes and downloaded artifacts
//!
//! # Example
//!
//! ```rust,no_run
//! use microgpt::cli::Conversation;
//! use microgpt::config::Settings;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let session = Conversation::connect(settings)?;
//!     let conversation = Conversation::start(session).await?;
//!
//!     let reply = conversation
//!         .send("Tell me about the tortuosity of ./data/microstructure066.tif")
//!         .await?;
//!     println!("{}", reply.text);
//!
//!     Ok(())
//! }
//! ```

pub mod assistant;
pub mod cli;
pub mod config;
pub mod csv;
pub mod error;
pub mod openai;
pub mod render;
pub mod session;
pub mod tools;
pub mod workflow;

pub use error::{MicroError, Result};
