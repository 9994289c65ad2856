//! # oltlink - Telnet Session Manager for Network Appliances
//!
//! `oltlink` drives the interactive, prompt-delimited command line of a
//! network appliance (such as a Huawei OLT) over a plain telnet-style stream.
//! It performs the username/password handshake, then round-trips commands one
//! at a time, returning each command's output up to the operational prompt.
//!
//! ## Features
//!
//! - **Explicit State Machine**: `Disconnected`, `Authenticating`, `Ready`, `Failed`
//! - **Bounded I/O**: Connect, login prompts and command reads all time out
//! - **Typed Errors**: Connection, authentication, timeout and I/O failures are distinct
//! - **Telnet Negotiation**: Option requests are refused and stripped from output
//! - **Injected Observer**: Lifecycle events go to a pluggable sink, `log` by default
//! - **Shared Sessions**: A worker queue and a session pool for concurrent callers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use oltlink::session::{Credentials, SessionManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = SessionManager::new("10.0.0.5", Credentials::new("admin", "secret"));
//!
//!     session.connect().await?;
//!     let output = session.execute("display version").await?;
//!     println!("{}", output.all);
//!     session.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Main Components
//!
//! - [`session::SessionManager`] - Connect / execute / disconnect for one appliance
//! - [`session::SessionPool`] - Cache of shared, queued sessions
//! - [`inventory::DeviceInventory`] - Device name to address lookups
//! - [`commands::OltQuery`] - Common OLT search commands
//! - [`error::SessionError`] - Error types for every failure path
//! - [`config`] - Wire constants and session configuration

pub mod commands;
pub mod config;
pub mod error;
pub mod inventory;
pub mod session;
