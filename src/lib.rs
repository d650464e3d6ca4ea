//! A Riemann protocol adapter.
//!
//! This crate translates between a generic internal event record and the
//! Riemann wire protocol, in both directions and over both TCP and UDP.
//!
//! # Modules
//!
//! - `proto`: The Riemann protocol buffer messages.
//! - `event`: The generic event record consumed and produced by the adapter.
//! - `translate`: Mapping between generic events and Riemann events.
//! - `codec`: Message encoding, decoding and stream length prefixes.
//! - `framing`: Per transport framing and stream frame reassembly.
//! - `io`: Async helpers for reading and writing whole frames.
//! - `output`: Serializing events to a collector and accounting for replies.
//! - `input`: Connection state machines for the listening side.
//! - `server`: TCP and UDP listeners driving the input connections.
//! - `transport`: Setup entry points selecting TCP or UDP from configuration.
//! - `traits`: The `Sink`, `SharedSink`, `Emitter` and `Accepter` seams.
//!
//! # Examples
//!
//! ```no_run
//! use riemann_adapter::{
//!     config::AdapterConfig, event::GenericEvent, traits::Emitter, transport::output_setup,
//! };
//!
//! # fn main() -> riemann_adapter::error::Result<()> {
//! # async_std::task::block_on(async {
//! let config = AdapterConfig::from_toml_str(r#"
//!     protocol = "tcp:riemann.local:5555"
//!     tags = ["env"]
//! "#)?;
//! let output = output_setup(&config).await?;
//! output
//!     .send_event(&GenericEvent::new().with_key("cpu").with_value(0.5))
//!     .await?;
//! output.close().await?;
//! # Ok(())
//! # })
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod framing;
pub mod input;
pub mod io;
pub mod output;
pub mod proto;
pub mod server;
pub mod traits;
pub mod translate;
pub mod transport;

pub use error::{Error, Result};
pub use event::{GenericEvent, Value};
