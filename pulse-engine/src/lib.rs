//! # Pulse-Engine
//! Dispatch layer between an external market-data transport and the
//! [`pulse_indicators`] calculators.
//!
//! Raw JSON messages enter through the `on_raw_*` hooks (tolerating the
//! historical field aliases and book-message shapes), typed events through
//! the `on_*` hooks. Each event fans out to the calculators registered for
//! its kind — fixed at construction, never probed per event — and every
//! successful calculator invocation yields one tagged [`publish::Output`]
//! handed to the external [`publish::Publisher`].
//!
//! An optional [`backend::AcceleratedBackend`] is consulted first for the
//! four accelerated operations; any backend error falls back to the
//! reference calculators through an explicit `Result` branch.

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod parse;
pub mod publish;

pub use backend::AcceleratedBackend;
pub use config::EngineConfig;
pub use engine::{FlowFrame, IndicatorEngine, MarketEvent, Quote};
pub use error::{BackendError, ParseError};
pub use publish::{ChannelPublisher, Output, OutputValue, Publisher};
