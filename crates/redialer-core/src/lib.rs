//! # Redialer Core Library
//!
//! Watches a telephone line's call state and reacts to it: the configured
//! number is redialed when a call ends, and an audible alert is requested
//! when a connected call runs longer than a fixed delay.
//!
//! ## Architecture
//!
//! - **Tracker**: debounces raw call-state notifications so that transient
//!   connected blips never count as a call
//! - **Alert timer**: a single replaceable countdown armed on a confirmed
//!   connection
//! - **Redial controller**: issues one dial per confirmed idle transition
//! - **Automaton**: composes the three; pure and clock-driven
//! - **Monitor**: async session that serializes notifications into the
//!   automaton and sleeps until its next deadline
//!
//! The platform is reached only through two seams: callers push
//! [`CallState`] values into a [`MonitorHandle`], and the automaton's
//! [`Command`]s are executed by a [`CommandSink`].

pub mod alert;
pub mod automaton;
pub mod call;
pub mod config;
pub mod error;
pub mod events;
pub mod monitor;
pub mod redial;
pub mod sink;
pub mod tracker;

pub use alert::{AlertTimer, Countdown};
pub use automaton::{Automaton, Phase, Settings, Status};
pub use call::{CallEvent, CallState};
pub use config::{CommandsConfig, Config};
pub use error::{ConfigError, CoreError, SinkError};
pub use events::Event;
pub use monitor::{Monitor, MonitorHandle};
pub use redial::{RedialController, RedialMode, TargetNumber};
pub use sink::{Command, CommandSink, RecordingSink};
pub use tracker::{DebouncedTracker, TrackerDecision};
