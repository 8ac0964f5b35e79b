//! an interactive process monitor.
//!
//! metrics are read through a [`MetricsSource`], turned into cpu ratios by the [`Sentinel`] and
//! into a table of processes by the [`ProcessTable`], and painted by the [`DashboardController`]
//! in response to events from the [`EventBus`].

use std::io;

pub use self::{
    config::Config,
    dashboard::{DashboardController, Renderer},
    event::{Event, EventBus},
    procfs::ProcFs,
    sentinel::{Recording, Sentinel},
    source::{MetricsSource, SourceError},
    table::ProcessTable,
    window::{Session, Window},
};

/// a cache whose entries expire after a fixed interval.
mod cache;
pub mod config;
pub mod dashboard;
pub mod event;
/// human-readable renderings of metrics.
mod format;
/// labelled bar meters.
mod meter;
pub mod procfs;
pub mod process;
pub mod sentinel;
pub mod source;
/// kernel statistics facilities.
///
/// this file provides tools to parse `/proc/stat`.
mod stat;
pub mod table;
/// owner id to user name resolution.
mod users;
pub mod window;

/// a failure that ends the session.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// the terminal could not be queried or painted.
    #[error("terminal i/o failed: {0}")]
    Terminal(#[from] io::Error),
    /// the resize signal could not be routed to the event bus.
    #[error("failed to watch for resizes: {0}")]
    Signal(#[source] io::Error),
    #[error("failed to spawn the {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },
}
