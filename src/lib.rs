//! Streaming responses for a process supervisor's HTTP interface.
//!
//! Content is produced by pull-based [`producer::Producer`]s that report
//! [`producer::Pull::Pending`] instead of blocking. Adapters frame
//! ([`chunked`]), sequence ([`composite`]), coalesce ([`globbing`]) and
//! observe ([`hooked`]) other producers, and [`log::TailProducer`] follows a
//! growing log file. [`server`] drives the chains over TCP; [`handler`]
//! serves `GET /logtail/<process>`.

pub mod chunked;
pub mod composite;
pub mod cron;
pub mod globbing;
pub mod handler;
pub mod hooked;
pub mod log;
pub mod producer;
pub mod registry;
pub mod request;
pub mod server;

pub use producer::{BoxProducer, Producer, Pull};
