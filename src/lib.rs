//! Change-driven developer dashboard.
//!
//! Filesystem events are reduced to real content changes by
//! [`watcher::dedup::Deduplicator`], which re-triggers the checks held by a
//! [`controller::Controller`]. Each check runs an external tool through
//! [`runner`] and decodes its output with one of the [`parser`] grammars.

pub mod check;
pub mod config;
pub mod controller;
pub mod fingerprint;
pub mod output;
pub mod parser;
pub mod runner;
pub mod session;
pub mod watcher;
