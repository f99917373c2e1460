//! hlf-controller core library: request validation, command building, time-bounded
//! process execution, outcome classification, and the HTTP API over them.

pub mod api;
pub mod client;
pub mod command;
pub mod config;
pub mod controller;
pub mod exec;
pub mod locks;
pub mod operation;
pub mod outcome;
