//! End-to-end tests against real files in temporary workspaces.

mod byte_preservation;
mod plans;
mod scenarios;
mod transactions;
