//! GorillaBot: configuration and built-in commands on top of gorilla-sdk.

pub mod commands;
pub mod config;
