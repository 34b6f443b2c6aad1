#![allow(async_fn_in_trait)]

pub mod auth;
pub mod clock;
pub mod config;
#[cfg(test)]
mod fake_portal;
pub mod handler;
pub mod rate_limiter;
pub mod server;
pub mod session;
pub mod store;
pub mod transactions;
