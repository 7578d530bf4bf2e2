//! Integration tests over the full HTTP and WebSocket surface, running on
//! in-memory storage, cache and fanout.

mod helpers;

mod auth_test;
mod gateway_test;
mod health_test;
mod sessions_test;
mod ws_test;
