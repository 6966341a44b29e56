//! Taskline: the caching core of a task-management web application.
//!
//! The crate implements a tagged API response cache: an axum middleware that
//! serves conditional (304) and cached (200) responses, deterministic cache
//! key and tag construction per endpoint and user, a retryable cache-warming
//! job, and synchronous aggregate invalidation on the task write path.
//!
//! Routing, persistence, authentication, and the queue transport belong to
//! the host application and are consumed through traits
//! ([`cache::CacheBackend`], [`application::repos`]) and request extensions
//! ([`cache::CurrentUser`]).

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
