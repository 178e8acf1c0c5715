//! The posts domain of the realtime blog.
//!
//! The domain service owns the ownership rules; [`gateways::live`] exposes it
//! to the live-sync core as a reactive data service; [`controller`] is the
//! client-side entry point for editing posts.

// === PUBLIC CONTRACT ===
pub mod contract;
pub use contract::{client, error, model};

pub mod controller;
pub mod demo;
pub mod functions;
pub mod module;

pub use controller::{PostDraft, PostsController, PostsControllerError};
pub use module::BlogPostsModule;

// === INTERNAL MODULES ===
#[doc(hidden)]
pub mod config;
#[doc(hidden)]
pub mod domain;
#[doc(hidden)]
pub mod gateways;
#[doc(hidden)]
pub mod infra;
