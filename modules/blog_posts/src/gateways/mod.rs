pub mod live;
pub mod local;
pub mod webhook;
