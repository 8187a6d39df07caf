//! Account layer for the Merx client: session tracking, profile loading and
//! the profile editing workflow, on top of a remote account backend.

pub mod avatar;
pub mod backend;
pub mod editor;
pub mod error;
pub mod header;
pub mod http;
pub mod memory;
pub mod notice;
pub mod profile_cache;
pub mod session;
pub mod storage;
