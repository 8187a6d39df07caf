//! Merx shared library: ids, errors, and contract types shared between the account layer and the client.

pub mod api;
pub mod constants;
pub mod error;
pub mod form;
pub mod ids;
