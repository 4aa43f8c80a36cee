//! Authorized caller for a tab backed by Azure Functions.
//!
//! ARCHITECTURE
//! ============
//! - `config`: typed settings from the environment
//! - `identity`: account cache, silent acquisition, refresh grants
//! - `host`: host startup signal and the interactive consent exchange
//! - `remote`: bearer-authenticated function call
//! - `caller`: the silent → consent → retry → call flow
//! - `view`: call result and its text rendering

pub mod caller;
pub mod config;
pub mod error;
pub mod host;
pub mod identity;
pub mod remote;
pub mod view;
