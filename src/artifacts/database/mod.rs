//! Database entry types
//!
//! Database entries reference stored objects together with their mode.

pub mod database_entry;
