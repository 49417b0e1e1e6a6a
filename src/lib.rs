//! # filedb - A file-backed multi-client database server
//!
//! Every table is one binary file with a fixed-width schema. Clients talk
//! to the server over TCP with fixed 4096-byte frames and send one line of
//! a small SQL-like script language per frame.
//!
//! ## Architecture Overview
//!
//! 1. **Server Layer** (`server` module): frame codec, connection handling
//!    and the single dispatcher loop
//! 2. **Session Layer** (`session` module): per-connection identity and
//!    open database
//! 3. **Script Layer** (`sql` module): tokenizer, statement parser,
//!    authorization and execution
//! 4. **Engine Layer** (`engine` module): table files, record codec and the
//!    system tables in the `admin` database
//!
//! ## Key Components
//!
//! - **TableFile**: header, attribute slots and first-fit record slots
//! - **Catalog**: accounts, database registry and permissions
//! - **authorize**: the one place that decides what a session may do
//!
//! ## Usage Example
//!
//! ```bash
//! # Start the server; the database root is created on first start
//! cargo run -- --data ./databases --listen 127.0.0.1:1122
//! ```
//!
//! A client then sends `root` (or an `'L'` login frame) followed by script
//! lines such as `CREATE DATABASE shop`, `USE shop` and
//! `SELECT * FROM items WHERE id=1`.

/// Server configuration loaded from JSON and command line flags
pub mod config;

/// Table files, schemas and system tables
pub mod engine;

/// TCP server and frame protocol
pub mod server;

/// Per-connection authentication state
pub mod session;

/// Script tokenizing, parsing and execution
pub mod sql;
