//! Network access server for a running emulator.
//!
//! External tools (debuggers, automation bots, memory-watch overlays) connect
//! over TCP and issue text commands to inspect and control the emulator, with
//! bulk memory transfers carried in length-prefixed binary frames on the same
//! socket.
//!
//! - [`cli`] parses the command-line interface for server and query modes.
//! - [`server`] owns the listener and runs the accept/poll loop on one task.
//! - [`connection`] drains a client socket into its receive buffer and writes replies.
//! - [`frame`] splits the byte stream into text and binary frames.
//! - [`session`] maps verbs to handlers and tracks the pending binary command.
//! - [`memory`] parses offset/size tokens and performs bounds-checked copies.
//! - [`region`] names the exposed memory regions and their sizes.
//! - [`emulator`] is the contract the emulator implements; [`headless`] is a
//!   memory-only implementation used by the binary and the tests.
//! - [`message`] encodes replies and decodes them on the client side.
//! - [`client`] is a small async client built on [`message`].
//! - [`error`] holds the error kinds reported to clients.

pub mod cli;
pub mod client;
pub mod connection;
pub mod emulator;
pub mod error;
pub mod frame;
pub mod headless;
pub mod memory;
pub mod message;
pub mod region;
pub mod server;
pub mod session;
