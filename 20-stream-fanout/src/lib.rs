//! Broadcast a line-oriented stream to every connected TCP client.
//!
//! One reader pulls lines from a file or stdin; every client that is connected
//! when a line is read gets a copy, in order. Clients joining later only see
//! what comes after they joined. A client that cannot keep up loses lines
//! instead of slowing anyone else down.
//!
//! - [`cli`] parses the command-line interface.
//! - [`registry`] tracks connected clients and their bounded inboxes.
//! - [`broadcaster`] offers each line to every inbox without blocking.
//! - [`source`] reads the input and drives the broadcaster.
//! - [`connection`] drains one client's inbox to its socket.
//! - [`server`] accepts TCP connections and spawns a handler for each.

pub mod broadcaster;
pub mod cli;
pub mod connection;
pub mod registry;
pub mod server;
pub mod source;
