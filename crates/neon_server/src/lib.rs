//! Listener and site orchestration for neon.
//!
//! A [`Server`] hosts multiple virtual [`ServerSite`]s on a set of named
//! [`ServerListener`]s. Each site builds a routed handler chain
//! (middleware stacks around one terminal handler per route, wrapped in
//! the mandatory [`envelope::Envelope`]); each listener merges the route
//! tables of its linked sites into one composite [`router::Mux`] and
//! swaps it atomically whenever the binding graph changes.

pub mod envelope;
pub mod error;
pub mod listener;
pub mod router;
pub mod server;
pub mod site;

pub use envelope::Envelope;
pub use error::ServerError;
pub use listener::ServerListener;
pub use router::{Mux, RouteKey, RouteTable};
pub use server::{InheritedListeners, Server};
pub use site::ServerSite;
