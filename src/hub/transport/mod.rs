//! Remote-session transport.
//!
//! The hub never talks to russh directly. Every session owns at most one
//! [`Transport`], created by a [`TransportFactory`] when a connect starts, and
//! observes it through a [`TransportEvent`] watch channel. This keeps the
//! state machine testable without a live SSH server.

mod auth;
mod output;
mod ssh;
mod traits;

#[cfg(test)]
pub(crate) mod mock;

pub use auth::{AuthChain, AuthStrategy, KeyAuth, PasswordAuth};
pub use output::CommandOutput;
pub use ssh::{RusshTransport, RusshTransportFactory, SftpChannel, SshClientHandler};
pub use traits::{
    Credentials, FileTransfer, Transport, TransportConfig, TransportEvent, TransportFactory,
};
