//! Client for the ChatRace user API: one endpoint, operations selected by
//! the `op`/`op1`/`op2`/`op3` fields of a JSON envelope.

pub mod config;
pub mod probe;
pub mod services;
pub mod utils;

pub use services::chatrace::{Auth, ChatraceError, Client, ClientConfig, Credentials, OtpSession};
pub use services::envelope::{EnvelopeBuilder, EnvelopeError, Provider, RequestEnvelope};
