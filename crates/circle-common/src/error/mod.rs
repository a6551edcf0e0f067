//! Error taxonomy shared by the realtime client

mod client_error;

pub use client_error::{ClientError, ClientResult, ErrorKind};
