//! Wire protocol for Tally
//!
//! Defines how clients and the server talk:
//! - `message`: the typed [`Request`] / [`Response`] enums
//! - `frame`: length-prefixed MessagePack framing
//! - `channel`: a buffered framed stream and the [`Transport`] trait
//!   sessions are written against
//! - `client`: a blocking client proxy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod client;
pub mod frame;
pub mod message;

pub use channel::{Channel, TcpChannel, Transport};
pub use client::{Client, CloseOutcome};
pub use frame::{read_frame, write_frame, MAX_FRAME_LEN};
pub use message::{error_code, Request, Response};
