//! Buffered framed streams

use crate::frame::{read_frame, write_frame};
use crate::message::{Request, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{BufReader, BufWriter, Read, Write};
use std::net::TcpStream;
use tally_core::Result;

/// Server side of a client connection
///
/// Sessions are written against this trait so they can be driven by a TCP
/// socket in production and by a scripted transport in tests.
pub trait Transport {
    /// Next request, or `None` once the client has closed the connection
    fn recv(&mut self) -> Result<Option<Request>>;

    /// Send one response
    fn send(&mut self, response: &Response) -> Result<()>;
}

/// Framed message stream over a reader/writer pair
#[derive(Debug)]
pub struct Channel<R, W> {
    reader: R,
    writer: W,
}

/// Channel over both halves of a TCP socket
pub type TcpChannel = Channel<BufReader<TcpStream>, BufWriter<TcpStream>>;

impl<R: Read, W: Write> Channel<R, W> {
    /// Wrap a reader and writer
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Receive one message of type `T`
    pub fn recv_message<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        read_frame(&mut self.reader)
    }

    /// Send one message and flush
    pub fn send_message<T: Serialize>(&mut self, msg: &T) -> Result<()> {
        write_frame(&mut self.writer, msg)
    }

    /// Unwrap into the underlying reader and writer
    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

impl TcpChannel {
    /// Buffered channel over a connected socket
    pub fn from_tcp(stream: TcpStream) -> Result<Self> {
        let read_half = stream.try_clone()?;
        Ok(Channel::new(BufReader::new(read_half), BufWriter::new(stream)))
    }

    /// Address of the remote peer
    pub fn peer_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.writer.get_ref().peer_addr()?)
    }
}

impl<R: Read, W: Write> Transport for Channel<R, W> {
    fn recv(&mut self) -> Result<Option<Request>> {
        self.recv_message()
    }

    fn send(&mut self, response: &Response) -> Result<()> {
        self.send_message(response)
    }
}
