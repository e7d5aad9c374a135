//! Connection adapter: one physical bidirectional transport, split into a
//! reading half and a writing half with liveness controls.
//!
//! The halves are generic over any `Stream`/`Sink` of [`Frame`]s so the client
//! agent can be driven by an upgraded axum WebSocket in production and by an
//! in-memory channel pair in tests.

use std::future::Future;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use thiserror::Error;
use tracing::trace;

/// Transport-level failures. Every variant is terminal for the connection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection closed")]
    Closed,

    #[error("No frame received within {0:?}")]
    ReadTimeout(Duration),

    #[error("Write did not complete within {0:?}")]
    WriteTimeout(Duration),

    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Transport I/O error: {0}")]
    Io(String),
}

/// One WebSocket frame, independent of the WebSocket implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

impl From<Message> for Frame {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Text(text) => Frame::Text(text),
            Message::Binary(data) => Frame::Binary(data),
            Message::Ping(data) => Frame::Ping(data),
            Message::Pong(data) => Frame::Pong(data),
            Message::Close(_) => Frame::Close,
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(data) => Message::Binary(data),
            Frame::Ping(data) => Message::Ping(data),
            Frame::Pong(data) => Message::Pong(data),
            Frame::Close => Message::Close(None),
        }
    }
}

/// A data frame handed to the client agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    /// Binary frames carry no protocol meaning; only the size is kept.
    Binary(usize),
}

/// Deadlines and size limits applied to one connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    /// Longest silence (no data, ping or pong) before the peer is presumed dead.
    pub read_timeout: Duration,
    /// Upper bound for a single feed, flush, ping or close.
    pub write_timeout: Duration,
    /// Largest accepted inbound data frame.
    pub max_frame_size: usize,
}

/// Receiving half of a connection.
pub struct ConnectionReader<R> {
    stream: R,
    limits: ConnectionLimits,
}

impl<R> ConnectionReader<R>
where
    R: Stream<Item = Result<Frame, TransportError>> + Unpin,
{
    pub fn new(stream: R, limits: ConnectionLimits) -> Self {
        Self { stream, limits }
    }

    /// Wait for the next data frame.
    ///
    /// Control frames refresh the read deadline and are consumed here.
    pub async fn recv(&mut self) -> Result<Inbound, TransportError> {
        loop {
            let next = tokio::time::timeout(self.limits.read_timeout, self.stream.next())
                .await
                .map_err(|_| TransportError::ReadTimeout(self.limits.read_timeout))?;

            match next {
                None | Some(Ok(Frame::Close)) => return Err(TransportError::Closed),
                Some(Err(e)) => return Err(e),
                Some(Ok(Frame::Text(text))) => {
                    self.check_size(text.len())?;
                    return Ok(Inbound::Text(text));
                }
                Some(Ok(Frame::Binary(data))) => {
                    self.check_size(data.len())?;
                    return Ok(Inbound::Binary(data.len()));
                }
                Some(Ok(Frame::Ping(_))) => trace!("ping received"),
                Some(Ok(Frame::Pong(_))) => trace!("pong received"),
            }
        }
    }

    fn check_size(&self, size: usize) -> Result<(), TransportError> {
        if size > self.limits.max_frame_size {
            return Err(TransportError::FrameTooLarge {
                size,
                max: self.limits.max_frame_size,
            });
        }
        Ok(())
    }
}

/// Sending half of a connection.
pub struct ConnectionWriter<W> {
    sink: W,
    limits: ConnectionLimits,
    closed: bool,
}

impl<W> ConnectionWriter<W>
where
    W: Sink<Frame, Error = TransportError> + Unpin,
{
    pub fn new(sink: W, limits: ConnectionLimits) -> Self {
        Self {
            sink,
            limits,
            closed: false,
        }
    }

    /// Queue a text frame without flushing it.
    pub async fn feed_text(&mut self, text: String) -> Result<(), TransportError> {
        let deadline = self.limits.write_timeout;
        with_deadline(deadline, self.sink.feed(Frame::Text(text))).await
    }

    /// Flush every queued frame to the peer.
    pub async fn flush(&mut self) -> Result<(), TransportError> {
        let deadline = self.limits.write_timeout;
        with_deadline(deadline, self.sink.flush()).await
    }

    /// Send a keepalive ping.
    pub async fn ping(&mut self) -> Result<(), TransportError> {
        let deadline = self.limits.write_timeout;
        with_deadline(deadline, self.sink.send(Frame::Ping(Vec::new()))).await
    }

    /// Send a close frame and shut the sink. Only the first call has an effect.
    ///
    /// Errors are ignored: the peer may already be gone.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let deadline = self.limits.write_timeout;
        if let Err(e) = with_deadline(deadline, self.sink.send(Frame::Close)).await {
            trace!(error = %e, "close frame not sent");
        }
        if let Err(e) = with_deadline(deadline, self.sink.close()).await {
            trace!(error = %e, "sink close failed");
        }
    }
}

async fn with_deadline<F>(deadline: Duration, fut: F) -> Result<(), TransportError>
where
    F: Future<Output = Result<(), TransportError>>,
{
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| TransportError::WriteTimeout(deadline))?
}

/// Split an upgraded axum WebSocket into connection halves.
pub fn from_websocket(
    socket: WebSocket,
    limits: ConnectionLimits,
) -> (
    ConnectionReader<impl Stream<Item = Result<Frame, TransportError>> + Send + Unpin>,
    ConnectionWriter<impl Sink<Frame, Error = TransportError> + Send + Unpin>,
) {
    let (sink, stream) = socket.split();

    let stream = stream.map(|msg| {
        msg.map(Frame::from)
            .map_err(|e| TransportError::Io(e.to_string()))
    });
    let sink = sink
        .sink_map_err(|e| TransportError::Io(e.to_string()))
        .with(|frame: Frame| future::ready(Ok::<Message, TransportError>(frame.into())));

    (
        ConnectionReader::new(stream, limits),
        ConnectionWriter::new(sink, limits),
    )
}

/// In-memory transport for tests: the server side gets real connection
/// halves, the test drives the other end.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use futures::channel::mpsc;

    use agora_shared::Envelope;

    pub(crate) type TestReader =
        ConnectionReader<mpsc::UnboundedReceiver<Result<Frame, TransportError>>>;
    pub(crate) type TestWriter = ConnectionWriter<
        futures::sink::SinkMapErr<
            mpsc::UnboundedSender<Frame>,
            fn(mpsc::SendError) -> TransportError,
        >,
    >;

    /// The client's end of an in-memory connection.
    pub(crate) struct Peer {
        to_server: mpsc::UnboundedSender<Result<Frame, TransportError>>,
        from_server: mpsc::UnboundedReceiver<Frame>,
    }

    fn closed(_: mpsc::SendError) -> TransportError {
        TransportError::Closed
    }

    pub(crate) fn pair(limits: ConnectionLimits) -> (TestReader, TestWriter, Peer) {
        let (to_server, server_rx) = mpsc::unbounded();
        let (server_tx, from_server) = mpsc::unbounded();

        let sink = server_tx.sink_map_err(closed as fn(mpsc::SendError) -> TransportError);
        (
            ConnectionReader::new(server_rx, limits),
            ConnectionWriter::new(sink, limits),
            Peer {
                to_server,
                from_server,
            },
        )
    }

    pub(crate) fn limits() -> ConnectionLimits {
        ConnectionLimits {
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(1),
            max_frame_size: 4096,
        }
    }

    impl Peer {
        pub(crate) fn send_frame(&self, frame: Frame) {
            self.to_server
                .unbounded_send(Ok(frame))
                .expect("server end dropped");
        }

        pub(crate) fn send_text(&self, text: &str) {
            self.send_frame(Frame::Text(text.to_string()));
        }

        /// Hang up without a close frame.
        pub(crate) fn disconnect(&self) {
            self.to_server.close_channel();
        }

        /// Next frame written by the server, or `None` if the server dropped
        /// its end. Panics if nothing arrives within two seconds.
        pub(crate) async fn next_frame(&mut self) -> Option<Frame> {
            tokio::time::timeout(Duration::from_secs(2), self.from_server.next())
                .await
                .expect("timed out waiting for a frame from the server")
        }

        /// Next decoded envelope, skipping pings.
        pub(crate) async fn next_envelope(&mut self) -> Envelope {
            loop {
                match self.next_frame().await {
                    Some(Frame::Text(text)) => {
                        return serde_json::from_str(&text).expect("server sent invalid JSON")
                    }
                    Some(Frame::Ping(_)) => continue,
                    other => panic!("expected a text frame, got {other:?}"),
                }
            }
        }

        /// Next envelope that satisfies `pred`, skipping everything else.
        pub(crate) async fn next_matching(&mut self, pred: impl Fn(&Envelope) -> bool) -> Envelope {
            loop {
                let envelope = self.next_envelope().await;
                if pred(&envelope) {
                    return envelope;
                }
            }
        }

        /// Frames until the server closes its end, in order.
        pub(crate) async fn drain_until_closed(&mut self) -> Vec<Frame> {
            let mut frames = Vec::new();
            while let Some(frame) = self.next_frame().await {
                frames.push(frame);
            }
            frames
        }
    }
}
