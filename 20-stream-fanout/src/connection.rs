//! Per-connection delivery loop.
//!
//! A connection registers, streams its inbox to the socket, and unregisters.
//! Unregistering is tied to a guard, so every exit from the streaming loop,
//! panics included, leaves the registry without a stale entry.
//!
//! Clients are not expected to send anything. The read half is only watched so
//! that a hang-up is noticed even when no lines are flowing.

use std::{io, net::SocketAddr};

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    select,
    sync::mpsc,
};
use tracing::{debug, info};

use crate::registry::{ClientId, Line, Registry};

/// Why a connection stopped streaming.
#[derive(Debug)]
pub enum StreamEnd {
    /// The registry dropped this client's inbox, e.g. during shutdown.
    InboxClosed,
    /// The peer closed its side of the connection.
    PeerClosed,
    /// Reading from the peer failed.
    ReadFailed(io::Error),
    /// Writing to the peer failed; usually the peer hung up.
    WriteFailed(io::Error),
}

/// An active registration. Dropping it unregisters the client.
struct Session<'a> {
    id: ClientId,
    registry: &'a Registry,
}

impl<'a> Session<'a> {
    fn open(registry: &'a Registry) -> (Self, mpsc::Receiver<Line>) {
        let (id, inbox) = registry.register();
        (Self { id, registry }, inbox)
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}

/// Serves one client until it goes away or its inbox is closed.
pub async fn handle_connection<R, W>(
    registry: &Registry,
    mut reader: R,
    mut writer: W,
    peer: Option<SocketAddr>,
) -> StreamEnd
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (session, mut inbox) = Session::open(registry);
    let client = session.id;
    info!(?peer, client, "client connected");

    let end = stream_inbox(&mut inbox, &mut reader, &mut writer).await;
    drop(session);

    match &end {
        StreamEnd::InboxClosed => debug!(client, "inbox closed"),
        StreamEnd::PeerClosed => debug!(client, "peer closed the connection"),
        StreamEnd::ReadFailed(err) => debug!(client, error = ?err, "read from client failed"),
        StreamEnd::WriteFailed(err) => debug!(client, error = ?err, "write to client failed"),
    }
    if let Err(err) = writer.shutdown().await {
        debug!(client, error = ?err, "failed to shut down client socket");
    }
    info!(?peer, client, "client disconnected");

    end
}

async fn stream_inbox<R, W>(
    inbox: &mut mpsc::Receiver<Line>,
    reader: &mut R,
    writer: &mut W,
) -> StreamEnd
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut scratch = [0u8; 512];

    loop {
        select! {
            next = inbox.recv() => {
                let Some(line) = next else {
                    return StreamEnd::InboxClosed;
                };
                if let Err(err) = write_line(writer, &line).await {
                    return StreamEnd::WriteFailed(err);
                }
            }
            read = reader.read(&mut scratch) => match read {
                Ok(0) => return StreamEnd::PeerClosed,
                // Anything the client sends is ignored.
                Ok(_) => {}
                Err(err) => return StreamEnd::ReadFailed(err),
            },
        }
    }
}

async fn write_line<W>(writer: &mut W, line: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line).await?;
    writer.flush().await
}
