//! TCP front of the message director.
//!
//! Each accepted connection becomes a bus participant. Control frames edit
//! its subscriptions; every other frame is published on its behalf, and
//! whatever the bus delivers to it is written back to the socket.

mod frame;

pub use frame::{encode_control, read_frame, write_frame, ControlMessage, Frame, FrameError, MAX_FRAME_LEN};

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::ParticipantId;
use crate::context::{wait_for_shutdown, ServerContext};

/// Bind `addr` and accept participants until shutdown.
///
/// Returns the bound address (useful with port 0) and the accept task.
pub async fn listen(ctx: ServerContext, addr: &str) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    info!(addr = %local, "Message director listening");
    Ok((local, tokio::spawn(accept_loop(ctx, listener))))
}

async fn accept_loop(ctx: ServerContext, listener: TcpListener) {
    let mut shutdown = ctx.shutdown_signal();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(serve_connection(ctx.clone(), stream, peer));
                }
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                }
            },
            _ = wait_for_shutdown(&mut shutdown) => break,
        }
    }
    debug!("Listener stopped");
}

async fn serve_connection(ctx: ServerContext, stream: TcpStream, peer: SocketAddr) {
    let (participant, mut mailbox) = ctx.bus().register(format!("net:{peer}")).await;
    info!(%peer, participant, "Participant connected");

    let (mut reader, mut writer) = stream.into_split();
    let mut writer_task = tokio::spawn(async move {
        while let Some(datagram) = mailbox.recv().await {
            match write_frame(&mut writer, &datagram.encode()).await {
                Ok(()) => {}
                Err(FrameError::TooLarge(len)) => {
                    warn!(
                        %peer,
                        len,
                        msg_type = datagram.msg_type(),
                        sender = datagram.sender(),
                        "Datagram too large for a frame, skipped"
                    );
                }
                Err(e) => {
                    debug!(%peer, error = %e, "Write failed, closing");
                    break;
                }
            }
        }
    });

    // the connection lives until either half fails
    let mut shutdown = ctx.shutdown_signal();
    loop {
        tokio::select! {
            frame = read_frame(&mut reader) => match frame {
                Ok(Some(buf)) => handle_frame(&ctx, participant, peer, buf).await,
                Ok(None) => break,
                Err(e) => {
                    warn!(%peer, error = %e, "Read failed, closing");
                    break;
                }
            },
            _ = &mut writer_task => break,
            _ = wait_for_shutdown(&mut shutdown) => break,
        }
    }
    writer_task.abort();

    let released = ctx.bus().deregister(participant).await;
    info!(%peer, participant, channels = released, "Participant disconnected");
}

async fn handle_frame(ctx: &ServerContext, participant: ParticipantId, peer: SocketAddr, buf: bytes::Bytes) {
    let frame = match Frame::parse(buf.clone()) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(%peer, error = %e, frame = %hex::encode(&buf), "Malformed frame dropped");
            return;
        }
    };

    match frame {
        Frame::Control(ControlMessage::AddChannel(channel)) => {
            if let Err(e) = ctx.bus().subscribe(participant, channel).await {
                warn!(%peer, channel, error = %e, "Subscribe failed");
            }
        }
        Frame::Control(ControlMessage::RemoveChannel(channel)) => {
            ctx.bus().unsubscribe(participant, channel).await;
        }
        Frame::Control(ControlMessage::Unrecognized(msg_type)) => {
            warn!(%peer, msg_type, "Unrecognized control message");
        }
        Frame::Routed(datagram) => {
            ctx.bus().publish_from(Some(participant), datagram).await;
        }
    }
}
