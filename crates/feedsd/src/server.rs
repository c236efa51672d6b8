//! Peer server: accepts connections and feeds their frames to the command
//! handler.
//!
//! Frames from one connection are handled strictly in arrival order: the
//! next frame is not read until the previous one has been processed.
//! Different connections run in parallel, bounded by the worker semaphore.

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Semaphore};

use feeds_services::CommandHandler;

use crate::frame::read_frame;
use crate::transport::{write_loop, PeerTransport};

/// Shared state every connection task needs.
#[derive(Clone)]
pub struct Connections {
    pub handler: Arc<CommandHandler>,
    pub transport: PeerTransport,
    pub workers: Arc<Semaphore>,
    pub max_frame_bytes: usize,
}

impl Connections {
    pub fn new(
        handler: Arc<CommandHandler>,
        transport: PeerTransport,
        workers: usize,
        max_frame_bytes: usize,
    ) -> Self {
        Self {
            handler,
            transport,
            workers: Arc::new(Semaphore::new(workers.max(1))),
            max_frame_bytes,
        }
    }

    /// Serve one peer until its stream ends, then take it offline.
    pub async fn serve_peer<R, W>(&self, peer: String, reader: R, writer: W)
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let rx = self.transport.register(&peer);
        let writer_task = tokio::spawn(write_loop(peer.clone(), writer, rx));
        tracing::info!(peer = %peer, "peer connected");

        let mut reader = BufReader::new(reader);
        loop {
            let frame = match read_frame(&mut reader, self.max_frame_bytes).await {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(peer = %peer, error = %e, "dropping connection");
                    break;
                }
            };
            let Ok(permit) = self.workers.clone().acquire_owned().await else {
                break;
            };
            let handler = self.handler.clone();
            let owner = peer.clone();
            let work = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                handler.received(&owner, &frame);
            });
            if let Err(e) = work.await {
                tracing::error!(peer = %peer, error = %e, "request worker panicked");
            }
        }

        self.transport.unregister(&peer);
        self.handler.peer_offline(&peer);
        if let Err(e) = writer_task.await {
            tracing::error!(peer = %peer, error = %e, "writer task failed");
        }
        tracing::info!(peer = %peer, "peer disconnected");
    }
}

pub struct PeerServer {
    listener: TcpListener,
    connections: Connections,
    shutdown: broadcast::Receiver<()>,
}

impl PeerServer {
    pub fn new(
        listener: TcpListener,
        connections: Connections,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            listener,
            connections,
            shutdown,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("peer server shutting down");
                    return Ok(());
                }

                accepted = self.listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(a) => a,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let connections = self.connections.clone();
                    tokio::spawn(async move {
                        let (reader, writer) = stream.into_split();
                        connections.serve_peer(addr.to_string(), reader, writer).await;
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feeds_core::rpc::{Params, Request};
    use feeds_core::{wire, Version};
    use feeds_services::{FeedsStore, ServiceContext, StaticTokenResolver};

    use crate::frame::write_frame;

    fn connections() -> Connections {
        let transport = PeerTransport::new();
        let mut ctx = ServiceContext::new(
            Arc::new(FeedsStore::in_memory().unwrap()),
            Arc::new(StaticTokenResolver::new("did:elastos:owner")),
            Arc::new(transport.clone()),
        );
        ctx.version_code = 77;
        Connections::new(Arc::new(CommandHandler::new(ctx)), transport, 2, 1 << 16)
    }

    #[tokio::test]
    async fn frames_in_replies_out_in_order() {
        let conns = connections();
        let (client, server) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server);
        let serve = {
            let conns = conns.clone();
            tokio::spawn(async move { conns.serve_peer("p".into(), server_read, server_write).await })
        };

        let (mut client_read, mut client_write) = tokio::io::split(client);
        for id in 1..=3u64 {
            let req = Request::new(Version::V2, id, Params::GetServiceVersion);
            write_frame(&mut client_write, &wire::encode_request(&req).unwrap())
                .await
                .unwrap();
        }
        for id in 1..=3u64 {
            let frame = read_frame(&mut client_read, 1 << 16).await.unwrap().unwrap();
            let view = wire::decode_view(&frame).unwrap();
            assert_eq!(view.id, Some(id));
            assert_eq!(view.result_field("version_code").and_then(|v| v.as_i64()), Some(77));
        }

        drop(client_write);
        drop(client_read);
        serve.await.unwrap();
        assert_eq!(conns.transport.connected(), 0);
    }

    #[tokio::test]
    async fn oversized_frame_drops_peer() {
        let conns = connections();
        let (client, server) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server);
        let serve = {
            let conns = conns.clone();
            tokio::spawn(async move { conns.serve_peer("big".into(), server_read, server_write).await })
        };
        let (_client_read, mut client_write) = tokio::io::split(client);
        write_frame(&mut client_write, &vec![0u8; 1 << 17]).await.unwrap_or(());
        serve.await.unwrap();
        assert_eq!(conns.transport.connected(), 0);
    }
}
