// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control socket listener.
//!
//! Connections are handled on their own tasks, but every request is
//! funnelled through a channel into the supervisor loop: the single-writer
//! discipline of the registry is preserved no matter how many clients talk
//! at once.

use crate::protocol::{Request, Response};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

pub type RequestSender = mpsc::Sender<(Request, oneshot::Sender<Response>)>;
pub type RequestReceiver = mpsc::Receiver<(Request, oneshot::Sender<Response>)>;

pub fn channel() -> (RequestSender, RequestReceiver) {
    mpsc::channel(16)
}

/// Accept loop; runs until the listener is dropped with the runtime.
pub async fn serve(listener: UnixListener, tx: RequestSender) {
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let tx = tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle(stream, tx).await {
                        debug!(%e, "control connection failed");
                    }
                });
            }
            Err(e) => {
                warn!(%e, "control accept failed");
                return;
            }
        }
    }
}

async fn handle(stream: UnixStream, tx: RequestSender) -> std::io::Result<()> {
    let mut stream = BufReader::new(stream);
    let mut line = String::new();
    stream.read_line(&mut line).await?;

    let response = match Request::parse(line.trim()) {
        Ok(request) => {
            let (resp_tx, resp_rx) = oneshot::channel();
            if tx.send((request, resp_tx)).await.is_err() {
                Response::Error("supervisor is shutting down".to_string())
            } else {
                resp_rx.await.unwrap_or_else(|_| {
                    Response::Error("supervisor dropped the request".to_string())
                })
            }
        }
        Err(e) => Response::Error(e.to_string()),
    };

    let mut out = response.to_string();
    out.push('\n');
    stream.get_mut().write_all(out.as_bytes()).await
}
