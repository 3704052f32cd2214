//! Framed transports over byte streams: baton's own stdio, or a spawned executor.

use anyhow::{Context, Result};
use async_trait::async_trait;
use baton_common::{DelegationEnvelope, DelegationReply, WireMessage};
use std::io::{self, Read};
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use super::DelegationTransport;
use super::codec::{Frame, encode, read_frame};
use crate::errors::DelegationError;

/// Frames buffered between the reader task and `exchange`.
const FRAME_BUFFER: usize = 32;

/// Encoded requests queued for the writer task.
const REQUEST_BUFFER: usize = 4;

/// Bytes read from baton's stdin per blocking read.
const STDIN_CHUNK: usize = 8 * 1024;

/// Request/reply over any pair of async streams.
///
/// Background tasks own both halves. The reader forwards decoded frames over a
/// channel, so a timed-out wait never leaves the stream mid-frame. The writer
/// drains queued requests one whole frame at a time, so a peer that stops
/// reading stalls the queue, not `exchange`, and a request abandoned at its
/// deadline is still written out in full before the next one.
pub struct StreamTransport {
    requests: mpsc::Sender<Vec<u8>>,
    frames: mpsc::Receiver<io::Result<Frame>>,
    label: &'static str,
}

impl StreamTransport {
    /// Must be called inside a tokio runtime.
    pub fn new<R, W>(reader: R, writer: W, label: &'static str) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, frames) = mpsc::channel(FRAME_BUFFER);
        tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            loop {
                match read_frame(&mut reader).await {
                    Ok(Some(frame)) => {
                        if tx.send(Ok(frame)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        break;
                    }
                }
            }
        });

        let (requests, mut queued) = mpsc::channel::<Vec<u8>>(REQUEST_BUFFER);
        tokio::spawn(async move {
            let mut writer = writer;
            while let Some(frame) = queued.recv().await {
                let written = async {
                    writer.write_all(&frame).await?;
                    writer.flush().await
                };
                if let Err(e) = written.await {
                    warn!(transport = label, error = %e, "request stream closed");
                    break;
                }
            }
        });

        Self {
            requests,
            frames,
            label,
        }
    }

    fn closed(&self, what: &str) -> DelegationError {
        DelegationError::Closed(format!("{} {}", self.label, what))
    }

    fn accept(&self, envelope: &DelegationEnvelope, frame: Frame) -> Option<DelegationReply> {
        match frame {
            Frame::Message(WireMessage::Reply(reply))
                if reply.correlation_id == envelope.correlation_id =>
            {
                if reply.is_well_formed() {
                    Some(reply)
                } else {
                    warn!(
                        transport = self.label,
                        correlation_id = %reply.correlation_id,
                        "discarding reply that carries neither or both of payload and error"
                    );
                    None
                }
            }
            Frame::Message(WireMessage::Reply(reply)) => {
                warn!(
                    transport = self.label,
                    expected = %envelope.correlation_id,
                    received = %reply.correlation_id,
                    "discarding reply with mismatched correlation id"
                );
                None
            }
            Frame::Message(WireMessage::Request(request)) => {
                warn!(
                    transport = self.label,
                    correlation_id = %request.correlation_id,
                    "discarding unexpected request frame from executor"
                );
                None
            }
            Frame::Malformed(reason) => {
                warn!(transport = self.label, %reason, "discarding malformed frame");
                None
            }
        }
    }
}

#[async_trait]
impl DelegationTransport for StreamTransport {
    async fn exchange(
        &mut self,
        envelope: &DelegationEnvelope,
    ) -> Result<DelegationReply, DelegationError> {
        let deadline = Instant::now() + envelope.timeout();
        let frame = encode(&WireMessage::Request(envelope.clone()))
            .map_err(|e| DelegationError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        match timeout_at(deadline, self.requests.send(frame)).await {
            Err(_) => {
                return Err(DelegationError::Timeout {
                    correlation_id: envelope.correlation_id.clone(),
                    timeout_ms: envelope.timeout_ms,
                });
            }
            Ok(Err(_)) => return Err(self.closed("request stream is closed")),
            Ok(Ok(())) => {}
        }
        debug!(
            transport = self.label,
            correlation_id = %envelope.correlation_id,
            "request queued"
        );

        loop {
            let frame = match timeout_at(deadline, self.frames.recv()).await {
                Err(_) => {
                    return Err(DelegationError::Timeout {
                        correlation_id: envelope.correlation_id.clone(),
                        timeout_ms: envelope.timeout_ms,
                    });
                }
                Ok(None) => return Err(self.closed("stream ended before a reply arrived")),
                Ok(Some(Err(e))) => return Err(DelegationError::Io(e)),
                Ok(Some(Ok(frame))) => frame,
            };
            if let Some(reply) = self.accept(envelope, frame) {
                return Ok(reply);
            }
        }
    }

    fn name(&self) -> &'static str {
        self.label
    }
}

/// Frames over baton's own stdin/stdout, for an operator or wrapper script.
///
/// Stdin is read on a detached OS thread: a blocking read cannot be cancelled,
/// and parking it on the runtime's blocking pool would hold up shutdown until
/// the operator sent more input. Must be called inside a tokio runtime.
pub fn stdio_transport() -> Result<StreamTransport> {
    let (chunks, mut incoming) = mpsc::channel::<Vec<u8>>(FRAME_BUFFER);
    std::thread::Builder::new()
        .name("baton-stdin".to_string())
        .spawn(move || forward_stdin(chunks))
        .context("Failed to start the stdin reader thread")?;

    let (reader, mut pipe) = tokio::io::duplex(STDIN_CHUNK * 4);
    tokio::spawn(async move {
        while let Some(chunk) = incoming.recv().await {
            if pipe.write_all(&chunk).await.is_err() {
                break;
            }
        }
    });
    Ok(StreamTransport::new(reader, tokio::io::stdout(), "interactive"))
}

fn forward_stdin(chunks: mpsc::Sender<Vec<u8>>) {
    let mut stdin = io::stdin().lock();
    let mut buf = vec![0u8; STDIN_CHUNK];
    loop {
        match stdin.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if chunks.blocking_send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                warn!(error = %e, "stdin read failed");
                break;
            }
        }
    }
}

/// Frames over the stdin/stdout of a spawned executor process.
pub struct ProcessTransport {
    inner: StreamTransport,
    child: Child,
}

impl ProcessTransport {
    pub fn spawn(command: &str, args: &[String]) -> Result<Self> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn executor '{}'", command))?;

        let stdin: ChildStdin = child.stdin.take().context("Failed to get executor stdin")?;
        let stdout: ChildStdout = child
            .stdout
            .take()
            .context("Failed to get executor stdout")?;
        info!(command, pid = ?child.id(), "executor process started");

        Ok(Self {
            inner: StreamTransport::new(stdout, stdin, "process"),
            child,
        })
    }
}

#[async_trait]
impl DelegationTransport for ProcessTransport {
    async fn exchange(
        &mut self,
        envelope: &DelegationEnvelope,
    ) -> Result<DelegationReply, DelegationError> {
        let result = self.inner.exchange(envelope).await;
        if let Err(DelegationError::Closed(_)) = &result
            && let Ok(Some(status)) = self.child.try_wait()
        {
            return Err(DelegationError::Closed(format!(
                "executor exited with {}",
                status
            )));
        }
        result
    }

    fn name(&self) -> &'static str {
        "process"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use baton_common::SchemaId;
    use std::time::Duration;
    use serde_json::json;
    use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf, duplex, split};

    struct Executor {
        reader: BufReader<ReadHalf<DuplexStream>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl Executor {
        async fn next_request(&mut self) -> DelegationEnvelope {
            match read_frame(&mut self.reader).await.unwrap() {
                Some(Frame::Message(WireMessage::Request(env))) => env,
                other => panic!("Expected request, got {other:?}"),
            }
        }

        async fn send(&mut self, message: WireMessage) {
            self.writer.write_all(&encode(&message).unwrap()).await.unwrap();
        }

        async fn send_raw(&mut self, bytes: &[u8]) {
            self.writer.write_all(bytes).await.unwrap();
        }
    }

    fn pair() -> (StreamTransport, Executor) {
        let (ours, theirs) = duplex(64 * 1024);
        let (our_read, our_write) = split(ours);
        let (their_read, their_write) = split(theirs);
        (
            StreamTransport::new(our_read, our_write, "test"),
            Executor {
                reader: BufReader::new(their_read),
                writer: their_write,
            },
        )
    }

    fn envelope(timeout_ms: u64) -> DelegationEnvelope {
        DelegationEnvelope::new(json!({"task": "research"}), SchemaId::v1("research"), timeout_ms)
    }

    #[tokio::test]
    async fn matching_reply_is_returned() {
        let (mut transport, mut executor) = pair();
        let env = envelope(5_000);

        let exec = tokio::spawn(async move {
            let request = executor.next_request().await;
            executor
                .send(WireMessage::Reply(DelegationReply::success(
                    request.correlation_id,
                    json!({"findings": []}),
                )))
                .await;
            executor
        });

        let reply = transport.exchange(&env).await.unwrap();
        assert_eq!(reply.correlation_id, env.correlation_id);
        assert_eq!(reply.payload, Some(json!({"findings": []})));
        exec.await.unwrap();
    }

    #[tokio::test]
    async fn mismatched_and_malformed_replies_are_skipped() {
        let (mut transport, mut executor) = pair();
        let env = envelope(5_000);

        let exec = tokio::spawn(async move {
            let request = executor.next_request().await;
            executor
                .send(WireMessage::Reply(DelegationReply::success(
                    "someone-else",
                    json!({"stale": true}),
                )))
                .await;
            executor.send_raw(b"Content-Length: 3\r\n\r\n{{{").await;
            executor
                .send(WireMessage::Reply(DelegationReply {
                    correlation_id: request.correlation_id.clone(),
                    payload: None,
                    error: None,
                    handoff: None,
                }))
                .await;
            executor
                .send(WireMessage::Reply(DelegationReply::success(
                    request.correlation_id,
                    json!({"fresh": true}),
                )))
                .await;
            executor
        });

        let reply = transport.exchange(&env).await.unwrap();
        assert_eq!(reply.payload, Some(json!({"fresh": true})));
        exec.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn silence_times_out() {
        let (mut transport, _executor) = pair();
        let env = envelope(1_000);
        let err = transport.exchange(&env).await.unwrap_err();
        match err {
            DelegationError::Timeout {
                correlation_id,
                timeout_ms,
            } => {
                assert_eq!(correlation_id, env.correlation_id);
                assert_eq!(timeout_ms, 1_000);
            }
            other => panic!("Expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn late_reply_to_previous_attempt_is_discarded() {
        let (mut transport, mut executor) = pair();
        let first = envelope(1_000);

        let exec = tokio::spawn(async move {
            let stale = executor.next_request().await;
            let retry = executor.next_request().await;
            // The answer to the first attempt shows up after it timed out.
            executor
                .send(WireMessage::Reply(DelegationReply::success(
                    stale.correlation_id,
                    json!({"late": true}),
                )))
                .await;
            executor
                .send(WireMessage::Reply(DelegationReply::success(
                    retry.correlation_id,
                    json!({"late": false}),
                )))
                .await;
            executor
        });

        assert!(transport.exchange(&first).await.unwrap_err().is_timeout());
        let second = first.reissue();
        let reply = transport.exchange(&second).await.unwrap();
        assert_eq!(reply.correlation_id, second.correlation_id);
        assert_eq!(reply.payload, Some(json!({"late": false})));
        exec.await.unwrap();
    }

    fn bulky_envelope(timeout_ms: u64) -> DelegationEnvelope {
        DelegationEnvelope::new(
            json!({"task": "x".repeat(4096)}),
            SchemaId::v1("research"),
            timeout_ms,
        )
    }

    #[tokio::test]
    async fn peer_that_stops_reading_still_times_out() {
        let (ours, _theirs) = duplex(64);
        let (our_read, our_write) = split(ours);
        let mut transport = StreamTransport::new(our_read, our_write, "test");
        let env = bulky_envelope(200);

        let result = tokio::time::timeout(Duration::from_secs(3), transport.exchange(&env))
            .await
            .expect("exchange must honour its deadline while the write is stalled");
        assert!(matches!(
            result,
            Err(DelegationError::Timeout { timeout_ms: 200, .. })
        ));
    }

    #[tokio::test]
    async fn request_abandoned_mid_write_does_not_corrupt_the_next() {
        let (ours, theirs) = duplex(64);
        let (our_read, our_write) = split(ours);
        let (their_read, their_write) = split(theirs);
        let mut transport = StreamTransport::new(our_read, our_write, "test");
        let first = bulky_envelope(200);

        let stalled = tokio::time::timeout(Duration::from_secs(3), transport.exchange(&first))
            .await
            .unwrap();
        assert!(stalled.unwrap_err().is_timeout());

        let mut executor = Executor {
            reader: BufReader::new(their_read),
            writer: their_write,
        };
        let exec = tokio::spawn(async move {
            let stale = executor.next_request().await;
            let retry = executor.next_request().await;
            executor
                .send(WireMessage::Reply(DelegationReply::success(
                    retry.correlation_id.clone(),
                    json!({"ok": true}),
                )))
                .await;
            (stale, retry)
        });

        let second = first.reissue();
        let reply = transport.exchange(&second).await.unwrap();
        assert_eq!(reply.correlation_id, second.correlation_id);

        let (stale, retry) = exec.await.unwrap();
        assert_eq!(stale, first);
        assert_eq!(retry.correlation_id, second.correlation_id);
    }

    #[tokio::test]
    async fn undecodable_header_is_skipped_and_the_reply_still_arrives() {
        let (mut transport, mut executor) = pair();
        let env = envelope(5_000);

        let exec = tokio::spawn(async move {
            let request = executor.next_request().await;
            executor.send_raw(b"\xff\xfe garbage\r\n").await;
            executor
                .send(WireMessage::Reply(DelegationReply::success(
                    request.correlation_id,
                    json!({"findings": []}),
                )))
                .await;
            executor
        });

        let reply = transport.exchange(&env).await.unwrap();
        assert_eq!(reply.payload, Some(json!({"findings": []})));
        let _executor = exec.await.unwrap();

        // The reader is still alive for the next exchange.
        let err = transport.exchange(&envelope(50)).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn closed_stream_is_reported() {
        let (mut transport, executor) = pair();
        drop(executor);
        let err = transport.exchange(&envelope(5_000)).await.unwrap_err();
        assert!(matches!(
            err,
            DelegationError::Closed(_) | DelegationError::Io(_)
        ));
    }
}
