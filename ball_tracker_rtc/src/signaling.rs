//! Session-description exchange over a plain TCP socket.
//!
//! One JSON object per line: `{"type":"offer","sdp":...}`,
//! `{"type":"answer","sdp":...}` or `{"type":"bye"}`. The server listens and
//! sends the offer; the client dials in and answers. Descriptions are sent only
//! after ICE gathering completes, so there is no trickle.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SignalMessage {
    #[serde(rename = "offer")]
    Offer { sdp: String },
    #[serde(rename = "answer")]
    Answer { sdp: String },
    #[serde(rename = "bye")]
    Bye,
}

pub struct SignalingListener {
    listener: TcpListener,
}

impl SignalingListener {
    pub async fn bind(addr: &str) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding signaling socket on {addr}"))?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Waits for the one peer of this session.
    pub async fn accept(self) -> anyhow::Result<Signaling> {
        let (stream, peer) = self.listener.accept().await.context("accepting signaling peer")?;
        info!(%peer, "signaling peer connected");
        Ok(Signaling::from_stream(stream))
    }
}

pub struct Signaling {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Signaling {
    pub async fn connect(addr: &str) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("connecting to signaling server at {addr}"))?;
        info!(%addr, "connected to signaling server");
        Ok(Self::from_stream(stream))
    }

    fn from_stream(stream: TcpStream) -> Self {
        let (read, write) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer: write,
        }
    }

    pub async fn send(&mut self, message: &SignalMessage) -> anyhow::Result<()> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        debug!(kind = kind(message), "signal sent");
        Ok(())
    }

    /// Next message, or `None` once the peer hangs up. Blank lines are skipped.
    pub async fn receive(&mut self) -> anyhow::Result<Option<SignalMessage>> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line).await? == 0 {
                return Ok(None);
            }
            if line.trim().is_empty() {
                continue;
            }
            let message: SignalMessage =
                serde_json::from_str(line.trim()).context("malformed signaling message")?;
            debug!(kind = kind(&message), "signal received");
            return Ok(Some(message));
        }
    }

    /// Says goodbye and closes the socket. Best effort.
    pub async fn close(mut self) {
        let _ = self.send(&SignalMessage::Bye).await;
        let _ = self.writer.shutdown().await;
    }
}

fn kind(message: &SignalMessage) -> &'static str {
    match message {
        SignalMessage::Offer { .. } => "offer",
        SignalMessage::Answer { .. } => "answer",
        SignalMessage::Bye => "bye",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape() {
        let offer = SignalMessage::Offer { sdp: "v=0".into() };
        assert_eq!(serde_json::to_string(&offer).unwrap(), r#"{"type":"offer","sdp":"v=0"}"#);
        assert_eq!(serde_json::to_string(&SignalMessage::Bye).unwrap(), r#"{"type":"bye"}"#);
    }

    #[tokio::test]
    async fn offer_answer_over_loopback() {
        let listener = SignalingListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let mut sig = listener.accept().await.unwrap();
            sig.send(&SignalMessage::Offer { sdp: "offer-sdp".into() }).await.unwrap();
            let answer = sig.receive().await.unwrap();
            sig.close().await;
            answer
        });

        let mut client = Signaling::connect(&addr).await.unwrap();
        assert_eq!(
            client.receive().await.unwrap(),
            Some(SignalMessage::Offer { sdp: "offer-sdp".into() })
        );
        client
            .send(&SignalMessage::Answer { sdp: "answer-sdp".into() })
            .await
            .unwrap();

        assert_eq!(
            server.await.unwrap(),
            Some(SignalMessage::Answer { sdp: "answer-sdp".into() })
        );
        assert_eq!(client.receive().await.unwrap(), Some(SignalMessage::Bye));
        assert_eq!(client.receive().await.unwrap(), None);
    }
}
