//! SMP request/response exchange over an already connected UDP socket

use anyhow::Result;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, trace};

/// Length of an SMP header on the wire
pub const HEADER_LEN: usize = 8;

/// SMP v2 frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmpHeader {
    pub op: u8,
    pub flags: u8,
    /// Body length in bytes
    pub len: u16,
    pub group: u16,
    pub seq: u8,
    pub id: u8,
}

impl SmpHeader {
    /// Protocol version bits for SMP v2
    const VERSION: u8 = 1;

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let len = self.len.to_be_bytes();
        let group = self.group.to_be_bytes();
        [
            (Self::VERSION << 3) | (self.op & 0x07),
            self.flags,
            len[0],
            len[1],
            group[0],
            group[1],
            self.seq,
            self.id,
        ]
    }

    pub fn decode(data: &[u8]) -> Option<Self> {
        let raw: &[u8; HEADER_LEN] = data.get(..HEADER_LEN)?.try_into().ok()?;
        Some(Self {
            op: raw[0] & 0x07,
            flags: raw[1],
            len: u16::from_be_bytes([raw[2], raw[3]]),
            group: u16::from_be_bytes([raw[4], raw[5]]),
            seq: raw[6],
            id: raw[7],
        })
    }
}

/// SMP client borrowing a socket the discovery engine has connected
pub struct SmpTransport<'a> {
    socket: &'a UdpSocket,
    timeout: Duration,
    mtu: usize,
    seq: u8,
}

impl<'a> SmpTransport<'a> {
    pub fn new(socket: &'a UdpSocket, timeout: Duration) -> Self {
        Self {
            socket,
            timeout,
            mtu: 1024,
            seq: 0,
        }
    }

    fn next_seq(&mut self) -> u8 {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        seq
    }

    /// Send one request and wait for the matching response body
    pub async fn transceive(&mut self, op: u8, group: u16, id: u8, body: &[u8]) -> Result<Vec<u8>> {
        let seq = self.next_seq();
        let header = SmpHeader {
            op,
            flags: 0,
            len: u16::try_from(body.len())?,
            group,
            seq,
            id,
        };

        let mut packet = Vec::with_capacity(HEADER_LEN + body.len());
        packet.extend_from_slice(&header.encode());
        packet.extend_from_slice(body);

        trace!(op, group, id, seq, body_len = body.len(), "Sending SMP request");
        self.socket.send(&packet).await?;

        let mut buf = vec![0u8; self.mtu];
        let len = timeout(self.timeout, self.socket.recv(&mut buf)).await??;

        let rsp = SmpHeader::decode(&buf[..len])
            .ok_or_else(|| anyhow::anyhow!("Response too short: {} bytes", len))?;
        debug!(
            op = rsp.op,
            group = rsp.group,
            id = rsp.id,
            seq = rsp.seq,
            body_len = rsp.len,
            "Received SMP response"
        );

        if rsp.seq != seq {
            anyhow::bail!("Sequence mismatch: expected {}, got {}", seq, rsp.seq);
        }

        let body_end = HEADER_LEN + rsp.len as usize;
        if body_end > len {
            anyhow::bail!(
                "Response body truncated: expected {} bytes, got {}",
                rsp.len,
                len - HEADER_LEN
            );
        }

        Ok(buf[HEADER_LEN..body_end].to_vec())
    }

    /// Echo test; false when nothing (or something else) answers
    pub async fn ping(&mut self) -> Result<bool> {
        let body = serde_cbor::to_vec(&EchoReq { d: "ping" })?;

        match self.transceive(2, 0, 0, &body).await {
            Ok(rsp_body) => {
                let rsp: EchoRsp = serde_cbor::from_slice(&rsp_body)?;
                Ok(rsp.r == "ping")
            }
            Err(e) => {
                trace!(error = %e, "Echo got no answer");
                Ok(false)
            }
        }
    }
}

#[derive(serde::Serialize)]
struct EchoReq<'a> {
    d: &'a str,
}

#[derive(serde::Deserialize)]
struct EchoRsp {
    r: String,
}
