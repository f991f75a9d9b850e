//! Encoded frames and the producer→consumer handoff slot.
//!
//! ## Wire format
//!
//! Each data-plane message is one encoded unit:
//! ```text
//! timestamp: u64  (8, big-endian, capture-clock units)
//! payload:   [u8] (remaining bytes, one encoded frame/packet)
//! ```
//!
//! ## Handoff
//!
//! The encoder engine delivers samples on its own execution context;
//! the relay sends them from the network task. [`frame_slot`] bridges
//! the two with a depth-one, latest-wins slot: the producer never
//! blocks, and a frame that was not yet picked up is replaced by the
//! next one instead of queuing. Every frame crossing the slot is an
//! owned [`Bytes`] snapshot, so the producer is free to reuse its own
//! buffers after [`SampleSink::offer`] returns.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::Notify;

use crate::error::CastError;

// ── Frame ────────────────────────────────────────────────────────

/// One encoded video unit plus its capture timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Capture-clock timestamp, monotonically non-decreasing.
    pub pts: u64,
    /// The codec's native encoded unit.
    pub payload: Bytes,
}

impl Frame {
    /// Size of the timestamp prefix on the wire.
    pub const TIMESTAMP_SIZE: usize = 8;

    pub fn new(pts: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            pts,
            payload: payload.into(),
        }
    }

    /// Serialize to the data-plane wire format.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::TIMESTAMP_SIZE + self.payload.len());
        buf.put_u64(self.pts);
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }

    /// Deserialize from the data-plane wire format.
    pub fn decode(data: &[u8]) -> Result<Self, CastError> {
        if data.len() < Self::TIMESTAMP_SIZE {
            return Err(CastError::ProtocolViolation(
                "frame shorter than its timestamp prefix",
            ));
        }
        let pts = u64::from_be_bytes(data[..Self::TIMESTAMP_SIZE].try_into().unwrap());
        Ok(Self {
            pts,
            payload: Bytes::copy_from_slice(&data[Self::TIMESTAMP_SIZE..]),
        })
    }
}

// ── Frame slot ───────────────────────────────────────────────────

struct Slot {
    latest: Mutex<Option<Frame>>,
    notify: Notify,
    closed: AtomicBool,
}

/// Producer half of the handoff slot. Cloneable; the slot counts as
/// closed once every clone has been dropped.
#[derive(Clone)]
pub struct SampleSink {
    guard: Arc<SinkGuard>,
}

struct SinkGuard {
    slot: Arc<Slot>,
}

impl Drop for SinkGuard {
    fn drop(&mut self) {
        self.slot.closed.store(true, Ordering::SeqCst);
        self.slot.notify.notify_one();
    }
}

impl SampleSink {
    /// Offer a frame to the consumer without blocking.
    ///
    /// Returns `true` if a previously offered frame was still sitting
    /// in the slot and got replaced (i.e. one frame was dropped).
    pub fn offer(&self, frame: Frame) -> bool {
        let dropped = {
            let mut latest = self.guard.slot.latest.lock().unwrap();
            latest.replace(frame).is_some()
        };
        self.guard.slot.notify.notify_one();
        if dropped {
            tracing::trace!("frame slot full; replaced undelivered frame");
        }
        dropped
    }
}

/// Consumer half of the handoff slot. Single consumer by construction.
pub struct FrameSlot {
    slot: Arc<Slot>,
}

impl FrameSlot {
    /// Wait for the next frame.
    ///
    /// Returns `None` once every [`SampleSink`] has been dropped and
    /// the slot is empty.
    pub async fn recv(&mut self) -> Option<Frame> {
        loop {
            if let Some(frame) = self.slot.latest.lock().unwrap().take() {
                return Some(frame);
            }
            if self.slot.closed.load(Ordering::SeqCst) {
                return None;
            }
            self.slot.notify.notified().await;
        }
    }

    /// Take the pending frame, if any, without waiting.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.slot.latest.lock().unwrap().take()
    }
}

/// Create a connected producer/consumer pair.
pub fn frame_slot() -> (SampleSink, FrameSlot) {
    let slot = Arc::new(Slot {
        latest: Mutex::new(None),
        notify: Notify::new(),
        closed: AtomicBool::new(false),
    });
    let sink = SampleSink {
        guard: Arc::new(SinkGuard {
            slot: Arc::clone(&slot),
        }),
    };
    (sink, FrameSlot { slot })
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_roundtrip() {
        let frame = Frame::new(0x1122_3344_5566_7788, &b"ABC"[..]);
        let encoded = frame.encode();
        assert_eq!(&encoded[..8], &0x1122_3344_5566_7788u64.to_be_bytes());
        assert_eq!(&encoded[8..], b"ABC");

        let decoded = Frame::decode(&encoded).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn frame_roundtrip_empty_payload() {
        let frame = Frame::new(7, Bytes::new());
        let encoded = frame.encode();
        assert_eq!(encoded.len(), Frame::TIMESTAMP_SIZE);

        let decoded = Frame::decode(&encoded).unwrap();
        assert_eq!(decoded.pts, 7);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn frame_decode_too_short() {
        assert!(Frame::decode(&[0u8; 7]).is_err());
    }

    #[tokio::test]
    async fn slot_delivers_frames_in_order_when_drained() {
        let (sink, mut slot) = frame_slot();

        assert!(!sink.offer(Frame::new(1, &b"a"[..])));
        assert_eq!(slot.recv().await.unwrap().pts, 1);

        assert!(!sink.offer(Frame::new(2, &b"b"[..])));
        assert_eq!(slot.recv().await.unwrap().pts, 2);
    }

    #[tokio::test]
    async fn slot_keeps_only_the_newest_frame() {
        let (sink, mut slot) = frame_slot();

        assert!(!sink.offer(Frame::new(1, &b"old"[..])));
        assert!(sink.offer(Frame::new(2, &b"new"[..])));
        assert!(sink.offer(Frame::new(3, &b"newest"[..])));

        let got = slot.recv().await.unwrap();
        assert_eq!(got.pts, 3);
        assert!(slot.try_recv().is_none());
    }

    #[tokio::test]
    async fn slot_closes_when_all_sinks_dropped() {
        let (sink, mut slot) = frame_slot();
        let clone = sink.clone();

        sink.offer(Frame::new(1, &b"x"[..]));
        drop(sink);
        // One clone still alive: the pending frame is delivered and
        // the slot stays open.
        assert_eq!(slot.recv().await.unwrap().pts, 1);

        drop(clone);
        assert!(slot.recv().await.is_none());
    }

    #[tokio::test]
    async fn producer_never_blocks() {
        let (sink, _slot) = frame_slot();
        // No consumer draining; offers must still return immediately.
        for pts in 0..100 {
            sink.offer(Frame::new(pts, &b"payload"[..]));
        }
    }
}
