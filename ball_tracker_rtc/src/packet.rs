//! Frame packets as carried on the `frames` data channel: an 8-byte big-endian
//! presentation timestamp followed by the PNG-encoded picture.

use anyhow::Context;
use ball_tracker::{EncodedFrame, Frame, TimeBase};
use bytes::{Buf, BufMut, Bytes, BytesMut};

pub const PTS_HEADER_LEN: usize = 8;

pub fn encode_frame(frame: &Frame) -> anyhow::Result<Bytes> {
    let png = frame.encode_png().context("encoding frame as PNG")?;
    let mut packet = BytesMut::with_capacity(PTS_HEADER_LEN + png.len());
    packet.put_i64(frame.pts());
    packet.put_slice(&png);
    Ok(packet.freeze())
}

/// Splits off the timestamp and keeps the PNG compressed. Cheap enough for a
/// transport callback.
pub fn unpack_frame(packet: &[u8], time_base: TimeBase) -> anyhow::Result<EncodedFrame> {
    anyhow::ensure!(
        packet.len() > PTS_HEADER_LEN,
        "frame packet of {} bytes is too short",
        packet.len()
    );
    let (mut header, png) = packet.split_at(PTS_HEADER_LEN);
    Ok(EncodedFrame::new(png.to_vec(), header.get_i64(), time_base))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ball_tracker::{FrameSource, PhysicsSimulator, TrackerConfig};

    #[test]
    fn packets_carry_timestamp_and_pixels() {
        let config = TrackerConfig::default();
        let mut source = FrameSource::new(PhysicsSimulator::new(config.initial_ball).into_shared(), &config);
        source.next_frame();
        let frame = source.next_frame();

        let packet = encode_frame(&frame).unwrap();
        assert_eq!(&packet[..PTS_HEADER_LEN], &3000i64.to_be_bytes());

        let decoded = unpack_frame(&packet, frame.time_base()).unwrap().decode().unwrap();
        assert_eq!(decoded.pts(), 3000);
        assert_eq!(decoded.image(), frame.image());
    }

    #[test]
    fn truncated_or_garbled_packets_are_rejected() {
        let tb = TimeBase::per_second(90_000);
        assert!(unpack_frame(&[0u8; 4], tb).is_err());
        assert!(unpack_frame(&[0u8; 32], tb).unwrap().decode().is_err());
    }

    #[test]
    fn unpacking_reads_the_header_and_defers_the_png() {
        let tb = TimeBase::per_second(90_000);
        let mut packet = 6000i64.to_be_bytes().to_vec();
        packet.extend_from_slice(b"not a png");
        let encoded = unpack_frame(&packet, tb).unwrap();
        assert_eq!(encoded.pts(), 6000);
        assert!(encoded.decode().is_err());
    }
}
