//! Gateway record layouts
//!
//! Each CAN frame crosses the USB link as one 16-byte record. Two
//! incompatible layouts exist across gateway hardware generations; which
//! one the connected device speaks is fixed at open time and nothing
//! branches on it per tick beyond the encode call.
//!
//! Decoding is the exact inverse of encoding and backs the listen path.

use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use crate::frame::{CanFrame, FrameBatch, MAX_FRAME_DATA};

/// Size of one encoded frame record
pub const BYTES_PER_FRAME: usize = 16;

/// Record layout generation of the connected gateway
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WireFormat {
    /// First-generation layout: identifier split across two bytes, metadata
    /// in byte 7
    #[default]
    V1,
    /// Second-generation layout: two packed little-endian words
    V2,
}

impl WireFormat {
    /// Encodes a whole batch into one contiguous transfer buffer
    pub fn encode_batch(self, batch: &FrameBatch) -> Vec<u8> {
        let mut buffer = vec![0u8; batch.len() * BYTES_PER_FRAME];
        for (frame, record) in batch.iter().zip(buffer.chunks_exact_mut(BYTES_PER_FRAME)) {
            self.encode_frame(frame, record);
        }
        buffer
    }

    /// Encodes one frame into a [`BYTES_PER_FRAME`] record
    pub fn encode_frame(self, frame: &CanFrame, record: &mut [u8]) {
        debug_assert_eq!(record.len(), BYTES_PER_FRAME);
        record.fill(0);

        match self {
            WireFormat::V1 => {
                record[0] = (frame.id >> 3) as u8;
                record[1] = (frame.id << 5) as u8;
                record[3] = 1;
                record[7] = frame.len | (frame.bus << 4);
            }
            WireFormat::V2 => {
                LittleEndian::write_u32(&mut record[0..4], ((frame.id as u32) << 21) | 1);
                LittleEndian::write_u32(
                    &mut record[4..8],
                    frame.len as u32 | ((frame.bus as u32) << 4),
                );
            }
        }
        record[8..8 + frame.len as usize].copy_from_slice(frame.payload());
    }

    /// Decodes one [`BYTES_PER_FRAME`] record
    pub fn decode_frame(self, record: &[u8]) -> CanFrame {
        debug_assert_eq!(record.len(), BYTES_PER_FRAME);

        let (id, len, bus) = match self {
            WireFormat::V1 => {
                let id = ((record[0] as u16) << 3) | ((record[1] as u16) >> 5);
                (id, record[7] & 0x0F, record[7] >> 4)
            }
            WireFormat::V2 => {
                let id = (LittleEndian::read_u32(&record[0..4]) >> 21) as u16;
                let meta = LittleEndian::read_u32(&record[4..8]);
                (id, (meta & 0x0F) as u8, (meta >> 4) as u8)
            }
        };
        let len = (len as usize).min(MAX_FRAME_DATA);
        CanFrame::new(id, &record[8..8 + len], bus)
    }

    /// Decodes a received buffer into frames
    ///
    /// A trailing partial record is discarded; the hardware occasionally
    /// truncates the final record of a read.
    pub fn decode_frames(self, buffer: &[u8]) -> Vec<CanFrame> {
        let chunks = buffer.chunks_exact(BYTES_PER_FRAME);
        let trailing = chunks.remainder().len();
        if trailing != 0 {
            debug!("Discarding {trailing} trailing bytes of a partial record");
        }

        let mut frames = Vec::with_capacity(buffer.len() / BYTES_PER_FRAME);
        for record in chunks {
            frames.push(self.decode_frame(record));
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rav4;

    #[test]
    fn test_v1_steer_record_layout() {
        let frame = rav4::steer_command(0, 0);
        let mut record = [0xAAu8; BYTES_PER_FRAME];
        WireFormat::V1.encode_frame(&frame, &mut record);
        assert_eq!(
            record,
            [0x5C, 0x80, 0x00, 0x01, 0x00, 0x00, 0x00, 0x05, 0x80, 0x00, 0x00, 0x00, 0x6B, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_v1_packs_bus_and_length_into_byte_7() {
        let frame = CanFrame::new(0x340, &[0x00, 0x03, 0xFF, 0, 0, 0, 0, 0x4D], 1);
        let mut record = [0u8; BYTES_PER_FRAME];
        WireFormat::V1.encode_frame(&frame, &mut record);
        assert_eq!(record[0], 0x68);
        assert_eq!(record[1], 0x00);
        assert_eq!(record[7], 0x18);
    }

    #[test]
    fn test_v2_record_layout() {
        let frame = rav4::steer_command(0, 0);
        let mut record = [0u8; BYTES_PER_FRAME];
        WireFormat::V2.encode_frame(&frame, &mut record);
        // (0x2E4 << 21) | 1 and 5 | (0 << 4), both little-endian
        assert_eq!(&record[0..4], &[0x01, 0x00, 0x80, 0x5C]);
        assert_eq!(&record[4..8], &[0x05, 0x00, 0x00, 0x00]);
        assert_eq!(&record[8..13], frame.payload());
    }

    #[test]
    fn test_short_frames_are_zero_padded() {
        let frame = CanFrame::new(0x466, &[0x20, 0x20, 0xAD], 1);
        let mut record = [0xFFu8; BYTES_PER_FRAME];
        WireFormat::V1.encode_frame(&frame, &mut record);
        assert_eq!(&record[8..16], &[0x20, 0x20, 0xAD, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_round_trip_both_formats() {
        let mut batch = FrameBatch::new();
        batch.push(rav4::steer_command(7, -450));
        batch.push(CanFrame::new(0x466, &[0x20, 0x20, 0xAD], 1));
        batch.push(CanFrame::new(0x128, &[0xF4, 0x01, 0x90, 0x83, 0x00, 0x37], 1));

        for format in [WireFormat::V1, WireFormat::V2] {
            let buffer = format.encode_batch(&batch);
            assert_eq!(buffer.len(), 3 * BYTES_PER_FRAME);

            let decoded = format.decode_frames(&buffer);
            assert_eq!(decoded.len(), batch.len());
            for (sent, received) in batch.iter().zip(&decoded) {
                assert_eq!(sent.id, received.id);
                assert_eq!(sent.bus, received.bus);
                assert_eq!(sent.len, received.len);
                assert_eq!(sent.payload(), received.payload());
            }
        }
    }

    #[test]
    fn test_partial_trailing_record_is_discarded() {
        let mut batch = FrameBatch::new();
        batch.push(CanFrame::new(0x466, &[0x20, 0x20, 0xAD], 1));
        let mut buffer = WireFormat::V1.encode_batch(&batch);
        buffer.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);

        let decoded = WireFormat::V1.decode_frames(&buffer);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].id, 0x466);
    }

    #[test]
    fn test_empty_buffer_decodes_to_nothing() {
        assert!(WireFormat::V2.decode_frames(&[]).is_empty());
    }
}
