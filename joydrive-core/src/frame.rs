//! CAN frame primitives shared by every other module
//!
//! Frames here are always classic CAN with 11-bit identifiers, addressed to
//! one of the gateway's physical buses. Checksummed frame families keep their
//! checksum in the last significant payload byte.

use std::fmt;

/// Maximum payload size of a classic CAN frame
pub const MAX_FRAME_DATA: usize = 8;

/// Upper bound on the number of frames a single tick may emit
///
/// The gateway takes the whole batch as one bulk transfer. With every family
/// due on the same tick the tables top out below 50 frames, so the bound is
/// generous.
pub const MAX_BATCH_FRAMES: usize = 256;

/// A single classic CAN frame
///
/// `len` counts the significant payload bytes; bytes at index >= `len` are
/// don't-care and always transmitted as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    /// 11-bit message identifier (0..=0x7FF)
    pub id: u16,
    /// Payload bytes; only the first `len` are significant
    pub data: [u8; MAX_FRAME_DATA],
    /// Which physical bus the gateway transmits on
    pub bus: u8,
    /// Number of significant payload bytes (0..=8)
    pub len: u8,
}

impl CanFrame {
    /// Builds a frame from a payload slice, zero-padding to 8 bytes
    ///
    /// # Panics
    ///
    /// Panics if `payload` is longer than [`MAX_FRAME_DATA`].
    pub fn new(id: u16, payload: &[u8], bus: u8) -> Self {
        assert!(payload.len() <= MAX_FRAME_DATA, "payload exceeds 8 bytes");
        let mut data = [0u8; MAX_FRAME_DATA];
        data[..payload.len()].copy_from_slice(payload);
        CanFrame {
            id,
            data,
            bus,
            len: payload.len() as u8,
        }
    }

    /// The significant payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// Computes the additive checksum and stores it in the last significant
    /// payload byte
    ///
    /// The sum covers the identifier high byte, the identifier low byte, the
    /// declared length and every payload byte before the checksum slot; only
    /// the low 8 bits are kept. Pure in its inputs: the checksum slot itself
    /// never feeds the sum, so repeated calls are stable.
    ///
    /// Only meaningful for frames with `len >= 1`; the checksummed families
    /// all have at least one payload byte.
    pub fn apply_checksum(&mut self) -> u8 {
        debug_assert!(self.len >= 1, "zero-length frame has no checksum slot");
        let mut sum = (self.id >> 8) + (self.id & 0xFF) + self.len as u16;
        for byte in &self.data[..self.len as usize - 1] {
            sum += *byte as u16;
        }
        let checksum = sum as u8;
        self.data[self.len as usize - 1] = checksum;
        checksum
    }
}

impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bus: {}  ID: 0x{:03X}  Length: {}  Data:",
            self.bus, self.id, self.len
        )?;
        for byte in self.payload() {
            write!(f, " {byte:02X}")?;
        }
        Ok(())
    }
}

/// An ordered batch of frames built fresh each tick
///
/// Insertion order is preserved into the wire encoding but carries no meaning
/// across ticks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameBatch {
    frames: Vec<CanFrame>,
}

impl FrameBatch {
    /// An empty batch with room for the largest tick
    pub fn new() -> Self {
        FrameBatch {
            frames: Vec::with_capacity(MAX_BATCH_FRAMES),
        }
    }

    /// Appends a frame, keeping insertion order
    pub fn push(&mut self, frame: CanFrame) {
        debug_assert!(self.frames.len() < MAX_BATCH_FRAMES);
        self.frames.push(frame);
    }

    /// Number of frames in the batch
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True if no frame was scheduled this tick
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// The frames in insertion order
    pub fn frames(&self) -> &[CanFrame] {
        &self.frames
    }

    /// Iterates the frames in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, CanFrame> {
        self.frames.iter()
    }
}

impl<'a> IntoIterator for &'a FrameBatch {
    type Item = &'a CanFrame;
    type IntoIter = std::slice::Iter<'a, CanFrame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}

/// Line-per-frame diagnostic dump, for debugging only
impl fmt::Display for FrameBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for frame in &self.frames {
            writeln!(f, "{frame}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_zero_pads_payload() {
        let frame = CanFrame::new(0x367, &[0x06, 0x00], 0);
        assert_eq!(frame.len, 2);
        assert_eq!(frame.data, [0x06, 0x00, 0, 0, 0, 0, 0, 0]);
        assert_eq!(frame.payload(), &[0x06, 0x00]);
    }

    #[test]
    #[should_panic(expected = "payload exceeds 8 bytes")]
    fn test_new_rejects_long_payload() {
        CanFrame::new(0x100, &[0; 9], 0);
    }

    #[test]
    fn test_checksum_known_values() {
        // Steering command layout: 0x02 + 0xE4 + 5 + 0x80 = 0x16B
        let mut frame = CanFrame::new(0x2E4, &[0x80, 0x00, 0x00, 0x00, 0x00], 0);
        assert_eq!(frame.apply_checksum(), 0x6B);
        assert_eq!(frame.data[4], 0x6B);

        // Acceleration command layout: 0x03 + 0x43 + 8 + 0x63 + 0xC0 = 0x171
        let mut frame = CanFrame::new(0x343, &[0x00, 0x00, 0x63, 0xC0, 0x00, 0x00, 0x00, 0x00], 0);
        assert_eq!(frame.apply_checksum(), 0x71);
        assert_eq!(frame.data[7], 0x71);
    }

    #[test]
    fn test_checksum_is_stable_across_calls() {
        let mut frame = CanFrame::new(0x2E4, &[0x83, 0x00, 0x64, 0x00, 0x00], 0);
        let first = frame.apply_checksum();
        let second = frame.apply_checksum();
        assert_eq!(first, second);
        assert_eq!(first, 0xD2);
    }

    #[test]
    fn test_checksum_ignores_bytes_past_len() {
        let mut a = CanFrame::new(0x2E4, &[0x80, 0x00, 0x00, 0x00, 0x00], 0);
        let mut b = a;
        b.data[6] = 0xFF;
        b.data[7] = 0xFF;
        assert_eq!(a.apply_checksum(), b.apply_checksum());
    }

    #[test]
    fn test_display_renders_significant_bytes_only() {
        let mut frame = CanFrame::new(0x466, &[0x20, 0x20, 0xAD], 1);
        frame.data[7] = 0x55;
        assert_eq!(frame.to_string(), "Bus: 1  ID: 0x466  Length: 3  Data: 20 20 AD");
    }

    #[test]
    fn test_batch_preserves_insertion_order() {
        let mut batch = FrameBatch::new();
        assert!(batch.is_empty());
        batch.push(CanFrame::new(0x2E4, &[0x80, 0, 0, 0, 0x6B], 0));
        batch.push(CanFrame::new(0x141, &[0x00, 0x00, 0x00, 0x46], 1));
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.frames()[0].id, 0x2E4);
        assert_eq!(batch.frames()[1].id, 0x141);
    }

    #[test]
    fn test_batch_dump_is_line_per_frame() {
        let mut batch = FrameBatch::new();
        batch.push(CanFrame::new(0x141, &[0x00, 0x00, 0x00, 0x46], 1));
        batch.push(CanFrame::new(0x470, &[0x00, 0x00, 0x02, 0x7A], 1));
        let dump = batch.to_string();
        assert_eq!(dump.lines().count(), 2);
        assert!(dump.starts_with("Bus: 1  ID: 0x141  Length: 4  Data: 00 00 00 46\n"));
    }
}
