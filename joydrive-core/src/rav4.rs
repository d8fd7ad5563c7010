//! Message set of the Toyota RAV4 Hybrid
//!
//! Identifiers, payload templates and periods in this module were captured
//! from the traffic of the stock forward camera and driving support unit.
//! Porting to another vehicle means replacing this module, not the engine
//! around it.
//!
//! Periods are in control-loop ticks (10 ms), so a period of 5 is 20 Hz on
//! the bus.

use crate::frame::{CanFrame, FrameBatch};
use crate::schedule::{MessageTable, PeriodicMessage, ScheduleError};

/// Identifier of the steering torque command
pub const STEER_COMMAND_ID: u16 = 0x2E4;
/// Identifier of the acceleration command
pub const ACCEL_COMMAND_ID: u16 = 0x343;
/// Identifier of the multimedia HUD frame
pub const UI_COMMAND_ID: u16 = 0x412;
/// Identifier of the forward-collision-warning frame
pub const FCW_COMMAND_ID: u16 = 0x411;

/// Ticks between acceleration command emissions (cancel bypasses this)
pub const ACCEL_PERIOD: u16 = 3;
/// Ticks between video-feed emissions
pub const VIDEO_PERIOD: u16 = 10;
/// Ticks between UI and FCW emissions
pub const HUD_PERIOD: u16 = 100;

/// Identifiers the spoofed video feed is emitted under
pub const VIDEO_IDS: [u16; 19] = [
    0x340, 0x341, 0x342, 0x343, 0x344, 0x345, 0x363, 0x364, 0x365, 0x370, 0x371, 0x372, 0x373,
    0x374, 0x375, 0x380, 0x381, 0x382, 0x383,
];

/// Appends the spoofed video-feed frames due on `tick`
///
/// All 19 frames share one prototype. A frame counter goes into byte 0, the
/// prototype is checksummed once, and each emitted frame overwrites the
/// checksum slot with an identifier-dependent value derived from the shared
/// sum.
///
/// Returns the number of frames appended: 19 when `tick` is on a
/// [`VIDEO_PERIOD`] boundary, 0 otherwise.
pub fn append_video_frames(batch: &mut FrameBatch, tick: u16) -> usize {
    if tick % VIDEO_PERIOD != 0 {
        return 0;
    }

    let mut proto = CanFrame::new(0x000, &[0x00, 0x03, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00], 1);
    proto.data[0] = (tick / VIDEO_PERIOD) as u8;
    let shared = proto.apply_checksum();

    for id in VIDEO_IDS {
        let mut frame = proto;
        frame.id = id;
        frame.data[7] = shared
            .wrapping_add((id >> 8) as u8)
            .wrapping_add(id as u8);
        batch.push(frame);
    }

    VIDEO_IDS.len()
}

/// Byte-0 counter of the camera's 20 Hz frames: `((t / 5) mod 7) + 1` in the
/// top three bits
fn camera_counter(frame: &mut CanFrame, tick: u16) {
    frame.data[0] = ((((tick / 5) % 7) + 1) << 5) as u8;
}

/// Trailing byte of the two lane-object frames: a flag from bit 1 of the
/// identifier plus a slow rolling counter
fn camera_rolling_suffix(frame: &mut CanFrame, tick: u16) {
    frame.data[7] = (((frame.id & 0x002) << 6) as u8)
        .wrapping_add(((tick / 100) % 0xF) as u8)
        .wrapping_add(1);
}

/// The static frame set of the forward camera unit
pub fn camera_table() -> Result<MessageTable, ScheduleError> {
    MessageTable::new(vec![
        PeriodicMessage::fixed(CanFrame::new(0x367, &[0x06, 0x00], 0), 40),
        PeriodicMessage::fixed(
            CanFrame::new(0x414, &[0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x17, 0x00], 0),
            100,
        ),
        PeriodicMessage::mutated(CanFrame::new(0x489, &[0x00; 8], 0), 100, camera_rolling_suffix),
        PeriodicMessage::mutated(CanFrame::new(0x48A, &[0x00; 8], 0), 100, camera_rolling_suffix),
        PeriodicMessage::fixed(
            CanFrame::new(0x48B, &[0x66, 0x06, 0x08, 0x0A, 0x02, 0x00, 0x00, 0x00], 0),
            100,
        ),
        PeriodicMessage::fixed(
            CanFrame::new(0x4D3, &[0x1C, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00], 0),
            100,
        ),
        PeriodicMessage::fixed(
            CanFrame::new(0x130, &[0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x38], 1),
            100,
        ),
        PeriodicMessage::mutated(
            CanFrame::new(0x240, &[0x00, 0x00, 0x10, 0x01, 0x00, 0x10, 0x01, 0x00], 1),
            5,
            camera_counter,
        ),
        PeriodicMessage::mutated(
            CanFrame::new(0x241, &[0x00, 0x00, 0x10, 0x01, 0x00, 0x10, 0x01, 0x00], 1),
            5,
            camera_counter,
        ),
        PeriodicMessage::mutated(
            CanFrame::new(0x244, &[0x00, 0x00, 0x10, 0x01, 0x00, 0x10, 0x01, 0x00], 1),
            5,
            camera_counter,
        ),
        PeriodicMessage::mutated(
            CanFrame::new(0x245, &[0x00, 0x00, 0x10, 0x01, 0x00, 0x10, 0x01, 0x00], 1),
            5,
            camera_counter,
        ),
        PeriodicMessage::mutated(
            CanFrame::new(0x248, &[0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01], 1),
            5,
            camera_counter,
        ),
        PeriodicMessage::fixed(CanFrame::new(0x466, &[0x20, 0x20, 0xAD], 1), 100),
    ])
}

/// The static frame set of the driving support unit
///
/// Emitted verbatim; none of these carry tick-dependent bytes.
pub fn dsu_table() -> Result<MessageTable, ScheduleError> {
    MessageTable::new(vec![
        PeriodicMessage::fixed(CanFrame::new(0x141, &[0x00, 0x00, 0x00, 0x46], 1), 2),
        PeriodicMessage::fixed(
            CanFrame::new(0x128, &[0xF4, 0x01, 0x90, 0x83, 0x00, 0x37], 1),
            3,
        ),
        PeriodicMessage::fixed(
            CanFrame::new(0x283, &[0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x8C], 0),
            3,
        ),
        PeriodicMessage::fixed(
            CanFrame::new(0x2E6, &[0xFF, 0xF8, 0x00, 0x08, 0x7F, 0xE0, 0x00, 0x4E], 0),
            3,
        ),
        PeriodicMessage::fixed(
            CanFrame::new(0x2E7, &[0xA8, 0x9C, 0x31, 0x9C, 0x00, 0x00, 0x00, 0x02], 0),
            3,
        ),
        PeriodicMessage::fixed(
            CanFrame::new(0x344, &[0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x50], 0),
            5,
        ),
        PeriodicMessage::fixed(
            CanFrame::new(0x160, &[0x00, 0x00, 0x08, 0x12, 0x01, 0x31, 0x9C, 0x51], 1),
            7,
        ),
        PeriodicMessage::fixed(
            CanFrame::new(0x161, &[0x00, 0x1E, 0x00, 0x00, 0x00, 0x80, 0x07], 1),
            7,
        ),
        PeriodicMessage::fixed(
            CanFrame::new(0x33E, &[0x0F, 0xFF, 0x26, 0x40, 0x00, 0x1F, 0x00], 0),
            20,
        ),
        PeriodicMessage::fixed(
            CanFrame::new(0x365, &[0x00, 0x00, 0x00, 0x80, 0x03, 0x00, 0x08], 0),
            20,
        ),
        PeriodicMessage::fixed(
            CanFrame::new(0x366, &[0x00, 0x00, 0x4D, 0x82, 0x40, 0x02, 0x00], 0),
            20,
        ),
        PeriodicMessage::fixed(
            CanFrame::new(0x4CB, &[0x0C, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00], 0),
            100,
        ),
        PeriodicMessage::fixed(CanFrame::new(0x470, &[0x00, 0x00, 0x02, 0x7A], 1), 100),
    ])
}

/// Builds the steering torque command for `tick`
///
/// Byte 0 packs a 6-bit tick counter shifted left once, an always-set
/// "active" flag in the top bit and a "torque requested" flag in the bottom
/// bit. Torque goes out big-endian in bytes 1-2. Byte 3 drives the HUD:
/// 0x00 regular, 0x40 actively steering with beep, 0x80 without.
pub fn steer_command(tick: u16, torque: i16) -> CanFrame {
    let mut counter = (((tick & 0x3F) << 1) | 0x80) as u8;
    if torque != 0 {
        counter |= 1;
    }

    let raw = torque as u16;
    let mut frame = CanFrame::new(
        STEER_COMMAND_ID,
        &[counter, (raw >> 8) as u8, raw as u8, 0x00, 0x00],
        0,
    );
    frame.apply_checksum();
    frame
}

/// Builds the acceleration command if one is due on `tick`
///
/// Emitted every [`ACCEL_PERIOD`] ticks; a cancel request bypasses the
/// divider so the disengage bit reaches the vehicle on the tick the operator
/// pressed it. `accel` is the combined pedal command in 1 mm/s^2 units.
pub fn accel_command(tick: u16, accel: i16, cancel: bool) -> Option<CanFrame> {
    if tick % ACCEL_PERIOD != 0 && !cancel {
        return None;
    }

    let raw = accel as u16;
    let mut frame = CanFrame::new(
        ACCEL_COMMAND_ID,
        &[
            (raw >> 8) as u8,
            raw as u8,
            0x63,
            0xC0 | cancel as u8,
            0x00,
            0x00,
            0x00,
            0x00,
        ],
        0,
    );
    frame.apply_checksum();
    Some(frame)
}

/// HUD tones and indicators on the multimedia display
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UiStatus {
    /// First audible tone
    pub tone_1: bool,
    /// Second audible tone
    pub tone_2: bool,
    /// Lane-keep steering indicator
    pub steer_indicator: bool,
}

/// Appends the multimedia HUD frame when due on `tick`
pub fn append_ui_frame(batch: &mut FrameBatch, tick: u16, status: UiStatus) -> usize {
    if tick % HUD_PERIOD != 0 {
        return 0;
    }

    batch.push(CanFrame::new(
        UI_COMMAND_ID,
        &[
            0x54,
            0x04 + status.steer_indicator as u8 + ((status.tone_2 as u8) << 4),
            0x0C,
            0x00,
            status.tone_1 as u8,
            0x2C,
            0x38,
            0x02,
        ],
        0,
    ));
    1
}

/// Appends the forward-collision-warning frame when due on `tick`
pub fn append_fcw_frame(batch: &mut FrameBatch, tick: u16, warn: bool) -> usize {
    if tick % HUD_PERIOD != 0 {
        return 0;
    }

    batch.push(CanFrame::new(
        FCW_COMMAND_ID,
        &[(warn as u8) << 4, 0x20, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00],
        0,
    ));
    1
}

/// Which halves of the spoof are active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpoofMode {
    /// Forward camera traffic plus steering commands
    Camera,
    /// Driving-support-unit traffic plus acceleration commands
    Dsu,
    /// Both units at once
    Both,
}

impl SpoofMode {
    /// True when the camera families (video, camera, UI, FCW) and the
    /// steering command are active
    pub fn camera_enabled(self) -> bool {
        matches!(self, SpoofMode::Camera | SpoofMode::Both)
    }

    /// True when the DSU family and the acceleration command are active
    pub fn dsu_enabled(self) -> bool {
        matches!(self, SpoofMode::Dsu | SpoofMode::Both)
    }
}

/// The periodic half of the spoof: every frame family behind one call
#[derive(Debug, Clone)]
pub struct MessageScheduler {
    camera: MessageTable,
    dsu: MessageTable,
    mode: SpoofMode,
}

impl MessageScheduler {
    /// Builds the tables for `mode`
    ///
    /// The built-in tables are valid by construction; validation still runs
    /// so edits to them fail fast instead of faulting mid-drive.
    pub fn new(mode: SpoofMode) -> Result<Self, ScheduleError> {
        Ok(MessageScheduler {
            camera: camera_table()?,
            dsu: dsu_table()?,
            mode,
        })
    }

    /// The mode this scheduler was built for
    pub fn mode(&self) -> SpoofMode {
        self.mode
    }

    /// Appends every periodic frame due on `tick`, in family order: video,
    /// camera, UI and FCW for the camera half, then the DSU set
    ///
    /// Returns the number of frames appended. Deterministic in `tick` and the
    /// status arguments.
    pub fn append_due(&self, batch: &mut FrameBatch, tick: u16, ui: UiStatus, fcw: bool) -> usize {
        let mut added = 0;
        if self.mode.camera_enabled() {
            added += append_video_frames(batch, tick);
            added += self.camera.append_due(batch, tick);
            added += append_ui_frame(batch, tick, ui);
            added += append_fcw_frame(batch, tick, fcw);
        }
        if self.mode.dsu_enabled() {
            added += self.dsu.append_due(batch, tick);
        }
        added
    }
}
