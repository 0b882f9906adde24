//! Shared engine types: source identifiers, output routing and the Q15
//! volume table.

use serde::{Deserialize, Serialize};

/// Mono PCM sample as delivered to the hardware sink.
pub type Sample = i16;

/// Logical audio source feeding the sink.
///
/// At most one source is live at any instant; the router picks the
/// highest-priority source that wants to play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    /// No source selected; the sink receives nothing.
    Disabled = 0,
    /// The file player (WAV/MP3/ADPCM/A-law/u-law queue).
    Player = 1,
    /// Raw ADC capture routed straight through.
    AdcDirect = 2,
    /// External front-panel feed.
    FrontExternal = 3,
    /// Diagnostic generator.
    Diag = 4,
}

impl SourceId {
    /// Number of source slots, including `Disabled`.
    pub const COUNT: usize = 5;

    /// All real sources in enum order. The router scans this list with a
    /// strict comparison, which makes the first entry win priority ties.
    pub(crate) const ROUTABLE: [SourceId; 4] = [
        SourceId::Player,
        SourceId::AdcDirect,
        SourceId::FrontExternal,
        SourceId::Diag,
    ];

    /// Static default priority. `Diag` outranks everything, `AdcDirect`
    /// outranks the player, the player and the external feed tie.
    pub fn default_priority(self) -> u8 {
        match self {
            SourceId::Disabled => 0,
            SourceId::Player => 1,
            SourceId::AdcDirect => 2,
            SourceId::FrontExternal => 1,
            SourceId::Diag => 3,
        }
    }

    /// Slot index into per-source tables.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(idx: u8) -> Option<SourceId> {
        match idx {
            0 => Some(SourceId::Disabled),
            1 => Some(SourceId::Player),
            2 => Some(SourceId::AdcDirect),
            3 => Some(SourceId::FrontExternal),
            4 => Some(SourceId::Diag),
            _ => None,
        }
    }
}

/// Logical output the player routes a track to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputPort {
    #[default]
    Front,
    Rear,
}

/// Per-source volume scale factors in Q15.
///
/// Indices 0..=6 attenuate; 7..=10 are pass-through (0x7FFF).
pub const VOLUME_TABLE: [i16; 11] = [
    0,      // 0: silence
    1638,   // 1
    3277,   // 2
    6554,   // 3
    9830,   // 4
    13107,  // 5
    19661,  // 6
    0x7FFF, // 7: pass-through
    0x7FFF, // 8
    0x7FFF, // 9
    0x7FFF, // 10
];

/// First volume index at which scaling becomes a no-op.
pub const VOLUME_PASSTHROUGH_INDEX: u8 = 7;

/// Scale a sample block in place by a Q15 factor with saturation.
pub fn scale_q15(buf: &mut [Sample], scale: i16) {
    for s in buf.iter_mut() {
        let v = (i32::from(*s) * i32::from(scale)) >> 15;
        *s = v.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
    }
}
