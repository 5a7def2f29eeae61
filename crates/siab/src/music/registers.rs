//! MUSIC ASIC register map
//!
//! Every register is 16 bits wide and addressed by a 7-bit address. The
//! address byte of a read transaction carries [`READ_FLAG`].

/// Set on the address byte of a read transaction
pub const READ_FLAG: u8 = 0x80;

/// Number of single-ended channels per ASIC
pub const CHANNELS: u8 = 8;

// ── Address blocks ──────────────────────────────────────────────────────────

/// First input-stage register (one per channel, 0x00..=0x07)
pub const INPUT_STAGE: u8 = 0x00;

/// First channel register (one per channel, 0x08..=0x0F)
pub const CHANNEL: u8 = 0x08;

/// First bias register (0x20..=0x26)
pub const BIAS: u8 = 0x20;

/// Number of bias registers
pub const BIAS_COUNT: u8 = 7;

/// Input-stage register of channel `ch`
pub const fn input_stage(ch: u8) -> u8 {
    INPUT_STAGE.wrapping_add(ch)
}

/// Channel register of channel `ch`
pub const fn channel(ch: u8) -> u8 {
    CHANNEL.wrapping_add(ch)
}

// ── Input-stage register bits ───────────────────────────────────────────────

/// Channel enable switch
pub const INPUT_STAGE_ENABLE: u16 = 1 << 10;

// ── Channel register bits ───────────────────────────────────────────────────

/// `enDrvSE`: single-ended analog output driver enabled
pub const CHANNEL_EN_DRV_SE: u16 = 1 << 12;

/// `enCompSW`: discriminator drives the single-ended output
pub const CHANNEL_EN_COMP_SW: u16 = 1 << 1;

/// Fields preserved when the threshold is rewritten
pub const CHANNEL_KEEP_MASK: u16 = 0xF007;

/// Position of the 9-bit discriminator threshold (VTH)
pub const THRESHOLD_SHIFT: u16 = 3;

/// Largest threshold code
pub const THRESHOLD_MAX: u16 = 511;

// ── Bias registers ──────────────────────────────────────────────────────────

/// VDC of the differential outputs: low-gain in the high byte, high-gain in
/// the low byte
pub const BIAS_VDC_DIFF: u8 = BIAS;

/// VDC of the single-ended outputs in the high byte, VCM in the low byte
pub const BIAS_VDC_SE_VCM: u8 = BIAS + 1;

/// Bandgap reference register
pub const BIAS_VBG: u8 = BIAS + 2;

/// Position of the 3-bit VBG code
pub const VBG_SHIFT: u16 = 10;

/// Fields preserved when VBG is rewritten
pub const VBG_KEEP_MASK: u16 = 0xE3FF;

/// Number of VBG codes
pub const VBG_CODES: u8 = 8;

/// Channel register value with threshold `vth`, keeping the other fields of
/// `reg`
pub const fn with_threshold(reg: u16, vth: u16) -> u16 {
    (reg & CHANNEL_KEEP_MASK) | ((vth & THRESHOLD_MAX) << THRESHOLD_SHIFT)
}

/// Bandgap register value with code `vbg`, keeping the other fields of `reg`
#[allow(clippy::cast_lossless)] // u16::from is not const
pub const fn with_vbg(reg: u16, vbg: u8) -> u16 {
    (reg & VBG_KEEP_MASK) | (((vbg & 0x07) as u16) << VBG_SHIFT)
}
