//! Interrupt-driven ADC acquisition with HV over-current cut-off
//!
//! # Contexts
//!
//! ```text
//!  conversion-ready IRQ ──► on_data_ready() ──┐
//!                                            ├─► Mutex<CriticalSectionRawMutex, RefCell<Inner>>
//!  command dispatcher ───► average(), ... ───┘
//! ```
//!
//! The ISR is the only producer of samples; the dispatcher reads averages,
//! records offsets and changes the safety threshold. Every access goes
//! through one critical section, so a 32-bit sum is never observed half
//! updated and offset recording is atomic across all 16 channels.
//!
//! # Cut-off
//!
//! With the controller enabled and offsets recorded, a sample strictly above
//! `offset + max_delta` drives the HV enable low from inside the ISR.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embedded_hal::digital::{OutputPin, StatefulOutputPin};
use platform::{AdcDevice, DataRate, ADC_CHANNELS};

use crate::board::ADC_INPUT_MAP;
use crate::config::ADC_COUNTS_PER_10_UA;
use crate::error::{Result, SiabError};

/// Error flags in the status byte of a result word
pub const STATUS_ERROR_MASK: u8 = 0x70;

/// Channel id in the status byte of a result word
pub const STATUS_CHANNEL_MASK: u8 = 0x0F;

/// Running statistics of one ADC channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdcChannelAccumulator {
    /// Sum of samples since the last reset
    pub sum: u32,
    /// Number of samples in `sum`
    pub count: u16,
    /// Most recent sample
    pub last: u32,
    /// Average recorded as the cut-off reference
    pub offset: u32,
}

impl AdcChannelAccumulator {
    const EMPTY: Self = Self {
        sum: 0,
        count: 0,
        last: 0,
        offset: 0,
    };

    /// Add a sample; restarts from it if the sum or count would overflow
    fn push(&mut self, sample: u32) {
        match (self.sum.checked_add(sample), self.count.checked_add(1)) {
            (Some(sum), Some(count)) => {
                self.sum = sum;
                self.count = count;
            }
            _ => {
                self.sum = sample;
                self.count = 1;
            }
        }
        self.last = sample;
    }

    /// `sum / count`, 0 before the first sample
    pub fn average(&self) -> u32 {
        self.sum.checked_div(u32::from(self.count)).unwrap_or(0)
    }
}

/// HV over-current controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HvSafetyState {
    /// Controller armed
    pub enabled: bool,
    /// Allowed rise above the recorded offset, in ADC counts
    pub max_delta: u32,
    /// Offsets have been recorded since boot
    pub offset_valid: bool,
    /// Number of cut-offs performed
    pub cutoff_count: u32,
}

/// What the ISR did with one conversion-ready event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SampleOutcome {
    /// Loop disabled; nothing read
    Stopped,
    /// Error flags set; sample discarded
    Dropped,
    /// Sample accumulated
    Accumulated {
        /// Channel the sample belongs to
        channel: u8,
    },
    /// Sample accumulated and HV switched off
    CutOff {
        /// Channel that tripped
        channel: u8,
    },
}

/// Max allowed delta (counts) for a current limit in µA
pub const fn max_delta_for(max_current_ua: u16) -> u32 {
    // u16 × 388 always fits a u32
    #[allow(clippy::arithmetic_side_effects)]
    let delta = max_current_ua as u32 * ADC_COUNTS_PER_10_UA / 10;
    delta
}

struct Inner<C, P> {
    channels: [AdcChannelAccumulator; ADC_CHANNELS],
    safety: HvSafetyState,
    running: bool,
    adc: C,
    hv: P,
}

/// Acquisition state shared between the conversion-ready ISR and the
/// dispatcher
///
/// Intended to live in a `static`; `new` is `const` for that reason.
pub struct AdcAcquisitionLoop<C, P> {
    // CriticalSectionRawMutex masks interrupts for the duration of each
    // access. The longest holder is init_adc (a handful of register writes);
    // the ISR path is a result read plus a compare.
    inner: Mutex<CriticalSectionRawMutex, RefCell<Inner<C, P>>>,
}

impl<C, P> AdcAcquisitionLoop<C, P>
where
    C: AdcDevice,
    P: StatefulOutputPin,
{
    /// Wrap the converter and HV switch; loop disabled, controller disarmed
    pub const fn new(adc: C, hv: P, max_current_ua: u16) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner {
                channels: [AdcChannelAccumulator::EMPTY; ADC_CHANNELS],
                safety: HvSafetyState {
                    enabled: false,
                    max_delta: max_delta_for(max_current_ua),
                    offset_valid: false,
                    cutoff_count: 0,
                },
                running: false,
                adc,
                hv,
            })),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Inner<C, P>) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }

    // ── ISR side ────────────────────────────────────────────────────────────

    /// Conversion-ready handler
    pub fn on_data_ready(&self) -> Result<SampleOutcome> {
        self.with(|inner| {
            if !inner.running {
                return Ok(SampleOutcome::Stopped);
            }
            let [r0, r1, r2, status] = inner.adc.read_result().map_err(|_| SiabError::Adc)?;
            if status & STATUS_ERROR_MASK != 0 {
                return Ok(SampleOutcome::Dropped);
            }
            let channel = status & STATUS_CHANNEL_MASK;
            let sample = u32::from_be_bytes([0, r0, r1, r2]);
            let Some(acc) = inner.channels.get_mut(usize::from(channel)) else {
                return Ok(SampleOutcome::Dropped);
            };

            let safety = &mut inner.safety;
            let over = safety.enabled
                && safety.offset_valid
                && sample > acc.offset.saturating_add(safety.max_delta);
            acc.push(sample);

            if over && inner.hv.is_set_high().map_err(|_| SiabError::HvSwitch)? {
                inner.hv.set_low().map_err(|_| SiabError::HvSwitch)?;
                safety.cutoff_count = safety.cutoff_count.saturating_add(1);
                return Ok(SampleOutcome::CutOff { channel });
            }
            Ok(SampleOutcome::Accumulated { channel })
        })
    }

    // ── Dispatcher side ─────────────────────────────────────────────────────

    /// Reset, identify and configure the converter, then start continuous
    /// conversion
    ///
    /// The conversion-ready interrupt stays detached until
    /// [`set_running`](Self::set_running).
    pub fn init_adc(&self, rate: DataRate) -> Result<()> {
        self.with(|inner| {
            let adc = &mut inner.adc;
            adc.reset().map_err(|_| SiabError::Adc)?;
            if !adc.is_valid_id().map_err(|_| SiabError::Adc)? {
                return Err(SiabError::AdcIdMismatch);
            }
            for (ch, input) in (0u8..).zip(ADC_INPUT_MAP) {
                adc.configure_channel(ch, input).map_err(|_| SiabError::Adc)?;
            }
            adc.configure_setup(rate).map_err(|_| SiabError::Adc)?;
            adc.start_continuous().map_err(|_| SiabError::Adc)
        })?;
        info!("ADC running at {} SPS", rate.samples_per_second());
        Ok(())
    }

    /// Attach (and accept samples) or detach the conversion-ready interrupt
    pub fn set_running(&self, running: bool) -> Result<()> {
        self.with(|inner| {
            inner
                .adc
                .set_data_ready_interrupt(running)
                .map_err(|_| SiabError::Adc)?;
            inner.running = running;
            Ok(())
        })
    }

    /// Whether samples are being accepted
    pub fn is_running(&self) -> bool {
        self.with(|inner| inner.running)
    }

    /// Average of `channel`, optionally restarting its accumulator
    pub fn read_and_maybe_reset(&self, channel: u8, reset: bool) -> Result<u32> {
        self.with(|inner| {
            let acc = inner
                .channels
                .get_mut(usize::from(channel))
                .ok_or(SiabError::InvalidChannel(channel))?;
            let avg = acc.average();
            if reset {
                acc.sum = 0;
                acc.count = 0;
            }
            Ok(avg)
        })
    }

    /// Average of `channel`
    pub fn average(&self, channel: u8) -> Result<u32> {
        self.read_and_maybe_reset(channel, false)
    }

    /// Snapshot of `channel`'s accumulator
    pub fn channel(&self, channel: u8) -> Result<AdcChannelAccumulator> {
        self.with(|inner| {
            inner
                .channels
                .get(usize::from(channel))
                .copied()
                .ok_or(SiabError::InvalidChannel(channel))
        })
    }

    /// Record every channel's current average as its cut-off reference and
    /// restart the accumulators
    pub fn record_offsets(&self) {
        self.with(|inner| {
            for acc in &mut inner.channels {
                acc.offset = acc.average();
                acc.sum = 0;
                acc.count = 0;
            }
            inner.safety.offset_valid = true;
        });
        info!("HV safety offsets recorded");
    }

    /// Recorded reference of `channel`
    pub fn offset(&self, channel: u8) -> Result<u32> {
        self.channel(channel).map(|acc| acc.offset)
    }

    /// Set the cut-off current
    pub fn set_max_current_ua(&self, max_current_ua: u16) {
        let delta = max_delta_for(max_current_ua);
        self.with(|inner| inner.safety.max_delta = delta);
        info!("HV max current {} uA ({} counts)", max_current_ua, delta);
    }

    /// Arm the over-current controller
    pub fn enable_safety(&self) {
        self.with(|inner| inner.safety.enabled = true);
        info!("HV safety controller enabled");
    }

    /// Snapshot of the controller state
    pub fn safety(&self) -> HvSafetyState {
        self.with(|inner| inner.safety)
    }

    /// Switch HV on
    pub fn hv_on(&self) -> Result<()> {
        self.with(|inner| inner.hv.set_high().map_err(|_| SiabError::HvSwitch))
    }

    /// Switch HV off
    pub fn hv_off(&self) -> Result<()> {
        self.with(|inner| inner.hv.set_low().map_err(|_| SiabError::HvSwitch))
    }

    /// Whether the HV enable is driven high
    pub fn hv_is_high(&self) -> Result<bool> {
        self.with(|inner| inner.hv.is_set_high().map_err(|_| SiabError::HvSwitch))
    }

    /// Mutable access to the drivers, e.g. for test inspection
    pub fn with_drivers<R>(&self, f: impl FnOnce(&mut C, &mut P) -> R) -> R {
        self.with(|inner| f(&mut inner.adc, &mut inner.hv))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use platform::mocks::{MockAdc, MockHvSwitch};

    fn running() -> AdcAcquisitionLoop<MockAdc, MockHvSwitch> {
        let acq = AdcAcquisitionLoop::new(MockAdc::new(), MockHvSwitch::new(), 400);
        acq.set_running(true).unwrap();
        acq
    }

    #[test]
    fn max_delta_is_38_8_counts_per_ua() {
        assert_eq!(max_delta_for(400), 15_520);
        assert_eq!(max_delta_for(1), 38);
        assert_eq!(max_delta_for(u16::MAX), 2_542_758);
    }

    #[test]
    fn stopped_loop_reads_nothing() {
        let acq = AdcAcquisitionLoop::new(MockAdc::new(), MockHvSwitch::new(), 400);
        acq.with_drivers(|adc, _| adc.push_sample(0, 10));
        assert_eq!(acq.on_data_ready().unwrap(), SampleOutcome::Stopped);
        assert_eq!(acq.channel(0).unwrap().count, 0);
    }

    #[test]
    fn sample_is_decoded_big_endian_with_channel_from_status() {
        let acq = running();
        acq.with_drivers(|adc, _| adc.push_result([0x12, 0x34, 0x56, 0x85]));
        assert_eq!(
            acq.on_data_ready().unwrap(),
            SampleOutcome::Accumulated { channel: 5 }
        );
        assert_eq!(acq.channel(5).unwrap().last, 0x0012_3456);
    }

    #[test]
    fn error_flags_drop_the_sample() {
        let acq = running();
        acq.with_drivers(|adc, _| adc.push_result([0xFF, 0xFF, 0xFF, 0x10 | 0x03]));
        assert_eq!(acq.on_data_ready().unwrap(), SampleOutcome::Dropped);
        assert_eq!(acq.channel(3).unwrap().count, 0);
    }

    #[test]
    fn overflowing_sum_restarts_accumulator() {
        let mut acc = AdcChannelAccumulator {
            sum: u32::MAX - 5,
            count: 7,
            ..AdcChannelAccumulator::default()
        };
        acc.push(100);
        assert_eq!((acc.sum, acc.count, acc.average()), (100, 1, 100));
    }

    #[test]
    fn read_and_reset_restarts_one_channel() {
        let acq = running();
        acq.with_drivers(|adc, _| {
            adc.push_sample(2, 100);
            adc.push_sample(2, 300);
        });
        acq.on_data_ready().unwrap();
        acq.on_data_ready().unwrap();
        assert_eq!(acq.read_and_maybe_reset(2, true).unwrap(), 200);
        assert_eq!(acq.average(2).unwrap(), 0);
        assert_eq!(acq.average(16), Err(SiabError::InvalidChannel(16)));
    }
}
