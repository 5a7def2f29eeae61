//! Calibration runs against the MUSIC simulator

#![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]

mod common;

use common::sim_board;
use platform::AnalogLine;
use siab::board::{se_line, HG_LINES, LG_LINES};
use siab::calibration::vdc::{
    SE_TARGET_V, SE_TOLERANCE_V, SUM_NEG_TARGET_V, SUM_POS_TARGET_V, VCM_TARGET_V,
};
use siab::calibration::{MusicCalibrator, OutputType, VdcOutput};
use siab::MusicChip;

const N: u16 = 8;

#[test]
fn discovery_marks_only_matching_channels() {
    let (mut board, sim) = sim_board();
    {
        let mut s = sim.borrow_mut();
        s.enable_digital(0);
        s.enable_digital(6);
        s.enable_analog(3);
    }
    let mut cal = MusicCalibrator::new(&mut board, MusicChip::Bottom, false);
    cal.check_enabled_channels(true).unwrap();
    let state = *cal.state();
    assert!(state.channels[0].enabled);
    assert!(state.channels[6].enabled);
    assert!(!state.channels[3].enabled);
    assert_eq!(state.channels[3].output, OutputType::Analog);
    assert_eq!(state.channels[1].output, OutputType::Misconfigured);

    cal.check_enabled_channels(false).unwrap();
    let enabled: Vec<usize> = cal.state().enabled().collect();
    assert_eq!(enabled, vec![3]);
}

#[test]
fn bandgap_scan_returns_first_passing_code() {
    let (mut board, sim) = sim_board();
    {
        let mut s = sim.borrow_mut();
        s.vbg_min = 3;
        s.enable_digital(1);
        s.enable_digital(7);
    }
    let mut cal = MusicCalibrator::new(&mut board, MusicChip::Bottom, false);
    cal.check_enabled_channels(true).unwrap();
    assert_eq!(cal.find_opt_vbg(N).unwrap(), 3);
    assert_eq!(sim.borrow().vbg(), 3);
}

#[test]
fn bandgap_scan_exhaustion_returns_last_code() {
    let (mut board, sim) = sim_board();
    {
        let mut s = sim.borrow_mut();
        s.vbg_min = 9;
        s.enable_digital(2);
    }
    let mut cal = MusicCalibrator::new(&mut board, MusicChip::Bottom, false);
    cal.check_enabled_channels(true).unwrap();
    assert_eq!(cal.find_opt_vbg(N).unwrap(), 7);
}

#[test]
fn threshold_scan_finds_flip_point_of_every_channel() {
    let flips = [100, 200, 50, 300, 10, 400, 250, 123];
    let (mut board, sim) = sim_board();
    {
        let mut s = sim.borrow_mut();
        s.vbg_min = 2;
        s.flip = flips;
        for ch in 0..8 {
            s.enable_digital(ch);
        }
    }
    let result = MusicCalibrator::new(&mut board, MusicChip::Bottom, false)
        .threshold_scan(N)
        .unwrap();
    assert_eq!(result.vbg, 2);
    assert_eq!(result.thresholds, flips);

    // Threshold field cleared, output configuration kept
    let s = sim.borrow();
    for ch in 0..8 {
        assert_eq!(s.threshold(ch), 0);
    }
    assert_eq!(
        s.regs[0][usize::from(siab::music::registers::channel(0))],
        siab::music::registers::CHANNEL_EN_COMP_SW
    );
}

#[test]
fn threshold_scan_ignores_the_other_chip() {
    let (mut board, sim) = sim_board();
    {
        let mut s = sim.borrow_mut();
        s.wired = 1;
        s.flip[4] = 77;
        s.enable_digital(4);
    }
    let result = MusicCalibrator::new(&mut board, MusicChip::Top, false)
        .threshold_scan(N)
        .unwrap();
    assert_eq!(result.thresholds[4], 77);
    assert_eq!(sim.borrow().regs[0], [0u16; 128]);
}

#[test]
fn corner_check_rejects_unwired_line() {
    let (mut board, sim) = sim_board();
    sim.borrow_mut().enable_analog(0);
    let mut cal = MusicCalibrator::new(&mut board, MusicChip::Bottom, false);
    assert!(cal
        .check_vdc_corners(VdcOutput::SingleEnded, se_line(0).unwrap())
        .unwrap());
    assert!(!cal
        .check_vdc_corners(VdcOutput::SingleEnded, se_line(1).unwrap())
        .unwrap());
}

#[test]
fn single_ended_calibration_lands_within_tolerance() {
    let (mut board, sim) = sim_board();
    {
        let mut s = sim.borrow_mut();
        for ch in [0, 1, 6, 7] {
            s.enable_analog(ch);
        }
    }
    let cal = MusicCalibrator::new(&mut board, MusicChip::Bottom, false)
        .vdc_calib(N)
        .unwrap();
    let se = cal.se.unwrap();
    assert_eq!(cal.vcm, None);
    assert_eq!(cal.lg, None);

    let s = sim.borrow();
    assert_eq!(s.vdc_se(), se);
    for ch in [0, 1, 6, 7] {
        let v = s.voltage(se_line(ch).unwrap());
        assert!(
            (v - SE_TARGET_V).abs() <= SE_TOLERANCE_V,
            "ch{ch}: SE {v} V at code {se}"
        );
    }
    // Unconfigured channels stay dark
    for ch in [2, 3, 4, 5] {
        assert_eq!(s.voltage(se_line(ch).unwrap()), 0.0, "ch{ch}");
    }
}

#[test]
fn differential_calibration_reaches_targets() {
    let (mut board, sim) = sim_board();
    {
        let mut s = sim.borrow_mut();
        s.diff_wired = true;
        for ch in 0..8 {
            s.enable_analog(ch);
        }
    }
    let mut cal = MusicCalibrator::new(&mut board, MusicChip::Bottom, false);
    let result = cal.vdc_calib(N).unwrap();
    let state = *cal.state();

    // A0..A3 carry the pairs, so SE channels 2..=5 show no swing
    for ch in 2..=5 {
        assert!(!state.channels[ch].enabled, "ch{ch}");
    }
    assert!(state.lg_connected && state.hg_connected);
    assert_eq!(result.flags(), 0b1111);

    let s = sim.borrow();
    assert_eq!(s.vcm(), result.vcm.unwrap());
    assert_eq!(s.vdc_lg(), result.lg.unwrap());
    assert_eq!(s.vdc_hg(), result.hg.unwrap());

    let check = |line: AnalogLine, target: f32| {
        let v = s.voltage(line);
        assert!((v - target).abs() <= 0.05, "{v} V vs {target} V");
    };
    check(LG_LINES[0], SUM_POS_TARGET_V);
    check(LG_LINES[1], SUM_NEG_TARGET_V);
    check(HG_LINES[0], SUM_POS_TARGET_V);
    check(HG_LINES[1], SUM_NEG_TARGET_V);
}

#[test]
fn common_mode_calibration_stops_at_minimum_error() {
    let (mut board, sim) = sim_board();
    sim.borrow_mut().diff_wired = true;
    let mut cal = MusicCalibrator::new(&mut board, MusicChip::Bottom, false);
    cal.discover_vdc_outputs().unwrap();
    let code = cal.vcm_calib(N).unwrap();
    cal.set_vcm(code).unwrap();

    let s = sim.borrow();
    let mean = LG_LINES
        .iter()
        .chain(HG_LINES.iter())
        .map(|&l| s.voltage(l))
        .sum::<f32>()
        / 4.0;
    assert!((mean - VCM_TARGET_V).abs() <= 0.05, "VCM {mean} V at code {code}");
    assert_eq!(s.vdc_lg(), 0xFF);
}

#[test]
fn every_search_terminates_inside_code_range() {
    // Nothing wired: the SE search sees 0 V from the start and stops at once
    let (mut board, _sim) = sim_board();
    let mut cal = MusicCalibrator::new(&mut board, MusicChip::Bottom, false);
    assert_eq!(cal.vdc_se_calib(N).unwrap(), 0);
    assert!(cal.vdc_sum_calib(VdcOutput::LowGain, N).unwrap() < 255);
}
