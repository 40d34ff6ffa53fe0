// tests/test_phase.rs -- Integration tests for phase unwrapping, distance
// wraparound and the raw DCS dump decoder.
//
// Synthetic quadruples are built around a high bias so every DCS value stays
// inside u16: for a target phase `phi` the unwrapper computes
// atan2(d3 - d1, d2 - d0) + pi, so we choose (d2 - d0, d3 - d1) =
// A * (cos(phi - pi), sin(phi - pi)).

use std::f64::consts::{PI, TAU};
use tof_vision::core_modules::distance_correction::DistanceCorrection;
use tof_vision::core_modules::grid::{Grid, RawFrame};
use tof_vision::core_modules::modulation::{ModulationConfig, ModulationFrequency};
use tof_vision::core_modules::phase_unwrapper::{DistanceOffset, PhaseUnwrapper};
use tof_vision::replay::{ReplayReader, decode_stream, encode_frame};
use tof_vision::ConfigError;

const BIAS: f64 = 20_000.0;
const AMPLITUDE: f64 = 8_000.0;

fn quadruple_for_phase(phi: f64) -> [u16; 4] {
    let theta = phi - PI;
    let d2_minus_d0 = AMPLITUDE * theta.cos();
    let d3_minus_d1 = AMPLITUDE * theta.sin();
    [
        BIAS as u16,
        BIAS as u16,
        (BIAS + d2_minus_d0).round() as u16,
        (BIAS + d3_minus_d1).round() as u16,
    ]
}

fn uniform_frame(rows: usize, cols: usize, dcs: [u16; 4]) -> RawFrame {
    RawFrame::new(dcs.map(|v| Grid::filled(rows, cols, v))).unwrap()
}

/// Signed difference of two angles folded into (-pi, pi].
fn angle_diff(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(TAU);
    if d > PI { d - TAU } else { d }
}

#[test]
fn distance_always_inside_unambiguous_range() {
    for freq in ModulationFrequency::ALL {
        let unwrapper = PhaseUnwrapper::new(ModulationConfig::new(freq));
        let range = freq.unambiguous_range_mm();
        for step in 0..1000 {
            let phase = TAU * step as f64 / 1000.0;
            let d = unwrapper.distance_of(phase, 0.0);
            assert!(d >= 0.0 && d < range, "{freq}: phase {phase} gave {d}");
        }
    }
}

#[test]
fn distance_stays_in_range_with_offsets() {
    let unwrapper = PhaseUnwrapper::new(ModulationConfig::new(ModulationFrequency::Mhz20));
    for offset in [-7000.0, -3750.0, -1.0, 0.0, 250.0, 3750.0, 7499.0] {
        for step in 0..200 {
            let phase = TAU * step as f64 / 200.0;
            let d = unwrapper.distance_of(phase, offset);
            assert!((0.0..7500.0).contains(&d), "offset {offset}, phase {phase} gave {d}");
        }
    }
}

#[test]
fn synthetic_quadruple_reproduces_phase() {
    for step in 1..64 {
        let phi = TAU * step as f64 / 64.0;
        let [d0, d1, d2, d3] = quadruple_for_phase(phi);
        let recovered = PhaseUnwrapper::phase_of(d0, d1, d2, d3);
        assert!(angle_diff(recovered, phi).abs() < 1e-3, "phi {phi} recovered as {recovered}");
    }
}

#[test]
fn concrete_scenario_twenty_megahertz() {
    let unwrapper = PhaseUnwrapper::new(ModulationConfig::from_megahertz(20.0).unwrap());
    let out = unwrapper.unwrap(&uniform_frame(4, 3, [100, 100, 200, 200])).unwrap();

    let phase = out.phase.get(1, 2) as f64;
    assert!((phase - 3.927).abs() < 1e-3);
    assert!((out.distance.get(1, 2) - 4687.5).abs() < 1e-2);
    assert!((out.amplitude.get(1, 2) - 70.71).abs() < 1e-2);
}

#[test]
fn equal_pairs_give_half_range_for_every_frequency() {
    for freq in ModulationFrequency::ALL {
        let unwrapper = PhaseUnwrapper::new(ModulationConfig::new(freq));
        let out = unwrapper.unwrap(&uniform_frame(2, 2, [512, 900, 512, 900])).unwrap();
        let half = (freq.unambiguous_range_mm() / 2.0) as f32;
        assert_eq!(out.distance.get(0, 1), half);
    }
}

#[test]
fn transposed_orientation_is_kept_per_pixel() {
    // one distinctive pixel at acquisition (col 4, row 1)
    let mut planes: [Grid<u16>; 4] = std::array::from_fn(|_| Grid::filled(6, 2, 1000));
    planes[2].set(4, 1, 1500);
    let frame = RawFrame::new(planes).unwrap();

    let out = PhaseUnwrapper::new(ModulationConfig::new(ModulationFrequency::Mhz20))
        .unwrap(&frame)
        .unwrap();
    assert_eq!(out.amplitude.dims(), (2, 6));
    assert_eq!(out.amplitude.get(1, 4), 250.0);
    assert_eq!(out.amplitude.get(0, 4), 0.0);
}

#[test]
fn offset_and_polynomial_correction_apply_in_order() {
    // phase pi => 3750, +100 offset => 3850, correction: -50 => 3800, then - (0.5 * 3800)
    let unwrapper = PhaseUnwrapper::new(ModulationConfig::new(ModulationFrequency::Mhz20))
        .with_offset(DistanceOffset::Scalar(100.0))
        .with_correction(DistanceCorrection {
            offset_mm: 50.0,
            error_polynomial: vec![0.5, 0.0],
        });
    let out = unwrapper.unwrap(&uniform_frame(1, 1, [7, 7, 7, 7])).unwrap();
    assert!((out.distance.get(0, 0) - 1900.0).abs() < 1e-2);
}

#[test]
fn unknown_frequency_fails_fast() {
    assert!(matches!(
        ModulationConfig::from_megahertz(15.0),
        Err(ConfigError::UnknownFrequency(f)) if f == 15.0
    ));
}

#[test]
fn dump_round_trips_through_reader() {
    let a = uniform_frame(8, 3, quadruple_for_phase(1.0));
    let b = uniform_frame(8, 3, quadruple_for_phase(4.0));
    let mut bytes = encode_frame(&a);
    bytes.extend(encode_frame(&b));

    // sensor is 3 rows x 8 cols, acquisition grids are 8 x 3
    let frames = decode_stream(&bytes, 3, 8).unwrap();
    assert_eq!(frames, vec![a.clone(), b.clone()]);

    let mut reader = ReplayReader::new(std::io::Cursor::new(bytes), 3, 8);
    assert_eq!(reader.read_frame().unwrap(), Some(a));
    assert_eq!(reader.read_frame().unwrap(), Some(b));
    assert_eq!(reader.read_frame().unwrap(), None);
}
