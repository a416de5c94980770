use approx::assert_abs_diff_eq;
use sspfm_toolbox::angle::circular_distance;
use sspfm_toolbox::cluster::{cluster_rows, ClusterOptions};
use sspfm_toolbox::geometry::{de_serpentine, flatten, serpentine_map, Mask};
use sspfm_toolbox::hysteresis::{fit_branches, FitMethod, FitModel, HysteresisOptions};
use sspfm_toolbox::map::{build_map, masked_correlation, MapOptions};
use sspfm_toolbox::phase::{PhaseCalibration, PhaseCorrection, PhaseOptions};
use sspfm_toolbox::types::{Grid, Mode};

#[test]
fn serpentine_square_and_back() {
    let grid = Grid::new(2, 2);
    let map = serpentine_map(&[1.0, 2.0, 3.0, 4.0], &grid);
    // Bottom row first.
    assert_eq!((map.get(0, 1), map.get(1, 1)), (1.0, 2.0));
    assert_eq!((map.get(0, 0), map.get(1, 0)), (4.0, 3.0));
    assert_eq!(flatten(&de_serpentine(&map)), vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn trailing_missing_pixel_is_filled_along_its_row() {
    let grid = Grid::new(3, 2);
    let art = build_map(
        &[10.0, 20.0, 30.0, 40.0, 50.0],
        &grid,
        &Mask::empty(),
        &MapOptions::default(),
    )
    .expect("map");
    assert_eq!(
        (art.raw.get(0, 1), art.raw.get(1, 1), art.raw.get(2, 1)),
        (10.0, 20.0, 30.0)
    );
    assert!(art.raw.get(0, 0).is_nan());
    assert_eq!((art.raw.get(1, 0), art.raw.get(2, 0)), (50.0, 40.0));
    assert_abs_diff_eq!(art.filled.get(0, 0), 45.0, epsilon = 1e-9);
}

#[test]
fn affine_calibration_moves_peaks_onto_targets() {
    let opts = PhaseOptions {
        pha_fwd: 0.0,
        pha_rev: 180.0,
        correction: PhaseCorrection::Affine,
        ..Default::default()
    };
    // Two pixels, each with one sample cloud per polarization state.
    let mut samples = Vec::new();
    for jitter in [-0.4, 0.4] {
        samples.extend(std::iter::repeat(10.0 + jitter).take(15));
        samples.extend(std::iter::repeat(195.0 + jitter).take(15));
    }
    let cal = PhaseCalibration::from_samples(&samples, &opts);
    assert!(circular_distance(cal.apply(10.0), 0.0) < 0.5);
    assert!(circular_distance(cal.apply(195.0), 180.0) < 0.5);
}

#[test]
fn symmetric_tanh_loop_fits_at_the_origin() {
    let v: Vec<f64> = (0..41).map(|i| -4.0 + 0.2 * i as f64).collect();
    let y: Vec<f64> = v.iter().map(|v| (2.0 * v).tanh()).collect();
    let down_v: Vec<f64> = v.iter().rev().copied().collect();
    let down_y: Vec<f64> = y.iter().rev().copied().collect();
    let opts = HysteresisOptions {
        model: FitModel::Sigmoid,
        method: FitMethod::LeastSquare,
        ..Default::default()
    };
    let fit = fit_branches((&v, &y), (&down_v, &down_y), &opts).expect("fit");
    let props = fit.properties(&opts.thresholds);
    assert_abs_diff_eq!(props.x_coer_p, 0.0, epsilon = 1e-3);
    assert_abs_diff_eq!(props.x_coer_m, 0.0, epsilon = 1e-3);
    assert_abs_diff_eq!(props.area, 0.0, epsilon = 1e-3);
    assert!(fit.r_square >= 0.999, "r2 = {}", fit.r_square);
}

#[test]
fn two_pairs_cluster_with_first_seen_reference() {
    let rows = vec![
        vec![0.0, 0.0],
        vec![0.0, 0.0],
        vec![10.0, 10.0],
        vec![10.0, 10.0],
    ];
    let opts = ClusterOptions {
        n_clusters: 2,
        ..Default::default()
    };
    let res = cluster_rows(Mode::Off, &rows, &rows, &opts).expect("cluster");
    assert_eq!(res.labels, vec![Some(0), Some(0), Some(1), Some(1)]);
    assert_eq!(res.info[0].name, "A");
    assert_eq!(res.info[0].population, 2);
    assert_eq!(res.info[1].population, 2);
    assert_abs_diff_eq!(res.info[0].nearest_distance, 200f64.sqrt(), epsilon = 1e-12);
}

#[test]
fn correlation_of_identical_and_negated_maps() {
    let a: Vec<f64> = vec![1.0, 4.0, 2.0, 8.0, 5.0, 7.0, 3.0, 9.0, 6.0];
    let mask = Mask::from_indices([3]);
    assert_abs_diff_eq!(masked_correlation(&a, &a, &mask), 1.0, epsilon = 1e-12);
    let neg: Vec<f64> = a.iter().map(|v| -v).collect();
    assert_abs_diff_eq!(masked_correlation(&a, &neg, &mask), -1.0, epsilon = 1e-12);
}
