mod common;

use approx::assert_abs_diff_eq;
use common::synthetic::{loop_pixel, scan, LoopShape};
use sspfm_toolbox::cluster::{cluster_rows, ClusterOptions};
use sspfm_toolbox::config::LoopChannel;
use sspfm_toolbox::pipeline::{mode_vectors, run, PipelineOptions};
use sspfm_toolbox::segments::MemorySource;
use sspfm_toolbox::{Grid, Mode, SspfmError};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn shapes(shifts: &[f64]) -> Vec<LoopShape> {
    shifts
        .iter()
        .map(|&shift| LoopShape {
            shift,
            ..Default::default()
        })
        .collect()
}

#[test]
fn pipeline_recovers_loop_geometry() {
    init_logger();
    let shifts = [0.0, 0.5, -0.5, 0.25, -0.25, 0.0];
    let source = MemorySource::new(scan(&shapes(&shifts)));
    let grid = Grid::new(3, 2);
    let out = run(&source, &grid, &PipelineOptions::default()).expect("pipeline");

    for mode in [Mode::Off, Mode::On, Mode::Coupled, Mode::Other] {
        assert!(out.bundle.table(mode).is_some(), "missing {mode} table");
    }
    let imprint = out.bundle.get(Mode::Off, "imprint").expect("imprint");
    let window = out.bundle.get(Mode::Off, "memory_window").expect("window");
    let r2 = out.bundle.get(Mode::Off, "r_square").expect("r2");
    for (i, shift) in shifts.iter().enumerate() {
        assert_abs_diff_eq!(imprint[i], *shift, epsilon = 1e-2);
        assert_abs_diff_eq!(window[i].abs(), 3.0, epsilon = 2e-2);
        assert!(r2[i] > 0.999, "pixel {i}: r2 = {}", r2[i]);
    }

    let diff_slope = out.bundle.get(Mode::Coupled, "diff_slope").expect("diff slope");
    assert!(diff_slope.iter().all(|s| (s - 0.05).abs() < 1e-6));
    let deflection = out.bundle.get(Mode::Other, "deflection").expect("deflection");
    assert_abs_diff_eq!(deflection[0], 1.0, epsilon = 1e-9);

    assert_eq!(out.report.measured_pixels, 6);
    assert_eq!(out.report.stage("read", None).map(|s| s.failed), Some(0));
    assert_eq!(out.best_loops[&Mode::Off].len(), 6);
    assert!(out.curves.iter().all(Option::is_some));
}

#[test]
fn unreadable_and_missing_pixels_become_nan_rows() {
    init_logger();
    let shape = LoopShape::default();
    let pixels = vec![
        Some(loop_pixel(0, &shape)),
        None,
        Some(loop_pixel(2, &shape)),
        Some(loop_pixel(3, &shape)),
        Some(loop_pixel(4, &shape)),
    ];
    let source = MemorySource::with_gaps(pixels);
    let out = run(&source, &Grid::new(3, 2), &PipelineOptions::default()).expect("pipeline");

    let coer = out.bundle.get(Mode::Off, "x_coer_p").expect("x_coer_p");
    assert_eq!(coer.len(), 6);
    assert!(coer[1].is_nan());
    assert!(coer[5].is_nan());
    assert!(coer[0].is_finite() && coer[4].is_finite());
    assert_eq!(out.report.measured_pixels, 4);
    let read = out.report.stage("read", None).expect("read stage");
    assert_eq!((read.processed, read.failed), (5, 1));
    assert_eq!(read.failures[0].0, 1);
}

#[test]
fn oversized_scan_is_a_geometry_error() {
    let source = MemorySource::new(scan(&shapes(&[0.0; 5])));
    let err = run(&source, &Grid::new(2, 2), &PipelineOptions::default()).unwrap_err();
    assert!(matches!(err, SspfmError::Geometry(_)));
}

#[test]
fn multi_cycle_pixels_average_or_pick_per_read() {
    init_logger();
    let shape = LoopShape {
        cycles: 3,
        ..Default::default()
    };
    let source = MemorySource::new(vec![loop_pixel(0, &shape)]);
    let mut opts = PipelineOptions {
        del_1st_loop: true,
        ..Default::default()
    };
    let out = run(&source, &Grid::new(1, 1), &opts).expect("mean loop");
    assert_eq!(out.best_loops[&Mode::Off][0].len(), 1);

    opts.analysis_mode = sspfm_toolbox::best_loop::AnalysisMode::MultiLoop;
    let out = run(&source, &Grid::new(1, 1), &opts).expect("multi loop");
    assert_eq!(out.best_loops[&Mode::Off][0].len(), 1);
    assert!(out.bundle.get(Mode::Off, "r_square").expect("r2")[0] > 0.999);
}

#[cfg(feature = "parallel")]
#[test]
fn parallel_run_matches_sequential() {
    init_logger();
    let shifts: Vec<f64> = (0..12).map(|i| 0.1 * i as f64 - 0.6).collect();
    let source = MemorySource::new(scan(&shapes(&shifts)));
    let grid = Grid::new(4, 3);
    let seq = run(&source, &grid, &PipelineOptions::default()).expect("sequential");
    let par_opts = PipelineOptions {
        multi_processing: true,
        workers: Some(3),
        ..Default::default()
    };
    let par = run(&source, &grid, &par_opts).expect("parallel");
    assert!(seq.bundle.same_as(&par.bundle));
}

#[test]
fn loops_cluster_by_imprint() {
    init_logger();
    let shifts = [-1.0, -1.0, 1.0, -1.0, 1.0, 1.0];
    let source = MemorySource::new(scan(&shapes(&shifts)));
    let out = run(&source, &Grid::new(3, 2), &PipelineOptions::default()).expect("pipeline");

    let opts = ClusterOptions {
        n_clusters: 2,
        ..Default::default()
    };
    let vectors = mode_vectors(&out, Mode::Off, &[LoopChannel::Piezorep], false, false);
    assert_eq!(vectors.x.len(), 42);
    let res = cluster_rows(Mode::Off, &vectors.features, &vectors.raw, &opts).expect("cluster");
    let labels: Vec<usize> = res.labels.iter().map(|l| l.expect("label")).collect();
    assert_eq!(labels, vec![0, 0, 1, 0, 1, 1]);
    assert_eq!(res.averages.len(), 2);

    let coupled = mode_vectors(&out, Mode::Coupled, &[LoopChannel::Piezorep], false, true);
    assert_eq!(coupled.features.len(), 6);

    let curves = mode_vectors(&out, Mode::Other, &[], false, false);
    assert_eq!(curves.features.len(), 6);
    assert!(curves.features.iter().all(|r| r.len() == 84));
}
