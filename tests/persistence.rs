mod common;

use common::synthetic::{scan, LoopShape};
use sspfm_toolbox::cluster::{cluster_rows, ClusterOptions};
use sspfm_toolbox::pipeline::{run, PipelineOptions};
use sspfm_toolbox::properties::io::{
    best_loops_file, properties_file, read_bundle, write_best_loops, write_bundle,
    write_cluster_labels, LoopRows,
};
use sspfm_toolbox::segments::MemorySource;
use sspfm_toolbox::{Grid, Mode};
use std::fs;

#[test]
fn property_tables_survive_a_round_trip() {
    let _ = env_logger::builder().is_test(true).try_init();
    let shapes: Vec<LoopShape> = [0.0, 0.3, -0.3, 0.6, -0.6]
        .iter()
        .map(|&shift| LoopShape {
            shift,
            ..Default::default()
        })
        .collect();
    let source = MemorySource::new(scan(&shapes));
    let grid = Grid::new(3, 2).with_microns(1.5, 1.0);
    let out = run(&source, &grid, &PipelineOptions::default()).expect("pipeline");

    let dir = tempfile::tempdir().expect("tempdir");
    let written = write_bundle(dir.path(), &out.bundle).expect("write");
    assert_eq!(written.len(), 4);

    let text = fs::read_to_string(properties_file(dir.path(), Mode::Off)).expect("read");
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("off"));
    assert_eq!(lines.next(), Some("x pix=3, y pix=2, x mic=1.5, y mic=1"));
    assert!(lines.next().expect("names").starts_with("x_coer_p\t\tx_coer_m"));
    assert_eq!(lines.count(), 6);

    let back = read_bundle(dir.path()).expect("read bundle");
    assert!(back.same_as(&out.bundle));
    assert_eq!(back.grid.lx_um, Some(1.5));
}

#[test]
fn best_loops_and_labels_have_documented_headers() {
    let grid = Grid::new(2, 2);
    let dir = tempfile::tempdir().expect("tempdir");

    let volts = [-1.0, 0.0, 1.0];
    let piezo = [-0.5, 0.0, 0.5];
    let rows: Vec<LoopRows<'_>> = vec![(0, &volts[..], &piezo[..]), (2, &volts[..], &piezo[..])];
    let path = best_loops_file(dir.path(), Mode::On);
    write_best_loops(&path, Mode::On, &rows).expect("write loops");
    let text = fs::read_to_string(&path).expect("read loops");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "on");
    assert_eq!(lines[1], "index pix\tvoltage\tpiezoresponse");
    assert_eq!(lines[2], "0\t-1\t-0.5");
    assert_eq!(lines.len(), 8);

    let features = vec![vec![0.0], vec![f64::NAN], vec![5.0], vec![5.1]];
    let opts = ClusterOptions {
        n_clusters: 2,
        ..Default::default()
    };
    let assignment = cluster_rows(Mode::Other, &features, &features, &opts).expect("cluster");
    let label_path = dir.path().join("labels_other.txt");
    write_cluster_labels(&label_path, &grid, &assignment).expect("write labels");
    let text = fs::read_to_string(&label_path).expect("read labels");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "other");
    assert_eq!(lines[2], "force_curve");
    assert_eq!(&lines[3..], &["1", "nan", "0", "0"]);
}
