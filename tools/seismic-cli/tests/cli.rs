// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::tempdir;

fn cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_st-seismic-cli"))
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("SPIRAL_SEISMIC_CONFIG")
        .env_remove("SPIRAL_SEISMIC_RUN")
        .env_remove("SPIRAL_TRACE_CHROME")
        .output()
        .unwrap()
}

fn run_ok(args: &[&str]) -> Output {
    let output = cli(args);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

fn synth(dir: &Path) -> String {
    let out = dir.to_str().unwrap();
    let output = run_ok(&["synth", "--output", out, "--shape", "10,10,20", "--kind", "dip"]);
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn run_writes_attributes_and_report() {
    let dir = tempdir().unwrap();
    let input = synth(dir.path());
    let out = dir.path().join("attrs");

    run_ok(&[
        "run",
        "--input",
        &input,
        "--output",
        out.to_str().unwrap(),
        "--iline",
        "2:8",
        "--norm",
        "z",
        "--z-window",
        "5",
        "--patch",
        "3,3,5",
        "--attributes",
        "coherence,curvature",
        "--curvature",
        "kpos,kneg,mean",
    ]);

    let report = read_json(&out.join("report.json"));
    assert_eq!(report["geometry"]["cropped_shape"], serde_json::json!([6, 10, 20]));
    assert_eq!(report["geometry"]["inline_range"], "2:8");
    assert_eq!(report["normalization"]["mode"], "z");
    assert_eq!(report["load_path"], "bulk");
    assert_eq!(report["outputs"].as_array().unwrap().len(), 4);

    let coherence = read_json(&out.join("coherence.json"));
    assert_eq!(coherence["shape"], serde_json::json!([6, 10, 20]));
    assert_eq!(coherence["format"], 5);
    let bytes = fs::metadata(out.join("curvature_mean.bin")).unwrap().len();
    assert_eq!(bytes, 6 * 10 * 20 * 4);
}

#[test]
fn invalid_range_fails_before_any_io() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("never");
    let output = cli(&[
        "run",
        "--input",
        dir.path().join("missing.json").to_str().unwrap(),
        "--output",
        out.to_str().unwrap(),
        "--iline",
        "5:5",
    ]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.starts_with("error:"), "{stderr}");
    assert!(stderr.contains("5:5"), "{stderr}");
    assert!(!out.exists());
}

#[test]
fn unknown_curvature_variant_is_rejected() {
    let dir = tempdir().unwrap();
    let input = synth(dir.path());
    let output = cli(&[
        "run",
        "--input",
        &input,
        "--output",
        dir.path().join("attrs").to_str().unwrap(),
        "--curvature",
        "shape-index",
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("shape-index"));
    assert!(!dir.path().join("attrs").exists());
}

#[test]
fn options_for_an_unselected_attribute_are_rejected() {
    let dir = tempdir().unwrap();
    let input = synth(dir.path());
    let out = dir.path().join("attrs");
    for (flag, value, attributes) in [
        ("--curvature", "mean", "coherence"),
        ("--patch", "3,3,3", "curvature"),
    ] {
        let output = cli(&[
            "run",
            "--input",
            &input,
            "--output",
            out.to_str().unwrap(),
            "--attributes",
            attributes,
            flag,
            value,
        ]);
        assert_eq!(output.status.code(), Some(1));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.starts_with("error:"), "{stderr}");
        assert!(stderr.contains(flag), "{stderr}");
    }
    assert!(!out.exists());
}

#[test]
fn flags_override_the_config_file() {
    let dir = tempdir().unwrap();
    let input = synth(dir.path());
    let config = dir.path().join("run.toml");
    fs::write(
        &config,
        concat!(
            "[pipeline]\ncoherence = \"3,3,3\"\n\n",
            "[pipeline.normalize]\nmode = \"trace\"\nz_window = 7\n",
        ),
    )
    .unwrap();
    let out = dir.path().join("attrs");
    let report_path = dir.path().join("reports").join("run.json");

    run_ok(&[
        "run",
        "--input",
        &input,
        "--output",
        out.to_str().unwrap(),
        "--config",
        config.to_str().unwrap(),
        "--norm",
        "none",
        "--memory-budget",
        "0",
        "--report",
        report_path.to_str().unwrap(),
    ]);

    let report = read_json(&report_path);
    assert_eq!(report["normalization"]["mode"], "none");
    assert_eq!(report["normalization"]["z_window"], 7);
    assert_eq!(report["coherence"]["size"], "3,3,3");
    assert_eq!(report["load_path"], "incremental");
    assert!(report.get("curvature").is_none());
    assert!(!out.join("report.json").exists());
}
