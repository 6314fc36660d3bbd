//! Integration tests for plexus-cli.
//!
//! Runs the `plexus` binary against graph documents and settings files in a
//! temporary directory. Nothing here opens an audio device.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use plexus_io::{AudioBuffer, WavSpec, read_wav, write_wav};
use tempfile::TempDir;

/// Helper to get the path to the `plexus` binary built by cargo.
fn plexus_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_plexus"))
}

/// Input → gain (0.5, saved state) → output, stereo.
const GAIN_GRAPH: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<graph>
  <node uid="0" x="0" y="0" uiLastX="0" uiLastY="0">
    <plugin name="Audio Input" format="Internal" identifier="audio.input" numInputs="0" numOutputs="2"/>
  </node>
  <node uid="1" x="100" y="0" uiLastX="0" uiLastY="0">
    <plugin name="Gain" format="Internal" identifier="util.gain" numInputs="2" numOutputs="2"/>
    <state>AQAAAAQAAAAAAAA/</state>
  </node>
  <node uid="2" x="200" y="0" uiLastX="0" uiLastY="0">
    <plugin name="Audio Output" format="Internal" identifier="audio.output" numInputs="2" numOutputs="0"/>
  </node>
  <arc source-block="0" source-port="0" dest-block="1" dest-port="0"/>
  <arc source-block="0" source-port="1" dest-block="1" dest-port="1"/>
  <arc source-block="1" source-port="2" dest-block="2" dest-port="0"/>
  <arc source-block="1" source-port="3" dest-block="2" dest-port="1"/>
</graph>
"#;

/// Two gains feeding each other.
const CYCLIC_GRAPH: &str = r#"<graph>
  <node uid="1"><plugin name="Gain" format="Internal" identifier="util.gain"/></node>
  <node uid="2"><plugin name="Gain" format="Internal" identifier="util.gain"/></node>
  <arc source-block="1" source-port="2" dest-block="2" dest-port="0"/>
  <arc source-block="2" source-port="2" dest-block="1" dest-port="0"/>
</graph>
"#;

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

/// Runs with an isolated settings file so the user's config is never read.
fn run(dir: &TempDir, args: &[&str]) -> Output {
    let config = dir.path().join("engine.toml");
    plexus_bin()
        .arg("--config")
        .arg(&config)
        .args(args)
        .output()
        .expect("failed to run plexus")
}

fn init_config(dir: &TempDir) {
    let output = run(dir, &["config", "init"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

// ---------------------------------------------------------------------------
// plexus config
// ---------------------------------------------------------------------------

#[test]
fn cli_config_init_show_and_refuse_overwrite() {
    let dir = TempDir::new().unwrap();
    init_config(&dir);
    assert!(dir.path().join("engine.toml").is_file());

    let output = run(&dir, &["config", "show"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("sample_rate = 48000"), "got: {stdout}");
    assert!(stdout.contains("[device]"), "got: {stdout}");

    let output = run(&dir, &["config", "init"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("already exists"));

    assert!(run(&dir, &["config", "init", "--force"]).status.success());
}

#[test]
fn cli_config_path_echoes_override() {
    let dir = TempDir::new().unwrap();
    let output = run(&dir, &["config", "path"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("engine.toml"));
}

#[test]
fn cli_rejects_invalid_settings() {
    let dir = TempDir::new().unwrap();
    write(&dir, "engine.toml", "block_size = 0\n");
    let output = run(&dir, &["config", "show"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("block_size"));
}

// ---------------------------------------------------------------------------
// plexus check
// ---------------------------------------------------------------------------

#[test]
fn cli_check_prints_execution_order() {
    let dir = TempDir::new().unwrap();
    init_config(&dir);
    let graph = write(&dir, "gain.xml", GAIN_GRAPH);

    let output = run(&dir, &["check", path_str(&graph), "--strict"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("3 node(s), 4 arc(s)"), "got: {stdout}");
    assert!(stdout.contains("Internal/util.gain"), "got: {stdout}");
    assert!(stdout.contains("Execution order: 0 -> 1 -> 2"), "got: {stdout}");
}

#[test]
fn cli_check_fails_on_cycle() {
    let dir = TempDir::new().unwrap();
    init_config(&dir);
    let graph = write(&dir, "cycle.xml", CYCLIC_GRAPH);

    let output = run(&dir, &["check", path_str(&graph)]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("cycle"));
}

#[test]
fn cli_check_strict_fails_on_skipped_node() {
    let dir = TempDir::new().unwrap();
    init_config(&dir);
    let broken = GAIN_GRAPH.replace("util.gain", "util.missing");
    let graph = write(&dir, "broken.xml", &broken);

    let output = run(&dir, &["check", path_str(&graph)]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("warning: node 1"));

    let output = run(&dir, &["check", path_str(&graph), "--strict"]);
    assert!(!output.status.success());
}

#[test]
fn cli_check_missing_graph() {
    let dir = TempDir::new().unwrap();
    init_config(&dir);
    let output = run(&dir, &["check", "no_such_graph_12345"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("not found"));
}

// ---------------------------------------------------------------------------
// plexus render
// ---------------------------------------------------------------------------

#[test]
fn cli_render_applies_saved_gain() {
    let dir = TempDir::new().unwrap();
    init_config(&dir);
    let graph = write(&dir, "gain.xml", GAIN_GRAPH);
    let input = dir.path().join("in.wav");
    let output_wav = dir.path().join("out.wav");

    let source = AudioBuffer::from_channels(vec![vec![0.8; 4800]; 2]);
    write_wav(&input, &source, WavSpec::default()).unwrap();

    let output = run(
        &dir,
        &[
            "render",
            path_str(&graph),
            "--input",
            path_str(&input),
            "-o",
            path_str(&output_wav),
        ],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let (rendered, spec) = read_wav(&output_wav).unwrap();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, 48000);
    assert_eq!(rendered.frames(), 4800);
    for ch in 0..2 {
        assert!(rendered.channel(ch).iter().all(|s| (s - 0.4).abs() < 1e-6));
    }
}

#[test]
fn cli_render_silence_for_requested_length() {
    let dir = TempDir::new().unwrap();
    init_config(&dir);
    let graph = write(&dir, "gain.xml", GAIN_GRAPH);
    let output_wav = dir.path().join("silence.wav");

    let output = run(
        &dir,
        &[
            "render",
            path_str(&graph),
            "--seconds",
            "0.25",
            "--bit-depth",
            "16",
            "-o",
            path_str(&output_wav),
        ],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let (rendered, spec) = read_wav(&output_wav).unwrap();
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(rendered.frames(), 12000);
    assert!(rendered.channel(0).iter().all(|&s| s == 0.0));
}

#[test]
fn cli_render_rejects_bad_bit_depth() {
    let dir = TempDir::new().unwrap();
    let graph = write(&dir, "gain.xml", GAIN_GRAPH);
    let output = run(
        &dir,
        &["render", path_str(&graph), "--bit-depth", "12", "-o", "x.wav"],
    );
    assert!(!output.status.success());
}
