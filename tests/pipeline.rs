use std::{fs, path::PathBuf, process::Command};

fn run_bin(args: &[&str]) {
    let bin = PathBuf::from(env!("CARGO_BIN_EXE_scrsim"));

    let output = Command::new(bin)
        .args(args)
        .output()
        .expect("failed to execute command");

    let stdout_str =
        std::str::from_utf8(&output.stdout).expect("failed to convert stdout to string");
    let stderr_str =
        std::str::from_utf8(&output.stderr).expect("failed to convert stderr to string");

    assert!(
        output.status.success(),
        "failed to run binary with {args:?}\nstdout:\n{stdout_str}\nstderr:\n{stderr_str}\n"
    );
}

#[test]
fn basic_workflow() {
    let test_dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("basic_workflow");

    fs::remove_dir_all(&test_dir).ok();
    fs::create_dir_all(&test_dir).expect("failed to create test directory");

    // 20x20 covariate raster with a smooth pattern in [0, 1].
    let mut covariate = String::new();
    for r in 0..20 {
        let row: Vec<String> = (0..20)
            .map(|c| {
                let z = 0.5 + 0.5 * (r as f64 * 0.7).sin() * (c as f64 * 0.4).cos();
                format!("{z:.6}")
            })
            .collect();
        covariate.push_str(&row.join(" "));
        covariate.push('\n');
    }
    fs::write(test_dir.join("covariate.txt"), covariate).expect("failed to write covariate file");

    // 4x4 trap grid centered in the 3x3-unit extent.
    let mut traps = String::new();
    for i in 0..4 {
        for j in 0..4 {
            let x = 1.5 + (i as f64 - 1.5) * 0.3;
            let y = 1.5 + (j as f64 - 1.5) * 0.3;
            traps.push_str(&format!("{x} {y}\n"));
        }
    }
    fs::write(test_dir.join("traps.txt"), traps).expect("failed to write traps file");

    let config_contents = String::new()
        + "[landscape]\n"
        + "covariate = \"covariate.txt\"\n"
        + "resolution = 0.15\n"
        + "\n"
        + "[design]\n"
        + "traps = \"traps.txt\"\n"
        + "occasions = 5\n"
        + "adjacency = 8\n"
        + "\n"
        + "[fit]\n"
        + "start = [ -2.0, -1.2, 3.0, -0.7,]\n"
        + "max_iters = 50\n"
        + "\n"
        + "[[scenario]]\n"
        + "theta = 0.3\n"
        + "alpha2 = 0.5\n"
        + "n = 60\n"
        + "seed = 7\n";

    fs::write(test_dir.join("config.toml"), config_contents).expect("failed to write config file");

    let test_dir_str = test_dir
        .to_str()
        .expect("failed to convert test directory to string");

    run_bin(&["--sim-dir", test_dir_str, "run"]);

    let scenario_dir = test_dir.join("scenario-0000");
    for name in [
        "activity_centers.txt",
        "detections.txt",
        "density.txt",
        "pc.txt",
        "dwc.txt",
        "connectivity.txt",
        "result.msgpack",
    ] {
        assert!(
            scenario_dir.join(name).is_file(),
            "missing output file {name}"
        );
    }
    assert!(test_dir.join("summary.json").is_file());

    // The density vector has one value per grid cell.
    let density = fs::read_to_string(scenario_dir.join("density.txt"))
        .expect("failed to read density file");
    assert_eq!(density.lines().count(), 400);

    // Rerunning a single scenario overwrites its outputs in place.
    run_bin(&["--sim-dir", test_dir_str, "scenario", "--idx", "0"]);
    assert!(scenario_dir.join("density.txt").is_file());

    run_bin(&["--sim-dir", test_dir_str, "clean"]);
    assert!(!scenario_dir.exists());
    assert!(!test_dir.join("summary.json").exists());

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn failing_scenario_does_not_block_the_rest() {
    let test_dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("scenario_isolation");

    fs::remove_dir_all(&test_dir).ok();
    fs::create_dir_all(&test_dir).expect("failed to create test directory");

    let mut covariate = String::new();
    for r in 0..12 {
        let row: Vec<String> = (0..12)
            .map(|c| {
                let z = 0.5 + 0.5 * (r as f64 * 0.7).sin() * (c as f64 * 0.4).cos();
                format!("{z:.6}")
            })
            .collect();
        covariate.push_str(&row.join(" "));
        covariate.push('\n');
    }
    fs::write(test_dir.join("covariate.txt"), covariate).expect("failed to write covariate file");

    let mut traps = String::new();
    for i in 0..3 {
        for j in 0..3 {
            let x = 0.9 + (i as f64 - 1.0) * 0.3;
            let y = 0.9 + (j as f64 - 1.0) * 0.3;
            traps.push_str(&format!("{x} {y}\n"));
        }
    }
    fs::write(test_dir.join("traps.txt"), traps).expect("failed to write traps file");

    // The first scenario's resistance exponent overflows the cost surface,
    // so it fails at build time; the second is well-posed.
    let config_contents = String::new()
        + "[landscape]\n"
        + "covariate = \"covariate.txt\"\n"
        + "resolution = 0.15\n"
        + "\n"
        + "[design]\n"
        + "traps = \"traps.txt\"\n"
        + "occasions = 5\n"
        + "adjacency = 8\n"
        + "\n"
        + "[fit]\n"
        + "start = [ -2.0, -1.2, 2.5, -0.7,]\n"
        + "max_iters = 30\n"
        + "\n"
        + "[[scenario]]\n"
        + "theta = 0.3\n"
        + "alpha2 = 2000.0\n"
        + "n = 40\n"
        + "seed = 3\n"
        + "\n"
        + "[[scenario]]\n"
        + "theta = 0.3\n"
        + "alpha2 = 0.5\n"
        + "n = 40\n"
        + "seed = 5\n";

    fs::write(test_dir.join("config.toml"), config_contents).expect("failed to write config file");

    let test_dir_str = test_dir
        .to_str()
        .expect("failed to convert test directory to string");

    // Exits successfully as long as at least one scenario ran.
    run_bin(&["--sim-dir", test_dir_str, "run"]);

    assert!(!test_dir.join("scenario-0000").exists());
    assert!(test_dir.join("scenario-0001").join("density.txt").is_file());

    let summary = fs::read_to_string(test_dir.join("summary.json"))
        .expect("failed to read summary file");
    let summary: serde_json::Value =
        serde_json::from_str(&summary).expect("failed to parse summary file");
    let reports = summary.as_array().expect("summary is not an array");
    assert_eq!(reports.len(), 2);
    assert!(reports[0]["error"].is_string());
    assert!(reports[1]["error"].is_null());
    assert!(reports[1]["population"].is_number());

    fs::remove_dir_all(&test_dir).ok();
}
