//! Integration tests for vdsattr

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use serde_json::{json, Value};
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// Command isolated from the user's configuration
    fn vdsattr(dir: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("vdsattr");
        cmd.env("VDSATTR_CONFIG", dir.path().join("config.toml"))
            .env_remove("VDSATTR_CACHE_SIZE")
            .env_remove("VDSATTR_TOKEN");
        cmd
    }

    /// 2 x 2 x 10 volume, voxel value 100 * il + 10 * xl + s
    fn write_volume(dir: &TempDir) -> String {
        let mut data = Vec::new();
        for il in 0..2 {
            for xl in 0..2 {
                for s in 0..10 {
                    data.push((100 * il + 10 * xl + s) as f32);
                }
            }
        }
        let volume = json!({
            "iline": {"min": 1.0, "stride": 1.0, "nsamples": 2},
            "xline": {"min": 10.0, "stride": 1.0, "nsamples": 2},
            "sample": {"min": 0.0, "stride": 4.0, "nsamples": 10},
            "plane": {"xori": 0.0, "yori": 0.0, "xinc": 1.0, "yinc": 1.0, "rotation": 0.0},
            "data": data,
        });
        let path = dir.path().join("volume.json");
        std::fs::write(&path, volume.to_string()).unwrap();
        format!("file://{}", path.display())
    }

    fn surface(values: Value) -> Value {
        json!({
            "values": values,
            "rotation": 0.0,
            "xori": 0.0,
            "yori": 0.0,
            "xinc": 1.0,
            "yinc": 1.0,
        })
    }

    fn write_request(dir: &TempDir, name: &str, request: &Value) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, request.to_string()).unwrap();
        path
    }

    fn along_request(url: &str, sas: &str, depth: f32) -> Value {
        json!({
            "vds": url,
            "sas": sas,
            "interpolation": "nearest",
            "stepsize": 4.0,
            "attributes": ["min", "max"],
            "above": 4.0,
            "below": 4.0,
            "surface": surface(json!([[depth, depth], [depth, depth]])),
        })
    }

    fn run_json(dir: &TempDir, args: &[&str], requests: &[&Path]) -> Value {
        let output = vdsattr(dir)
            .args(args)
            .args(requests)
            .args(["--format", "json"])
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).unwrap()
    }

    #[test]
    fn help_displays() {
        let dir = TempDir::new().unwrap();
        vdsattr(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Attribute maps over volumetric seismic data"));
    }

    #[test]
    fn version_displays() {
        let dir = TempDir::new().unwrap();
        vdsattr(&dir)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("vdsattr"));
    }

    #[test]
    fn along_computes_known_values() {
        let dir = TempDir::new().unwrap();
        let url = write_volume(&dir);
        let request = write_request(&dir, "along.json", &along_request(&url, "t", 16.0));

        let reports = run_json(&dir, &["along"], &[&request]);
        let report = &reports[0];
        assert_eq!(report["cache_hit"], json!(false));
        assert_eq!(report["metadata"], json!({"shape": [2, 2], "format": "<f4"}));
        assert_eq!(report["attributes"][0]["name"], json!("min"));
        assert_eq!(report["attributes"][0]["values"], json!([3.0, 13.0, 103.0, 113.0]));
        assert_eq!(report["attributes"][1]["values"], json!([5.0, 15.0, 105.0, 115.0]));
    }

    #[test]
    fn repeated_request_hits_cache() {
        let dir = TempDir::new().unwrap();
        let url = write_volume(&dir);
        let first = write_request(&dir, "a.json", &along_request(&url, "token-a", 16.0));
        let second = write_request(&dir, "b.json", &along_request(&url, "token-b", 16.0));

        let reports = run_json(&dir, &["--cache-size", "16", "along"], &[&first, &second]);
        assert_eq!(reports[0]["cache_hit"], json!(false));
        assert_eq!(reports[1]["cache_hit"], json!(true));
        assert_eq!(reports[0]["key"], reports[1]["key"]);
        assert_eq!(reports[0]["attributes"], reports[1]["attributes"]);
    }

    #[test]
    fn cache_is_disabled_by_default() {
        let dir = TempDir::new().unwrap();
        let url = write_volume(&dir);
        let request = write_request(&dir, "a.json", &along_request(&url, "t", 16.0));

        let reports = run_json(&dir, &["along"], &[&request, &request]);
        assert_eq!(reports[1]["cache_hit"], json!(false));
    }

    #[test]
    fn between_computes_window() {
        let dir = TempDir::new().unwrap();
        let url = write_volume(&dir);
        let request = json!({
            "vds": url,
            "sas": "t",
            "stepsize": 4.0,
            "attributes": ["min", "max"],
            "primarySurface": surface(json!([[20.0, 20.0]])),
            "secondarySurface": surface(json!([[12.0, 12.0]])),
        });
        let request = write_request(&dir, "between.json", &request);

        let reports = run_json(&dir, &["between"], &[&request]);
        assert_eq!(reports[0]["attributes"][0]["values"], json!([3.0, 13.0]));
        assert_eq!(reports[0]["attributes"][1]["values"], json!([5.0, 15.0]));
    }

    #[test]
    fn summary_output() {
        let dir = TempDir::new().unwrap();
        let url = write_volume(&dir);
        let request = write_request(&dir, "along.json", &along_request(&url, "t", 16.0));

        vdsattr(&dir)
            .args(["along"])
            .arg(&request)
            .assert()
            .success()
            .stdout(predicate::str::contains("2x2"))
            .stdout(predicate::str::contains("3 13 103 113"));
    }

    #[test]
    fn window_outside_volume_fails() {
        let dir = TempDir::new().unwrap();
        let url = write_volume(&dir);
        let request = write_request(&dir, "along.json", &along_request(&url, "t", 8.0));

        vdsattr(&dir)
            .args(["along"])
            .arg(&request)
            .assert()
            .failure()
            .stderr(predicate::str::contains("out of vertical bounds"));
    }

    #[test]
    fn wrong_request_kind_fails() {
        let dir = TempDir::new().unwrap();
        let url = write_volume(&dir);
        let request = write_request(&dir, "along.json", &along_request(&url, "t", 16.0));

        vdsattr(&dir)
            .args(["between"])
            .arg(&request)
            .assert()
            .failure()
            .stderr(predicate::str::contains("expected 'between'"));
    }

    #[test]
    fn token_is_checked() {
        let dir = TempDir::new().unwrap();
        let url = write_volume(&dir);
        let request = write_request(&dir, "along.json", &along_request(&url, "guess", 16.0));

        vdsattr(&dir)
            .args(["along", "--token", "secret"])
            .arg(&request)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Not authorized"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn fingerprint_ignores_credentials() {
        let dir = TempDir::new().unwrap();
        let url = write_volume(&dir);
        let a = write_request(&dir, "a.json", &along_request(&url, "token-a", 16.0));
        let b = write_request(&dir, "b.json", &along_request(&url, "token-b", 16.0));
        let c = write_request(&dir, "c.json", &along_request(&url, "token-a", 20.0));

        let output = vdsattr(&dir)
            .arg("fingerprint")
            .args([&a, &b, &c])
            .output()
            .unwrap();
        assert!(output.status.success());

        let stdout = String::from_utf8(output.stdout).unwrap();
        let keys: Vec<&str> = stdout
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .collect();
        assert_eq!(keys.len(), 3);
        assert_eq!(keys[0], keys[1]);
        assert_ne!(keys[0], keys[2]);
    }

    #[test]
    fn config_path() {
        let dir = TempDir::new().unwrap();
        vdsattr(&dir)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let dir = TempDir::new().unwrap();
        vdsattr(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"))
            .stdout(predicate::str::contains("max_size_mb = 0"));
    }

    #[test]
    fn config_init_and_set() {
        let dir = TempDir::new().unwrap();
        vdsattr(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration initialized"));

        vdsattr(&dir)
            .args(["config", "set", "cache.max_size_mb", "32"])
            .assert()
            .success();

        vdsattr(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("max_size_mb = 32"));
    }

    #[test]
    fn invalid_config_reports_hint() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.toml"), "[cache\n").unwrap();

        vdsattr(&dir)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"))
            .stderr(predicate::str::contains("config init --force"));
    }

    #[test]
    fn init_force_replaces_invalid_config() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.toml"), "[cache\n").unwrap();

        vdsattr(&dir)
            .args(["config", "init", "--force"])
            .assert()
            .success();

        vdsattr(&dir).args(["config", "show"]).assert().success();
    }
}
