use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::{Builder, NamedTempFile};

use edgewatch::config::CONFIG_ENV;
use edgewatch::{CaptureSize, ChannelOrder, LoopConfig, SourceKind};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        CONFIG_ENV,
        "EDGEWATCH_MODEL_PATH",
        "EDGEWATCH_LABELS_PATH",
        "EDGEWATCH_SCORE_THRESHOLD",
        "EDGEWATCH_FLIP_VERTICAL",
        "EDGEWATCH_CAMERA_INDEX",
        "EDGEWATCH_SOURCE",
        "EDGEWATCH_REPORT_INTERVAL",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(suffix: &str, contents: &str) -> NamedTempFile {
    let mut file = Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = LoopConfig::load(None).expect("load config");
    assert_eq!(cfg, LoopConfig::default());
    assert_eq!(cfg.model_path, "face_detector.onnx");
    assert_eq!(cfg.score_threshold, 0.6);
    assert!(cfg.flip_vertical);
}

#[test]
fn loads_toml_file_from_env_with_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".toml",
        r#"
        [model]
        path = "models/ssd_mobilenet.onnx"
        labels = "models/coco.txt"
        score_threshold = 0.45
        channel_order = "bgr"
        input_width = 300
        input_height = 300

        [camera]
        index = 2
        source = "synthetic"
        width = 1280
        height = 720
        flip_vertical = false

        [report]
        interval = 10
        "#,
    );

    std::env::set_var(CONFIG_ENV, file.path());
    std::env::set_var("EDGEWATCH_SCORE_THRESHOLD", "0.8");
    std::env::set_var("EDGEWATCH_FLIP_VERTICAL", "yes");

    let cfg = LoopConfig::load(None).expect("load config");

    assert_eq!(cfg.model_path, "models/ssd_mobilenet.onnx");
    assert_eq!(cfg.labels_path, Some(PathBuf::from("models/coco.txt")));
    assert_eq!(cfg.score_threshold, 0.8);
    assert_eq!(cfg.channel_order, ChannelOrder::Bgr);
    assert_eq!(cfg.input_size, (300, 300));
    assert_eq!(cfg.camera_index, 2);
    assert_eq!(cfg.source, SourceKind::Synthetic);
    assert_eq!(
        cfg.capture_size,
        CaptureSize {
            width: 1280,
            height: 720
        }
    );
    assert!(cfg.flip_vertical);
    assert_eq!(cfg.report_interval, 10);

    clear_env();
}

#[test]
fn explicit_path_wins_over_env_and_json_is_detected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let env_file = write_config(".toml", "[report]\ninterval = 5\n");
    let json_file = write_config(
        ".json",
        r#"{
            "model": { "path": "stub://faces" },
            "camera": { "index": 1 }
        }"#,
    );
    std::env::set_var(CONFIG_ENV, env_file.path());
    std::env::set_var("EDGEWATCH_SOURCE", "SYNTHETIC");

    let cfg = LoopConfig::load(Some(json_file.path())).expect("load config");

    assert_eq!(cfg.model_path, "stub://faces");
    assert_eq!(cfg.camera_index, 1);
    assert_eq!(cfg.source, SourceKind::Synthetic);
    assert_eq!(cfg.report_interval, 30);

    clear_env();
}

#[test]
fn invalid_values_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(".toml", "[model]\nscore_threshold = 1.2\n");
    assert!(LoopConfig::load(Some(file.path())).is_err());

    let file = write_config(".toml", "[report]\ninterval = 0\n");
    assert!(LoopConfig::load(Some(file.path())).is_err());

    let file = write_config(".toml", "[camera]\nfps = 30\n");
    assert!(LoopConfig::load(Some(file.path())).is_err());

    std::env::set_var("EDGEWATCH_CAMERA_INDEX", "-1");
    assert!(LoopConfig::load(None).is_err());
    clear_env();

    std::env::set_var("EDGEWATCH_SOURCE", "rtsp");
    assert!(LoopConfig::load(None).is_err());
    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().expect("temp dir");
    let err = LoopConfig::load(Some(dir.path().join("absent.toml").as_path())).unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));
}
