use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use retico_videoplayback::config::ProducerConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "VIDEOPLAYBACK_CONFIG",
        "VIDEOPLAYBACK_CAMERA_URL",
        "VIDEOPLAYBACK_CAMERA_USERNAME",
        "VIDEOPLAYBACK_CAMERA_PASSWORD",
        "VIDEOPLAYBACK_RETRY_ATTEMPTS",
        "VIDEOPLAYBACK_RETRY_DELAY_SECS",
        "VIDEOPLAYBACK_VIDEO_PATH",
        "VIDEOPLAYBACK_VIDEO_FPS",
        "VIDEOPLAYBACK_VIDEO_LOOP",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let video = NamedTempFile::new().expect("temp video");
    let json = format!(
        r#"{{
            "ip_camera": {{
                "url": "http://192.0.2.10:8080/video",
                "username": "viewer",
                "width": 1280,
                "height": 720,
                "rate": 15,
                "wrap_image": false,
                "timeout_secs": 2.5,
                "retry_attempts": 5,
                "retry_delay_secs": 1
            }},
            "playback": {{
                "path": "{}",
                "fps": 12.5,
                "loop_playback": true
            }}
        }}"#,
        video.path().display()
    );
    let file = write_config(&json);

    std::env::set_var("VIDEOPLAYBACK_CONFIG", file.path());
    std::env::set_var("VIDEOPLAYBACK_CAMERA_PASSWORD", "secret");
    std::env::set_var("VIDEOPLAYBACK_RETRY_ATTEMPTS", "2");
    std::env::set_var("VIDEOPLAYBACK_VIDEO_LOOP", "false");

    let cfg = ProducerConfig::load().expect("load config");

    let camera = cfg.ip_camera.expect("camera section");
    assert_eq!(camera.url, "http://192.0.2.10:8080/video");
    assert_eq!(camera.username.as_deref(), Some("viewer"));
    assert_eq!(camera.password.as_deref(), Some("secret"));
    assert_eq!(camera.width, Some(1280));
    assert_eq!(camera.height, Some(720));
    assert_eq!(camera.rate, 15.0);
    assert!(!camera.wrap_image);
    assert_eq!(camera.timeout, Duration::from_millis(2500));
    assert_eq!(camera.retry_attempts, 2);
    assert_eq!(camera.retry_delay, Duration::from_secs(1));

    let playback = cfg.playback.expect("playback section");
    assert_eq!(playback.path, video.path().display().to_string());
    assert_eq!(playback.fps, Some(12.5));
    assert!(!playback.loop_playback);
    assert!(playback.wrap_image);

    clear_env();
}

#[test]
fn env_alone_creates_sections_with_defaults() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("VIDEOPLAYBACK_CAMERA_URL", "rtsp://cam.local/stream");
    std::env::set_var("VIDEOPLAYBACK_VIDEO_PATH", "stub://clip?frames=10");
    std::env::set_var("VIDEOPLAYBACK_VIDEO_FPS", "0");

    let cfg = ProducerConfig::load().expect("load config");

    let camera = cfg.ip_camera.expect("camera section");
    assert_eq!(camera.url, "rtsp://cam.local/stream");
    assert_eq!(camera.rate, 30.0);
    assert_eq!(camera.retry_attempts, 3);
    assert_eq!(camera.retry_delay, Duration::from_secs(5));
    assert_eq!(camera.timeout, Duration::from_secs(10));

    let playback = cfg.playback.expect("playback section");
    assert_eq!(playback.fps, Some(0.0));
    assert!(playback.loop_playback);

    clear_env();
}

#[test]
fn no_file_and_no_env_yields_empty_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = ProducerConfig::load_from(None).expect("load config");
    assert!(cfg.ip_camera.is_none());
    assert!(cfg.playback.is_none());
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(r#"{ "ip_camera": { "url": "rtsp://cam", "retry_attempts": 0 } }"#);
    assert!(ProducerConfig::load_from(Some(file.path())).is_err());

    let file = write_config(r#"{ "ip_camera": { "username": "admin" } }"#);
    assert!(ProducerConfig::load_from(Some(file.path())).is_err());

    let file = write_config(r#"{ "ip_camera": { "url": "rtsp://cam", "retry_delay_secs": -1 } }"#);
    assert!(ProducerConfig::load_from(Some(file.path())).is_err());

    let file = write_config(r#"{ "playback": { "path": "/nonexistent/video.mp4" } }"#);
    assert!(ProducerConfig::load_from(Some(file.path())).is_err());

    let file = write_config("not json");
    assert!(ProducerConfig::load_from(Some(file.path())).is_err());

    std::env::set_var("VIDEOPLAYBACK_CAMERA_URL", "rtsp://cam");
    std::env::set_var("VIDEOPLAYBACK_RETRY_ATTEMPTS", "many");
    assert!(ProducerConfig::load_from(None).is_err());
    clear_env();

    std::env::set_var("VIDEOPLAYBACK_VIDEO_PATH", "stub://clip");
    std::env::set_var("VIDEOPLAYBACK_VIDEO_LOOP", "sometimes");
    assert!(ProducerConfig::load_from(None).is_err());
    clear_env();
}

#[test]
fn read_defers_validation_to_the_caller() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(r#"{ "playback": { "path": "/nonexistent/stale.mp4", "fps": 5 } }"#);
    assert!(ProducerConfig::load_from(Some(file.path())).is_err());

    let cfg = ProducerConfig::read_from(Some(file.path())).expect("read config");
    let mut playback = cfg.playback.expect("playback section");
    assert!(playback.validate().is_err());

    let video = NamedTempFile::new().expect("temp video");
    playback.path = video.path().display().to_string();
    playback.validate().expect("override validates");
    assert_eq!(playback.fps, Some(5.0));

    let file = write_config("not json");
    assert!(ProducerConfig::read_from(Some(file.path())).is_err());
}
