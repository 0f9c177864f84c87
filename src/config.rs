use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("no cameras configured")]
    NoCameras,
    #[error("duplicate camera id: {0}")]
    DuplicateCamera(String),
    #[error("invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub resize_width: Option<u32>,
}

fn default_http_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
        }
    }
}

fn default_reconnect_backoff() -> u64 {
    5
}

fn default_resize_width() -> u32 {
    800
}

fn default_read_timeout() -> u64 {
    5000
}

fn default_jpeg_quality() -> i32 {
    80
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_reconnect_backoff")]
    pub reconnect_backoff_secs: u64,
    #[serde(default = "default_resize_width")]
    pub resize_width: u32,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: i32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            reconnect_backoff_secs: default_reconnect_backoff(),
            resize_width: default_resize_width(),
            read_timeout_ms: default_read_timeout(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl CaptureConfig {
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

fn default_model() -> String {
    "yolo26n.onnx".to_string()
}

fn default_confidence_threshold() -> f32 {
    0.5
}

fn default_watch_class() -> String {
    "person".to_string()
}

fn default_intra_threads() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Local path or http(s) URL of an ONNX model.
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_watch_class")]
    pub watch_class: String,
    /// Empty means every class the model knows.
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            confidence_threshold: default_confidence_threshold(),
            watch_class: default_watch_class(),
            classes: Vec::new(),
            intra_threads: default_intra_threads(),
        }
    }
}

fn default_poll_interval() -> u64 {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl StreamConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_cooldown() -> u64 {
    30
}

fn default_log_file() -> String {
    "notifications.log".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            username: None,
            password: None,
            from: String::new(),
            to: String::new(),
            timeout_secs: default_smtp_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    #[serde(default = "default_log_file")]
    pub log_file: String,
    #[serde(default)]
    pub email: EmailConfig,
}

impl EmailConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown(),
            log_file: default_log_file(),
            email: EmailConfig::default(),
        }
    }
}

impl NotificationConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub cameras: Vec<CameraConfig>,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cameras.is_empty() {
            return Err(ConfigError::NoCameras);
        }

        let mut seen = HashSet::new();
        for camera in &self.cameras {
            if camera.id.trim().is_empty() {
                return Err(ConfigError::Invalid("camera id must not be empty".into()));
            }
            if !seen.insert(camera.id.as_str()) {
                return Err(ConfigError::DuplicateCamera(camera.id.clone()));
            }
            if let Some(width) = camera.resize_width {
                check_width(&format!("cameras.{}.resize_width", camera.id), width)?;
            }
        }

        check_width("capture.resize_width", self.capture.resize_width)?;
        check_positive("capture.reconnect_backoff_secs", self.capture.reconnect_backoff_secs)?;
        check_positive("capture.read_timeout_ms", self.capture.read_timeout_ms)?;
        check_positive("stream.poll_interval_ms", self.stream.poll_interval_ms)?;
        if !(0..=100).contains(&self.capture.jpeg_quality) {
            return Err(ConfigError::Invalid("capture.jpeg_quality must be 0-100".into()));
        }
        if !(0.0..=1.0).contains(&self.detection.confidence_threshold) {
            return Err(ConfigError::Invalid(
                "detection.confidence_threshold must be within [0, 1]".into(),
            ));
        }

        let email = &self.notifications.email;
        if email.enabled
            && (email.smtp_host.is_empty() || email.from.is_empty() || email.to.is_empty())
        {
            return Err(ConfigError::Invalid(
                "notifications.email requires smtp_host, from and to when enabled".into(),
            ));
        }
        if email.enabled {
            check_positive("notifications.email.timeout_secs", email.timeout_secs)?;
        }

        Ok(())
    }

    pub fn resize_width_for(&self, camera: &CameraConfig) -> u32 {
        camera.resize_width.unwrap_or(self.capture.resize_width)
    }
}

fn check_positive(name: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid(format!("{name} must be positive")));
    }
    Ok(())
}

// widths end up as OpenCV `i32` sizes
fn check_width(name: &str, width: u32) -> Result<(), ConfigError> {
    if width == 0 || i32::try_from(width).is_err() {
        return Err(ConfigError::Invalid(format!("{name} must be within 1..={}", i32::MAX)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = Config::parse(
            r#"
            [[cameras]]
            id = "front"
            url = "http://192.168.1.10:8080/video"
            "#,
        )
        .unwrap();

        assert_eq!(config.http.port, 8080);
        assert_eq!(config.capture.reconnect_backoff(), Duration::from_secs(5));
        assert_eq!(config.capture.resize_width, 800);
        assert_eq!(config.detection.confidence_threshold, 0.5);
        assert_eq!(config.detection.watch_class, "person");
        assert_eq!(config.stream.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.notifications.cooldown(), Duration::from_secs(30));
        assert_eq!(config.notifications.log_file, "notifications.log");
        assert!(!config.notifications.email.enabled);
        assert_eq!(config.resize_width_for(&config.cameras[0]), 800);
    }

    #[test]
    fn camera_override_wins() {
        let config = Config::parse(
            r#"
            [capture]
            resize_width = 640

            [[cameras]]
            id = "a"
            url = "rtsp://a"

            [[cameras]]
            id = "b"
            url = "rtsp://b"
            resize_width = 1024
            "#,
        )
        .unwrap();

        assert_eq!(config.resize_width_for(&config.cameras[0]), 640);
        assert_eq!(config.resize_width_for(&config.cameras[1]), 1024);
    }

    #[test]
    fn rejects_empty_camera_list() {
        assert!(matches!(
            Config::parse("[http]\nport = 9000\n"),
            Err(ConfigError::NoCameras)
        ));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let err = Config::parse(
            r#"
            [[cameras]]
            id = "a"
            url = "rtsp://a"

            [[cameras]]
            id = "a"
            url = "rtsp://b"
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::DuplicateCamera(id) if id == "a"));
    }

    #[test]
    fn rejects_incomplete_email() {
        let err = Config::parse(
            r#"
            [notifications.email]
            enabled = true
            smtp_host = "smtp.example.com"

            [[cameras]]
            id = "a"
            url = "rtsp://a"
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_out_of_range_confidence() {
        let err = Config::parse(
            r#"
            [detection]
            confidence_threshold = 1.5

            [[cameras]]
            id = "a"
            url = "rtsp://a"
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_intervals_and_oversized_widths() {
        let camera = "[[cameras]]\nid = \"a\"\nurl = \"rtsp://a\"\n";
        let cases = [
            "[stream]\npoll_interval_ms = 0\n".to_string(),
            "[capture]\nreconnect_backoff_secs = 0\n".to_string(),
            "[capture]\nread_timeout_ms = 0\n".to_string(),
            "[capture]\nresize_width = 3000000000\n".to_string(),
        ];

        for case in cases {
            let err = Config::parse(&format!("{case}{camera}")).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "accepted: {case}");
        }

        let err = Config::parse(
            "[[cameras]]\nid = \"a\"\nurl = \"rtsp://a\"\nresize_width = 4294967295\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("cameras.a.resize_width")));
    }
}
