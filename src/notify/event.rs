use chrono::{DateTime, Local};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub camera_id: String,
    pub class_name: String,
    pub message: String,
    pub timestamp: DateTime<Local>,
}

impl NotificationEvent {
    pub fn new(camera_id: &str, class_name: &str) -> Self {
        Self {
            camera_id: camera_id.to_string(),
            class_name: class_name.to_string(),
            message: format!("{} detected", capitalize(class_name)),
            timestamp: Local::now(),
        }
    }

    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }

    /// `[<timestamp>] [Camera <id>] <message>`
    pub fn log_line(&self) -> String {
        format!(
            "[{}] [Camera {}] {}",
            self.formatted_timestamp(),
            self.camera_id,
            self.message
        )
    }

    pub fn email_subject(&self) -> String {
        format!(
            "{} Detected on Camera {}",
            capitalize(&self.class_name),
            self.camera_id
        )
    }

    pub fn email_body(&self) -> String {
        format!(
            "{} on camera {} at {}.\n",
            self.message,
            self.camera_id,
            self.formatted_timestamp()
        )
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
