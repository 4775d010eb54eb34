use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Serialize)]
pub struct AppError {
    pub error: String,
    pub code: String,
    pub trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl AppError {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        trace_id: impl Into<String>,
    ) -> Self {
        Self {
            error: message.into(),
            code: code.into(),
            trace_id: trace_id.into(),
            exit_code: None,
        }
    }

    pub fn validation(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_VALIDATION", message, trace_id)
    }

    /// adb ran but exited non-zero. `stderr` becomes the message.
    pub fn command(exit_code: Option<i32>, stderr: &str, trace_id: impl Into<String>) -> Self {
        let stderr = stderr.trim();
        let message = if stderr.is_empty() {
            match exit_code {
                Some(code) => format!("adb exited with status {code}"),
                None => "adb terminated by signal".to_string(),
            }
        } else {
            stderr.to_string()
        };
        Self {
            exit_code,
            ..Self::new("ERR_DEPENDENCY", message, trace_id)
        }
    }

    pub fn system(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_SYSTEM", message, trace_id)
    }

    pub fn timeout(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_TIMEOUT", message, trace_id)
    }

    pub fn poll_timeout(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_POLL_TIMEOUT", message, trace_id)
    }

    pub fn not_found(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_NOT_FOUND", message, trace_id)
    }

    pub fn adb_unavailable(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_ADB_UNAVAILABLE", message, trace_id)
    }

    pub fn busy(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_BUSY", message, trace_id)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.error, self.code)
    }
}

impl std::error::Error for AppError {}
