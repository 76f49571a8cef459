use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
    Info,
}

impl fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NoticeKind::Success => "success",
            NoticeKind::Error => "error",
            NoticeKind::Info => "info",
        };
        f.write_str(label)
    }
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, kind: NoticeKind, message: &str);
}

#[derive(Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, kind: NoticeKind, message: &str) {
        match kind {
            NoticeKind::Success | NoticeKind::Info => tracing::info!(%kind, "{message}"),
            NoticeKind::Error => tracing::error!(%kind, "{message}"),
        }
        eprintln!("[{kind}] {message}");
    }
}

#[derive(Debug, Default)]
pub struct MemorySink {
    notices: Mutex<Vec<(NoticeKind, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<(NoticeKind, String)> {
        self.notices
            .lock()
            .map(|notices| notices.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, kind: NoticeKind) -> usize {
        self.notices()
            .iter()
            .filter(|(current, _)| *current == kind)
            .count()
    }
}

impl NotificationSink for MemorySink {
    fn notify(&self, kind: NoticeKind, message: &str) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push((kind, message.to_string()));
        }
    }
}
