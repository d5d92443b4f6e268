use crate::ui::page::PageSnapshot;

/// Results posted by background request tasks to the UI thread.
#[derive(Debug, Clone)]
pub enum ShellEvent {
    Rendered(PageSnapshot),
    Uploaded { name: String, urls: Vec<String> },
    UploadFailed { name: String, message: String },
}
