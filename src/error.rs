use crate::apps::annotation::export::ExportError;
use crate::apps::style_transfer::model::StylizeError;
use crate::server::site::SiteError;
use crate::ui::card::ValidationError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Site(#[from] SiteError),

    #[error("style transfer failed: {0}")]
    Stylize(#[from] StylizeError),

    #[error("annotation export failed: {0}")]
    Export(#[from] ExportError),

    #[error("invalid card: {0}")]
    Card(#[from] ValidationError),

    #[error("malformed request arguments: {0}")]
    Args(#[from] serde_json::Error),

    #[error("invalid value for `{field}`: {message}")]
    Input { field: &'static str, message: String },

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AppError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
