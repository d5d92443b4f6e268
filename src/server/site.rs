use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

pub const FILE_PREFIX: &str = "/_f/";

#[derive(Debug, Error)]
pub enum SiteError {
    #[error("`{url}` is not a site file url")]
    InvalidUrl { url: String },

    #[error("site file not found: {url}")]
    NotFound { url: String },

    #[error("nothing was uploaded")]
    NothingUploaded,

    #[error("site i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> SiteError + '_ {
    move |source| SiteError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// File broker between clients and the apps. Uploaded files get an opaque
/// `/_f/<id>/<name>` url; downloads copy a site file to a local path.
#[derive(Debug, Clone)]
pub struct Site {
    content_dir: PathBuf,
    asset_root: PathBuf,
}

impl Site {
    pub fn new(content_dir: impl Into<PathBuf>, asset_root: impl Into<PathBuf>) -> Self {
        Self {
            content_dir: content_dir.into(),
            asset_root: asset_root.into(),
        }
    }

    pub async fn upload<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Vec<String>, SiteError> {
        let mut urls = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .ok_or_else(|| SiteError::NotFound {
                    url: path.display().to_string(),
                })?;
            let id = Uuid::new_v4().simple().to_string();
            let dir = self.content_dir.join(&id);
            fs::create_dir_all(&dir).await.map_err(io_error(&dir))?;
            let target = dir.join(&name);
            fs::copy(path, &target).await.map_err(io_error(path))?;

            let url = format!("{FILE_PREFIX}{id}/{name}");
            debug!(source = %path.display(), url = %url, "uploaded file");
            urls.push(url);
        }
        Ok(urls)
    }

    pub async fn download(&self, url: &str, local_path: &Path) -> Result<PathBuf, SiteError> {
        let source = self.resolve(url)?;
        if !fs::try_exists(&source).await.map_err(io_error(&source))? {
            return Err(SiteError::NotFound {
                url: url.to_string(),
            });
        }
        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent).await.map_err(io_error(parent))?;
        }
        fs::copy(&source, local_path)
            .await
            .map_err(io_error(local_path))?;
        debug!(url = %url, target = %local_path.display(), "downloaded file");
        Ok(local_path.to_path_buf())
    }

    pub fn resolve(&self, url: &str) -> Result<PathBuf, SiteError> {
        let invalid = || SiteError::InvalidUrl {
            url: url.to_string(),
        };
        let relative = Path::new(url.strip_prefix(FILE_PREFIX).ok_or_else(invalid)?);
        if relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)))
        {
            return Err(invalid());
        }
        Ok(self.content_dir.join(relative))
    }

    /// Maps any image reference used by a card to a file on disk: site urls
    /// go through `resolve`, everything else is relative to the asset root.
    pub fn locate(&self, reference: &str) -> Option<PathBuf> {
        if reference.starts_with(FILE_PREFIX) {
            self.resolve(reference).ok()
        } else {
            Some(self.asset_root.join(reference))
        }
    }
}
