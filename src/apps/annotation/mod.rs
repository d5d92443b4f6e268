use crate::config::{sanitize_upload_name, Paths};
use crate::error::AppError;
use crate::server::crash::CRASH_CARD;
use crate::server::site::{Site, SiteError};
use crate::server::{Handler, Query};
use crate::ui::card::{AnnotatorItem, ThemeName};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

pub mod cards;
pub mod export;

pub const DEFAULT_IMAGE: &str = "sample.jpg";
pub const DEFAULT_HEIGHT: &str = "600px";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub label: String,
}

impl Tag {
    fn from_label(label: &str) -> Self {
        Self {
            name: label.to_lowercase(),
            label: label.to_string(),
        }
    }
}

fn default_tags() -> Vec<Tag> {
    ["Person", "Car"].into_iter().map(Tag::from_label).collect()
}

#[derive(Debug, Serialize)]
pub struct AnnotationApp {
    pub cards: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct AnnotationUser {}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnnotationClient {
    pub tags: Vec<Tag>,
    pub image: Option<String>,
    pub image_items: Vec<AnnotatorItem>,
    pub image_height: String,
    pub dark_theme: bool,
    /// Upload urls already turned into the current image.
    pub uploads: Vec<String>,
    pub export: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AnnotationArgs {
    #[serde(default)]
    add: bool,
    add_new_class: Option<String>,
    #[serde(default)]
    delete: bool,
    delete_existing_class: Option<String>,
    #[serde(default)]
    change_pixel: bool,
    new_pixel_size: Option<String>,
    #[serde(default)]
    file_upload: Vec<String>,
    annotator: Option<Vec<AnnotatorItem>>,
    #[serde(default)]
    save_output: bool,
    theme_dark: Option<bool>,
    #[serde(default)]
    reload: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Navigation {
    Workspace,
    Reload,
    Unchanged,
}

fn parse_height(raw: Option<&str>) -> Result<String, AppError> {
    let raw = raw.map(str::trim).unwrap_or_default();
    match raw.parse::<u32>() {
        Ok(pixels) if pixels > 0 => Ok(format!("{pixels}px")),
        _ => Err(AppError::Input {
            field: "new_pixel_size",
            message: format!("expected a positive integer, got {raw:?}"),
        }),
    }
}

pub struct Annotation {
    paths: Paths,
}

impl Annotation {
    pub fn new(paths: Paths) -> Self {
        Self { paths }
    }

    fn theme(client: &AnnotationClient) -> ThemeName {
        if client.dark_theme {
            ThemeName::Dark
        } else {
            ThemeName::Light
        }
    }

    fn render_workspace(&self, q: &mut Query<'_, Self>) -> Result<(), AppError> {
        let client = &*q.client;
        let image = client.image.as_deref().unwrap_or_default();
        q.page.set(cards::ENTITIES, cards::image_entities(&client.tags))?;
        q.page.set(
            cards::ANNOTATOR,
            cards::image_annotator(
                &client.tags,
                image,
                &client.image_items,
                &client.image_height,
                client.export.as_deref(),
            ),
        )?;
        Ok(())
    }

    async fn upload_one(site: &Site, path: &Path) -> Result<String, AppError> {
        let mut urls = site.upload(&[path]).await?;
        urls.pop().ok_or_else(|| SiteError::NothingUploaded.into())
    }

    /// Pulls every upload into `input/` and re-publishes the last one.
    async fn import_uploads(&self, site: &Site, urls: &[String]) -> Result<String, AppError> {
        let mut last = None;
        for url in urls {
            let target = self.paths.resolve(&Paths::input_ref(&sanitize_upload_name(url)));
            last = Some(site.download(url, &target).await?);
        }
        let local = last.ok_or(SiteError::NothingUploaded)?;
        Self::upload_one(site, &local).await
    }

    async fn save_output(&self, q: &mut Query<'_, Self>) -> Result<(), AppError> {
        let image = q.client.image.as_deref().unwrap_or(DEFAULT_IMAGE);
        let name = sanitize_upload_name(image);
        let stem = Path::new(&name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| "image".to_string());
        let path = self
            .paths
            .resolve(&Paths::generated_ref(&format!("annotations-{stem}.csv")));

        export::save_csv(&path, &q.client.image_items).await?;
        q.client.export = Some(Self::upload_one(q.site, &path).await?);
        info!(
            client = %q.client_id,
            items = q.client.image_items.len(),
            path = %path.display(),
            "annotations exported"
        );
        Ok(())
    }
}

#[async_trait]
impl Handler for Annotation {
    type App = AnnotationApp;
    type User = AnnotationUser;
    type Client = AnnotationClient;

    fn name(&self) -> &'static str {
        "Image Annotation"
    }

    async fn initialize_app(&self, _site: &Site) -> Result<AnnotationApp, AppError> {
        Ok(AnnotationApp {
            cards: vec![cards::ENTITIES.to_string(), cards::ANNOTATOR.to_string()],
        })
    }

    async fn initialize_client(&self, q: &mut Query<'_, Self>) -> Result<(), AppError> {
        let default_image = self.paths.resolve(&Paths::static_ref(DEFAULT_IMAGE));
        // Uploads the window still carries must not be imported again.
        let uploads = std::mem::take(&mut q.client.uploads);
        *q.client = AnnotationClient {
            tags: default_tags(),
            image: Some(Self::upload_one(q.site, &default_image).await?),
            image_height: DEFAULT_HEIGHT.to_string(),
            dark_theme: true,
            uploads,
            ..AnnotationClient::default()
        };

        q.page.remove(CRASH_CARD);
        q.page.set("meta", cards::meta(ThemeName::Dark))?;
        q.page.set("header", cards::header(true))?;
        q.page.set("footer", cards::footer())?;
        self.render_workspace(q)
    }

    async fn serve(&self, q: &mut Query<'_, Self>) -> Result<(), AppError> {
        let args: AnnotationArgs = q.args.decode()?;
        let mut workspace = false;

        if let Some(items) = args.annotator {
            if let Some(event) = q.events.get(cards::ANNOTATOR_FIELD) {
                debug!(client = %q.client_id, event = %event.display_value(), boxes = items.len(), "annotator edited");
            }
            let items: Vec<_> = items.into_iter().map(AnnotatorItem::normalized).collect();
            if items != q.client.image_items {
                q.client.image_items = items;
                workspace = true;
            }
        }

        if let Some(dark) = args.theme_dark {
            q.client.dark_theme = dark;
            q.page.set("meta", cards::meta(Self::theme(q.client)))?;
            q.page.set("header", cards::header(dark))?;
        }

        if args.add {
            let label = args.add_new_class.as_deref().map(str::trim).unwrap_or_default();
            if !label.is_empty() {
                let tag = Tag::from_label(label);
                if q.client.tags.iter().all(|existing| existing.name != tag.name) {
                    debug!(client = %q.client_id, tag = %tag.name, "adding class");
                    q.client.tags.push(tag);
                }
            }
            workspace = true;
        }

        if args.delete {
            if let Some(name) = &args.delete_existing_class {
                q.client.tags.retain(|tag| &tag.name != name);
                q.client.image_items.retain(|item| &item.tag != name);
            }
            workspace = true;
        }

        if args.change_pixel {
            q.client.image_height = parse_height(args.new_pixel_size.as_deref())?;
            workspace = true;
        }

        if !args.file_upload.is_empty() && args.file_upload != q.client.uploads {
            let image = self.import_uploads(q.site, &args.file_upload).await?;
            info!(client = %q.client_id, image = %image, "annotating uploaded image");
            q.client.image = Some(image);
            q.client.image_items.clear();
            q.client.export = None;
            q.client.uploads = args.file_upload.clone();
            workspace = true;
        }

        if args.save_output {
            self.save_output(q).await?;
            workspace = true;
        }

        let navigation = if args.reload {
            Navigation::Reload
        } else if workspace {
            Navigation::Workspace
        } else {
            Navigation::Unchanged
        };

        match navigation {
            Navigation::Workspace => self.render_workspace(q),
            Navigation::Reload => {
                info!(client = %q.client_id, "reloading client");
                self.initialize_client(q).await
            }
            Navigation::Unchanged => Ok(()),
        }
    }

    fn cards(app: &AnnotationApp) -> &[String] {
        &app.cards
    }
}
