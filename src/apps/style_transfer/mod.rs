use crate::config::{sanitize_upload_name, Paths};
use crate::error::AppError;
use crate::server::crash::CRASH_CARD;
use crate::server::retention::{self, RETENTION_THRESHOLD};
use crate::server::site::{Site, SiteError};
use crate::server::{Handler, Query};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod cards;
pub mod model;

use model::Stylizer;

pub const MODELS: [&str; 7] = [
    "candy",
    "mosaic",
    "rain_princess",
    "udnie",
    "fire",
    "black_rainbow",
    "hex",
];
pub const SOURCE_IMAGES: [&str; 2] = ["house.jpg", "beth.jpeg"];
pub const DEFAULT_MODEL: &str = "candy";

#[derive(Debug, Serialize)]
pub struct StyleApp {
    pub cards: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StyleUser {
    pub source_img: Option<String>,
    pub input_image: String,
    pub output_image: Option<String>,
    pub style_model: String,
    pub style_name: Option<String>,
    pub template_image_path: Option<String>,
    pub try_your_image: bool,
    pub apply_style: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct StyleClient {}

#[derive(Debug, Default, Deserialize)]
struct StyleArgs {
    source_img: Option<String>,
    style_model: Option<String>,
    try_your_image: Option<bool>,
    #[serde(default)]
    apply_style: bool,
    #[serde(default)]
    upload_image: Vec<String>,
    #[serde(default)]
    reload: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Navigation {
    Dashboard,
    Reload,
    Unchanged,
}

pub struct StyleTransfer {
    paths: Paths,
    stylizer: Arc<dyn Stylizer>,
}

impl StyleTransfer {
    pub fn new(paths: Paths, stylizer: Arc<dyn Stylizer>) -> Self {
        Self { paths, stylizer }
    }

    async fn upload_template(&self, site: &Site, style: &str) -> Result<String, AppError> {
        let template = self.paths.resolve(&Paths::static_ref(&format!("{style}.jpg")));
        let mut urls = site.upload(&[template]).await?;
        urls.pop().ok_or_else(|| SiteError::NothingUploaded.into())
    }

    fn render_dashboard(&self, q: &mut Query<'_, Self>) -> Result<(), AppError> {
        q.page.set(cards::CONTROLS, cards::controls(q.user, &MODELS, &SOURCE_IMAGES))?;
        q.page.set(cards::GALLERY, cards::gallery(q.user))?;
        Ok(())
    }

    /// Copies the user's upload into `input/` and returns its file name.
    async fn fetch_upload(&self, site: &Site, uploads: &[String]) -> Result<String, AppError> {
        let url = uploads.first().ok_or(SiteError::NothingUploaded)?;
        let name = sanitize_upload_name(url);
        let target = self.paths.resolve(&Paths::input_ref(&name));
        site.download(url, &target).await?;
        Ok(name)
    }

    async fn apply_style(&self, q: &mut Query<'_, Self>, args: &StyleArgs, stock: String) -> Result<(), AppError> {
        let mut img = stock;
        if q.user.try_your_image {
            match self.fetch_upload(q.site, &args.upload_image).await {
                Ok(name) => {
                    q.user.input_image = Paths::input_ref(&name);
                    img = name;
                }
                Err(err) => {
                    warn!(client = %q.client_id, error = %err, "upload download failed; using stock image");
                    q.user.input_image = Paths::static_ref(&img);
                }
            }
        } else {
            q.user.input_image = Paths::static_ref(&img);
        }

        let style = q.user.style_model.clone();
        let output = Paths::generated_ref(&format!("{style}-{img}"));
        q.user.output_image = Some(output.clone());
        info!(client = %q.client_id, style = %style, input = %q.user.input_image, "applying style");

        let model = self.stylizer.load_model(&self.paths.model_path(&style)).await?;
        self.stylizer
            .stylize(
                &model,
                &self.paths.resolve(&q.user.input_image),
                &self.paths.resolve(&output),
            )
            .await?;

        q.user.style_name = Some(style);
        q.user.apply_style = true;
        Ok(())
    }
}

#[async_trait]
impl Handler for StyleTransfer {
    type App = StyleApp;
    type User = StyleUser;
    type Client = StyleClient;

    fn name(&self) -> &'static str {
        "Style Transfer"
    }

    async fn initialize_app(&self, _site: &Site) -> Result<StyleApp, AppError> {
        Ok(StyleApp {
            cards: vec![cards::CONTROLS.to_string(), cards::GALLERY.to_string()],
        })
    }

    async fn initialize_client(&self, q: &mut Query<'_, Self>) -> Result<(), AppError> {
        q.user.source_img = None;
        q.user.input_image = Paths::static_ref(SOURCE_IMAGES[0]);
        q.user.style_model = DEFAULT_MODEL.to_string();
        q.user.template_image_path = Some(self.upload_template(q.site, DEFAULT_MODEL).await?);

        q.page.remove(CRASH_CARD);
        q.page.set("meta", cards::meta())?;
        q.page.set("header", cards::header())?;
        q.page.set("footer", cards::footer())?;
        self.render_dashboard(q)
    }

    async fn serve(&self, q: &mut Query<'_, Self>) -> Result<(), AppError> {
        let args: StyleArgs = q.args.decode()?;
        let mut dashboard = false;

        let stock = match &args.source_img {
            Some(img) => {
                q.user.source_img = Some(img.clone());
                q.user.input_image = Paths::static_ref(img);
                q.user.output_image = Some(Paths::static_ref(img));
                dashboard = true;
                img.clone()
            }
            None => q
                .user
                .source_img
                .clone()
                .unwrap_or_else(|| SOURCE_IMAGES[0].to_string()),
        };

        if let Some(style) = &args.style_model {
            q.user.style_model = style.clone();
            q.user.template_image_path = Some(self.upload_template(q.site, style).await?);
            dashboard = true;
        }

        retention::enforce(&self.paths.generated_dir(), RETENTION_THRESHOLD).await?;

        if let Some(try_your_image) = args.try_your_image {
            q.user.apply_style = false;
            q.user.try_your_image = try_your_image;
            dashboard = true;
        }

        if args.apply_style {
            self.apply_style(q, &args, stock).await?;
            dashboard = true;
        }

        let navigation = if args.reload {
            Navigation::Reload
        } else if dashboard || q.user.apply_style {
            Navigation::Dashboard
        } else {
            Navigation::Unchanged
        };

        match navigation {
            Navigation::Dashboard => self.render_dashboard(q),
            Navigation::Reload => {
                info!(client = %q.client_id, "reloading client");
                self.initialize_client(q).await
            }
            Navigation::Unchanged => {
                debug!(client = %q.client_id, "nothing to re-render");
                Ok(())
            }
        }
    }

    fn cards(app: &StyleApp) -> &[String] {
        &app.cards
    }
}
