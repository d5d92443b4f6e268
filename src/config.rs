use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};

pub const DEFAULT_STYLIZE_COMMAND: &str = "python neural_style/neural_style.py eval --content-image {input} --model {model} --output-image {output} --cuda 0";
pub const DEFAULT_ISSUE_URL: &str = "https://github.com/vopani/waveton";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AppKind {
    StyleTransfer,
    Annotation,
}

#[derive(Parser, Debug)]
#[command(name = "card-apps", version, about = "Card-based image demo apps")]
pub struct Cli {
    #[arg(value_enum)]
    pub app: AppKind,
    /// Directory holding static/, saved_models/, input/ and generated/.
    #[arg(long, value_name = "DIR", env = "CARD_APPS_ROOT", default_value = ".")]
    pub root: PathBuf,
    #[arg(long = "log-level", value_name = "LEVEL", env = "CARD_APPS_LOG", default_value = "info")]
    pub log_level: String,
    /// Inference command; `{model}`, `{input}` and `{output}` are substituted.
    #[arg(
        long = "stylize-command",
        value_name = "COMMAND",
        env = "CARD_APPS_STYLIZE_COMMAND",
        default_value = DEFAULT_STYLIZE_COMMAND
    )]
    pub stylize_command: String,
    #[arg(long = "issue-url", value_name = "URL", env = "CARD_APPS_ISSUE_URL", default_value = DEFAULT_ISSUE_URL)]
    pub issue_url: String,
    #[arg(long, value_name = "ID", env = "CARD_APPS_USER", default_value = "local")]
    pub user: String,
}

impl Cli {
    pub fn settings(&self) -> Settings {
        Settings {
            paths: Paths::new(&self.root),
            stylize_command: self.stylize_command.clone(),
            issue_url: self.issue_url.clone(),
            user: self.user.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub paths: Paths,
    pub stylize_command: String,
    pub issue_url: String,
    pub user: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub root: PathBuf,
}

impl Paths {
    pub const STATIC: &'static str = "static";
    pub const MODELS: &'static str = "saved_models";
    pub const INPUT: &'static str = "input";
    pub const GENERATED: &'static str = "generated";
    pub const SITE: &'static str = "site";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Turns a root-relative reference such as `static/house.jpg` into a path.
    pub fn resolve(&self, reference: &str) -> PathBuf {
        self.root.join(reference)
    }

    pub fn generated_dir(&self) -> PathBuf {
        self.root.join(Self::GENERATED)
    }

    pub fn site_dir(&self) -> PathBuf {
        self.root.join(Self::SITE)
    }

    pub fn static_ref(name: &str) -> String {
        format!("{}/{name}", Self::STATIC)
    }

    pub fn input_ref(name: &str) -> String {
        format!("{}/{name}", Self::INPUT)
    }

    pub fn generated_ref(name: &str) -> String {
        format!("{}/{name}", Self::GENERATED)
    }

    pub fn model_path(&self, style: &str) -> PathBuf {
        self.root.join(Self::MODELS).join(format!("{style}.pth"))
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [Self::INPUT, Self::GENERATED, Self::SITE] {
            std::fs::create_dir_all(self.root.join(dir))?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Upload names keep only the last path segment, with spaces replaced.
pub fn sanitize_upload_name(reference: &str) -> String {
    reference
        .rsplit('/')
        .next()
        .unwrap_or(reference)
        .replace(' ', "_")
}
