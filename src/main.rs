mod apps;
mod config;
mod error;
mod event;
mod server;
mod session;
mod shell;
mod theme;
mod ui;

use anyhow::{anyhow, Context};
use apps::annotation::Annotation;
use apps::style_transfer::model::CommandStylizer;
use apps::style_transfer::StyleTransfer;
use clap::Parser;
use config::{AppKind, Cli, Settings};
use eframe::egui;
use server::site::Site;
use server::{Handler, Server};
use shell::Shell;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

fn run<H: Handler>(handler: H, settings: &Settings, runtime: Handle) -> anyhow::Result<()> {
    let title = handler.name();
    let site = Site::new(settings.paths.site_dir(), settings.paths.root());
    let server = Arc::new(Server::new(handler, site, settings.issue_url.clone()));
    let user = settings.user.clone();

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_min_inner_size([960.0, 600.0])
            .with_drag_and_drop(true),
        ..Default::default()
    };

    eframe::run_native(
        title,
        native_options,
        Box::new(move |creation_context| {
            Ok(Box::new(Shell::new(
                server,
                &user,
                runtime,
                &creation_context.egui_ctx,
            )))
        }),
    )
    .map_err(|err| anyhow!("window closed with an error: {err}"))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    let settings = cli.settings();

    settings
        .paths
        .ensure_dirs()
        .with_context(|| format!("preparing {}", settings.paths.root().display()))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("card-apps-runtime")
        .build()
        .context("building tokio runtime")?;

    info!(app = ?cli.app, root = %settings.paths.root().display(), "starting");
    match cli.app {
        AppKind::StyleTransfer => {
            let stylizer = CommandStylizer::parse(&settings.stylize_command)?;
            let handler = StyleTransfer::new(settings.paths.clone(), Arc::new(stylizer));
            run(handler, &settings, runtime.handle().clone())
        }
        AppKind::Annotation => run(
            Annotation::new(settings.paths.clone()),
            &settings,
            runtime.handle().clone(),
        ),
    }
}
