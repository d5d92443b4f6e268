use crate::event::ShellEvent;
use crate::server::site::Site;
use crate::server::{Handler, Server};
use crate::theme::Theme;
use crate::ui::card::{Direction, ThemeName, Zone};
use crate::ui::event::{ArgValue, Args, Request, UiAction};
use crate::ui::page::PageSnapshot;
use crate::ui::render::CardRenderer;
use eframe::egui::{self, RichText, ScrollArea};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, warn};
use uuid::Uuid;

const UPLOADED_EVENT: &str = "uploaded";

/// One window's connection to the server: requests run on the tokio runtime
/// and post their results back over a channel.
pub struct ClientHandle<H: Handler> {
    server: Arc<Server<H>>,
    user_id: String,
    client_id: String,
    runtime: Handle,
    tx: Sender<ShellEvent>,
    ctx: egui::Context,
}

impl<H: Handler> ClientHandle<H> {
    pub fn new(
        server: Arc<Server<H>>,
        user_id: impl Into<String>,
        runtime: Handle,
        tx: Sender<ShellEvent>,
        ctx: egui::Context,
    ) -> Self {
        Self {
            server,
            user_id: user_id.into(),
            client_id: Uuid::new_v4().to_string(),
            runtime,
            tx,
            ctx,
        }
    }

    pub fn submit(&self, request: Request) {
        let server = self.server.clone();
        let user_id = self.user_id.clone();
        let client_id = self.client_id.clone();
        let tx = self.tx.clone();
        let ctx = self.ctx.clone();
        self.runtime.spawn(async move {
            let page = server.serve(&user_id, &client_id, request).await;
            if tx.send(ShellEvent::Rendered(page)).is_err() {
                debug!(client = %client_id, "window closed before page arrived");
            }
            ctx.request_repaint();
        });
    }

    /// Publishes local files to the site, then submits their urls under
    /// `name` together with `args` and an `uploaded` event.
    pub fn upload(&self, name: String, paths: Vec<PathBuf>, mut args: Args) {
        let server = self.server.clone();
        let user_id = self.user_id.clone();
        let client_id = self.client_id.clone();
        let tx = self.tx.clone();
        let ctx = self.ctx.clone();
        self.runtime.spawn(async move {
            let event = match server.site().upload(&paths).await {
                Ok(urls) => {
                    args.set(name.clone(), ArgValue::List(urls.clone()));
                    let request = Request::new(args).with_event(name.clone(), UPLOADED_EVENT);
                    let _ = tx.send(ShellEvent::Uploaded { name, urls });
                    ShellEvent::Rendered(server.serve(&user_id, &client_id, request).await)
                }
                Err(err) => {
                    warn!(client = %client_id, error = %err, "upload failed");
                    ShellEvent::UploadFailed {
                        name,
                        message: err.to_string(),
                    }
                }
            };
            let _ = tx.send(event);
            ctx.request_repaint();
        });
    }
}

impl<H: Handler> Drop for ClientHandle<H> {
    fn drop(&mut self) {
        let server = self.server.clone();
        let client_id = std::mem::take(&mut self.client_id);
        self.runtime
            .block_on(async move { server.disconnect(&client_id).await });
    }
}

pub struct Shell<H: Handler> {
    rx: Receiver<ShellEvent>,
    client: ClientHandle<H>,
    page: Option<PageSnapshot>,
    renderer: CardRenderer,
    theme: Theme,
    notice: Option<String>,
}

impl<H: Handler> Shell<H> {
    pub fn new(server: Arc<Server<H>>, user_id: &str, runtime: Handle, ctx: &egui::Context) -> Self {
        let (tx, rx) = mpsc::channel();
        let client = ClientHandle::new(server, user_id, runtime, tx, ctx.clone());
        let theme = Theme::default();
        theme.apply_visuals(ctx);
        client.submit(Request::default());
        Self {
            rx,
            client,
            page: None,
            renderer: CardRenderer::new(),
            theme,
            notice: None,
        }
    }

    fn drain_events(&mut self, ctx: &egui::Context) {
        loop {
            match self.rx.try_recv() {
                Ok(event) => self.apply_event(event, ctx),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    warn!("shell event channel disconnected");
                    break;
                }
            }
        }
    }

    fn apply_event(&mut self, event: ShellEvent, ctx: &egui::Context) {
        match event {
            ShellEvent::Rendered(page) => {
                if !supersedes(self.page.as_ref(), &page) {
                    debug!(revision = page.revision, "dropping out-of-order page");
                    return;
                }
                let theme = page.meta().map(|meta| meta.theme).unwrap_or(ThemeName::Dark);
                if theme != self.theme.name {
                    self.theme = Theme::for_name(theme);
                    self.theme.apply_visuals(ctx);
                }
                if let Some(meta) = page.meta() {
                    ctx.send_viewport_cmd(egui::ViewportCommand::Title(meta.title.clone()));
                }
                self.renderer.sync(&page);
                self.page = Some(page);
            }
            ShellEvent::Uploaded { name, urls } => {
                self.renderer.record_upload(&name, urls);
                self.notice = None;
            }
            ShellEvent::UploadFailed { name, message } => {
                self.notice = Some(format!("Upload to `{name}` failed: {message}"));
            }
        }
    }

    fn dispatch(&self, actions: Vec<UiAction>) {
        for action in actions {
            match action {
                UiAction::Submit(request) => self.client.submit(request),
                UiAction::Upload { name, paths, args } => self.client.upload(name, paths, args),
            }
        }
    }
}

/// Requests finish in any order; only a newer revision replaces the page.
fn supersedes(current: Option<&PageSnapshot>, incoming: &PageSnapshot) -> bool {
    current.map_or(true, |page| incoming.revision > page.revision)
}

fn zone_fraction(zone: &Zone, siblings: usize) -> f32 {
    zone.size
        .as_deref()
        .and_then(|size| size.strip_suffix('%'))
        .and_then(|percent| percent.trim().parse::<f32>().ok())
        .map(|percent| percent / 100.0)
        .unwrap_or(1.0 / siblings.max(1) as f32)
}

struct ZonePainter<'a> {
    page: &'a PageSnapshot,
    renderer: &'a mut CardRenderer,
    theme: &'a Theme,
    site: &'a Site,
    actions: &'a mut Vec<UiAction>,
}

impl ZonePainter<'_> {
    fn cards(&mut self, ui: &mut egui::Ui, zone: &str) {
        for (_, card) in self.page.cards_in_zone(zone) {
            let actions = &mut *self.actions;
            self.renderer
                .render_card(ui, self.theme, self.site, card, &mut |action| actions.push(action));
            ui.add_space(self.theme.spacing_8);
        }
    }

    fn zone(&mut self, ui: &mut egui::Ui, zone: &Zone) {
        if zone.zones.is_empty() {
            self.cards(ui, &zone.name);
            return;
        }
        match zone.direction {
            Direction::Column => {
                for child in &zone.zones {
                    self.zone(ui, child);
                }
            }
            Direction::Row => {
                let width = ui.available_width();
                let spacing = ui.spacing().item_spacing.x;
                let count = zone.zones.len();
                ui.horizontal_top(|ui| {
                    for child in &zone.zones {
                        let child_width = width * zone_fraction(child, count) - spacing;
                        ui.allocate_ui_with_layout(
                            egui::vec2(child_width.max(0.0), ui.available_height()),
                            egui::Layout::top_down(egui::Align::Min),
                            |ui| {
                                ui.set_width(child_width.max(0.0));
                                self.zone(ui, child);
                            },
                        );
                    }
                });
            }
        }
    }

    fn unplaced(&mut self, ui: &mut egui::Ui) {
        for (_, card) in self.page.unplaced() {
            let actions = &mut *self.actions;
            self.renderer
                .render_card(ui, self.theme, self.site, card, &mut |action| actions.push(action));
        }
    }
}

impl<H: Handler> eframe::App for Shell<H> {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_events(ctx);

        let Some(page) = self.page.as_ref() else {
            egui::CentralPanel::default().show(ctx, |ui| {
                ui.centered_and_justified(|ui| ui.spinner());
            });
            return;
        };

        let mut actions = Vec::new();
        let mut painter = ZonePainter {
            page,
            renderer: &mut self.renderer,
            theme: &self.theme,
            site: self.client.server.site(),
            actions: &mut actions,
        };

        egui::TopBottomPanel::top("header")
            .frame(egui::Frame::new().fill(self.theme.surface_0).inner_margin(egui::Margin::same(8)))
            .show(ctx, |ui| painter.cards(ui, "header"));
        egui::TopBottomPanel::bottom("footer")
            .frame(egui::Frame::new().fill(self.theme.surface_0).inner_margin(egui::Margin::same(6)))
            .show(ctx, |ui| painter.cards(ui, "footer"));
        egui::CentralPanel::default().show(ctx, |ui| {
            if let Some(notice) = &self.notice {
                ui.label(RichText::new(notice).color(self.theme.danger));
            }
            ScrollArea::vertical().id_salt("page").show(ui, |ui| {
                if let Some(meta) = page.meta() {
                    for zone in &meta.layout {
                        if zone.name != "header" && zone.name != "footer" {
                            painter.zone(ui, zone);
                        }
                    }
                }
                painter.unplaced(ui);
            });
        });

        self.dispatch(actions);
    }
}
