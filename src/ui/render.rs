use crate::server::site::Site;
use crate::theme::Theme;
use crate::ui::card::{AnnotatorItem, AnnotatorTag, Card, FormItem, Justify, TextSize};
use crate::ui::event::{ArgValue, Args, Request, UiAction};
use crate::ui::page::PageSnapshot;
use eframe::egui::{self, Color32, RichText, Sense, Stroke, TextureHandle, TextureOptions};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::warn;

const MIN_BOX_SIDE: f32 = 4.0;

/// Annotator events reported to the server.
pub const DRAW_EVENT: &str = "draw";
pub const REMOVE_EVENT: &str = "remove";

struct Drag {
    annotator: String,
    start: egui::Pos2,
}

/// Draws page snapshots with egui and turns widget interaction into
/// [`UiAction`]s. Field values live here between requests.
pub struct CardRenderer {
    revision: u64,
    form_state: BTreeMap<String, ArgValue>,
    upload_paths: BTreeMap<String, String>,
    selected_tags: BTreeMap<String, String>,
    drag: Option<Drag>,
    textures: HashMap<PathBuf, (SystemTime, TextureHandle)>,
    broken: HashMap<PathBuf, Option<SystemTime>>,
}

impl Default for CardRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl CardRenderer {
    pub fn new() -> Self {
        Self {
            revision: 0,
            form_state: BTreeMap::new(),
            upload_paths: BTreeMap::new(),
            selected_tags: BTreeMap::new(),
            drag: None,
            textures: HashMap::new(),
            broken: HashMap::new(),
        }
    }

    /// Reseeds field values from a new snapshot. Recorded uploads survive so
    /// they travel with later submits.
    pub fn sync(&mut self, snapshot: &PageSnapshot) {
        if snapshot.revision <= self.revision {
            return;
        }
        self.revision = snapshot.revision;
        self.form_state
            .retain(|_, value| matches!(value, ArgValue::List(_)));
        for (_, card) in &snapshot.cards {
            seed_values(card.items(), &mut self.form_state);
        }
    }

    pub fn record_upload(&mut self, name: &str, urls: Vec<String>) {
        self.upload_paths.remove(name);
        self.form_state.insert(name.to_string(), ArgValue::List(urls));
    }

    #[cfg(test)]
    pub fn value(&self, name: &str) -> Option<&ArgValue> {
        self.form_state.get(name)
    }

    /// Arguments for a trigger: the trigger's own value plus every field the
    /// card carries along.
    pub fn submission(&self, card: &Card, trigger: &str, value: Option<ArgValue>) -> Args {
        let mut args = Args::new();
        for name in card.field_names() {
            if name == trigger {
                continue;
            }
            if let Some(value) = self.form_state.get(name) {
                args.set(name, value.clone());
            }
        }
        if let Some(value) = value {
            args.set(trigger, value);
        }
        args
    }

    /// Stores edited boxes and reports them at once, so re-renders of other
    /// cards keep them.
    pub fn annotator_edit(&mut self, name: &str, items: Vec<AnnotatorItem>, event: &str) -> Request {
        let value = ArgValue::Items(items);
        self.form_state.insert(name.to_string(), value.clone());
        Request::new(Args::new().with(name, value)).with_event(name, event)
    }

    pub fn render_card(
        &mut self,
        ui: &mut egui::Ui,
        theme: &Theme,
        site: &Site,
        card: &Card,
        emit: &mut dyn FnMut(UiAction),
    ) {
        match card {
            Card::Meta(_) => {}
            Card::Header(header) => {
                theme.card_frame().show(ui, |ui| {
                    ui.set_width(ui.available_width());
                    ui.horizontal(|ui| {
                        ui.vertical(|ui| {
                            ui.heading(RichText::new(&header.title).color(theme.text_primary).strong());
                            ui.label(RichText::new(&header.subtitle).color(theme.text_muted));
                        });
                        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                            self.render_items(ui, theme, site, card, &header.items, emit);
                        });
                    });
                });
            }
            Card::Footer(footer) => {
                ui.vertical_centered(|ui| {
                    ui.label(RichText::new(&footer.caption).color(theme.text_muted).small());
                });
            }
            Card::Form(form) => {
                theme.card_frame().show(ui, |ui| {
                    ui.set_width(ui.available_width());
                    ui.vertical(|ui| {
                        ui.spacing_mut().item_spacing.y = theme.spacing_8;
                        self.render_items(ui, theme, site, card, &form.items, emit);
                    });
                });
            }
        }
    }

    fn render_items(
        &mut self,
        ui: &mut egui::Ui,
        theme: &Theme,
        site: &Site,
        card: &Card,
        items: &[FormItem],
        emit: &mut dyn FnMut(UiAction),
    ) {
        for item in items {
            self.render_item(ui, theme, site, card, item, emit);
        }
    }

    fn render_item(
        &mut self,
        ui: &mut egui::Ui,
        theme: &Theme,
        site: &Site,
        card: &Card,
        item: &FormItem,
        emit: &mut dyn FnMut(UiAction),
    ) {
        match item {
            FormItem::Text { content, size } => {
                let text = RichText::new(content).color(theme.text_primary);
                match size {
                    TextSize::Normal => ui.label(text),
                    TextSize::Large => ui.label(text.size(18.0).strong()),
                };
            }
            FormItem::Textbox {
                name,
                label,
                suffix,
                ..
            } => {
                let mut text = match self.form_state.get(name) {
                    Some(ArgValue::Text(value)) => value.clone(),
                    _ => String::new(),
                };
                ui.label(RichText::new(label).color(theme.text_muted).size(12.0));
                ui.horizontal(|ui| {
                    let width = if suffix.is_some() {
                        ui.available_width() - 32.0
                    } else {
                        ui.available_width()
                    };
                    ui.add(egui::TextEdit::singleline(&mut text).desired_width(width));
                    if let Some(suffix) = suffix {
                        ui.label(RichText::new(suffix).color(theme.text_muted));
                    }
                });
                if text.is_empty() {
                    self.form_state.remove(name);
                } else {
                    self.form_state.insert(name.clone(), ArgValue::Text(text));
                }
            }
            FormItem::Buttons { items, justify } => {
                let mut clicked = None;
                let mut row = |ui: &mut egui::Ui| {
                    for button in items {
                        let (fill, stroke, text_color) = theme.button_colors(button.primary);
                        let widget = egui::Button::new(RichText::new(&button.label).color(text_color))
                            .fill(fill)
                            .stroke(stroke)
                            .corner_radius(egui::CornerRadius::same(theme.radius_8))
                            .min_size(egui::vec2(0.0, theme.button_height));
                        if ui.add(widget).clicked() {
                            clicked = Some(button.name.clone());
                        }
                    }
                };
                match justify {
                    Justify::Start => {
                        ui.horizontal(|ui| row(ui));
                    }
                    Justify::Center => {
                        ui.vertical_centered(|ui| row(ui));
                    }
                }
                if let Some(name) = clicked {
                    let args = self.submission(card, &name, Some(ArgValue::Bool(true)));
                    emit(UiAction::Submit(Request::new(args)));
                }
            }
            FormItem::Separator => {
                ui.separator();
            }
            FormItem::Dropdown {
                name,
                label,
                choices,
                trigger,
                ..
            } => {
                let current = match self.form_state.get(name) {
                    Some(ArgValue::Text(value)) => Some(value.clone()),
                    _ => None,
                };
                let shown = current
                    .as_deref()
                    .and_then(|value| choices.iter().find(|choice| choice.name == value))
                    .map(|choice| choice.label.clone())
                    .unwrap_or_default();
                ui.label(RichText::new(label).color(theme.text_muted).size(12.0));
                let mut picked = None;
                egui::ComboBox::from_id_salt(name)
                    .selected_text(shown)
                    .width(ui.available_width())
                    .show_ui(ui, |ui| {
                        for choice in choices {
                            let selected = current.as_deref() == Some(choice.name.as_str());
                            if ui.selectable_label(selected, &choice.label).clicked() && !selected {
                                picked = Some(choice.name.clone());
                            }
                        }
                    });
                if let Some(value) = picked {
                    let value = ArgValue::Text(value);
                    self.form_state.insert(name.clone(), value.clone());
                    if *trigger {
                        emit(UiAction::Submit(Request::new(self.submission(card, name, Some(value)))));
                    }
                }
            }
            FormItem::Toggle {
                name,
                label,
                trigger,
                ..
            } => {
                let mut on = matches!(self.form_state.get(name), Some(ArgValue::Bool(true)));
                if ui
                    .checkbox(&mut on, RichText::new(label).color(theme.text_primary))
                    .changed()
                {
                    let value = ArgValue::Bool(on);
                    self.form_state.insert(name.clone(), value.clone());
                    if *trigger {
                        emit(UiAction::Submit(Request::new(self.submission(card, name, Some(value)))));
                    }
                }
            }
            FormItem::FileUpload {
                name,
                label,
                multiple,
                extensions,
            } => self.render_upload(ui, theme, card, name, label, *multiple, extensions, emit),
            FormItem::Image { title, path } => {
                ui.label(RichText::new(title).color(theme.text_muted).size(12.0));
                match self.texture(ui.ctx(), site, path) {
                    Some(texture) => {
                        ui.add(
                            egui::Image::new(&texture)
                                .max_width(ui.available_width())
                                .maintain_aspect_ratio(true),
                        );
                    }
                    None => {
                        ui.label(RichText::new(format!("image unavailable: {path}")).color(theme.danger));
                    }
                }
            }
            FormItem::ImageAnnotator {
                name,
                title,
                image,
                tags,
                image_height,
                ..
            } => {
                let edit = self.render_annotator(ui, theme, site, name, title, image, tags, image_height.as_deref());
                if let Some((items, event)) = edit {
                    emit(UiAction::Submit(self.annotator_edit(name, items, event)));
                }
            }
            FormItem::Stats { items } => {
                ui.horizontal_wrapped(|ui| {
                    for stat in items {
                        theme.panel_frame(theme.surface_3, theme.spacing_8 as i8).show(ui, |ui| {
                            ui.vertical(|ui| {
                                ui.label(RichText::new(&stat.label).color(theme.text_muted).size(12.0));
                                ui.label(RichText::new(&stat.value).color(theme.accent_primary).strong());
                                ui.label(RichText::new(&stat.caption).color(theme.text_muted).size(12.0));
                            });
                        });
                    }
                });
            }
            FormItem::Link { label, path } => {
                ui.hyperlink_to(label, link_target(site, path));
            }
            FormItem::Expander { name, label, items } => {
                egui::CollapsingHeader::new(RichText::new(label).color(theme.text_primary))
                    .id_salt(name)
                    .show(ui, |ui| {
                        self.render_items(ui, theme, site, card, items, emit);
                    });
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn render_upload(
        &mut self,
        ui: &mut egui::Ui,
        theme: &Theme,
        card: &Card,
        name: &str,
        label: &str,
        multiple: bool,
        extensions: &[String],
        emit: &mut dyn FnMut(UiAction),
    ) {
        ui.label(RichText::new(label).color(theme.text_muted).size(12.0));
        if let Some(ArgValue::List(urls)) = self.form_state.get(name) {
            for url in urls {
                ui.label(RichText::new(url.rsplit('/').next().unwrap_or(url)).color(theme.text_primary).small());
            }
        }

        let typed = self.upload_paths.entry(name.to_string()).or_default();
        let mut submit = false;
        ui.horizontal(|ui| {
            ui.add(
                egui::TextEdit::singleline(&mut *typed)
                    .hint_text("path, or drop files here")
                    .desired_width(ui.available_width() - 80.0),
            );
            submit = ui.button("Upload").clicked();
        });

        let mut paths: Vec<PathBuf> = if submit {
            typed
                .split(';')
                .map(str::trim)
                .filter(|path| !path.is_empty())
                .map(PathBuf::from)
                .collect()
        } else {
            Vec::new()
        };
        let dropped = ui.ctx().input_mut(|input| std::mem::take(&mut input.raw.dropped_files));
        paths.extend(dropped.into_iter().filter_map(|file| file.path));
        paths.retain(|path| accepts(path, extensions));
        if !multiple {
            paths.truncate(1);
        }

        if !paths.is_empty() {
            emit(UiAction::Upload {
                name: name.to_string(),
                paths,
                args: self.submission(card, name, None),
            });
        }
    }

    /// Returns the new box list and the event name when the user drew or
    /// removed a box this frame.
    #[allow(clippy::too_many_arguments)]
    fn render_annotator(
        &mut self,
        ui: &mut egui::Ui,
        theme: &Theme,
        site: &Site,
        name: &str,
        title: &str,
        image: &str,
        tags: &[AnnotatorTag],
        image_height: Option<&str>,
    ) -> Option<(Vec<AnnotatorItem>, &'static str)> {
        ui.label(RichText::new(title).color(theme.text_muted).size(12.0));

        let selected = self
            .selected_tags
            .get(name)
            .filter(|tag| tags.iter().any(|known| &known.name == *tag))
            .cloned()
            .or_else(|| tags.first().map(|tag| tag.name.clone()));
        ui.horizontal_wrapped(|ui| {
            for tag in tags {
                let color = tag_color(tag, theme);
                let active = selected.as_deref() == Some(tag.name.as_str());
                if ui
                    .selectable_label(active, RichText::new(&tag.label).color(color))
                    .clicked()
                {
                    self.selected_tags.insert(name.to_string(), tag.name.clone());
                }
            }
        });

        let Some(texture) = self.texture(ui.ctx(), site, image) else {
            ui.label(RichText::new(format!("image unavailable: {image}")).color(theme.danger));
            return None;
        };
        let natural = texture.size_vec2();
        let height = image_height
            .and_then(|height| height.trim_end_matches("px").parse::<f32>().ok())
            .unwrap_or(natural.y);
        let mut scale = height / natural.y.max(1.0);
        if natural.x * scale > ui.available_width() {
            scale = ui.available_width() / natural.x.max(1.0);
        }
        let (rect, response) = ui.allocate_exact_size(natural * scale, Sense::click_and_drag());
        let to_image = |pos: egui::Pos2| ((pos - rect.min) / scale).to_pos2();
        let to_screen = |x: f32, y: f32| rect.min + egui::vec2(x, y) * scale;

        let mut items = match self.form_state.get(name) {
            Some(ArgValue::Items(items)) => items.clone(),
            _ => Vec::new(),
        };
        let mut event = None;

        if response.drag_started() {
            if let Some(pos) = response.interact_pointer_pos() {
                self.drag = Some(Drag {
                    annotator: name.to_string(),
                    start: to_image(rect.clamp(pos)),
                });
            }
        }
        let pointer = response
            .interact_pointer_pos()
            .or_else(|| ui.ctx().pointer_latest_pos())
            .map(|pos| to_image(rect.clamp(pos)));
        if response.drag_stopped() {
            if let (Some(drag), Some(end), Some(tag)) = (self.drag.take(), pointer, selected.as_ref()) {
                let item = AnnotatorItem {
                    tag: tag.clone(),
                    x1: drag.start.x,
                    y1: drag.start.y,
                    x2: end.x,
                    y2: end.y,
                }
                .normalized();
                if drag.annotator == name
                    && item.x2 - item.x1 >= MIN_BOX_SIDE
                    && item.y2 - item.y1 >= MIN_BOX_SIDE
                {
                    items.push(item);
                    event = Some(DRAW_EVENT);
                }
            }
        }
        if response.secondary_clicked() {
            if let Some(pos) = pointer {
                if let Some(index) = items.iter().rposition(|item| {
                    (item.x1..=item.x2).contains(&pos.x) && (item.y1..=item.y2).contains(&pos.y)
                }) {
                    items.remove(index);
                    event = Some(REMOVE_EVENT);
                }
            }
        }

        let painter = ui.painter_at(rect);
        painter.image(
            texture.id(),
            rect,
            egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
            Color32::WHITE,
        );
        for item in &items {
            let color = tags
                .iter()
                .find(|tag| tag.name == item.tag)
                .map(|tag| tag_color(tag, theme))
                .unwrap_or(theme.text_muted);
            let bounds = egui::Rect::from_min_max(to_screen(item.x1, item.y1), to_screen(item.x2, item.y2));
            painter.rect_stroke(bounds, 0.0, Stroke::new(2.0, color), egui::StrokeKind::Middle);
            painter.text(
                bounds.left_top(),
                egui::Align2::LEFT_BOTTOM,
                &item.tag,
                egui::FontId::proportional(12.0),
                color,
            );
        }
        if let (Some(drag), Some(pos)) = (&self.drag, pointer) {
            if drag.annotator == name && response.dragged() {
                let bounds = egui::Rect::from_two_pos(to_screen(drag.start.x, drag.start.y), to_screen(pos.x, pos.y));
                painter.rect_stroke(bounds, 0.0, Stroke::new(1.0, theme.accent_primary), egui::StrokeKind::Middle);
            }
        }

        event.map(|event| (items, event))
    }

    /// Texture for an image reference, reloaded when the file changes on disk.
    fn texture(&mut self, ctx: &egui::Context, site: &Site, reference: &str) -> Option<TextureHandle> {
        let path = site.locate(reference)?;
        let modified = std::fs::metadata(&path).and_then(|meta| meta.modified()).ok();
        if let (Some(modified), Some((stamp, handle))) = (modified, self.textures.get(&path)) {
            if *stamp == modified {
                return Some(handle.clone());
            }
        }
        if self.broken.get(&path) == Some(&modified) {
            return None;
        }

        let decoded = match image::open(&path) {
            Ok(decoded) => decoded.to_rgba8(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "image could not be decoded");
                self.broken.insert(path, modified);
                return None;
            }
        };
        self.broken.remove(&path);
        let size = [decoded.width() as usize, decoded.height() as usize];
        let color_image = egui::ColorImage::from_rgba_unmultiplied(size, decoded.as_raw());
        let handle = ctx.load_texture(path.display().to_string(), color_image, TextureOptions::LINEAR);
        if let Some(modified) = modified {
            self.textures.insert(path, (modified, handle.clone()));
        }
        Some(handle)
    }
}

fn seed_values(items: &[FormItem], state: &mut BTreeMap<String, ArgValue>) {
    for item in items {
        match item {
            FormItem::Textbox {
                name,
                value: Some(value),
                ..
            }
            | FormItem::Dropdown {
                name,
                value: Some(value),
                ..
            } => {
                state.insert(name.clone(), ArgValue::Text(value.clone()));
            }
            FormItem::Toggle { name, value, .. } => {
                state.insert(name.clone(), ArgValue::Bool(*value));
            }
            FormItem::ImageAnnotator { name, items, .. } => {
                state.insert(name.clone(), ArgValue::Items(items.clone()));
            }
            FormItem::Expander { items, .. } => seed_values(items, state),
            _ => {}
        }
    }
}

fn accepts(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

fn tag_color(tag: &AnnotatorTag, theme: &Theme) -> Color32 {
    Color32::from_hex(&tag.color).unwrap_or(theme.accent_primary)
}

/// Site files open from disk; anything else is passed through as a url.
fn link_target(site: &Site, path: &str) -> String {
    if path.starts_with(crate::server::site::FILE_PREFIX) {
        if let Some(local) = site.locate(path) {
            let local = std::fs::canonicalize(&local).unwrap_or(local);
            return format!("file://{}", local.display());
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::card::{Button, FormCard};
    use crate::ui::page::Page;

    fn controls(value: Option<&str>) -> Card {
        Card::Form(FormCard {
            zone: "controls".to_string(),
            items: vec![
                FormItem::Dropdown {
                    name: "style_model".to_string(),
                    label: "Style".to_string(),
                    value: value.map(str::to_string),
                    choices: Vec::new(),
                    trigger: true,
                },
                FormItem::Textbox {
                    name: "note".to_string(),
                    label: "Note".to_string(),
                    value: Some("hello".to_string()),
                    suffix: None,
                },
                FormItem::FileUpload {
                    name: "upload_image".to_string(),
                    label: "Upload".to_string(),
                    multiple: false,
                    extensions: vec!["png".to_string()],
                },
                FormItem::buttons(vec![Button::primary("apply_style", "Apply")], Justify::Center),
            ],
        })
    }

    fn snapshot(page: &mut Page, card: Card) -> PageSnapshot {
        page.set("controls", card).expect("card should be valid");
        page.save()
    }

    #[test]
    fn button_submission_carries_fields_but_not_triggers() {
        let mut renderer = CardRenderer::new();
        let card = controls(Some("candy"));
        renderer.sync(&snapshot(&mut Page::new(), card.clone()));
        renderer.record_upload("upload_image", vec!["/_f/1/cat.png".to_string()]);

        let args = renderer.submission(&card, "apply_style", Some(ArgValue::Bool(true)));
        assert!(args.flag("apply_style"));
        assert_eq!(args.get("note"), Some(&ArgValue::Text("hello".to_string())));
        assert_eq!(
            args.get("upload_image"),
            Some(&ArgValue::List(vec!["/_f/1/cat.png".to_string()]))
        );
        assert!(args.get("style_model").is_none());
    }

    #[test]
    fn recorded_uploads_survive_resync() {
        let mut renderer = CardRenderer::new();
        let mut page = Page::new();
        renderer.sync(&snapshot(&mut page, controls(Some("candy"))));
        renderer.record_upload("upload_image", vec!["/_f/1/cat.png".to_string()]);
        renderer.sync(&snapshot(&mut page, controls(None)));

        assert!(renderer.value("upload_image").is_some());
        assert_eq!(renderer.value("style_model"), None);
    }

    #[test]
    fn annotator_edit_is_reported_with_its_event() {
        let mut renderer = CardRenderer::new();
        let boxes = vec![AnnotatorItem {
            tag: "car".to_string(),
            x1: 1.0,
            y1: 2.0,
            x2: 30.0,
            y2: 40.0,
        }];

        let request = renderer.annotator_edit("annotator", boxes.clone(), DRAW_EVENT);
        assert_eq!(request.args.get("annotator"), Some(&ArgValue::Items(boxes.clone())));
        assert_eq!(
            request.events.get("annotator"),
            Some(&ArgValue::Text(DRAW_EVENT.to_string()))
        );
        assert_eq!(renderer.value("annotator"), Some(&ArgValue::Items(boxes)));
    }

    #[test]
    fn older_snapshots_do_not_reseed_fields() {
        let mut renderer = CardRenderer::new();
        let mut page = Page::new();
        let stale = snapshot(&mut page, controls(Some("candy")));
        let fresh = snapshot(&mut page, controls(Some("mosaic")));

        renderer.sync(&fresh);
        renderer.sync(&stale);
        assert_eq!(renderer.value("style_model"), Some(&ArgValue::Text("mosaic".to_string())));
    }

    #[test]
    fn upload_extensions_are_case_insensitive() {
        let allowed = vec!["png".to_string(), "jpg".to_string()];
        assert!(accepts(Path::new("/tmp/a.PNG"), &allowed));
        assert!(!accepts(Path::new("/tmp/a.gif"), &allowed));
        assert!(accepts(Path::new("/tmp/a.gif"), &[]));
    }

    #[test]
    fn site_links_point_at_local_files() {
        let site = Site::new("/srv/site", "/srv");
        assert_eq!(link_target(&site, "/_f/abc/out.csv"), "file:///srv/site/abc/out.csv");
        assert_eq!(link_target(&site, "https://example.org"), "https://example.org");
    }
}
