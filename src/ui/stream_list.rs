use std::collections::HashMap;
use std::path::PathBuf;

use eframe::egui;

use crate::renderer::poster::PosterCache;
use crate::types::stream::StreamDescriptor;

const LIVE_RED: egui::Color32 = egui::Color32::from_rgb(220, 38, 38);

#[derive(Debug, Clone, PartialEq)]
pub enum StreamListAction {
    Select(String),
    OpenCatalog(PathBuf),
}

/// "HOME vs AWAY" when the stream has teams.
pub fn matchup(stream: &StreamDescriptor) -> Option<String> {
    stream
        .teams
        .as_ref()
        .map(|teams| format!("{} vs {}", teams.home.name, teams.away.name))
}

pub fn card_caption(stream: &StreamDescriptor) -> String {
    format!(
        "{} · {} watching",
        stream.category.as_str().to_uppercase(),
        stream.viewers_label()
    )
}

pub fn live_badge(ui: &mut egui::Ui) {
    ui.label(
        egui::RichText::new(" LIVE ")
            .size(10.0)
            .strong()
            .color(egui::Color32::WHITE)
            .background_color(LIVE_RED),
    );
}

/// Stream cards with poster thumbnails. Textures are kept per poster URL.
#[derive(Default)]
pub struct StreamList {
    thumbnails: HashMap<String, egui::TextureHandle>,
}

impl StreamList {
    pub fn new() -> Self {
        Self::default()
    }

    fn thumbnail(
        &mut self,
        ctx: &egui::Context,
        posters: &mut PosterCache,
        url: &str,
    ) -> Option<egui::TextureHandle> {
        if let Some(texture) = self.thumbnails.get(url) {
            return Some(texture.clone());
        }
        let poster = posters.get(url)?;
        let image = egui::ColorImage::from_rgba_unmultiplied(
            [poster.width as usize, poster.height as usize],
            &poster.rgba,
        );
        let texture = ctx.load_texture(format!("thumb:{}", url), image, egui::TextureOptions::LINEAR);
        self.thumbnails.insert(url.to_string(), texture.clone());
        Some(texture)
    }

    pub fn show(
        &mut self,
        ui: &mut egui::Ui,
        heading: &str,
        streams: &[StreamDescriptor],
        posters: &mut PosterCache,
        selected: Option<&str>,
    ) -> Option<StreamListAction> {
        let mut action = None;
        ui.vertical(|ui| {
            ui.horizontal(|ui| {
                ui.heading(heading);
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("Open catalog…").clicked() {
                        if let Some(path) = rfd::FileDialog::new()
                            .add_filter("Catalog", &["json"])
                            .pick_file()
                        {
                            action = Some(StreamListAction::OpenCatalog(path));
                        }
                    }
                });
            });
            ui.separator();

            if streams.is_empty() {
                ui.label("No streams found");
                return;
            }

            let thumb_size = egui::vec2(96.0, 54.0);
            egui::ScrollArea::vertical()
                .id_salt(heading)
                .show(ui, |ui| {
                    for stream in streams {
                        let is_selected = selected == Some(stream.id.as_str());
                        let frame = egui::Frame::group(ui.style()).fill(if is_selected {
                            ui.visuals().selection.bg_fill.gamma_multiply(0.4)
                        } else {
                            ui.visuals().faint_bg_color
                        });
                        let response = frame
                            .show(ui, |ui| {
                                ui.set_width(ui.available_width());
                                ui.horizontal(|ui| {
                                    let (thumb_rect, _) =
                                        ui.allocate_exact_size(thumb_size, egui::Sense::hover());
                                    match self.thumbnail(ui.ctx(), posters, &stream.thumbnail) {
                                        Some(texture) => {
                                            ui.painter().image(
                                                texture.id(),
                                                thumb_rect,
                                                egui::Rect::from_min_max(
                                                    egui::pos2(0.0, 0.0),
                                                    egui::pos2(1.0, 1.0),
                                                ),
                                                egui::Color32::WHITE,
                                            );
                                        }
                                        None => {
                                            ui.painter().rect_filled(
                                                thumb_rect,
                                                4.0,
                                                egui::Color32::from_gray(40),
                                            );
                                            if posters.is_failed(&stream.thumbnail) {
                                                ui.painter().text(
                                                    thumb_rect.center(),
                                                    egui::Align2::CENTER_CENTER,
                                                    "No image",
                                                    egui::FontId::proportional(10.0),
                                                    egui::Color32::GRAY,
                                                );
                                            }
                                        }
                                    }

                                    ui.vertical(|ui| {
                                        ui.horizontal(|ui| {
                                            if stream.is_live {
                                                live_badge(ui);
                                            }
                                            ui.label(egui::RichText::new(&stream.title).strong());
                                        });
                                        if let Some(teams) = matchup(stream) {
                                            ui.label(egui::RichText::new(teams).size(11.0));
                                        }
                                        ui.label(
                                            egui::RichText::new(card_caption(stream))
                                                .size(10.0)
                                                .color(egui::Color32::GRAY),
                                        );
                                    });
                                });
                            })
                            .response
                            .interact(egui::Sense::click());
                        if response.clicked() {
                            action = Some(StreamListAction::Select(stream.id.clone()));
                        }
                        ui.add_space(4.0);
                    }
                });
        });
        action
    }
}
