use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;

use eframe::egui;
use log::{info, warn};

use crate::ops::directory::{CatalogDirectory, InMemoryHistory, StreamDirectory, WatchHistory};
use crate::renderer::poster::PosterCache;
use crate::types::config::AppConfig;
use crate::types::stream::{PlayerMount, StreamDescriptor};
use crate::ui::player_surface::Player;
use crate::ui::stream_list::{StreamList, StreamListAction, live_badge};

pub struct PitchsideApp {
    config: AppConfig,
    directory: CatalogDirectory,
    history: InMemoryHistory,
    posters: PosterCache,
    player: Player,
    stream_list: StreamList,
    selected: Option<StreamDescriptor>,
    ended: Rc<Cell<bool>>,
    status: Option<String>,
}

impl PitchsideApp {
    pub fn new(config: AppConfig, directory: CatalogDirectory, mut player: Player) -> Self {
        let ended = Rc::new(Cell::new(false));
        let flag = ended.clone();
        player.set_on_ended(move || flag.set(true));
        Self {
            history: InMemoryHistory::new(config.history_limit),
            posters: PosterCache::new(config.poster_cache_size),
            config,
            directory,
            player,
            stream_list: StreamList::new(),
            selected: None,
            ended,
            status: None,
        }
    }

    /// Catalog named by the config, or the built-in demo catalog.
    pub fn load_directory(config: &AppConfig) -> CatalogDirectory {
        let Some(path) = config.catalog_path.as_deref() else {
            return CatalogDirectory::builtin();
        };
        match CatalogDirectory::from_file(Path::new(path)) {
            Ok(directory) => directory,
            Err(e) => {
                warn!("Falling back to built-in catalog, {} failed: {}", path, e);
                CatalogDirectory::builtin()
            }
        }
    }

    pub fn selected(&self) -> Option<&StreamDescriptor> {
        self.selected.as_ref()
    }

    pub fn history(&self) -> &InMemoryHistory {
        &self.history
    }

    /// Opens the watch view for `id`. Unknown ids leave the current stream playing.
    pub fn select_stream(&mut self, id: &str) -> bool {
        let Some(stream) = self.directory.get_stream_by_id(id) else {
            self.status = Some(format!("Stream {} not found", id));
            return false;
        };
        info!("Watching {} ({})", stream.title, stream.id);
        self.history.record(&stream);
        self.player
            .mount(PlayerMount::from_stream(&stream, self.config.player.auto_play));
        self.selected = Some(stream);
        self.status = None;
        true
    }

    pub fn open_catalog(&mut self, path: &Path) {
        match CatalogDirectory::from_file(path) {
            Ok(directory) => {
                self.directory = directory;
                self.status = None;
                let still_listed = self
                    .selected
                    .as_ref()
                    .is_some_and(|s| self.directory.get_stream_by_id(&s.id).is_some());
                if !still_listed {
                    self.selected = None;
                    self.player.unmount();
                }
            }
            Err(e) => {
                warn!("Failed to open catalog {}: {}", path.display(), e);
                self.status = Some(format!("Could not open {}: {}", path.display(), e));
            }
        }
    }

    /// Streams other than the one being watched.
    pub fn up_next(&self) -> Vec<StreamDescriptor> {
        let current = self.selected.as_ref().map(|s| s.id.as_str());
        self.directory
            .list_streams()
            .into_iter()
            .filter(|s| Some(s.id.as_str()) != current)
            .collect()
    }

    /// Applies an end-of-stream reported by the player since the last call.
    pub fn poll_ended(&mut self) -> bool {
        if !self.ended.replace(false) {
            return false;
        }
        if let Some(stream) = &self.selected {
            self.history.mark_completed(&stream.id);
        }
        true
    }

    fn sync_poster(&mut self, ctx: &egui::Context) {
        if self.player.has_poster() {
            return;
        }
        let Some(url) = self.player.mounted().and_then(|m| m.poster_url.clone()) else {
            return;
        };
        if let Some(poster) = self.posters.get(&url) {
            self.player.set_poster(ctx, &poster);
        }
    }

    fn apply(&mut self, action: Option<StreamListAction>) {
        match action {
            Some(StreamListAction::Select(id)) => {
                self.select_stream(&id);
            }
            Some(StreamListAction::OpenCatalog(path)) => self.open_catalog(&path),
            None => {}
        }
    }

    fn history_panel(&mut self, ui: &mut egui::Ui) -> Option<StreamListAction> {
        let mut action = None;
        ui.heading("Recently watched");
        ui.separator();
        let entries = self.history.recent(self.config.history_limit);
        if entries.is_empty() {
            ui.label(egui::RichText::new("Nothing watched yet").color(egui::Color32::GRAY));
        }
        for entry in entries {
            ui.horizontal(|ui| {
                if ui.link(&entry.title).clicked() {
                    action = Some(StreamListAction::Select(entry.stream_id.clone()));
                }
                if entry.completed {
                    ui.label(egui::RichText::new("✔").color(egui::Color32::GRAY));
                }
            });
        }
        action
    }

    fn watch_view(&mut self, ui: &mut egui::Ui, stream: &StreamDescriptor) -> Option<StreamListAction> {
        self.player.show(ui);
        ui.add_space(12.0);

        ui.horizontal(|ui| {
            if stream.is_live {
                live_badge(ui);
            }
            ui.heading(&stream.title);
        });
        if let Some(description) = &stream.description {
            ui.label(description);
        }
        ui.label(
            egui::RichText::new(format!("{} watching", stream.viewers_label()))
                .color(egui::Color32::GRAY),
        );
        ui.add_space(8.0);

        ui.columns(2, |columns| {
            columns[0].group(|ui| {
                ui.strong("Match Info");
                match &stream.teams {
                    Some(teams) => {
                        ui.horizontal(|ui| {
                            ui.label(egui::RichText::new(&teams.home.logo).strong());
                            ui.label(&teams.home.name);
                            ui.label(egui::RichText::new("vs").color(egui::Color32::GRAY));
                            ui.label(&teams.away.name);
                            ui.label(egui::RichText::new(&teams.away.logo).strong());
                        });
                    }
                    None => {
                        ui.label(egui::RichText::new("No teams listed").color(egui::Color32::GRAY));
                    }
                }
            });
            columns[1].group(|ui| {
                ui.strong("League");
                ui.label(stream.category.as_str().to_uppercase());
            });
        });

        ui.add_space(12.0);
        let mut action = None;
        let up_next = self.up_next();
        if !up_next.is_empty() {
            ui.strong("Up next");
            ui.horizontal_wrapped(|ui| {
                for next in &up_next {
                    if ui.button(&next.title).clicked() {
                        action = Some(StreamListAction::Select(next.id.clone()));
                    }
                }
            });
        }
        action
    }
}

impl eframe::App for PitchsideApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.posters.poll();
        self.player.frame(ctx);
        self.poll_ended();
        self.sync_poster(ctx);

        // Left: stream directory and history
        let mut action = None;
        egui::SidePanel::left("stream_panel")
            .default_width(340.0)
            .show(ctx, |ui| {
                let streams = self.directory.list_streams();
                let selected = self.selected.as_ref().map(|s| s.id.clone());
                let picked = self.stream_list.show(
                    ui,
                    "Live Now",
                    &streams,
                    &mut self.posters,
                    selected.as_deref(),
                );
                action = action.take().or(picked);
                ui.add_space(12.0);
                let picked = self.history_panel(ui);
                action = action.take().or(picked);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            if let Some(status) = &self.status {
                ui.colored_label(egui::Color32::from_rgb(239, 68, 68), status);
            }
            match self.selected.clone() {
                Some(stream) => {
                    egui::ScrollArea::vertical().show(ui, |ui| {
                        let picked = self.watch_view(ui, &stream);
                        action = action.take().or(picked);
                    });
                }
                None => {
                    ui.centered_and_justified(|ui| {
                        ui.label(
                            egui::RichText::new("Select a stream to start watching")
                                .size(18.0)
                                .color(egui::Color32::GRAY),
                        );
                    });
                }
            }
        });

        self.apply(action);
    }
}
