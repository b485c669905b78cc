mod ops;
mod renderer;
mod types;
mod ui;

use gstreamer as gst;
use log::{error, info};

use crate::renderer::gst_media::GstMediaElement;
use crate::renderer::manifest_engine::ManifestEngineFactory;
use crate::types::config::AppConfig;
use crate::ui::app::PitchsideApp;
use crate::ui::player_surface::Player;

fn main() -> eframe::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::load_or_default();
    if let Err(e) = gst::init() {
        error!("Failed to initialize GStreamer: {}", e);
        std::process::exit(1);
    }
    let media = match GstMediaElement::new() {
        Ok(media) => media,
        Err(e) => {
            error!("No playback pipeline available: {}", e);
            std::process::exit(1);
        }
    };

    let directory = PitchsideApp::load_directory(&config);
    let player = Player::new(
        &config.player,
        Box::new(ManifestEngineFactory::new(&config.player)),
        Box::new(media),
    );
    let (width, height) = config.window_size;
    let app = PitchsideApp::new(config, directory, player);
    info!("Starting Pitchside");

    let native_options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default()
            .with_inner_size([width, height])
            .with_title("Pitchside"),
        ..Default::default()
    };
    eframe::run_native(
        "Pitchside",
        native_options,
        Box::new(|_cc| Ok(Box::new(app))),
    )?;
    Ok(())
}
