mod api;
mod app;
mod config_editor;
mod fetch;
mod preview;
mod tree;

use log::info;
use std::env;

fn main() -> eframe::Result {
    dotenv::dotenv().ok();
    // Initialize env_logger. You can override the log level with the
    // RUST_LOG environment variable, e.g. `RUST_LOG=debug cargo run`.
    env::set_var("RUST_LOG", env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()));
    env_logger::init();

    info!("Starting the scene generation client");
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1050.0, 750.0])
            .with_min_inner_size([820.0, 600.0])
            .with_title("Scene Generation Client"),
        ..Default::default()
    };
    eframe::run_native(
        "sceneview",
        options,
        Box::new(|cc| Ok(Box::new(app::App::new(cc)?))),
    )
}
