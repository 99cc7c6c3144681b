use std::sync::Arc;
use winit::event_loop::EventLoop;

use kai_call::app::{App, AppEvent};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("kai-call v{}", env!("CARGO_PKG_VERSION"));

    // Network and decode work runs on tokio worker threads
    let tokio_rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => Arc::new(rt),
        Err(e) => {
            log::error!("Failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    let event_loop = match EventLoop::<AppEvent>::with_user_event().build() {
        Ok(el) => el,
        Err(e) => {
            log::error!("Failed to create event loop: {}", e);
            std::process::exit(1);
        }
    };

    let proxy = event_loop.create_proxy();

    let mut app = App::new(tokio_rt, proxy);

    log::info!("Starting event loop");
    if let Err(e) = event_loop.run_app(&mut app) {
        log::error!("Event loop failed: {}", e);
        std::process::exit(1);
    }
}
