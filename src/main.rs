use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use outpost::auth::{RecaptchaVerifier, StaticTokens};
use outpost::config::{self, Settings};
use outpost::monitor::NodeMonitor;
use outpost::provision::Provisioner;
use outpost::relay::{self, ConsoleRelay};
use outpost::store::MemoryStore;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let settings = match std::env::args().nth(1) {
        Some(path) => match config::load_settings(&path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("{}; using defaults", e);
                Settings::default()
            }
        },
        None => Settings::default(),
    };

    let store = Arc::new(MemoryStore::new());

    let monitor = Arc::new(NodeMonitor::new(
        store.clone(),
        Duration::from_secs(settings.poll_interval_secs),
        &settings.node_scheme,
    ));
    monitor.start().await;

    // Request handlers (record CRUD, auth plumbing) live in front of this
    // crate; the provisioner is the entry point they call into.
    let _provisioner = Provisioner::new(
        store.clone(),
        Arc::new(RecaptchaVerifier::new(&settings.captcha_secret)),
        settings.captcha_required,
        settings.placement_threshold,
        &settings.node_scheme,
    );

    let tokens = Arc::new(StaticTokens::new());
    let relay = Arc::new(ConsoleRelay::new(
        store.clone(),
        tokens,
        &settings.node_scheme,
    ));

    info!(
        "Starting outpost console relay on {}:{}",
        settings.host, settings.port
    );
    let api = relay::setup(&settings.host, settings.port, relay);
    api.start().await;
}
