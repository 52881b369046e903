use launchsampler::Orchestrator;
use launchsampler::model::config::AppConfig;

/// Headless entry point: config, audio, controller, last set. UIs attach
/// as observers through the library API.
fn main() {
    env_logger::init();

    // Ensure all panics are logged properly before crashing.
    std::panic::set_hook(Box::new(|panic_info| {
        let (filename, line) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line()))
            .unwrap_or(("<unknown>", 0));
        let message = panic_info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| panic_info.payload().downcast_ref::<String>().map(|s| s.as_str()))
            .unwrap_or("<no message>");
        log::error!("CRASH in {}:{}: {}", filename, line, message);
        eprintln!("CRASH in {}:{}: {}", filename, line, message);
    }));

    let config = AppConfig::load();
    let mut orchestrator = Orchestrator::new(config);

    if let Err(e) = orchestrator.start() {
        log::error!("[Main] failed to start audio: {e}");
        eprintln!("failed to start audio: {e}");
        std::process::exit(1);
    }
    orchestrator.mount_last_or_default();

    log::info!(
        "[Main] running (audio: {}, controller: {})",
        orchestrator.player().is_audio_running(),
        if orchestrator.player().is_midi_connected() {
            "connected"
        } else {
            "waiting for hot-plug"
        }
    );

    // Block until the user ends the session.
    println!("launchsampler running — press Enter to quit");
    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);

    orchestrator.stop();
}
