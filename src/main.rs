//! FocusMon - desktop activity monitor with focus feedback.
//!
//! Captures activity until Ctrl+C, then flushes the log and exports the
//! labelled training sessions.

use focusmon::backend::BackendClient;
use focusmon::collaborators::UserPrompt;
use focusmon::model::{BaselinePredictor, BaselineWeights, DatasetTrainer};
use focusmon::settings::{default_data_dir, SettingsStore};
use focusmon::{ActivityMonitor, Collaborators, MonitorConfig, MonitorContext};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("focusmon=info")),
        )
        .init();

    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║              FocusMon - Focus Monitor                      ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();

    println!("🔧 Loading settings...");
    let data_dir = default_data_dir();
    let settings = Arc::new(SettingsStore::open(&data_dir)?);
    let config = MonitorConfig::from_store(&settings, &data_dir);
    println!("   ✓ Data directory: {}", data_dir.display());

    let mut ctx = MonitorContext::new(config.clone());

    if config.server_port > 0 {
        ctx.broadcast_tx = Some(focusmon::server::broadcast_channel());
    }

    if let Some(url) = &config.backend_url {
        println!("🔧 Connecting activity log backend...");
        match BackendClient::spawn(url) {
            Ok(client) => {
                println!("   ✓ Uploading to {url} (session {})", client.session_id());
                ctx.backend = Some(client);
            }
            Err(e) => println!("   ⚠ Backend disabled: {e}"),
        }
    }

    if config.server_port > 0 {
        println!("🔧 Starting HTTP server...");
        let started = focusmon::server::start_server(
            ctx.clone(),
            Some(Arc::clone(&settings)),
            config.server_port,
        );
        match started {
            Ok(addr) => {
                println!("   ✓ HTTP server listening on http://{addr}");
                println!("   • GET /api/status - Monitor status");
                println!("   • WS  /ws         - Real-time updates");
            }
            Err(e) => println!("   ⚠ HTTP server disabled: {e}"),
        }
    }

    let predictor = BaselinePredictor::new(
        BaselineWeights::default(),
        config.flush_interval,
        config.gaze_poll_interval,
    );
    let trainer = DatasetTrainer::new(&data_dir, config.focus_label_threshold);
    println!("   ✓ Training sessions export to {}", trainer.path().display());

    let collaborators = platform_collaborators(Collaborators::new(
        Arc::new(predictor),
        Arc::new(trainer),
        platform_prompt(),
    ));

    let monitor = ActivityMonitor::new(ctx, collaborators);

    // Shutdown signal
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_ctrlc = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        println!("\n🛑 Shutdown signal received...");
        shutdown_ctrlc.store(true, Ordering::SeqCst);
    })?;

    println!("🔧 Starting monitor...");
    monitor.start()?;

    println!();
    println!("════════════════════════════════════════════════════════════════");
    println!("🎯 FocusMon is running. Press Ctrl+C to quit.");
    println!("════════════════════════════════════════════════════════════════");
    println!();

    // A failed input listener also ends the run.
    while !shutdown.load(Ordering::SeqCst) && monitor.is_running() {
        thread::sleep(Duration::from_millis(200));
    }

    println!("\n⏳ Shutting down...");
    let state = Arc::clone(&monitor.context().state);
    let report = monitor.stop();

    println!();
    println!("════════════════════════════════════════════════════════════════");
    println!("📊 Session Summary");
    println!("════════════════════════════════════════════════════════════════");
    println!("   Focus reports:   {}", state.focus_session_count());
    println!("   Unfocused time:  {}s", state.unfocused_duration().as_secs());
    println!("   Final flush:     {} events", report.flushed_events);
    println!("   Log size:        {} events", report.log_events);
    println!(
        "   Training export: {}",
        if report.retrained { "done" } else { "skipped" }
    );
    println!("════════════════════════════════════════════════════════════════");

    println!("\n👋 FocusMon has exited. Goodbye!");
    Ok(())
}

#[cfg(windows)]
fn platform_prompt() -> Arc<dyn UserPrompt> {
    Arc::new(focusmon::prompt::DesktopPrompt::default())
}

#[cfg(not(windows))]
fn platform_prompt() -> Arc<dyn UserPrompt> {
    Arc::new(focusmon::prompt::ConsolePrompt)
}

#[cfg(windows)]
fn platform_collaborators(collaborators: Collaborators) -> Collaborators {
    collaborators
        .with_window_source(Box::new(focusmon::winapi_utils::ForegroundWindowSource))
        .with_system_input(true)
}

#[cfg(not(windows))]
fn platform_collaborators(collaborators: Collaborators) -> Collaborators {
    collaborators
}
