use std::path::PathBuf;
use std::sync::atomic::Ordering;

use anyhow::Result;
use clap::Parser;
use ratatui::text::Line;

use swarm::{DEFAULT_SETTINGS_PATH, ServerSimulation, Session, Settings};
use swarm_terminal::{Tui, stat};

#[derive(Parser)]
#[command(name = "swarm-server")]
#[command(about = "Authoritative swarm simulation")]
struct Args {
    #[arg(short, long, default_value = DEFAULT_SETTINGS_PATH)]
    config: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::load(&args.config)?;

    let role = ServerSimulation::new(&settings);
    let mut session = Session::new(role, swarm::net::listen(&settings.network));

    if settings.display.headless {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
        log::info!("Server started on port {}", settings.network.port);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()?;
        let running = session.running();
        runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                running.store(false, Ordering::SeqCst);
            }
        });

        session.run_headless(settings.renderer.framerate_limit);
        log::info!("Server shutting down");
    } else {
        let mut tui = Tui::new()?;
        tui.run(&mut session, &settings, "Swarm (Server)", panel)?;
        tui.restore_terminal()?;
        session.shutdown();
    }

    Ok(())
}

fn panel(server: &ServerSimulation) -> Vec<Line<'static>> {
    let telemetry = server.telemetry();
    vec![
        stat(
            "CONNECTED CLIENTS",
            format!("{}/{}", telemetry.connected, telemetry.max_clients),
        ),
        stat("SEND RATE", format!("{} Hz", telemetry.send_rate)),
        stat(
            "MESSAGES PER SECOND",
            telemetry.messages_per_second.to_string(),
        ),
    ]
}
