use std::path::PathBuf;
use std::sync::atomic::Ordering;

use anyhow::Result;
use clap::Parser;
use ratatui::text::Line;

use swarm::{ClientReplica, DEFAULT_SETTINGS_PATH, Session, Settings};
use swarm_terminal::{Tui, stat};

#[derive(Parser)]
#[command(name = "swarm-client")]
#[command(about = "Swarm observer")]
struct Args {
    #[arg(short, long, default_value = DEFAULT_SETTINGS_PATH)]
    config: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::load(&args.config)?;

    let role = ClientReplica::new(settings.network.redundant_bytes);
    let mut session = Session::new(role, swarm::net::connect(&settings.network));

    if settings.display.headless {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
        log::info!(
            "Connecting to {}:{}",
            settings.network.ip,
            settings.network.port
        );

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
    } else {
        let mut tui = Tui::new()?;
        tui.run(&mut session, &settings, "Swarm (Client)", panel)?;
        tui.restore_terminal()?;
        session.shutdown();
    }

    Ok(())
}

fn panel(client: &ClientReplica) -> Vec<Line<'static>> {
    let telemetry = client.telemetry();
    let network = &telemetry.network;
    vec![
        stat("RTT", format!("{} ms", telemetry.rtt_ms)),
        stat("PACKETS SENT", network.packets_sent.to_string()),
        stat("PACKETS LOST", network.packets_lost.to_string()),
        stat(
            "PACKET LOSS",
            format!("{:.1}%", network.packet_loss_percent),
        ),
        stat("WORST LAG", format!("{:.2} ms", telemetry.worst_lag_ms)),
    ]
}
