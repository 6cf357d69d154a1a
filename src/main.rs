mod cli;

use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use widgetsync::commands::{notice_for, CommandNotice};
use widgetsync::prelude::*;

use cli::{Cli, Commands};

const JOB_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    let app = WidgetSync::connect(settings, true).await?;

    match cli.command {
        Commands::Sync => {
            let notice = notice_for("sync", app.sync_once().await, |outcome| format!("Widget sync {outcome}"));
            report(&notice);
        }
        Commands::Start => {
            let minutes = app.settings().frequency_minutes;
            let mut started = None;
            let notice = notice_for("start", app.start().await, |id| {
                started = Some(id);
                format!("Sync started: every {minutes} minute(s)")
            });
            report(&notice);
            if let Some(id) = started {
                run_until_stopped(&app, &id).await;
            }
        }
        Commands::Stop => {
            let notice = notice_for("stop", app.stop().await, |was_active| {
                if was_active { "Sync stopped".to_string() } else { "Sync was not running".to_string() }
            });
            report(&notice);
        }
        Commands::Resume => match app.on_upgrade().await {
            Ok(Some(id)) => {
                tracing::info!(job_id = %id, "sync re-armed");
                report(&CommandNotice::success("Sync resumed"));
                run_until_stopped(&app, &id).await;
            }
            Ok(None) => report(&CommandNotice::success("Sync is not active; nothing to resume")),
            Err(e) => {
                tracing::error!(error = ?e, "resume failed");
                report(&CommandNotice::failure());
            }
        },
        Commands::Status => {
            let status = app.status().await?;
            println!("job id:      {}", status.job_id.as_deref().unwrap_or("-"));
            println!("registered:  {}", status.registered);
            println!("cache token: {}", status.cache_token.as_deref().unwrap_or("-"));
        }
        Commands::Widgets => {
            for w in app.list_widgets().await? {
                println!("{}  {:<6}  {}", w.id.as_deref().unwrap_or("-"), w.body.kind_name(), w.name);
            }
        }
    }
    Ok(())
}

fn report(notice: &CommandNotice) {
    if notice.ok { println!("{}", notice.message) } else { eprintln!("{}", notice.message) }
}

/// Keep the process alive until ctrl-c or until the job ends itself
/// (another process ran `stop` or `start`).
async fn run_until_stopped(app: &WidgetSync, job_id: &str) {
    let mut poll = tokio::time::interval(JOB_POLL_INTERVAL);
    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    tracing::error!(error = %e, "failed to listen for ctrl-c");
                }
                tracing::info!("shutting down; periodic sync resumes with `widgetsync resume`");
                return;
            }
            _ = poll.tick() => {
                if !app.scheduler().is_registered(job_id) {
                    tracing::info!(%job_id, "sync job ended, exiting");
                    return;
                }
            }
        }
    }
}
