use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

use clan_recruiter::actuator::{LocateOptions, ScreenActuator};
use clan_recruiter::backend::{AdbBackend, DesktopBackend, DryRunBackend, InputBackend};
use clan_recruiter::client::ClashClient;
use clan_recruiter::config::{BackendKind, Config};
use clan_recruiter::detector::{ImageTarget, Templates};
use clan_recruiter::layout::{self, CANONICAL, Layout, LayoutSource, Presets, Resolution};
use clan_recruiter::orchestrator::{LoopSettings, Orchestrator, Timings};
use clan_recruiter::prompt;
use clan_recruiter::state::RunReport;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,reqwest=warn,hyper_util=warn")),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;

    let client = ClashClient::new(&config.api_base_url, &config.api_token)?;
    if client.test_connectivity().await {
        tracing::info!("connected to {}", config.api_base_url);
    } else {
        tracing::warn!(
            "API at {} is not answering, candidates will be skipped until it does",
            config.api_base_url
        );
    }

    let Some(target) = ask_target().await? else {
        return Ok(());
    };
    tracing::info!("target: {target} player(s)");

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping after the current candidate");
            flag.store(true, Ordering::Relaxed);
        }
    });
    tokio::task::yield_now().await;

    let report = match config.backend {
        BackendKind::Desktop => {
            let mut backend = DesktopBackend::new().context("failed to open the desktop")?;
            let templates = Templates::load(config.assets_dir.as_deref());
            templates.require(&[ImageTarget::Invite, ImageTarget::Back])?;
            let resolution = screen_resolution(&config, &mut backend)?;
            recruit(
                backend,
                templates,
                resolution,
                Timings::default(),
                &config,
                client,
                target,
                cancel,
            )
            .await?
        }
        BackendKind::Adb => {
            let mut backend = AdbBackend::new(
                &config.adb_path,
                config.adb_serial.clone(),
                config.clipboard_command.clone(),
            );
            let templates = Templates::load(config.assets_dir.as_deref());
            templates.require(&[ImageTarget::Invite, ImageTarget::Back])?;
            let resolution = screen_resolution(&config, &mut backend)?;
            if config.layout_file.is_none() {
                tracing::warn!(
                    "built-in layouts are desktop points, set RECRUITER_LAYOUT_FILE to presets \
                     measured in {resolution} device pixels"
                );
            }
            recruit(
                backend,
                templates,
                resolution,
                Timings::default(),
                &config,
                client,
                target,
                cancel,
            )
            .await?
        }
        BackendKind::DryRun => {
            let resolution = config.resolution.unwrap_or(CANONICAL);
            let backend = DryRunBackend::new(resolution, config.dry_run_tags.clone());
            recruit(
                backend,
                Templates::default(),
                resolution,
                Timings::none(),
                &config,
                client,
                target,
                cancel,
            )
            .await?
        }
    };

    tracing::info!("{}", report.summary());
    Ok(())
}

/// Prompt on stdin. `None` when the user interrupts or closes the input.
async fn ask_target() -> Result<Option<u32>> {
    let (tx, rx) = oneshot::channel();
    // Not spawn_blocking: runtime shutdown would wait on the pending stdin read
    std::thread::spawn(move || {
        let answer = prompt::read_target(std::io::stdin().lock(), std::io::stdout());
        let _ = tx.send(answer);
    });

    tokio::select! {
        answer = rx => {
            let answer = answer
                .context("prompt thread exited")?
                .context("failed to read from stdin")?;
            if answer.is_none() {
                tracing::info!("no input, exiting");
            }
            Ok(answer)
        }
        _ = tokio::signal::ctrl_c() => {
            println!();
            tracing::info!("interrupted by user");
            Ok(None)
        }
    }
}

fn screen_resolution<B: InputBackend>(config: &Config, backend: &mut B) -> Result<Resolution> {
    match config.resolution {
        Some(resolution) => Ok(resolution),
        None => backend
            .screen_size()
            .with_context(|| format!("failed to read the {} screen size", backend.name())),
    }
}

#[allow(clippy::too_many_arguments)]
async fn recruit<B: InputBackend>(
    backend: B,
    templates: Templates,
    resolution: Resolution,
    timings: Timings,
    config: &Config,
    client: ClashClient,
    target: u32,
    cancel: Arc<AtomicBool>,
) -> Result<RunReport> {
    tracing::info!("{} backend, screen {resolution}", backend.name());
    let layout = resolve_layout(config, resolution)?;
    let ui = ScreenActuator::new(backend, layout, templates);

    let settings = LoopSettings {
        max_cycles: config.max_cycles,
        max_pages: config.max_pages,
        timings,
        locate: LocateOptions {
            confidence: config.confidence,
            ..LocateOptions::default()
        },
    };

    tracing::info!(
        "focus the game window, starting in {}s",
        config.focus_delay.as_secs()
    );
    tokio::time::sleep(config.focus_delay).await;

    let mut orchestrator = Orchestrator::new(ui, client, settings, cancel);
    orchestrator.run(target).await
}

fn resolve_layout(config: &Config, resolution: Resolution) -> Result<Layout> {
    let mut presets = Presets::builtin();
    if let Some(path) = &config.layout_file {
        let extra = Presets::load_file(path).context("failed to load layout file")?;
        tracing::info!("loaded {} layout preset(s) from {}", extra.len(), path.display());
        presets.merge(extra);
    }

    let resolved = presets.resolve(resolution);
    if resolved.source == LayoutSource::Scaled {
        tracing::info!("known presets: {:?}", presets.resolutions());
    }
    if !layout::validate(&resolved.layout, resolution) {
        tracing::warn!("some layout coordinates fall outside the {resolution} screen");
    }
    Ok(resolved.layout)
}
