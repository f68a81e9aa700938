use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use fieldtrip_common::observability::{LogConfig, init_logging};
use fieldtrip_config::{ScenarioSpec, TripPlan, TripPlanLoader};
use fieldtrip_drivers::fieldtrip_browser::{DEFAULT_WEBDRIVER_URL, SessionOptions};
use fieldtrip_runner::{SessionDriver, SessionReport, WebDriverSession, run_scenario};
use tracing::{error, info, warn};
use url::Url;

/// Drive scripted trips through a website and write a plain-text survey
/// report of everything seen along the way.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Trip plan to execute
    #[arg(short, long, default_value = "fieldtrip.yaml")]
    config: PathBuf,

    /// Override the plan's base URL
    #[arg(long)]
    url: Option<Url>,

    /// Override the report output directory
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// Override the default per-step wait timeout, in milliseconds
    #[arg(long)]
    wait_timeout_ms: Option<u64>,

    /// WebDriver endpoint to attach to
    #[arg(long, env = "FIELDTRIP_WEBDRIVER_URL", default_value = DEFAULT_WEBDRIVER_URL)]
    webdriver_url: String,

    /// Run the browser without a visible window
    #[arg(long)]
    headless: bool,

    /// Scenario names to run; every scenario in the plan when empty
    scenarios: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut plan: TripPlan = TripPlanLoader::new()
        .with_file(&args.config)
        .load()
        .with_context(|| format!("loading trip plan {}", args.config.display()))?;

    let log_path = init_logging(LogConfig {
        emit_stderr: true,
        ..LogConfig::default()
    })?;
    info!(log = %log_path.display(), plan = %args.config.display(), "fieldtrip starting");

    if let Some(url) = args.url {
        plan.site.base_url = url;
    }
    if let Some(out_dir) = args.out_dir {
        plan.report.out_dir = out_dir;
    }
    if let Some(wait) = args.wait_timeout_ms {
        plan.defaults.wait_timeout_ms = wait;
    }

    let selected = select_scenarios(&plan, &args.scenarios);
    if selected.is_empty() {
        anyhow::bail!("no scenarios to run");
    }

    let options = SessionOptions {
        webdriver_url: args.webdriver_url.clone(),
        headless: args.headless,
        viewport: plan.site.viewport,
        poll_interval: Duration::from_millis(plan.defaults.poll_interval_ms),
    };

    let mut session = WebDriverSession::start(options).await?;
    let viewport = session.viewport();
    info!(width = viewport.0, height = viewport.1, "browser session ready");

    let mut report = SessionReport::new(&plan.report.title, &plan.report.prefix, viewport);

    // The dialog only exists once a page is loaded, so the dismissal
    // rides along with the first scenario's opening navigation.
    let mut consent = plan.site.consent.as_ref();

    let mut session_lost = false;
    for spec in selected {
        let outcome = run_scenario(
            &mut session,
            &plan.site.base_url,
            spec,
            consent.take(),
            &plan.defaults,
            &mut report,
        )
        .await;
        if let Err(e) = outcome {
            error!(scenario = %spec.name, error = %e, "browser session lost; stopping the trip");
            session_lost = true;
            break;
        }
    }

    // Flush and close before surfacing any failure.
    if let Some(path) = report.flush(&plan.report.out_dir) {
        info!(path = %path.display(), "survey report written");
    }
    session.close().await;

    if session_lost {
        anyhow::bail!("browser session was lost before the trip completed");
    }
    Ok(())
}

fn select_scenarios<'a>(plan: &'a TripPlan, names: &[String]) -> Vec<&'a ScenarioSpec> {
    if names.is_empty() {
        return plan.scenarios.iter().collect();
    }
    let mut picked = Vec::new();
    for name in names {
        match plan.scenario(name) {
            Some(spec) => picked.push(spec),
            None => warn!(scenario = %name, "no such scenario in the plan; skipping"),
        }
    }
    picked
}
