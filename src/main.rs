use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, info_span, Instrument};
use tracing_subscriber::EnvFilter;

use pr_autopilot::backend::{AnalysisClient, AutomationService, GitHubBackend, MockBackend};
use pr_autopilot::config;
use pr_autopilot::pr::{self, PullSummary};
use pr_autopilot::report::{self, Report, RiskRow};
use pr_autopilot::session::Session;
use pr_autopilot::workflow::WorkflowPhase;

/// PR Autopilot — annotates a repository's open pull requests with risk
/// scores and auto-approves (and optionally merges) the low-risk ones.
#[derive(Parser, Debug)]
#[command(name = "pr-autopilot", version, about)]
struct Cli {
    /// Repository as owner/repo or GitHub URL.
    ///
    /// Not required when --mock is used.
    repo: Option<String>,

    /// Only annotate these PR numbers (default: all open PRs)
    #[arg(long = "pr", value_name = "NUMBER")]
    prs: Vec<u64>,

    /// Confirm the auto-approve batch without prompting
    #[arg(short, long)]
    yes: bool,

    /// Optional output file path for a markdown report
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Use a built-in mock repository for demo purposes (no GitHub token needed)
    #[arg(long)]
    r#mock: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("loading configuration");
    let config = config::Config::load()?;

    let scope = match (cli.repo.as_deref(), cli.r#mock) {
        (Some(repo), _) => pr::parse_repo_scope(repo)?,
        (None, true) => pr::RepoScope::new("acme", "widgets"),
        (None, false) => {
            return Err("Repository is required unless --mock is used. \
                        Usage: pr-autopilot <owner/repo> or pr-autopilot --mock"
                .into())
        }
    };

    let (client, service): (Arc<dyn AnalysisClient>, Arc<dyn AutomationService>) = if cli.r#mock {
        info!("using mock repository for demo");
        let backend = Arc::new(MockBackend::demo());
        let client: Arc<dyn AnalysisClient> = backend.clone();
        let service: Arc<dyn AutomationService> = backend;
        (client, service)
    } else {
        let backend = Arc::new(GitHubBackend::new(&config, config::DEFAULT_CONFIG_PATH)?);
        let client: Arc<dyn AnalysisClient> = backend.clone();
        let service: Arc<dyn AutomationService> = backend;
        (client, service)
    };

    let workers = config.scheduler.workers;
    let mut session = Session::new(scope.clone(), client.clone(), service, workers);
    run(&mut session, client.as_ref(), &cli)
        .instrument(info_span!("autopilot", scope = %scope))
        .await
}

async fn run(
    session: &mut Session,
    client: &dyn AnalysisClient,
    cli: &Cli,
) -> Result<(), Box<dyn std::error::Error>> {
    let pulls: Vec<PullSummary> = if cli.prs.is_empty() {
        client.open_pull_requests(session.scope()).await?
    } else {
        cli.prs
            .iter()
            .map(|&number| PullSummary {
                number,
                title: String::new(),
                draft: false,
            })
            .collect()
    };
    let numbers: Vec<u64> = pulls.iter().map(|p| p.number).collect();

    info!(
        pulls = numbers.len(),
        workers = session.scheduler().workers(),
        "annotating pull requests"
    );
    session.annotate(&numbers);
    session.scheduler().wait_idle().await;
    info!(cached = session.scheduler().len(), "annotation complete");

    let rows: Vec<RiskRow> = pulls
        .into_iter()
        .map(|pull| RiskRow {
            analysis: session.analysis(pull.number),
            pr_number: pull.number,
            title: pull.title,
        })
        .collect();

    session.workflow_mut().evaluate().await?;
    let candidates = session.workflow().candidates().to_vec();

    let mut notice = None;
    if matches!(session.workflow().phase(), WorkflowPhase::Confirm { .. }) {
        for candidate in &candidates {
            println!("  #{} [{}] {}", candidate.pr_number, candidate.risk_level, candidate.reason);
        }
        if cli.yes || prompt_confirmation(candidates.len()).await? {
            session.workflow_mut().confirm().await?;
        } else {
            session.workflow_mut().cancel()?;
            notice = Some("Auto-approve cancelled".to_string());
        }
    } else if let Some(error) = session.workflow().error() {
        notice = Some(error.to_string());
    } else if session.workflow().evaluated() {
        notice = Some("No pull request qualifies for auto-approval".to_string());
    } else {
        notice = Some("Automation is disabled for this repository".to_string());
    }
    debug!(phase = session.workflow().phase().name(), "workflow settled");

    let report = Report {
        scope: session.scope().to_string(),
        rows,
        candidates,
        outcomes: session.workflow().outcomes().to_vec(),
        summary: session.workflow().summary(),
        notice,
    };
    report::output(&report, cli.output.as_deref())?;
    if let Some(path) = cli.output.as_deref() {
        info!(path = %path.display(), "report written");
    }
    Ok(())
}

async fn prompt_confirmation(count: usize) -> std::io::Result<bool> {
    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(format!("Approve {} pull request(s)? [y/N] ", count).as_bytes())
        .await?;
    stdout.flush().await?;

    let mut answer = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut answer).await?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
