use anyhow::{bail, Context as _, Result};
use audit_core::aggregation::{agent_trend, dashboard, TrendMetric};
use audit_core::alerts::{compliance_alerts, dismiss_all, visible_alerts};
use audit_core::analysis::PrecomputedAnalysis;
use audit_core::config::DEFAULT_CONFIG_FILE;
use audit_core::db::DEFAULT_DB_FILE;
use audit_core::export::write_export;
use audit_core::leaderboard::{leaderboard, Badge};
use audit_core::merge::import_paths;
use audit_core::roster::Roster;
use audit_core::selection::{
    agent_summary_inputs, best_practices, call_of_the_week_inputs, coaching_plan_inputs,
    root_cause_inputs, BestPracticeFilter,
};
use audit_core::session::{login, logout, DismissedAlerts, SessionSlot};
use audit_core::state::{seeded_list, AppState, DataView};
use audit_core::submission::{submit_audit, SubmissionRequest};
use audit_core::{AuditConfig, AuditEntry, AuditError, AuditStore, ListName, TimeWindow};
use audit_report::{build_report, ReportInput};
use clap::{Args, Parser, Subcommand};
use schemars::schema_for;
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

#[derive(Parser)]
#[command(name = "callaudit")]
#[command(about = "Call quality audit CLI", long_about = None)]
struct Cli {
    /// Directory holding the store, session slot and dismissed alerts
    #[arg(long, global = true, default_value = ".callaudit")]
    data_dir: PathBuf,

    /// Config file (default: <data-dir>/audit.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export JSON Schemas for the import/export file format
    Schema {
        #[command(subcommand)]
        command: SchemaCommands,
    },
    /// Sign in as an auditor (added to the auditor list if new)
    Login { email: String },
    Logout,
    /// Show the signed-in auditor
    Whoami,
    Agents {
        #[command(subcommand)]
        command: ListCommands,
    },
    Auditors {
        #[command(subcommand)]
        command: ListCommands,
    },
    /// Audit a call recording
    Submit(SubmitArgs),
    /// Nominate an audit for the excellence awards
    Nominate { id: i64 },
    /// Merge exported audit files into the local store
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Export the full history as JSON
    Export {
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Delete every stored audit (lists are kept)
    Clear {
        #[arg(long)]
        yes: bool,
    },
    Dashboard(ViewArgs),
    Leaderboard(ViewArgs),
    Alerts {
        #[command(subcommand)]
        command: AlertCommands,
    },
    /// One agent's score trend against the team
    Trend {
        agent: String,
        /// Chart a detailed parameter instead of the overall score
        #[arg(long)]
        parameter: Option<String>,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Nominated calls, optionally filtered
    BestPractices {
        #[arg(long)]
        agent: Option<String>,
        #[arg(long)]
        keyword: Option<String>,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Print the audits that feed a prose request, as JSON
    Select {
        #[command(subcommand)]
        command: SelectCommands,
    },
    /// Write Markdown report notes
    Report {
        #[arg(long, default_value = "report")]
        out_dir: PathBuf,
        #[command(flatten)]
        view: ViewArgs,
    },
}

#[derive(Subcommand)]
enum SchemaCommands {
    /// Export JSON Schema files for the audit entry types
    Export {
        /// Output directory (default: ./schemas)
        #[arg(long, default_value = "schemas")]
        out_dir: PathBuf,
    },
}

#[derive(Subcommand)]
enum ListCommands {
    List,
    Add { email: String },
    Remove { email: String },
}

#[derive(Subcommand)]
enum AlertCommands {
    List(ViewArgs),
    Dismiss { id: String },
    /// Dismiss every alert currently shown
    DismissAll(ViewArgs),
}

#[derive(Subcommand)]
enum SelectCommands {
    CoachingPlan {
        agent: String,
        #[command(flatten)]
        view: ViewArgs,
    },
    RootCause {
        parameter: String,
        #[command(flatten)]
        view: ViewArgs,
    },
    CallOfTheWeek(ViewArgs),
    AgentSummary {
        agent: String,
        #[command(flatten)]
        view: ViewArgs,
    },
}

#[derive(Args)]
struct SubmitArgs {
    /// Call recording
    audio: PathBuf,
    /// Analysis JSON produced for this recording
    #[arg(long)]
    analysis: PathBuf,
    #[arg(long)]
    agent: String,
    #[arg(long)]
    buyer_user_id: String,
    #[arg(long)]
    call_stamp: String,
    /// Defaults to a guess from the file extension
    #[arg(long)]
    mime_type: Option<String>,
}

#[derive(Args, Clone)]
struct ViewArgs {
    /// all, mtd or today
    #[arg(long, default_value = "all")]
    window: TimeWindow,
    /// Only audits by the signed-in auditor
    #[arg(long)]
    mine: bool,
}

impl ViewArgs {
    fn data_view(&self) -> DataView {
        if self.mine { DataView::Mine } else { DataView::All }
    }
}

struct Context {
    data_dir: PathBuf,
    config: AuditConfig,
    now: OffsetDateTime,
}

impl Context {
    fn new(data_dir: PathBuf, config_path: Option<PathBuf>) -> Result<Self> {
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("cannot create data dir {}", data_dir.display()))?;
        let config_path = config_path.unwrap_or_else(|| data_dir.join(DEFAULT_CONFIG_FILE));
        let config = AuditConfig::load(&config_path)?;
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        Ok(Self {
            data_dir,
            config,
            now,
        })
    }

    fn store(&self) -> Result<AuditStore> {
        Ok(AuditStore::open(&self.data_dir.join(DEFAULT_DB_FILE))?)
    }

    fn session(&self) -> SessionSlot {
        SessionSlot::in_dir(&self.data_dir)
    }

    fn dismissed(&self) -> DismissedAlerts {
        DismissedAlerts::in_dir(&self.data_dir)
    }

    /// Never fails; storage problems are reported and the state runs on defaults.
    fn state(&self, store: Option<&AuditStore>) -> AppState {
        let state = AppState::load(store, &self.session(), &self.config, self.now.offset());
        if let Some(message) = &state.load_error {
            eprintln!("warning: {message}");
        }
        state
    }

    fn open_state(&self) -> AppState {
        match self.store() {
            Ok(store) => self.state(Some(&store)),
            Err(err) => {
                tracing::error!(error = %err, "Could not open audit store");
                self.state(None)
            }
        }
    }

    fn selected<'a>(&self, state: &'a AppState, view: &ViewArgs) -> Result<Vec<&'a AuditEntry>> {
        if view.mine && state.current_user.is_none() {
            bail!("--mine needs a signed-in auditor. Run `callaudit login <email>` first.");
        }
        Ok(state
            .displayed_history(view.data_view())
            .into_iter()
            .filter(|entry| view.window.includes(entry, self.now))
            .collect())
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    if let Commands::Schema { command } = &cli.command {
        return match command {
            SchemaCommands::Export { out_dir } => schema_export(out_dir),
        };
    }

    let ctx = Context::new(cli.data_dir, cli.config)?;
    match cli.command {
        Commands::Schema { .. } => Ok(()),
        Commands::Login { email } => {
            let store = ctx.store()?;
            let user = login(&store, &ctx.session(), &email)?;
            println!("Logged in as {user}");
            Ok(())
        }
        Commands::Logout => {
            logout(&ctx.session())?;
            println!("Logged out");
            Ok(())
        }
        Commands::Whoami => {
            match ctx.open_state().current_user {
                Some(user) => println!("{user}"),
                None => println!("Not logged in"),
            }
            Ok(())
        }
        Commands::Agents { command } => manage_list(&ctx, ListName::Agents, command),
        Commands::Auditors { command } => manage_list(&ctx, ListName::Auditors, command),
        Commands::Submit(args) => submit(&ctx, args),
        Commands::Nominate { id } => {
            let store = ctx.store()?;
            let mut state = ctx.state(Some(&store));
            let entry = state.nominate(&store, id)?;
            println!("Nominated audit {} ({})", entry.id, entry.agent_email);
            Ok(())
        }
        Commands::Import { files } => {
            let mut store = ctx.store()?;
            let outcome = import_paths(&mut store, &files)?;
            println!("{}", outcome.summary);
            println!("History now holds {} audit(s).", outcome.history.len());
            Ok(())
        }
        Commands::Export { out_dir } => {
            let store = ctx.store()?;
            let path = write_export(&store.get_all()?, &out_dir, ctx.now)?;
            println!("Exported history to {}", path.display());
            Ok(())
        }
        Commands::Clear { yes } => {
            if !yes {
                bail!("This deletes every stored audit. Re-run with --yes to confirm.");
            }
            ctx.store()?.clear_all()?;
            println!("All audit history has been cleared.");
            Ok(())
        }
        Commands::Dashboard(view) => show_dashboard(&ctx, &view),
        Commands::Leaderboard(view) => show_leaderboard(&ctx, &view),
        Commands::Alerts { command } => alerts(&ctx, command),
        Commands::Trend {
            agent,
            parameter,
            view,
        } => show_trend(&ctx, &agent, parameter, &view),
        Commands::BestPractices {
            agent,
            keyword,
            view,
        } => {
            let state = ctx.open_state();
            let selected = ctx.selected(&state, &view)?;
            let filter = BestPracticeFilter {
                agent_email: agent,
                keyword,
            };
            let picked = best_practices(&selected, &filter);
            if picked.is_empty() {
                println!("No nominated calls match.");
            }
            for entry in picked {
                print_entry(entry);
            }
            Ok(())
        }
        Commands::Select { command } => select(&ctx, command),
        Commands::Report { out_dir, view } => {
            let state = ctx.open_state();
            let history: Vec<AuditEntry> = ctx
                .selected(&state, &ViewArgs {
                    window: TimeWindow::All,
                    mine: view.mine,
                })?
                .into_iter()
                .cloned()
                .collect();
            let input = ReportInput {
                entries: &history,
                agents: &state.agents,
                auditors: &state.auditors,
                config: &ctx.config,
                window: view.window,
                now: ctx.now,
            };
            let paths = build_report(&input, &out_dir)?;
            println!("Wrote report to {}", paths.root.display());
            Ok(())
        }
    }
}

fn schema_export(out_dir: &Path) -> Result<()> {
    fs::create_dir_all(out_dir)?;

    let entry_schema = schema_for!(audit_core::schema::AuditEntry);
    let entry_json = serde_json::to_string_pretty(&entry_schema)?;
    fs::write(out_dir.join("AuditEntry.schema.json"), entry_json)?;

    let analysis_schema = schema_for!(audit_core::schema::AnalysisResult);
    let analysis_json = serde_json::to_string_pretty(&analysis_schema)?;
    fs::write(out_dir.join("AnalysisResult.schema.json"), analysis_json)?;

    println!("Exported schemas to {}", out_dir.display());
    Ok(())
}

fn manage_list(ctx: &Context, list: ListName, command: ListCommands) -> Result<()> {
    let store = ctx.store()?;
    seeded_list(&store, list, &ctx.config)?;
    let roster = Roster::new(&store, list);
    let members = match command {
        ListCommands::List => roster.members()?,
        ListCommands::Add { email } => roster.add(&email)?,
        ListCommands::Remove { email } => roster.remove(&email)?,
    };
    for member in members {
        println!("{member}");
    }
    Ok(())
}

fn guess_mime_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("m4a") => "audio/mp4",
        Some("ogg") => "audio/ogg",
        Some("webm") => "audio/webm",
        _ => "application/octet-stream",
    }
}

fn submit(ctx: &Context, args: SubmitArgs) -> Result<()> {
    let store = ctx.store()?;
    let state = ctx.state(Some(&store));
    let Some(auditor) = state.current_user.clone() else {
        bail!("Not logged in. Run `callaudit login <email>` first.");
    };
    let agent = args.agent.trim().to_lowercase();
    if !state.agents.contains(&agent) {
        bail!("{agent} is not on the agent list. Add it with `callaudit agents add`.");
    }

    let audio = fs::read(&args.audio)
        .with_context(|| format!("cannot read {}", args.audio.display()))?;
    let request = SubmissionRequest {
        auditor_name: auditor,
        agent_email: agent,
        buyer_user_id: args.buyer_user_id,
        call_stamp: args.call_stamp,
        file_name: args
            .audio
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
        mime_type: args
            .mime_type
            .unwrap_or_else(|| guess_mime_type(&args.audio).to_string()),
        audio,
    };
    let service = PrecomputedAnalysis::new(args.analysis);

    match submit_audit(&store, &service, request, ctx.now) {
        Ok(entry) => {
            println!("Stored audit {}", entry.id);
            print_entry(&entry);
            Ok(())
        }
        Err(err @ AuditError::DuplicateAudio { existing_id, .. }) => {
            eprintln!("{err}");
            match state.find(existing_id) {
                Some(existing) => print_entry(existing),
                None => println!("Existing audit id: {existing_id}"),
            }
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

fn print_entry(entry: &AuditEntry) {
    println!(
        "[{}] {} | agent {} | auditor {} | score {}/10{}",
        entry.id,
        entry.timestamp,
        entry.agent_email,
        entry.auditor_name,
        entry.overall_score(),
        if entry.is_nominated() { " | nominated" } else { "" }
    );
    if !entry.analysis.overall_score.summary.is_empty() {
        println!("  {}", entry.analysis.overall_score.summary);
    }
    for param in &entry.analysis.detailed_scores {
        println!("  - {}: {}", param.parameter, param.score);
    }
}

fn fmt_score(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.1}"))
        .unwrap_or_else(|| "n/a".to_string())
}

fn show_dashboard(ctx: &Context, view: &ViewArgs) -> Result<()> {
    let state = ctx.open_state();
    let selected = ctx.selected(&state, view)?;
    let summary = dashboard(
        &selected,
        &state.agents,
        &state.auditors,
        &ctx.config.thresholds,
    );

    println!("Dashboard ({})", view.window.label());
    println!("  Total audits:        {}", summary.total_audits);
    println!("  Average score:       {}", fmt_score(summary.average_score));
    println!("  Total analysis time: {:.0}s", summary.total_analysis_seconds);

    println!("\nAgents");
    for agent in &summary.agents {
        let problem = agent
            .top_problem
            .as_ref()
            .map(|p| format!("{} ({} low)", p.parameter, p.low_count))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<32} {:>4} audits  avg {:>4}  {}",
            agent.agent_email,
            agent.audit_count,
            fmt_score(agent.average),
            problem
        );
    }

    println!("\nAuditors");
    for auditor in &summary.auditors {
        println!(
            "  {:<32} {:>4} audits  avg analysis {}",
            auditor.auditor,
            auditor.audit_count,
            auditor
                .average_analysis_seconds
                .map(|s| format!("{s:.0}s"))
                .unwrap_or_else(|| "-".to_string())
        );
    }

    println!("\nTeam parameters (weakest first)");
    for param in &summary.team_parameters {
        println!("  {:<32} {:.1}", param.parameter, param.average);
    }
    Ok(())
}

fn show_leaderboard(ctx: &Context, view: &ViewArgs) -> Result<()> {
    let state = ctx.open_state();
    let selected = ctx.selected(&state, view)?;
    let thresholds = &ctx.config.thresholds;
    let board = leaderboard(&selected, thresholds);

    println!("Leaderboard ({})", view.window.label());
    println!("\nTop performers");
    for (rank, agent) in board.top_performers.iter().enumerate() {
        println!(
            "  {:>2}. {:<32} {:.1} ({} audits)",
            rank + 1,
            agent.agent_email,
            agent.average,
            agent.audit_count
        );
    }
    println!("\nExcellence awards");
    for (rank, award) in board.excellence_awards.iter().enumerate() {
        println!("  {:>2}. {:<32} {} nominated", rank + 1, award.agent_email, award.nominations);
    }
    println!("\nActive auditors");
    for (rank, auditor) in board.active_auditors.iter().enumerate() {
        println!("  {:>2}. {:<32} {} audits", rank + 1, auditor.auditor, auditor.audit_count);
    }
    println!("\nBadges");
    for badge in Badge::ALL {
        println!(
            "  {:<18} {:<32} {}",
            badge.name(),
            board.holder(badge).unwrap_or("unclaimed"),
            badge.description(thresholds)
        );
    }
    Ok(())
}

fn alerts(ctx: &Context, command: AlertCommands) -> Result<()> {
    let dismissed_file = ctx.dismissed();
    let view = match &command {
        AlertCommands::Dismiss { id } => {
            dismissed_file.dismiss(id)?;
            println!("Dismissed {id}");
            return Ok(());
        }
        AlertCommands::List(view) | AlertCommands::DismissAll(view) => view,
    };

    let state = ctx.open_state();
    let selected = ctx.selected(&state, view)?;
    let thresholds = &ctx.config.thresholds;
    let coaching = dashboard(&selected, &state.agents, &state.auditors, thresholds).coaching_alerts;
    let history = ctx.selected(
        &state,
        &ViewArgs {
            window: TimeWindow::All,
            mine: view.mine,
        },
    )?;
    // compliance notices ignore the window
    let compliance = compliance_alerts(&history, thresholds, ctx.now.offset());
    let dismissed = dismissed_file.load()?;

    if matches!(command, AlertCommands::DismissAll(_)) {
        let next = dismiss_all(&dismissed, &compliance, &coaching);
        let newly = next.len() - dismissed.len();
        dismissed_file.save(&next)?;
        println!("Dismissed {newly} alert(s)");
        return Ok(());
    }

    let visible_compliance = visible_alerts(&compliance, &dismissed);
    let visible_coaching = visible_alerts(&coaching, &dismissed);
    if visible_compliance.is_empty() && visible_coaching.is_empty() {
        println!("No alerts.");
        return Ok(());
    }
    for alert in visible_compliance {
        let issues: Vec<String> = alert.issues.iter().map(|i| i.to_string()).collect();
        println!(
            "{}  {} on {} (audited by {}): {}",
            alert.id,
            alert.agent_email,
            alert.timestamp,
            alert.auditor_name,
            issues.join("; ")
        );
    }
    for alert in visible_coaching {
        println!(
            "{}  {} needs coaching on {} (avg score {:.1})",
            alert.id, alert.agent_email, alert.parameter, alert.average_score
        );
    }
    Ok(())
}

fn show_trend(ctx: &Context, agent: &str, parameter: Option<String>, view: &ViewArgs) -> Result<()> {
    let state = ctx.open_state();
    let selected = ctx.selected(&state, view)?;
    let metric = parameter.map_or(TrendMetric::Overall, TrendMetric::Parameter);
    let agent = agent.trim().to_lowercase();
    let trend = agent_trend(
        &selected,
        &agent,
        metric,
        &ctx.config.thresholds,
        ctx.now.offset(),
    );

    println!("{} ({})", trend.agent_email, view.window.label());
    println!("  Audits:        {}", trend.audit_count);
    println!("  Average score: {}", fmt_score(trend.average));
    println!(
        "  Last audit:    {}",
        trend.last_audit.as_deref().unwrap_or("never")
    );
    println!("\nProblem areas");
    for problem in &trend.problem_parameters {
        println!("  {:<32} {} low", problem.parameter, problem.low_count);
    }
    println!(
        "\n{}: agent {} vs team {}",
        trend.metric.label(),
        fmt_score(trend.agent_metric_average),
        fmt_score(trend.team_metric_average)
    );
    for point in &trend.series {
        println!("  {}  {:>2}  {}", point.timestamp, point.score, "#".repeat(point.score.max(0) as usize));
    }
    Ok(())
}

fn select(ctx: &Context, command: SelectCommands) -> Result<()> {
    let state = ctx.open_state();
    let thresholds = &ctx.config.thresholds;
    let picked = match &command {
        SelectCommands::CoachingPlan { agent, view } => {
            coaching_plan_inputs(&ctx.selected(&state, view)?, agent, thresholds)?
        }
        SelectCommands::RootCause { parameter, view } => {
            root_cause_inputs(&ctx.selected(&state, view)?, parameter, thresholds)?
        }
        SelectCommands::CallOfTheWeek(view) => {
            call_of_the_week_inputs(&ctx.selected(&state, view)?, thresholds)?
        }
        SelectCommands::AgentSummary { agent, view } => {
            agent_summary_inputs(&ctx.selected(&state, view)?, agent)
        }
    };

    let stripped: Vec<AuditEntry> = picked
        .into_iter()
        .map(|entry| AuditEntry {
            audio_data: None,
            ..entry.clone()
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&stripped)?);
    Ok(())
}
