use std::io::Read;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "siteinsight", about = "AI narratives and recommendations for site analytics")]
struct Cli {
    /// Database path (default: ~/.siteinsight/siteinsight.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate (or fetch cached) analysis for one report page
    Analyze {
        /// Site identifier
        #[arg(long)]
        site: String,
        /// Page type, e.g. summary, channels, comprehensive_improvement
        #[arg(long)]
        page_type: String,
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: String,
        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: String,
        /// Metrics JSON file, or - for stdin
        #[arg(long)]
        metrics: String,
        /// Caller identity (default: config user_id)
        #[arg(long)]
        user: Option<String>,
        /// Ignore cached results
        #[arg(long)]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect and manage monthly generation limits
    Usage {
        #[command(subcommand)]
        action: UsageAction,
    },
    /// Cache maintenance
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum UsageAction {
    /// Show this month's usage
    Show {
        /// User (default: config user_id)
        #[arg(long)]
        user: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Override a user's monthly limit
    SetLimit {
        /// summary or improvement
        category: String,
        limit: i64,
        /// User (default: config user_id)
        #[arg(long)]
        user: Option<String>,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Delete old legacy cache entries
    Prune {
        /// User (default: config user_id)
        #[arg(long)]
        user: Option<String>,
        /// Maximum age in days
        #[arg(long, default_value = "30")]
        days: i64,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => siteinsight::Database::open_at(path).await?,
        None => siteinsight::Database::open().await?,
    };

    match cli.command {
        Commands::Config { action } => {
            handle_config(&siteinsight::Settings::new(db), action).await?;
        }
        Commands::Analyze {
            site,
            page_type,
            start,
            end,
            metrics,
            user,
            force,
            json,
        } => {
            let app = siteinsight::SiteInsight::open(db).await?;
            let request = siteinsight::AnalysisRequest {
                user_id: user,
                site_id: site,
                page_type,
                start_date: start,
                end_date: end,
                metrics: read_metrics(&metrics)?,
                force_regenerate: force,
            };
            let response = app.analyze(request).await?;
            print_response(&response, json)?;
        }
        Commands::Usage { action } => {
            let app = siteinsight::SiteInsight::with_client(db, None).await?;
            handle_usage(&app, action).await?;
        }
        Commands::Cache { action } => {
            let app = siteinsight::SiteInsight::with_client(db, None).await?;
            match action {
                CacheAction::Prune { user, days } => {
                    let user = resolve_user(&app, user).await?;
                    let removed = app.prune_legacy_cache(&user, days).await?;
                    println!("Removed {removed} legacy cache entries older than {days} days.");
                }
            }
        }
    }

    Ok(())
}

fn read_metrics(source: &str) -> anyhow::Result<serde_json::Value> {
    let text = if source == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(source)
            .map_err(|e| anyhow::anyhow!("cannot read metrics file {source}: {e}"))?
    };
    Ok(serde_json::from_str(&text)?)
}

async fn resolve_user(app: &siteinsight::SiteInsight, user: Option<String>) -> anyhow::Result<String> {
    match user {
        Some(u) => Ok(u),
        None => app.settings().get("user_id").await?.ok_or_else(|| {
            anyhow::anyhow!("No user given. Pass --user or run 'siteinsight config set user_id <id>'.")
        }),
    }
}

fn print_response(response: &siteinsight::AnalysisResponse, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
        return Ok(());
    }

    let source = if response.from_cache { "cached" } else { "generated" };
    println!("({source} at {})\n", response.generated_at);
    println!("{}", response.summary);

    if !response.recommendations.is_empty() {
        println!("\nRecommendations:");
        for (i, rec) in response.recommendations.iter().enumerate() {
            println!("\n  {}. {} [{} / {}]", i + 1, rec.title, rec.category, rec.priority);
            if !rec.description.is_empty() {
                println!("     {}", rec.description);
            }
            if let Some(impact) = &rec.expected_impact {
                println!("     Expected impact: {impact}");
            }
        }
    }
    Ok(())
}

async fn handle_usage(app: &siteinsight::SiteInsight, action: UsageAction) -> anyhow::Result<()> {
    match action {
        UsageAction::Show { user, json } => {
            let user = resolve_user(app, user).await?;
            let report = app.usage_report(&user).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Usage for {user}:");
                for counter in &report {
                    println!(
                        "  {:<12} {:>4} / {:<4} ({} left, resets {})",
                        counter.category.as_str(),
                        counter.count,
                        counter.limit,
                        counter.remaining(),
                        counter.resets_on
                    );
                }
            }
        }
        UsageAction::SetLimit {
            category,
            limit,
            user,
        } => {
            let user = resolve_user(app, user).await?;
            let category = siteinsight::UsageCategory::parse(&category).ok_or_else(|| {
                anyhow::anyhow!("Unknown category '{category}'. Use summary or improvement.")
            })?;
            app.set_usage_limit(&user, category, limit).await?;
            println!("Monthly {category} limit for {user} set to {limit}.");
        }
    }
    Ok(())
}

async fn handle_config(settings: &siteinsight::Settings, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match settings.get(&key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            settings.set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let items = settings.list().await?;
            if items.is_empty() {
                println!("No configuration set.");
            }
            for (k, v) in items {
                println!("{k} = {v}");
            }
        }
    }
    Ok(())
}
