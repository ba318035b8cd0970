//! oppstats - operator CLI for the opportunity metrics engine
//!
//! Records events into the aggregates and reads them back. Reads print JSON.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use oppstats_core::analytics::metrics_registry;
use oppstats_core::{
    Config, Database, MetricsEngine, Opportunity, PlatformSummary, TopUsersOrder, User,
};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "oppstats")]
#[command(about = "Real-time metrics for an opportunity platform")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record a user action (viewed, clicked, participated, ignored)
    Track {
        #[arg(short, long)]
        user: i64,
        #[arg(short, long)]
        action: String,
        #[arg(short, long)]
        opportunity: Option<i64>,
        /// JSON object stored on the raw action
        #[arg(short, long)]
        metadata: Option<String>,
    },
    /// Record a finished session
    Session {
        #[arg(short, long)]
        user: i64,
        /// Duration in seconds
        #[arg(short, long)]
        duration: i64,
    },
    /// Record a notification delivery
    Notify {
        #[arg(short, long)]
        user: i64,
        /// Delivery failed
        #[arg(long)]
        failed: bool,
        /// Notification was opened
        #[arg(long)]
        opened: bool,
    },
    /// Record a payment
    Payment {
        #[arg(short, long)]
        user: i64,
        #[arg(short, long)]
        amount: f64,
    },
    /// Show a user's lifetime analytics
    User { user_id: i64 },
    /// Show a user's daily engagement, newest first
    History {
        user_id: i64,
        /// Days to look back (0 uses the configured default)
        #[arg(short, long, default_value_t = 0)]
        days: u32,
    },
    /// Show daily stats between two dates (YYYY-MM-DD, inclusive)
    Range { from: NaiveDate, to: NaiveDate },
    /// Rank users
    TopUsers {
        #[arg(short, long, default_value_t = 0)]
        limit: usize,
        /// viewed, participated, conversion or engagement
        #[arg(short, long, default_value = "viewed")]
        order: TopUsersOrder,
    },
    /// Rank opportunities by performance score
    TopOpportunities {
        #[arg(short, long, default_value_t = 0)]
        limit: usize,
    },
    /// Show today's stats and the trailing-window rollup
    Summary {
        /// Output format: json (default) or text
        #[arg(short, long, default_value = "json")]
        format: String,
    },
    /// Recompute today's snapshot fields now
    Daily,
    /// Register or update a platform user
    AddUser {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        premium: bool,
        /// Registration time (RFC 3339), defaults to now
        #[arg(long)]
        registered: Option<DateTime<Utc>>,
    },
    /// Register or update an opportunity
    AddOpportunity {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        title: String,
        #[arg(long)]
        inactive: bool,
    },
    /// List derived metrics
    Metrics {
        /// Only metrics of this aggregate (e.g. daily_stats)
        #[arg(short, long)]
        aggregate: Option<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging
    let _log_guard =
        oppstats_core::logging::init(&config.logging).context("failed to initialize logging")?;

    // Open database
    let db_path = Config::database_path();
    let db = Database::open(&db_path).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;
    tracing::debug!(path = %db_path.display(), "Opened metrics database");

    let engine = MetricsEngine::with_config(db, config.metrics);
    run(&engine, args.command)
}

fn run(engine: &MetricsEngine<Database>, command: Command) -> Result<()> {
    match command {
        Command::Track {
            user,
            action,
            opportunity,
            metadata,
        } => {
            let metadata = metadata
                .map(|raw| serde_json::from_str::<serde_json::Value>(&raw))
                .transpose()
                .context("metadata is not valid JSON")?;
            engine
                .track_action(user, action.as_str(), opportunity, metadata)
                .context("failed to track action")?;
            println!("Tracked {} by user {}", action, user);
        }
        Command::Session { user, duration } => {
            engine
                .record_session(user, duration)
                .context("failed to record session")?;
            println!("Recorded {}s session for user {}", duration, user);
        }
        Command::Notify {
            user,
            failed,
            opened,
        } => {
            engine
                .record_notification(user, !failed, opened)
                .context("failed to record notification")?;
            println!("Recorded notification for user {}", user);
        }
        Command::Payment { user, amount } => {
            engine
                .record_payment(user, amount)
                .context("failed to record payment")?;
            println!("Recorded payment of {:.2} for user {}", amount, user);
        }
        Command::User { user_id } => {
            let analytics = engine.get_user_analytics(user_id)?;
            print_json(&analytics)?;
        }
        Command::History { user_id, days } => {
            print_json(&engine.get_user_engagement_history(user_id, days)?)?;
        }
        Command::Range { from, to } => {
            print_json(&engine.get_daily_stats_range(from, to)?)?;
        }
        Command::TopUsers { limit, order } => {
            print_json(&engine.get_top_users(limit, order)?)?;
        }
        Command::TopOpportunities { limit } => {
            print_json(&engine.get_top_opportunities(limit)?)?;
        }
        Command::Summary { format } => {
            let summary = engine.get_platform_summary()?;
            if format == "text" {
                print_summary_text(&summary);
            } else {
                print_json(&summary)?;
            }
        }
        Command::Daily => {
            let stats = engine
                .run_daily_metrics_now()
                .context("daily recompute failed")?;
            print_json(&stats)?;
        }
        Command::AddUser {
            id,
            premium,
            registered,
        } => {
            let user = User {
                id,
                created_at: registered.unwrap_or_else(Utc::now),
                is_premium: premium,
            };
            engine.store().upsert_user(&user)?;
            println!("Saved user {}", id);
        }
        Command::AddOpportunity {
            id,
            title,
            inactive,
        } => {
            let opportunity = Opportunity {
                id,
                title,
                is_active: !inactive,
                created_at: Utc::now(),
            };
            engine.store().upsert_opportunity(&opportunity)?;
            let saved = engine
                .store()
                .get_opportunity(id)?
                .context("opportunity missing after save")?;
            print_json(&saved)?;
        }
        Command::Metrics { aggregate } => print_metrics(aggregate.as_deref()),
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_summary_text(summary: &PlatformSummary) {
    match &summary.today {
        Some(today) => {
            println!("Today ({})", today.date);
            println!("  Views:         {}", today.opportunities_viewed);
            println!("  Clicks:        {}", today.opportunities_clicked);
            println!("  Participated:  {}", today.opportunities_participated);
            println!("  Conversion:    {:.1}%", today.conversion_rate);
            println!("  Sessions:      {}", today.total_sessions);
            println!("  Revenue:       {:.2}", today.daily_revenue);
        }
        None => println!("Today: no data"),
    }

    println!();
    println!(
        "Last {} days ({} with data, since {})",
        summary.window_days, summary.days_with_data, summary.window_start
    );
    println!("  Active users:  {}", summary.window_active_users);
    println!("  New users:     {}", summary.window_new_users);
    println!("  Revenue:       {:.2}", summary.window_revenue);
    println!("  Notifications: {}", summary.window_notifications_sent);
    println!(
        "  Avg daily active users: {:.1}",
        summary.average_daily_active_users
    );
}

fn print_metrics(aggregate: Option<&str>) {
    let metrics = match aggregate {
        Some(name) => metrics_registry::list_metrics_for_aggregate(name),
        None => metrics_registry::list_metrics(),
    };

    if metrics.is_empty() {
        println!("No metrics registered.");
        return;
    }

    for metric in metrics {
        println!(
            "{}.{} ({}): {}",
            metric.aggregate,
            metric.name,
            metric.value_type.as_str(),
            metric.summary
        );
    }
}
