use oppstats_core::store::UserAnalyticsStore;
use oppstats_core::Database;
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_data).expect("failed to create XDG_DATA_HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
        }
    }

    fn db_path(&self) -> PathBuf {
        self.xdg_data.join("oppstats/metrics.db")
    }

    fn write_config(&self, contents: &str) {
        let dir = self.xdg_config.join("oppstats");
        fs::create_dir_all(&dir).expect("failed to create config dir");
        fs::write(dir.join("config.toml"), contents).expect("failed to write config");
    }
}

fn run_cli(env: &CliTestEnv, args: &[&str]) -> Output {
    Command::new(assert_cmd::cargo::cargo_bin!("oppstats"))
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute oppstats: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "oppstats {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

/// Run a command that must succeed and return its stdout.
fn run_ok(env: &CliTestEnv, args: &[&str]) -> String {
    let output = run_cli(env, args);
    assert_success(args, &output);
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn run_json(env: &CliTestEnv, args: &[&str]) -> serde_json::Value {
    let stdout = run_ok(env, args);
    serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("expected JSON from {args:?}: {e}\n{stdout}"))
}

#[test]
fn track_updates_user_and_opportunity_aggregates() {
    let env = CliTestEnv::new();

    run_ok(&env, &["add-user", "--id", "1", "--premium"]);
    for _ in 0..2 {
        run_ok(
            &env,
            &["track", "--user", "1", "--action", "viewed", "--opportunity", "5"],
        );
    }
    run_ok(
        &env,
        &[
            "track",
            "--user",
            "1",
            "--action",
            "clicked",
            "--opportunity",
            "5",
            "--metadata",
            r#"{"source": "feed"}"#,
        ],
    );

    let user = run_json(&env, &["user", "1"]);
    assert_eq!(user["viewed_opportunities"], 2);
    assert_eq!(user["clicked_opportunities"], 1);
    assert_eq!(user["view_to_click_rate"], 50.0);

    let top = run_json(&env, &["top-opportunities"]);
    let top = top.as_array().expect("array of opportunities");
    assert_eq!(top.len(), 1);
    assert_eq!(top[0]["opportunity_id"], 5);
    assert_eq!(top[0]["total_views"], 2);
    assert_eq!(top[0]["unique_views"], 1);
    assert_eq!(top[0]["premium_user_views"], 2);
    assert_eq!(top[0]["free_user_views"], 0);

    let history = run_json(&env, &["history", "1", "--days", "1"]);
    assert_eq!(history[0]["actions_count"], 3);

    // The CLI writes to the XDG data dir
    let db = Database::open(&env.db_path()).expect("failed to open db");
    db.migrate().expect("failed to migrate db");
    let analytics = db
        .get_user_analytics(1)
        .expect("failed to read analytics")
        .expect("analytics row should exist");
    assert_eq!(analytics.viewed_opportunities, 2);
}

#[test]
fn daily_and_summary_reflect_recorded_events() {
    let env = CliTestEnv::new();

    run_ok(&env, &["add-opportunity", "--id", "1", "--title", "Hackathon"]);
    run_ok(
        &env,
        &["add-opportunity", "--id", "2", "--title", "Closed", "--inactive"],
    );
    run_ok(&env, &["add-user", "--id", "7"]);
    run_ok(&env, &["session", "--user", "7", "--duration", "120"]);
    run_ok(&env, &["payment", "--user", "7", "--amount", "9.5"]);
    run_ok(&env, &["notify", "--user", "7", "--opened"]);
    run_ok(&env, &["notify", "--user", "7", "--failed"]);

    let daily = run_json(&env, &["daily"]);
    assert_eq!(daily["total_opportunities"], 1);
    assert_eq!(daily["active_users"], 1);
    assert_eq!(daily["new_users"], 1);
    assert_eq!(daily["total_sessions"], 1);
    assert_eq!(daily["notifications_sent"], 1);
    assert_eq!(daily["notifications_failed"], 1);

    // Running again converges on the same snapshot
    let again = run_json(&env, &["daily"]);
    assert_eq!(again["active_users"], daily["active_users"]);
    assert_eq!(again["new_users"], daily["new_users"]);

    let summary = run_json(&env, &["summary"]);
    assert_eq!(summary["window_days"], 7);
    assert_eq!(summary["days_with_data"], 1);
    assert_eq!(summary["window_revenue"], 9.5);
    assert_eq!(summary["today"]["new_subscriptions"], 1);

    let text = run_ok(&env, &["summary", "--format", "text"]);
    assert!(text.contains("Last 7 days"), "unexpected summary:\n{text}");

    let date = daily["date"].as_str().expect("date string").to_string();
    let range = run_json(&env, &["range", &date, &date]);
    assert_eq!(range.as_array().map(Vec::len), Some(1));
}

#[test]
fn top_users_respects_order_and_config() {
    let env = CliTestEnv::new();
    env.write_config("[metrics]\ndefault_top_limit = 1\n");

    run_ok(&env, &["track", "--user", "1", "--action", "viewed"]);
    run_ok(&env, &["track", "--user", "1", "--action", "viewed"]);
    run_ok(&env, &["track", "--user", "2", "--action", "viewed"]);
    run_ok(&env, &["session", "--user", "2", "--duration", "60"]);

    let by_views = run_json(&env, &["top-users"]);
    let by_views = by_views.as_array().expect("array of users");
    assert_eq!(by_views.len(), 1);
    assert_eq!(by_views[0]["user_id"], 1);

    let by_engagement = run_json(&env, &["top-users", "--order", "engagement", "--limit", "5"]);
    assert_eq!(by_engagement[0]["user_id"], 2);
    assert_eq!(by_engagement.as_array().map(Vec::len), Some(2));

    let bad = run_cli(&env, &["top-users", "--order", "revenue"]);
    assert!(!bad.status.success());
}

#[test]
fn invalid_events_are_rejected() {
    let env = CliTestEnv::new();

    let output = run_cli(&env, &["track", "--user", "0", "--action", "viewed"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("user_id must be positive"),
        "unexpected stderr:\n{stderr}"
    );

    let output = run_cli(&env, &["session", "--user", "1", "--duration", "0"]);
    assert!(!output.status.success());

    let output = run_cli(
        &env,
        &["track", "--user", "1", "--action", "viewed", "--metadata", "[1]"],
    );
    assert!(!output.status.success());

    // Nothing was recorded for the rejected user
    let user = run_json(&env, &["user", "1"]);
    assert!(user.is_null());
}

#[test]
fn metrics_lists_registered_descriptors() {
    let env = CliTestEnv::new();

    let stdout = run_ok(&env, &["metrics"]);
    assert!(stdout.contains("opportunity_stats.performance_score"));
    assert!(stdout.contains("user_engagement.engagement_level"));

    let daily_only = run_ok(&env, &["metrics", "--aggregate", "daily_stats"]);
    assert!(daily_only.contains("daily_stats.conversion_rate"));
    assert!(!daily_only.contains("performance_score"));
}

#[test]
fn add_opportunity_prints_saved_row() {
    let env = CliTestEnv::new();

    let saved = run_json(&env, &["add-opportunity", "--id", "4", "--title", "Grant"]);
    assert_eq!(saved["id"], 4);
    assert_eq!(saved["title"], "Grant");
    assert_eq!(saved["is_active"], true);

    // Re-saving updates the same row in place
    let updated = run_json(
        &env,
        &["add-opportunity", "--id", "4", "--title", "Grant", "--inactive"],
    );
    assert_eq!(updated["id"], 4);
    assert_eq!(updated["is_active"], false);
}
