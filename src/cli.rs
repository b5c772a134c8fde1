use anyhow::Result;
use clap::{ArgGroup, Parser};
use tracing::debug;

use crate::{
    gerrit::{DEFAULT_HOST, parse_host},
    types::{ChangeAction, Credentials, RunSpec},
};

const BUILD_INFO_HUMAN: &str = env!("BUILD_INFO_HUMAN");

/// The only `--bravery` value that turns off dry-run mode.
const BRAVERY_HIGH: &str = "high";

#[derive(Parser, Debug)]
#[command(
    name = "voteatron",
    about = "Vote-a-tron: find Gerrit changes matching a query and vote on, abandon or re-topic all of them"
)]
#[command(long_version = BUILD_INFO_HUMAN)]
#[command(group(
    ArgGroup::new("mode")
        .args(["msg", "topic", "abandon"])
        .required(true)
        .multiple(true)
))]
struct CliArgs {
    /// Gerrit username
    #[arg(long, env = "GERRIT_USER", value_name = "USERNAME")]
    pub user: String,

    /// Gerrit HTTP password
    #[arg(
        long,
        env = "GERRIT_HTTP_PASSWORD",
        hide_env_values = true,
        value_name = "PASSWORD"
    )]
    pub password: String,

    /// Gerrit query matching *ALL* changes to act on
    #[arg(long, value_name = "SEARCH-QUERY")]
    pub query: String,

    /// Review comment (also used as the reason with --abandon)
    #[arg(long, value_name = "TEXT", conflicts_with = "topic")]
    pub msg: Option<String>,

    /// Set the topic of every matching change instead of voting
    #[arg(long, value_name = "TOPIC")]
    pub topic: Option<String>,

    /// Code-Review vote to leave
    #[arg(
        long,
        default_value_t = 0,
        allow_negative_numbers = true,
        value_parser = clap::value_parser!(i8).range(-2..=2),
        value_name = "VOTE"
    )]
    pub vote: i8,

    /// Workflow vote to leave
    #[arg(
        long,
        default_value_t = 0,
        allow_negative_numbers = true,
        value_parser = clap::value_parser!(i8).range(-1..=1),
        value_name = "VOTE"
    )]
    pub workflow: i8,

    /// Gerrit hostname
    #[arg(long, default_value = DEFAULT_HOST, value_name = "HOST")]
    pub host: String,

    /// Set this to 'high' to actually make changes; anything else is a dry run
    #[arg(long, default_value = "low", value_name = "LEVEL")]
    pub bravery: String,

    /// Abandon matching changes (takes priority over --msg and --topic)
    #[arg(long)]
    pub abandon: bool,

    /// Stop after this many actions (0 = unlimited)
    #[arg(short = 'L', long, default_value_t = 0, value_name = "NUM")]
    pub limit: usize,
}

impl CliArgs {
    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            anyhow::bail!("--query must not be empty");
        }

        if self.topic.as_deref().is_some_and(|t| t.trim().is_empty()) {
            anyhow::bail!("--topic must not be empty");
        }

        Ok(())
    }

    fn action(&self) -> ChangeAction {
        if self.abandon {
            ChangeAction::Abandon {
                message: self.msg.clone(),
            }
        } else if let Some(topic) = &self.topic {
            ChangeAction::Topic {
                topic: topic.clone(),
            }
        } else {
            ChangeAction::Review {
                message: self.msg.clone().unwrap_or_default(),
                vote: self.vote,
                workflow: self.workflow,
            }
        }
    }
}

/// Returns true unless `bravery` is exactly `high`.
pub fn is_dry_run(bravery: &str) -> bool {
    bravery != BRAVERY_HIGH
}

fn create_run_spec(cli: CliArgs) -> Result<RunSpec> {
    cli.validate()?;

    let host = parse_host(&cli.host)?;
    let action = cli.action();
    let dry_run = is_dry_run(&cli.bravery);
    debug!(action = action.name(), dry_run, limit = cli.limit, "parsed arguments");

    Ok(RunSpec {
        host,
        credentials: Credentials::new(cli.user, cli.password),
        query: cli.query,
        action,
        dry_run,
        limit: cli.limit,
    })
}

/// Parses command-line arguments into a run specification.
///
/// clap errors (including `--help` and `--version`) are returned as
/// `clap::Error` inside the `anyhow::Error` so the caller can pick the right
/// exit path.
pub fn parse_args<I, T>(args: I) -> Result<RunSpec>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = CliArgs::try_parse_from(args)?;
    create_run_spec(cli)
}
