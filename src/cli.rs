use std::{fmt, time::Duration};

use clap::{Args, Parser, Subcommand};

use crate::{
    github::DEFAULT_API_URL,
    types::{ConfigError, PullRequestTarget},
};

const BUILD_INFO_HUMAN: &str = env!("BUILD_INFO_HUMAN");

/// Environment variables consulted, in order, when `--token` is absent.
pub const TOKEN_ENV_VARS: [&str; 2] = ["GITHUB_TOKEN", "GH_TOKEN"];

// Bare `owner/repo/pull/N` paths are resolved against this.
const PATH_BASE_URL: &str = "https://github.com/";

#[derive(Parser, Debug)]
#[command(name = "autoretest")]
#[command(about = "Keep asking for a retest until a pull request's checks pass")]
#[command(long_version = BUILD_INFO_HUMAN)]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Post /retest-required on a pull request while any of its checks fail
    Pr(PrArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct PrArgs {
    /// Repository owner
    #[arg(short = 'o', long, value_name = "OWNER")]
    pub owner: Option<String>,

    /// Repository name
    #[arg(short = 'r', long, value_name = "REPO")]
    pub repo: Option<String>,

    /// Pull request number
    #[arg(
        short = 'n',
        long,
        value_name = "NUMBER",
        allow_negative_numbers = true
    )]
    pub number: Option<i64>,

    /// Pull request URL, e.g. https://github.com/owner/repo/pull/123
    #[arg(
        short = 'u',
        long,
        value_name = "PR-URL",
        conflicts_with_all = ["owner", "repo", "number"]
    )]
    pub url: Option<String>,

    /// GitHub token (defaults to $GITHUB_TOKEN, then $GH_TOKEN)
    #[arg(short = 't', long, value_name = "TOKEN")]
    pub token: Option<String>,

    /// Seconds to wait between checks; 0 checks once and exits
    #[arg(
        short = 'i',
        long,
        value_name = "SECONDS",
        default_value_t = 0,
        allow_negative_numbers = true
    )]
    pub interval: i64,

    /// GitHub API base URL
    #[arg(long = "api-url", value_name = "URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Verbose output
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Personal access token. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

/// Everything a retest run needs, resolved and validated.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub target: PullRequestTarget,
    pub token: Token,
    /// Zero means single-shot.
    pub interval: Duration,
    pub api_url: String,
    pub verbose: bool,
}

/// Settings gathered from flags, URL and environment before validation.
#[derive(Debug, Default)]
struct Draft {
    owner: String,
    repo: String,
    number: i64,
    token: Option<String>,
    interval: i64,
}

/// Extracts owner, repository and number from a pull request URL.
///
/// Only the path matters: `/<owner>/<repo>/pull/<number>`, with anything after
/// the number ignored. The host is not checked so Enterprise URLs work too.
/// A bare path such as `owner/repo/pull/1` is accepted as well.
pub fn parse_pr_url(url_str: &str) -> Result<PullRequestTarget, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        url: url_str.to_string(),
        reason,
    };

    let url = match url::Url::parse(url_str) {
        Err(url::ParseError::RelativeUrlWithoutBase) => url::Url::parse(PATH_BASE_URL)
            .and_then(|base| base.join(url_str))
            .map_err(|e| invalid(e.to_string()))?,
        other => other.map_err(|e| invalid(e.to_string()))?,
    };

    let segments: Vec<&str> = url
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    if segments.len() < 4 || segments[2] != "pull" {
        return Err(invalid(format!(
            "expected path /<owner>/<repo>/pull/<number>, got segments {:?}",
            segments
        )));
    }

    let number = segments[3]
        .parse::<u64>()
        .map_err(|_| invalid(format!("'{}' is not a pull request number", segments[3])))?;

    Ok(PullRequestTarget::new(segments[0], segments[1], number))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn complete<E>(args: &PrArgs, env: E) -> Result<Draft, ConfigError>
where
    E: Fn(&str) -> Option<String>,
{
    let token = non_blank(args.token.clone())
        .or_else(|| TOKEN_ENV_VARS.iter().find_map(|var| non_blank(env(var))));

    let mut draft = Draft {
        token,
        interval: args.interval,
        ..Draft::default()
    };

    match &args.url {
        Some(url) => {
            let target = parse_pr_url(url)?;
            draft.number = i64::try_from(target.number).map_err(|_| ConfigError::InvalidUrl {
                url: url.clone(),
                reason: format!("pull request number {} is out of range", target.number),
            })?;
            draft.owner = target.owner;
            draft.repo = target.repo;
        }
        None => {
            draft.owner = args.owner.clone().unwrap_or_default();
            draft.repo = args.repo.clone().unwrap_or_default();
            draft.number = args.number.unwrap_or_default();
        }
    }

    Ok(draft)
}

fn validate(draft: Draft, args: &PrArgs) -> Result<RunConfig, ConfigError> {
    let mut problems = Vec::new();

    if draft.token.is_none() {
        problems.push("--token or env:GITHUB_TOKEN is required".to_string());
    }
    if draft.owner.trim().is_empty() {
        problems.push("--owner or --url with owner in path is required".to_string());
    }
    if draft.repo.trim().is_empty() {
        problems.push("--repo or --url with a repository in path is required".to_string());
    }
    if draft.number == 0 {
        problems
            .push("--number or --url with a pull request number in path is required".to_string());
    } else if draft.number < 0 {
        problems.push("--number must not be smaller than 1".to_string());
    }
    if draft.interval < 0 {
        problems.push("--interval must not be smaller than 0".to_string());
    }

    match (
        draft.token,
        u64::try_from(draft.number),
        u64::try_from(draft.interval),
    ) {
        (Some(token), Ok(number), Ok(seconds)) if problems.is_empty() => Ok(RunConfig {
            target: PullRequestTarget::new(draft.owner, draft.repo, number),
            token: Token(token),
            interval: Duration::from_secs(seconds),
            api_url: args.api_url.clone(),
            verbose: args.verbose,
        }),
        _ => Err(ConfigError::Invalid { problems }),
    }
}

/// Turns `pr` arguments into a validated [`RunConfig`].
///
/// `env` looks up environment variables; it is a parameter so callers can
/// supply a fixed environment.
pub fn resolve<E>(args: &PrArgs, env: E) -> Result<RunConfig, ConfigError>
where
    E: Fn(&str) -> Option<String>,
{
    let draft = complete(args, env)?;
    validate(draft, args)
}

/// Parses command-line arguments, reading tokens from `env`.
///
/// Clap usage errors (including `--help` and `--version`) come back as
/// `clap::Error` inside the `anyhow::Error`.
pub fn parse_args_with_env<I, T, E>(args: I, env: E) -> anyhow::Result<RunConfig>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
    E: Fn(&str) -> Option<String>,
{
    let cli = CliArgs::try_parse_from(args)?;
    let Command::Pr(pr) = cli.command;
    Ok(resolve(&pr, env)?)
}

/// Parses command-line arguments against the process environment.
pub fn parse_args<I, T>(args: I) -> anyhow::Result<RunConfig>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    parse_args_with_env(args, |var| std::env::var(var).ok())
}
