//! Autoretest: keeps a pull request's CI moving.
//!
//! Reads the commit statuses on a pull request's head commit and posts
//! `/retest-required` while any of them fail, either once or on a fixed
//! interval until everything passes.

pub mod cli;
pub mod github;
pub mod poll;
pub mod types;

pub use cli::{PrArgs, RunConfig, Token, parse_args, parse_args_with_env, parse_pr_url, resolve};
pub use github::{DEFAULT_API_URL, GitHub, setup_github_client};
pub use poll::{get_checks, retest_until_green};
pub use types::{
    CheckRecord, CheckReport, CheckState, CommitRef, ConfigError, Error, Gateway, Outcome,
    PullRequestTarget, RETEST_COMMENT, RemoteError, RemoteOperation,
};
