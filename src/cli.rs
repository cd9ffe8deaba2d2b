use clap::{Args, Parser, Subcommand, ValueEnum};
use hashcloud_acl::Role;
use hashcloud_auth::{Action, Principal};
use hashcloud_catalog::Digest;
use std::path::PathBuf;

/// Content-addressed file store with signed requests and per-object access control.
#[derive(Debug, Parser)]
#[command(name = "hashcloud", version)]
pub struct Cli {
    /// Config file (TOML, YAML or JSON).
    #[arg(short, long, global = true, env = "HASHCLOUD_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store one or more files.
    Upload {
        #[command(flatten)]
        credentials: Credentials,
        /// Content type recorded for every file.
        #[arg(long, default_value = "")]
        content_type: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List the objects visible to a principal.
    List {
        #[command(flatten)]
        credentials: Credentials,
    },
    /// Write an object's bytes to a file or stdout.
    Download {
        #[command(flatten)]
        credentials: Credentials,
        #[arg(value_parser = parse_digest)]
        digest: Digest,
        /// Destination file; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Change who may access an object.
    Share {
        #[command(flatten)]
        credentials: Credentials,
        #[arg(value_parser = parse_digest)]
        digest: Digest,
        /// `PRINCIPAL=ROLE`, where ROLE is owner, manager, viewer, none or 0-3.
        #[arg(short, long = "grant", value_parser = parse_grant)]
        grants: Vec<(Principal, Role)>,
        /// Grants as a JSON object of principal to role number.
        #[arg(long)]
        delta: Option<String>,
    },
    /// Delete an object for everybody.
    Delete {
        #[command(flatten)]
        credentials: Credentials,
        #[arg(value_parser = parse_digest)]
        digest: Digest,
    },
    /// Prune stale index rows and collect blobs without a record.
    Reconcile,
    /// Print the principal derived from a private key.
    Address {
        #[arg(long, env = "HASHCLOUD_KEY", hide_env_values = true)]
        key: String,
    },
    /// Sign a canonical message with a private key.
    Sign {
        #[arg(long, env = "HASHCLOUD_KEY", hide_env_values = true)]
        key: String,
        action: ActionArg,
        /// Digests or principal the action applies to, in order.
        params: Vec<String>,
    },
}

/// Who is making the request, and their proof.
///
/// With `--key` the principal and signature are both derived locally.
/// Otherwise both must be supplied.
#[derive(Debug, Args)]
pub struct Credentials {
    /// Hex private key used to sign the request.
    #[arg(long, env = "HASHCLOUD_KEY", hide_env_values = true, conflicts_with_all = ["principal", "signature"])]
    pub key: Option<String>,
    #[arg(long, requires = "signature", value_parser = parse_principal)]
    pub principal: Option<Principal>,
    /// Hex encoded 65-byte signature over the canonical message.
    #[arg(long, requires = "principal")]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ActionArg {
    Upload,
    List,
    Download,
    Share,
    Delete,
}

impl From<ActionArg> for Action {
    fn from(action: ActionArg) -> Self {
        match action {
            ActionArg::Upload => Self::Upload,
            ActionArg::List => Self::List,
            ActionArg::Download => Self::Download,
            ActionArg::Share => Self::Share,
            ActionArg::Delete => Self::Delete,
        }
    }
}

fn parse_digest(s: &str) -> Result<Digest, String> {
    s.parse::<Digest>().map_err(|e: hashcloud_catalog::error::Error| (*e).to_string())
}

fn parse_principal(s: &str) -> Result<Principal, String> {
    s.parse::<Principal>().map_err(|e: hashcloud_auth::error::Error| (*e).to_string())
}

fn parse_grant(s: &str) -> Result<(Principal, Role), String> {
    let (principal, role) = s.split_once('=').ok_or_else(|| format!("expected PRINCIPAL=ROLE, got {s:?}"))?;
    let role = role.parse::<Role>().map_err(|e: hashcloud_acl::error::Error| (*e).to_string())?;
    Ok((parse_principal(principal)?, role))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rstest::rstest;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[rstest]
    #[case("0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=viewer", Role::Viewer)]
    #[case("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa=2", Role::Manager)]
    #[case("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa=none", Role::None)]
    fn test_parse_grant(#[case] input: &str, #[case] role: Role) {
        let (principal, parsed) = parse_grant(input).unwrap();
        assert_eq!(principal, Principal::from_bytes([0xaa; 20]));
        assert_eq!(parsed, role);
    }

    #[rstest]
    #[case("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")]
    #[case("0xaaaa=viewer")]
    #[case("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa=admin")]
    fn test_parse_grant_rejects(#[case] input: &str) {
        assert!(parse_grant(input).is_err());
    }

    #[test]
    fn test_credentials_conflict() {
        let result = Cli::try_parse_from(["hashcloud", "list", "--key", "01", "--principal", "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"]);
        assert!(result.is_err());
        let result = Cli::try_parse_from(["hashcloud", "list", "--principal", "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"]);
        assert!(result.is_err());
    }
}
