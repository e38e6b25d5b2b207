use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "realmsync")]
#[command(about = "realmsync: converge Keycloak realms to their JSON documents")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Admin API base URL
    #[arg(long, global = true, env = "KEYCLOAK_URL")]
    pub url: Option<String>,

    /// Administrative user in the master realm
    #[arg(long, global = true, env = "KEYCLOAK_ADMIN_USER")]
    pub admin_user: Option<String>,

    /// Administrative password
    #[arg(long, global = true, env = "KEYCLOAK_ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,

    /// Fixture user provisioned in dev and qa realms
    #[arg(long, global = true, env = "TEST_USERNAME")]
    pub test_username: Option<String>,

    /// Password forced onto the fixture user
    #[arg(long, global = true, env = "TEST_PASSWORD", hide_env_values = true)]
    pub test_password: Option<String>,

    /// Optional settings file (default: realmsync.toml when present)
    #[arg(short, long, global = true, env = "REALMSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the <realm>-realm.json documents
    #[arg(long, global = true)]
    pub import_dir: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ensure, converge, apply trusted hosts and provision fixtures for every realm
    Sync,
    /// Show what a sync would send, without changing anything
    Plan(PlanArgs),
    /// Create missing realms from their full documents; leave existing ones alone
    Ensure,
    /// Delete the managed realms
    Delete(DeleteArgs),
    /// Apply, relax or show the trusted-hosts policy of one realm
    TrustedHosts(TrustedHostsArgs),
    /// Ensure the fixture user of one realm
    Fixture(RealmArgs),
}

#[derive(clap::Args)]
pub struct PlanArgs {
    /// Print the merged documents
    #[arg(long)]
    pub documents: bool,
}

#[derive(clap::Args)]
pub struct DeleteArgs {
    /// Confirm deletion
    #[arg(long)]
    pub yes: bool,
}

#[derive(clap::Args)]
pub struct RealmArgs {
    /// Realm name (e.g. kairos-dev)
    #[arg(long)]
    pub realm: String,
}

#[derive(clap::Args)]
pub struct TrustedHostsArgs {
    /// Realm name (e.g. kairos-qa)
    #[arg(long)]
    pub realm: String,
    /// Turn both must-match checks off instead of applying the host list
    #[arg(long, conflicts_with = "print_config")]
    pub relax: bool,
    /// Print the current policy configuration and exit
    #[arg(long)]
    pub print_config: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trusted_hosts() {
        let cli = Cli::try_parse_from(["realmsync", "trusted-hosts", "--realm", "kairos-qa", "--relax"]).unwrap();
        let Commands::TrustedHosts(args) = cli.command else {
            panic!("expected trusted-hosts");
        };
        assert_eq!(args.realm, "kairos-qa");
        assert!(args.relax);
        assert!(!args.print_config);
    }

    #[test]
    fn test_relax_conflicts_with_print_config() {
        let result = Cli::try_parse_from([
            "realmsync",
            "trusted-hosts",
            "--realm",
            "kairos-qa",
            "--relax",
            "--print-config",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["realmsync", "sync", "--url", "http://kc:8080", "--log-level", "debug"]).unwrap();
        assert_eq!(cli.url.as_deref(), Some("http://kc:8080"));
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(cli.command, Commands::Sync));
    }
}
