mod config;
mod error;

use std::path::PathBuf;

use authz::{
    Action, Authorization, EntityId, ParameterBag, Permission, PermissionFilter,
    PermissionRecord, RoleName, RoleResolver, ScopeFilter, StaticRoles,
};
use clap::{Args, Parser, Subcommand};
use storage::SqliteStore;
use tracing_subscriber::EnvFilter;

use config::Config;
use error::{Error, Result};

const CONFIG_FILE: &str = "authz.toml";

type Engine = Authorization<SqliteStore, StaticRoles>;

#[derive(Parser)]
#[command(name = "authz")]
#[command(about = "Grant, deny and check role permissions", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grant a role permission to perform an action
    Grant(MutationArgs),
    /// Deny a role permission to perform an action
    Deny(MutationArgs),
    /// Resolve the effective permission for roles or an actor
    Check {
        action: String,
        /// Role to include (repeatable)
        #[arg(short, long = "role")]
        roles: Vec<String>,
        /// Actor whose roles come from the [roles] table
        #[arg(short, long)]
        actor: Option<String>,
        #[arg(short, long)]
        entity: Option<String>,
    },
    /// List stored permissions
    List {
        #[arg(long)]
        action: Option<String>,
        /// Only permissions for roles this actor holds
        #[arg(long)]
        actor: Option<String>,
    },
    /// Delete permissions matching every given filter
    Clear {
        #[arg(long)]
        action: Option<String>,
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        entity: Option<String>,
    },
}

#[derive(Args)]
struct MutationArgs {
    action: String,
    role: String,
    /// Scope the permission to one entity
    #[arg(short, long)]
    entity: Option<String>,
    /// Action parameter as key=value (repeatable)
    #[arg(short, long = "param", value_parser = parse_param)]
    params: Vec<(String, String)>,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load_or_default(&cli.config)?;
    init_logging(&config.log.filter);

    let store = match &config.storage.path {
        Some(path) => SqliteStore::open(path)?,
        None => SqliteStore::in_memory()?,
    };
    let auth = Authorization::with_roles(store, config.role_table()?);

    match cli.command {
        Commands::Grant(args) => cmd_mutate(&auth, Permission::Grant, args),
        Commands::Deny(args) => cmd_mutate(&auth, Permission::Deny, args),
        Commands::Check {
            action,
            roles,
            actor,
            entity,
        } => cmd_check(&auth, &action, &roles, actor.as_deref(), entity.as_deref()),
        Commands::List { action, actor } => cmd_list(&auth, action.as_deref(), actor.as_deref()),
        Commands::Clear {
            action,
            role,
            entity,
        } => cmd_clear(&auth, action.as_deref(), role.as_deref(), entity.as_deref()),
    }
}

fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_mutate(auth: &Engine, permission: Permission, args: MutationArgs) -> Result<()> {
    let action = Action::new(args.action)?;
    let role = RoleName::new(args.role)?;
    let entity = args.entity.map(EntityId::new).transpose()?;
    let params: ParameterBag = args.params.into_iter().collect();

    let record = match (permission, params.is_empty()) {
        (Permission::Grant, true) => auth.grant(&action, &role, entity.as_ref())?,
        (Permission::Grant, false) => auth.grant_with_params(&action, &role, entity.as_ref(), params)?,
        (_, true) => auth.deny(&action, &role, entity.as_ref())?,
        (_, false) => auth.deny_with_params(&action, &role, entity.as_ref(), params)?,
    };
    println!("{}", format_record(&record));
    Ok(())
}

fn cmd_check(
    auth: &Engine,
    action: &str,
    roles: &[String],
    actor: Option<&str>,
    entity: Option<&str>,
) -> Result<()> {
    let action = Action::new(action)?;
    let entity = entity.map(EntityId::new).transpose()?;

    let mut held = roles
        .iter()
        .map(|r| RoleName::new(r.as_str()))
        .collect::<authz::Result<Vec<_>>>()?;
    if let Some(actor) = actor {
        held.extend(auth.role_resolver().resolve_roles(actor)?);
    } else if held.is_empty() {
        return Err(Error::MissingRoles);
    }

    let verdict = auth.resolve(&action, &held, entity.as_ref())?;
    println!("{verdict}");
    Ok(())
}

fn cmd_list(auth: &Engine, action: Option<&str>, actor: Option<&str>) -> Result<()> {
    let action = action.map(Action::new).transpose()?;

    let mut records = match actor {
        Some(actor) => auth.user_permissions(actor)?,
        None => auth.query()?,
    };
    if let Some(action) = &action {
        records.retain(|r| &r.action == action);
    }
    records.sort_by(|a, b| {
        (&a.action, &a.role, &a.entity).cmp(&(&b.action, &b.role, &b.entity))
    });

    for record in &records {
        println!("{}", format_record(record));
    }
    Ok(())
}

fn cmd_clear(
    auth: &Engine,
    action: Option<&str>,
    role: Option<&str>,
    entity: Option<&str>,
) -> Result<()> {
    if action.is_none() && role.is_none() && entity.is_none() {
        return Err(Error::MissingFilter);
    }

    let mut filter = PermissionFilter::all();
    if let Some(action) = action {
        filter = filter.action(Action::new(action)?);
    }
    if let Some(role) = role {
        filter = filter.role(RoleName::new(role)?);
    }
    if let Some(entity) = entity {
        filter = filter.scope(ScopeFilter::Entity(EntityId::new(entity)?));
    }

    let removed = auth.clear_matching(&filter)?;
    println!("cleared {removed} permission(s)");
    Ok(())
}

fn parse_param(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{s}'")),
    }
}

fn format_record(record: &PermissionRecord) -> String {
    let entity = record.entity.as_ref().map_or("*", EntityId::as_str);
    let mut line = format!(
        "{}  {:<5}  {}  {}  {}",
        record.id, record.permission, record.action, record.role, entity
    );
    if !record.parameters.is_empty() {
        let params: Vec<String> = record
            .parameters
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        line.push_str("  ");
        line.push_str(&params.join(","));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param("Owner=alice").unwrap(), ("Owner".into(), "alice".into()));
        assert_eq!(parse_param("expr=a=b").unwrap(), ("expr".into(), "a=b".into()));
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
    }

    #[test]
    fn test_cli_parses_grant_with_params() {
        let cli = Cli::try_parse_from([
            "authz", "grant", "Publish", "Editor", "--entity", "doc-1", "--param", "Owner=alice",
        ])
        .unwrap();
        match cli.command {
            Commands::Grant(args) => {
                assert_eq!(args.action, "Publish");
                assert_eq!(args.entity.as_deref(), Some("doc-1"));
                assert_eq!(args.params, vec![("Owner".to_string(), "alice".to_string())]);
            }
            _ => panic!("expected grant"),
        }
    }

    #[test]
    fn test_config_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["authz", "grant", "Publish", "Editor", "--config", "x.toml"])
            .unwrap();
        assert_eq!(cli.config, PathBuf::from("x.toml"));

        let cli = Cli::try_parse_from(["authz", "list"]).unwrap();
        assert_eq!(cli.config, PathBuf::from(CONFIG_FILE));
    }

    #[test]
    fn test_check_and_clear_commands() {
        let auth = Authorization::with_roles(
            SqliteStore::in_memory().unwrap(),
            StaticRoles::new().assign("alice", ["Editor"]).unwrap(),
        );
        let args = MutationArgs {
            action: "Publish".into(),
            role: "Editor".into(),
            entity: None,
            params: vec![("Owner".into(), "alice".into())],
        };
        cmd_mutate(&auth, Permission::Grant, args).unwrap();
        assert!(auth.is_permitted("alice", &Action::new("Publish").unwrap(), None).unwrap());

        assert!(matches!(
            cmd_check(&auth, "Publish", &[], None, None),
            Err(Error::MissingRoles)
        ));
        assert!(matches!(cmd_clear(&auth, None, None, None), Err(Error::MissingFilter)));

        cmd_clear(&auth, Some("Publish"), None, None).unwrap();
        assert!(auth.query().unwrap().is_empty());
    }

    #[test]
    fn test_format_record() {
        let record = PermissionRecord::new(
            authz::PermissionKey::new(
                Action::new("Publish").unwrap(),
                RoleName::new("Editor").unwrap(),
                None,
            ),
            Permission::Deny,
            ParameterBag::from([("Owner".to_string(), "alice".to_string())]),
        )
        .unwrap();
        let line = format_record(&record);
        assert!(line.ends_with("deny   Publish  Editor  *  Owner=alice"));
    }
}
