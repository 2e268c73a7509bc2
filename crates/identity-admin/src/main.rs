use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use identity_admin::AdminContext;
use identity_admin::config::load_config_from;
use identity_admin::error::AdminError;
use identity_admin::identity::dto::{
    ClaimSelector, RoleDto, UserChangePasswordDto, UserClaimDto, UserDto,
};
use identity_admin::paging::{PageRequest, collect_pages};
use migration::{Migrator, MigratorTrait};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Operator CLI for identity administration.
#[derive(Debug, Parser)]
#[command(name = "identity-admin", version, about)]
struct Cli {
    /// Configuration file
    #[arg(long, env = "IDENTITY_ADMIN_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply pending schema migrations to the identity and grant stores
    Migrate,
    /// Manage users
    #[command(subcommand)]
    Users(UserCommand),
    /// Manage roles and memberships
    #[command(subcommand)]
    Roles(RoleCommand),
    /// Manage user claims
    #[command(subcommand)]
    Claims(ClaimCommand),
    /// Browse and revoke persisted grants
    #[command(subcommand)]
    Grants(GrantCommand),
}

#[derive(Debug, Clone, Args)]
struct PageArgs {
    #[arg(long, default_value_t = 1)]
    page: u64,
    #[arg(long)]
    page_size: Option<u64>,
}

#[derive(Debug, Subcommand)]
enum UserCommand {
    /// List users, optionally filtered by name or email
    List {
        #[arg(long)]
        search: Option<String>,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Show a user with roles, claims and external logins
    Show { user_id: String },
    /// Create a user
    Create {
        user_name: String,
        #[arg(long)]
        email: Option<String>,
        /// Initial password
        #[arg(long, env = "IDENTITY_ADMIN_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Replace a user's email address
    UpdateEmail { user_id: String, email: String },
    /// Delete a user and everything it owns
    Delete { user_id: String },
    /// Set a new password
    Password {
        user_id: String,
        #[arg(long, env = "IDENTITY_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[derive(Debug, Subcommand)]
enum RoleCommand {
    List {
        #[arg(long)]
        search: Option<String>,
        #[command(flatten)]
        page: PageArgs,
    },
    Create { name: String },
    Delete { role_id: String },
    /// Add a user to a role
    Assign { user_id: String, role_id: String },
    /// Remove a user from a role
    Unassign { user_id: String, role_id: String },
}

#[derive(Debug, Subcommand)]
enum ClaimCommand {
    Add {
        user_id: String,
        claim_type: String,
        claim_value: String,
    },
    /// Remove every claim of the user with this type and value
    Remove {
        user_id: String,
        claim_type: String,
        claim_value: String,
    },
}

#[derive(Debug, Subcommand)]
enum GrantCommand {
    /// Subjects holding grants
    Subjects {
        #[arg(long)]
        search: Option<String>,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Grants of one subject, most recent first
    List {
        subject_id: String,
        #[command(flatten)]
        page: PageArgs,
    },
    Show { key: String },
    /// Delete one grant by key
    Delete { key: String },
    /// Revoke a subject's grants, optionally narrowed to a client and type
    Revoke {
        subject_id: String,
        #[arg(long)]
        client: Option<String>,
        #[arg(long, requires = "client")]
        grant_type: Option<String>,
    },
}

fn initialize_standard_tracing() {
    let default_directives = "identity_admin=info,audit=info,sea_orm=warn";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr);

    registry.with(layer).init();
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();
    initialize_standard_tracing();

    let cli = Cli::parse();
    if let Err(report) = run(cli).await {
        // Administrative failures render as the structured error view.
        if let Some(error) = report.downcast_ref::<AdminError>() {
            eprintln!("{}", serde_json::to_string_pretty(&error.view())?);
            std::process::exit(1);
        }
        return Err(report);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config_from(&cli.config)
        .wrap_err_with(|| format!("Failed to load {}", cli.config.display()))?;
    let context = AdminContext::connect(&config)
        .await
        .wrap_err("Failed to connect to the configured stores")?;
    let page = |args: PageArgs| {
        PageRequest::new(
            args.page,
            args.page_size.unwrap_or(config.paging.default_page_size),
            config.paging.max_page_size,
        )
    };

    match cli.command {
        Command::Migrate => {
            Migrator::up(context.identity_db.as_ref(), None).await?;
            if !std::sync::Arc::ptr_eq(&context.identity_db, &context.grants_db) {
                Migrator::up(context.grants_db.as_ref(), None).await?;
            }
            tracing::info!("Migrations applied");
        }
        Command::Users(command) => run_users(&context, command, page, config.paging.max_page_size).await?,
        Command::Roles(command) => run_roles(&context, command, page).await?,
        Command::Claims(command) => run_claims(&context, command).await?,
        Command::Grants(command) => run_grants(&context, command, page).await?,
    }
    Ok(())
}

async fn run_users(
    context: &AdminContext,
    command: UserCommand,
    page: impl Fn(PageArgs) -> PageRequest,
    max_page_size: u64,
) -> Result<()> {
    let identity = &context.identity;
    match command {
        UserCommand::List { search, page: args } => {
            print_json(&identity.get_users(search.as_deref(), page(args)).await?)?
        }
        UserCommand::Show { user_id } => {
            let user = identity.get_user(&user_id).await?;
            let roles = collect_pages(max_page_size, |window| {
                identity.get_user_roles(&user_id, window)
            })
            .await?;
            let claims = collect_pages(max_page_size, |window| {
                identity.get_user_claims(&user_id, window)
            })
            .await?;
            let logins = identity.get_user_providers(&user_id).await?;
            print_json(&serde_json::json!({
                "user": user,
                "roles": roles,
                "claims": claims,
                "logins": logins,
            }))?
        }
        UserCommand::Create {
            user_name,
            email,
            password,
        } => {
            let user = UserDto {
                user_name,
                email,
                ..Default::default()
            };
            print_json(&identity.create_user(&user, password.as_deref()).await?)?
        }
        UserCommand::UpdateEmail { user_id, email } => {
            let mut user = identity.get_user(&user_id).await?;
            user.email = Some(email);
            user.email_confirmed = false;
            print_json(&identity.update_user(&user).await?)?
        }
        UserCommand::Delete { user_id } => print_json(&identity.delete_user(&user_id).await?)?,
        UserCommand::Password { user_id, password } => {
            let request = UserChangePasswordDto {
                user_id: user_id.clone(),
                confirm_password: password.clone(),
                password,
            };
            identity.user_change_password(&request).await?;
            print_json(&serde_json::json!({ "user_id": user_id, "password_changed": true }))?
        }
    }
    Ok(())
}

async fn run_roles(
    context: &AdminContext,
    command: RoleCommand,
    page: impl Fn(PageArgs) -> PageRequest,
) -> Result<()> {
    let identity = &context.identity;
    match command {
        RoleCommand::List { search, page: args } => {
            print_json(&identity.get_roles(search.as_deref(), page(args)).await?)?
        }
        RoleCommand::Create { name } => {
            let role = RoleDto {
                id: String::new(),
                name,
            };
            print_json(&identity.create_role(&role).await?)?
        }
        RoleCommand::Delete { role_id } => print_json(&identity.delete_role(&role_id).await?)?,
        RoleCommand::Assign { user_id, role_id } => {
            print_json(&identity.create_user_role(&user_id, &role_id).await?)?
        }
        RoleCommand::Unassign { user_id, role_id } => {
            print_json(&identity.delete_user_role(&user_id, &role_id).await?)?
        }
    }
    Ok(())
}

async fn run_claims(context: &AdminContext, command: ClaimCommand) -> Result<()> {
    let identity = &context.identity;
    match command {
        ClaimCommand::Add {
            user_id,
            claim_type,
            claim_value,
        } => {
            let claim = UserClaimDto {
                id: 0,
                user_id,
                claim_type,
                claim_value,
            };
            print_json(&identity.create_user_claim(&claim).await?)?
        }
        ClaimCommand::Remove {
            user_id,
            claim_type,
            claim_value,
        } => {
            let selector = ClaimSelector::Pair {
                claim_type,
                claim_value,
            };
            print_json(&identity.delete_user_claim(&user_id, selector).await?)?
        }
    }
    Ok(())
}

async fn run_grants(
    context: &AdminContext,
    command: GrantCommand,
    page: impl Fn(PageArgs) -> PageRequest,
) -> Result<()> {
    let grants = &context.grants;
    match command {
        GrantCommand::Subjects { search, page: args } => print_json(
            &grants
                .get_persisted_grants_by_subjects(search.as_deref(), page(args))
                .await?,
        )?,
        GrantCommand::List {
            subject_id,
            page: args,
        } => print_json(
            &grants
                .get_persisted_grants_by_subject(&subject_id, page(args))
                .await?,
        )?,
        GrantCommand::Show { key } => print_json(&grants.get_persisted_grant(&key).await?)?,
        GrantCommand::Delete { key } => {
            let deleted = grants.delete_persisted_grant(&key).await?;
            print_json(&serde_json::json!({ "key": key, "deleted": deleted }))?
        }
        GrantCommand::Revoke {
            subject_id,
            client,
            grant_type,
        } => {
            let deleted = match (client.as_deref(), grant_type.as_deref()) {
                (Some(client), Some(grant_type)) => {
                    grants
                        .delete_persisted_grants_by_type(&subject_id, client, grant_type)
                        .await?
                }
                (Some(client), None) => {
                    grants
                        .delete_persisted_grants_by_client(&subject_id, client)
                        .await?
                }
                _ => grants.delete_persisted_grants(&subject_id).await?,
            };
            print_json(&serde_json::json!({ "subject_id": subject_id, "deleted": deleted }))?
        }
    }
    Ok(())
}
