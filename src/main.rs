use anyhow::Result;
use clap::{Parser, Subcommand};
use roleguard_core::{
    config::Config,
    domain::StringUuid,
    error::AppError,
    migration,
    policy_store::{PolicyStore, PolicyStoreClient},
    repository::{
        application::ApplicationRepositoryImpl, rbac::RbacRepositoryImpl,
        user::UserRepositoryImpl,
    },
    service::{
        AuthorizationService, PermissionApplicationService, RbacService, RuleSetReconciler,
    },
    telemetry,
};
use serde::Serialize;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "roleguard-core", version, about = "RBAC reconciliation against a remote policy engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database if needed and apply migrations
    Migrate,
    /// Ask the policy engine whether a user holds a permission
    Check {
        #[arg(long)]
        user: String,
        #[arg(long)]
        permission: String,
        #[arg(long)]
        resource_kind: Option<String>,
    },
    /// Replace the permissions a role holds on a resource kind
    SetRolePermissions {
        #[arg(long)]
        role_id: StringUuid,
        #[arg(long = "permission-id")]
        permission_ids: Vec<StringUuid>,
        #[arg(long)]
        resource_kind: Option<String>,
    },
    /// Remove a role from the policy and the local store
    RemoveRole {
        #[arg(long)]
        role_id: StringUuid,
        #[arg(long)]
        resource_kind: Option<String>,
    },
    /// Link a permission to exactly the given applications
    LinkApplications {
        #[arg(long)]
        permission_id: StringUuid,
        #[arg(long = "application-id")]
        application_ids: Vec<StringUuid>,
    },
    /// List every role with the permissions the policy grants it
    ListRoles {
        #[arg(long)]
        resource_kind: Option<String>,
    },
    /// Show a user's roles and their permissions
    UserRoles {
        #[arg(long)]
        user: String,
        #[arg(long)]
        resource_kind: Option<String>,
    },
}

type Rbac = RbacService<RbacRepositoryImpl, UserRepositoryImpl>;

struct Components {
    pool: MySqlPool,
    store: Arc<dyn PolicyStore>,
    rbac_repo: Arc<RbacRepositoryImpl>,
    user_repo: Arc<UserRepositoryImpl>,
}

impl Components {
    async fn connect(config: &Config) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(config.database.max_connections)
            .min_connections(config.database.min_connections)
            .connect(&config.database.url)
            .await?;
        info!("Connected to database");

        let store: Arc<dyn PolicyStore> =
            Arc::new(PolicyStoreClient::new(config.policy_store.clone())?);

        Ok(Self {
            rbac_repo: Arc::new(RbacRepositoryImpl::new(pool.clone())),
            user_repo: Arc::new(UserRepositoryImpl::new(pool.clone())),
            pool,
            store,
        })
    }

    fn rbac(&self) -> Rbac {
        let rule_sets = Arc::new(RuleSetReconciler::new(self.store.clone()));
        RbacService::new(self.rbac_repo.clone(), self.user_repo.clone(), rule_sets)
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::from_env()?;
    telemetry::init(&config.telemetry);

    let result = run(cli.command, &config).await;
    if let Err(e) = &result {
        let kind = e
            .downcast_ref::<AppError>()
            .map(AppError::kind)
            .unwrap_or("internal_error");
        error!(kind, error = %e, "Command failed");
    }
    result
}

async fn run(command: Command, config: &Config) -> Result<()> {
    let kind_or_default = |kind: Option<String>| {
        kind.unwrap_or_else(|| config.policy_store.default_resource_kind.clone())
    };

    if let Command::Migrate = command {
        return migration::run_migrations(config).await;
    }

    let components = Components::connect(config).await?;

    match command {
        Command::Migrate => {}
        Command::Check {
            user,
            permission,
            resource_kind,
        } => {
            let service =
                AuthorizationService::new(components.user_repo.clone(), components.store.clone());
            let allowed = service
                .validate_user_permission(&user, &permission, &kind_or_default(resource_kind))
                .await?;
            print_json(&serde_json::json!({
                "user": user,
                "permission": permission,
                "allowed": allowed,
            }))?;
        }
        Command::SetRolePermissions {
            role_id,
            permission_ids,
            resource_kind,
        } => {
            let view = components
                .rbac()
                .set_role_permissions(role_id, &permission_ids, &kind_or_default(resource_kind))
                .await?;
            print_json(&view)?;
        }
        Command::RemoveRole {
            role_id,
            resource_kind,
        } => {
            components
                .rbac()
                .delete_role(role_id, &kind_or_default(resource_kind))
                .await?;
            print_json(&serde_json::json!({ "removed": role_id.to_string() }))?;
        }
        Command::LinkApplications {
            permission_id,
            application_ids,
        } => {
            let app_repo = Arc::new(ApplicationRepositoryImpl::new(components.pool.clone()));
            let service = PermissionApplicationService::new(components.rbac_repo.clone(), app_repo);
            let diff = service
                .update_permission_applications(permission_id, &application_ids)
                .await?;
            print_json(&serde_json::json!({
                "added": diff.to_add,
                "removed": diff.to_remove,
            }))?;
        }
        Command::ListRoles { resource_kind } => {
            let roles = components
                .rbac()
                .list_roles(&kind_or_default(resource_kind))
                .await?;
            print_json(&roles)?;
        }
        Command::UserRoles {
            user,
            resource_kind,
        } => {
            let roles = components
                .rbac()
                .get_user_roles(&user, &kind_or_default(resource_kind))
                .await?;
            print_json(&roles)?;
        }
    }

    components.pool.close().await;
    Ok(())
}
