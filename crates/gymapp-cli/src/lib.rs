#![allow(clippy::print_stdout)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use gymapp_api_client::ApiClient;
use gymapp_session_core::{
    FileSessionStore, LoggingNavigator, ReconcileOutcome, Session, SessionContext, SessionDeps,
};
use serde_json::{Value, json};

pub mod config;
pub mod identity;

use config::{CliConfig, CliOverrides};
use identity::TerminalIdentity;

#[derive(Parser)]
#[command(name = "gymapp")]
#[command(about = "Session and API access for the gymapp backend")]
pub struct GymappCli {
    /// Backend base URL (overrides GYMAPP_API_BASE_URL)
    #[arg(long, global = true)]
    pub base_url: Option<String>,
    /// Which client to act as: gymapp or admin
    #[arg(long, global = true)]
    pub variant: Option<String>,
    /// Where the session entries live (overrides GYMAPP_SESSION_DIR)
    #[arg(long, global = true)]
    pub session_dir: Option<PathBuf>,
    /// Identity provider bearer token (overrides GYMAPP_IDENTITY_TOKEN)
    #[arg(long, global = true)]
    pub identity_token: Option<String>,
    /// Identity provider subject for the token
    #[arg(long, global = true)]
    pub subject: Option<String>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Show the reconciled session
    Status,
    /// Exchange the identity token for an internal session
    Login,
    /// Sign out locally and end the provider session
    Logout,
    /// Re-issue the session for another role
    SelectRole { role: String },
    /// GET a backend path
    Get {
        path: String,
        /// Print only the rows of a list response
        #[arg(long)]
        list: bool,
    },
    /// DELETE a backend path
    Delete { path: String },
    /// POST a JSON body to a backend path
    Post {
        path: String,
        #[arg(long, default_value = "{}")]
        body: String,
    },
    /// PUT a JSON body to a backend path
    Put {
        path: String,
        #[arg(long, default_value = "{}")]
        body: String,
    },
    /// PATCH a JSON body to a backend path
    Patch {
        path: String,
        #[arg(long, default_value = "{}")]
        body: String,
    },
}

struct Runtime {
    api: Arc<ApiClient>,
    session: Arc<SessionContext>,
}

impl Runtime {
    fn build(cli: &GymappCli) -> anyhow::Result<Self> {
        let config = CliConfig::resolve(CliOverrides {
            base_url: cli.base_url.clone(),
            variant: cli.variant.clone(),
            session_dir: cli.session_dir.clone(),
        })?;
        tracing::debug!(
            base_url = %config.api.base_url,
            variant = config.api.variant.as_str(),
            session_dir = %config.session_dir.display(),
            "resolved configuration"
        );

        let store = Arc::new(FileSessionStore::new(config.session_dir.clone()));
        let navigator = Arc::new(LoggingNavigator::new(config.entry_route.clone()));
        let identity = Arc::new(
            TerminalIdentity::new(cli.identity_token.clone(), cli.subject.clone())
                .or(TerminalIdentity::from_env()),
        );
        let api = Arc::new(
            ApiClient::new(config.api, store.clone(), navigator.clone())
                .context("build api client")?,
        );
        let session = Arc::new(SessionContext::new(
            SessionDeps::new(store, identity, api.clone(), navigator)
                .with_exchange_timeout(config.exchange_timeout),
        ));
        api.attach_session(&session);
        Ok(Self { api, session })
    }

    /// Settle the session before any command touches it.
    async fn settle(&self) -> Session {
        let outcome = self.session.sync_identity().await;
        if let ReconcileOutcome::ExchangeFailed(error) = &outcome {
            tracing::warn!(error = %error, "token exchange failed");
        }
        self.session.ready().await
    }

    async fn require_session(&self) -> anyhow::Result<Session> {
        let session = self.settle().await;
        if !session.is_authenticated() {
            bail!("not signed in; run `gymapp login --identity-token <token>`");
        }
        Ok(session)
    }
}

pub async fn run(cli: GymappCli) -> anyhow::Result<()> {
    let runtime = Runtime::build(&cli)?;

    let output = match cli.command {
        Commands::Status => session_summary(&runtime.settle().await),
        Commands::Login => {
            let session = runtime.settle().await;
            if !session.is_authenticated() {
                runtime
                    .session
                    .login()
                    .await
                    .context("identity provider sign-in")?;
            }
            session_summary(&runtime.session.session())
        }
        Commands::Logout => {
            runtime.settle().await;
            runtime.session.logout().await.context("logout")?;
            session_summary(&runtime.session.session())
        }
        Commands::SelectRole { role } => {
            runtime.require_session().await?;
            let reissued = runtime.api.select_role(&role).await?;
            runtime
                .session
                .set_auth_data(reissued.token, reissued.user)?;
            session_summary(&runtime.session.session())
        }
        Commands::Get { path, list } => {
            runtime.require_session().await?;
            if list {
                Value::Array(runtime.api.get_list(&path).await?)
            } else {
                runtime.api.get_json::<Value>(&path).await?
            }
        }
        Commands::Delete { path } => {
            runtime.require_session().await?;
            runtime.api.delete_json::<Value>(&path).await?
        }
        Commands::Post { path, body } => {
            runtime.require_session().await?;
            runtime.api.post_json::<_, Value>(&path, &parse_body(&body)?).await?
        }
        Commands::Put { path, body } => {
            runtime.require_session().await?;
            runtime.api.put_json::<_, Value>(&path, &parse_body(&body)?).await?
        }
        Commands::Patch { path, body } => {
            runtime.require_session().await?;
            runtime.api.patch_json::<_, Value>(&path, &parse_body(&body)?).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn parse_body(raw: &str) -> anyhow::Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("--body is not valid JSON: {raw}"))
}

fn session_summary(session: &Session) -> Value {
    let user = session.user().map(|user| {
        json!({
            "id": user.id,
            "email": user.email,
            "role": user.role_kind().as_str(),
            "profile_complete": user.profile_complete,
        })
    });
    json!({
        "phase": session.phase().as_str(),
        "authenticated": session.is_authenticated(),
        "user": user,
    })
}
