use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{error, warn};

use arbwatch_core::auth::{SessionEvent, SessionEvents};
use arbwatch_core::retry::retry_with;
use arbwatch_core::{
    ApiClient, ApiError, Config, CredentialStore, FileCredentialStore, KeyringCredentialStore,
};

/// Selects where the access token is kept
const ENV_CREDENTIAL_STORE: &str = "ARBWATCH_CREDENTIAL_STORE";

pub struct App {
    api: ApiClient,
    session_file: Option<Arc<FileCredentialStore>>,
}

impl App {
    pub fn new(config: &Config) -> Result<Self> {
        let client_config = config.client_config()?;

        let backend = std::env::var(ENV_CREDENTIAL_STORE).unwrap_or_else(|_| "file".to_string());
        let (credentials, session_file) = match backend.as_str() {
            "keyring" => {
                let store: Arc<dyn CredentialStore> = Arc::new(KeyringCredentialStore::new()?);
                (store, None)
            }
            "file" => {
                let store = Arc::new(FileCredentialStore::new(config.cache_dir()?));
                let credentials: Arc<dyn CredentialStore> = store.clone();
                (credentials, Some(store))
            }
            other => return Err(anyhow!("Unknown {}: {}", ENV_CREDENTIAL_STORE, other)),
        };

        let api = ApiClient::new(client_config, credentials)?;
        Ok(Self { api, session_file })
    }

    pub async fn login(&self, config: &mut Config, email: Option<String>) -> Result<()> {
        let email = match email.or_else(|| config.last_email.clone()) {
            Some(email) => email,
            None => prompt("Email: ")?,
        };
        let password = rpassword::prompt_password("Password: ")?;

        println!("\nAuthenticating...");
        match self.api.login(&email, &password).await {
            Ok(response) => {
                config.last_email = Some(email);
                if let Err(e) = config.save() {
                    warn!(error = %e, "Failed to save config");
                }
                let name = response
                    .data()
                    .map(|user| user.display_name().to_string())
                    .unwrap_or_else(|| "user".to_string());
                println!("Login successful! Welcome, {}.", name);
                Ok(())
            }
            Err(ApiError::Unauthorized) => {
                println!("Invalid email or password");
                Ok(())
            }
            Err(e) => Err(report(e)),
        }
    }

    pub async fn register(&self, config: &mut Config, name: &str, email: &str) -> Result<()> {
        let password = rpassword::prompt_password("Password: ")?;
        let confirm = rpassword::prompt_password("Confirm password: ")?;
        if password != confirm {
            println!("Passwords do not match");
            return Ok(());
        }

        let response = self
            .api
            .register(name, email, &password)
            .await
            .map_err(report)?;

        config.last_email = Some(email.to_string());
        if let Err(e) = config.save() {
            warn!(error = %e, "Failed to save config");
        }

        println!(
            "{}",
            response
                .message
                .unwrap_or_else(|| "Registration successful".to_string())
        );
        if response.access_token.is_none() {
            println!("Check your email to verify your account, then run `arbwatch login`.");
        }
        Ok(())
    }

    pub async fn me(&self) -> Result<()> {
        if !self.api.is_authenticated() {
            println!("Not signed in. Run `arbwatch login` first.");
            return Ok(());
        }

        let mut events = self.api.subscribe();
        let result = retry_with(self.api.retry_policy(), || self.api.get_current_user()).await;
        report_session_events(&mut events);

        match result {
            Ok(response) => {
                let user = response
                    .into_data()
                    .context("Server returned no user data")?;
                println!("{}", serde_json::to_string_pretty(&user)?);
                Ok(())
            }
            Err(e) if e.is_auth_failure() => {
                println!("{}", e.user_message());
                Ok(())
            }
            Err(e) => Err(report(e)),
        }
    }

    pub async fn logout(&self) -> Result<()> {
        if let Err(e) = self.api.logout().await {
            // Local session is gone regardless
            warn!(error = %e, "Server did not acknowledge logout");
        }
        println!("Signed out.");
        Ok(())
    }

    pub fn status(&self) -> Result<()> {
        println!("API:      {}", self.api.config().base_url);
        println!("Timeout:  {}s", self.api.config().request_timeout.as_secs());

        match &self.session_file {
            Some(store) => match store.load()? {
                Some(session) => println!(
                    "Session:  signed in ({}m old)",
                    session.age().num_minutes().max(0)
                ),
                None => println!("Session:  signed out"),
            },
            None if self.api.is_authenticated() => println!("Session:  signed in (keychain)"),
            None => println!("Session:  signed out"),
        }
        Ok(())
    }
}

/// Print any session notifications raised while a command ran.
fn report_session_events(events: &mut tokio::sync::broadcast::Receiver<SessionEvent>) {
    loop {
        match events.try_recv() {
            Ok(SessionEvent::Expired { reason }) => {
                warn!(reason = %reason, "Session expired");
                println!("Your session has expired. Run `arbwatch login` to sign in again.");
            }
            Ok(_) => {}
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
}

/// Log the full error and turn it into the user-facing message.
fn report(err: ApiError) -> anyhow::Error {
    error!(error = %err, "Request failed");
    anyhow!(err.user_message())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
