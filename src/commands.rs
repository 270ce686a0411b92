//! CLI command definitions.

use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Local;
use clap::{Parser, Subcommand};
use labpresence_client::auth_session::forget_if_unauthorized;
use labpresence_client::log_warn;
use labpresence_client::{
    ApiClient, AttendanceActions, AuthSession, CheckInOutcome, CheckOutOutcome, ClientConfig,
    FileStore, HttpSnapshotFetcher, KeyValueStore, MemoryStore, Occupancy, OccupancyStore,
    OccupancySync, SnapshotFetcher,
};
use labpresence_shared::CheckInRequest;

/// Live lab occupancy from the attendance server
#[derive(Debug, Parser)]
#[command(name = "labpresence", version, about)]
pub struct Cli {
    /// REST base URL of the attendance server
    #[arg(long, global = true, env = "LABPRESENCE_API_BASE_URL")]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Follow the presence stream and print the room on every change
    Watch,
    /// Print who is in the lab right now
    Status,
    /// Sign in and remember the session
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long, env = "LABPRESENCE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Check in to the lab
    CheckIn {
        /// How the check-in was triggered
        #[arg(long, default_value = "manual")]
        method: String,
        /// SSID of the network you are on
        #[arg(long, default_value = "")]
        ssid: String,
        #[arg(long, requires = "longitude", allow_hyphen_values = true)]
        latitude: Option<f64>,
        #[arg(long, requires = "latitude", allow_hyphen_values = true)]
        longitude: Option<f64>,
    },
    /// Check out of the lab
    CheckOut,
}

impl Cli {
    pub async fn execute(&self) -> anyhow::Result<()> {
        let mut config = ClientConfig::from_env().context("reading configuration")?;
        if let Some(url) = &self.base_url {
            config = config.with_base_url(url)?;
        }
        let store = session_store(&config);
        let api = ApiClient::from_config(&config);

        match &self.command {
            Command::Login { username, password } => {
                let session = AuthSession::login(&api, store.as_ref(), username, password).await?;
                println!("Signed in as {}", session.user.label());
            }
            Command::Logout => {
                AuthSession::logout(store.as_ref(), None);
                println!("Signed out");
            }
            Command::Status => {
                let api = authorized(&api, store.as_ref())?;
                let snapshot =
                    forget_if_unauthorized(store.as_ref(), HttpSnapshotFetcher::new(api).fetch().await)?;
                let view = OccupancyStore::new();
                view.apply_snapshot(snapshot);
                print_occupancy(&view.current());
            }
            Command::Watch => {
                let api = authorized(&api, store.as_ref())?;
                watch(&config, api, store).await?
            }
            Command::CheckIn {
                method,
                ssid,
                latitude,
                longitude,
            } => {
                let mut request = CheckInRequest::manual(method.clone(), ssid.clone());
                if let (Some(lat), Some(lon)) = (latitude, longitude) {
                    request = request.with_location(*lat, *lon);
                }
                let actions = attendance(&api, store.as_ref()).await?;
                let outcome = forget_if_unauthorized(store.as_ref(), actions.check_in(&request).await)?;
                match outcome {
                    CheckInOutcome::CheckedIn => println!("Checked in"),
                    CheckInOutcome::AlreadyCheckedIn => println!("Already checked in"),
                }
            }
            Command::CheckOut => {
                let actions = attendance(&api, store.as_ref()).await?;
                let outcome = forget_if_unauthorized(store.as_ref(), actions.check_out().await)?;
                match outcome {
                    CheckOutOutcome::CheckedOut => println!("Checked out"),
                    CheckOutOutcome::NotCheckedIn => println!("Not checked in"),
                }
            }
        }
        Ok(())
    }
}

fn session_store(config: &ClientConfig) -> Arc<dyn KeyValueStore> {
    if let Some(dir) = &config.config_dir {
        return Arc::new(FileStore::new(dir.clone()));
    }
    match FileStore::default_location() {
        Some(store) => Arc::new(store),
        None => {
            log_warn!("No config directory available; the session will not be saved");
            Arc::new(MemoryStore::new())
        }
    }
}

fn authorized(api: &ApiClient, store: &dyn KeyValueStore) -> anyhow::Result<ApiClient> {
    match AuthSession::restore(store) {
        Some(session) => Ok(session.client(api)),
        None => bail!("not signed in; run `labpresence login` first"),
    }
}

/// Attendance actions against a store seeded from the current snapshot.
async fn attendance(api: &ApiClient, store: &dyn KeyValueStore) -> anyhow::Result<AttendanceActions> {
    let Some(session) = AuthSession::restore(store) else {
        bail!("not signed in; run `labpresence login` first");
    };
    let api = session.client(api);
    let view = Arc::new(OccupancyStore::new());
    match HttpSnapshotFetcher::new(api.clone()).fetch().await {
        Ok(snapshot) => view.apply_snapshot(snapshot),
        Err(e) => {
            forget_if_unauthorized::<()>(store, Err(e.clone()))?;
            log_warn!("Could not load occupancy: {}", e.message());
        }
    }
    Ok(AttendanceActions::new(Arc::new(api), view, session.user))
}

async fn watch(
    config: &ClientConfig,
    api: ApiClient,
    store: Arc<dyn KeyValueStore>,
) -> anyhow::Result<()> {
    let sync = OccupancySync::native(config, api, Arc::clone(&store));
    let mut view = sync.store().subscribe();
    let mut state = sync.watch_connection();
    sync.connect();

    loop {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                print_occupancy(&view.borrow_and_update());
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                // Disconnected may just be a pending retry; a cleared session means stop.
                let stopped = !state.borrow_and_update().is_active();
                if stopped && AuthSession::restore(store.as_ref()).is_none() {
                    bail!("session expired; run `labpresence login` again");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                sync.disconnect();
                break;
            }
        }
    }
    Ok(())
}

fn print_occupancy(view: &Occupancy) {
    let status = if view.is_connected { "live" } else { "offline" };
    println!("{} in the lab ({})", view.len(), status);
    for entry in &view.entries {
        let since = entry.check_in_at.with_timezone(&Local).format("%H:%M");
        let marker = if entry.provisional { " (pending)" } else { "" };
        println!("  {:<24} since {}{}", entry.display_name, since, marker);
    }
}
