use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use sessionguard::prelude::*;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Simulated server
// ---------------------------------------------------------------------------

/// A disconnect request delivered to a connection task.
struct Kick {
    reason: String,
    done: oneshot::Sender<()>,
}

/// How a simulated client reacts to being kicked.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Client {
    /// Leaves as soon as it is told to.
    Responsive,
    /// Never acknowledges the kick.
    Frozen,
}

/// A server whose connections are tasks, each with its own kick channel.
/// Evicting an identity means asking its connection task to leave and
/// waiting for it to confirm, on that task's own context.
#[derive(Clone, Default)]
struct SimulatedServer {
    clients: Arc<Mutex<HashMap<Identity, mpsc::Sender<Kick>>>>,
}

impl SimulatedServer {
    fn clients(&self) -> MutexGuard<'_, HashMap<Identity, mpsc::Sender<Kick>>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens a connection for `identity` after it was admitted.
    fn connect(&self, identity: Identity, name: &str, behavior: Client) {
        let (tx, mut rx) = mpsc::channel::<Kick>(1);
        self.clients().insert(identity, tx);

        let name = name.to_string();
        tokio::spawn(async move {
            while let Some(kick) = rx.recv().await {
                match behavior {
                    Client::Responsive => {
                        info!(player = %name, reason = %kick.reason, "client disconnected");
                        let _ = kick.done.send(());
                        return;
                    }
                    Client::Frozen => {
                        warn!(player = %name, "client ignoring disconnect");
                        // Hold the ack forever.
                        let _held = kick;
                        std::future::pending::<()>().await;
                    }
                }
            }
        });
    }

    /// Drops a connection without telling anyone, the way a crashed client
    /// or a lost termination event would.
    fn vanish(&self, identity: &Identity) {
        self.clients().remove(identity);
    }
}

impl SessionHost for SimulatedServer {
    async fn evict(&self, identity: Identity, message: &str) -> Result<(), HostError> {
        let Some(tx) = self.clients().get(&identity).cloned() else {
            return Err(HostError::NotConnected(identity));
        };

        let (done, confirmed) = oneshot::channel();
        let kick = Kick {
            reason: message.to_string(),
            done,
        };
        tx.send(kick)
            .await
            .map_err(|_| HostError::NotConnected(identity))?;
        confirmed
            .await
            .map_err(|_| HostError::Failed("connection task dropped the kick".into()))?;

        self.clients().remove(&identity);
        Ok(())
    }

    fn is_live(&self, identity: &Identity) -> Result<bool, HostError> {
        Ok(self.clients().contains_key(identity))
    }
}

// ---------------------------------------------------------------------------
// Scenario helpers
// ---------------------------------------------------------------------------

async fn login(
    guard: &SessionGuard<SimulatedServer>,
    server: &SimulatedServer,
    name: &str,
    identity: Identity,
    behavior: Client,
) -> AdmissionDecision {
    let decision = guard
        .on_connection_attempt(&ConnectionAttempt::new(identity, name))
        .await;
    match &decision {
        AdmissionDecision::Admit { path } => {
            info!(player = name, ?path, "login accepted");
            server.connect(identity, name, behavior);
        }
        AdmissionDecision::Deny { reason, message } => {
            warn!(player = name, %reason, message = %message, "login refused");
        }
    }
    decision
}

fn demo_config() -> GuardConfig {
    GuardConfig {
        admission_deadline_ms: 500,
        cleanup_period_secs: 3,
        logging: LoggingConfig {
            verbose: true,
            ..LoggingConfig::default()
        },
        ..GuardConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), SessionGuardError> {
    sessionguard::logging::init("info");

    let server = SimulatedServer::default();
    let guard = SessionGuard::builder(server.clone())
        .config(demo_config())
        .build()?;
    guard.start()?;

    let alice = Identity::random();
    let bob = Identity::random();
    let carol = Identity::random();

    info!("--- alice logs in");
    login(&guard, &server, "alice", alice, Client::Responsive).await;

    info!("--- alice logs in again from another device");
    login(&guard, &server, "alice", alice, Client::Responsive).await;

    info!("--- the kicked client reconnects straight away");
    login(&guard, &server, "alice", alice, Client::Responsive).await;

    info!("--- bob's first client hangs, so his second login is refused");
    login(&guard, &server, "bob", bob, Client::Frozen).await;
    login(&guard, &server, "bob", bob, Client::Responsive).await;

    info!("--- carol's connection vanishes without a termination event");
    login(&guard, &server, "carol", carol, Client::Responsive).await;
    server.vanish(&carol);
    tokio::time::sleep(Duration::from_secs(4)).await;

    for line in guard.execute(AdminCommand::Status).lines {
        info!("{line}");
    }
    match guard.status().to_json() {
        Ok(json) => info!("status json:\n{json}"),
        Err(error) => warn!(%error, "could not render status"),
    }
    for line in guard.execute_line("clearcache").lines {
        info!("{line}");
    }

    if let Some(metrics) = guard.shutdown().await {
        info!(
            sweeps = metrics.total_sweeps,
            reconciled = metrics.sessions_reconciled,
            "cleanup task stopped"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (SessionGuard<SimulatedServer>, SimulatedServer) {
        let server = SimulatedServer::default();
        let guard = SessionGuard::builder(server.clone())
            .config(demo_config())
            .build()
            .unwrap();
        (guard, server)
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_login_kicks_first_client() {
        let (guard, server) = setup();
        let id = Identity::from_u128(1);

        login(&guard, &server, "alice", id, Client::Responsive).await;
        let decision = login(&guard, &server, "alice", id, Client::Responsive).await;

        assert_eq!(decision.admit_path(), Some(AdmitPath::AfterEviction));
        assert!(server.is_live(&id).unwrap(), "new connection is live");
    }

    #[tokio::test(start_paused = true)]
    async fn test_frozen_client_login_times_out() {
        let (guard, server) = setup();
        let id = Identity::from_u128(2);

        login(&guard, &server, "bob", id, Client::Frozen).await;
        let started = tokio::time::Instant::now();
        let decision = login(&guard, &server, "bob", id, Client::Responsive).await;

        assert_eq!(decision.deny_reason(), Some(DenyReason::Timeout));
        assert_eq!(started.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_unknown_identity_is_not_connected() {
        let server = SimulatedServer::default();
        let id = Identity::from_u128(3);

        let err = server.evict(id, "bye").await.unwrap_err();

        assert_eq!(err, HostError::NotConnected(id));
    }
}
