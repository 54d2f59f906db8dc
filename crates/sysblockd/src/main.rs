//! sysblockd - The sysblock background service
//!
//! This is the main entry point for the sysblockd service.
//! It wires together all the components:
//! - Settings loading
//! - Store initialization
//! - Enforcer (penalties, freeze windows, tamper guard, watchdog)
//! - IPC-backed host adapter
//! - IPC server

mod host;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use sysblock_api::{
    ClientRole, Command, ErrorCode, ErrorInfo, Event, EventPayload, Response, ResponsePayload,
};
use sysblock_config::{load_settings, DaemonSettings};
use sysblock_core::{
    CoreEvent, Enforcer, EnforcerSettings, FreezeError, RepeatingTimer, SaveError, SelfIdentity,
    Tick,
};
use sysblock_ipc::{IpcServer, ServerMessage};
use sysblock_store::{
    AuditEvent, AuditEventType, Namespace, SqliteStore, Store, StoreChange, RAW_CONFIG_KEY,
};
use sysblock_util::{default_settings_path, store_path, ClientId, RateLimiter, SysblockError};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::host::IpcHost;

/// sysblockd - App usage enforcement service
#[derive(Parser, Debug)]
#[command(name = "sysblockd")]
#[command(about = "App usage enforcement service", long_about = None)]
struct Args {
    /// Settings file path (default: ~/.config/sysblock/sysblockd.toml)
    #[arg(short, long, default_value_os_t = default_settings_path())]
    config: PathBuf,

    /// Socket path override (or set SYSBLOCK_SOCKET env var)
    #[arg(short, long, env = "SYSBLOCK_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set SYSBLOCK_DATA_DIR env var)
    #[arg(short, long, env = "SYSBLOCK_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Main service state
struct Service {
    enforcer: Enforcer,
    host: Arc<IpcHost>,
    ipc: Arc<IpcServer>,
    store: Arc<dyn Store>,
    rate_limiter: RateLimiter,
    ticks: mpsc::UnboundedReceiver<Tick>,
}

impl Service {
    async fn new(args: &Args) -> Result<Self> {
        let mut settings: DaemonSettings = load_settings(&args.config)
            .with_context(|| format!("Failed to load settings from {:?}", args.config))?;
        if let Some(socket) = &args.socket {
            settings.socket_path = socket.clone();
        }
        if let Some(data_dir) = &args.data_dir {
            settings.data_dir = data_dir.clone();
        }

        info!(
            settings_path = %args.config.display(),
            tick_ms = settings.tick_interval.as_millis() as u64,
            "Settings loaded"
        );

        std::fs::create_dir_all(&settings.data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", settings.data_dir))?;

        let db_path = store_path(&settings.data_dir);
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        info!(db_path = %db_path.display(), "Store initialized");

        store.append_audit(AuditEvent::new(AuditEventType::ServiceStarted))?;

        let mut ipc = IpcServer::new(&settings.socket_path);
        ipc.start().await?;

        let host = Arc::new(IpcHost::new(ipc.event_sender(), ipc.subscribers()));
        let (timer, ticks) = RepeatingTimer::new(settings.tick_interval);

        let enforcer = Enforcer::new(
            store.clone(),
            host.clone(),
            Box::new(timer),
            EnforcerSettings {
                warning_threshold: settings.warning_threshold,
                identity: SelfIdentity::new(&settings.self_package, &settings.self_name),
            },
        );

        // 30 requests per second per client
        let rate_limiter = RateLimiter::new(30, Duration::from_secs(1));

        Ok(Self {
            enforcer,
            host,
            ipc: Arc::new(ipc),
            store,
            rate_limiter,
            ticks,
        })
    }

    async fn run(mut self) -> Result<()> {
        let ipc = self.ipc.clone();
        let mut ipc_messages = ipc
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;
        let mut store_changes = self.store.subscribe();

        let ipc_accept = ipc.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                tracing::error!(error = %e, "IPC server error");
            }
        });

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sighup = signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

        info!("Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, shutting down gracefully");
                    break;
                }

                Some(tick) = self.ticks.recv() => {
                    let now = sysblock_util::now();
                    self.enforcer.on_tick(tick, &now);
                }

                change = store_changes.recv() => {
                    match change {
                        Ok(change) => self.enforcer.on_store_change(&change),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Store notifications dropped, reloading");
                            self.enforcer.on_store_change(&StoreChange {
                                namespace: Namespace::Prefs,
                                key: RAW_CONFIG_KEY.to_string(),
                            });
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            warn!("Store notifications closed");
                        }
                    }
                }

                Some(msg) = ipc_messages.recv() => {
                    self.handle_ipc_message(msg).await;
                }
            }

            self.publish_core_events();
        }

        info!("Shutting down sysblockd");

        self.enforcer.shutdown();
        self.ipc.broadcast_event(Event::new(EventPayload::Shutdown));

        if let Err(e) = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStopped))
        {
            warn!(error = %e, "Failed to log service shutdown");
        }

        self.ipc.shutdown();
        info!("Shutdown complete");
        Ok(())
    }

    fn publish_core_events(&mut self) {
        for event in self.enforcer.drain_events() {
            match event {
                CoreEvent::ConfigReloaded {
                    rule_count,
                    master_switch,
                } => {
                    self.ipc.broadcast_event(Event::new(EventPayload::ConfigReloaded {
                        rule_count,
                        master_switch,
                    }));
                }
                other => debug!(event = ?other, "Core event"),
            }
        }
    }

    async fn handle_ipc_message(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::Request { client_id, request } => {
                let role = self
                    .ipc
                    .get_client_info(&client_id)
                    .await
                    .map(|info| info.role)
                    .unwrap_or(ClientRole::Observer);

                if is_throttled(&mut self.rate_limiter, &client_id, role) {
                    let response = Response::error(
                        request.request_id,
                        ErrorInfo::new(ErrorCode::RateLimited, "Too many requests"),
                    );
                    let _ = self.ipc.send_response(&client_id, response).await;
                    return;
                }

                let response = if request.command.is_mutating() && !role.can_modify() {
                    Response::error(
                        request.request_id,
                        ErrorInfo::new(
                            ErrorCode::PermissionDenied,
                            "Observers cannot change state",
                        ),
                    )
                } else {
                    self.handle_command(&client_id, request.request_id, request.command)
                };

                let _ = self.ipc.send_response(&client_id, response).await;
            }

            ServerMessage::ClientConnected { client_id, info } => {
                info!(
                    client_id = %client_id,
                    role = ?info.role,
                    uid = ?info.uid,
                    "Client connected"
                );

                let _ = self
                    .store
                    .append_audit(AuditEvent::new(AuditEventType::ClientConnected {
                        client_id: client_id.to_string(),
                        role: format!("{:?}", info.role),
                        uid: info.uid,
                    }));
            }

            ServerMessage::ClientDisconnected { client_id } => {
                debug!(client_id = %client_id, "Client disconnected");

                let _ = self
                    .store
                    .append_audit(AuditEvent::new(AuditEventType::ClientDisconnected {
                        client_id: client_id.to_string(),
                    }));

                self.rate_limiter.remove_client(&client_id);
            }
        }
    }

    fn handle_command(
        &mut self,
        client_id: &ClientId,
        request_id: u64,
        command: Command,
    ) -> Response {
        let now = sysblock_util::now();
        let ok = |payload| Response::success(request_id, payload);
        let fail = |info| Response::error(request_id, info);

        match command {
            Command::ForegroundChanged { event } => {
                let outcome = self.enforcer.handle_foreground(&event, &now);
                ok(ResponsePayload::Foreground { outcome })
            }

            Command::ReportUsage { package_id, minutes } => {
                self.host.report_usage(package_id, minutes);
                ok(ResponsePayload::UsageRecorded)
            }

            Command::StartSession {
                package_id,
                duration_secs,
            } => match self.enforcer.start_session(&package_id, duration_secs, &now) {
                Ok(grant) => ok(ResponsePayload::SessionStarted(grant)),
                Err(e) => fail(error_info(&e)),
            },

            Command::GetPenaltyStatus { package_id } => {
                match self.enforcer.penalty_status(&package_id, &now) {
                    Ok(status) => ok(ResponsePayload::PenaltyStatus(status)),
                    Err(e) => fail(error_info(&e)),
                }
            }

            Command::GetUsageInfo { package_id } => match self.enforcer.usage_info(&package_id) {
                Ok(usage) => ok(ResponsePayload::UsageInfo(usage)),
                Err(e) => fail(error_info(&e)),
            },

            Command::GetSessionOptions => ok(ResponsePayload::SessionOptions {
                seconds: self.enforcer.session_options(),
            }),

            Command::GetConfig => match self.enforcer.rule_text() {
                Ok(text) => ok(ResponsePayload::Config { text }),
                Err(e) => fail(error_info(&e)),
            },

            Command::ValidateConfig { text } => match self.enforcer.validate_config(&text) {
                Ok(summary) => ok(ResponsePayload::Validated(summary)),
                Err(e) => fail(
                    ErrorInfo::new(ErrorCode::ValidationFailed, e.message.clone()).at_line(e.line),
                ),
            },

            Command::SaveConfig { text } => match self.enforcer.save_config(&text, &now) {
                Ok(summary) => ok(ResponsePayload::Saved(summary)),
                Err(e) => fail(save_error_info(&e)),
            },

            Command::ListFreezeRules => match self.enforcer.freeze_rules() {
                Ok(rules) => ok(ResponsePayload::FreezeRules { rules }),
                Err(e) => fail(error_info(&e)),
            },

            Command::AddFreezeRule { rule } => match self.enforcer.add_freeze_rule(rule, &now) {
                Ok(added) => ok(ResponsePayload::FreezeRuleAdded(added)),
                Err(e) => fail(freeze_error_info(&e)),
            },

            Command::ToggleFreezeRule { id } => match self.enforcer.toggle_freeze_rule(id, &now) {
                Ok(_) => match self.enforcer.freeze_rules() {
                    Ok(rules) => ok(ResponsePayload::FreezeRules { rules }),
                    Err(e) => fail(error_info(&e)),
                },
                Err(e) => fail(freeze_error_info(&e)),
            },

            Command::DeleteFreezeRule { id } => match self.enforcer.delete_freeze_rule(id, &now) {
                Ok(()) => match self.enforcer.freeze_rules() {
                    Ok(rules) => ok(ResponsePayload::FreezeRules { rules }),
                    Err(e) => fail(error_info(&e)),
                },
                Err(e) => fail(freeze_error_info(&e)),
            },

            Command::GetFrozenRanges => match self.enforcer.frozen_ranges(&now) {
                Ok(ranges) => ok(ResponsePayload::FrozenRanges { ranges }),
                Err(e) => fail(error_info(&e)),
            },

            Command::SubscribeEvents => ok(ResponsePayload::Subscribed {
                client_id: *client_id,
            }),

            Command::UnsubscribeEvents => ok(ResponsePayload::Unsubscribed),

            Command::GetHealth => ok(ResponsePayload::Health(self.enforcer.health())),

            Command::Ping => ok(ResponsePayload::Pong),
        }
    }
}

/// Whether a request is over its client's rate limit. The platform host
/// streams foreground events in bursts and is never throttled.
fn is_throttled(limiter: &mut RateLimiter, client_id: &ClientId, role: ClientRole) -> bool {
    !role.can_report() && !limiter.check(client_id)
}

fn error_info(e: &SysblockError) -> ErrorInfo {
    let code = match e {
        SysblockError::NoRule(_) => ErrorCode::NoRule,
        SysblockError::InvalidDuration(_) => ErrorCode::InvalidDuration,
        SysblockError::ConfigError(_) | SysblockError::ValidationError { .. } => {
            ErrorCode::ValidationFailed
        }
        SysblockError::FrozenLine { .. } => ErrorCode::FrozenLine,
        SysblockError::FreezeError(_) => ErrorCode::FreezeRejected,
        SysblockError::StoreError(_) => ErrorCode::StoreError,
        SysblockError::HostError(_) => ErrorCode::HostError,
        SysblockError::RateLimited => ErrorCode::RateLimited,
        SysblockError::IpcError(_) | SysblockError::Internal(_) => ErrorCode::InternalError,
    };
    let info = ErrorInfo::new(code, e.to_string());
    match e {
        SysblockError::ValidationError { line, .. } | SysblockError::FrozenLine { line } => {
            info.at_line(*line)
        }
        _ => info,
    }
}

fn save_error_info(e: &SaveError) -> ErrorInfo {
    match e {
        SaveError::FrozenLine { line } => {
            ErrorInfo::new(ErrorCode::FrozenLine, e.to_string()).at_line(*line)
        }
        SaveError::Invalid(v) => {
            ErrorInfo::new(ErrorCode::ValidationFailed, v.message.clone()).at_line(v.line)
        }
        SaveError::Store(_) => ErrorInfo::new(ErrorCode::StoreError, e.to_string()),
    }
}

fn freeze_error_info(e: &FreezeError) -> ErrorInfo {
    match e {
        FreezeError::Store(_) => ErrorInfo::new(ErrorCode::StoreError, e.to_string()),
        _ => ErrorInfo::new(ErrorCode::FreezeRejected, e.to_string()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "sysblockd starting");

    let service = Service::new(&args).await?;
    service.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysblock_config::ValidationError;

    #[test]
    fn args_parse_overrides() {
        let args = Args::parse_from([
            "sysblockd",
            "--socket",
            "/tmp/s.sock",
            "--data-dir",
            "/tmp/data",
            "-l",
            "debug",
        ]);
        assert_eq!(args.socket, Some(PathBuf::from("/tmp/s.sock")));
        assert_eq!(args.data_dir, Some(PathBuf::from("/tmp/data")));
        assert_eq!(args.log_level, "debug");
    }

    #[test]
    fn host_bursts_are_not_throttled() {
        use chrono::{Local, TimeZone};
        use sysblock_api::{ForegroundEvent, ForegroundOutcome};
        use sysblock_core::ManualTicks;
        use sysblock_host_api::MockHost;

        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        store
            .set(
                Namespace::Prefs,
                RAW_CONFIG_KEY,
                "PREVENT_UNINSTALL\nSET | APPLOCK | com.example.app | 30m",
            )
            .unwrap();
        let mut enforcer = Enforcer::new(
            store,
            Arc::new(MockHost::new()),
            Box::new(ManualTicks::new()),
            EnforcerSettings::default(),
        );
        let mut limiter = RateLimiter::new(30, Duration::from_secs(1));
        let now = Local.with_ymd_and_hms(2025, 5, 20, 9, 0, 0).unwrap();
        let event =
            ForegroundEvent::content_changed("com.android.settings").with_text("Usage access");

        let host = ClientId::new();
        let mut blocked = 0;
        for _ in 0..40 {
            if is_throttled(&mut limiter, &host, ClientRole::Host) {
                continue;
            }
            if enforcer.handle_foreground(&event, &now) == ForegroundOutcome::TamperBlocked {
                blocked += 1;
            }
        }
        assert_eq!(blocked, 40);

        let observer = ClientId::new();
        let throttled = (0..40)
            .filter(|_| is_throttled(&mut limiter, &observer, ClientRole::Observer))
            .count();
        assert_eq!(throttled, 10);
    }

    #[test]
    fn error_codes_carry_lines() {
        let info = error_info(&SysblockError::FrozenLine { line: 4 });
        assert_eq!(info.code, ErrorCode::FrozenLine);
        assert_eq!(info.line, Some(4));

        let info = save_error_info(&SaveError::Invalid(ValidationError {
            line: 2,
            message: "Invalid Format.".into(),
        }));
        assert_eq!(info.code, ErrorCode::ValidationFailed);
        assert_eq!(info.message, "Invalid Format.");
        assert_eq!(info.line, Some(2));

        let info = freeze_error_info(&FreezeError::Conflict(7));
        assert_eq!(info.code, ErrorCode::FreezeRejected);
    }
}
