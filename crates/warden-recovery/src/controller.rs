//! The recovery controller: observe, decide, restart, verify, audit.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use warden_core::{LogSourceKind, WardenConfig};
use warden_health::{HealthProbe, HealthTracker, HttpProbe, port_open};
use warden_logscan::{FileSource, JournalSource, LogErrorScanner, LogSource};
use warden_procs::{ProcessMatcher, ResourceInspector};
use warden_state::{
    AuditStore, DecisionOutcome, EpochMillis, RecoveryDecision, Signal, describe_signals,
    epoch_millis,
};

use crate::context::{ControllerState, MonitorContext};
use crate::error::{RecoveryError, RecoveryResult};
use crate::policy::{Observation, Thresholds};
use crate::supervisor::{ServiceControl, SystemdSupervisor};

/// Timing and behavior knobs resolved from configuration.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub cooldown: Duration,
    /// Health polls after a restart. Zero skips verification.
    pub verify_attempts: u32,
    pub verify_delay: Duration,
    pub max_cycle: Duration,
    /// Zero means no limit.
    pub max_consecutive_failures: u32,
    /// Look-back of the first log scan.
    pub log_window: Duration,
    pub check_active: bool,
    pub port: Option<String>,
    pub port_timeout: Duration,
    pub unhealthy_threshold: u32,
    pub history: usize,
}

impl ControllerSettings {
    pub fn from_config(config: &WardenConfig) -> RecoveryResult<Self> {
        Ok(Self {
            cooldown: config.recovery.cooldown()?,
            verify_attempts: config.recovery.verify_attempts,
            verify_delay: config.recovery.verify_delay()?,
            max_cycle: config.recovery.max_cycle()?,
            max_consecutive_failures: config.recovery.max_consecutive_failures,
            log_window: config.logs.window()?,
            check_active: config.service.check_active,
            port: config.health.port.clone(),
            port_timeout: config.health.timeout()?,
            unhealthy_threshold: config.health.unhealthy_threshold,
            history: config.health.history,
        })
    }
}

/// The collaborators a controller drives.
pub struct ControllerParts {
    pub probe: Box<dyn HealthProbe>,
    pub logs: Box<dyn LogSource>,
    pub scanner: LogErrorScanner,
    pub inspector: ResourceInspector,
    pub matcher: ProcessMatcher,
    pub supervisor: Box<dyn ServiceControl>,
}

/// Evaluates the service once per tick and restarts it on breach.
///
/// The controller itself is immutable; everything that changes between
/// cycles lives in the [`MonitorContext`] passed to each call.
pub struct RecoveryController {
    parts: ControllerParts,
    thresholds: Thresholds,
    settings: ControllerSettings,
}

impl RecoveryController {
    pub fn new(parts: ControllerParts, thresholds: Thresholds, settings: ControllerSettings) -> Self {
        Self {
            parts,
            thresholds,
            settings,
        }
    }

    /// Wire the production collaborators from configuration.
    ///
    /// Fails with [`RecoveryError::Health`] when the health URL cannot be
    /// probed at all.
    pub fn from_config(config: &WardenConfig) -> RecoveryResult<Self> {
        let probe = HttpProbe::new(&config.health.url, config.health.timeout()?)?;
        let logs: Box<dyn LogSource> = match config.logs.source {
            LogSourceKind::Journal => Box::new(JournalSource::new(
                config.logs.journalctl.clone(),
                config.log_unit(),
            )),
            LogSourceKind::File => {
                let path = config.logs.path.clone().ok_or_else(|| {
                    warden_core::ConfigError::Invalid(
                        "logs.path is required for the file source".to_string(),
                    )
                })?;
                Box::new(FileSource::new(path))
            }
        };
        let parts = ControllerParts {
            probe: Box::new(probe),
            logs,
            scanner: LogErrorScanner::from_config(&config.logs.categories)?,
            inspector: ResourceInspector::new(config.service.proc_root.clone()),
            matcher: ProcessMatcher::new(config.service.process_match.iter().cloned()),
            supervisor: Box::new(SystemdSupervisor::from_config(config)?),
        };
        Ok(Self::new(
            parts,
            Thresholds::from_config(config),
            ControllerSettings::from_config(config)?,
        ))
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// A context bound to `audit`, restoring any persisted restart marker.
    pub fn new_context(&self, audit: AuditStore) -> RecoveryResult<MonitorContext> {
        let tracker = HealthTracker::new(self.settings.unhealthy_threshold, self.settings.history);
        Ok(MonitorContext::new(audit, tracker)?)
    }

    /// Poll every `interval` until `shutdown` flips to true.
    ///
    /// Cycles never overlap; a slow cycle delays the next tick instead of
    /// queueing a burst.
    pub async fn run(
        &self,
        ctx: &mut MonitorContext,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = interval.as_secs(),
            service = %self.parts.supervisor.describe(),
            endpoint = %self.parts.probe.endpoint(),
            "recovery controller started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle(ctx).await {
                        error!(error = %e, "monitoring cycle failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("recovery controller stopped");
    }

    /// One cycle at the current wall-clock time, bounded by `max_cycle`.
    pub async fn run_cycle(&self, ctx: &mut MonitorContext) -> RecoveryResult<RecoveryDecision> {
        let now_ms = epoch_millis();
        let outcome = tokio::time::timeout(self.settings.max_cycle, self.tick_at(ctx, now_ms)).await;
        match outcome {
            Ok(result) => result,
            Err(_) => self.abandon_cycle(ctx, now_ms),
        }
    }

    /// Evaluate once as if the clock read `now_ms`.
    pub async fn tick_at(
        &self,
        ctx: &mut MonitorContext,
        now_ms: EpochMillis,
    ) -> RecoveryResult<RecoveryDecision> {
        ctx.pending_signals.clear();
        let cooldown_ms = self.settings.cooldown.as_millis() as u64;

        if ctx.state() == ControllerState::CoolDown
            && ctx.cooldown_remaining_ms(now_ms, cooldown_ms) == 0
        {
            info!("cool-down elapsed");
            ctx.transition(ControllerState::Idle, now_ms);
        }
        let cooling = ctx.state() == ControllerState::CoolDown;
        if !cooling {
            ctx.transition(ControllerState::Evaluating, now_ms);
        }

        let cursor_before = ctx.log_cursor_us;
        let observation = self.observe(ctx, now_ms).await;
        if ctx.log_cursor_us != cursor_before {
            ctx.persist_marker()?;
        }
        let signals = self.thresholds.breaches(&observation);
        ctx.pending_signals = signals.clone();

        let decision = if cooling {
            let remaining = ctx.cooldown_remaining_ms(now_ms, cooldown_ms);
            if signals.is_empty() {
                self.reset_failures(ctx)?;
            }
            RecoveryDecision::new(now_ms, DecisionOutcome::NoAction, signals).with_note(format!(
                "cool-down active, {}s remaining",
                remaining.div_ceil(1000)
            ))
        } else if signals.is_empty() {
            self.reset_failures(ctx)?;
            ctx.transition(ControllerState::Idle, now_ms);
            RecoveryDecision::new(now_ms, DecisionOutcome::NoAction, signals)
        } else if self.attempts_exhausted(ctx) {
            ctx.transition(ControllerState::Idle, now_ms);
            RecoveryDecision::new(now_ms, DecisionOutcome::NoAction, signals)
                .with_note("recovery attempts exhausted")
        } else {
            self.restart(ctx, now_ms, signals).await?
        };

        self.record(ctx, &decision)?;
        ctx.pending_signals.clear();
        Ok(decision)
    }

    /// Gather every signal. Individual observation failures are logged and
    /// contribute nothing.
    async fn observe(&self, ctx: &mut MonitorContext, now_ms: EpochMillis) -> Observation {
        let since_us = ctx.log_cursor_us.unwrap_or_else(|| {
            (now_ms * 1000).saturating_sub(self.settings.log_window.as_micros() as u64)
        });

        let inspector = self.parts.inspector.clone();
        let matcher = self.parts.matcher.clone();
        let processes = tokio::task::spawn_blocking(move || inspector.inspect(&matcher));

        let service_active = async {
            if !self.settings.check_active {
                return None;
            }
            match self.parts.supervisor.is_active().await {
                Ok(active) => Some(active),
                Err(e) => {
                    warn!(error = %e, "could not query service state");
                    None
                }
            }
        };
        let port = async {
            match &self.settings.port {
                Some(address) => Some(port_open(address, self.settings.port_timeout).await),
                None => None,
            }
        };

        let (sample, scan, processes, service_active, port_reachable) = tokio::join!(
            self.parts.probe.probe(),
            self.parts.scanner.scan(&*self.parts.logs, since_us),
            processes,
            service_active,
            port,
        );

        debug!(
            status = ?sample.status,
            code = ?sample.code,
            latency_ms = sample.latency_ms,
            "health sample"
        );
        let health = ctx.tracker.record(sample);

        if scan.available {
            ctx.log_cursor_us = Some(scan.cursor_us);
        }

        let processes = match processes {
            Ok(Ok(snapshots)) => {
                for s in &snapshots {
                    debug!(pid = s.pid, resident_mb = s.resident_mb, open_fds = ?s.open_fds, "worker");
                }
                Some(snapshots)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "could not inspect processes");
                None
            }
            Err(e) => {
                warn!(error = %e, "process inspection task failed");
                None
            }
        };

        Observation {
            health,
            scan: Some(scan),
            processes,
            service_active,
            port_open: port_reachable,
        }
    }

    /// Consecutive restart failures have reached the configured limit.
    pub fn attempts_exhausted(&self, ctx: &MonitorContext) -> bool {
        let max = self.settings.max_consecutive_failures;
        max > 0 && ctx.consecutive_failures >= max
    }

    /// Whether `decision` leaves the service in trouble: the cycle failed, or
    /// it breached while restarts are exhausted and none was attempted.
    pub fn is_unresolved(&self, ctx: &MonitorContext, decision: &RecoveryDecision) -> bool {
        decision.outcome.is_failure()
            || (decision.outcome == DecisionOutcome::NoAction
                && !decision.signals.is_empty()
                && self.attempts_exhausted(ctx))
    }

    fn reset_failures(&self, ctx: &mut MonitorContext) -> RecoveryResult<()> {
        if ctx.consecutive_failures > 0 {
            info!(previous = ctx.consecutive_failures, "service healthy, failure count reset");
            ctx.consecutive_failures = 0;
            ctx.persist_marker()?;
        }
        Ok(())
    }

    /// Issue the restart and wait for the service to come back.
    ///
    /// The marker is persisted before the restart is issued so an abandoned
    /// cycle still starts the cool-down.
    async fn restart(
        &self,
        ctx: &mut MonitorContext,
        now_ms: EpochMillis,
        signals: Vec<Signal>,
    ) -> RecoveryResult<RecoveryDecision> {
        ctx.transition(ControllerState::RestartInFlight, now_ms);
        warn!(
            signals = %describe_signals(&signals),
            service = %self.parts.supervisor.describe(),
            "threshold breached, restarting service"
        );
        ctx.last_restart_ms = Some(now_ms);
        ctx.persist_marker()?;

        let failure = match self.parts.supervisor.restart().await {
            Ok(()) if self.verify().await => None,
            Ok(()) => Some(format!(
                "service not healthy after {} checks",
                self.settings.verify_attempts
            )),
            Err(e) => Some(e.to_string()),
        };

        ctx.tracker.reset_streak();
        let decision = match failure {
            None => {
                ctx.consecutive_failures = 0;
                RecoveryDecision::new(now_ms, DecisionOutcome::RestartTriggered, signals)
            }
            Some(reason) => {
                ctx.consecutive_failures += 1;
                RecoveryDecision::new(now_ms, DecisionOutcome::RestartFailed, signals)
                    .with_note(reason)
            }
        };
        ctx.transition(ControllerState::CoolDown, now_ms);
        ctx.persist_marker()?;
        Ok(decision)
    }

    /// Poll until the probe is up (and the unit active, when checked).
    async fn verify(&self) -> bool {
        let attempts = self.settings.verify_attempts;
        if attempts == 0 {
            return true;
        }
        for attempt in 1..=attempts {
            tokio::time::sleep(self.settings.verify_delay).await;
            let sample = self.parts.probe.probe().await;
            if !sample.is_up() {
                debug!(attempt, status = ?sample.status, "service not healthy yet");
                continue;
            }
            if self.settings.check_active {
                if let Ok(false) = self.parts.supervisor.is_active().await {
                    debug!(attempt, "unit not active yet");
                    continue;
                }
            }
            info!(attempt, "service healthy after restart");
            return true;
        }
        false
    }

    /// Record a cycle that ran past `max_cycle`.
    fn abandon_cycle(
        &self,
        ctx: &mut MonitorContext,
        started_ms: EpochMillis,
    ) -> RecoveryResult<RecoveryDecision> {
        let signals = std::mem::take(&mut ctx.pending_signals);
        match ctx.state() {
            ControllerState::RestartInFlight => {
                ctx.consecutive_failures += 1;
                ctx.transition(ControllerState::CoolDown, started_ms);
                ctx.persist_marker()?;
            }
            ControllerState::Evaluating => ctx.transition(ControllerState::Idle, started_ms),
            ControllerState::Idle | ControllerState::CoolDown => {}
        }
        let decision = RecoveryDecision::new(started_ms, DecisionOutcome::CycleTimeout, signals)
            .with_note(format!(
                "cycle exceeded {}ms",
                self.settings.max_cycle.as_millis()
            ));
        self.record(ctx, &decision)?;
        Ok(decision)
    }

    fn record(&self, ctx: &MonitorContext, decision: &RecoveryDecision) -> RecoveryResult<()> {
        ctx.audit()
            .append_decision(decision)
            .map_err(RecoveryError::State)?;

        let signals = describe_signals(&decision.signals);
        let note = decision.note.as_deref().unwrap_or("");
        match decision.outcome {
            DecisionOutcome::NoAction => {
                info!(outcome = decision.outcome.as_str(), %signals, note, "cycle complete")
            }
            DecisionOutcome::RestartTriggered => {
                warn!(outcome = decision.outcome.as_str(), %signals, "service restarted")
            }
            DecisionOutcome::RestartFailed | DecisionOutcome::CycleTimeout => error!(
                outcome = decision.outcome.as_str(),
                %signals,
                note,
                consecutive_failures = ctx.consecutive_failures,
                "recovery failed"
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use warden_logscan::{CategoryMatcher, LogEntry, LogError, LogResult};
    use warden_state::{HealthSample, HealthStatus};

    const NOW: EpochMillis = 1_700_000_000_000;
    const COOLDOWN: Duration = Duration::from_secs(300);

    // ── Fakes ─────────────────────────────────────────────────────

    #[derive(Clone, Default)]
    struct ScriptedProbe {
        script: Arc<Mutex<VecDeque<HealthStatus>>>,
        fallback: Arc<Mutex<Option<HealthStatus>>>,
        probes: Arc<AtomicU32>,
    }

    impl ScriptedProbe {
        fn always(status: HealthStatus) -> Self {
            let probe = Self::default();
            probe.set_fallback(status);
            probe
        }

        fn then(&self, statuses: &[HealthStatus]) {
            self.script.lock().unwrap().extend(statuses.iter().copied());
        }

        fn set_fallback(&self, status: HealthStatus) {
            *self.fallback.lock().unwrap() = Some(status);
        }
    }

    #[async_trait]
    impl HealthProbe for ScriptedProbe {
        async fn probe(&self) -> HealthSample {
            self.probes.fetch_add(1, Ordering::SeqCst);
            let status = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .or(*self.fallback.lock().unwrap())
                .unwrap_or(HealthStatus::Up);
            HealthSample {
                timestamp_ms: NOW,
                endpoint: "http://127.0.0.1:5001/health".to_string(),
                status,
                code: match status {
                    HealthStatus::Up => Some(200),
                    HealthStatus::Down => Some(502),
                    HealthStatus::Timeout => None,
                },
                latency_ms: 1,
            }
        }

        fn endpoint(&self) -> &str {
            "http://127.0.0.1:5001/health"
        }
    }

    #[derive(Clone, Default)]
    struct SharedLog {
        entries: Arc<Mutex<Vec<LogEntry>>>,
        broken: Arc<AtomicBool>,
    }

    impl SharedLog {
        fn push(&self, timestamp_us: u64, message: &str) {
            self.entries
                .lock()
                .unwrap()
                .push(LogEntry::new(timestamp_us, message));
        }
    }

    #[async_trait]
    impl LogSource for SharedLog {
        async fn entries_since(&self, since_us: u64) -> LogResult<Vec<LogEntry>> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(LogError::Io {
                    path: "/var/log/currency-exchange.log".to_string(),
                    source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
                });
            }
            Ok(self
                .entries
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.timestamp_us > since_us)
                .cloned()
                .collect())
        }

        fn describe(&self) -> String {
            "shared".to_string()
        }
    }

    #[derive(Clone, Default)]
    struct FakeSupervisor {
        restarts: Arc<AtomicU32>,
        fail: Arc<AtomicBool>,
        inactive: Arc<AtomicBool>,
        restart_delay: Arc<Mutex<Duration>>,
    }

    #[async_trait]
    impl ServiceControl for FakeSupervisor {
        async fn is_active(&self) -> RecoveryResult<bool> {
            Ok(!self.inactive.load(Ordering::SeqCst))
        }

        async fn restart(&self) -> RecoveryResult<()> {
            self.restarts.fetch_add(1, Ordering::SeqCst);
            let delay = *self.restart_delay.lock().unwrap();
            tokio::time::sleep(delay).await;
            if self.fail.load(Ordering::SeqCst) {
                return Err(RecoveryError::Command {
                    command: "systemctl restart currency-exchange".to_string(),
                    detail: "Job for currency-exchange.service failed".to_string(),
                });
            }
            self.inactive.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn describe(&self) -> String {
            "fake unit".to_string()
        }
    }

    struct Harness {
        controller: RecoveryController,
        ctx: MonitorContext,
        probe: ScriptedProbe,
        logs: SharedLog,
        supervisor: FakeSupervisor,
        _proc: tempfile::TempDir,
    }

    impl Harness {
        fn restarts(&self) -> u32 {
            self.supervisor.restarts.load(Ordering::SeqCst)
        }

        async fn tick(&mut self, at_ms: EpochMillis) -> RecoveryDecision {
            self.controller.tick_at(&mut self.ctx, at_ms).await.unwrap()
        }
    }

    fn fake_worker(root: &Path, pid: u32, rss_kb: u64, fds: usize) {
        let dir = root.join(pid.to_string());
        fs::create_dir_all(dir.join("fd")).unwrap();
        fs::write(dir.join("cmdline"), b"python3\0gunicorn\0currency-exchange:app\0").unwrap();
        fs::write(dir.join("status"), format!("Name:\tgunicorn\nVmRSS:\t{rss_kb} kB\n")).unwrap();
        for fd in 0..fds {
            fs::write(dir.join("fd").join(fd.to_string()), "").unwrap();
        }
    }

    fn settings() -> ControllerSettings {
        ControllerSettings {
            cooldown: COOLDOWN,
            verify_attempts: 3,
            verify_delay: Duration::ZERO,
            max_cycle: Duration::from_secs(10),
            max_consecutive_failures: 3,
            log_window: Duration::from_secs(300),
            check_active: true,
            port: None,
            port_timeout: Duration::from_millis(200),
            unhealthy_threshold: 1,
            history: 10,
        }
    }

    fn thresholds() -> Thresholds {
        Thresholds {
            max_errors: 3,
            ..Thresholds::default()
        }
    }

    fn harness_with(settings: ControllerSettings, audit: AuditStore) -> Harness {
        let proc = tempfile::tempdir().unwrap();
        fake_worker(proc.path(), 4242, 100 * 1024, 8);

        let probe = ScriptedProbe::always(HealthStatus::Up);
        let logs = SharedLog::default();
        let supervisor = FakeSupervisor::default();
        let parts = ControllerParts {
            probe: Box::new(probe.clone()),
            logs: Box::new(logs.clone()),
            scanner: LogErrorScanner::new(vec![
                CategoryMatcher::substring("bad-descriptor", "Bad file descriptor"),
                CategoryMatcher::substring("broken-pipe", "Broken pipe"),
            ]),
            inspector: ResourceInspector::new(proc.path()).with_excluded_pid(None),
            matcher: ProcessMatcher::new(["gunicorn", "currency-exchange"]),
            supervisor: Box::new(supervisor.clone()),
        };
        let controller = RecoveryController::new(parts, thresholds(), settings);
        let ctx = controller.new_context(audit).unwrap();
        Harness {
            controller,
            ctx,
            probe,
            logs,
            supervisor,
            _proc: proc,
        }
    }

    fn harness() -> Harness {
        harness_with(settings(), AuditStore::open_in_memory().unwrap())
    }

    fn us(ms: EpochMillis) -> u64 {
        ms * 1000
    }

    // ── Tests ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn healthy_service_stays_idle() {
        let mut h = harness();
        h.logs.push(us(NOW) - 10, "Bad file descriptor");

        let decision = h.tick(NOW).await;
        assert_eq!(decision.outcome, DecisionOutcome::NoAction);
        assert!(decision.signals.is_empty());
        assert_eq!(h.ctx.state(), ControllerState::Idle);
        assert_eq!(h.restarts(), 0);
        assert_eq!(h.ctx.audit().decision_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn error_burst_over_limit_restarts_and_names_category() {
        let mut h = harness();
        for i in 0..4 {
            h.logs.push(us(NOW) - 1000 + i, "OSError: [Errno 9] Bad file descriptor");
        }

        let decision = h.tick(NOW).await;
        assert_eq!(decision.outcome, DecisionOutcome::RestartTriggered);
        assert_eq!(
            decision.signals,
            vec![Signal::ErrorCount {
                category: "bad-descriptor".to_string(),
                count: 4,
                limit: 3,
            }]
        );
        let path: Vec<_> = h.ctx.transitions().map(|t| (t.from, t.to)).collect();
        assert_eq!(
            path,
            vec![
                (ControllerState::Idle, ControllerState::Evaluating),
                (ControllerState::Evaluating, ControllerState::RestartInFlight),
                (ControllerState::RestartInFlight, ControllerState::CoolDown),
            ]
        );
        assert_eq!(h.restarts(), 1);
        assert_eq!(h.ctx.last_restart_ms, Some(NOW));
    }

    #[tokio::test]
    async fn log_entries_are_counted_once_across_cycles() {
        let mut h = harness();
        for i in 0..3 {
            h.logs.push(us(NOW) - 1000 + i, "Broken pipe");
        }
        assert!(h.tick(NOW).await.signals.is_empty());

        // Same three entries plus one new: only the new one counts.
        h.logs.push(us(NOW) + 5_000_000, "Broken pipe");
        let decision = h.tick(NOW + 30_000).await;
        assert!(decision.signals.is_empty());
        assert_eq!(h.restarts(), 0);
        assert_eq!(h.ctx.log_cursor_us, Some(us(NOW) + 5_000_000));
    }

    #[tokio::test]
    async fn log_cursor_survives_monitor_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.redb");
        let settings = ControllerSettings {
            cooldown: Duration::ZERO,
            ..settings()
        };
        let burst: Vec<u64> = (0..4).map(|i| us(NOW) - 1000 + i).collect();

        {
            let mut h = harness_with(settings.clone(), AuditStore::open(&path).unwrap());
            for ts in &burst {
                h.logs.push(*ts, "Bad file descriptor");
            }
            assert_eq!(h.tick(NOW).await.outcome, DecisionOutcome::RestartTriggered);
        }

        // A fresh monitor over the same log sees nothing new.
        let mut h = harness_with(settings, AuditStore::open(&path).unwrap());
        assert_eq!(h.ctx.log_cursor_us, Some(us(NOW) - 997));
        for ts in &burst {
            h.logs.push(*ts, "Bad file descriptor");
        }
        let decision = h.tick(NOW + 30_000).await;
        assert_eq!(decision.outcome, DecisionOutcome::NoAction);
        assert!(decision.signals.is_empty());
        assert_eq!(h.restarts(), 0);
    }

    #[tokio::test]
    async fn consecutive_timeouts_restart_exactly_once() {
        let mut h = harness();
        // Observation, verification, then two more observations.
        h.probe.then(&[
            HealthStatus::Timeout,
            HealthStatus::Up,
            HealthStatus::Timeout,
            HealthStatus::Timeout,
        ]);

        let first = h.tick(NOW).await;
        assert_eq!(first.outcome, DecisionOutcome::RestartTriggered);
        assert_eq!(first.signals, vec![Signal::HealthTimeout]);

        for step in 1..=2 {
            let decision = h.tick(NOW + step * 30_000).await;
            assert_eq!(decision.outcome, DecisionOutcome::NoAction);
            assert_eq!(decision.signals, vec![Signal::HealthTimeout]);
            assert!(decision.note.as_deref().unwrap().starts_with("cool-down active"));
        }
        assert_eq!(h.restarts(), 1);
    }

    #[tokio::test]
    async fn no_second_restart_within_cooldown() {
        let mut h = harness();
        h.probe.set_fallback(HealthStatus::Down);
        h.probe.then(&[HealthStatus::Down, HealthStatus::Up]);

        assert_eq!(h.tick(NOW).await.outcome, DecisionOutcome::RestartTriggered);

        let cooldown_ms = COOLDOWN.as_millis() as u64;
        let decision = h.tick(NOW + cooldown_ms - 1).await;
        assert_eq!(decision.outcome, DecisionOutcome::NoAction);
        assert_eq!(decision.note.as_deref(), Some("cool-down active, 1s remaining"));
        assert_eq!(h.restarts(), 1);

        // Once the cool-down is over the persisting breach restarts again.
        h.probe.then(&[HealthStatus::Down, HealthStatus::Up]);
        let decision = h.tick(NOW + cooldown_ms).await;
        assert_eq!(decision.outcome, DecisionOutcome::RestartTriggered);
        assert_eq!(h.restarts(), 2);
    }

    #[tokio::test]
    async fn idle_only_after_cooldown_elapses() {
        let mut h = harness();
        h.probe.then(&[HealthStatus::Down]);
        assert_eq!(h.tick(NOW).await.outcome, DecisionOutcome::RestartTriggered);
        assert_eq!(h.ctx.state(), ControllerState::CoolDown);

        h.tick(NOW + 60_000).await;
        assert_eq!(h.ctx.state(), ControllerState::CoolDown);

        h.tick(NOW + COOLDOWN.as_millis() as u64 + 1).await;
        assert_eq!(h.ctx.state(), ControllerState::Idle);
    }

    #[tokio::test]
    async fn unhealthy_after_restart_is_restart_failed() {
        let mut h = harness();
        h.probe.set_fallback(HealthStatus::Down);

        let decision = h.tick(NOW).await;
        assert_eq!(decision.outcome, DecisionOutcome::RestartFailed);
        assert_eq!(decision.note.as_deref(), Some("service not healthy after 3 checks"));
        assert_eq!(h.ctx.consecutive_failures, 1);
        assert_eq!(h.ctx.state(), ControllerState::CoolDown);
        // One observation plus three verification polls; no retry.
        assert_eq!(h.probe.probes.load(Ordering::SeqCst), 4);
        assert_eq!(h.restarts(), 1);

        let stored = h.ctx.audit().recent_decisions(1).unwrap();
        assert_eq!(stored[0].outcome, DecisionOutcome::RestartFailed);
    }

    #[tokio::test]
    async fn restart_command_error_is_restart_failed() {
        let mut h = harness();
        h.supervisor.fail.store(true, Ordering::SeqCst);
        h.probe.then(&[HealthStatus::Down]);

        let decision = h.tick(NOW).await;
        assert_eq!(decision.outcome, DecisionOutcome::RestartFailed);
        assert!(decision.note.unwrap().contains("currency-exchange.service failed"));
        assert_eq!(h.ctx.state(), ControllerState::CoolDown);
    }

    #[tokio::test]
    async fn inactive_unit_is_a_breach() {
        let mut h = harness();
        h.supervisor.inactive.store(true, Ordering::SeqCst);

        let decision = h.tick(NOW).await;
        assert_eq!(decision.signals, vec![Signal::ServiceInactive]);
        assert_eq!(decision.outcome, DecisionOutcome::RestartTriggered);
    }

    #[tokio::test]
    async fn gives_up_after_max_consecutive_failures() {
        let mut h = harness_with(
            ControllerSettings {
                cooldown: Duration::ZERO,
                max_consecutive_failures: 2,
                ..settings()
            },
            AuditStore::open_in_memory().unwrap(),
        );
        h.probe.set_fallback(HealthStatus::Down);

        assert_eq!(h.tick(NOW).await.outcome, DecisionOutcome::RestartFailed);
        assert_eq!(h.tick(NOW + 1).await.outcome, DecisionOutcome::RestartFailed);

        let exhausted = h.tick(NOW + 2).await;
        assert_eq!(exhausted.outcome, DecisionOutcome::NoAction);
        assert_eq!(exhausted.note.as_deref(), Some("recovery attempts exhausted"));
        assert_eq!(h.restarts(), 2);
        assert!(h.controller.is_unresolved(&h.ctx, &exhausted));

        // A clean cycle re-arms the controller.
        h.probe.set_fallback(HealthStatus::Up);
        let clean = h.tick(NOW + 3).await;
        assert!(clean.signals.is_empty());
        assert!(!h.controller.is_unresolved(&h.ctx, &clean));
        assert_eq!(h.ctx.consecutive_failures, 0);

        h.probe.then(&[HealthStatus::Down]);
        assert_eq!(h.tick(NOW + 4).await.outcome, DecisionOutcome::RestartTriggered);
        assert_eq!(h.restarts(), 3);
    }

    #[tokio::test]
    async fn slow_restart_times_out_into_cooldown() {
        let mut h = harness_with(
            ControllerSettings {
                max_cycle: Duration::from_millis(100),
                ..settings()
            },
            AuditStore::open_in_memory().unwrap(),
        );
        *h.supervisor.restart_delay.lock().unwrap() = Duration::from_secs(5);
        h.probe.then(&[HealthStatus::Down]);

        let decision = h.controller.run_cycle(&mut h.ctx).await.unwrap();
        assert_eq!(decision.outcome, DecisionOutcome::CycleTimeout);
        assert_eq!(decision.signals, vec![Signal::HealthDown { code: Some(502) }]);
        assert_eq!(h.ctx.state(), ControllerState::CoolDown);
        assert_eq!(h.ctx.consecutive_failures, 1);
        assert!(h.ctx.last_restart_ms.is_some());
        assert_eq!(h.ctx.audit().decision_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn cooldown_survives_monitor_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.redb");

        {
            let mut h = harness_with(settings(), AuditStore::open(&path).unwrap());
            h.probe.then(&[HealthStatus::Down]);
            assert_eq!(h.tick(NOW).await.outcome, DecisionOutcome::RestartTriggered);
        }

        let mut h = harness_with(settings(), AuditStore::open(&path).unwrap());
        assert_eq!(h.ctx.state(), ControllerState::CoolDown);
        h.probe.set_fallback(HealthStatus::Down);
        let decision = h.tick(NOW + 60_000).await;
        assert_eq!(decision.outcome, DecisionOutcome::NoAction);
        assert_eq!(h.restarts(), 0);
        assert_eq!(h.ctx.audit().decision_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn failed_observations_are_not_breaches() {
        let mut h = harness();
        h.logs.broken.store(true, Ordering::SeqCst);
        h.controller.parts.inspector =
            ResourceInspector::new("/nonexistent/proc").with_excluded_pid(None);

        let decision = h.tick(NOW).await;
        assert_eq!(decision.outcome, DecisionOutcome::NoAction);
        assert!(decision.signals.is_empty());
        assert_eq!(h.ctx.log_cursor_us, None);
    }

    #[tokio::test]
    async fn resource_limits_trigger_restart() {
        let mut h = harness();
        fake_worker(h._proc.path(), 4243, 600 * 1024, 2);

        let decision = h.tick(NOW).await;
        assert_eq!(decision.outcome, DecisionOutcome::RestartTriggered);
        assert!(matches!(decision.signals[0], Signal::Memory { pid: 4243, .. }));
    }

    #[tokio::test]
    async fn run_loop_exits_on_shutdown() {
        let mut h = harness();
        let (tx, rx) = watch::channel(false);
        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            let _ = tx.send(true);
        });

        h.controller
            .run(&mut h.ctx, Duration::from_millis(20), rx)
            .await;
        stopper.await.unwrap();
        assert!(h.ctx.audit().decision_count().unwrap() >= 1);
        assert_eq!(h.restarts(), 0);
    }
}
