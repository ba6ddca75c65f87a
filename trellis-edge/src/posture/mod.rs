//! Posture engine: periodically proves endpoint posture to the controller.
//!
//! Every tick the engine walks the posture queries attached to the known
//! services, computes the set of probes it needs, dispatches the ones that
//! are not already in flight, and hands the changed answers to the
//! controller in bulk (degrading permanently to per-item submission when the
//! controller has no bulk endpoint). Answers are cached and de-duplicated;
//! an answer is retransmitted when it changed, when its last submission
//! errored, or when the controller demands a full resend (new API session,
//! controller restart, or a policy with expiring checks).

pub mod probes;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use trellis_core::posture::{PostureResponse, PostureSubmission};
use trellis_core::service::{QueryType, Service, NO_TIMEOUT};

use crate::config::PostureConfig;
use crate::controller::Controller;
use probes::{
    DomainReply, MacReply, OsReply, ProbeOverrides, ProbeReply, ProcessReply, ReplyTx,
    PROBE_DOMAIN, PROBE_MAC, PROBE_OS,
};

/// The service table the posture engine runs against.
///
/// The engine does not own service state; the embedding context supplies a
/// snapshot of the known services each tick and receives refresh demands
/// when the controller reports per-service check timers.
pub trait ServiceCatalog: Send + Sync {
    /// Snapshot of the currently known services.
    fn posture_services(&self) -> Vec<Service>;
    /// The controller reported a check timer for this service; refresh it.
    fn force_service_refresh(&self, service_id: &str);
    /// Request a general service-catalog refresh.
    fn refresh_services(&self);
}

/// One cached probe answer.
#[derive(Debug, Default)]
struct PrInfo {
    /// Last serialized payload the probe produced.
    body: Option<String>,
    /// A probe invocation is outstanding for this id.
    pending: bool,
    /// The cached body must go out with the next submission.
    should_send: bool,
    /// No policy currently requires this probe.
    obsolete: bool,
}

/// Background process-hash work in flight for one path.
struct ProcessJob {
    cancelled: Arc<AtomicBool>,
}

/// The probe set one tick requires.
#[derive(Debug, Default, PartialEq, Eq)]
struct RequiredQueries {
    os: Option<String>,
    mac: Option<String>,
    domain: Option<String>,
    /// Process path → posture query id.
    processes: HashMap<String, String>,
    /// False when every required query is stateless from the controller's
    /// view (all declare no expiry), true otherwise.
    send_every_time: bool,
}

/// Compute the probes required by the given services.
///
/// Singleton query types (OS, MAC, DOMAIN) keep the last query seen;
/// process queries are keyed by path with the first query winning, and a
/// `PROCESS_MULTI` check contributes one entry per listed path.
fn required_queries(services: &[Service]) -> RequiredQueries {
    let mut required = RequiredQueries::default();
    let mut any_no_timeout = false;

    for service in services {
        for set in &service.posture_queries {
            for query in &set.posture_queries {
                match query.query_type {
                    QueryType::Os => required.os = Some(query.id.clone()),
                    QueryType::Mac => required.mac = Some(query.id.clone()),
                    QueryType::Domain => required.domain = Some(query.id.clone()),
                    QueryType::Process => {
                        if let Some(process) = &query.process {
                            required
                                .processes
                                .entry(process.path.clone())
                                .or_insert_with(|| query.id.clone());
                        }
                    }
                    QueryType::ProcessMulti => {
                        for process in &query.processes {
                            required
                                .processes
                                .entry(process.path.clone())
                                .or_insert_with(|| query.id.clone());
                        }
                    }
                    QueryType::EndpointState | QueryType::Other => continue,
                }
                if query.timeout == NO_TIMEOUT {
                    any_no_timeout = true;
                }
            }
        }
    }

    required.send_every_time = !any_no_timeout;
    required
}

enum Command {
    EndpointStateChange { woken: bool, unlocked: bool },
    Shutdown,
}

/// Handle to a running posture engine.
///
/// Dropping the handle aborts the engine; [`PostureChecks::shutdown`] tears
/// it down cleanly, cancelling outstanding background probe work.
pub struct PostureChecks {
    cmd_tx: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl PostureChecks {
    /// Start the engine. The first tick fires almost immediately, then every
    /// `config.interval`.
    pub fn start(
        controller: Arc<Controller>,
        catalog: Arc<dyn ServiceCatalog>,
        config: PostureConfig,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (engine, reply_rx) = Engine::new(controller, catalog, config.probes);
        let task = tokio::spawn(engine.run(cmd_rx, reply_rx, config.interval));
        Self { cmd_tx, task }
    }

    /// Report an endpoint-state edge (wake from sleep, session unlock). If
    /// either flag is set a single endpoint-state posture response goes out
    /// immediately, bypassing the cache.
    pub fn endpoint_state_change(&self, woken: bool, unlocked: bool) {
        let _ = self
            .cmd_tx
            .send(Command::EndpointStateChange { woken, unlocked });
    }

    /// Stop the engine and cancel outstanding background probe work.
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
    }
}

impl Drop for PostureChecks {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// The engine proper. Owns the response cache and runs inside one task; all
/// state is touched from that task only.
struct Engine {
    controller: Arc<Controller>,
    catalog: Arc<dyn ServiceCatalog>,
    probes: ProbeOverrides,

    responses: HashMap<String, PrInfo>,
    /// Probe id → last submission errored. Keeps a failed probe
    /// retransmitting until a submission succeeds.
    error_states: HashMap<String, bool>,
    active_work: HashMap<String, ProcessJob>,

    previous_session_id: Option<String>,
    controller_instance_id: Option<String>,
    must_send_every_time: bool,
    must_send: bool,
    /// A failed submission round demands a retransmit on the next tick.
    retry_pending: bool,
    no_bulk_endpoint: bool,

    reply_tx: ReplyTx,
}

impl Engine {
    fn new(
        controller: Arc<Controller>,
        catalog: Arc<dyn ServiceCatalog>,
        probes: ProbeOverrides,
    ) -> (Self, mpsc::UnboundedReceiver<ProbeReply>) {
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let engine = Self {
            controller,
            catalog,
            probes,
            responses: HashMap::new(),
            error_states: HashMap::new(),
            active_work: HashMap::new(),
            previous_session_id: None,
            controller_instance_id: None,
            must_send_every_time: true,
            must_send: false,
            retry_pending: false,
            no_bulk_endpoint: false,
            reply_tx,
        };
        (engine, reply_rx)
    }

    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut reply_rx: mpsc::UnboundedReceiver<ProbeReply>,
        period: Duration,
    ) {
        let mut ticker = interval_at(Instant::now() + Duration::from_millis(1), period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick(&mut reply_rx).await,
                Some(reply) = reply_rx.recv() => self.collect(reply),
                cmd = cmd_rx.recv() => match cmd {
                    Some(Command::EndpointStateChange { woken, unlocked }) => {
                        self.endpoint_state_change(woken, unlocked).await;
                    }
                    Some(Command::Shutdown) | None => break,
                },
            }
        }

        for (path, job) in self.active_work.drain() {
            info!(path = %path, "cancelling process check");
            job.cancelled.store(true, Ordering::Relaxed);
        }
    }

    /// One posture tick: decide, probe, send.
    async fn tick(&mut self, reply_rx: &mut mpsc::UnboundedReceiver<ProbeReply>) {
        let Some(session) = self.controller.api_session() else {
            debug!("no api session, can't submit posture responses");
            return;
        };
        if !session.is_fully_authenticated() {
            debug!("api session is partially authenticated, can't submit posture responses");
            return;
        }

        let new_session_id = self.previous_session_id.as_deref() != Some(session.id.as_str());
        let instance_id = self.controller.instance_id();
        let new_instance = self.controller_instance_id != instance_id;
        if new_instance {
            info!("first run or potential controller restart detected");
        }

        self.must_send = std::mem::take(&mut self.retry_pending)
            || new_session_id
            || new_instance
            || self.must_send_every_time;
        debug!(
            must_send = self.must_send,
            new_session_id,
            new_instance,
            must_send_every_time = self.must_send_every_time,
            "posture tick"
        );
        self.previous_session_id = Some(session.id);
        self.controller_instance_id = instance_id;

        let services = self.catalog.posture_services();
        trace!(services = services.len(), "checking posture queries");
        let required = required_queries(&services);
        self.must_send_every_time = required.send_every_time;

        for info in self.responses.values_mut() {
            if !info.pending && !info.should_send {
                info.obsolete = true;
            }
        }

        if let Some(query_id) = &required.os {
            self.dispatch_singleton(PROBE_OS, query_id.clone());
        }
        if let Some(query_id) = &required.mac {
            self.dispatch_singleton(PROBE_MAC, query_id.clone());
        }
        if let Some(query_id) = &required.domain {
            self.dispatch_singleton(PROBE_DOMAIN, query_id.clone());
        }
        for (path, query_id) in &required.processes {
            self.dispatch_process(path.clone(), query_id.clone());
        }

        // synchronous probes have already answered through the channel
        while let Ok(reply) = reply_rx.try_recv() {
            self.collect(reply);
        }

        self.responses.retain(|id, info| {
            if info.obsolete {
                debug!(id = %id, "removing obsolete posture response");
            }
            !info.obsolete
        });

        self.send().await;
    }

    /// Mark one singleton probe required and dispatch it unless in flight.
    fn dispatch_singleton(&mut self, cache_key: &str, query_id: String) {
        let info = self.responses.entry(cache_key.to_string()).or_default();
        info.obsolete = false;
        if info.pending {
            return;
        }
        info.pending = true;

        let tx = self.reply_tx.clone();
        match cache_key {
            PROBE_OS => {
                let reply = OsReply { query_id: query_id.clone(), tx };
                match &self.probes.os {
                    Some(probe) => probe(&query_id, reply),
                    None => probes::default_os(reply),
                }
            }
            PROBE_MAC => {
                let reply = MacReply { query_id: query_id.clone(), tx };
                match &self.probes.mac {
                    Some(probe) => probe(&query_id, reply),
                    None => probes::default_mac(reply),
                }
            }
            PROBE_DOMAIN => {
                let reply = DomainReply { query_id: query_id.clone(), tx };
                match &self.probes.domain {
                    Some(probe) => probe(&query_id, reply),
                    None => probes::default_domain(reply),
                }
            }
            _ => unreachable!("singleton probe keys are fixed"),
        }
    }

    /// Mark one process probe required and dispatch it unless in flight.
    /// The default probe hashes on the blocking pool; at most one job per
    /// path is outstanding.
    fn dispatch_process(&mut self, path: String, query_id: String) {
        let info = self.responses.entry(path.clone()).or_default();
        info.obsolete = false;
        if info.pending {
            return;
        }
        info.pending = true;

        let reply = ProcessReply {
            query_id: query_id.clone(),
            path: path.clone(),
            tx: self.reply_tx.clone(),
        };
        if let Some(probe) = &self.probes.process {
            probe(&query_id, &path, reply);
            return;
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        self.active_work.insert(
            path.clone(),
            ProcessJob {
                cancelled: cancelled.clone(),
            },
        );
        tokio::spawn(async move {
            let worker_path = path.clone();
            let facts = tokio::task::spawn_blocking(move || probes::process_facts(&worker_path))
                .await
                .unwrap_or_default();
            if cancelled.load(Ordering::Relaxed) {
                info!(path = %path, "process check was cancelled");
                return;
            }
            reply.respond(facts.is_running, &facts.sha512_hex, facts.signers);
        });
    }

    /// Fold one probe answer into the cache.
    fn collect(&mut self, reply: ProbeReply) {
        self.active_work.remove(&reply.cache_key);

        let Some(info) = self.responses.get_mut(&reply.cache_key) else {
            warn!(id = %reply.cache_key, "response info not found, posture check obsolete?");
            return;
        };
        info.pending = false;

        let changed = info.body.as_deref() != Some(reply.body.as_str());
        if changed {
            info.body = Some(reply.body);
        }
        info.should_send = self.must_send
            || changed
            || self
                .error_states
                .get(&reply.cache_key)
                .copied()
                .unwrap_or(false);
    }

    async fn send(&mut self) {
        if self.no_bulk_endpoint {
            self.send_individually().await;
        } else {
            self.send_bulk().await;
        }
    }

    /// Submit every flagged answer in one array body. A 404 marks the bulk
    /// endpoint as permanently absent; any other failure re-arms
    /// `must_send` so the next tick retransmits.
    async fn send_bulk(&mut self) {
        let mut bodies = Vec::new();
        for (id, info) in self.responses.iter_mut() {
            if !info.should_send {
                trace!(id = %id, pending = info.pending, "not sending posture response");
                continue;
            }
            if let Some(body) = &info.body {
                trace!(id = %id, "sending posture response");
                bodies.push(body.clone());
                info.should_send = false;
            }
        }
        if bodies.is_empty() {
            trace!("no change in posture data, not sending");
            return;
        }

        debug!(count = bodies.len(), "sending posture responses");
        let body = format!("[{}]", bodies.join(","));
        match self
            .controller
            .post_posture_body("/posture-response-bulk", body)
            .await
        {
            Ok(response) => {
                self.must_send = false;
                self.handle_timer_events(&response);
                self.catalog.refresh_services();
                debug!("done with bulk posture response submission");
            }
            Err(err) => {
                error!(
                    http = ?err.http_status,
                    message = %err.message,
                    "error during bulk posture response submission"
                );
                self.must_send = true;
                self.retry_pending = true;
                if err.http_status == Some(404) {
                    info!("controller does not support bulk posture responses");
                    self.no_bulk_endpoint = true;
                }
            }
        }
    }

    /// Submit every flagged answer one body at a time, tracking per-id
    /// error state so failed ids stay flagged.
    async fn send_individually(&mut self) {
        let mut batch = Vec::new();
        for (id, info) in self.responses.iter_mut() {
            if info.should_send {
                if let Some(body) = &info.body {
                    batch.push((id.clone(), body.clone()));
                    info.should_send = false;
                }
            }
        }

        for (id, body) in batch {
            match self
                .controller
                .post_posture_body("/posture-response", body)
                .await
            {
                Ok(response) => {
                    self.error_states.insert(id, false);
                    self.handle_timer_events(&response);
                    self.catalog.refresh_services();
                }
                Err(err) => {
                    error!(
                        id = %id,
                        http = ?err.http_status,
                        message = %err.message,
                        "error during individual posture response submission"
                    );
                    self.error_states.insert(id, true);
                }
            }
        }
    }

    /// Send a single endpoint-state response immediately, bypassing the
    /// cache.
    async fn endpoint_state_change(&mut self, woken: bool, unlocked: bool) {
        if !woken && !unlocked {
            info!(woken, unlocked, "endpoint state change reported, but no reason to send data");
            return;
        }
        info!(woken, unlocked, "endpoint state change reported");

        let submission = PostureSubmission::EndpointState {
            id: "0".to_string(),
            woken,
            unlocked,
        };
        let body = match serde_json::to_string(&submission) {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, "failed to serialize endpoint state");
                return;
            }
        };
        match self
            .controller
            .post_posture_body("/posture-response", body)
            .await
        {
            Ok(response) => {
                info!("endpoint state sent");
                self.handle_timer_events(&response);
                self.catalog.refresh_services();
            }
            Err(err) => {
                error!(
                    http = ?err.http_status,
                    message = %err.message,
                    "error during endpoint state posture response submission"
                );
            }
        }
    }

    /// Per-service check timers returned with a posture response force a
    /// refresh of each named service.
    fn handle_timer_events(&self, response: &PostureResponse) {
        for timer in &response.services {
            debug!(
                service = %timer.name,
                id = %timer.id,
                timeout = ?timer.timeout,
                remaining = ?timer.timeout_remaining,
                "forcing service refresh from posture response"
            );
            self.catalog.force_service_refresh(&timer.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::service::{PostureQuery, PostureQuerySet, ProcessCheck};

    use crate::config::ControllerConfig;

    struct NullCatalog;

    impl ServiceCatalog for NullCatalog {
        fn posture_services(&self) -> Vec<Service> {
            Vec::new()
        }
        fn force_service_refresh(&self, _service_id: &str) {}
        fn refresh_services(&self) {}
    }

    fn query(id: &str, query_type: QueryType, timeout: i64) -> PostureQuery {
        PostureQuery {
            id: id.into(),
            query_type,
            is_passing: false,
            timeout,
            timeout_remaining: None,
            process: None,
            processes: Vec::new(),
        }
    }

    fn service_with(queries: Vec<PostureQuery>) -> Service {
        Service {
            id: "svc".into(),
            name: "svc".into(),
            posture_queries: vec![PostureQuerySet {
                policy_id: "pol".into(),
                posture_queries: queries,
                ..PostureQuerySet::default()
            }],
            ..Service::default()
        }
    }

    fn engine() -> Engine {
        let controller =
            Arc::new(Controller::new(ControllerConfig::new("https://ctrl.invalid")).unwrap());
        let (engine, _reply_rx) =
            Engine::new(controller, Arc::new(NullCatalog), ProbeOverrides::default());
        engine
    }

    #[test]
    fn singleton_queries_last_writer_wins() {
        let services = vec![
            service_with(vec![query("os-1", QueryType::Os, 60)]),
            service_with(vec![query("os-2", QueryType::Os, 60)]),
        ];
        let required = required_queries(&services);
        assert_eq!(required.os.as_deref(), Some("os-2"));
        assert!(required.send_every_time);
    }

    #[test]
    fn process_multi_shares_cache_entry_with_process() {
        let mut single = query("proc-1", QueryType::Process, 60);
        single.process = Some(ProcessCheck {
            path: "/usr/bin/agent".into(),
            os_type: None,
        });
        let mut multi = query("proc-2", QueryType::ProcessMulti, 60);
        multi.processes = vec![
            ProcessCheck {
                path: "/usr/bin/agent".into(),
                os_type: None,
            },
            ProcessCheck {
                path: "/opt/av/scan".into(),
                os_type: None,
            },
        ];

        let required = required_queries(&[service_with(vec![single, multi])]);
        assert_eq!(required.processes.len(), 2);
        assert_eq!(
            required.processes.get("/usr/bin/agent").map(String::as_str),
            Some("proc-1")
        );
        assert_eq!(
            required.processes.get("/opt/av/scan").map(String::as_str),
            Some("proc-2")
        );
    }

    #[test]
    fn no_timeout_query_disables_send_every_time() {
        let services = vec![service_with(vec![
            query("os-1", QueryType::Os, 60),
            query("mac-1", QueryType::Mac, NO_TIMEOUT),
        ])];
        assert!(!required_queries(&services).send_every_time);
    }

    #[test]
    fn unanswerable_queries_are_ignored() {
        let services = vec![service_with(vec![query("mfa-1", QueryType::Other, 60)])];
        let required = required_queries(&services);
        assert_eq!(required, RequiredQueries {
            send_every_time: true,
            ..RequiredQueries::default()
        });
    }

    #[tokio::test]
    async fn collect_flags_changed_bodies() {
        let mut engine = engine();
        engine.responses.insert("OS".into(), PrInfo {
            pending: true,
            ..PrInfo::default()
        });

        engine.collect(ProbeReply {
            cache_key: "OS".into(),
            body: r#"{"typeId":"OS"}"#.into(),
        });
        let info = &engine.responses["OS"];
        assert!(!info.pending);
        assert!(info.should_send, "first body is a change");
    }

    #[tokio::test]
    async fn collect_skips_unchanged_bodies() {
        let mut engine = engine();
        engine.responses.insert("OS".into(), PrInfo {
            body: Some(r#"{"typeId":"OS"}"#.into()),
            pending: true,
            ..PrInfo::default()
        });

        engine.collect(ProbeReply {
            cache_key: "OS".into(),
            body: r#"{"typeId":"OS"}"#.into(),
        });
        assert!(!engine.responses["OS"].should_send);
    }

    #[tokio::test]
    async fn collect_resends_after_submission_error() {
        let mut engine = engine();
        engine.error_states.insert("OS".into(), true);
        engine.responses.insert("OS".into(), PrInfo {
            body: Some(r#"{"typeId":"OS"}"#.into()),
            pending: true,
            ..PrInfo::default()
        });

        engine.collect(ProbeReply {
            cache_key: "OS".into(),
            body: r#"{"typeId":"OS"}"#.into(),
        });
        assert!(
            engine.responses["OS"].should_send,
            "errored id keeps retransmitting an unchanged body"
        );
    }

    #[tokio::test]
    async fn collect_resends_unchanged_bodies_when_must_send() {
        let mut engine = engine();
        engine.must_send = true;
        engine.responses.insert("MAC".into(), PrInfo {
            body: Some(r#"{"typeId":"MAC"}"#.into()),
            pending: true,
            ..PrInfo::default()
        });

        engine.collect(ProbeReply {
            cache_key: "MAC".into(),
            body: r#"{"typeId":"MAC"}"#.into(),
        });
        assert!(engine.responses["MAC"].should_send);
    }

    #[tokio::test]
    async fn late_reply_for_removed_id_is_dropped() {
        let mut engine = engine();
        engine.collect(ProbeReply {
            cache_key: "/gone/away".into(),
            body: r#"{"typeId":"PROCESS"}"#.into(),
        });
        assert!(engine.responses.is_empty());
    }
}
