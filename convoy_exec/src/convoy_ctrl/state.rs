//! Convoy control module state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, trace, warn};
use serde::Serialize;
use std::collections::BTreeMap;

// Internal
use super::{
    nav::HeadingRateFilter,
    params::{parse_updates, ConfigOption},
    relay::{lead_point_mail, view_point_mail, LeaderSeeder},
    *,
};
use comms_if::{
    convoy::{
        decode_ordering, decode_roster, encode_ordering, AgentInfo, AgentName, ConvoyMsgError,
        ConvoyPoint, FollowFact, FollowTarget,
    },
    mail::{Destination, Mail, Topic},
};
use util::{archive::Archiver, module::State, params, session::Session};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Marker preceding the followed agent's name in a task state message.
const FOLLOW_TASK_MARKER: &str = "id=follow_";

/// Marker present in a task state message once the bid has been won.
const BID_WON_MARKER: &str = "bidwon";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Convoy control module state
pub struct ConvoyCtrl {
    name: AgentName,

    pub(crate) params: Params,

    resolver: OrderingResolver,
    queue: ConvoyPointQueue,
    seeder: LeaderSeeder,
    heading_rate: HeadingRateFilter,
    timer: RepostTimer,

    /// Latest info broadcast by each other agent
    agent_infos: BTreeMap<AgentName, AgentInfo>,

    /// The last `CONVOY_UPDATES` message applied
    last_updates: Option<String>,

    /// The agent named in the last won bid
    last_bid: Option<AgentName>,

    nav: NavState,

    pub(crate) report: StatusReport,
    arch_report: Archiver,
}

/// Input data to convoy control.
#[derive(Debug, Clone, Default)]
pub struct InputData {
    /// Time of the cycle
    ///
    /// Units: seconds
    pub time_s: f64,

    /// The agent's navigation solution
    pub nav: NavState,

    /// Mail received since the last cycle
    pub mail: Vec<Mail>,
}

/// Output data from convoy control.
#[derive(Debug, Clone, Default)]
pub struct OutputData {
    /// Mail to post
    pub mail: Vec<Mail>,

    /// The coupled heading and speed objective, `None` if it could not be built this cycle
    pub objective: Option<CoupledObjective>,
}

/// Status report for convoy control processing.
///
/// Written to the archive once per cycle, so every field is flat.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusReport {
    pub time_s: f64,

    pub role: Role,
    pub rank: Option<usize>,
    pub follower: Option<String>,
    pub followed: Option<String>,
    pub facts_known: usize,
    pub population: usize,

    /// The ordering changed this cycle
    pub ordering_changed: bool,

    /// An ordering fault was detected this cycle
    pub resolver_fault: bool,

    pub queue_len: usize,
    pub points_received: usize,
    pub point_seeded: bool,
    pub point_captured: bool,
    pub point_relayed: bool,

    /// Points seeded or captured without a follower to send them to
    pub points_dropped: usize,

    pub odometer_m: f64,
    pub heading_rate_degs: f64,

    pub heading_ref_deg: f64,
    pub speed_ref_ms: f64,
    pub dist_to_target_m: Option<f64>,
    pub speed_limited: bool,
    pub active: bool,

    /// The objective could not be built, so no output was produced
    pub objective_invalid: bool,

    pub config_rejected: usize,
    pub mail_rejected: usize,
    pub reposts: usize,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised while handling a single inbound mail.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Malformed {0} payload: {1}")]
    Malformed(Topic, ConvoyMsgError),

    #[error("Ordering fault: {0}")]
    Resolver(#[from] ResolverError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for ConvoyCtrl {
    type InitData = &'static str;
    type InitError = ConvoyCtrlError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = ConvoyCtrlError;

    /// Initialise the ConvoyCtrl module.
    ///
    /// Expected init data is the path to the parameter file.
    fn init(&mut self, init_data: Self::InitData, session: &Session) -> Result<(), Self::InitError> {
        let params: Params = params::load(init_data)?;
        self.set_params(params)?;

        self.arch_report = Archiver::from_path(
            session,
            format!("convoy_ctrl/{}_status_report.csv", self.name),
        )?;

        Ok(())
    }

    /// Perform one convoy control cycle.
    ///
    /// The cycle:
    ///  1. Updates the agent's own state from the navigation input.
    ///  1. Handles the inbound mail, resolving the ordering as facts arrive.
    ///  1. Seeds a point on the leader, or captures and relays the queue head on a follower.
    ///  1. Computes the heading and speed references and couples them into an objective.
    ///  1. Posts the periodic facts and this agent's info.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        let nav = input_data.nav;
        if !(nav.position_m.iter().all(|v| v.is_finite())
            && nav.heading_deg.is_finite()
            && nav.speed_ms.is_finite())
        {
            return Err(ConvoyCtrlError::InvalidNav(nav));
        }

        let time_s = input_data.time_s;
        self.report = StatusReport {
            time_s,
            ..Default::default()
        };
        let mut output = OutputData::default();

        // ---- AGENT STATE ----

        self.nav = nav;
        let heading_rate_degs = self.heading_rate.update(time_s, nav.heading_deg);

        // ---- INBOUND MAIL ----

        for mail in input_data.mail.iter() {
            if !mail.is_for(&self.name) || mail.source.as_ref() == Some(&self.name) {
                continue;
            }

            if let Err(e) = self.handle_mail(mail, &mut output) {
                warn!("[{}] Rejected {} mail: {}", self.name, mail.topic, e);
                self.report.mail_rejected += 1;
            }
        }

        // ---- POINT RELAY ----

        self.relay(time_s, heading_rate_degs, &mut output);

        // ---- CONTROL ----

        let refs = compute_refs(
            &self.nav,
            &self.queue,
            &self.target(),
            self.resolver.is_leader(),
            &self.params,
        );

        output.objective = match self.build_objective(&refs) {
            Ok(o) => Some(o),
            Err(e) => {
                warn!("[{}] No objective this cycle: {}", self.name, e);
                self.report.objective_invalid = true;
                None
            }
        };

        // ---- BROADCASTS ----

        self.post_facts(time_s, &mut output);
        output.mail.push(self.agent_info_mail(time_s, heading_rate_degs));

        // ---- REPORT ----

        self.report.role = self.resolver.role();
        self.report.rank = self.resolver.rank();
        self.report.follower = self.resolver.follower().map(|f| f.to_string());
        self.report.followed = self.resolver.followed().map(|f| f.to_string());
        self.report.facts_known = self.resolver.known_facts();
        self.report.population = self.resolver.population();
        self.report.queue_len = self.queue.len();
        self.report.odometer_m = self.seeder.odometer_m();
        self.report.heading_rate_degs = heading_rate_degs;
        self.report.heading_ref_deg = refs.heading_deg;
        self.report.speed_ref_ms = refs.speed_ms;
        self.report.dist_to_target_m = refs.dist_to_target_m;
        self.report.speed_limited = refs.speed_limited;
        self.report.active = refs.active;

        trace!(
            "[{}] {:?} queue {} refs {:.1} deg {:.2} m/s",
            self.name,
            self.report.role,
            self.queue,
            refs.heading_deg,
            refs.speed_ms
        );

        if let Err(e) = self.arch_report.serialise(&self.report) {
            warn!("[{}] Could not archive the status report: {}", self.name, e);
        }

        Ok((output, self.report.clone()))
    }
}

impl ConvoyCtrl {
    /// Create the module for the agent `name` with default parameters.
    ///
    /// Archiving is off until the module is initialised with a session.
    pub fn new(name: AgentName) -> Self {
        let params = Params::default();

        Self {
            resolver: OrderingResolver::new(name.clone()),
            queue: ConvoyPointQueue::default(),
            seeder: LeaderSeeder::new(params.odometry_eps_m),
            heading_rate: HeadingRateFilter::new(params.heading_rate_alpha),
            timer: RepostTimer::default(),
            agent_infos: BTreeMap::new(),
            last_updates: None,
            last_bid: None,
            nav: NavState::default(),
            report: StatusReport::default(),
            arch_report: Archiver::default(),
            params,
            name,
        }
    }

    /// Create the module with the given parameters and no archiving.
    pub fn with_params(name: AgentName, params: Params) -> Result<Self, ConvoyCtrlError> {
        let mut ctrl = Self::new(name);
        ctrl.set_params(params)?;
        Ok(ctrl)
    }

    /// Replace the parameters, validating them first.
    pub fn set_params(&mut self, params: Params) -> Result<(), ConvoyCtrlError> {
        params.validate()?;

        self.seeder = LeaderSeeder::new(params.odometry_eps_m);
        self.heading_rate.set_alpha(params.heading_rate_alpha);
        let is_leader = params.is_leader;
        self.params = params;

        if is_leader != self.resolver.is_leader() {
            if let Err(e) = self.set_leader(is_leader) {
                warn!("[{}] {}", self.name, e);
            }
        }

        Ok(())
    }

    pub fn name(&self) -> &AgentName {
        &self.name
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn role(&self) -> Role {
        self.resolver.role()
    }

    pub fn ordering(&self) -> &[AgentName] {
        self.resolver.ordering()
    }

    pub fn follower(&self) -> Option<&AgentName> {
        self.resolver.follower()
    }

    pub fn followed(&self) -> Option<&AgentName> {
        self.resolver.followed()
    }

    pub fn queue(&self) -> &ConvoyPointQueue {
        &self.queue
    }

    /// Handle one inbound mail.
    fn handle_mail(&mut self, mail: &Mail, output: &mut OutputData) -> Result<(), MailError> {
        let payload = mail.payload.as_str();

        match &mail.topic {
            Topic::Leader => self.set_leader(payload.trim().eq_ignore_ascii_case("true")),
            Topic::ContactsList => {
                let mut roster = decode_roster(payload);
                roster.remove(&self.name);
                if &roster != self.resolver.roster() {
                    info!(
                        "[{}] Contacts: {}",
                        self.name,
                        encode_ordering(&roster.iter().cloned().collect::<Vec<_>>())
                    );
                    let res = self.resolver.set_roster(roster);
                    self.note_resolution(res)?;
                }
                Ok(())
            }
            Topic::TaskState => self.handle_task_state(payload),
            Topic::FollowBroadcast => {
                let fact = FollowFact::decode(payload)
                    .map_err(|e| MailError::Malformed(mail.topic.clone(), e))?;
                let res = self.resolver.record_fact(fact);
                self.note_resolution(res)
            }
            Topic::Ordering => {
                let ordering = decode_ordering(payload)
                    .map_err(|e| MailError::Malformed(mail.topic.clone(), e))?;
                let res = self.resolver.merge_ordering(&ordering);
                self.note_resolution(res)
            }
            Topic::LeadPoint => {
                if mail.dest != Destination::Agent(self.name.clone()) {
                    return Ok(());
                }
                if self.resolver.is_leader() {
                    debug!("[{}] Leader ignoring relayed point", self.name);
                    return Ok(());
                }

                let point = ConvoyPoint::decode(payload);
                output.mail.push(view_point_mail(&point, true));
                self.queue.enqueue(point);
                self.report.points_received += 1;
                Ok(())
            }
            Topic::AgentInfo(name) => {
                if name != &self.name {
                    self.agent_infos
                        .insert(name.clone(), AgentInfo::decode(payload));
                }
                Ok(())
            }
            Topic::ConvoyUpdates => self.handle_updates(payload),
            Topic::ViewPoint => Ok(()),
        }
    }

    /// Record the outcome of a resolution attempt in the report.
    fn note_resolution(
        &mut self,
        res: Result<Resolution, ResolverError>,
    ) -> Result<(), MailError> {
        match res {
            Ok(Resolution::Resolved { changed: true }) => {
                info!(
                    "[{}] Ordering: {}",
                    self.name,
                    encode_ordering(self.resolver.ordering())
                );
                self.report.ordering_changed = true;
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) => {
                self.report.resolver_fault = true;
                Err(e.into())
            }
        }
    }

    fn set_leader(&mut self, is_leader: bool) -> Result<(), MailError> {
        if is_leader == self.resolver.is_leader() {
            return Ok(());
        }

        info!(
            "[{}] {} the convoy",
            self.name,
            if is_leader { "Leading" } else { "No longer leading" }
        );

        self.params.is_leader = is_leader;
        self.last_bid = None;
        if is_leader {
            self.queue = ConvoyPointQueue::default();
            self.seeder.restart();
            self.timer.reset(RepostKind::Leadership);
        }

        let res = self.resolver.set_leader(is_leader);
        self.note_resolution(res)
    }

    /// Pick the won bid out of a task state message.
    ///
    /// The message is free text containing `id=follow_<name>` and, once the bid has been won,
    /// `bidwon`. Each won bid is only acted on once.
    fn handle_task_state(&mut self, payload: &str) -> Result<(), MailError> {
        let state = payload.to_lowercase();

        let contact = match state.find(FOLLOW_TASK_MARKER) {
            Some(i) => state[i + FOLLOW_TASK_MARKER.len()..]
                .split(',')
                .next()
                .unwrap_or("")
                .trim(),
            None => return Ok(()),
        };

        if !state.contains(BID_WON_MARKER) || self.resolver.is_leader() {
            return Ok(());
        }

        let contact = AgentName::new(contact).map_err(|e| MailError::Malformed(Topic::TaskState, e))?;
        if self.last_bid.as_ref() == Some(&contact) {
            return Ok(());
        }

        let fact = FollowFact::new(self.name.clone(), FollowTarget::Agent(contact.clone()))
            .map_err(|e| MailError::Malformed(Topic::TaskState, e))?;

        info!("[{}] Won bid to follow {}", self.name, contact);
        self.last_bid = Some(contact);
        self.timer.reset(RepostKind::OwnFollow);

        let res = self.resolver.record_fact(fact);
        self.note_resolution(res)
    }

    /// Apply a `CONVOY_UPDATES` message, unless it repeats the last one.
    ///
    /// Every valid assignment is applied, a bad one or a resolver fault on a leadership change
    /// does not stop the rest.
    fn handle_updates(&mut self, payload: &str) -> Result<(), MailError> {
        if self.last_updates.as_deref() == Some(payload) {
            return Ok(());
        }
        self.last_updates = Some(payload.to_string());

        let (options, errors) = parse_updates(payload);

        for e in errors.iter() {
            warn!("[{}] Skipping configuration update: {}", self.name, e);
        }
        self.report.config_rejected += errors.len();

        for option in options {
            debug!("[{}] Applying {:?}", self.name, option);
            match option {
                ConfigOption::IsLeader(b) => {
                    if let Err(e) = self.set_leader(b) {
                        warn!("[{}] Leadership update: {}", self.name, e);
                        self.report.mail_rejected += 1;
                    }
                }
                o => self.params.apply(o),
            }
        }

        self.heading_rate.set_alpha(self.params.heading_rate_alpha);

        Ok(())
    }

    /// Seed a point on the leader, or capture and relay the queue head on a follower.
    fn relay(&mut self, time_s: f64, heading_rate_degs: f64, output: &mut OutputData) {
        if self.resolver.is_leader() {
            let point = match self.seeder.update(
                &self.nav,
                heading_rate_degs,
                time_s,
                self.params.point_update_distance_m,
            ) {
                Some(p) => p,
                None => return,
            };

            self.report.point_seeded = true;
            match lead_point_mail(&self.name, self.resolver.follower(), &point) {
                Some(m) => output.mail.push(m),
                None => self.report.points_dropped += 1,
            }
        } else if let Some(point) = self
            .queue
            .pop_captured(&self.nav.position_m, self.params.capture_radius_m)
        {
            self.report.point_captured = true;
            output.mail.push(view_point_mail(&point, false));

            match lead_point_mail(&self.name, self.resolver.follower(), &point) {
                Some(m) => {
                    output.mail.push(m);
                    self.report.point_relayed = true;
                }
                None if self.resolver.role() == Role::Tail => (),
                None => self.report.points_dropped += 1,
            }
        }
    }

    /// What is known about the followed agent.
    fn target(&self) -> TargetState {
        let info = self
            .resolver
            .followed()
            .and_then(|f| self.agent_infos.get(f));

        TargetState {
            position_m: info.map(AgentInfo::position_m),
            speed_ms: info.map(|i| i.u),
        }
    }

    fn build_objective(&self, refs: &ControlRefs) -> Result<CoupledObjective, ObjectiveError> {
        let course = ScalarObjective::course(refs.heading_deg, &self.params.course_objective);
        let speed = ScalarObjective::speed(
            refs.speed_ms,
            self.params.speed_domain_max_ms,
            &self.params.speed_objective,
        );
        let priority_wt = if refs.active {
            self.params.priority_wt
        } else {
            0.0
        };

        CoupledObjective::couple(
            course,
            speed,
            self.params.course_weight,
            self.params.speed_weight,
            priority_wt,
        )
    }

    /// Post this agent's own fact and the ordering, each at most once per repost interval.
    fn post_facts(&mut self, time_s: f64, output: &mut OutputData) {
        let interval_s = self.params.repost_interval_s;

        if let Some(fact) = self.resolver.own_fact() {
            let kind = match fact.leader {
                FollowTarget::Nobody => RepostKind::Leadership,
                FollowTarget::Agent(_) => RepostKind::OwnFollow,
            };

            if self.timer.fire(kind, time_s, interval_s) {
                output.mail.push(Mail::broadcast(
                    self.name.clone(),
                    Topic::FollowBroadcast,
                    fact.encode(),
                ));
                self.report.reposts += 1;
            }
        }

        if !self.resolver.ordering().is_empty()
            && self.timer.fire(RepostKind::Ordering, time_s, interval_s)
        {
            output.mail.push(Mail::broadcast(
                self.name.clone(),
                Topic::Ordering,
                encode_ordering(self.resolver.ordering()),
            ));
            self.report.reposts += 1;
        }
    }

    fn agent_info_mail(&self, time_s: f64, heading_rate_degs: f64) -> Mail {
        let info = AgentInfo {
            name: self.name.to_string(),
            x: self.nav.position_m[0],
            y: self.nav.position_m[1],
            h: self.nav.heading_deg,
            h_dot: heading_rate_degs,
            u: self.nav.speed_ms,
            utc: time_s,
            ..Default::default()
        };

        Mail::broadcast(
            self.name.clone(),
            Topic::AgentInfo(self.name.clone()),
            info.encode(),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::Vector2;

    fn name(s: &str) -> AgentName {
        AgentName::new(s).unwrap()
    }

    fn nav(x: f64, y: f64) -> NavState {
        NavState {
            position_m: Vector2::new(x, y),
            heading_deg: 0.0,
            speed_ms: 1.0,
        }
    }

    fn tick(ctrl: &mut ConvoyCtrl, time_s: f64, nav: NavState, mail: Vec<Mail>) -> OutputData {
        ctrl.proc(&InputData { time_s, nav, mail }).unwrap().0
    }

    fn fact_from(from: &str, fact: &str) -> Mail {
        Mail::broadcast(name(from), Topic::FollowBroadcast, fact)
    }

    fn sent(output: &OutputData, topic: Topic) -> Vec<&Mail> {
        output.mail.iter().filter(|m| m.topic == topic).collect()
    }

    /// B, in the middle of a three agent convoy.
    fn midship() -> ConvoyCtrl {
        let mut b = ConvoyCtrl::new(name("b"));
        tick(
            &mut b,
            0.0,
            nav(0.0, 0.0),
            vec![
                Mail::local(Topic::ContactsList, "a,c"),
                Mail::local(Topic::TaskState, "id=follow_a,bidwon"),
                fact_from("a", "a_following_*"),
                fact_from("c", "c_following_b"),
            ],
        );
        assert_eq!(b.role(), Role::Midship);
        b
    }

    #[test]
    fn test_leader_seeds_points() {
        let mut a = ConvoyCtrl::new(name("a"));
        let mut lead_points = Vec::new();

        for k in 0..=13 {
            let mut mail = Vec::new();
            if k == 0 {
                mail.push(Mail::local(Topic::Leader, "TRUE"));
                mail.push(Mail::local(Topic::ContactsList, "b"));
                mail.push(fact_from("b", "b_following_a"));
            }

            let out = tick(&mut a, k as f64 * 0.1, nav(0.0, k as f64 * 0.25), mail);
            for m in sent(&out, Topic::LeadPoint) {
                assert_eq!(m.dest, Destination::Agent(name("b")));
                lead_points.push(ConvoyPoint::decode(&m.payload));
            }
        }

        assert_eq!(a.role(), Role::Leader);
        assert_eq!(lead_points.len(), 3);
        assert!(lead_points
            .windows(2)
            .all(|w| w[0].seed_time_s < w[1].seed_time_s));
        assert_eq!(lead_points[2].position_m, Vector2::new(0.0, 3.0));
        assert_eq!(lead_points[2].meta("id"), Some("2"));
        assert_eq!(lead_points[0].leader_speed_ms, 1.0);
    }

    #[test]
    fn test_capture_relays_once() {
        let mut b = midship();

        let mut point = ConvoyPoint::new(0.0, 2.0);
        point.seed_time_s = 7.5;
        point.leader_speed_ms = 1.3;
        point.insert_meta("id", "12").unwrap();
        let payload = point.encode();

        let out = tick(
            &mut b,
            0.1,
            nav(0.0, 0.0),
            vec![Mail::to(name("a"), name("b"), Topic::LeadPoint, payload.clone())],
        );

        let relayed = sent(&out, Topic::LeadPoint);
        assert_eq!(relayed.len(), 1);
        assert_eq!(relayed[0].dest, Destination::Agent(name("c")));
        assert_eq!(relayed[0].payload, payload);
        assert!(b.queue().is_empty());

        // Marker posted when queued and again when captured
        assert_eq!(sent(&out, Topic::ViewPoint).len(), 2);

        // Nothing more to relay on the next cycle
        let out = tick(&mut b, 0.2, nav(0.0, 0.0), vec![]);
        assert!(sent(&out, Topic::LeadPoint).is_empty());
    }

    #[test]
    fn test_queue_until_capture() {
        let mut b = midship();
        let far = ConvoyPoint::new(0.0, 10.0);

        let out = tick(
            &mut b,
            0.1,
            nav(0.0, 0.0),
            vec![Mail::to(name("a"), name("b"), Topic::LeadPoint, far.encode())],
        );
        assert!(sent(&out, Topic::LeadPoint).is_empty());
        assert_eq!(b.queue().len(), 1);

        // Steering for the point at full priority
        let obj = out.objective.unwrap();
        assert_eq!(obj.course.summit, 0.0);
        assert_eq!(obj.priority_wt, 100.0);

        // Points addressed to someone else are ignored
        tick(
            &mut b,
            0.2,
            nav(0.0, 0.0),
            vec![Mail::to(name("a"), name("c"), Topic::LeadPoint, far.encode())],
        );
        assert_eq!(b.queue().len(), 1);
    }

    #[test]
    fn test_tail_consumes() {
        let mut c = ConvoyCtrl::new(name("c"));
        tick(
            &mut c,
            0.0,
            nav(0.0, 0.0),
            vec![
                Mail::local(Topic::ContactsList, "a,b"),
                Mail::local(Topic::TaskState, "id=follow_b,bidwon"),
                fact_from("a", "a_following_*"),
                fact_from("b", "b_following_a"),
            ],
        );
        assert_eq!(c.role(), Role::Tail);

        let out = tick(
            &mut c,
            0.1,
            nav(0.0, 0.0),
            vec![Mail::to(
                name("b"),
                name("c"),
                Topic::LeadPoint,
                ConvoyPoint::new(1.0, 1.0).encode(),
            )],
        );
        assert!(sent(&out, Topic::LeadPoint).is_empty());
        assert!(c.queue().is_empty());
        assert_eq!(c.report.points_dropped, 0);
    }

    #[test]
    fn test_task_state() {
        let mut b = ConvoyCtrl::new(name("b"));

        // Bid not won yet
        let out = tick(
            &mut b,
            0.0,
            nav(0.0, 0.0),
            vec![Mail::local(Topic::TaskState, "id=follow_A,utc=12")],
        );
        assert!(sent(&out, Topic::FollowBroadcast).is_empty());
        assert_eq!(b.followed(), None);

        let out = tick(
            &mut b,
            0.1,
            nav(0.0, 0.0),
            vec![Mail::local(Topic::TaskState, "ID=FOLLOW_A,utc=13,BIDWON")],
        );
        let facts = sent(&out, Topic::FollowBroadcast);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].payload, "b_following_a");
        assert_eq!(facts[0].dest, Destination::All);
        assert_eq!(b.followed(), Some(&name("a")));

        // A bid to follow ourselves is rejected
        tick(
            &mut b,
            0.2,
            nav(0.0, 0.0),
            vec![Mail::local(Topic::TaskState, "id=follow_b,bidwon")],
        );
        assert_eq!(b.report.mail_rejected, 1);
        assert_eq!(b.followed(), Some(&name("a")));
    }

    #[test]
    fn test_leader_repost_throttled() {
        let mut p = Params::default();
        p.is_leader = true;
        p.repost_interval_s = 5.0;
        let mut a = ConvoyCtrl::with_params(name("a"), p).unwrap();

        let mut posted_at = Vec::new();
        for k in 0..120 {
            let t = k as f64 * 0.1;
            let out = tick(&mut a, t, nav(0.0, 0.0), vec![]);
            for m in sent(&out, Topic::FollowBroadcast) {
                assert_eq!(m.payload, "a_following_*");
                posted_at.push(k);
            }
        }

        assert_eq!(posted_at.len(), 3);
        assert_eq!(posted_at[0], 0);
        assert!(posted_at[1] >= 50 && posted_at[1] <= 51);
    }

    #[test]
    fn test_config_updates() {
        let mut b = midship();
        let msg = "desired_speed=0.8,bogus=1,spd_gains='0.3,0.1,0'";

        tick(
            &mut b,
            0.1,
            nav(0.0, 0.0),
            vec![Mail::local(Topic::ConvoyUpdates, msg)],
        );
        assert_eq!(b.report.config_rejected, 1);
        assert_eq!(b.params().desired_speed_ms, 0.8);
        assert_eq!(b.params().spd_gains.k_p, 0.3);

        // The same message again is ignored
        tick(
            &mut b,
            0.2,
            nav(0.0, 0.0),
            vec![Mail::local(Topic::ConvoyUpdates, msg)],
        );
        assert_eq!(b.report.config_rejected, 0);
    }

    #[test]
    fn test_invalid_objective_suppressed() {
        let mut p = Params::default();
        p.is_leader = true;
        let mut a = ConvoyCtrl::with_params(name("a"), p).unwrap();

        let out = tick(&mut a, 0.0, nav(0.0, 0.0), vec![]);
        let obj = out.objective.unwrap();
        assert_eq!(obj.priority_wt, 0.0);
        assert_eq!(obj.speed.summit, 1.2);

        // A desired speed above the speed domain cannot be expressed
        let out = tick(
            &mut a,
            0.1,
            nav(0.0, 0.0),
            vec![Mail::local(Topic::ConvoyUpdates, "desired_speed=7")],
        );
        assert!(out.objective.is_none());
        assert!(a.report.objective_invalid);

        // Mail is still posted
        assert_eq!(sent(&out, Topic::AgentInfo(name("a"))).len(), 1);
    }

    #[test]
    fn test_malformed_mail() {
        let mut b = midship();
        let out = tick(
            &mut b,
            0.1,
            nav(0.0, 0.0),
            vec![
                fact_from("c", "garbage"),
                Mail::broadcast(name("c"), Topic::Ordering, "a,,c"),
                Mail::broadcast(name("c"), Topic::Ordering, "a,c,b"),
            ],
        );

        assert_eq!(b.report.mail_rejected, 3);
        assert!(b.report.resolver_fault);
        assert_eq!(b.ordering(), &[name("a"), name("b"), name("c")]);
        assert!(out.objective.is_some());
    }

    #[test]
    fn test_follow_agent_info() {
        let mut b = midship();
        let info = AgentInfo {
            name: "a".into(),
            x: 0.0,
            y: 8.0,
            u: 1.2,
            ..Default::default()
        };

        tick(
            &mut b,
            0.1,
            nav(0.0, 0.0),
            vec![Mail::broadcast(
                name("a"),
                Topic::AgentInfo(name("a")),
                info.encode(),
            )],
        );

        let report = &b.report;
        assert!(report.active);
        assert_eq!(report.dist_to_target_m, Some(8.0));
        assert_eq!(report.heading_ref_deg, 0.0);

        // 1.2 + 0.5 * (8 - 5) + 0.2 * (1.2 - 1.0), clamped to 2
        assert_eq!(report.speed_ref_ms, 2.0);
        assert!(report.speed_limited);
    }

    #[test]
    fn test_updates_survive_leadership_fault() {
        let mut a = ConvoyCtrl::new(name("a"));
        tick(
            &mut a,
            0.0,
            nav(0.0, 0.0),
            vec![
                Mail::local(Topic::ContactsList, "b,c"),
                fact_from("b", "b_following_c"),
                fact_from("c", "c_following_b"),
            ],
        );

        // Leading completes the facts, which contain a cycle
        let msg = "is_leader=true,desired_speed=0.5";
        tick(
            &mut a,
            0.1,
            nav(0.0, 0.0),
            vec![Mail::local(Topic::ConvoyUpdates, msg)],
        );
        assert!(a.report.resolver_fault);
        assert_eq!(a.report.mail_rejected, 1);
        assert!(a.params().is_leader);
        assert_eq!(a.params().desired_speed_ms, 0.5);
    }

    #[test]
    fn test_rebid_after_leading() {
        let mut b = midship();

        tick(&mut b, 0.1, nav(0.0, 0.0), vec![Mail::local(Topic::Leader, "true")]);
        tick(&mut b, 0.2, nav(0.0, 0.0), vec![Mail::local(Topic::Leader, "false")]);
        assert_eq!(b.followed(), None);

        // Winning the same bid again restores the old place in the convoy
        let out = tick(
            &mut b,
            0.3,
            nav(0.0, 0.0),
            vec![Mail::local(Topic::TaskState, "id=follow_a,bidwon")],
        );
        let facts = sent(&out, Topic::FollowBroadcast);
        assert!(facts.iter().any(|m| m.payload == "b_following_a"));
        assert_eq!(b.followed(), Some(&name("a")));
        assert_eq!(b.role(), Role::Midship);
    }

    #[test]
    fn test_promotion_seeds_from_current_position() {
        let mut b = midship();

        tick(&mut b, 0.1, nav(0.0, 0.0), vec![Mail::local(Topic::Leader, "true")]);
        tick(&mut b, 0.2, nav(0.0, 0.0), vec![Mail::local(Topic::Leader, "false")]);

        // Travel well past the point update distance as a follower
        tick(&mut b, 5.0, nav(0.0, 20.0), vec![]);

        let out = tick(
            &mut b,
            5.1,
            nav(0.0, 20.0),
            vec![Mail::local(Topic::Leader, "true")],
        );
        assert!(!b.report.point_seeded);
        assert!(sent(&out, Topic::LeadPoint).is_empty());
        assert_eq!(b.report.odometer_m, 0.0);
    }

    #[test]
    fn test_leader_heading_wraps() {
        let mut p = Params::default();
        p.is_leader = true;
        let mut a = ConvoyCtrl::with_params(name("a"), p).unwrap();

        for (k, heading_deg) in [360.0, -10.0, 720.0].iter().enumerate() {
            let mut n = nav(0.0, 0.0);
            n.heading_deg = *heading_deg;
            let out = tick(&mut a, k as f64 * 0.1, n, vec![]);
            assert!(out.objective.is_some());
            assert!(!a.report.objective_invalid);
        }
    }

    #[test]
    fn test_invalid_nav() {
        let mut b = ConvoyCtrl::new(name("b"));
        let res = b.proc(&InputData {
            time_s: 0.0,
            nav: nav(f64::NAN, 0.0),
            mail: vec![],
        });
        assert!(matches!(res, Err(ConvoyCtrlError::InvalidNav(_))));
    }
}
