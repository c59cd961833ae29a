//! # Convoy simulation
//!
//! Runs a group of agents, each with its own convoy controller, in a single process. Every tick
//! each agent takes its mail off the bus, runs one control cycle, posts its mail and moves its
//! vehicle. The simulation also stands in for each agent's other processes: it tells the leader
//! it is leading, gives every agent its contact list, and hands each follower the bid it won.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod bus;
pub mod vehicle;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

// Internal
use crate::convoy_ctrl::{
    ConvoyCtrl, ConvoyCtrlError, InputData, ObjectiveBuilder, Role, StatusReport,
};
use bus::{BusParams, BusStats, SimBus};
use comms_if::{
    convoy::{encode_ordering, AgentName, ConvoyMsgError},
    mail::{Mail, Topic},
};
use util::module::State;
use vehicle::{HelmCmd, LeaderRoute, SummitBuilder, Vehicle, VehicleLimits};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Simulation parameters, usually loaded from `sim.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimParams {
    /// Units: seconds
    pub cycle_period_s: f64,

    pub num_ticks: u64,

    #[serde(default)]
    pub bus: BusParams,

    #[serde(default)]
    pub vehicle: VehicleLimits,

    /// The agents, the first of which leads
    pub agents: Vec<AgentSetup>,

    /// Waypoints the leader drives through, `[x, y]` in meters
    pub leader_route: Vec<[f64; 2]>,

    /// Units: meters
    pub waypoint_radius_m: f64,
}

/// Starting state of one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSetup {
    pub name: String,
    pub x_m: f64,
    pub y_m: f64,
    pub heading_deg: f64,

    /// The agent this one wins the bid to follow, none for the leader
    #[serde(default)]
    pub follows: Option<String>,
}

pub struct Sim {
    params: SimParams,
    agents: Vec<SimAgent>,
    bus: SimBus,
    route: LeaderRoute,
    tick: u64,
}

struct SimAgent {
    ctrl: ConvoyCtrl,
    vehicle: Vehicle,
    builder: SummitBuilder,
    report: StatusReport,
    totals: AgentTotals,
}

/// Running totals of the per cycle report flags.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct AgentTotals {
    pub points_seeded: u64,
    pub points_received: u64,
    pub points_captured: u64,
    pub points_relayed: u64,
    pub points_dropped: u64,
    pub mail_rejected: u64,
    pub objective_invalid: u64,
}

/// End of run summary, saved as json.
#[derive(Debug, Clone, Serialize)]
pub struct SimSummary {
    pub ticks: u64,
    pub time_s: f64,
    pub converged: bool,
    pub agents: Vec<AgentSummary>,
    pub bus: BusStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentSummary {
    pub name: String,
    pub role: Role,
    pub ordering: String,
    pub follower: Option<String>,
    pub followed: Option<String>,
    pub x_m: f64,
    pub y_m: f64,
    pub speed_ms: f64,
    pub dist_to_target_m: Option<f64>,
    pub queue_len: usize,
    pub totals: AgentTotals,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("The simulation needs at least one agent")]
    NoAgents,

    #[error("Invalid agent name: {0}")]
    InvalidName(#[from] ConvoyMsgError),

    #[error("Agent {0} follows {1}, which is not in the simulation")]
    UnknownAgent(String, String),

    #[error("Convoy control error for {0}: {1}")]
    CtrlError(String, ConvoyCtrlError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Sim {
    /// Build the simulation, creating each agent's controller with `make_ctrl`.
    pub fn new<F>(params: SimParams, mut make_ctrl: F) -> Result<Self, SimError>
    where
        F: FnMut(AgentName) -> Result<ConvoyCtrl, ConvoyCtrlError>,
    {
        if params.agents.is_empty() {
            return Err(SimError::NoAgents);
        }

        let names = params
            .agents
            .iter()
            .map(|a| AgentName::new(&a.name))
            .collect::<Result<Vec<_>, _>>()?;

        let mut bus = SimBus::new(params.bus);
        let mut agents = Vec::with_capacity(names.len());

        for (i, (setup, name)) in params.agents.iter().zip(names.iter()).enumerate() {
            let ctrl = make_ctrl(name.clone())
                .map_err(|e| SimError::CtrlError(setup.name.clone(), e))?;

            bus.register(name.clone());

            // The first agent leads, the rest are told who they follow
            if i == 0 {
                bus.inject(name, Mail::local(Topic::Leader, "true"));
            }

            let contacts: Vec<AgentName> = names.iter().filter(|n| *n != name).cloned().collect();
            bus.inject(
                name,
                Mail::local(Topic::ContactsList, encode_ordering(&contacts)),
            );

            if let Some(ref follows) = setup.follows {
                let target = AgentName::new(follows)?;
                if !names.contains(&target) {
                    return Err(SimError::UnknownAgent(setup.name.clone(), follows.clone()));
                }
                bus.inject(
                    name,
                    Mail::local(
                        Topic::TaskState,
                        format!("id=follow_{},utc=0,bidwon", target),
                    ),
                );
            }

            agents.push(SimAgent {
                ctrl,
                vehicle: Vehicle::new(setup.x_m, setup.y_m, setup.heading_deg, params.vehicle),
                builder: SummitBuilder,
                report: StatusReport::default(),
                totals: AgentTotals::default(),
            });
        }

        info!(
            "Simulating {} agents for {} ticks",
            agents.len(),
            params.num_ticks
        );

        Ok(Self {
            route: LeaderRoute::new(&params.leader_route, params.waypoint_radius_m),
            params,
            agents,
            bus,
            tick: 0,
        })
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn time_s(&self) -> f64 {
        self.tick as f64 * self.params.cycle_period_s
    }

    /// Run one tick of every agent.
    pub fn step(&mut self) -> Result<(), SimError> {
        let time_s = self.time_s();
        let dt_s = self.params.cycle_period_s;

        for agent in self.agents.iter_mut() {
            let input = InputData {
                time_s,
                nav: agent.vehicle.nav(),
                mail: self.bus.take(agent.ctrl.name()),
            };

            let (output, report) = agent
                .ctrl
                .proc(&input)
                .map_err(|e| SimError::CtrlError(agent.ctrl.name().to_string(), e))?;

            for mail in output.mail {
                self.bus.post(mail);
            }

            // The leader's own objective carries no priority, so it drives the route
            let cmd = match (report.role, output.objective) {
                (Role::Leader, objective) => Some(HelmCmd {
                    heading_deg: self
                        .route
                        .heading_deg(&agent.vehicle.nav().position_m)
                        .unwrap_or(agent.vehicle.nav().heading_deg),
                    speed_ms: match (self.route.is_complete(), objective) {
                        (true, _) => 0.0,
                        (false, Some(o)) => o.speed.summit,
                        (false, None) => agent.vehicle.cmd().speed_ms,
                    },
                }),
                (_, Some(o)) => match agent.builder.build(&o) {
                    Ok(c) => c,
                    Err(e) => {
                        warn!("[{}] Could not build a command: {}", agent.ctrl.name(), e);
                        None
                    }
                },
                (_, None) => None,
            };

            if let Some(c) = cmd {
                agent.vehicle.set_cmd(c);
            }
            agent.vehicle.step(dt_s);

            agent.totals.add(&report);
            agent.report = report;
        }

        self.bus.route();
        self.tick += 1;

        Ok(())
    }

    /// Run the remaining ticks.
    pub fn run(&mut self) -> Result<(), SimError> {
        while self.tick < self.params.num_ticks {
            self.step()?;

            if self.tick % 100 == 0 {
                debug!(
                    "t = {:.1} s, converged: {}",
                    self.time_s(),
                    self.converged()
                );
            }
        }

        Ok(())
    }

    /// True once every agent holds the same ordering and it places every agent.
    pub fn converged(&self) -> bool {
        let first = match self.agents.first() {
            Some(a) => a.ctrl.ordering(),
            None => return false,
        };

        first.len() == self.agents.len() && self.agents.iter().all(|a| a.ctrl.ordering() == first)
    }

    /// The controller of the named agent.
    pub fn ctrl(&self, name: &str) -> Option<&ConvoyCtrl> {
        self.agents
            .iter()
            .find(|a| a.ctrl.name().as_str() == name)
            .map(|a| &a.ctrl)
    }

    /// The vehicle of the named agent.
    pub fn vehicle(&self, name: &str) -> Option<&Vehicle> {
        self.agents
            .iter()
            .find(|a| a.ctrl.name().as_str() == name)
            .map(|a| &a.vehicle)
    }

    pub fn summary(&self) -> SimSummary {
        SimSummary {
            ticks: self.tick,
            time_s: self.time_s(),
            converged: self.converged(),
            agents: self
                .agents
                .iter()
                .map(|a| {
                    let nav = a.vehicle.nav();
                    AgentSummary {
                        name: a.ctrl.name().to_string(),
                        role: a.ctrl.role(),
                        ordering: encode_ordering(a.ctrl.ordering()),
                        follower: a.ctrl.follower().map(|f| f.to_string()),
                        followed: a.ctrl.followed().map(|f| f.to_string()),
                        x_m: nav.position_m[0],
                        y_m: nav.position_m[1],
                        speed_ms: nav.speed_ms,
                        dist_to_target_m: a.report.dist_to_target_m,
                        queue_len: a.ctrl.queue().len(),
                        totals: a.totals,
                    }
                })
                .collect(),
            bus: self.bus.stats(),
        }
    }
}

impl AgentTotals {
    fn add(&mut self, report: &StatusReport) {
        self.points_seeded += report.point_seeded as u64;
        self.points_received += report.points_received as u64;
        self.points_captured += report.point_captured as u64;
        self.points_relayed += report.point_relayed as u64;
        self.points_dropped += report.points_dropped as u64;
        self.mail_rejected += report.mail_rejected as u64;
        self.objective_invalid += report.objective_invalid as u64;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::convoy_ctrl::Params;

    fn setup(name: &str, y_m: f64, follows: Option<&str>) -> AgentSetup {
        AgentSetup {
            name: name.into(),
            x_m: 0.0,
            y_m,
            heading_deg: 0.0,
            follows: follows.map(String::from),
        }
    }

    fn params(num_ticks: u64, bus: BusParams) -> SimParams {
        SimParams {
            cycle_period_s: 0.1,
            num_ticks,
            bus,
            vehicle: VehicleLimits::default(),
            agents: vec![
                setup("a", 0.0, None),
                setup("b", -6.0, Some("a")),
                setup("c", -12.0, Some("b")),
            ],
            leader_route: vec![[0.0, 500.0]],
            waypoint_radius_m: 3.0,
        }
    }

    fn sim(num_ticks: u64, bus: BusParams) -> Sim {
        Sim::new(params(num_ticks, bus), |n| {
            ConvoyCtrl::with_params(n, Params::default())
        })
        .unwrap()
    }

    fn name(s: &str) -> AgentName {
        AgentName::new(s).unwrap()
    }

    #[test]
    fn test_three_agents_converge() {
        let mut sim = sim(20, BusParams::default());
        sim.run().unwrap();

        assert!(sim.converged());

        let expected = vec![name("a"), name("b"), name("c")];
        for n in ["a", "b", "c"].iter() {
            assert_eq!(sim.ctrl(n).unwrap().ordering(), expected.as_slice());
        }

        let a = sim.ctrl("a").unwrap();
        let b = sim.ctrl("b").unwrap();
        let c = sim.ctrl("c").unwrap();

        assert_eq!(a.role(), Role::Leader);
        assert_eq!(b.role(), Role::Midship);
        assert_eq!(c.role(), Role::Tail);

        assert_eq!(a.follower(), Some(&name("b")));
        assert_eq!(b.follower(), Some(&name("c")));
        assert_eq!(c.follower(), None);
        assert_eq!(c.followed(), Some(&name("b")));
    }

    #[test]
    fn test_points_flow_down_the_convoy() {
        let mut sim = sim(600, BusParams::default());
        sim.run().unwrap();

        let summary = sim.summary();
        let totals: Vec<AgentTotals> = summary.agents.iter().map(|a| a.totals).collect();

        assert!(totals[0].points_seeded > 20);
        assert!(totals[1].points_received > 10);
        assert!(totals[1].points_relayed > 0);
        assert!(totals[2].points_received > 0);
        assert_eq!(totals[2].points_relayed, 0);

        // Everyone has moved off up the route, in order
        let y: Vec<f64> = summary.agents.iter().map(|a| a.y_m).collect();
        assert!(y[2] > 0.0);
        assert!(y[0] > y[1] && y[1] > y[2]);

        // Nothing went unexpressed
        assert!(totals.iter().all(|t| t.objective_invalid == 0));
    }

    #[test]
    fn test_converge_over_lossy_bus() {
        let mut sim = sim(
            400,
            BusParams {
                drop_every: 7,
                duplicate_every: 5,
            },
        );
        sim.run().unwrap();

        let stats = sim.summary().bus;
        assert!(stats.dropped > 0);
        assert!(stats.duplicated > 0);

        assert!(sim.converged());
        assert_eq!(
            sim.ctrl("b").unwrap().ordering(),
            &[name("a"), name("b"), name("c")]
        );
        assert_eq!(sim.ctrl("b").unwrap().follower(), Some(&name("c")));
    }

    #[test]
    fn test_unknown_bid() {
        let mut p = params(1, BusParams::default());
        p.agents[2].follows = Some("z".into());

        let res = Sim::new(p, |n| ConvoyCtrl::with_params(n, Params::default()));
        assert!(matches!(res, Err(SimError::UnknownAgent(..))));
    }

    #[test]
    fn test_shipped_params() {
        let p: SimParams =
            util::params::from_str(include_str!("../../../params/sim.toml")).unwrap();

        assert_eq!(p.agents.len(), 4);
        assert_eq!(p.agents[0].follows, None);
        assert_eq!(p.agents[3].follows.as_deref(), Some("cal"));
        assert_eq!(p.bus.drop_every, 0);

        assert!(Sim::new(p, |n| ConvoyCtrl::with_params(n, Params::default())).is_ok());
    }
}
