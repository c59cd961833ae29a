//! # Point relay
//!
//! The leader seeds a new convoy point every time its odometer passes the point update distance
//! and sends it to its follower. Each follower passes the points it captures on to its own
//! follower unchanged, so the leader's trajectory travels down the convoy.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::debug;

// Internal
use super::nav::{NavState, Odometer};
use comms_if::{
    convoy::{AgentName, ConvoyPoint},
    mail::{Mail, Topic},
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Metadata key holding the number of points the leader had seeded before this one.
pub const POINT_ID_KEY: &str = "id";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Seeds convoy points on the leader.
#[derive(Debug, Clone, Default)]
pub struct LeaderSeeder {
    odometer: Odometer,
    seeded_points: u64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl LeaderSeeder {
    pub fn new(odometry_eps_m: f64) -> Self {
        Self {
            odometer: Odometer::new(odometry_eps_m),
            seeded_points: 0,
        }
    }

    /// Advance the odometer and seed a point if the leader has travelled far enough.
    ///
    /// The point is stamped with the leader's state and an `id` entry counting the points seeded
    /// so far. The odometer restarts from zero after each seed.
    pub fn update(
        &mut self,
        nav: &NavState,
        heading_rate_degs: f64,
        time_s: f64,
        point_update_distance_m: f64,
    ) -> Option<ConvoyPoint> {
        if self.odometer.update(&nav.position_m) < point_update_distance_m {
            return None;
        }

        let mut point = ConvoyPoint::new(nav.position_m[0], nav.position_m[1]);
        point.seed_time_s = time_s;
        point.leader_heading_deg = nav.heading_deg;
        point.leader_heading_rate_degs = heading_rate_degs;
        point.leader_speed_ms = nav.speed_ms;

        // The id is a plain integer so it always passes metadata validation
        if let Err(e) = point.insert_meta(POINT_ID_KEY, self.seeded_points.to_string()) {
            debug!("Could not stamp point id: {}", e);
        }

        self.odometer.reset();
        self.seeded_points += 1;

        Some(point)
    }

    /// Start measuring afresh from the next position, keeping the point count.
    pub fn restart(&mut self) {
        self.odometer.restart();
    }

    /// Distance travelled since the last seed.
    pub fn odometer_m(&self) -> f64 {
        self.odometer.accum_m()
    }

    pub fn seeded_points(&self) -> u64 {
        self.seeded_points
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Build the mail sending `point` to the follower.
///
/// Returns `None`, and the point is dropped, if the follower is not known yet.
pub fn lead_point_mail(
    own_name: &AgentName,
    follower: Option<&AgentName>,
    point: &ConvoyPoint,
) -> Option<Mail> {
    match follower {
        Some(f) => Some(Mail::to(
            own_name.clone(),
            f.clone(),
            Topic::LeadPoint,
            point.encode(),
        )),
        None => {
            debug!("No follower known, dropping point {}", point);
            None
        }
    }
}

/// Build a local visualisation marker for a point.
///
/// Active markers show queued points, inactive ones the points which have been captured.
pub fn view_point_mail(point: &ConvoyPoint, active: bool) -> Mail {
    let mut spec = format!(
        "x={},y={},active={}",
        point.position_m[0], point.position_m[1], active
    );
    if let Some(id) = point.meta(POINT_ID_KEY) {
        spec.push_str(&format!(",label={}", id));
    }

    Mail::local(Topic::ViewPoint, spec)
}

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::mail::Destination;
    use nalgebra::Vector2;

    fn nav_at(y: f64) -> NavState {
        NavState {
            position_m: Vector2::new(0.0, y),
            heading_deg: 0.0,
            speed_ms: 2.5,
        }
    }

    #[test]
    fn test_seeding_interval() {
        let mut seeder = LeaderSeeder::new(0.01);
        let mut points = Vec::new();

        // 0.25 m steps up to 3.25 m
        for k in 0..=13 {
            let t = k as f64 * 0.1;
            if let Some(p) = seeder.update(&nav_at(k as f64 * 0.25), 0.5, t, 1.0) {
                points.push(p);
            }
        }

        assert_eq!(points.len(), 3);
        assert_eq!(seeder.seeded_points(), 3);
        assert_eq!(seeder.odometer_m(), 0.25);

        let ys: Vec<f64> = points.iter().map(|p| p.position_m[1]).collect();
        assert_eq!(ys, vec![1.0, 2.0, 3.0]);

        let ids: Vec<&str> = points.iter().filter_map(|p| p.meta(POINT_ID_KEY)).collect();
        assert_eq!(ids, vec!["0", "1", "2"]);

        assert!(points
            .windows(2)
            .all(|w| w[0].seed_time_s < w[1].seed_time_s));
        assert!(points.iter().all(|p| p.leader_speed_ms == 2.5));
        assert!(points.iter().all(|p| p.leader_heading_rate_degs == 0.5));
    }

    #[test]
    fn test_seeder_restart() {
        let mut seeder = LeaderSeeder::new(0.01);
        assert!(seeder.update(&nav_at(0.0), 0.0, 0.0, 1.0).is_none());
        assert!(seeder.update(&nav_at(1.0), 0.0, 0.1, 1.0).is_some());

        // Travelling while not seeding is forgotten
        seeder.restart();
        assert!(seeder.update(&nav_at(40.0), 0.0, 5.0, 1.0).is_none());
        assert_eq!(seeder.odometer_m(), 0.0);

        let p = seeder.update(&nav_at(41.0), 0.0, 5.1, 1.0).unwrap();
        assert_eq!(p.meta(POINT_ID_KEY), Some("1"));
    }

    #[test]
    fn test_lead_point_mail() {
        let a = AgentName::new("a").unwrap();
        let b = AgentName::new("b").unwrap();
        let p = ConvoyPoint::new(1.0, 2.0);

        assert!(lead_point_mail(&a, None, &p).is_none());

        let mail = lead_point_mail(&a, Some(&b), &p).unwrap();
        assert_eq!(mail.dest, Destination::Agent(b));
        assert_eq!(mail.topic, Topic::LeadPoint);
        assert_eq!(ConvoyPoint::decode(&mail.payload), p);
    }

    #[test]
    fn test_view_point_mail() {
        let mut p = ConvoyPoint::new(1.5, -2.0);
        p.insert_meta(POINT_ID_KEY, "4").unwrap();

        let mail = view_point_mail(&p, false);
        assert_eq!(mail.dest, Destination::Local);
        assert_eq!(mail.payload, "x=1.5,y=-2,active=false,label=4");
    }
}
