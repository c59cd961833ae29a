//! # Convoy point queue
//!
//! Each follower keeps the points relayed to it in a FIFO queue and steers for the head. The
//! queue also measures how far behind the agent is, as the length of the path
//!
//! ```text
//! ownship -> p1 -> p2 -> ... -> pn -> target
//! ```
//!
//! where the target is the position of the agent being followed.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector2;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

// Internal
use comms_if::convoy::ConvoyPoint;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// FIFO of convoy points waiting to be captured.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConvoyPointQueue {
    points: VecDeque<ConvoyPoint>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ConvoyPointQueue {
    /// Add a point to the back of the queue.
    pub fn enqueue(&mut self, point: ConvoyPoint) {
        self.points.push_back(point);
    }

    /// Remove and return the head of the queue.
    pub fn dequeue(&mut self) -> Option<ConvoyPoint> {
        self.points.pop_front()
    }

    /// The point the agent is steering for.
    pub fn front(&self) -> Option<&ConvoyPoint> {
        self.points.front()
    }

    /// The most recently received point.
    pub fn back(&self) -> Option<&ConvoyPoint> {
        self.points.back()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConvoyPoint> {
        self.points.iter()
    }

    /// Dequeue the head if the ownship is closer to it than `capture_radius_m`.
    pub fn pop_captured(
        &mut self,
        ownship_m: &Vector2<f64>,
        capture_radius_m: f64,
    ) -> Option<ConvoyPoint> {
        let captured = self
            .points
            .front()
            .map_or(false, |p| p.dist_to(ownship_m) < capture_radius_m);

        if captured {
            self.points.pop_front()
        } else {
            None
        }
    }

    /// Path distance from the ownship through every queued point to the target.
    ///
    /// With an empty queue this is the straight line distance from the ownship to the target.
    pub fn dist_to_target(&self, ownship_m: &Vector2<f64>, target_m: &Vector2<f64>) -> f64 {
        let mut dist_m = 0.0;
        let mut prev = ownship_m;

        for p in self.points.iter() {
            dist_m += p.dist_to(prev);
            prev = &p.position_m;
        }

        dist_m + (target_m - prev).norm()
    }
}

impl fmt::Display for ConvoyPointQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, p) in self.points.iter().enumerate() {
            if i > 0 {
                write!(f, "^")?;
            }
            write!(f, "{}", p)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fifo() {
        let mut q = ConvoyPointQueue::default();
        assert!(q.dequeue().is_none());

        q.enqueue(ConvoyPoint::new(1.0, 0.0));
        q.enqueue(ConvoyPoint::new(2.0, 0.0));
        assert_eq!(q.len(), 2);
        assert_eq!(q.front().map(|p| p.position_m[0]), Some(1.0));
        assert_eq!(q.back().map(|p| p.position_m[0]), Some(2.0));

        assert_eq!(q.dequeue().map(|p| p.position_m[0]), Some(1.0));
        assert_eq!(q.dequeue().map(|p| p.position_m[0]), Some(2.0));
        assert!(q.is_empty());
    }

    #[test]
    fn test_dist_to_target() {
        let mut q = ConvoyPointQueue::default();
        let ownship = Vector2::new(0.0, 0.0);
        let target = Vector2::new(3.0, 4.0);

        // Empty queue collapses to the straight line
        assert_eq!(q.dist_to_target(&ownship, &target), 5.0);

        q.enqueue(ConvoyPoint::new(0.0, 4.0));
        q.enqueue(ConvoyPoint::new(0.0, 10.0));
        // 4 + 6 + sqrt(9 + 36)
        let expected = 4.0 + 6.0 + 45f64.sqrt();
        assert!((q.dist_to_target(&ownship, &target) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_pop_captured() {
        let mut q = ConvoyPointQueue::default();
        q.enqueue(ConvoyPoint::new(0.0, 3.0));
        q.enqueue(ConvoyPoint::new(0.0, 3.5));

        // Exactly on the radius is not a capture
        assert!(q.pop_captured(&Vector2::new(0.0, 0.0), 3.0).is_none());

        let p = q.pop_captured(&Vector2::new(0.0, 0.5), 3.0).unwrap();
        assert_eq!(p.position_m, Vector2::new(0.0, 3.0));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_display() {
        let mut q = ConvoyPointQueue::default();
        assert_eq!(q.to_string(), "[]");
        q.enqueue(ConvoyPoint::new(1.0, 2.0));
        q.enqueue(ConvoyPoint::new(3.0, 4.0));
        let s = q.to_string();
        assert!(s.starts_with("[{x=1,y=2}|"));
        assert_eq!(s.matches('^').count(), 1);
    }
}
