//! Periodic bucket-refresh and resource-republish scheduling.

use std::time::{Duration, Instant};

#[derive(Debug)]
/// Maintenance timing state. The actor loop serves as the scheduler: every
/// tick it asks for [decisions](Maintenance::decisions) and runs what is due.
pub struct Maintenance {
    refresh_period: Duration,
    republish_period: Duration,
    last_refresh_check: Instant,
    last_republish: Instant,
    populated: bool,
}

#[derive(Debug, PartialEq)]
/// What the current tick should do.
pub struct MaintenanceDecisions {
    /// Seed the routing table with a bootstrap lookup.
    pub should_populate: bool,
    /// Check buckets for staleness and refresh the stale ones.
    pub should_refresh: bool,
    /// Republish all locally held resources.
    pub should_republish: bool,
}

impl Maintenance {
    pub fn new(refresh_period: Duration, republish_period: Duration) -> Self {
        let now = Instant::now();

        Maintenance {
            refresh_period,
            republish_period,
            last_refresh_check: now,
            last_republish: now,
            populated: false,
        }
    }

    /// Stale buckets are checked every half refresh period, so a bucket
    /// refreshed the moment it turned stale is never older than one full
    /// period.
    pub fn refresh_staleness_threshold(&self) -> Duration {
        self.refresh_period / 2
    }

    pub fn decisions(&mut self) -> MaintenanceDecisions {
        self.decisions_at(Instant::now())
    }

    fn decisions_at(&mut self, now: Instant) -> MaintenanceDecisions {
        let should_populate = !self.populated;
        self.populated = true;

        let should_refresh =
            now.duration_since(self.last_refresh_check) >= self.refresh_staleness_threshold();
        if should_refresh {
            self.last_refresh_check = now;
        }

        let should_republish =
            now.duration_since(self.last_republish) >= self.republish_period;
        if should_republish {
            self.last_republish = now;
        }

        MaintenanceDecisions {
            should_populate,
            should_refresh,
            should_republish,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn populate_fires_exactly_once() {
        let mut maintenance =
            Maintenance::new(Duration::from_secs(60), Duration::from_secs(60));

        assert!(maintenance.decisions().should_populate);
        assert!(!maintenance.decisions().should_populate);
    }

    #[test]
    fn refresh_fires_every_half_period() {
        let mut maintenance =
            Maintenance::new(Duration::from_secs(60), Duration::from_secs(3600));
        let start = maintenance.last_refresh_check;

        assert!(!maintenance.decisions_at(start).should_refresh);
        assert!(
            !maintenance
                .decisions_at(start + Duration::from_secs(29))
                .should_refresh
        );
        assert!(
            maintenance
                .decisions_at(start + Duration::from_secs(30))
                .should_refresh
        );
        // The timer reset; another half period must pass.
        assert!(
            !maintenance
                .decisions_at(start + Duration::from_secs(31))
                .should_refresh
        );
        assert!(
            maintenance
                .decisions_at(start + Duration::from_secs(61))
                .should_refresh
        );
    }

    #[test]
    fn republish_fires_every_period() {
        let mut maintenance =
            Maintenance::new(Duration::from_secs(3600), Duration::from_secs(10));
        let start = maintenance.last_republish;

        assert!(!maintenance.decisions_at(start).should_republish);
        assert!(
            maintenance
                .decisions_at(start + Duration::from_secs(10))
                .should_republish
        );
        assert!(
            !maintenance
                .decisions_at(start + Duration::from_secs(11))
                .should_republish
        );
    }
}
