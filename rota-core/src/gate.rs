//! Schedule Gates
//!
//! Preconditions re-derived from the schedule at call time:
//! - require_open_asset: not paused, today's asset active, window open, supported
//! - require_forward_phase / require_reverse_phase
//! - require_in_lifetime: cycle within 1..=max_cycles

use crate::error::{RotaError, RotaResult};
use crate::oracle::ScheduleOracle;
use crate::types::{AssetId, Cycle};

/// Gate over a schedule oracle
pub struct ScheduleGate<'a> {
    schedule: &'a dyn ScheduleOracle,
}

impl<'a> ScheduleGate<'a> {
    pub fn new(schedule: &'a dyn ScheduleOracle) -> Self {
        Self { schedule }
    }

    /// Today's asset, if the system is live and its window is open
    pub fn require_open_asset(&self) -> RotaResult<AssetId> {
        if self.schedule.is_paused() {
            return Err(RotaError::Paused);
        }

        let today = self.schedule.today_asset();
        let asset = today.active_asset().cloned().ok_or(RotaError::NoActiveAsset)?;

        if !self.schedule.is_window_open(&asset) {
            return Err(RotaError::WindowClosed { asset });
        }
        if !self.schedule.is_asset_supported(&asset) {
            return Err(RotaError::UnsupportedAsset { asset });
        }
        Ok(asset)
    }

    pub fn require_forward_phase(&self, asset: &AssetId) -> RotaResult<()> {
        if self.schedule.is_reverse_phase(asset) {
            return Err(RotaError::ReversePhase {
                asset: asset.clone(),
            });
        }
        Ok(())
    }

    pub fn require_reverse_phase(&self, asset: &AssetId) -> RotaResult<()> {
        if !self.schedule.is_reverse_phase(asset) {
            return Err(RotaError::ForwardPhase {
                asset: asset.clone(),
            });
        }
        Ok(())
    }

    /// Current cycle of `asset`, if within its lifetime
    pub fn require_in_lifetime(&self, asset: &AssetId, max_cycles: Cycle) -> RotaResult<Cycle> {
        let cycle = self.schedule.current_cycle(asset);
        if cycle == 0 {
            return Err(RotaError::InvalidState {
                reason: format!("schedule reports cycle 0 for {}", asset),
            });
        }
        if cycle > max_cycles {
            return Err(RotaError::LifetimeExhausted {
                asset: asset.clone(),
                cycle,
                max_cycles,
            });
        }
        Ok(cycle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::TodayAsset;
    use crate::testing::FakeSchedule;

    fn asset() -> AssetId {
        AssetId::new("reward")
    }

    #[test]
    fn test_open_asset_passes() {
        let schedule = FakeSchedule::forward(asset());
        let gate = ScheduleGate::new(&schedule);
        assert_eq!(gate.require_open_asset().unwrap(), asset());
        assert!(gate.require_forward_phase(&asset()).is_ok());
        assert!(gate.require_reverse_phase(&asset()).is_err());
    }

    #[test]
    fn test_pause_checked_first() {
        let schedule = FakeSchedule::forward(asset());
        schedule.set_paused(true);
        schedule.set_window_open(&asset(), false);
        let gate = ScheduleGate::new(&schedule);
        assert_eq!(gate.require_open_asset(), Err(RotaError::Paused));
    }

    #[test]
    fn test_inactive_and_closed() {
        let schedule = FakeSchedule::forward(asset());
        let gate = ScheduleGate::new(&schedule);

        schedule.set_window_open(&asset(), false);
        assert_eq!(
            gate.require_open_asset(),
            Err(RotaError::WindowClosed { asset: asset() })
        );

        schedule.set_today(TodayAsset::none());
        assert_eq!(gate.require_open_asset(), Err(RotaError::NoActiveAsset));
    }

    #[test]
    fn test_unsupported() {
        let schedule = FakeSchedule::forward(asset());
        schedule.set_supported(&asset(), false);
        let gate = ScheduleGate::new(&schedule);
        assert_eq!(
            gate.require_open_asset(),
            Err(RotaError::UnsupportedAsset { asset: asset() })
        );
    }

    #[test]
    fn test_lifetime_bounds() {
        let schedule = FakeSchedule::forward(asset());
        let gate = ScheduleGate::new(&schedule);

        schedule.set_cycle(&asset(), 20);
        assert_eq!(gate.require_in_lifetime(&asset(), 20).unwrap(), 20);

        schedule.set_cycle(&asset(), 21);
        assert!(matches!(
            gate.require_in_lifetime(&asset(), 20),
            Err(RotaError::LifetimeExhausted { cycle: 21, .. })
        ));

        schedule.set_cycle(&asset(), 0);
        assert!(matches!(
            gate.require_in_lifetime(&asset(), 20),
            Err(RotaError::InvalidState { .. })
        ));
    }
}
