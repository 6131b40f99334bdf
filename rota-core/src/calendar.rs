//! Day Calendar
//!
//! Days are bounded by a fixed daily cutover at a local wall-clock time in a
//! fixed UTC offset, not by midnight UTC:
//!
//! ```text
//! day_index(t) = (next_cutover_after(t) - 1 day) / 1 day
//! ```
//!
//! A timestamp exactly on a cutover belongs to the day that starts there.
//! The schedule collaborator must use the same convention.

use crate::error::{RotaError, RotaResult};
use crate::types::DayIndex;
use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Seconds per day
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Daily cutover definition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayCutover {
    /// Local hour of the cutover (0-23)
    pub hour: u32,
    /// Local minute of the cutover (0-59)
    #[serde(default)]
    pub minute: u32,
    /// Offset of the local zone east of UTC, in seconds
    pub utc_offset_secs: i32,
}

impl Default for DayCutover {
    /// 00:00 at UTC+08:00
    fn default() -> Self {
        Self {
            hour: 0,
            minute: 0,
            utc_offset_secs: 8 * 3600,
        }
    }
}

impl DayCutover {
    pub fn new(hour: u32, minute: u32, utc_offset_secs: i32) -> Self {
        Self {
            hour,
            minute,
            utc_offset_secs,
        }
    }

    /// Validate ranges
    pub fn validate(&self) -> RotaResult<()> {
        self.offset()?;
        self.local_time()?;
        Ok(())
    }

    fn offset(&self) -> RotaResult<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_secs).ok_or_else(|| {
            RotaError::Configuration(format!(
                "UTC offset {}s out of range",
                self.utc_offset_secs
            ))
        })
    }

    fn local_time(&self) -> RotaResult<NaiveTime> {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).ok_or_else(|| {
            RotaError::Configuration(format!(
                "cutover {:02}:{:02} is not a valid time",
                self.hour, self.minute
            ))
        })
    }

    /// First cutover strictly after `at`
    pub fn next_cutover_after(&self, at: DateTime<Utc>) -> RotaResult<DateTime<Utc>> {
        let offset = self.offset()?;
        let cutover = self.local_time()?;

        let local = at.with_timezone(&offset);
        let candidate = local
            .date_naive()
            .and_time(cutover)
            .and_local_timezone(offset)
            .single()
            .ok_or_else(|| RotaError::InvalidTimestamp {
                reason: format!("no unique cutover on {}", local.date_naive()),
            })?
            .with_timezone(&Utc);

        if candidate > at {
            Ok(candidate)
        } else {
            candidate
                .checked_add_signed(Duration::days(1))
                .ok_or_else(|| RotaError::InvalidTimestamp {
                    reason: format!("cutover after {} not representable", at),
                })
        }
    }

    /// Day index of `at`
    pub fn day_index(&self, at: DateTime<Utc>) -> RotaResult<DayIndex> {
        let next = self.next_cutover_after(at)?;
        let day = (next.timestamp() - SECONDS_PER_DAY).div_euclid(SECONDS_PER_DAY);
        DayIndex::try_from(day).map_err(|_| RotaError::InvalidTimestamp {
            reason: format!("{} precedes the first indexable day", at),
        })
    }
}
