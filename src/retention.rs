//! Grandfather-father-son rotation of timestamped snapshots.
//!
//! Each timeline groups timestamps into buckets (10 minutes, hour, day,
//! week, month). Walking from newest to oldest, the oldest entry of each
//! bucket is kept until the requested number of buckets is exceeded. When a
//! timeline cannot fill its quota the oldest timestamp overall is kept too,
//! so history never shrinks below what is available. The newest timestamp is
//! always kept.

use time::PrimitiveDateTime;

use crate::model::RetentionConfig;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RetentionPlan {
    /// Newest first.
    pub keep: Vec<PrimitiveDateTime>,
    /// Newest first.
    pub prune: Vec<PrimitiveDateTime>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Timeline {
    TenMinutes,
    Hour,
    Day,
    Week,
    Month,
}

type BucketLabel = (i32, u8, u8, u8, u8);

impl Timeline {
    fn label(self, dt: PrimitiveDateTime) -> BucketLabel {
        let month = dt.month() as u8;
        match self {
            Timeline::TenMinutes => (dt.year(), month, dt.day(), dt.hour(), dt.minute() / 10),
            Timeline::Hour => (dt.year(), month, dt.day(), dt.hour(), 0),
            Timeline::Day => (dt.year(), month, dt.day(), 0, 0),
            // Weeks start on Monday; days before the first Monday of the year are week 0.
            Timeline::Week => (dt.year(), dt.date().monday_based_week(), 0, 0, 0),
            Timeline::Month => (dt.year(), month, 0, 0, 0),
        }
    }
}

pub fn grandfather_father_son(
    dts: &[PrimitiveDateTime],
    policy: &RetentionConfig,
) -> RetentionPlan {
    let mut dts = dts.to_vec();
    if dts.is_empty() {
        return RetentionPlan::default();
    }
    dts.sort_unstable_by(|a, b| b.cmp(a));

    let mut keep = vec![false; dts.len()];
    keep[0] = true;

    let timelines = [
        (Timeline::TenMinutes, policy.keep_tenminutely),
        (Timeline::Hour, policy.keep_hourly),
        (Timeline::Day, policy.keep_daily),
        (Timeline::Week, policy.keep_weekly),
        (Timeline::Month, policy.keep_monthly),
    ];

    for (timeline, need) in timelines {
        if need == 0 {
            continue;
        }
        let labels: Vec<BucketLabel> = dts.iter().map(|dt| timeline.label(*dt)).collect();
        let mut have = 0u32;
        for i in 0..labels.len() - 1 {
            if labels[i] != labels[i + 1] {
                keep[i] = true;
                have += 1;
                if have > need {
                    break;
                }
            }
        }
        if have < need
            && let Some(last) = keep.last_mut()
        {
            *last = true;
        }
    }

    let mut plan = RetentionPlan::default();
    for (dt, kept) in dts.into_iter().zip(keep) {
        if kept {
            plan.keep.push(dt);
        } else {
            plan.prune.push(dt);
        }
    }
    plan
}

#[cfg(test)]
#[path = "tests/retention_tests.rs"]
mod tests;
