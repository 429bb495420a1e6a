//! Missed-fire computation for recurring jobs, generalizing spec.md's
//! default "most-recent-missed-fire-only" policy into the three-way
//! `MissedPolicy` knob (`Skip` / `RunOnce` / `CatchUp`).

use chrono::{DateTime, Utc};

use foreman_domain::entities::MissedPolicy;

use crate::cron::next_fire;

/// Walk forward from `anchor` counting cron fires `<= now`, bounded by
/// `max_catchup` so a long-dead job can't enumerate years of history.
/// `anchor = None` (never fired before) counts as exactly one missed
/// window — there's no natural starting point to walk from.
pub fn missed_window_count(
    cron_expr: &str,
    tz: chrono_tz::Tz,
    anchor: Option<DateTime<Utc>>,
    now: &DateTime<Utc>,
    max_catchup: usize,
) -> usize {
    let Some(anchor) = anchor else { return 1 };
    let mut count = 0usize;
    let mut cursor = anchor;
    loop {
        match next_fire(cron_expr, &cursor, tz) {
            Some(next) if next <= *now => {
                count += 1;
                cursor = next;
                if count > max_catchup {
                    break;
                }
            }
            _ => break,
        }
    }
    count
}

/// The fire times backfill should actually enqueue, given the job's
/// missed policy. `RunOnce` (the default) enqueues only the single
/// most recent missed fire, per spec.md §4.6; `Skip` drops missed
/// fires entirely once more than one has piled up; `CatchUp` enqueues
/// every missed fire up to `max_catchup`.
pub fn fires_to_enqueue(
    policy: MissedPolicy,
    cron_expr: &str,
    tz: chrono_tz::Tz,
    anchor: Option<DateTime<Utc>>,
    now: &DateTime<Utc>,
    max_catchup: usize,
) -> Vec<DateTime<Utc>> {
    let missed = missed_window_count(cron_expr, tz, anchor, now, max_catchup);
    if missed == 0 {
        return Vec::new();
    }
    match policy {
        MissedPolicy::Skip => {
            if missed > 1 {
                Vec::new()
            } else {
                vec![most_recent_fire(cron_expr, tz, anchor, now, max_catchup)]
            }
        }
        MissedPolicy::RunOnce => vec![most_recent_fire(cron_expr, tz, anchor, now, max_catchup)],
        MissedPolicy::CatchUp => all_fires(cron_expr, tz, anchor, now, missed.min(max_catchup)),
    }
}

fn most_recent_fire(
    cron_expr: &str,
    tz: chrono_tz::Tz,
    anchor: Option<DateTime<Utc>>,
    now: &DateTime<Utc>,
    max_catchup: usize,
) -> DateTime<Utc> {
    all_fires(cron_expr, tz, anchor, now, max_catchup)
        .into_iter()
        .next_back()
        .expect("missed_window_count > 0 implies at least one fire exists")
}

fn all_fires(
    cron_expr: &str,
    tz: chrono_tz::Tz,
    anchor: Option<DateTime<Utc>>,
    now: &DateTime<Utc>,
    limit: usize,
) -> Vec<DateTime<Utc>> {
    let mut fires = Vec::new();
    let mut cursor = match anchor {
        Some(a) => a,
        None => return match next_fire(cron_expr, &(*now - chrono::Duration::seconds(1)), tz) {
            Some(f) if f <= *now => vec![f],
            _ => Vec::new(),
        },
    };
    while fires.len() < limit {
        match next_fire(cron_expr, &cursor, tz) {
            Some(next) if next <= *now => {
                fires.push(next);
                cursor = next;
            }
            _ => break,
        }
    }
    fires
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, hh: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, h, hh, 0).unwrap()
    }

    #[test]
    fn never_fired_counts_as_one_missed_window() {
        let now = at(10, 0);
        assert_eq!(missed_window_count("0 * * * *", chrono_tz::UTC, None, &now, 10), 1);
    }

    #[test]
    fn hourly_job_three_hours_stale_counts_three() {
        let anchor = at(7, 0);
        let now = at(10, 5);
        assert_eq!(missed_window_count("0 * * * *", chrono_tz::UTC, Some(anchor), &now, 10), 3);
    }

    #[test]
    fn run_once_policy_enqueues_only_the_most_recent_fire() {
        let anchor = at(7, 0);
        let now = at(10, 5);
        let fires = fires_to_enqueue(MissedPolicy::RunOnce, "0 * * * *", chrono_tz::UTC, Some(anchor), &now, 10);
        assert_eq!(fires, vec![at(10, 0)]);
    }

    #[test]
    fn skip_policy_drops_multiple_missed_fires() {
        let anchor = at(7, 0);
        let now = at(10, 5);
        let fires = fires_to_enqueue(MissedPolicy::Skip, "0 * * * *", chrono_tz::UTC, Some(anchor), &now, 10);
        assert!(fires.is_empty());
    }

    #[test]
    fn skip_policy_keeps_a_single_missed_fire() {
        let anchor = at(9, 0);
        let now = at(10, 5);
        let fires = fires_to_enqueue(MissedPolicy::Skip, "0 * * * *", chrono_tz::UTC, Some(anchor), &now, 10);
        assert_eq!(fires, vec![at(10, 0)]);
    }

    #[test]
    fn catch_up_policy_enqueues_every_missed_fire() {
        let anchor = at(7, 0);
        let now = at(10, 5);
        let fires = fires_to_enqueue(MissedPolicy::CatchUp, "0 * * * *", chrono_tz::UTC, Some(anchor), &now, 10);
        assert_eq!(fires, vec![at(8, 0), at(9, 0), at(10, 0)]);
    }

    #[test]
    fn catch_up_policy_respects_max_catchup_bound() {
        let anchor = at(0, 0);
        let now = Utc.with_ymd_and_hms(2024, 6, 16, 0, 5, 0).unwrap();
        let fires = fires_to_enqueue(MissedPolicy::CatchUp, "0 * * * *", chrono_tz::UTC, Some(anchor), &now, 3);
        assert_eq!(fires.len(), 3);
    }

    #[test]
    fn no_missed_fires_enqueues_nothing() {
        let anchor = at(10, 0);
        let now = at(10, 5);
        let fires = fires_to_enqueue(MissedPolicy::CatchUp, "0 * * * *", chrono_tz::UTC, Some(anchor), &now, 10);
        assert!(fires.is_empty());
    }
}
