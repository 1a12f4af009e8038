//! Recency buckets for the session list.
//!
//! Only sessions outside any folder are bucketed; foldered sessions are shown
//! under their folder. Boundaries are anchored to the start of the current day
//! in the caller's time zone, inclusive on the near (recent) edge.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Serialize;

use super::types::ChatSession;

/// Display buckets, most recent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DateBucket {
    #[serde(rename = "Today")]
    Today,
    #[serde(rename = "Yesterday")]
    Yesterday,
    #[serde(rename = "Last 7 Days")]
    Last7Days,
    #[serde(rename = "Last 30 Days")]
    Last30Days,
    #[serde(rename = "Older")]
    Older,
}

impl DateBucket {
    pub const ALL: [DateBucket; 5] = [
        Self::Today,
        Self::Yesterday,
        Self::Last7Days,
        Self::Last30Days,
        Self::Older,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Today => "Today",
            Self::Yesterday => "Yesterday",
            Self::Last7Days => "Last 7 Days",
            Self::Last30Days => "Last 30 Days",
            Self::Older => "Older",
        }
    }
}

impl std::fmt::Display for DateBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One non-empty bucket of the display list.
#[derive(Debug, Serialize)]
pub struct SessionGroup<'a> {
    #[serde(rename = "label")]
    pub bucket: DateBucket,
    pub sessions: Vec<&'a ChatSession>,
}

/// Lower edges of Today, Yesterday, Last 7 Days and Last 30 Days.
struct Boundaries {
    today: DateTime<Utc>,
    yesterday: DateTime<Utc>,
    week: DateTime<Utc>,
    month: DateTime<Utc>,
}

impl Boundaries {
    fn at<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        let today = start_of_day(now);
        Self {
            today,
            yesterday: today - Duration::days(1),
            week: today - Duration::days(7),
            month: today - Duration::days(30),
        }
    }

    fn bucket(&self, created_at: DateTime<Utc>) -> DateBucket {
        if created_at >= self.today {
            DateBucket::Today
        } else if created_at >= self.yesterday {
            DateBucket::Yesterday
        } else if created_at >= self.week {
            DateBucket::Last7Days
        } else if created_at >= self.month {
            DateBucket::Last30Days
        } else {
            DateBucket::Older
        }
    }
}

fn start_of_day<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| now.timezone().from_local_datetime(&midnight).earliest())
        .map(|start| start.with_timezone(&Utc))
        .unwrap_or_else(|| now.with_timezone(&Utc))
}

/// Bucket a single creation time relative to `now`.
pub fn bucket_for<Tz: TimeZone>(created_at: DateTime<Utc>, now: &DateTime<Tz>) -> DateBucket {
    Boundaries::at(now).bucket(created_at)
}

/// Group unfoldered sessions into recency buckets.
///
/// Buckets come back in [`DateBucket::ALL`] order, empty ones omitted, each
/// sorted by `created_at` descending.
pub fn group_for_display<'a, Tz: TimeZone>(
    sessions: &'a [ChatSession],
    now: &DateTime<Tz>,
) -> Vec<SessionGroup<'a>> {
    let boundaries = Boundaries::at(now);
    let mut buckets: Vec<Vec<&'a ChatSession>> = vec![Vec::new(); DateBucket::ALL.len()];

    for session in sessions.iter().filter(|s| s.folder_id.is_none()) {
        let bucket = boundaries.bucket(session.created_at);
        buckets[bucket as usize].push(session);
    }

    DateBucket::ALL
        .into_iter()
        .zip(buckets)
        .filter(|(_, sessions)| !sessions.is_empty())
        .map(|(bucket, mut sessions)| {
            sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            SessionGroup { bucket, sessions }
        })
        .collect()
}
