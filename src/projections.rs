use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::{LogEntry, Timing};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Level;

    fn log(activity: &str, timing: Timing, energy: u8, focus: u8) -> LogEntry {
        LogEntry {
            timestamp: format!("{activity}-{energy}-{focus}"),
            activity: activity.to_string(),
            timing,
            energy: Level::new(energy).unwrap(),
            focus: Level::new(focus).unwrap(),
        }
    }

    #[test]
    fn test_activity_stats_basic() {
        let logs = vec![
            log("focus", Timing::After, 8, 9),
            log("meal", Timing::Before, 4, 5),
            log("focus", Timing::Before, 6, 7),
            log("exercise", Timing::After, 9, 6),
        ];

        let stats = LogProjector::activity_stats(&logs);
        assert_eq!(stats.len(), 3);
        assert_eq!(stats[0].activity, "focus");
        assert_eq!(stats[0].count, 2);
        assert_eq!(stats[0].percentage, 50.0);
        assert_eq!(stats[0].mean_energy, 7.0);
        assert_eq!(stats[0].mean_focus, 8.0);
        assert_eq!(stats[0].before, 1);
        assert_eq!(stats[0].after, 1);

        // Ties ordered by name
        assert_eq!(stats[1].activity, "exercise");
        assert_eq!(stats[2].activity, "meal");
    }

    #[test]
    fn test_activity_stats_empty_log() {
        assert!(LogProjector::activity_stats(&[]).is_empty());
    }

    #[test]
    fn test_stats_serialize() {
        let stats = LogProjector::activity_stats(&[log("meal", Timing::After, 5, 5)]);
        let json = serde_json::to_value(&stats).unwrap();
        let parsed: Vec<ActivityStats> = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, stats);
    }
}

/// Per-activity summary of the tracker log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityStats {
    pub activity: String,
    pub count: usize,
    pub percentage: f64,
    pub mean_energy: f64,
    pub mean_focus: f64,
    pub before: usize,
    pub after: usize,
}

#[derive(Default)]
struct Totals {
    count: usize,
    energy: u32,
    focus: u32,
    before: usize,
    after: usize,
}

/// Derives views from log entries. The log itself is never modified.
pub struct LogProjector;

impl LogProjector {
    /// Most logged activity first; ties by name.
    pub fn activity_stats(logs: &[LogEntry]) -> Vec<ActivityStats> {
        let mut totals: HashMap<&str, Totals> = HashMap::new();
        for log in logs {
            let entry = totals.entry(log.activity.as_str()).or_default();
            entry.count += 1;
            entry.energy += u32::from(log.energy.get());
            entry.focus += u32::from(log.focus.get());
            match log.timing {
                Timing::Before => entry.before += 1,
                Timing::After => entry.after += 1,
            }
        }

        let total = logs.len();
        let mut stats: Vec<ActivityStats> = totals
            .into_iter()
            .map(|(activity, t)| ActivityStats {
                activity: activity.to_string(),
                count: t.count,
                percentage: (t.count as f64 / total as f64) * 100.0,
                mean_energy: t.energy as f64 / t.count as f64,
                mean_focus: t.focus as f64 / t.count as f64,
                before: t.before,
                after: t.after,
            })
            .collect();

        stats.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.activity.cmp(&b.activity)));
        stats
    }
}
