//! Duplicate-report detection for operator triage.
//!
//! Several people reporting the same incident produce near-identical pending
//! reports. Every pair of reports sharing an emergency type is scored by
//! geographic and temporal proximity; reports scoring at or above the
//! grouping threshold against an anchor are flagged as likely duplicates.
//!
//! The grouping is greedy and order-dependent on purpose: the first
//! unclaimed report anchors a group and claims every qualifying match, and a
//! claimed report never anchors its own group later, even if it would score
//! higher against a report processed afterwards.

use crate::api::DisasterReport;
use chrono::DateTime;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Minimum combined score for a report to join an anchor's group.
pub const GROUP_THRESHOLD: u32 = 20;

// ─────────────────────────── Scoring ───────────────────────────────────────

/// Haversine great-circle distance between two lat/lng points in kilometers.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let lat1_r = lat1.to_radians();
    let lat2_r = lat2.to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1_r.cos() * lat2_r.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_KM * c
}

/// Bucketed proximity score. Either report missing coordinates scores 0.
pub(crate) fn distance_score(a: &DisasterReport, b: &DisasterReport) -> u32 {
    let (Some(pa), Some(pb)) = (a.coordinates(), b.coordinates()) else {
        return 0;
    };
    let km = haversine_km(pa.latitude, pa.longitude, pb.latitude, pb.longitude);
    match km {
        k if k <= 0.5 => 50,
        k if k <= 1.0 => 40,
        k if k <= 2.0 => 30,
        k if k <= 5.0 => 20,
        k if k <= 10.0 => 10,
        _ => 0,
    }
}

/// Bucketed submission-time score. Either report missing a timestamp
/// scores 0.
pub(crate) fn time_score(a: &DisasterReport, b: &DisasterReport) -> u32 {
    let (Some(ta), Some(tb)) = (a.submitted_time, b.submitted_time) else {
        return 0;
    };
    let hours = (ta - tb).abs() as f64 / 3600.0;
    match hours {
        h if h <= 1.0 => 50,
        h if h <= 3.0 => 40,
        h if h <= 6.0 => 30,
        h if h <= 12.0 => 20,
        h if h <= 24.0 => 10,
        _ => 0,
    }
}

/// Combined pair score in `[0, 100]`. Symmetric. Callers only invoke this
/// for pairs sharing an emergency type.
pub fn pair_score(a: &DisasterReport, b: &DisasterReport) -> u32 {
    distance_score(a, b) + time_score(a, b)
}

fn same_type(a: &DisasterReport, b: &DisasterReport) -> bool {
    matches!(
        (&a.emergency_type, &b.emergency_type),
        (Some(x), Some(y)) if x == y
    )
}

// ─────────────────────────── Likelihood labels ─────────────────────────────

/// Presentation-only label for a pair score; plays no role in grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Likelihood {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl Likelihood {
    pub fn from_score(score: u32) -> Self {
        match score {
            80.. => Self::VeryHigh,
            60.. => Self::High,
            40.. => Self::Medium,
            20.. => Self::Low,
            _ => Self::VeryLow,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::VeryHigh => "Very High",
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
            Self::VeryLow => "Very Low",
        }
    }
}

// ─────────────────────────── Grouping ──────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ScoredDuplicate {
    pub report: DisasterReport,
    pub score: u32,
}

#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    /// The anchor: the first report of the cluster in input order.
    pub main: DisasterReport,
    /// Claimed matches, sorted by descending score.
    pub duplicates: Vec<ScoredDuplicate>,
}

impl DuplicateGroup {
    pub fn is_duplicate_group(&self) -> bool {
        !self.duplicates.is_empty()
    }
}

/// Cluster the snapshot into possible-duplicate groups.
///
/// Reports are processed in input order; each not-yet-claimed report
/// anchors a group and claims every later unclaimed report of the same
/// emergency type scoring at least [`GROUP_THRESHOLD`] against it. Reports
/// with no qualifying match come back as singleton groups. O(n²) over the
/// snapshot, which stays in the low hundreds per dashboard load.
pub fn group_duplicates(reports: &[DisasterReport]) -> Vec<DuplicateGroup> {
    let mut assigned = vec![false; reports.len()];
    let mut groups = Vec::new();

    for i in 0..reports.len() {
        if assigned[i] {
            continue;
        }
        assigned[i] = true;

        let mut matches: Vec<(usize, u32)> = Vec::new();
        for j in (i + 1)..reports.len() {
            if assigned[j] || !same_type(&reports[i], &reports[j]) {
                continue;
            }
            let score = pair_score(&reports[i], &reports[j]);
            if score >= GROUP_THRESHOLD {
                matches.push((j, score));
            }
        }

        // Stable sort: equal scores keep input order.
        matches.sort_by(|a, b| b.1.cmp(&a.1));
        for &(j, _) in &matches {
            assigned[j] = true;
        }

        groups.push(DuplicateGroup {
            main: reports[i].clone(),
            duplicates: matches
                .into_iter()
                .map(|(j, score)| ScoredDuplicate {
                    report: reports[j].clone(),
                    score,
                })
                .collect(),
        });
    }

    groups
}

// ─────────────────────────── Rendering ─────────────────────────────────────

fn summarize(report: &DisasterReport) -> String {
    let id = report.id.as_deref().unwrap_or("<no id>");
    let kind = report.emergency_type.as_deref().unwrap_or("unknown");
    let urgency = report.urgency_level.as_deref().unwrap_or("unknown");
    let place = match report.coordinates() {
        Some(p) => format!("({:.4}, {:.4})", p.latitude, p.longitude),
        None => "(no coordinates)".to_string(),
    };
    let when = report
        .submitted_time
        .and_then(|t| DateTime::from_timestamp(t, 0))
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "unknown time".to_string());
    format!("{id} {kind}/{urgency} at {place}, submitted {when}")
}

/// Operator-facing rendering: anchor first, claimed duplicates nested
/// beneath with score and likelihood label.
pub fn render_groups(groups: &[DuplicateGroup]) -> String {
    let mut out = String::new();
    for group in groups {
        if group.is_duplicate_group() {
            out.push_str(&format!(
                "Possible duplicates ({} reports):\n",
                group.duplicates.len() + 1
            ));
            out.push_str(&format!("  [anchor] {}\n", summarize(&group.main)));
            for (idx, dup) in group.duplicates.iter().enumerate() {
                out.push_str(&format!(
                    "    {}. {} [score {}, {}]\n",
                    idx + 1,
                    summarize(&dup.report),
                    dup.score,
                    Likelihood::from_score(dup.score).label()
                ));
            }
        } else {
            out.push_str(&format!("Standalone: {}\n", summarize(&group.main)));
        }
    }
    out
}
