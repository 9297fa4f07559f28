//! Per-day declarative overrides.
//!
//! Operators can pin the starting position, schedule mid-run re-anchors,
//! upsert manual markers, cap the session at a final ayah, and ask for
//! coverage fill across a declared surah range. Override conflicts (names or
//! positions missing from the corpus) are reported and skipped, never fatal.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::corpus::{juz_for_ayah, CorpusIndex};
use crate::domain::{Marker, Quality};

/// Declarative overrides for one day's session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DayOverrides {
    pub start_surah_number: Option<u16>,
    pub start_ayah: Option<u32>,
    /// Display name of the final surah, as spelled in the corpus.
    pub final_surah: Option<String>,
    pub final_ayah: Option<u32>,
    pub start_time: Option<i64>,
    pub final_time: Option<i64>,
    pub reanchor_points: Vec<ReanchorPoint>,
    pub marker_overrides: Vec<MarkerOverride>,
}

/// An externally declared (time, surah, ayah) at which the matcher resumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReanchorPoint {
    #[serde(rename = "time")]
    pub at_time: i64,
    pub surah_number: u16,
    pub ayah: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part: Option<u32>,
}

/// Explicit start/end for one marker; applied as Manual at confidence 1.0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerOverride {
    pub surah_number: u16,
    pub ayah: u32,
    pub start_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part: Option<u32>,
}

/// Meta record of the final-ayah override application.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FinalOverrideInfo {
    pub final_surah: Option<String>,
    pub final_ayah: Option<u32>,
    pub start_time: Option<i64>,
    pub final_time: Option<i64>,
    pub markers_before: usize,
    pub markers_after: usize,
    pub inserted_terminal: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inserted_terminal_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<String>,
}

/// Meta record of one applied (or inserted) marker override.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AppliedMarkerOverride {
    pub surah_number: u16,
    pub ayah: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part: Option<u32>,
    pub start_time: i64,
    pub end_time: i64,
    pub inserted: bool,
}

/// Meta record of the surah range fill.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RangeFillInfo {
    pub surah: String,
    pub surah_number: u16,
    pub target_final_ayah: u32,
    pub added_markers: usize,
    pub fallback_step_seconds: i64,
}

impl DayOverrides {
    /// The forced acquisition start, if both halves are declared.
    pub fn forced_start(&self) -> Option<(u16, u32)> {
        match (self.start_surah_number, self.start_ayah) {
            (Some(surah), Some(ayah)) if surah > 0 && ayah > 0 => Some((surah, ayah)),
            _ => None,
        }
    }

    /// Re-anchor points applicable to `part`, sorted by time.
    pub fn reanchor_points_for_part(&self, part: Option<u32>) -> Vec<ReanchorPoint> {
        let mut points: Vec<ReanchorPoint> = self
            .reanchor_points
            .iter()
            .filter(|point| part_matches(point.part, part))
            .filter(|point| point.at_time >= 0 && point.surah_number > 0 && point.ayah > 0)
            .cloned()
            .collect();
        points.sort_by_key(|point| point.at_time);
        points
    }
}

fn part_matches(declared: Option<u32>, current: Option<u32>) -> bool {
    match declared {
        None => true,
        Some(declared) => declared == current.unwrap_or(0),
    }
}

fn sort_markers(markers: &mut [Marker]) {
    markers.sort_by_key(Marker::order_key);
}

/// Median seconds-per-ayah over consecutive marker pairs of one surah.
fn median_step(markers: &[&Marker]) -> Option<f64> {
    let mut steps: Vec<f64> = Vec::new();
    for pair in markers.windows(2) {
        let ayah_gap = pair[1].ayah as i64 - pair[0].ayah as i64;
        let time_gap = pair[1].start_time - pair[0].start_time;
        if ayah_gap > 0 && time_gap > 0 {
            steps.push(time_gap as f64 / ayah_gap as f64);
        }
    }
    if steps.is_empty() {
        return None;
    }
    steps.sort_by(|a, b| a.total_cmp(b));
    Some(steps[steps.len() / 2])
}

/// Trim markers to the declared `[start_time, final_time]` window and
/// `(final_surah, final_ayah)` bound, synthesizing a Manual terminal marker
/// when the cap names an ayah the run never reached.
pub fn apply_final_ayah_override(
    mut markers: Vec<Marker>,
    overrides: &DayOverrides,
    corpus: &CorpusIndex,
) -> (Vec<Marker>, Option<FinalOverrideInfo>) {
    let final_surah = overrides.final_surah.clone().unwrap_or_default();
    let final_ayah = overrides.final_ayah;
    let start_time = overrides.start_time;
    let final_time = overrides.final_time;

    if markers.is_empty() || (final_ayah.is_none() && start_time.is_none() && final_time.is_none())
    {
        return (markers, None);
    }

    let markers_before = markers.len();
    let final_surah_number = if final_surah.is_empty() {
        None
    } else {
        corpus.surah_number_by_name(&final_surah).or_else(|| {
            markers
                .iter()
                .find(|marker| marker.surah == final_surah)
                .map(|marker| marker.surah_number)
        })
    };

    let mut conflict = None;
    if !final_surah.is_empty() && final_surah_number.is_none() {
        conflict = Some(format!("final surah \"{final_surah}\" not found in corpus"));
        warn!(surah = %final_surah, "final-ayah override names an unknown surah");
    }

    let keep = |marker: &Marker| -> bool {
        if let Some(start) = start_time {
            if marker.start_time < start {
                return false;
            }
        }
        if let Some(end) = final_time {
            if marker.start_time > end {
                return false;
            }
        }
        let Some(final_ayah) = final_ayah else {
            return true;
        };
        if let Some(final_surah_number) = final_surah_number {
            if marker.surah_number > final_surah_number {
                return false;
            }
            if marker.surah_number < final_surah_number {
                return true;
            }
            return marker.ayah <= final_ayah;
        }
        marker.ayah <= final_ayah
    };

    let filtered: Vec<Marker> = markers.iter().filter(|m| keep(m)).cloned().collect();
    if filtered.is_empty() {
        return (markers, None);
    }
    markers = filtered;

    let mut inserted_terminal = false;
    let mut inserted_time = None;

    if let (Some(final_ayah), Some(surah_number)) = (final_ayah, final_surah_number) {
        let has_terminal = markers
            .iter()
            .any(|marker| marker.surah_number == surah_number && marker.ayah == final_ayah);
        let terminal_exists = corpus.entry_by_id(surah_number, final_ayah).is_some();
        if !terminal_exists {
            conflict = Some(format!(
                "terminal ayah {final_ayah} does not exist in surah {surah_number}"
            ));
            warn!(
                surah = surah_number,
                ayah = final_ayah,
                "final-ayah override requests a nonexistent ayah"
            );
        } else if !has_terminal {
            let mut same_surah: Vec<&Marker> = markers
                .iter()
                .filter(|marker| marker.surah_number == surah_number)
                .collect();
            same_surah.sort_by_key(|marker| (marker.ayah, marker.start_time));

            let anchor = same_surah
                .iter()
                .take_while(|marker| marker.ayah <= final_ayah)
                .last()
                .copied();
            let step_seconds = median_step(&same_surah).unwrap_or(18.0);

            let mut terminal_time = match (final_time, anchor) {
                (Some(time), _) => time,
                (None, Some(anchor)) => {
                    anchor.start_time
                        + ((final_ayah.saturating_sub(anchor.ayah)) as f64 * step_seconds).round()
                            as i64
                }
                (None, None) => markers.last().map(|m| m.start_time).unwrap_or(0),
            };
            if let Some(last) = markers.last() {
                terminal_time = terminal_time.max(last.start_time);
            }

            markers.push(Marker::point(
                terminal_time,
                final_surah.clone(),
                surah_number,
                final_ayah,
                juz_for_ayah(surah_number, final_ayah),
                Quality::Manual,
                1.0,
            ));
            sort_markers(&mut markers);
            inserted_terminal = true;
            inserted_time = Some(terminal_time);
        }
    }

    let info = FinalOverrideInfo {
        final_surah: (!final_surah.is_empty()).then_some(final_surah),
        final_ayah,
        start_time,
        final_time,
        markers_before,
        markers_after: markers.len(),
        inserted_terminal,
        inserted_terminal_time: inserted_time,
        conflict,
    };
    (markers, Some(info))
}

/// Apply explicit marker start/end overrides; upserts Manual markers at
/// confidence 1.0. Overrides naming positions outside the corpus are skipped.
pub fn apply_marker_overrides(
    mut markers: Vec<Marker>,
    overrides: &DayOverrides,
    part: Option<u32>,
    corpus: &CorpusIndex,
) -> (Vec<Marker>, Vec<AppliedMarkerOverride>) {
    let mut applied: Vec<AppliedMarkerOverride> = Vec::new();

    for item in &overrides.marker_overrides {
        if !part_matches(item.part, part) {
            continue;
        }
        let end_time = item.end_time.unwrap_or(item.start_time).max(item.start_time);

        if let Some(marker) = markers
            .iter_mut()
            .find(|marker| marker.surah_number == item.surah_number && marker.ayah == item.ayah)
        {
            marker.set_start(item.start_time);
            marker.end_time = end_time;
            marker.quality = Quality::Manual;
            marker.confidence = 1.0;
            applied.push(AppliedMarkerOverride {
                surah_number: item.surah_number,
                ayah: item.ayah,
                part,
                start_time: item.start_time,
                end_time,
                inserted: false,
            });
            continue;
        }

        let Some(entry) = corpus.entry_by_id(item.surah_number, item.ayah) else {
            warn!(
                surah = item.surah_number,
                ayah = item.ayah,
                "marker override names a position outside the corpus, skipping"
            );
            continue;
        };
        let mut marker = Marker::point(
            item.start_time,
            entry.surah.clone(),
            entry.surah_number,
            entry.ayah,
            juz_for_ayah(entry.surah_number, entry.ayah),
            Quality::Manual,
            1.0,
        );
        marker.end_time = end_time;
        markers.push(marker);
        applied.push(AppliedMarkerOverride {
            surah_number: item.surah_number,
            ayah: item.ayah,
            part,
            start_time: item.start_time,
            end_time,
            inserted: true,
        });
    }

    if !applied.is_empty() {
        sort_markers(&mut markers);
    }
    (markers, applied)
}

/// Backfill every missing ayah in `[1, final_ayah]` of the declared final
/// surah using adjacent-median pacing and linear interpolation.
pub fn fill_surah_range(
    markers: Vec<Marker>,
    overrides: &DayOverrides,
    corpus: &CorpusIndex,
) -> (Vec<Marker>, Option<RangeFillInfo>) {
    let Some(final_surah) = overrides.final_surah.clone().filter(|name| !name.is_empty()) else {
        return (markers, None);
    };
    let Some(final_ayah) = overrides.final_ayah.filter(|ayah| *ayah > 0) else {
        return (markers, None);
    };
    if markers.is_empty() {
        return (markers, None);
    }
    let Some(surah_number) = corpus.surah_number_by_name(&final_surah) else {
        warn!(surah = %final_surah, "range fill names an unknown surah, skipping");
        return (markers, None);
    };

    // Best marker per ayah within the target range.
    let mut best_by_ayah: std::collections::BTreeMap<u32, Marker> = std::collections::BTreeMap::new();
    for marker in markers
        .iter()
        .filter(|m| m.surah_number == surah_number && m.ayah <= final_ayah)
    {
        match best_by_ayah.get(&marker.ayah) {
            None => {
                best_by_ayah.insert(marker.ayah, marker.clone());
            }
            Some(existing) => {
                let better = marker.quality.rank() > existing.quality.rank()
                    || (marker.quality.rank() == existing.quality.rank()
                        && (marker.confidence > existing.confidence
                            || (marker.confidence == existing.confidence
                                && marker.start_time < existing.start_time)));
                if better {
                    best_by_ayah.insert(marker.ayah, marker.clone());
                }
            }
        }
    }
    if best_by_ayah.is_empty() {
        return (markers, None);
    }

    // Median step across adjacent known ayat, bounded to sane values.
    let mut adjacent_steps: Vec<i64> = Vec::new();
    let known: Vec<u32> = best_by_ayah.keys().copied().collect();
    for pair in known.windows(2) {
        if pair[1] != pair[0] + 1 {
            continue;
        }
        let gap = best_by_ayah[&pair[1]].start_time - best_by_ayah[&pair[0]].start_time;
        if gap > 0 && gap < 240 {
            adjacent_steps.push(gap);
        }
    }
    let fallback_step = if adjacent_steps.is_empty() {
        20
    } else {
        adjacent_steps.sort_unstable();
        adjacent_steps[adjacent_steps.len() / 2].max(6)
    };

    let mut timeline: Vec<Marker> = markers.clone();
    sort_markers(&mut timeline);
    let reciter_for_time = |target: i64, timeline: &[Marker]| -> Option<String> {
        let mut chosen = None;
        for item in timeline {
            if item.start_time <= target {
                chosen = item.reciter.clone();
            } else {
                break;
            }
        }
        chosen
    };

    let mut additions: Vec<Marker> = Vec::new();
    for ayah in 1..=final_ayah {
        if best_by_ayah.contains_key(&ayah) {
            continue;
        }
        if corpus.entry_by_id(surah_number, ayah).is_none() {
            continue;
        }

        let previous = best_by_ayah.range(..ayah).next_back().map(|(_, m)| m.clone());
        let next = if ayah < final_ayah {
            best_by_ayah
                .range(ayah + 1..=final_ayah)
                .next()
                .map(|(_, m)| m.clone())
        } else {
            None
        };

        let inferred_time = match (&previous, &next) {
            (Some(prev), Some(next))
                if next.ayah > prev.ayah && next.start_time > prev.start_time =>
            {
                let ratio =
                    (ayah - prev.ayah) as f64 / (next.ayah - prev.ayah).max(1) as f64;
                let interpolated = prev.start_time
                    + ((next.start_time - prev.start_time) as f64 * ratio).round() as i64;
                interpolated
                    .max(prev.start_time + 1)
                    .min(next.start_time - 1)
            }
            (Some(prev), _) => {
                prev.start_time + (ayah - prev.ayah) as i64 * fallback_step
            }
            (None, Some(next)) => {
                (next.start_time - (next.ayah - ayah) as i64 * fallback_step).max(0)
            }
            (None, None) => continue,
        };
        let inferred_time = match overrides.final_time {
            Some(final_time) => inferred_time.min(final_time),
            None => inferred_time,
        };

        let mut marker = Marker::point(
            inferred_time,
            final_surah.clone(),
            surah_number,
            ayah,
            juz_for_ayah(surah_number, ayah),
            Quality::Inferred,
            0.56,
        );
        marker.reciter = reciter_for_time(inferred_time, &timeline);
        best_by_ayah.insert(ayah, marker.clone());
        timeline.push(marker.clone());
        sort_markers(&mut timeline);
        additions.push(marker);
    }

    let info = RangeFillInfo {
        surah: final_surah,
        surah_number,
        target_final_ayah: final_ayah,
        added_markers: additions.len(),
        fallback_step_seconds: fallback_step,
    };

    if additions.is_empty() {
        return (markers, Some(info));
    }

    let mut merged = markers;
    merged.extend(additions);
    sort_markers(&mut merged);
    (merged, Some(info))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    fn marker(surah: u16, ayah: u32, time: i64, quality: Quality, confidence: f64) -> Marker {
        Marker::point(
            time,
            fixtures::surah_name(surah),
            surah,
            ayah,
            juz_for_ayah(surah, ayah),
            quality,
            confidence,
        )
    }

    #[test]
    fn test_forced_start() {
        let overrides = DayOverrides {
            start_surah_number: Some(2),
            start_ayah: Some(142),
            ..DayOverrides::default()
        };
        assert_eq!(overrides.forced_start(), Some((2, 142)));
        assert_eq!(DayOverrides::default().forced_start(), None);
    }

    #[test]
    fn test_reanchor_part_filtering() {
        let overrides = DayOverrides {
            reanchor_points: vec![
                ReanchorPoint {
                    at_time: 100,
                    surah_number: 2,
                    ayah: 10,
                    part: Some(1),
                },
                ReanchorPoint {
                    at_time: 50,
                    surah_number: 2,
                    ayah: 5,
                    part: None,
                },
            ],
            ..DayOverrides::default()
        };
        let for_part_1 = overrides.reanchor_points_for_part(Some(1));
        assert_eq!(for_part_1.len(), 2);
        assert_eq!(for_part_1[0].at_time, 50);
        let for_part_2 = overrides.reanchor_points_for_part(Some(2));
        assert_eq!(for_part_2.len(), 1);
    }

    #[test]
    fn test_marker_override_wins_over_inferred() {
        let corpus = fixtures::baqara_corpus();
        let markers = vec![marker(2, 255, 480, Quality::Inferred, 0.56)];
        let overrides = DayOverrides {
            marker_overrides: vec![MarkerOverride {
                surah_number: 2,
                ayah: 255,
                start_time: 500,
                end_time: Some(530),
                part: None,
            }],
            ..DayOverrides::default()
        };
        let (markers, applied) = apply_marker_overrides(markers, &overrides, None, &corpus);
        assert_eq!(markers.len(), 1);
        assert_eq!(applied.len(), 1);
        let updated = &markers[0];
        assert_eq!(updated.quality, Quality::Manual);
        assert_eq!(updated.start_time, 500);
        assert_eq!(updated.time, 500);
        assert_eq!(updated.end_time, 530);
        assert_eq!(updated.confidence, 1.0);
    }

    #[test]
    fn test_marker_override_inserts_missing_marker() {
        let corpus = fixtures::baqara_corpus();
        let markers = vec![marker(2, 2, 10, Quality::High, 0.9)];
        let overrides = DayOverrides {
            marker_overrides: vec![MarkerOverride {
                surah_number: 2,
                ayah: 4,
                start_time: 60,
                end_time: None,
                part: None,
            }],
            ..DayOverrides::default()
        };
        let (markers, applied) = apply_marker_overrides(markers, &overrides, None, &corpus);
        assert_eq!(markers.len(), 2);
        assert!(applied[0].inserted);
        let inserted = markers.iter().find(|m| m.ayah == 4).unwrap();
        assert_eq!(inserted.quality, Quality::Manual);
        assert_eq!(inserted.end_time, 60);
    }

    #[test]
    fn test_marker_override_outside_corpus_is_skipped() {
        let corpus = fixtures::baqara_corpus();
        let markers = vec![marker(2, 2, 10, Quality::High, 0.9)];
        let overrides = DayOverrides {
            marker_overrides: vec![MarkerOverride {
                surah_number: 99,
                ayah: 1,
                start_time: 60,
                end_time: None,
                part: None,
            }],
            ..DayOverrides::default()
        };
        let (markers, applied) = apply_marker_overrides(markers, &overrides, None, &corpus);
        assert_eq!(markers.len(), 1);
        assert!(applied.is_empty());
    }

    #[test]
    fn test_final_ayah_filters_and_inserts_terminal() {
        let corpus = fixtures::baqara_corpus();
        let markers = vec![
            marker(2, 2, 10, Quality::High, 0.9),
            marker(2, 3, 30, Quality::High, 0.9),
            marker(2, 6, 300, Quality::High, 0.9),
        ];
        let overrides = DayOverrides {
            final_surah: Some(fixtures::surah_name(2).to_string()),
            final_ayah: Some(5),
            ..DayOverrides::default()
        };
        let (markers, info) = apply_final_ayah_override(markers, &overrides, &corpus);
        let info = info.unwrap();
        assert!(info.inserted_terminal);
        assert!(markers.iter().all(|m| m.ayah <= 5));
        let terminal = markers.iter().find(|m| m.ayah == 5).unwrap();
        assert_eq!(terminal.quality, Quality::Manual);
        assert_eq!(terminal.confidence, 1.0);
    }

    #[test]
    fn test_time_window_filter() {
        let corpus = fixtures::baqara_corpus();
        let markers = vec![
            marker(2, 2, 10, Quality::High, 0.9),
            marker(2, 3, 30, Quality::High, 0.9),
            marker(2, 4, 500, Quality::High, 0.9),
        ];
        let overrides = DayOverrides {
            start_time: Some(20),
            final_time: Some(400),
            ..DayOverrides::default()
        };
        let (markers, info) = apply_final_ayah_override(markers, &overrides, &corpus);
        assert!(info.is_some());
        let ayat: Vec<u32> = markers.iter().map(|m| m.ayah).collect();
        assert_eq!(ayat, vec![3]);
    }

    #[test]
    fn test_range_fill_covers_missing_ayat() {
        let corpus = fixtures::baqara_corpus();
        let markers = vec![
            marker(2, 2, 20, Quality::High, 0.9),
            marker(2, 5, 80, Quality::High, 0.9),
        ];
        let overrides = DayOverrides {
            final_surah: Some(fixtures::surah_name(2).to_string()),
            final_ayah: Some(6),
            ..DayOverrides::default()
        };
        let (markers, info) = fill_surah_range(markers, &overrides, &corpus);
        let info = info.unwrap();
        assert_eq!(info.added_markers, 4);
        let ayat: Vec<u32> = markers.iter().map(|m| m.ayah).collect();
        assert_eq!(ayat, vec![1, 2, 3, 4, 5, 6]);
        assert!(markers
            .iter()
            .filter(|m| [1u32, 3, 4, 6].contains(&m.ayah))
            .all(|m| m.quality == Quality::Inferred && m.confidence == 0.56));
    }
}
