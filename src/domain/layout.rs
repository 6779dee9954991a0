use chrono::NaiveTime;
use serde::Serialize;

use crate::domain::models::Occurrence;
use crate::domain::timegrid::minutes_of;

/// Rendering window and scale for one day's timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineConfig {
    pub start_hour: u32,
    pub end_hour: u32,
    /// Pixel height of one hour row.
    pub hour_height: f32,
    pub slot_minutes: u32,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            start_hour: 6,
            end_hour: 23,
            hour_height: 72.0,
            slot_minutes: 30,
        }
    }
}

impl TimelineConfig {
    pub fn pixels_per_minute(&self) -> f32 {
        self.hour_height / 60.0
    }

    pub fn total_height(&self) -> f32 {
        (self.end_hour.saturating_sub(self.start_hour) * 60) as f32 * self.pixels_per_minute()
    }
}

/// Vertical extent of one occurrence card.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CardPosition {
    pub top: f32,
    pub height: f32,
}

/// Full placement of one occurrence card: vertical extent plus its column
/// within an overlap group. `index` refers back to the input slice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardLayout {
    pub index: usize,
    pub top: f32,
    pub height: f32,
    pub left_pct: f32,
    pub width_pct: f32,
    pub column: usize,
    pub columns: usize,
}

pub fn position(occurrence: &Occurrence, config: &TimelineConfig) -> CardPosition {
    let window_start = (config.start_hour * 60) as f32;
    let start = minutes_of(occurrence.start_time) as f32;
    let end = minutes_of(occurrence.end_time) as f32;
    CardPosition {
        top: (start - window_start) * config.hour_height / 60.0,
        height: (end - start) * config.hour_height / 60.0,
    }
}

/// Partition one day's occurrences into maximal runs of time-overlapping
/// intervals, in start-time order (stable for equal starts).
///
/// An occurrence joins the open group iff it starts strictly before the
/// latest end seen in that group; tracking the running maximum keeps nested
/// intervals in the group that encloses them. Each returned group lists
/// indices into the input slice.
pub fn overlap_groups(occurrences: &[Occurrence]) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..occurrences.len()).collect();
    order.sort_by_key(|&index| minutes_of(occurrences[index].start_time));

    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut current_group: Vec<usize> = Vec::new();
    let mut group_end: u32 = 0;

    for index in order {
        let start = minutes_of(occurrences[index].start_time);
        let end = minutes_of(occurrences[index].end_time);
        if current_group.is_empty() || start < group_end {
            current_group.push(index);
        } else {
            groups.push(std::mem::take(&mut current_group));
            current_group.push(index);
            group_end = 0;
        }
        group_end = group_end.max(end);
    }
    if !current_group.is_empty() {
        groups.push(current_group);
    }
    groups
}

/// Lay out one day's occurrences: vertical extents from the clock, equal
/// width columns within each overlap group, in group push order.
pub fn layout_day(occurrences: &[Occurrence], config: &TimelineConfig) -> Vec<CardLayout> {
    let mut cards = Vec::with_capacity(occurrences.len());
    for group in overlap_groups(occurrences) {
        let columns = group.len();
        let width_pct = 100.0 / columns as f32;
        for (column, index) in group.into_iter().enumerate() {
            let CardPosition { top, height } = position(&occurrences[index], config);
            cards.push(CardLayout {
                index,
                top,
                height,
                left_pct: column as f32 * width_pct,
                width_pct,
                column,
                columns,
            });
        }
    }
    cards
}

/// The occurrences in progress at `now` and the next upcoming one, skipping
/// completed entries. Returns indices into the input slice.
pub fn now_and_next(occurrences: &[Occurrence], now: NaiveTime) -> (Vec<usize>, Option<usize>) {
    let now_minutes = minutes_of(now);

    let current: Vec<usize> = occurrences
        .iter()
        .enumerate()
        .filter(|(_, occurrence)| {
            !occurrence.is_completed
                && now_minutes >= minutes_of(occurrence.start_time)
                && now_minutes < minutes_of(occurrence.end_time)
        })
        .map(|(index, _)| index)
        .collect();

    let next = occurrences
        .iter()
        .enumerate()
        .filter(|(_, occurrence)| {
            !occurrence.is_completed && minutes_of(occurrence.start_time) > now_minutes
        })
        .min_by_key(|(_, occurrence)| minutes_of(occurrence.start_time))
        .map(|(index, _)| index);

    (current, next)
}
