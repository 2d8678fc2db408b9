use crate::models::{Point, Report, Selection, Target, TrackingMode, TrackingPolicy};

/// Picks the primary target and the count the global endpoint should see.
///
/// Multi mode reports every present target and uses the first present slot as
/// primary. Single mode keeps one target: the nearest one in front of the
/// sensor (smallest positive Y), else the one closest to the sensor line
/// (smallest |Y|). Ties keep the earlier slot.
pub fn select(report: &Report, policy: &TrackingPolicy) -> Selection {
    match policy.mode {
        TrackingMode::Multi => Selection {
            selected: report.present_targets().next().copied().unwrap_or_default(),
            effective_count: report.target_count,
        },
        TrackingMode::Single => match nearest_target(report) {
            Some(target) => Selection { selected: *target, effective_count: 1 },
            None => Selection::default(),
        },
    }
}

fn nearest_target(report: &Report) -> Option<&Target> {
    let in_front = report
        .present_targets()
        .filter(|t| t.y_mm > 0)
        // min_by_key returns the first minimum.
        .min_by_key(|t| t.y_mm);
    in_front.or_else(|| {
        report
            .present_targets()
            .min_by_key(|t| i32::from(t.y_mm).abs())
    })
}

/// Points the zone evaluator should test for this selection.
pub fn zone_points(report: &Report, selection: &Selection, policy: &TrackingPolicy) -> Vec<Point> {
    match policy.mode {
        TrackingMode::Multi => report.present_targets().map(Target::position).collect(),
        TrackingMode::Single if selection.effective_count > 0 => vec![selection.selected.position()],
        TrackingMode::Single => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(x_mm: i16, y_mm: i16) -> Target {
        Target { present: true, x_mm, y_mm, speed: 0 }
    }

    fn report(targets: [Target; 3]) -> Report {
        let count = targets.iter().filter(|t| t.present).count() as u8;
        Report { targets, target_count: count, occupied: count > 0 }
    }

    fn single() -> TrackingPolicy {
        TrackingPolicy { mode: TrackingMode::Single, ..TrackingPolicy::default() }
    }

    #[test]
    fn single_tie_keeps_first_slot() {
        let r = report([target(10, 200), target(20, 200), Target::default()]);
        let s = select(&r, &single());
        assert_eq!(s.selected.x_mm, 10);
        assert_eq!(s.effective_count, 1);
    }

    #[test]
    fn single_prefers_smallest_positive() {
        let r = report([target(1, -100), target(2, 50), Target::default()]);
        assert_eq!(select(&r, &single()).selected.y_mm, 50);
    }

    #[test]
    fn single_falls_back_to_smallest_magnitude() {
        let r = report([target(1, -100), target(2, -300), Target::default()]);
        assert_eq!(select(&r, &single()).selected.y_mm, -100);
    }

    #[test]
    fn single_skips_absent_slots() {
        let r = report([Target::default(), Target::default(), target(7, 900)]);
        let s = select(&r, &single());
        assert_eq!(s.selected.x_mm, 7);
        assert_eq!(zone_points(&r, &s, &single()), vec![Point::new(7, 900)]);
    }

    #[test]
    fn single_with_no_targets_is_empty() {
        let r = Report::default();
        let s = select(&r, &single());
        assert_eq!(s, Selection::default());
        assert!(zone_points(&r, &s, &single()).is_empty());
    }

    #[test]
    fn multi_counts_all_present() {
        let policy = TrackingPolicy::default();
        let r = report([Target::default(), target(5, 400), target(6, 100)]);
        let s = select(&r, &policy);
        assert_eq!(s.effective_count, 2);
        assert_eq!(s.selected.x_mm, 5);
        assert_eq!(
            zone_points(&r, &s, &policy),
            vec![Point::new(5, 400), Point::new(6, 100)]
        );
    }
}
