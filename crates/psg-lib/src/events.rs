use crate::signal::{ClippedEvent, EventAnnotation, Window};

/// Restrict one event to a window, or `None` when they do not intersect.
pub fn clip(event: &EventAnnotation, window: &Window) -> Option<ClippedEvent> {
    if !window.overlaps(event.start, event.end) {
        return None;
    }
    Some(ClippedEvent {
        start: event.start.max(window.start),
        end: event.end.min(window.end),
        label: event.label.clone(),
        stage: event.stage.clone(),
    })
}

/// Every event intersecting `window` (closed intervals), clipped to it, in the
/// order the events were supplied.
pub fn associate(events: &[EventAnnotation], window: &Window) -> Vec<ClippedEvent> {
    events.iter().filter_map(|e| clip(e, window)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Timestamp;
    use chrono::{Duration, NaiveDate};

    fn t(sec: i64) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(1, 0, 0))
            .unwrap()
            + Duration::seconds(sec)
    }

    fn event(from: i64, to: i64, label: &str) -> EventAnnotation {
        EventAnnotation::new(t(from), t(to), label, "N2").unwrap()
    }

    fn window(from: i64, to: i64) -> Window {
        Window {
            start: t(from),
            end: t(to),
        }
    }

    #[test]
    fn event_spanning_boundary_is_split() {
        let events = vec![event(240, 360, "Obstructive Apnea")];
        let first = associate(&events, &window(0, 300));
        let second = associate(&events, &window(300, 600));
        assert_eq!(first.len(), 1);
        assert_eq!((first[0].start, first[0].end), (t(240), t(300)));
        assert_eq!(second.len(), 1);
        assert_eq!((second[0].start, second[0].end), (t(300), t(360)));
        assert_eq!(second[0].label, "Obstructive Apnea");
    }

    #[test]
    fn events_outside_window_are_excluded() {
        let events = vec![event(0, 50, "before"), event(700, 720, "after")];
        assert!(associate(&events, &window(100, 400)).is_empty());
    }

    #[test]
    fn touching_endpoints_count_as_overlap() {
        let events = vec![event(50, 100, "touch-start"), event(400, 410, "touch-end")];
        let clipped = associate(&events, &window(100, 400));
        assert_eq!(clipped.len(), 2);
        assert_eq!(clipped[0].start, clipped[0].end);
        assert_eq!(clipped[1].start, t(400));
    }

    #[test]
    fn order_is_stable_and_overlaps_are_kept() {
        let events = vec![
            event(200, 260, "Hypopnea"),
            event(10, 30, "Central Apnea"),
            event(200, 260, "Hypopnea"),
        ];
        let clipped = associate(&events, &window(0, 300));
        let labels: Vec<&str> = clipped.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, ["Hypopnea", "Central Apnea", "Hypopnea"]);
    }

    #[test]
    fn clipped_range_stays_inside_window_and_event() {
        let events: Vec<EventAnnotation> = (0..40)
            .map(|i| event(i * 37 - 200, i * 37 - 200 + (i % 7) * 90, "e"))
            .collect();
        for w in [window(0, 300), window(300, 600), window(600, 900)] {
            for (c, e) in events
                .iter()
                .filter_map(|e| clip(e, &w).map(|c| (c, e)))
            {
                assert!(w.start <= c.start && c.start <= c.end && c.end <= w.end);
                assert!(c.start >= e.start && c.end <= e.end);
            }
        }
    }
}
