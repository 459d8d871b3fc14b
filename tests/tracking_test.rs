use livetrack_rs::{CentroidTracker, Rect, TrackerConfig};

fn square(x: f32, y: f32) -> Rect {
    Rect::from_tlbr(x, y, x + 10.0, y + 10.0)
}

#[test]
fn test_basic_tracking() {
    let mut tracker = CentroidTracker::new(TrackerConfig::default());

    // Frame 1: two objects appear
    let out = tracker.update(&[square(10.0, 10.0), square(100.0, 100.0)]);
    assert_eq!(out.keys().copied().collect::<Vec<_>>(), vec![0, 1]);

    // Frame 2: both move a little
    let out = tracker.update(&[square(13.0, 11.0), square(104.0, 98.0)]);
    assert_eq!(out.len(), 2);
    assert_eq!(out[&0].x, 18.0);
    assert_eq!(out[&1].y, 103.0);

    // Frame 3: the first object disappears
    let out = tracker.update(&[square(106.0, 98.0)]);
    assert_eq!(out.keys().copied().collect::<Vec<_>>(), vec![1]);
    assert_eq!(tracker.get(0).map(|o| o.misses), Some(1));

    // Frame 4: it comes back close to where it left
    let out = tracker.update(&[square(14.0, 12.0), square(107.0, 99.0)]);
    assert_eq!(out.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
    assert_eq!(tracker.get(0).map(|o| o.misses), Some(0));
}

#[test]
fn test_gate_boundary_is_exclusive() {
    let mut tracker = CentroidTracker::default();
    tracker.update(&[square(10.0, 10.0)]);

    // Centre moves 49 px: 2401 < 2500, same identity
    let out = tracker.update(&[Rect::from_tlbr(59.0, 10.0, 69.0, 20.0)]);
    assert!(out.contains_key(&0));

    let mut tracker = CentroidTracker::default();
    tracker.update(&[square(10.0, 10.0)]);

    // Centre moves exactly 50 px: excluded, new identity
    let out = tracker.update(&[Rect::from_tlbr(60.0, 10.0, 70.0, 20.0)]);
    assert_eq!(out.keys().copied().collect::<Vec<_>>(), vec![1]);
    assert_eq!(tracker.get(0).map(|o| o.misses), Some(1));
}

#[test]
fn test_retired_ids_never_return() {
    let config = TrackerConfig {
        max_misses: 2,
        ..TrackerConfig::default()
    };
    let mut tracker = CentroidTracker::new(config);
    tracker.update(&[square(10.0, 10.0)]);

    for _ in 0..3 {
        tracker.update(&[]);
    }
    assert!(tracker.is_empty());

    let out = tracker.update(&[square(10.0, 10.0)]);
    assert_eq!(out.keys().copied().collect::<Vec<_>>(), vec![1]);
    assert_eq!(tracker.next_id(), 2);
}

#[test]
fn test_survives_exactly_max_misses() {
    let mut tracker = CentroidTracker::default();
    tracker.update(&[square(10.0, 10.0)]);

    for _ in 0..30 {
        tracker.update(&[]);
    }
    assert_eq!(tracker.get(0).map(|o| o.misses), Some(30));

    tracker.update(&[]);
    assert!(tracker.get(0).is_none());
}

#[test]
fn test_stationary_object_keeps_identity() {
    let mut tracker = CentroidTracker::default();
    let boxes = [square(40.0, 40.0), square(200.0, 40.0), square(40.0, 200.0)];

    let first = tracker.update(&boxes);
    for _ in 0..10 {
        assert_eq!(tracker.update(&boxes), first);
    }
    assert_eq!(tracker.len(), 3);
    assert_eq!(tracker.next_id(), 3);
}

#[test]
fn test_identities_are_per_tracker() {
    let mut a = CentroidTracker::default();
    let mut b = CentroidTracker::default();
    a.update(&[square(0.0, 0.0), square(100.0, 0.0)]);
    let out = b.update(&[square(0.0, 0.0)]);
    assert_eq!(out.keys().copied().collect::<Vec<_>>(), vec![0]);
}
