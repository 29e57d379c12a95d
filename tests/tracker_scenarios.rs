use std::collections::HashSet;

use ndarray::{array, Array1};
use strongsort::bbox::BBox;
use strongsort::{Detection, MatchOptions, TrackState, Tracker, TrackerConfig};

const FRAME_WIDTH: f32 = 640.0;

fn detection(left: f32, feature: Array1<f32>) -> Detection {
    Detection::new(BBox::ltwh(left, 100.0, 20.0, 40.0), 0.9, feature)
}

fn tracker(config: TrackerConfig) -> Tracker {
    Tracker::new(config).unwrap()
}

fn step(tracker: &mut Tracker, detections: &[Detection], opts: &MatchOptions) {
    tracker.predict();
    tracker.update(detections, opts).unwrap();
}

#[test]
fn track_confirms_after_n_init_frames() {
    let mut tracker = tracker(TrackerConfig {
        n_init: 3,
        ..TrackerConfig::default()
    });
    let opts = MatchOptions::new(FRAME_WIDTH);

    let mut states = Vec::new();
    for frame in 0..3 {
        step(
            &mut tracker,
            &[detection(100.0 + frame as f32, array![1.0, 0.0])],
            &opts,
        );
        assert_eq!(tracker.tracks().len(), 1);
        let track = &tracker.tracks()[0];
        assert_eq!(track.track_id(), 1);
        states.push(track.state());
    }

    assert_eq!(
        states,
        vec![
            TrackState::Tentative,
            TrackState::Tentative,
            TrackState::Confirmed
        ]
    );
}

#[test]
fn confirmed_track_is_removed_after_max_age() {
    let mut tracker = tracker(TrackerConfig {
        n_init: 1,
        max_age: 5,
        ..TrackerConfig::default()
    });
    let opts = MatchOptions::new(FRAME_WIDTH);

    step(&mut tracker, &[detection(100.0, array![1.0, 0.0])], &opts);
    step(&mut tracker, &[detection(100.0, array![1.0, 0.0])], &opts);
    assert!(tracker.tracks()[0].is_confirmed());

    for frame in 1..=5 {
        step(&mut tracker, &[], &opts);
        assert_eq!(tracker.tracks().len(), 1, "frame {}", frame);
        assert_eq!(tracker.tracks()[0].time_since_update(), frame);
    }

    step(&mut tracker, &[], &opts);
    assert!(tracker.tracks().is_empty());
    assert!(tracker.metric().targets().next().is_none());
}

/// Car and person tracks side by side, then a single person detection whose
/// appearance is closer to the car.
fn class_scenario(prevent_different_classes_match: bool) -> Vec<(u64, usize)> {
    let mut tracker = tracker(TrackerConfig {
        n_init: 1,
        max_cosine_distance: 0.5,
        ..TrackerConfig::default()
    });
    let opts = MatchOptions {
        frame_width: FRAME_WIDTH,
        prevent_different_classes_match,
        match_across_boundary: false,
    };

    let car = || detection(100.0, array![1.0, 0.0]).with_class(2);
    let person = || detection(102.0, array![0.0, 1.0]).with_class(0);

    step(&mut tracker, &[car(), person()], &opts);
    step(&mut tracker, &[car(), person()], &opts);
    assert!(tracker.tracks().iter().all(|t| t.is_confirmed()));

    let ids: Vec<u64> = tracker.tracks().iter().map(|t| t.track_id()).collect();
    assert_eq!(ids, vec![1, 2]);

    let stranger = detection(101.0, array![0.8, 0.6]).with_class(0);
    step(&mut tracker, &[stranger], &opts);

    tracker
        .tracks()
        .iter()
        .filter(|t| t.time_since_update() == 0)
        .map(|t| (t.track_id(), t.hits() as usize))
        .collect()
}

#[test]
fn different_classes_are_not_matched() {
    // the car track (id 1) is the cheaper candidate by appearance
    let updated = class_scenario(false);
    assert_eq!(updated, vec![(1, 3)]);

    let updated = class_scenario(true);
    assert_eq!(updated, vec![(2, 3)]);
}

#[test]
fn identities_are_unique_and_increasing() {
    let mut tracker = tracker(TrackerConfig {
        n_init: 2,
        ..TrackerConfig::default()
    });
    let opts = MatchOptions::new(FRAME_WIDTH);

    let mut seen = Vec::new();
    for frame in 0..12 {
        // objects come and go; each appears in a fresh spot every third frame
        let mut dets = vec![detection(10.0, array![1.0, 0.0])];
        if frame % 3 == 0 {
            dets.push(detection(200.0 + 50.0 * frame as f32, array![0.0, 1.0]));
        }
        step(&mut tracker, &dets, &opts);

        let live: Vec<u64> = tracker.tracks().iter().map(|t| t.track_id()).collect();
        let unique: HashSet<u64> = live.iter().copied().collect();
        assert_eq!(unique.len(), live.len());

        for id in live {
            if !seen.contains(&id) {
                if let Some(&last) = seen.last() {
                    assert!(id > last);
                }
                seen.push(id);
            }
        }
    }

    // the static object keeps its identity throughout
    assert!(tracker.tracks().iter().any(|t| t.track_id() == 1));
}

#[test]
fn deleted_tracks_never_come_back() {
    let mut tracker = tracker(TrackerConfig {
        n_init: 1,
        max_age: 2,
        ..TrackerConfig::default()
    });
    let opts = MatchOptions::new(FRAME_WIDTH);

    step(&mut tracker, &[detection(100.0, array![1.0, 0.0])], &opts);
    step(&mut tracker, &[detection(100.0, array![1.0, 0.0])], &opts);
    for _ in 0..3 {
        step(&mut tracker, &[], &opts);
    }
    assert!(tracker.tracks().is_empty());

    // same object reappears: it gets a new identity
    for _ in 0..3 {
        step(&mut tracker, &[detection(100.0, array![1.0, 0.0])], &opts);
        assert!(tracker.tracks().iter().all(|t| t.track_id() != 1));
    }
}

#[test]
fn gallery_respects_budget() {
    let mut tracker = tracker(TrackerConfig {
        n_init: 1,
        nn_budget: Some(3),
        ema: false,
        ..TrackerConfig::default()
    });
    let opts = MatchOptions::new(FRAME_WIDTH);

    for frame in 0..10 {
        let angle = frame as f32 * 0.01;
        step(
            &mut tracker,
            &[detection(100.0, array![angle.cos(), angle.sin()])],
            &opts,
        );

        for track in tracker.tracks() {
            assert!(tracker.metric().sample_count(track.track_id()) <= 3);
        }
    }

    assert_eq!(tracker.metric().sample_count(1), 3);
}

#[test]
fn occluded_track_is_recovered_by_appearance() {
    let mut tracker = tracker(TrackerConfig {
        n_init: 1,
        ..TrackerConfig::default()
    });
    let opts = MatchOptions::new(FRAME_WIDTH);

    step(&mut tracker, &[detection(100.0, array![1.0, 0.0])], &opts);
    step(&mut tracker, &[detection(100.0, array![1.0, 0.0])], &opts);

    // two frames hidden: too stale for IoU fallback, cascade must pick it up
    step(&mut tracker, &[], &opts);
    step(&mut tracker, &[], &opts);
    assert_eq!(tracker.tracks()[0].time_since_update(), 2);

    step(&mut tracker, &[detection(101.0, array![1.0, 0.05])], &opts);
    assert_eq!(tracker.tracks().len(), 1);
    assert_eq!(tracker.tracks()[0].track_id(), 1);
    assert_eq!(tracker.tracks()[0].time_since_update(), 0);
}

#[test]
fn boundary_exemption_allows_jumps_at_frame_edge() {
    let run = |match_across_boundary: bool| {
        let mut tracker = tracker(TrackerConfig {
            n_init: 1,
            ..TrackerConfig::default()
        });
        let opts = MatchOptions {
            frame_width: FRAME_WIDTH,
            prevent_different_classes_match: false,
            match_across_boundary,
        };

        step(&mut tracker, &[detection(610.0, array![1.0, 0.0])], &opts);
        step(&mut tracker, &[detection(610.0, array![1.0, 0.0])], &opts);

        // wraps around from the right edge to the left one
        step(&mut tracker, &[detection(0.0, array![1.0, 0.0])], &opts);

        tracker
            .tracks()
            .iter()
            .map(|t| t.track_id())
            .collect::<Vec<_>>()
    };

    // gated: the old track is missed and a new one is born
    assert_eq!(run(false), vec![1, 2]);
    assert_eq!(run(true), vec![1]);
}

#[test]
fn class_gate_applies_to_iou_fallback() {
    let mut tracker = tracker(TrackerConfig {
        n_init: 1,
        ..TrackerConfig::default()
    });
    let opts = MatchOptions {
        frame_width: FRAME_WIDTH,
        prevent_different_classes_match: true,
        match_across_boundary: false,
    };

    let car = || detection(100.0, array![1.0, 0.0]).with_class(2);
    let person = || detection(300.0, array![0.0, 1.0]).with_class(0);

    step(&mut tracker, &[car(), person()], &opts);
    step(&mut tracker, &[car(), person()], &opts);
    assert!(tracker.tracks().iter().all(|t| t.is_confirmed()));

    // a person right on top of the car track, far from the person track
    let walker = detection(100.0, array![0.0, 1.0]).with_class(0);
    step(&mut tracker, &[walker], &opts);

    let car_track = &tracker.tracks()[0];
    assert_eq!(car_track.class(), Some(2));
    assert_eq!(car_track.time_since_update(), 1);
    assert_eq!(car_track.hits(), 2);

    let person_track = &tracker.tracks()[1];
    assert_eq!(person_track.time_since_update(), 1);

    let newborn = &tracker.tracks()[2];
    assert_eq!(newborn.track_id(), 3);
    assert_eq!(newborn.class(), Some(0));
    assert!(newborn.is_tentative());
}
