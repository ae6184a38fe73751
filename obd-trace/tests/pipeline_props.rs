use obd_trace::{
    AlignInput, AlignedInputs, Aligner, BufferLimits, Channel, ChannelData, Decimator, Expression, FilterDefinition,
    FilterEngine, FilterMode, InputBindings, InputLabel, IntervalSet, RecordingId, RenderPoint, Session, SourceKind, TimeWindow,
};
use proptest::prelude::*;

/// Strictly increasing timestamps on a quarter-second grid (exact in f64)
fn arb_times(max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(1u32..8, 0..max_len).prop_map(|steps| {
        let mut t = 0u32;
        steps
            .into_iter()
            .map(|s| {
                t += s;
                t as f64 * 0.25
            })
            .collect()
    })
}

fn arb_series(max_len: usize) -> impl Strategy<Value = (Vec<f64>, Vec<f64>)> {
    arb_times(max_len).prop_flat_map(|times| {
        let n = times.len();
        (Just(times), prop::collection::vec(-1000.0f64..1000.0, n))
    })
}

/// Strictly increasing millisecond timestamps (mostly inexact in f64)
fn arb_decimal_series(max_len: usize) -> impl Strategy<Value = (Vec<f64>, Vec<f64>)> {
    (0u32..5000, prop::collection::vec(1u32..400, 1..max_len)).prop_flat_map(|(start, steps)| {
        let mut ms = start;
        let times: Vec<f64> = steps
            .into_iter()
            .map(|s| {
                ms += s;
                ms as f64 / 1000.0
            })
            .collect();
        let n = times.len();
        (Just(times), prop::collection::vec(-100.0f64..100.0, n))
    })
}

fn channel(name: &str, times: Vec<f64>, values: Vec<f64>) -> Channel {
    Channel::new(RecordingId(0), SourceKind::Raw, ChannelData::new(name, "", times, values)).unwrap()
}

proptest! {
    #[test]
    fn alignment_identity((times, values) in arb_series(200)) {
        let a = channel("a", times, values.clone());
        let aligned = Aligner::default().align(
            AlignInput::new(InputLabel::A, &a, 0.0),
            &[AlignInput::new(InputLabel::B, &a, 0.0)],
        );
        prop_assert_eq!(aligned.column(InputLabel::A).unwrap(), &values[..]);
        prop_assert_eq!(aligned.column(InputLabel::B).unwrap(), &values[..]);
    }

    #[test]
    fn interval_union_matches_buffer_distance(
        (times, hits) in arb_times(120).prop_flat_map(|t| {
            let n = t.len();
            (Just(t), prop::collection::vec(any::<bool>(), n))
        }),
        half_steps in 0u32..12,
    ) {
        let buffer = half_steps as f64 * 0.5;
        let set = IntervalSet::from_hits(&times, &hits, buffer);

        for pair in set.intervals().windows(2) {
            prop_assert!(pair[0].end < pair[1].start, "intervals overlap or are unsorted");
        }
        for iv in set.intervals() {
            prop_assert!(iv.start <= iv.end);
        }

        let hit_times: Vec<f64> = times.iter().zip(&hits).filter(|(_, h)| **h).map(|(t, _)| *t).collect();
        let mask = set.mask(&times);
        for (t, covered) in times.iter().zip(&mask) {
            let near = hit_times.iter().any(|h| (t - h).abs() <= buffer);
            prop_assert_eq!(*covered, near, "t = {}", t);
            prop_assert_eq!(set.contains(*t), near);
        }
    }

    #[test]
    fn show_and_hide_are_complementary(
        (times, values) in arb_series(150),
        threshold in -1000i32..1000,
        half_steps in 0u32..8,
    ) {
        let expr = format!("A > {}", threshold);
        let buffer = half_steps as f64 * 0.5;
        let masks: Vec<Option<Vec<bool>>> = [FilterMode::Show, FilterMode::Hide]
            .into_iter()
            .map(|mode| {
                let mut session = Session::default();
                let id = session
                    .add_recording("r", vec![ChannelData::new("a", "", times.clone(), values.clone())])
                    .unwrap();
                let filter = FilterDefinition::new(
                    "f", &expr, InputBindings::new("a"), mode, buffer, BufferLimits::default(),
                ).unwrap();
                session.add_filter(filter).unwrap();
                session.compute().visibility().mask(id, "a").map(<[bool]>::to_vec)
            })
            .collect();

        let show = masks[0].clone().unwrap();
        let hide = masks[1].clone().unwrap();
        prop_assert_eq!(show.len(), times.len());
        for (s, h) in show.iter().zip(&hide) {
            prop_assert!(s ^ h);
        }
    }

    #[test]
    fn rolling_average_keeps_constants(
        times in arb_times(150),
        constant in -500.0f64..500.0,
        quarter_steps in 1u32..40,
    ) {
        let window = quarter_steps as f64 * 0.25;
        let expr = Expression::compile_numeric(&format!("rolling_avg(A, {})", window), &[InputLabel::A]).unwrap();
        let values = vec![constant; times.len()];
        let inputs = AlignedInputs::from_columns(times, vec![(InputLabel::A, values.clone())]);
        prop_assert_eq!(expr.evaluate(&inputs).into_numeric(), values);
    }

    #[test]
    fn decimation_is_idempotent_and_bounded(
        (times, values) in arb_series(600),
        budget in 1usize..80,
    ) {
        let Some(window) = TimeWindow::covering(&times) else {
            return Ok(());
        };
        let decimator = Decimator::new(budget);
        let mask: Vec<bool> = values.iter().map(|v| *v > -800.0).collect();

        let once = decimator.decimate_with_mask(&times, &values, Some(&mask), window);
        let twice = decimator.decimate_with_mask(&times, &values, Some(&mask), window);
        prop_assert_eq!(&once, &twice);

        let samples: Vec<_> = once.iter().filter_map(RenderPoint::point).collect();
        prop_assert!(samples.len() <= budget);
        for p in &samples {
            // Every emitted point is a visible input sample, never a synthesized one
            let i = times.iter().position(|t| *t == p.time).unwrap();
            prop_assert_eq!(values[i], p.value);
            prop_assert!(mask[i]);
        }
        prop_assert!(samples.windows(2).all(|w| w[0].time < w[1].time));
        prop_assert!(once.windows(2).all(|w| !(w[0].is_gap() && w[1].is_gap())));
    }

    #[test]
    fn every_hit_is_covered_under_decimal_offsets(
        (base_times, base_values) in arb_decimal_series(80),
        (other_times, other_values) in arb_decimal_series(80),
        offset_ms in -20_000i64..20_000,
        threshold in -50i32..50,
    ) {
        let offset = offset_ms as f64 / 1000.0;
        let mut session = Session::default();
        let base = session
            .add_recording("base", vec![ChannelData::new("a", "", base_times, base_values)])
            .unwrap();
        let other = session
            .add_recording("other", vec![ChannelData::new("a", "", other_times, other_values)])
            .unwrap();
        session.set_offset(other, offset).unwrap();

        let filter = FilterDefinition::new(
            "f", &format!("A > {}", threshold), InputBindings::new("a"), FilterMode::Hide, 0.0, BufferLimits::default(),
        ).unwrap();
        session.add_filter(filter.clone()).unwrap();

        let snapshot = session.compute();
        let unified = FilterEngine::default().unified_intervals(&filter, snapshot.recordings());
        for id in [base, other] {
            let recording = snapshot.recording(id).unwrap();
            let channel = recording.channel("a").unwrap();
            let mask = snapshot.visibility().mask(id, "a").unwrap();
            for (i, (&t, &v)) in channel.times().iter().zip(channel.values()).enumerate() {
                if v > threshold as f64 {
                    prop_assert!(unified.contains(recording.to_base_time(t)), "hit at local {} not covered", t);
                    prop_assert!(!mask[i], "hit at local {} left visible", t);
                }
            }
        }
    }
}
