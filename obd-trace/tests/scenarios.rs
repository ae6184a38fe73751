// End-to-end filter scenarios through the Session API

use obd_trace::{
    BufferLimits, ChannelData, FilterDefinition, FilterMode, InputBindings, InputLabel, MathChannelDefinition, Point,
    RenderPoint, Session, TimeWindow,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn filter(name: &str, expr: &str, mode: FilterMode, buffer: f64) -> FilterDefinition {
    FilterDefinition::new(name, expr, InputBindings::new("a"), mode, buffer, BufferLimits::default()).unwrap()
}

fn sample(t: f64, v: f64) -> RenderPoint {
    RenderPoint::Sample(Point::new(t, v))
}

#[test]
fn show_filter_with_buffer() {
    init_logging();
    let mut session = Session::default();
    let id = session
        .add_recording(
            "ramp",
            vec![ChannelData::new("a", "", vec![0.0, 1.0, 2.0, 3.0, 4.0], vec![0.0, 1.0, 2.0, 3.0, 4.0])],
        )
        .unwrap();
    session.add_filter(filter("high", "A > 2", FilterMode::Show, 0.5)).unwrap();

    let snapshot = session.compute();
    assert_eq!(
        snapshot.visibility().mask(id, "a"),
        Some(&[false, false, false, true, true][..])
    );

    let series = snapshot.render(id, "a", None).unwrap();
    assert_eq!(series.points, vec![sample(3.0, 3.0), sample(4.0, 4.0)]);
}

#[test]
fn cross_recording_hide_respects_offsets() {
    init_logging();
    let mut session = Session::default();
    let first = session
        .add_recording(
            "first",
            vec![ChannelData::new("a", "", vec![4999.0, 5000.0, 5001.0], vec![0.0, 1.0, 0.0])],
        )
        .unwrap();
    let second = session
        .add_recording(
            "second",
            vec![ChannelData::new("a", "", vec![4499.0, 4500.0, 4501.0], vec![0.0, 0.0, 0.0])],
        )
        .unwrap();
    session.set_offset(second, 500.0).unwrap();
    session.add_filter(filter("spike", "A > 0.5", FilterMode::Hide, 0.0)).unwrap();

    let snapshot = session.compute();
    assert_eq!(snapshot.visibility().mask(first, "a"), Some(&[true, false, true][..]));
    // Base 5000 lands on local 4500 in the +500 recording
    assert_eq!(snapshot.visibility().mask(second, "a"), Some(&[true, false, true][..]));

    let series = snapshot.render(second, "a", None).unwrap();
    assert_eq!(
        series.points,
        vec![sample(4999.0, 0.0), RenderPoint::Gap, sample(5001.0, 0.0)]
    );
}

#[test]
fn stacked_filters_follow_list_order() {
    init_logging();
    let times: Vec<f64> = (0..10).map(|i| i as f64).collect();
    let mut session = Session::default();
    let id = session
        .add_recording("r", vec![ChannelData::new("a", "", times.clone(), times.clone())])
        .unwrap();

    // Bottom: hide everything below 5. Top: show exactly t=2.
    session.add_filter(filter("show_two", "A == 2", FilterMode::Show, 0.0)).unwrap();
    session.add_filter(filter("hide_low", "A < 5", FilterMode::Hide, 0.0)).unwrap();

    let mask = session.compute().visibility().mask(id, "a").unwrap().to_vec();
    let visible: Vec<usize> = mask.iter().enumerate().filter(|(_, v)| **v).map(|(i, _)| i).collect();
    assert_eq!(visible, vec![2]);

    session.filters_mut().move_down("show_two").unwrap();
    let mask = session.compute().visibility().mask(id, "a").unwrap().to_vec();
    assert!(mask.iter().all(|v| !v));

    session.filters_mut().set_enabled("show_two", false).unwrap();
    let mask = session.compute().visibility().mask(id, "a").unwrap().to_vec();
    let visible: Vec<usize> = mask.iter().enumerate().filter(|(_, v)| **v).map(|(i, _)| i).collect();
    assert_eq!(visible, (5..10).collect::<Vec<_>>());
}

#[test]
fn filters_mask_derived_channels_and_render_window() {
    init_logging();
    let mut session = Session::default();
    let id = session
        .add_recording(
            "r",
            vec![
                ChannelData::new("a", "km/h", vec![0.0, 1.0, 2.0, 3.0], vec![0.0, 50.0, 100.0, 50.0]),
                ChannelData::new("rpm", "rpm", vec![0.0, 1.5, 3.0], vec![800.0, 2500.0, 1500.0]),
            ],
        )
        .unwrap();
    session
        .add_math_channel(
            MathChannelDefinition::new("load", "", "B / max(A, 1)", InputBindings::new("a").with(InputLabel::B, "rpm"))
                .unwrap(),
        )
        .unwrap();
    session.add_filter(filter("stopped", "A < 1", FilterMode::Hide, 0.0)).unwrap();

    let snapshot = session.compute();
    let load = snapshot.render(id, "load", Some(TimeWindow::new(0.0, 2.0))).unwrap();
    // t=0 is hidden; t=1 and t=2 both take the rpm sample at 1.5s
    assert_eq!(load.points, vec![sample(1.0, 2500.0 / 50.0), sample(2.0, 2500.0 / 100.0)]);
    assert_eq!(snapshot.value_at(id, "load", 2.9).unwrap(), Some(1500.0 / 50.0));
}

#[test]
fn decimal_offset_hides_its_own_hit() {
    init_logging();
    let mut session = Session::default();
    session
        .add_recording("base", vec![ChannelData::new("a", "", vec![0.0, 0.3, 0.5], vec![0.0; 3])])
        .unwrap();
    let shifted = session
        .add_recording("shifted", vec![ChannelData::new("a", "", vec![0.1, 0.2, 0.3], vec![0.0, 1.0, 0.0])])
        .unwrap();
    session.set_offset(shifted, 0.1).unwrap();
    session.add_filter(filter("spike", "A > 0.5", FilterMode::Hide, 0.0)).unwrap();

    let snapshot = session.compute();
    assert_eq!(snapshot.visibility().mask(shifted, "a"), Some(&[true, false, true][..]));

    let series = snapshot.render(shifted, "a", None).unwrap();
    assert_eq!(series.points, vec![sample(0.2, 0.0), RenderPoint::Gap, sample(0.4, 0.0)]);
}
