//! # Display Scenarios
//!
//! Minute-by-minute runs of the clock with injected time, a recording display
//! and scripted data sources. No hardware, network or wall clock involved.

use chrono::{DateTime, Duration, Local, TimeZone};
use embedded_graphics::prelude::Size;
use image::{Rgb, RgbImage};
use paper_clock_lib::assets::Assets;
use paper_clock_lib::bitmap::Bitmap;
use paper_clock_lib::bodies::{Body, LOADING};
use paper_clock_lib::frame::{Frame, FrameOptions, FRAME_REDRAWN};
use paper_clock_lib::panel::Panel;
use paper_clock_lib::scheduler::{DisplayScheduler, Refresh, RefreshPolicy};
use paper_clock_lib::services::{DataSource, Payload, WeatherReport};
use paper_clock_lib::transport::{DisplayError, DisplayTransport};
use paper_clock_lib::{Alignment, HorizontalAlignment, VerticalAlignment};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

fn at(hour: u32, minute: u32, second: u32) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(2024, 6, 1, hour, minute, second)
        .unwrap()
}

/// Counts refresh kinds and keeps the last image shown.
#[derive(Default)]
struct Recorder {
    fulls: usize,
    partials: usize,
    cleared: usize,
    shown: Option<Bitmap>,
}

impl DisplayTransport for Recorder {
    fn init(&mut self) -> Result<(), DisplayError> {
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        self.cleared += 1;
        Ok(())
    }

    fn sleep(&mut self) -> Result<(), DisplayError> {
        Ok(())
    }

    fn set_base_image(&mut self, image: &Bitmap) -> Result<(), DisplayError> {
        self.shown = Some(image.clone());
        Ok(())
    }

    fn update_partial(&mut self, image: &Bitmap) -> Result<(), DisplayError> {
        self.shown = Some(image.clone());
        Ok(())
    }

    fn turn_on_full(&mut self) -> Result<(), DisplayError> {
        self.fulls += 1;
        Ok(())
    }

    fn turn_on_partial(&mut self) -> Result<(), DisplayError> {
        self.partials += 1;
        Ok(())
    }
}

/// Replays queued answers; `None` entries are soft misses.
struct Scripted {
    answers: VecDeque<Option<Payload>>,
    asked: Arc<Mutex<usize>>,
}

impl Scripted {
    fn new(answers: Vec<Option<Payload>>) -> (Self, Arc<Mutex<usize>>) {
        let asked = Arc::new(Mutex::new(0));
        (
            Self {
                answers: answers.into(),
                asked: Arc::clone(&asked),
            },
            asked,
        )
    }
}

impl DataSource for Scripted {
    fn fetch(&mut self) -> Option<Payload> {
        *self.asked.lock().unwrap() += 1;
        self.answers.pop_front().flatten()
    }

    fn refresh_interval(&self) -> Duration {
        Duration::minutes(10)
    }
}

fn write_slide(path: &Path, dark: bool) {
    let shade = if dark { 0 } else { 255 };
    RgbImage::from_pixel(50, 30, Rgb([shade, shade, shade]))
        .save(path)
        .unwrap();
}

fn frame_in(dir: &Path) -> Frame {
    let alignment = Alignment::default();
    let clock = Panel::clock(Size::new(82, 35), alignment, "%H:%M");
    let infos = vec![Panel::info(
        "Text",
        Size::new(168, 35),
        alignment,
        Body::text(Some("hi".into())),
    )];
    let banners = vec![Panel::banner(
        "Banner",
        Size::new(250, 20),
        alignment,
        Body::text(Some("paper clock".into())),
    )];

    Frame::new(
        FrameOptions {
            size: Size::new(250, 122),
            rotate_180: true,
            slide_interval: Duration::seconds(60),
            background: None,
        },
        clock,
        infos,
        banners,
        Assets::new(dir),
    )
    .unwrap()
}

#[test]
fn clock_panel_redraws_once_per_minute() {
    let mut clock = Panel::clock(Size::new(82, 35), Alignment::default(), "%H:%M");

    let first = clock.draw_at(at(9, 41, 0)).map(|redraw| redraw.change);
    assert_eq!(first.as_deref(), Some("Clock now displays 09:41"));

    assert!(clock.draw_at(at(9, 41, 30)).is_none());

    let next = clock.draw_at(at(9, 42, 0)).map(|redraw| redraw.change);
    assert_eq!(next.as_deref(), Some("Clock now displays 09:42"));
}

#[test]
fn slideshow_background_rotates_through_frame() {
    let dir = tempfile::tempdir().unwrap();
    write_slide(&dir.path().join("a.bmp"), true);
    write_slide(&dir.path().join("b.bmp"), false);
    let mut frame = frame_in(dir.path());

    let start = at(8, 0, 0);
    frame.draw_at(true, start).unwrap();
    assert_eq!(frame.background().name(), Some("a.bmp"));

    // Same minute, slide not due yet
    assert!(frame.draw_at(false, start + Duration::seconds(30)).is_none());

    let composition = frame.draw_at(false, start + Duration::seconds(65)).unwrap();
    assert!(composition
        .changes
        .iter()
        .any(|change| change.starts_with("Background has changed.")));
    assert_eq!(frame.background().name(), Some("b.bmp"));
}

#[test]
fn fifteen_minutes_of_clock_updates_respect_refresh_budget() {
    let dir = tempfile::tempdir().unwrap();
    let mut frame = frame_in(dir.path());
    let mut scheduler = DisplayScheduler::new(Recorder::default(), RefreshPolicy::default());
    scheduler.begin().unwrap();

    let mut kinds = Vec::new();
    for minute in 0..15 {
        let now = at(10, minute, 0);
        let composition = frame.draw_at(minute == 0, now);
        assert!(composition.is_some(), "minute {} changed nothing", minute);
        let image = composition.as_ref().map(|composition| &composition.image);
        kinds.push(scheduler.present_at(image, now).unwrap());
        assert!(scheduler.partial_count() <= 6);
    }

    let fulls: Vec<usize> = kinds
        .iter()
        .enumerate()
        .filter(|(_, kind)| **kind == Refresh::Full)
        .map(|(index, _)| index)
        .collect();
    assert_eq!(fulls, vec![0, 7, 14]);
    assert_eq!(scheduler.transport().fulls, 3);
    assert_eq!(scheduler.transport().partials, 12);
    assert_eq!(scheduler.transport().shown.as_ref(), Some(frame.image()));
}

#[test]
fn realigned_frame_is_recomposed_and_shown_in_full_on_schedule() {
    let dir = tempfile::tempdir().unwrap();
    let mut frame = frame_in(dir.path());
    let start = at(12, 0, 0);
    let before = frame.draw_at(true, start).unwrap().image;

    frame.set_alignment(Alignment::new(VerticalAlignment::Top, HorizontalAlignment::Right));
    let after = frame.draw_at(false, start + Duration::seconds(1)).unwrap();
    assert_eq!(after.changes, vec![FRAME_REDRAWN]);
    assert_ne!(after.image, before);
    assert_eq!(frame.clock().alignment().horizontal, HorizontalAlignment::Right);
    assert_eq!(frame.active_info().alignment().vertical, VerticalAlignment::Top);

    // Nothing else pending
    assert!(frame.draw_at(false, start + Duration::seconds(2)).is_none());
}

#[test]
fn soft_miss_keeps_cached_weather() {
    let report = WeatherReport {
        temperature: Some(18.0),
        conditions: Some("Clear".into()),
        unit: 'C',
        ..Default::default()
    };
    let (source, asked) = Scripted::new(vec![None, Some(Payload::Weather(report)), None]);
    let mut panel = Panel::info(
        "Weather",
        Size::new(168, 35),
        Alignment::default(),
        Body::weather(Default::default()),
    )
    .with_source(Box::new(source));

    let start = at(7, 0, 0);
    // Nothing yet: the panel shows its placeholder
    let first = panel.draw_at(start).map(|redraw| redraw.change);
    assert_eq!(first, Some(format!("Weather now displays {}", LOADING)));
    assert_eq!(*asked.lock().unwrap(), 1);

    // The miss counts as an attempt: the source waits a full interval
    assert!(panel.draw_at(start + Duration::minutes(5)).is_none());
    assert_eq!(*asked.lock().unwrap(), 1);

    let second = panel
        .draw_at(start + Duration::minutes(10))
        .map(|redraw| redraw.change);
    assert_eq!(second.as_deref(), Some("Weather now displays 18C Clear"));
    assert_eq!(*asked.lock().unwrap(), 2);

    assert!(panel.draw_at(start + Duration::minutes(15)).is_none());
    assert_eq!(*asked.lock().unwrap(), 2);

    // Due again, but the source has nothing: the cached report stays
    assert!(panel.draw_at(start + Duration::minutes(20)).is_none());
    assert_eq!(*asked.lock().unwrap(), 3);
    assert_eq!(panel.body().summary(), "18C Clear");
}

#[test]
fn drawing_twice_at_the_same_instant_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let mut frame = frame_in(dir.path());
    let now = at(15, 30, 0);

    let composed = frame.draw_at(true, now).unwrap().image;
    assert!(frame.draw_at(false, now).is_none());
    assert_eq!(frame.image(), &composed);

    // A forced draw reproduces the exact same canvas
    let again = frame.draw_at(true, now).unwrap().image;
    assert_eq!(again, composed);
}

#[test]
fn stale_display_gets_a_full_refresh_without_changes() {
    let dir = tempfile::tempdir().unwrap();
    let mut frame = frame_in(dir.path());
    let mut scheduler = DisplayScheduler::new(
        Recorder::default(),
        RefreshPolicy {
            partial_ceiling: 6,
            max_staleness: Duration::minutes(30),
        },
    );

    let start = at(1, 0, 0);
    let composition = frame.draw_at(true, start);
    let image = composition.as_ref().map(|composition| &composition.image);
    assert_eq!(scheduler.present_at(image, start).unwrap(), Refresh::Full);

    assert_eq!(
        scheduler.present_at(None, start + Duration::minutes(29)).unwrap(),
        Refresh::Skipped
    );
    assert_eq!(
        scheduler.present_at(None, start + Duration::minutes(30)).unwrap(),
        Refresh::Full
    );
    assert_eq!(scheduler.transport().shown.as_ref(), Some(frame.image()));
}
