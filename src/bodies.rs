//! # Panel Bodies
//!
//! A body is the content half of a panel: the cached data it shows and the
//! layout code that puts that data on the canvas. Bodies never fetch anything
//! and never decide *when* to draw; [`crate::panel::Panel`] does that. They only
//! answer three questions:
//!
//! - did this payload (or this clock tick) materially change what is shown?
//! - what does the body look like on a blank canvas?
//! - how do we describe the current content in one line?
//!
//! Missing data renders the `loading...` placeholder and text that would run
//! past the panel edge is cut short with `...`.

use crate::bitmap::Bitmap;
use crate::services::{ActivitySummary, Payload, WeatherReport};
use chrono::{DateTime, Local};
use embedded_graphics::{
    mono_font::{ascii::FONT_6X10, MonoFont, MonoTextStyle},
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::Rectangle,
    text::{Baseline, Text},
};
use std::borrow::Cow;
use std::collections::HashMap;
use tracing::warn;

/// Placeholder shown until a body has data.
pub const LOADING: &str = "loading...";

/// Face of the date panel, e.g. "Mon 03 Mar".
pub const DATE_FORMAT: &str = "%a %d %b";

/// Icon codes of the Visual Crossing `icons1` set.
pub const WEATHER_ICONS: [&str; 10] = [
    "snow",
    "rain",
    "fog",
    "wind",
    "cloudy",
    "partly-cloudy-day",
    "partly-cloudy-night",
    "clear-day",
    "clear-night",
    "thunder-rain",
];

const ELLIPSIS: &str = "...";
const PADDING: u32 = 3;

/// Content and layout of one panel.
#[derive(Debug, Clone)]
pub enum Body {
    /// Current time in `format`
    Clock { format: String, shown: Option<String> },
    /// Free text, set by command or by a text source
    Text { text: Option<String> },
    /// Today's date
    Date { shown: Option<String> },
    /// Current conditions with an optional icon
    Weather {
        report: Option<WeatherReport>,
        icons: HashMap<String, Bitmap>,
    },
    /// Fitness tracker totals for today
    Activity { summary: Option<ActivitySummary> },
}

impl Body {
    pub fn clock<S: Into<String>>(format: S) -> Self {
        Body::Clock {
            format: format.into(),
            shown: None,
        }
    }

    pub fn text(initial: Option<String>) -> Self {
        Body::Text { text: initial }
    }

    pub fn date() -> Self {
        Body::Date { shown: None }
    }

    pub fn weather(icons: HashMap<String, Bitmap>) -> Self {
        Body::Weather { report: None, icons }
    }

    pub fn activity() -> Self {
        Body::Activity { summary: None }
    }

    /// Bodies whose content follows the wall clock instead of a data source.
    pub fn is_time_driven(&self) -> bool {
        matches!(self, Body::Clock { .. } | Body::Date { .. })
    }

    /// Re-format a time-driven body for `now`. Returns true when the visible
    /// string changed.
    pub fn tick(&mut self, now: DateTime<Local>) -> bool {
        let (format, shown) = match self {
            Body::Clock { format, shown } => (format.as_str(), shown),
            Body::Date { shown } => (DATE_FORMAT, shown),
            _ => return false,
        };
        replace_if_changed(shown, now.format(format).to_string())
    }

    /// Store a fetched payload. Returns true only when it differs from the
    /// cached one; identical payloads leave the body untouched.
    pub fn accept(&mut self, payload: Payload) -> bool {
        match (self, payload) {
            (Body::Text { text }, Payload::Text(new)) => replace_if_changed(text, new),
            (Body::Weather { report, .. }, Payload::Weather(new)) => {
                replace_if_changed(report, new)
            }
            (Body::Activity { summary }, Payload::Activity(new)) => {
                replace_if_changed(summary, new)
            }
            (body, payload) => {
                warn!("{} body ignored unexpected payload {:?}", body.kind(), payload);
                false
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Body::Clock { .. } => "Clock",
            Body::Text { .. } => "Text",
            Body::Date { .. } => "Date",
            Body::Weather { .. } => "Weather",
            Body::Activity { .. } => "Activity",
        }
    }

    /// One-line description of what is currently shown.
    pub fn summary(&self) -> String {
        match self {
            Body::Clock { shown, .. } | Body::Date { shown } => {
                shown.clone().unwrap_or_else(|| LOADING.to_string())
            }
            Body::Text { text } => text.clone().unwrap_or_else(|| LOADING.to_string()),
            Body::Weather { report, .. } => report
                .as_ref()
                .map(weather_headline)
                .unwrap_or_else(|| LOADING.to_string()),
            Body::Activity { summary } => summary
                .as_ref()
                .map(steps_line)
                .unwrap_or_else(|| LOADING.to_string()),
        }
    }

    /// Lay the body out inside `area` of a freshly reset canvas.
    pub fn render(&self, canvas: &mut Bitmap, font: &MonoFont<'_>, area: Rectangle) {
        match self {
            Body::Clock { shown, .. } | Body::Date { shown } => {
                draw_centered(canvas, shown.as_deref().unwrap_or(LOADING), font, area);
            }
            Body::Text { text } => {
                draw_left(canvas, text.as_deref().unwrap_or(LOADING), font, area);
            }
            Body::Weather { report: None, .. } | Body::Activity { summary: None } => {
                draw_left(canvas, LOADING, font, area);
            }
            Body::Weather {
                report: Some(report),
                icons,
            } => render_weather(canvas, report, icons, font, area),
            Body::Activity {
                summary: Some(summary),
            } => render_activity(canvas, summary, font, area),
        }
    }
}

fn replace_if_changed<T: PartialEq>(slot: &mut Option<T>, value: T) -> bool {
    if slot.as_ref() == Some(&value) {
        return false;
    }
    *slot = Some(value);
    true
}

fn render_weather(
    canvas: &mut Bitmap,
    report: &WeatherReport,
    icons: &HashMap<String, Bitmap>,
    font: &MonoFont<'_>,
    area: Rectangle,
) {
    let mut text_area = area;
    if let Some(icon) = report.icon.as_deref().and_then(|code| icons.get(code)) {
        canvas.paste(icon, area.top_left.x, area.top_left.y);
        let shift = icon.width() + PADDING;
        text_area.top_left.x += shift as i32;
        text_area.size.width = text_area.size.width.saturating_sub(shift);
    }

    let mut details = Vec::new();
    if let Some(feels_like) = report.feels_like {
        details.push(format!("feels {:.0}{}", feels_like, report.unit));
    }
    if let Some(humidity) = report.humidity {
        details.push(format!("hum {:.0}%", humidity));
    }
    draw_two_lines(canvas, &weather_headline(report), &details.join(" "), font, text_area);
}

fn render_activity(
    canvas: &mut Bitmap,
    summary: &ActivitySummary,
    font: &MonoFont<'_>,
    area: Rectangle,
) {
    let mut details = Vec::new();
    if let Some(calories) = summary.calories {
        details.push(format!("{} kcal", calories));
    }
    if let Some(distance) = summary.distance_km {
        details.push(format!("{:.1} km", distance));
    }
    if let Some(floors) = summary.floors {
        details.push(format!("{} fl", floors));
    }
    draw_two_lines(canvas, &steps_line(summary), &details.join(" "), font, area);
}

fn weather_headline(report: &WeatherReport) -> String {
    let mut parts = Vec::new();
    if let Some(temperature) = report.temperature {
        parts.push(format!("{:.0}{}", temperature, report.unit));
    }
    if let Some(conditions) = &report.conditions {
        parts.push(conditions.clone());
    }
    if parts.is_empty() {
        LOADING.to_string()
    } else {
        parts.join(" ")
    }
}

fn steps_line(summary: &ActivitySummary) -> String {
    match (summary.steps, summary.step_goal) {
        (Some(steps), Some(goal)) => format!("{}/{} steps", steps, goal),
        (Some(steps), None) => format!("{} steps", steps),
        (None, _) => LOADING.to_string(),
    }
}

/// Shorten `text` so it fits in `max_width` pixels of `font`, ending in `...`
/// when anything was cut.
pub fn fit_text<'a>(text: &'a str, font: &MonoFont<'_>, max_width: u32) -> Cow<'a, str> {
    let advance = font.character_size.width + font.character_spacing;
    let capacity = ((max_width + font.character_spacing) / advance) as usize;
    if text.chars().count() <= capacity {
        return Cow::Borrowed(text);
    }
    if capacity <= ELLIPSIS.len() {
        return Cow::Owned(ELLIPSIS[..capacity].to_string());
    }
    let mut fitted: String = text.chars().take(capacity - ELLIPSIS.len()).collect();
    fitted.push_str(ELLIPSIS);
    Cow::Owned(fitted)
}

/// Rendered width of `text` in pixels.
pub fn text_width(text: &str, font: &MonoFont<'_>) -> u32 {
    let chars = text.chars().count() as u32;
    if chars == 0 {
        return 0;
    }
    chars * (font.character_size.width + font.character_spacing) - font.character_spacing
}

fn draw_text(canvas: &mut Bitmap, text: &str, font: &MonoFont<'_>, position: Point) {
    let style = MonoTextStyle::new(font, BinaryColor::On);
    Text::with_baseline(text, position, style, Baseline::Middle)
        .draw(canvas)
        .ok();
}

fn draw_centered(canvas: &mut Bitmap, text: &str, font: &MonoFont<'_>, area: Rectangle) {
    let fitted = fit_text(text, font, area.size.width);
    let slack = area.size.width.saturating_sub(text_width(&fitted, font));
    let x = area.top_left.x + (slack / 2) as i32;
    draw_text(canvas, &fitted, font, Point::new(x, area.center().y));
}

fn draw_left(canvas: &mut Bitmap, text: &str, font: &MonoFont<'_>, area: Rectangle) {
    let fitted = fit_text(text, font, area.size.width.saturating_sub(2 * PADDING));
    let x = area.top_left.x + PADDING as i32;
    draw_text(canvas, &fitted, font, Point::new(x, area.center().y));
}

/// Headline in the panel font on the upper part, details in the small font
/// underneath.
fn draw_two_lines(
    canvas: &mut Bitmap,
    headline: &str,
    details: &str,
    font: &MonoFont<'_>,
    area: Rectangle,
) {
    if details.is_empty() {
        draw_left(canvas, headline, font, area);
        return;
    }

    let max_width = area.size.width.saturating_sub(2 * PADDING);
    let x = area.top_left.x + PADDING as i32;
    let height = area.size.height as i32;
    let top = area.top_left.y;

    let headline = fit_text(headline, font, max_width);
    draw_text(canvas, &headline, font, Point::new(x, top + height / 3));

    let details = fit_text(details, &FONT_6X10, max_width);
    draw_text(canvas, &details, &FONT_6X10, Point::new(x, top + height * 4 / 5));
}
