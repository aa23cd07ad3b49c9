//! # Panels
//!
//! A panel is a fixed-size rectangle of the screen with its own canvas. The
//! clock, the info strip next to it and the banner are all [`Panel`]s; what
//! differs between them is the [`Body`] they render and whether they pull data
//! from a [`DataSource`] ([`Capability::Polled`]) or only change by command or
//! by the clock ([`Capability::Static`]).
//!
//! ## Dirty Tracking
//! `dirty` starts out true, is set whenever the body's visible content changes
//! (new payload, new minute, new text) and is cleared only by rendering. A panel
//! that is not dirty answers [`Panel::draw_at`] with `None`, so its canvas is
//! guaranteed to match the cached content from the last render.
//!
//! ## Polling
//! A polled panel asks its source at most once per refresh interval, counted
//! from the previous attempt whether or not it delivered anything. A source
//! with nothing new returns `None`; the cached payload and the dirty flag stay
//! exactly as they were.

use crate::bitmap::{Bitmap, Border};
use crate::bodies::Body;
use crate::services::DataSource;
use crate::{Alignment, HorizontalAlignment, VerticalAlignment};
use chrono::{DateTime, Duration, Local};
use embedded_graphics::{
    mono_font::{
        ascii::{FONT_10X20, FONT_6X10, FONT_9X15},
        MonoFont,
    },
    prelude::*,
    primitives::Rectangle,
};
use std::fmt;
use tracing::debug;

/// Screen role of a panel; decides its border and font.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PanelKind {
    Clock,
    Info,
    Banner,
}

impl PanelKind {
    pub fn font(self) -> &'static MonoFont<'static> {
        match self {
            PanelKind::Clock => &FONT_10X20,
            PanelKind::Info => &FONT_9X15,
            PanelKind::Banner => &FONT_6X10,
        }
    }
}

/// Where a panel's content comes from.
pub enum Capability {
    /// Content changes only through commands or the wall clock
    Static,
    /// Content is pulled from a data source on a refresh interval
    Polled {
        source: Box<dyn DataSource>,
        interval: Duration,
        last_refresh: Option<DateTime<Local>>,
    },
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Static => write!(f, "Static"),
            Capability::Polled {
                interval,
                last_refresh,
                ..
            } => f
                .debug_struct("Polled")
                .field("interval", interval)
                .field("last_refresh", last_refresh)
                .finish(),
        }
    }
}

/// A freshly rendered panel canvas and what changed on it.
#[derive(Debug)]
pub struct Redraw<'a> {
    pub image: &'a Bitmap,
    pub change: String,
}

pub struct Panel {
    name: String,
    kind: PanelKind,
    size: Size,
    alignment: Alignment,
    image: Bitmap,
    body: Body,
    capability: Capability,
    dirty: bool,
    description: String,
}

impl fmt::Debug for Panel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Panel")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("size", &self.size)
            .field("alignment", &self.alignment)
            .field("capability", &self.capability)
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl Panel {
    fn new(name: &str, kind: PanelKind, size: Size, alignment: Alignment, body: Body) -> Self {
        let mut panel = Self {
            name: name.to_string(),
            kind,
            size,
            alignment,
            image: Bitmap::new(size.width, size.height),
            body,
            capability: Capability::Static,
            dirty: true,
            description: String::new(),
        };
        panel.reset_canvas();
        panel
    }

    /// The clock face in the aligned corner.
    pub fn clock(size: Size, alignment: Alignment, format: &str) -> Self {
        Self::new("Clock", PanelKind::Clock, size, alignment, Body::clock(format))
            .with_description("This panel is used to display the current time.")
    }

    /// A panel for the info strip next to the clock.
    pub fn info(name: &str, size: Size, alignment: Alignment, body: Body) -> Self {
        Self::new(name, PanelKind::Info, size, alignment, body)
    }

    /// A full-width strip on the edge opposite the clock.
    pub fn banner(name: &str, size: Size, alignment: Alignment, body: Body) -> Self {
        Self::new(name, PanelKind::Banner, size, alignment, body)
    }

    /// Pull content from `source` on its refresh interval.
    pub fn with_source(mut self, source: Box<dyn DataSource>) -> Self {
        let interval = source.refresh_interval();
        self.capability = Capability::Polled {
            source,
            interval,
            last_refresh: None,
        };
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PanelKind {
        self.kind
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn alignment(&self) -> Alignment {
        self.alignment
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    /// Last rendered canvas.
    pub fn image(&self) -> &Bitmap {
        &self.image
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// "<Name> Panel: <description>"
    pub fn description(&self) -> String {
        format!("{} Panel: {}", self.name, self.description)
    }

    /// Update the alignment. Nothing is redrawn here; the frame repositions
    /// and re-renders panels on its next full recomposition.
    pub fn set_alignment(
        &mut self,
        vertical: Option<VerticalAlignment>,
        horizontal: Option<HorizontalAlignment>,
    ) {
        if let Some(vertical) = vertical {
            self.alignment.vertical = vertical;
        }
        if let Some(horizontal) = horizontal {
            self.alignment.horizontal = horizontal;
        }
    }

    /// Replace the text of a text body. Returns false for any other body.
    pub fn set_text(&mut self, text: &str) -> bool {
        if !matches!(self.body, Body::Text { .. }) {
            return false;
        }
        if self
            .body
            .accept(crate::services::Payload::Text(text.to_string()))
        {
            self.dirty = true;
        }
        true
    }

    /// Force the next draw to render.
    pub fn invalidate(&mut self) {
        self.dirty = true;
    }

    pub fn draw(&mut self) -> Option<Redraw<'_>> {
        self.draw_at(Local::now())
    }

    /// Refresh content if due and render when anything changed.
    pub fn draw_at(&mut self, now: DateTime<Local>) -> Option<Redraw<'_>> {
        self.update(now);
        if !self.dirty {
            return None;
        }

        self.render();
        let change = format!("{} now displays {}", self.name, self.body.summary());
        debug!("{}", change);
        Some(Redraw {
            image: &self.image,
            change,
        })
    }

    /// Refresh and render unconditionally. Used when the whole frame is
    /// recomposed, e.g. after the alignment (and with it the border) changed.
    pub fn redraw_at(&mut self, now: DateTime<Local>) -> &Bitmap {
        self.update(now);
        self.render();
        &self.image
    }

    fn update(&mut self, now: DateTime<Local>) {
        if let Capability::Polled {
            source,
            interval,
            last_refresh,
        } = &mut self.capability
        {
            let due = match last_refresh {
                Some(last) => now - *last >= *interval,
                None => true,
            };
            if due {
                // A miss waits a full interval too.
                *last_refresh = Some(now);
                if let Some(payload) = source.fetch() {
                    if self.body.accept(payload) {
                        self.dirty = true;
                    }
                }
            }
        }

        if self.body.is_time_driven() && self.body.tick(now) {
            self.dirty = true;
        }
    }

    fn render(&mut self) {
        self.reset_canvas();
        let border = self.border();
        let area = Rectangle::new(
            Point::new(border.left as i32, border.top as i32),
            Size::new(
                self.size.width.saturating_sub(border.left + border.right),
                self.size.height.saturating_sub(border.top + border.bottom),
            ),
        );
        self.body.render(&mut self.image, self.kind.font(), area);
        self.dirty = false;
    }

    fn reset_canvas(&mut self) {
        self.image = Bitmap::bordered(self.size.width, self.size.height, self.border());
    }

    /// Info panels leave out the edge they share with the clock, whose own
    /// border already draws that line.
    fn border(&self) -> Border {
        match (self.kind, self.alignment.horizontal) {
            (PanelKind::Info, HorizontalAlignment::Left) => Border::new(0, 1, 1, 1),
            (PanelKind::Info, HorizontalAlignment::Right) => Border::new(1, 1, 0, 1),
            _ => Border::uniform(1),
        }
    }
}
