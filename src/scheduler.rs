//! # Refresh Scheduling
//!
//! E-paper panels have two ways of showing a new image:
//!
//! - **Full refresh**: the panel flashes black and white a few times. Slow
//!   (about two seconds) but leaves a perfectly clean image.
//! - **Partial refresh**: only changed pixels are driven. Fast and calm, but
//!   every partial update leaves a little ghosting behind.
//!
//! [`DisplayScheduler`] decides between them. It allows at most
//! `partial_ceiling` partial updates in a row and never lets the last full
//! refresh grow older than `max_staleness`; when either limit is reached the
//! next update is a full one. A stale panel is refreshed in full even when the
//! frame has nothing new to show.
//!
//! Every update wakes the controller, refreshes and puts it back to sleep, so
//! the panel is unpowered between minutes.

use crate::bitmap::Bitmap;
use crate::config::DisplayConfig;
use crate::transport::{DisplayError, DisplayTransport};
use chrono::{DateTime, Duration, Local};
use tracing::{debug, info};

/// What a call to [`DisplayScheduler::present_at`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Refresh {
    Skipped,
    Partial,
    Full,
}

/// Limits that force a full refresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Partial updates allowed between two full refreshes
    pub partial_ceiling: u32,
    /// Longest time between two full refreshes
    pub max_staleness: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            partial_ceiling: 6,
            max_staleness: Duration::hours(12),
        }
    }
}

impl From<&DisplayConfig> for RefreshPolicy {
    fn from(config: &DisplayConfig) -> Self {
        Self {
            partial_ceiling: config.partial_ceiling,
            max_staleness: config.max_staleness(),
        }
    }
}

pub struct DisplayScheduler<T> {
    transport: T,
    policy: RefreshPolicy,
    partial_count: u32,
    last_full: Option<DateTime<Local>>,
    last_image: Option<Bitmap>,
}

impl<T: DisplayTransport> DisplayScheduler<T> {
    pub fn new(transport: T, policy: RefreshPolicy) -> Self {
        Self {
            transport,
            policy,
            partial_count: 0,
            last_full: None,
            last_image: None,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    /// Partial updates since the last full refresh.
    pub fn partial_count(&self) -> u32 {
        self.partial_count
    }

    pub fn last_full(&self) -> Option<DateTime<Local>> {
        self.last_full
    }

    /// Wake the panel and wipe whatever the previous run left on it.
    pub fn begin(&mut self) -> Result<(), DisplayError> {
        info!("Initializing display");
        self.transport.init()?;
        self.transport.clear()
    }

    pub fn present(&mut self, image: Option<&Bitmap>) -> Result<Refresh, DisplayError> {
        self.present_at(image, Local::now())
    }

    /// Push a newly composed image, or check staleness when there is none.
    pub fn present_at(
        &mut self,
        image: Option<&Bitmap>,
        now: DateTime<Local>,
    ) -> Result<Refresh, DisplayError> {
        let stale = self.is_stale(now);
        let image = match (image, stale) {
            (Some(image), _) => image.clone(),
            (None, true) => match &self.last_image {
                Some(last) => {
                    debug!("Display is stale, refreshing the last image");
                    last.clone()
                }
                None => return Ok(Refresh::Skipped),
            },
            (None, false) => return Ok(Refresh::Skipped),
        };

        let full = self.last_full.is_none()
            || stale
            || self.partial_count >= self.policy.partial_ceiling;

        self.transport.init()?;
        let refresh = if full {
            self.full_refresh(&image, now)?
        } else {
            self.partial_refresh(&image)?
        };
        self.transport.sleep()?;
        self.last_image = Some(image);
        Ok(refresh)
    }

    fn full_refresh(
        &mut self,
        image: &Bitmap,
        now: DateTime<Local>,
    ) -> Result<Refresh, DisplayError> {
        info!("Full refresh after {} partial updates", self.partial_count);
        self.transport.clear()?;
        self.transport.set_base_image(image)?;
        self.transport.turn_on_full()?;
        self.partial_count = 0;
        self.last_full = Some(now);
        Ok(Refresh::Full)
    }

    fn partial_refresh(&mut self, image: &Bitmap) -> Result<Refresh, DisplayError> {
        self.transport.update_partial(image)?;
        self.transport.turn_on_partial()?;
        self.partial_count += 1;
        debug!(
            "Partial refresh {}/{}",
            self.partial_count, self.policy.partial_ceiling
        );
        Ok(Refresh::Partial)
    }

    fn is_stale(&self, now: DateTime<Local>) -> bool {
        self.last_full
            .is_some_and(|last| now - last >= self.policy.max_staleness)
    }

    /// Leave a blank, sleeping panel behind.
    pub fn shutdown(&mut self) -> Result<(), DisplayError> {
        info!("Clearing display before shutdown");
        self.transport.init()?;
        self.transport.clear()?;
        self.transport.sleep()
    }
}
