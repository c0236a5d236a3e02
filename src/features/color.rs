//! Ambilight colour, and debouncing of the host's colour writes.
//!
//! Hosts send hue, saturation and brightness as separate, rapid-fire writes
//! (a colour wheel drag can produce dozens per second). Each write mutates
//! the shared [`HsbColor`] immediately and then waits in
//! [`ColorCoalescer::settle`]; only the last write of a burst is sent on.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Cap on the per-ticket delay multiplier.
const MAX_DELAY_STEPS: u64 = 10;

/// Colour in host units: hue in degrees, saturation and brightness in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HsbColor {
    pub hue: u16,
    pub saturation: u16,
    pub brightness: u16,
}

/// Colour in device units, each channel `0..=255`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceColor {
    pub hue: u16,
    pub saturation: u16,
    pub brightness: u16,
}

impl Default for HsbColor {
    fn default() -> Self {
        Self {
            hue: 0,
            saturation: 0,
            brightness: 100,
        }
    }
}

fn rescale(value: u16, from: u16, to: u16) -> u16 {
    let value = u32::from(value.min(from));
    ((value * u32::from(to) + u32::from(from) / 2) / u32::from(from)) as u16
}

impl HsbColor {
    pub fn to_device(self) -> DeviceColor {
        DeviceColor {
            hue: rescale(self.hue, 360, 255),
            saturation: rescale(self.saturation, 100, 255),
            brightness: rescale(self.brightness, 100, 255),
        }
    }

    pub fn from_device(color: DeviceColor) -> Self {
        Self {
            hue: rescale(color.hue, 255, 360),
            saturation: rescale(color.saturation, 255, 100),
            brightness: rescale(color.brightness, 255, 100),
        }
    }
}

/// Last-write-wins debouncer for colour changes.
pub struct ColorCoalescer {
    color: Mutex<HsbColor>,
    pending: AtomicU64,
    step: Duration,
}

impl ColorCoalescer {
    pub fn new(step: Duration) -> Self {
        Self {
            color: Mutex::new(HsbColor::default()),
            pending: AtomicU64::new(0),
            step,
        }
    }

    pub fn color(&self) -> HsbColor {
        *self.color.lock()
    }

    /// Writes currently waiting in [`settle`](Self::settle).
    pub fn pending(&self) -> u64 {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn set_hue(&self, hue: u16) {
        self.color.lock().hue = hue.min(360);
    }

    pub fn set_saturation(&self, saturation: u16) {
        self.color.lock().saturation = saturation.min(100);
    }

    pub fn set_brightness(&self, brightness: u16) {
        self.color.lock().brightness = brightness.min(100);
    }

    /// Take over a colour read from the TV unless a burst is in progress.
    pub fn adopt(&self, color: HsbColor) -> bool {
        if self.pending() > 0 {
            return false;
        }
        *self.color.lock() = color;
        true
    }

    /// Wait out the debounce window for one write.
    ///
    /// Returns the colour to send if this caller was the last of its burst,
    /// `None` if a later write superseded it. The n-th write of a burst
    /// waits n steps (at most ten), so earlier writes always look first.
    pub async fn settle(&self) -> Option<HsbColor> {
        let ticket = self.pending.fetch_add(1, Ordering::SeqCst) + 1;
        let steps = ticket.min(MAX_DELAY_STEPS) as u32;
        tokio::time::sleep(self.step * steps).await;

        match self
            .pending
            .compare_exchange(ticket, 0, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => Some(self.color()),
            Err(_) => {
                log::trace!("[Color] write #{} superseded", ticket);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::join_all;
    use std::sync::Arc;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    #[test]
    fn test_unit_conversion() {
        let red = HsbColor {
            hue: 0,
            saturation: 100,
            brightness: 100,
        };
        assert_eq!(
            red.to_device(),
            DeviceColor {
                hue: 0,
                saturation: 255,
                brightness: 255
            }
        );

        let cyan = HsbColor {
            hue: 180,
            saturation: 50,
            brightness: 0,
        };
        let device = cyan.to_device();
        assert_eq!(device.hue, 128);
        assert_eq!(device.saturation, 128);
        assert_eq!(HsbColor::from_device(device).hue, 181);
        assert_eq!(HsbColor::from_device(device).saturation, 50);
    }

    #[test]
    fn test_out_of_range_values_clamp() {
        let coalescer = ColorCoalescer::new(Duration::from_millis(50));
        coalescer.set_hue(720);
        coalescer.set_saturation(300);
        assert_eq!(coalescer.color().hue, 360);
        assert_eq!(coalescer.color().saturation, 100);
        assert_eq!(coalescer.color().to_device().hue, 255);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_write_settles_after_one_step() {
        let coalescer = ColorCoalescer::new(Duration::from_millis(50));
        coalescer.set_hue(120);

        let start = tokio::time::Instant::now();
        let settled = coalescer.settle().await;
        assert_eq!(settled.map(|c| c.hue), Some(120));
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(coalescer.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_is_pending_until_step_elapses() {
        let coalescer = ColorCoalescer::new(Duration::from_millis(50));
        let mut settle = task::spawn(coalescer.settle());

        assert_pending!(settle.poll());
        assert_eq!(coalescer.pending(), 1);
        tokio::time::advance(Duration::from_millis(49)).await;
        assert_pending!(settle.poll());
        tokio::time::advance(Duration::from_millis(1)).await;
        assert_ready_eq!(settle.poll(), Some(HsbColor::default()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_settles_once_with_last_value() {
        let coalescer = Arc::new(ColorCoalescer::new(Duration::from_millis(50)));

        let writes = [10u16, 20, 30, 40, 50].map(|hue| {
            let coalescer = coalescer.clone();
            async move {
                coalescer.set_hue(hue);
                coalescer.settle().await
            }
        });
        let settled: Vec<_> = join_all(writes).await.into_iter().flatten().collect();

        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].hue, 50);
        assert_eq!(coalescer.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_adopt_is_ignored_during_burst() {
        let coalescer = Arc::new(ColorCoalescer::new(Duration::from_millis(50)));
        coalescer.set_hue(90);

        let waiting = {
            let coalescer = coalescer.clone();
            tokio::spawn(async move { coalescer.settle().await })
        };
        tokio::task::yield_now().await;
        assert!(!coalescer.adopt(HsbColor::default()));

        assert_eq!(waiting.await.unwrap().map(|c| c.hue), Some(90));
        assert!(coalescer.adopt(HsbColor::default()));
        assert_eq!(coalescer.color(), HsbColor::default());
    }
}
