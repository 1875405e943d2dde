//! A single DECtape transport, eight of which hang off one controller

use anyhow::{Result, bail};
use log::*;
use serde::{Deserialize, Serialize};

use reel_tape::{END_ZONE_LINES, TapeFormat, TapeImage};

use crate::debuggable::Debuggable;
use crate::tickable::Ticks;
use crate::{dbgprop_bool, dbgprop_enum, dbgprop_string, dbgprop_udec};

use super::TimingParams;
use super::motion::{Direction, Motion, MotionState};

/// Outcome of a lazy position integration
#[derive(Debug, PartialEq, Eq)]
#[must_use]
pub(super) enum PositionUpdate {
    /// No lines passed the head
    Unchanged,
    /// Position advanced (either direction)
    Moved,
    /// The tape left the reel; the drive has detached itself
    OffReel,
}

/// A single tape transport, attached to the controller
#[derive(Serialize, Deserialize)]
pub struct TapeDrive {
    idx: usize,
    pub(super) enabled: bool,
    pub(super) write_locked: bool,
    attached: bool,
    pub(super) image: TapeImage,

    pub(super) state: MotionState,

    /// On-reel position in tape lines; 0 is the start of the reverse
    /// end zone
    position: u32,

    /// Timestamp position was last integrated at
    last_update: Ticks,

    /// Fire time of the pending scheduled event, at most one per transport
    pub(super) deadline: Option<Ticks>,

    /// Image captured when the drive detached itself off-reel
    unloaded: Option<Box<TapeImage>>,
}

impl TapeDrive {
    pub fn new(idx: usize) -> Self {
        Self {
            idx,
            enabled: true,
            write_locked: false,
            attached: false,
            image: TapeImage::blank(TapeFormat::Native18, ""),
            state: MotionState::default(),
            position: 0,
            last_update: 0,
            deadline: None,
            unloaded: None,
        }
    }

    /// Mounts a tape image. The tape comes up stopped at the first block
    /// boundary, just out of the reverse end zone.
    pub fn attach(&mut self, image: TapeImage, now: Ticks) -> Result<()> {
        if !self.enabled {
            bail!("Drive {} is disabled", self.idx);
        }
        info!(
            "Drive {}: attached '{}' ({}, {} blocks)",
            self.idx,
            image.title(),
            image.format(),
            image.format().tape_blocks()
        );
        self.image = image;
        self.attached = true;
        self.position = END_ZONE_LINES;
        self.last_update = now;
        self.state.reset();
        self.deadline = None;
        Ok(())
    }

    /// Unmounts the tape image, cancelling anything pending
    pub fn detach(&mut self) -> Option<TapeImage> {
        if !self.attached {
            return None;
        }
        info!("Drive {}: detached '{}'", self.idx, self.image.title());
        let format = self.image.format();
        let image = std::mem::replace(&mut self.image, TapeImage::blank(format, ""));
        self.attached = false;
        self.state.reset();
        self.deadline = None;
        Some(image)
    }

    /// The tape unspooled past a reel end; self-detach but keep the image
    /// around for the host layer to flush
    pub(super) fn run_off_reel(&mut self) {
        error!("Drive {}: tape ran off the reel", self.idx);
        self.unloaded = self.detach().map(Box::new);
    }

    pub fn take_unloaded_image(&mut self) -> Option<Box<TapeImage>> {
        self.unloaded.take()
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Effective write protection: the per-drive lock or the image's own
    pub fn is_write_protected(&self) -> bool {
        self.write_locked || self.image.write_protect()
    }

    pub fn format(&self) -> TapeFormat {
        self.image.format()
    }

    /// The mounted image; what the host layer flushes at detach time
    pub fn image(&self) -> &TapeImage {
        &self.image
    }

    pub fn motion(&self) -> Motion {
        self.state.motion()
    }

    pub fn function(&self) -> super::motion::Function {
        self.state.func()
    }

    pub fn position(&self) -> u32 {
        self.position
    }

    pub(crate) fn deadline(&self) -> Option<Ticks> {
        self.deadline
    }

    pub(super) fn schedule(&mut self, at: Ticks) {
        self.deadline = Some(at);
    }

    pub(super) fn cancel(&mut self) {
        self.deadline = None;
    }

    pub(super) fn in_reverse_end_zone(&self) -> bool {
        self.position < END_ZONE_LINES
    }

    pub(super) fn in_forward_end_zone(&self) -> bool {
        self.position >= self.format().fwd_end_zone_line()
    }

    pub(super) fn in_end_zone(&self) -> bool {
        self.in_reverse_end_zone() || self.in_forward_end_zone()
    }

    /// Moves one line in the direction of motion. The function launcher
    /// uses this when an integration came up empty, so block-offset math
    /// never runs twice on the same line.
    pub(super) fn nudge(&mut self) {
        match self.state.motion().direction() {
            Some(Direction::Forward) => self.position += 1,
            Some(Direction::Reverse) => self.position = self.position.saturating_sub(1),
            None => (),
        }
    }

    /// Lazily integrates the on-reel position from the time elapsed since
    /// the last integration, using the motion equation of the current
    /// phase. Running past either physical reel end detaches the drive.
    pub(super) fn update_position(
        &mut self,
        now: Ticks,
        timing: &TimingParams,
    ) -> PositionUpdate {
        let dt = now - self.last_update;
        if dt == 0 {
            return PositionUpdate::Unchanged;
        }
        self.last_update = now;

        let lt = timing.line_time;
        let delta = match self.state.motion() {
            Motion::Stop => 0,
            Motion::AtSpeed(_) => dt / lt,
            Motion::Accelerating(_) => {
                let big_n = timing.accel_time / lt;
                let n = (dt / lt).min(big_n);
                (n * n) / (2 * big_n)
            }
            Motion::Decelerating(_) => {
                let big_n = timing.decel_time / lt;
                let n = (dt / lt).min(big_n);
                (2 * n * big_n - n * n) / (2 * big_n)
            }
        };
        if delta == 0 {
            return PositionUpdate::Unchanged;
        }

        let newpos = match self.state.motion().direction() {
            Some(Direction::Forward) => i64::from(self.position) + delta as i64,
            Some(Direction::Reverse) => i64::from(self.position) - delta as i64,
            None => unreachable!(),
        };
        if newpos < 0 || newpos > i64::from(self.format().total_lines()) {
            self.run_off_reel();
            return PositionUpdate::OffReel;
        }
        self.position = newpos as u32;
        PositionUpdate::Moved
    }
}

impl Debuggable for TapeDrive {
    fn get_debug_properties(&self) -> crate::debuggable::DebuggableProperties {
        use crate::debuggable::*;

        vec![
            dbgprop_bool!("Enabled", self.enabled),
            dbgprop_bool!("Attached", self.attached),
            dbgprop_bool!("Write locked", self.write_locked),
            dbgprop_string!("Image", self.image.title().to_string()),
            dbgprop_enum!("Motion", self.state.motion()),
            dbgprop_enum!("Function", self.state.func()),
            dbgprop_udec!("Position (lines)", self.position),
            dbgprop_udec!("Last integration", self.last_update),
            dbgprop_udec!("Event deadline", self.deadline.unwrap_or(0)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::super::motion::MotionStep;
    use super::super::motion::Function;
    use super::*;

    fn attached_drive() -> TapeDrive {
        let mut drv = TapeDrive::new(1);
        drv.attach(TapeImage::blank(TapeFormat::Native18, "test"), 0)
            .unwrap();
        drv
    }

    fn at_speed(drv: &mut TapeDrive, dir: Direction) {
        drv.state.set(MotionStep {
            motion: Motion::AtSpeed(dir),
            func: Function::Move,
        });
    }

    #[test]
    fn integration_is_idempotent_for_zero_dt() {
        let timing = TimingParams::default();
        let mut drv = attached_drive();
        at_speed(&mut drv, Direction::Forward);

        assert_eq!(drv.update_position(1200, &timing), PositionUpdate::Moved);
        let pos = drv.position();
        assert_eq!(drv.update_position(1200, &timing), PositionUpdate::Unchanged);
        assert_eq!(drv.position(), pos);
    }

    #[test]
    fn at_speed_rate() {
        let timing = TimingParams::default();
        let mut drv = attached_drive();
        at_speed(&mut drv, Direction::Forward);

        let _ = drv.update_position(1200, &timing);
        assert_eq!(drv.position(), END_ZONE_LINES + 100);
    }

    #[test]
    fn full_acceleration_covers_half_the_at_speed_distance() {
        let timing = TimingParams::default();
        let mut drv = attached_drive();
        drv.state.set(MotionStep {
            motion: Motion::Accelerating(Direction::Forward),
            func: Function::Move,
        });

        let _ = drv.update_position(timing.accel_time, &timing);
        let n = timing.accel_time / timing.line_time;
        assert_eq!(drv.position(), END_ZONE_LINES + (n / 2) as u32);
    }

    #[test]
    fn full_deceleration_covers_half_the_at_speed_distance() {
        let timing = TimingParams::default();
        let mut drv = attached_drive();
        drv.state.set(MotionStep {
            motion: Motion::Decelerating(Direction::Reverse),
            func: Function::Move,
        });

        let _ = drv.update_position(timing.decel_time, &timing);
        let n = timing.decel_time / timing.line_time;
        assert_eq!(drv.position(), END_ZONE_LINES - (n / 2) as u32);
    }

    #[test]
    fn running_off_the_reverse_end_detaches() {
        let timing = TimingParams::default();
        let mut drv = attached_drive();
        at_speed(&mut drv, Direction::Reverse);

        // More than 36000 lines in reverse from the first block boundary
        let res = drv.update_position(40_000 * timing.line_time, &timing);
        assert_eq!(res, PositionUpdate::OffReel);
        assert!(!drv.is_attached());
        assert!(drv.take_unloaded_image().is_some());
        assert!(drv.take_unloaded_image().is_none());
    }

    #[test]
    fn nudge_follows_motion_direction() {
        let mut drv = attached_drive();
        at_speed(&mut drv, Direction::Forward);
        drv.nudge();
        assert_eq!(drv.position(), END_ZONE_LINES + 1);
        at_speed(&mut drv, Direction::Reverse);
        drv.nudge();
        drv.nudge();
        assert_eq!(drv.position(), END_ZONE_LINES - 1);
    }
}
