//! Motion and function state for a single transport
//!
//! The hardware packs current/next/next-next motion-function codes into one
//! 18-bit status word; here the same three-deep transition queue is an
//! explicit `MotionStep` plus an inline two-entry queue.

use arrayvec::ArrayVec;
use num_derive::FromPrimitive;
use serde::{Deserialize, Serialize};
use strum::Display;

/// Direction of tape motion over the head
#[derive(
    PartialEq, Eq, Clone, Copy, Debug, Display, strum::IntoStaticStr, Serialize, Deserialize,
)]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    pub const fn opposite(self) -> Self {
        match self {
            Self::Forward => Self::Reverse,
            Self::Reverse => Self::Forward,
        }
    }
}

/// Motion phase of a transport
#[derive(
    PartialEq, Eq, Clone, Copy, Debug, Display, strum::IntoStaticStr, Serialize, Deserialize,
)]
pub enum Motion {
    Stop,
    Decelerating(Direction),
    Accelerating(Direction),
    AtSpeed(Direction),
}

impl Motion {
    pub const fn direction(self) -> Option<Direction> {
        match self {
            Self::Stop => None,
            Self::Decelerating(d) | Self::Accelerating(d) | Self::AtSpeed(d) => Some(d),
        }
    }

    pub const fn is_moving(self) -> bool {
        !matches!(self, Self::Stop)
    }

    /// True while the motor is driving the reels (accelerating or at speed,
    /// not coasting down)
    pub const fn is_driving(self) -> bool {
        matches!(self, Self::Accelerating(_) | Self::AtSpeed(_))
    }
}

/// Function a transport performs once at speed
///
/// `OffReel` is not addressable from the command register: it is entered
/// when a moving drive is deselected and keeps it coasting to an end zone
/// without touching the shared controller registers.
#[derive(
    PartialEq, Eq, Clone, Copy, Debug, Display, strum::IntoStaticStr, Serialize, Deserialize,
)]
pub enum Function {
    Move,
    Search,
    Read,
    ReadAll,
    Write,
    WriteAll,
    OffReel,
}

impl Function {
    pub const fn is_write(self) -> bool {
        matches!(self, Self::Write | Self::WriteAll)
    }

    /// True for the word-clocked functions that exchange words with the
    /// host through the data buffer
    pub const fn is_data(self) -> bool {
        matches!(self, Self::Read | Self::ReadAll | Self::Write | Self::WriteAll)
    }
}

/// Function field encoding in Status A
#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionCode {
    Move = 0,
    Search = 1,
    Read = 2,
    ReadAll = 3,
    Write = 4,
    WriteAll = 5,
    /// Mark-track writing, not implemented by this controller
    WriteMark = 6,
}

impl FunctionCode {
    /// Maps the wire code onto an executable function. `WriteMark` has no
    /// implementation and selects nothing.
    pub const fn function(self) -> Option<Function> {
        match self {
            Self::Move => Some(Function::Move),
            Self::Search => Some(Function::Search),
            Self::Read => Some(Function::Read),
            Self::ReadAll => Some(Function::ReadAll),
            Self::Write => Some(Function::Write),
            Self::WriteAll => Some(Function::WriteAll),
            Self::WriteMark => None,
        }
    }
}

/// One entry of the motion transition queue. The function only takes
/// effect once the motion phase reaches at-speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionStep {
    pub motion: Motion,
    pub func: Function,
}

impl Default for MotionStep {
    fn default() -> Self {
        Self {
            motion: Motion::Stop,
            func: Function::Move,
        }
    }
}

/// Current motion step plus up to two deferred steps (a queued reversal
/// needs both: decelerate, then accelerate opposite, then at-speed with
/// the requested function)
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MotionState {
    current: MotionStep,
    queued: ArrayVec<MotionStep, 2>,
}

impl MotionState {
    pub fn current(&self) -> MotionStep {
        self.current
    }

    pub fn motion(&self) -> Motion {
        self.current.motion
    }

    pub fn func(&self) -> Function {
        self.current.func
    }

    /// Replaces the current step and drops anything deferred
    pub fn set(&mut self, step: MotionStep) {
        self.current = step;
        self.queued.clear();
    }

    /// Defers a step behind the current (and any already queued) one
    pub fn queue(&mut self, step: MotionStep) {
        self.queued.push(step);
    }

    /// Drops the deferred steps, keeping the current one
    pub fn clear_queued(&mut self) {
        self.queued.clear();
    }

    pub fn has_queued(&self) -> bool {
        !self.queued.is_empty()
    }

    /// Shifts the queue down: the next deferred step becomes current, or
    /// the transport comes to a stop
    pub fn advance(&mut self) {
        self.current = if self.queued.is_empty() {
            MotionStep {
                motion: Motion::Stop,
                func: self.current.func,
            }
        } else {
            self.queued.remove(0)
        };
    }

    /// Rewrites the function of the last deferred step, leaving the motion
    /// phases alone. Used on deselect to steer a pending at-speed step
    /// into off-reel coasting.
    pub fn retarget_queued(&mut self, func: Function) {
        if let Some(last) = self.queued.last_mut() {
            last.func = func;
        }
    }

    pub fn reset(&mut self) {
        self.current = MotionStep::default();
        self.queued.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_drains_to_stop() {
        let mut s = MotionState::default();
        s.set(MotionStep {
            motion: Motion::Decelerating(Direction::Forward),
            func: Function::Read,
        });
        s.queue(MotionStep {
            motion: Motion::Accelerating(Direction::Reverse),
            func: Function::Read,
        });
        s.queue(MotionStep {
            motion: Motion::AtSpeed(Direction::Reverse),
            func: Function::Search,
        });

        s.advance();
        assert_eq!(s.motion(), Motion::Accelerating(Direction::Reverse));
        s.advance();
        assert_eq!(s.motion(), Motion::AtSpeed(Direction::Reverse));
        assert_eq!(s.func(), Function::Search);
        s.advance();
        assert_eq!(s.motion(), Motion::Stop);
    }

    #[test]
    fn retarget_changes_last_queued_function() {
        let mut s = MotionState::default();
        s.set(MotionStep {
            motion: Motion::Decelerating(Direction::Forward),
            func: Function::Write,
        });
        s.queue(MotionStep {
            motion: Motion::Accelerating(Direction::Reverse),
            func: Function::Write,
        });
        s.queue(MotionStep {
            motion: Motion::AtSpeed(Direction::Reverse),
            func: Function::Write,
        });
        s.retarget_queued(Function::OffReel);

        s.advance();
        s.advance();
        assert_eq!(s.func(), Function::OffReel);
    }

    #[test]
    fn write_mark_has_no_function() {
        use num_traits::FromPrimitive;
        assert_eq!(FunctionCode::from_u8(6), Some(FunctionCode::WriteMark));
        assert_eq!(FunctionCode::WriteMark.function(), None);
        assert_eq!(FunctionCode::from_u8(7), None);
        assert_eq!(
            FunctionCode::from_u8(1).and_then(FunctionCode::function),
            Some(Function::Search)
        );
    }
}
