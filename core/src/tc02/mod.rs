//! Type 550 / TC02 DECtape control
//!
//! One controller fronting eight independently addressable tape
//! transports. The host talks to the controller through five command
//! pulses (MSE/MLC/MRD/MWR/MRS) carrying 18-bit operands; the simulator
//! drives it through `Tickable`, under which per-transport scheduled
//! events fire in simulated-time order and clock tape lines past the
//! heads.

pub mod drive;
pub mod motion;
pub mod regs;

use anyhow::{Result, bail};
use log::*;
use num_traits::FromPrimitive;
use thiserror::Error;

use reel_tape::{
    BLOCK_NUM_WORD, CHECKSUM_WORD, END_ZONE_LINES, HT_WORDS, TapeImage, TapeWord, WORD_MASK,
    complement_obverse,
};

use crate::debuggable::Debuggable;
use crate::tickable::{Tickable, Ticks};
use crate::types::LatchingEvent;
use crate::{dbgprop_bool, dbgprop_udec, dbgprop_word18};

use drive::{PositionUpdate, TapeDrive};
use motion::{Direction, Function, FunctionCode, Motion, MotionStep};
use regs::{ErrorBit, StatusA, StatusB};

pub const NUM_DRIVES: usize = 8;

/// Tape timing constants, in simulated ticks. All strictly positive.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TimingParams {
    /// Ticks for one tape line to pass the head at speed
    pub line_time: Ticks,
    /// Ticks to ramp from stop up to speed
    pub accel_time: Ticks,
    /// Ticks to coast from speed down to stop
    pub decel_time: Ticks,
}

impl Default for TimingParams {
    fn default() -> Self {
        Self {
            line_time: 12,
            accel_time: 54_000,
            decel_time: 72_000,
        }
    }
}

impl TimingParams {
    pub fn new(line_time: Ticks, accel_time: Ticks, decel_time: Ticks) -> Result<Self> {
        if line_time == 0 || accel_time == 0 || decel_time == 0 {
            bail!("Tape timing constants must be strictly positive");
        }
        Ok(Self {
            line_time,
            accel_time,
            decel_time,
        })
    }
}

/// Why the command decoder refused a command. Every cause surfaces to the
/// host as the SEL error bit.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    #[error("no transport at unit select {0:o}")]
    InvalidUnit(u8),
    #[error("transport {0} is disabled")]
    Disabled(usize),
    #[error("transport {0} has no tape attached")]
    NotAttached(usize),
    #[error("function code {0:o} is not implemented")]
    BadFunction(u8),
    #[error("transport {0} is write protected")]
    WriteProtected(usize),
}

/// Controller substate within a block
#[derive(Debug, Default, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct BlockSubstate {
    /// Between a block end flag and the first data word of the next block
    pub start_of_block: bool,
    /// The host's memory word count ran out mid-block (host-signalled)
    pub wc_overflow: bool,
}

/// Bits of the IO-skip summary word (see [`TapeController::iors`])
pub const IORS_FLAG: TapeWord = 0o1;
pub const IORS_SOB: TapeWord = 0o2;
pub const IORS_WCO: TapeWord = 0o4;

/// Type 550 / TC02 DECtape controller
pub struct TapeController {
    cycles: Ticks,
    timing: TimingParams,

    pub(crate) status_a: StatusA,
    pub(crate) status_b: StatusB,
    pub(crate) data_buffer: TapeWord,
    pub(crate) substate: BlockSubstate,

    int_req: LatchingEvent,

    pub(crate) drives: [TapeDrive; NUM_DRIVES],
}

impl TapeController {
    pub fn new(timing: TimingParams) -> Self {
        Self {
            cycles: 0,
            timing,
            status_a: StatusA(0),
            status_b: StatusB(0),
            data_buffer: 0,
            substate: BlockSubstate::default(),
            int_req: LatchingEvent::default(),
            drives: core::array::from_fn(TapeDrive::new),
        }
    }

    pub fn cycles(&self) -> Ticks {
        self.cycles
    }

    pub fn drive(&self, drive: usize) -> &TapeDrive {
        &self.drives[drive]
    }

    /// Mounts a tape image on a transport
    pub fn attach(&mut self, drive: usize, image: TapeImage) -> Result<()> {
        self.drives[drive].attach(image, self.cycles)
    }

    /// Unmounts a transport's tape image, cancelling anything pending
    pub fn detach(&mut self, drive: usize) -> Option<TapeImage> {
        self.drives[drive].detach()
    }

    /// Retrieves the image of a transport that detached itself off-reel
    pub fn take_unloaded_image(&mut self, drive: usize) -> Option<Box<TapeImage>> {
        self.drives[drive].take_unloaded_image()
    }

    pub fn set_enabled(&mut self, drive: usize, enabled: bool) {
        self.drives[drive].enabled = enabled;
    }

    pub fn set_write_lock(&mut self, drive: usize, locked: bool) {
        self.drives[drive].write_locked = locked;
    }

    /// Maps the Status A unit select field onto a transport index.
    /// Unit 0 selects nothing, 1..7 map straight, 10 (octal) selects
    /// transport 0, the rest select nothing.
    fn unit_index(unit: u8) -> Option<usize> {
        match unit {
            1..=7 => Some(unit as usize),
            0o10 => Some(0),
            _ => None,
        }
    }

    fn selected_index(&self) -> Option<usize> {
        Self::unit_index(self.status_a.unit())
    }

    /// MSE command pulse: select a transport. The previously selected
    /// transport, if moving, is steered into off-reel coasting.
    pub fn mse(&mut self, word: TapeWord) {
        let new_unit = StatusA(word & WORD_MASK).unit();
        if new_unit != self.status_a.unit() {
            if let Some(old) = self.selected_index() {
                self.deselect(old);
            }
            self.status_a.set_unit(new_unit);
        }
        self.status_b.clear_flags();
        self.substate = BlockSubstate::default();
        self.refresh_int();
    }

    /// MLC command pulse: load start/stop, direction and function, then
    /// run the motion-transition engine
    pub fn mlc(&mut self, word: TapeWord) {
        let w = StatusA(word & WORD_MASK);
        self.status_a.set_go(w.go());
        self.status_a.set_reverse(w.reverse());
        self.status_a.set_function(w.function());
        self.status_b.clear_flags();
        self.substate = BlockSubstate::default();

        match self.validate_command() {
            Ok((unit, func)) => self.apply_command(unit, func),
            Err(e) => {
                warn!("Command rejected: {e}");
                self.set_error(ErrorBit::Select);
            }
        }
        self.refresh_int();
    }

    /// MRD command pulse: the host takes the exchanged word
    pub fn mrd(&mut self) -> TapeWord {
        self.status_b.set_dtf(false);
        self.status_b.set_bef(false);
        self.refresh_int();
        self.data_buffer
    }

    /// MWR command pulse: the host supplies the next word
    pub fn mwr(&mut self, word: TapeWord) {
        self.data_buffer = word & WORD_MASK;
        self.status_b.set_dtf(false);
        self.status_b.set_bef(false);
        self.refresh_int();
    }

    /// MRS command pulse: read Status B. REV and GO are recomputed from
    /// the selected transport's motion state.
    pub fn mrs(&mut self) -> TapeWord {
        let (rev, go) = match self.selected_index() {
            Some(unit) => {
                let state = &self.drives[unit].state;
                (
                    state.motion().direction() == Some(Direction::Reverse),
                    state.motion().is_driving() || state.has_queued(),
                )
            }
            None => (false, false),
        };
        self.status_b.set_rev(rev);
        self.status_b.set_go(go);
        self.refresh_int();
        self.status_b.0
    }

    /// Level output: asserted while any of DTF/BEF/ERF is up
    pub fn int_asserted(&self) -> bool {
        self.status_b.flags_raised()
    }

    /// Edge latch for hosts that queue interrupt requests
    pub fn take_int_request(&mut self) -> bool {
        self.int_req.get_clear()
    }

    /// IO-skip bus summary word
    pub fn iors(&self) -> TapeWord {
        let mut w = 0;
        if self.status_b.flags_raised() {
            w |= IORS_FLAG;
        }
        if self.substate.start_of_block {
            w |= IORS_SOB;
        }
        if self.substate.wc_overflow {
            w |= IORS_WCO;
        }
        w
    }

    /// Host signal: the memory word count overflowed mid-block
    pub fn set_wc_overflow(&mut self) {
        self.substate.wc_overflow = true;
    }

    /// RESET line. A warm reset over a running simulation decelerates
    /// every moving transport, preserving position continuity; a cold
    /// reset stops them in place. Attachments and positions survive both.
    pub fn reset(&mut self, hard: bool) {
        self.status_a = StatusA(0);
        self.status_b = StatusB(0);
        self.data_buffer = 0;
        self.substate = BlockSubstate::default();

        let now = self.cycles;
        for unit in 0..NUM_DRIVES {
            if hard {
                self.drives[unit].cancel();
                self.drives[unit].state.reset();
                continue;
            }
            let motion = self.drives[unit].state.motion();
            if motion.is_driving() {
                if self.drives[unit].update_position(now, &self.timing)
                    == PositionUpdate::OffReel
                {
                    continue;
                }
                let dir = motion.direction().unwrap();
                let drv = &mut self.drives[unit];
                let func = drv.state.func();
                drv.cancel();
                drv.state.set(MotionStep {
                    motion: Motion::Decelerating(dir),
                    func,
                });
                drv.schedule(now + self.timing.decel_time);
            }
        }
    }

    fn refresh_int(&mut self) {
        if self.status_b.flags_raised() {
            self.int_req.set();
        }
    }

    /// Validates the freshly loaded command register against the selected
    /// transport
    fn validate_command(&self) -> std::result::Result<(usize, Function), CommandError> {
        let raw_unit = self.status_a.unit();
        let unit = Self::unit_index(raw_unit).ok_or(CommandError::InvalidUnit(raw_unit))?;
        let drv = &self.drives[unit];
        if !drv.enabled {
            return Err(CommandError::Disabled(unit));
        }
        if !drv.is_attached() {
            return Err(CommandError::NotAttached(unit));
        }
        let raw_fnc = self.status_a.function();
        let func = FunctionCode::from_u8(raw_fnc)
            .and_then(FunctionCode::function)
            .ok_or(CommandError::BadFunction(raw_fnc))?;
        if func.is_write() && drv.is_write_protected() {
            return Err(CommandError::WriteProtected(unit));
        }
        Ok((unit, func))
    }

    /// The motion-transition engine: classifies the freshly loaded command
    /// against the transport's current motion and queues up the ramps
    fn apply_command(&mut self, unit: usize, func: Function) {
        let now = self.cycles;
        let new_dir = if self.status_a.reverse() {
            Direction::Reverse
        } else {
            Direction::Forward
        };
        let new_moving = self.status_a.go();
        let prev_motion = self.drives[unit].state.motion();

        match (prev_motion.is_moving(), new_moving) {
            (false, false) => (),
            (false, true) => {
                // Start from stop
                let drv = &mut self.drives[unit];
                let _ = drv.update_position(now, &self.timing);
                drv.cancel();
                drv.schedule(now + self.timing.accel_time);
                drv.state.set(MotionStep {
                    motion: Motion::Accelerating(new_dir),
                    func,
                });
                drv.state.queue(MotionStep {
                    motion: Motion::AtSpeed(new_dir),
                    func,
                });
                debug!("Drive {unit}: start {new_dir} {func}");
            }
            (true, false) => {
                // Stop; already ramping down means nothing to do
                if !matches!(prev_motion, Motion::Decelerating(_)) {
                    let prev_dir = prev_motion.direction().unwrap();
                    if !self.integrate(unit) {
                        return;
                    }
                    let drv = &mut self.drives[unit];
                    let prev_func = drv.state.func();
                    drv.cancel();
                    drv.schedule(now + self.timing.decel_time);
                    drv.state.set(MotionStep {
                        motion: Motion::Decelerating(prev_dir),
                        func: prev_func,
                    });
                    debug!("Drive {unit}: stop from {prev_dir}");
                }
            }
            (true, true) => {
                let prev_dir = prev_motion.direction().unwrap();
                if prev_dir != new_dir {
                    // Reversal under load: ramp down, ramp back up the
                    // other way, then run the function
                    if !self.integrate(unit) {
                        return;
                    }
                    let drv = &mut self.drives[unit];
                    drv.cancel();
                    drv.schedule(now + self.timing.decel_time);
                    drv.state.set(MotionStep {
                        motion: Motion::Decelerating(prev_dir),
                        func,
                    });
                    drv.state.queue(MotionStep {
                        motion: Motion::Accelerating(new_dir),
                        func,
                    });
                    drv.state.queue(MotionStep {
                        motion: Motion::AtSpeed(new_dir),
                        func,
                    });
                    debug!("Drive {unit}: reversal to {new_dir} {func}");
                } else {
                    match prev_motion {
                        Motion::Decelerating(_) => {
                            // Coasting down in the commanded direction:
                            // spin back up
                            if !self.integrate(unit) {
                                return;
                            }
                            let drv = &mut self.drives[unit];
                            drv.cancel();
                            drv.schedule(now + self.timing.accel_time);
                            drv.state.set(MotionStep {
                                motion: Motion::Accelerating(new_dir),
                                func,
                            });
                            drv.state.queue(MotionStep {
                                motion: Motion::AtSpeed(new_dir),
                                func,
                            });
                        }
                        Motion::Accelerating(_) => {
                            // Keep the ramp-up event, just retarget what
                            // runs once at speed
                            let drv = &mut self.drives[unit];
                            drv.state.clear_queued();
                            drv.state.queue(MotionStep {
                                motion: Motion::AtSpeed(new_dir),
                                func,
                            });
                        }
                        Motion::AtSpeed(_) => {
                            self.drives[unit].state.set(MotionStep {
                                motion: Motion::AtSpeed(new_dir),
                                func,
                            });
                            self.launch_function(unit);
                        }
                        Motion::Stop => unreachable!(),
                    }
                }
            }
        }
    }

    /// Deselected transports must not touch the shared registers any
    /// more. A moving one is steered into off-reel coasting; it detaches
    /// itself at the reel end.
    fn deselect(&mut self, unit: usize) {
        if !self.drives[unit].is_attached() {
            return;
        }
        match self.drives[unit].state.motion() {
            Motion::Stop => (),
            Motion::AtSpeed(d) => {
                self.drives[unit].state.set(MotionStep {
                    motion: Motion::AtSpeed(d),
                    func: Function::OffReel,
                });
                debug!("Drive {unit}: deselected at speed, coasting off-reel");
                self.launch_function(unit);
            }
            Motion::Accelerating(d) => {
                let drv = &mut self.drives[unit];
                drv.state.clear_queued();
                drv.state.queue(MotionStep {
                    motion: Motion::AtSpeed(d),
                    func: Function::OffReel,
                });
            }
            Motion::Decelerating(_) => {
                self.drives[unit].state.retarget_queued(Function::OffReel);
            }
        }
    }

    /// Integrates a transport's position. On an off-reel runaway the
    /// drive has already detached itself; SEL is raised if it was the
    /// selected one. Returns false if the drive is gone.
    fn integrate(&mut self, unit: usize) -> bool {
        match self.drives[unit].update_position(self.cycles, &self.timing) {
            PositionUpdate::OffReel => {
                if self.selected_index() == Some(unit) {
                    self.set_error(ErrorBit::Select);
                }
                false
            }
            _ => true,
        }
    }

    /// Error propagator: clears the start bit, latches ERF plus the
    /// specific bit, and spins the selected transport down
    fn set_error(&mut self, bit: ErrorBit) {
        warn!("Tape error: {bit}");
        self.status_a.set_go(false);
        bit.set_in(&mut self.status_b);
        self.status_b.set_erf(true);

        if let Some(unit) = self.selected_index() {
            let motion = self.drives[unit].state.motion();
            if self.drives[unit].is_attached() && motion.is_driving() {
                let dir = motion.direction().unwrap();
                if self.drives[unit].update_position(self.cycles, &self.timing)
                    != PositionUpdate::OffReel
                {
                    let drv = &mut self.drives[unit];
                    let func = drv.state.func();
                    drv.cancel();
                    drv.state.set(MotionStep {
                        motion: Motion::Decelerating(dir),
                        func,
                    });
                    drv.schedule(self.cycles + self.timing.decel_time);
                }
            }
        }
        self.refresh_int();
    }

    /// The function launcher: starts functional processing on a transport
    /// that reached (or was commanded at) speed
    fn launch_function(&mut self, unit: usize) {
        let now = self.cycles;
        match self.drives[unit].update_position(now, &self.timing) {
            PositionUpdate::OffReel => {
                if self.selected_index() == Some(unit) {
                    self.set_error(ErrorBit::Select);
                }
                return;
            }
            // Keep the block-offset math off the line it already serviced
            PositionUpdate::Unchanged => self.drives[unit].nudge(),
            PositionUpdate::Moved => (),
        }

        let drv = &self.drives[unit];
        let step = drv.state.current();
        let Some(dir) = step.motion.direction() else {
            return;
        };
        let func = step.func;
        let fmt = drv.format();
        let pos = drv.position();
        let lt = self.timing.line_time;
        let wlines = fmt.word_lines();
        let lpb = fmt.lines_per_block();

        // A function pointed at the wrong reel end only has end zone
        // ahead of it
        if func != Function::OffReel {
            let wrong_end = match dir {
                Direction::Forward => pos >= fmt.fwd_end_zone_line(),
                Direction::Reverse => pos < END_ZONE_LINES,
            };
            if wrong_end {
                self.set_error(ErrorBit::EndZone);
                return;
            }
        }

        debug!("Drive {unit}: launch {func} {dir} at line {pos}");
        let target = match func {
            Function::OffReel => match dir {
                Direction::Forward => fmt.total_lines(),
                Direction::Reverse => 0,
            },
            Function::Move => match dir {
                Direction::Forward => fmt.fwd_end_zone_line() + wlines,
                Direction::Reverse => END_ZONE_LINES - wlines,
            },
            Function::Search => {
                let blkline = BLOCK_NUM_WORD * wlines;
                match dir {
                    // Forward: the block number word of the next block ahead
                    Direction::Forward => {
                        let blk = if pos < END_ZONE_LINES {
                            0
                        } else {
                            (pos - END_ZONE_LINES) / lpb + 1
                        };
                        END_ZONE_LINES + blk * lpb + blkline + (wlines - 1)
                    }
                    // Reverse: the reverse block number word of the next
                    // block back
                    Direction::Reverse => {
                        let blk = if pos >= fmt.fwd_end_zone_line() {
                            fmt.tape_blocks()
                        } else {
                            (pos - END_ZONE_LINES) / lpb
                        };
                        END_ZONE_LINES + blk * lpb - blkline - wlines
                    }
                }
            }
            Function::Read | Function::ReadAll | Function::Write | Function::WriteAll => {
                if func.is_write() {
                    // The host owes the first word before the tape gets
                    // there
                    self.status_b.set_dtf(true);
                    self.refresh_int();
                }
                self.substate.start_of_block = true;
                // Word alignment: service events fire on the last line of
                // each word going forward, on the first line in reverse
                match dir {
                    Direction::Forward => (pos / wlines + 1) * wlines + (wlines - 1),
                    Direction::Reverse => (pos / wlines) * wlines - wlines,
                }
            }
        };

        let delta = Ticks::from(target.abs_diff(pos));
        let drv = &mut self.drives[unit];
        drv.cancel();
        drv.schedule(now + delta * lt);
    }

    /// A scheduled transport event came due
    fn service(&mut self, unit: usize) {
        match self.drives[unit].state.motion() {
            Motion::Stop => (),
            Motion::Decelerating(_) => {
                if !self.integrate(unit) {
                    return;
                }
                let drv = &mut self.drives[unit];
                drv.state.advance();
                if drv.state.motion().is_moving() {
                    // A reversal was queued behind the ramp-down
                    drv.schedule(self.cycles + self.timing.accel_time);
                }
            }
            Motion::Accelerating(_) => {
                if !self.integrate(unit) {
                    return;
                }
                self.drives[unit].state.advance();
                self.launch_function(unit);
            }
            Motion::AtSpeed(dir) => self.service_line(unit, dir),
        }
    }

    /// Per-line service: one functional event for an at-speed transport
    fn service_line(&mut self, unit: usize, dir: Direction) {
        if !self.integrate(unit) {
            return;
        }

        let func = self.drives[unit].state.func();
        match func {
            Function::OffReel => {
                // Coasted past the end zone while deselected
                self.drives[unit].run_off_reel();
                return;
            }
            Function::Move => {
                // End zone arrival, the normal termination of MOVE
                self.set_error(ErrorBit::EndZone);
                return;
            }
            _ => (),
        }

        if self.drives[unit].in_end_zone() {
            self.set_error(ErrorBit::EndZone);
            return;
        }

        let (fmt, pos) = {
            let drv = &self.drives[unit];
            (drv.format(), drv.position())
        };
        let now = self.cycles;
        let lt = self.timing.line_time;
        let wlines = fmt.word_lines();
        let lpb = fmt.lines_per_block();
        let rel = pos - END_ZONE_LINES;
        let block = rel / lpb;
        let offset = rel % lpb;
        let wd = offset / wlines;
        let frame_last = fmt.frame_words() - 1;
        // The checksum slot that terminates a block in this direction of
        // motion, and the one leading into it
        let end_csum = match dir {
            Direction::Forward => frame_last - CHECKSUM_WORD,
            Direction::Reverse => CHECKSUM_WORD,
        };
        let lead_csum = match dir {
            Direction::Forward => CHECKSUM_WORD,
            Direction::Reverse => frame_last - CHECKSUM_WORD,
        };
        let reverse = dir == Direction::Reverse;
        let in_data = wd >= HT_WORDS && wd < HT_WORDS + fmt.block_words();

        match func {
            Function::Search => {
                if self.status_b.dtf() {
                    self.set_error(ErrorBit::Timing);
                    return;
                }
                self.data_buffer = block & WORD_MASK;
                self.status_b.set_dtf(true);
                self.drives[unit].schedule(now + Ticks::from(lpb) * lt);
            }
            Function::Read | Function::ReadAll => {
                if in_data {
                    if self.status_b.dtf() {
                        self.set_error(ErrorBit::Timing);
                        return;
                    }
                    let idx = (wd - HT_WORDS) as usize;
                    let addr = block as usize * fmt.block_words() as usize + idx;
                    let w = self.drives[unit].image.read_word(addr);
                    self.data_buffer = if reverse { complement_obverse(w) } else { w };
                    self.status_b.set_dtf(true);
                    self.substate.start_of_block = false;
                } else if wd == 0 || wd == frame_last {
                    // End-zone-adjacent slots pass silently
                } else if wd == end_csum {
                    if self.status_b.dtf() {
                        self.set_error(ErrorBit::Timing);
                        return;
                    }
                    let w = self.drives[unit].image.header_word(block, wd);
                    self.data_buffer = if reverse { complement_obverse(w) } else { w };
                    // Terminating checksum: block end instead of a data flag
                    self.status_b.set_bef(true);
                    self.substate.start_of_block = true;
                } else if func == Function::ReadAll || wd == lead_csum {
                    if self.status_b.dtf() {
                        self.set_error(ErrorBit::Timing);
                        return;
                    }
                    let w = self.drives[unit].image.header_word(block, wd);
                    self.data_buffer = if reverse { complement_obverse(w) } else { w };
                    self.status_b.set_dtf(true);
                }
                self.drives[unit].schedule(now + Ticks::from(wlines) * lt);
            }
            Function::Write | Function::WriteAll => {
                if in_data {
                    if self.status_b.dtf() {
                        self.set_error(ErrorBit::Timing);
                        return;
                    }
                    let idx = (wd - HT_WORDS) as usize;
                    let addr = block as usize * fmt.block_words() as usize + idx;
                    let w = if reverse {
                        complement_obverse(self.data_buffer)
                    } else {
                        self.data_buffer
                    };
                    self.drives[unit].image.write_word(addr, w);
                    self.substate.start_of_block = false;
                    let last_data = match dir {
                        Direction::Forward => wd == HT_WORDS + fmt.block_words() - 1,
                        Direction::Reverse => wd == HT_WORDS,
                    };
                    if last_data {
                        // The host supplies the checksum word next
                        self.status_b.set_bef(true);
                        self.substate.start_of_block = true;
                    } else {
                        self.status_b.set_dtf(true);
                    }
                } else if wd == 0 || wd == frame_last {
                    // End-zone-adjacent slots pass silently
                } else if wd == end_csum {
                    // The supplied checksum goes to tape, not to the image;
                    // ask for the next word
                    if self.status_b.dtf() {
                        self.set_error(ErrorBit::Timing);
                        return;
                    }
                    self.status_b.set_dtf(true);
                } else if func == Function::WriteAll {
                    if self.status_b.dtf() {
                        self.set_error(ErrorBit::Timing);
                        return;
                    }
                    self.status_b.set_dtf(true);
                }
                self.drives[unit].schedule(now + Ticks::from(wlines) * lt);
            }
            Function::Move | Function::OffReel => unreachable!(),
        }
        self.refresh_int();
    }

    fn next_due(&self, limit: Ticks) -> Option<usize> {
        self.drives
            .iter()
            .enumerate()
            .filter_map(|(i, d)| d.deadline().map(|t| (t, i)))
            .filter(|&(t, _)| t <= limit)
            .min()
            .map(|(_, i)| i)
    }
}

impl Tickable for TapeController {
    fn tick(&mut self, ticks: Ticks) -> Result<Ticks> {
        let target = self.cycles + ticks;
        while let Some(unit) = self.next_due(target) {
            let due = self.drives[unit].deadline().unwrap();
            self.drives[unit].cancel();
            self.cycles = due;
            self.service(unit);
        }
        self.cycles = target;
        Ok(ticks)
    }
}

impl Debuggable for TapeController {
    fn get_debug_properties(&self) -> crate::debuggable::DebuggableProperties {
        use crate::debuggable::*;

        let mut props = vec![
            dbgprop_udec!("Cycles", self.cycles),
            dbgprop_word18!("Status A", self.status_a.0),
            dbgprop_word18!("Status B", self.status_b.0),
            dbgprop_word18!("Data buffer", self.data_buffer),
            dbgprop_bool!("Start of block", self.substate.start_of_block),
            dbgprop_bool!("WC overflow", self.substate.wc_overflow),
        ];
        for (i, drv) in self.drives.iter().enumerate() {
            props.push(DebuggableProperty::new(
                format!("Drive {i}"),
                DebuggablePropertyValue::Nested(drv.get_debug_properties()),
            ));
        }
        props
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_tape::TapeFormat;

    fn controller() -> TapeController {
        let mut c = TapeController::new(TimingParams::default());
        c.attach(1, TapeImage::blank(TapeFormat::Native18, "unit1"))
            .unwrap();
        c
    }

    fn command(unit: u8, go: bool, reverse: bool, function: u8) -> TapeWord {
        let mut a = StatusA(0);
        a.set_unit(unit);
        a.set_go(go);
        a.set_reverse(reverse);
        a.set_function(function);
        a.0
    }

    #[test]
    fn timing_params_reject_zero() {
        assert!(TimingParams::new(0, 1, 1).is_err());
        assert!(TimingParams::new(12, 54_000, 72_000).is_ok());
    }

    #[test]
    fn unit_select_mapping() {
        assert_eq!(TapeController::unit_index(0), None);
        assert_eq!(TapeController::unit_index(3), Some(3));
        assert_eq!(TapeController::unit_index(0o10), Some(0));
        assert_eq!(TapeController::unit_index(0o11), None);
    }

    #[test]
    fn mlc_rejects_bad_unit() {
        let mut c = controller();
        c.mse(command(0, false, false, 0));
        c.mlc(command(0, true, false, FunctionCode::Search as u8));
        let b = StatusB(c.mrs());
        assert!(b.erf() && b.sel());
        assert!(!c.status_a.go());
    }

    #[test]
    fn mlc_rejects_unattached() {
        let mut c = controller();
        c.mse(command(2, false, false, 0));
        c.mlc(command(2, true, false, FunctionCode::Read as u8));
        assert!(StatusB(c.mrs()).sel());
    }

    #[test]
    fn mlc_rejects_disabled() {
        let mut c = controller();
        c.set_enabled(1, false);
        c.mse(command(1, false, false, 0));
        c.mlc(command(1, true, false, FunctionCode::Read as u8));
        assert!(StatusB(c.mrs()).sel());
    }

    #[test]
    fn mlc_rejects_write_mark() {
        let mut c = controller();
        c.mse(command(1, false, false, 0));
        c.mlc(command(1, true, false, FunctionCode::WriteMark as u8));
        assert!(StatusB(c.mrs()).sel());
    }

    #[test]
    fn mlc_rejects_write_on_locked_drive() {
        let mut c = controller();
        c.set_write_lock(1, true);
        c.mse(command(1, false, false, 0));
        c.mlc(command(1, true, false, FunctionCode::Write as u8));
        assert!(StatusB(c.mrs()).sel());
        // Reading a locked drive is fine
        c.mlc(command(1, true, false, FunctionCode::Read as u8));
        assert!(!StatusB(c.mrs()).sel());
    }

    #[test]
    fn mrd_mwr_clear_flags() {
        let mut c = controller();
        c.status_b.set_dtf(true);
        c.data_buffer = 0o1234;
        assert_eq!(c.mrd(), 0o1234);
        assert!(!c.status_b.dtf());

        c.status_b.set_bef(true);
        c.mwr(0o4321);
        assert!(!c.status_b.bef());
        assert_eq!(c.data_buffer, 0o4321);
    }

    #[test]
    fn mse_clears_errors() {
        let mut c = controller();
        c.mlc(command(0, true, false, 0));
        assert!(StatusB(c.mrs()).erf());
        c.mse(command(1, false, false, 0));
        let b = StatusB(c.mrs());
        assert!(!b.erf() && !b.sel());
    }

    #[test]
    fn interrupt_latch_follows_flags() {
        let mut c = controller();
        assert!(!c.take_int_request());
        c.status_b.set_dtf(true);
        c.refresh_int();
        assert!(c.int_asserted());
        assert!(c.take_int_request());
        assert!(!c.take_int_request());
        assert_eq!(c.iors() & IORS_FLAG, IORS_FLAG);
    }
}
