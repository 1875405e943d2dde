use anyhow::Result;

/// Representation of X amount of ticks
/// of the simulated-time base clock.
pub type Ticks = u64;

pub trait Tickable {
    fn tick(&mut self, ticks: Ticks) -> Result<Ticks>;
}
