pub mod clock;
pub mod ticks;

pub use clock::{Clock, LazyNow, SystemClock, TestClock};
pub use ticks::TimeTicks;
