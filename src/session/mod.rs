//! File sessions and their reclamation
//!
//! ```text
//!   upload / edit ──start_or_renew──▶ SessionRegistry ◀──reclaim_expired── Reaper
//!   edit, download ──end────────────▶        │                              │
//!                                           └──────── FileStorage ◀───delete┘
//! ```

mod clock;
mod reaper;
mod registry;

pub use clock::{Clock, ManualClock, TokioClock};
pub use reaper::Reaper;
pub use registry::{OrphanSweep, Session, SessionRegistry, MAX_TTL};
