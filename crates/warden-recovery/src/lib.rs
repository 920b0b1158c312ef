//! warden-recovery: decides when the managed service gets restarted.
//!
//! # State machine
//!
//! ```text
//!            tick                breach (not cooling down)
//!   Idle ───────────► Evaluating ─────────────────────────► RestartInFlight
//!    ▲                    │ no breach                              │ restart issued
//!    └────────────────────┘                                        ▼
//!    ▲                                                          CoolDown
//!    └──────────────── cool-down elapsed (checked on tick) ────────┘
//! ```
//!
//! Signals are independent and OR-ed: one breach is enough. While cooling
//! down, ticks still observe and audit but never restart. A restart that is
//! not confirmed healthy within `verify_attempts × verify_delay` is
//! `restart-failed`; it is not retried inside the cycle.
//!
//! All mutable monitoring state lives in [`MonitorContext`], passed
//! explicitly to every cycle. Taking it by `&mut` is what keeps a second
//! restart from starting while one is in flight.

pub mod context;
pub mod controller;
pub mod error;
pub mod policy;
pub mod supervisor;

pub use context::{ControllerState, MonitorContext, Transition};
pub use controller::{ControllerParts, ControllerSettings, RecoveryController};
pub use error::{RecoveryError, RecoveryResult};
pub use policy::{Observation, Thresholds};
pub use supervisor::{ServiceControl, SystemdSupervisor};
