// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Architecture-specific support.
//!
//! In practice, this works by
//!
//! - Conditionally defining a nested module (below).
//! - `pub use`-ing its contents
//!
//! Thus, all architecture-specific types and functions show up right here in
//! the `arch` module, magically tailored for the current target.
//!
//! For this to work, each architecture support module must define the same set
//! of names:
//!
//! - `IRQ_COUNT`, `TIMER_COUNT`: how many interrupt sources and hardware
//!   timers exist.
//! - `SavedState`: the register-save layout used on interrupt entry and exit.
//! - `Cpu`: per-source masking and pending state, plus `save_state` and
//!   `restore_state` to move registers between the processor and a
//!   `SavedState`.
//! - `SysSemaphore`, `Timer`, `CpuPll`: the platform's implementations of
//!   the corresponding `abi` contracts.

cfg_if::cfg_if! {
    // Note: cfg_if! is slightly touchy about ordering and expression
    // complexity; this chain seems to be the best compromise.

    if #[cfg(not(target_os = "none"))] {
        pub mod sim;
        pub use sim::*;
    } else {
        compile_error!("support for this architecture not implemented");
    }
}
