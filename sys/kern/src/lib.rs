// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel primitives.
//!
//! This is the layer a scheduler and drivers are built on: a system call
//! interface that manufactures resources ([`System`]), a counting semaphore
//! ([`Semaphore`]), and interrupt controller handles ([`Interrupt`]) that can
//! redirect where interrupt entry and exit save registers, which is all a
//! preemptive context switch needs.
//!
//! The code outside of the `arch` module is portable. Hosted builds use
//! `arch::sim`, which runs everything on host threads.
//!
//! # Design principles
//!
//! 1. Nothing fails loudly. Resources that could not be built are returned
//!    unconstructed (see [`abi::Object`]) and every operation on them is a
//!    harmless no-op. Factories return `None` when memory runs out.
//! 2. Every object the system hands out is placed through its
//!    [`object_alloc::Allocator`], so a build without a heap only has to
//!    supply a static arena.
//! 3. Exactly one owner per hardware resource: one handler per interrupt
//!    source, one handle per timer.
//! 4. A strong preference for safe code where reasonable. The only `unsafe`
//!    here follows a caller-supplied register save area.

#![cfg_attr(target_os = "none", no_std)]

extern crate alloc;

pub mod arch;
pub mod config;
pub mod interrupt;
pub mod semaphore;
pub mod system;
pub mod timer;
pub mod trace;

pub use config::Config;
pub use interrupt::{CpuRegisters, Interrupt};
pub use semaphore::Semaphore;
pub use system::System;
pub use timer::Timer;
