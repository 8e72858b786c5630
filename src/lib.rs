//! # Testroom
//!
//! This library is the synchronization core of a live classroom quiz. A
//! teacher publishes a timed test under a join code, students join from
//! their own devices, and the teacher starts and ends the session while
//! every client follows along through a shared document store.
//!
//! The crate is organised around the two sides of a session:
//!
//! * [`teacher::TeacherConsole`] publishes, starts, ends, deletes and lists
//!   tests, keeps a live [`monitor::TestList`] of them, and opens a live
//!   [`monitor::Monitor`] on one of them.
//! * [`student::StudentClient`] joins a test, keeps its participant record
//!   up to date, runs the countdown and submits exactly once.
//!
//! Both talk to a [`store::DocumentStore`] through a
//! [`session::SessionContext`], which owns their subscriptions and releases
//! them on drop. [`store::MemoryStore`] is an in-process store for hosts and
//! tests.

#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::similar_names)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::ignored_unit_patterns)]
#![allow(clippy::struct_field_names)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::wildcard_imports)]

pub mod clock;
pub mod config;
pub mod constants;
pub mod identity;
pub mod join_code;
pub mod lifecycle;
pub mod monitor;
pub mod names;
pub mod order;
pub mod participant;
pub mod quiz;
pub mod scoring;
pub mod session;
pub mod store;
pub mod student;
pub mod teacher;
pub mod timer;

pub use join_code::JoinCode;
pub use lifecycle::Status;
pub use session::SessionContext;
pub use student::StudentClient;
pub use teacher::TeacherConsole;
