//! Embedded DSL for declaring test actions and compiling them into
//! concurrent target programs.
//!
//! Scenario code describes nested actions through a [`Builder`]:
//!
//! ```no_run
//! use purslane_dsl::{generate, Action, RunOptions};
//!
//! let artifacts = generate(&RunOptions::default(), |b| {
//!     b.sequence(|b| {
//!         b.act(Action::native("fill", "fill(0);").on_agent(0))?;
//!         b.act(Action::native("check", "check(0);").on_agent(1))?;
//!         Ok(())
//!     })
//! })?;
//! artifacts.write()?;
//! # Ok::<(), purslane_dsl::DslError>(())
//! ```

pub mod action;
pub mod builder;
pub mod error;
pub mod factory;
pub mod run;
pub mod scope;
pub mod walk;

pub use action::{Action, ActionBody, ActionHandle, LeafBody, LeafContext};
pub use builder::Builder;
pub use error::DslError;
pub use factory::ActionFactory;
pub use run::{generate, Artifacts, BackendTarget, RunOptions};
pub use scope::ScopeKind;
pub use walk::{Transition, TransitionTable};
