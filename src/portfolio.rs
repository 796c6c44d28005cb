//! # Portfolio
//!
//! $$
//! \sigma_p^2 = \mathbf{w}^\top \Sigma \mathbf{w}
//! $$
//!
//! Efficient-frontier sweeps and named portfolio selection.

pub(crate) mod data;
pub mod engine;
pub mod frontier;
pub mod optimizers;
pub mod selector;
pub mod types;

pub use engine::EngineOutput;
pub use engine::PortfolioEngine;
pub use engine::PortfolioEngineConfig;
pub use frontier::min_variance_portfolio;
pub use frontier::FrontierSolver;
pub use frontier::Sweep;
pub use optimizers::LevelProblem;
pub use optimizers::Objective;
pub use optimizers::SolverBackend;
pub use optimizers::SolverKind;
pub use selector::select_portfolios;
pub use selector::BalancedRule;
pub use types::Constraints;
pub use types::Frontier;
pub use types::FrontierPoint;
pub use types::Portfolio;
pub use types::PortfolioKind;
pub use types::SelectedPortfolios;
pub use types::SweepFailure;
