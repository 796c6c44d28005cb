//! # portfolio-frontier
//!
//! $$
//! \max_{\mathbf w}\ \mu^\top \mathbf w \quad \text{s.t.}\quad \sqrt{\mathbf w^\top \Sigma \mathbf w} \le \sigma_k,\ \mathbf 1^\top \mathbf w = 1
//! $$
//!
//! Historical prices in, a traced mean-variance efficient frontier and three
//! named portfolios (conservative, balanced, high-risk) out.

pub mod config;
pub mod error;
pub mod market;
pub mod moments;
pub mod pipeline;
pub mod portfolio;
pub mod report;
pub mod returns;
pub mod visualization;

pub use config::PipelineConfig;
pub use config::SourceConfig;
pub use config::SourceKind;
pub use error::FrontierError;
pub use error::Result;
pub use market::DateRange;
pub use market::PriceSource;
pub use market::Ticker;
pub use moments::estimate_moments;
pub use moments::MomentsEstimate;
pub use pipeline::RunOutput;
pub use returns::ReturnFrequency;
pub use returns::ReturnSet;
