pub mod backtest;
pub mod export_features;
pub mod serve;
pub mod train;
