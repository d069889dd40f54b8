pub mod flow;
pub mod motion;

pub use flow::{dense_flow, FlowEstimator, FlowField, FlowFrame, FlowParams, Plane};
pub use motion::{MotionAnalyzer, MotionReport, StaticVerdict};
