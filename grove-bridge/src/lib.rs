//! Grove Bridge
//!
//! Calls into the GrovePi hardware driver, which is a Python module.
//!
//! This crate provides:
//! - The [`Bridge`] trait: call a named driver function with zero or one
//!   scalar argument and get a scalar back, or nothing on failure
//! - [`PythonBridge`]: one long-lived interpreter session per bridge
//! - [`MemoryBridge`]: in-process functions, for running without hardware
//!
//! Bridge calls never fail loudly. The device may be unplugged during a demo,
//! so every failure (module missing, function missing, not callable,
//! exception, dead interpreter) is logged and reported as `None`.

mod memory;
mod python;

use std::future::Future;

use serde::{Deserialize, Serialize};

pub use memory::{Call, MemoryBridge};
pub use python::{BridgeConfig, PythonBridge};

/// A scalar crossing the bridge in either direction
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// The function returned nothing (`None` on the Python side)
    #[default]
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    /// Numeric value, widening integers
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Float(v) => Some(*v),
            Scalar::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Str(v.to_string())
    }
}

/// Trait for calling hardware driver functions
///
/// Implementations serialize calls as needed; callers may share one bridge
/// across tasks.
pub trait Bridge: Send + Sync + 'static {
    /// Call `function` with an optional argument. `None` means the call did
    /// not produce a result.
    fn call(
        &self,
        function: &str,
        arg: Option<Scalar>,
    ) -> impl Future<Output = Option<Scalar>> + Send;
}
