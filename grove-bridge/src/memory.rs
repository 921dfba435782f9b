//! In-process driver functions

use std::collections::HashMap;
use std::sync::Mutex;

use crate::{Bridge, Scalar};

type DriverFn = Box<dyn Fn(Option<Scalar>) -> Option<Scalar> + Send + Sync>;

/// A recorded bridge call
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub function: String,
    pub arg: Option<Scalar>,
}

/// Bridge backed by closures registered by name.
///
/// Unknown names behave like an unresolvable driver symbol and return `None`.
/// Every call is recorded, including failed ones.
#[derive(Default)]
pub struct MemoryBridge {
    functions: HashMap<String, DriverFn>,
    calls: Mutex<Vec<Call>>,
}

impl MemoryBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver function
    pub fn with_function<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(Option<Scalar>) -> Option<Scalar> + Send + Sync + 'static,
    {
        self.functions.insert(name.to_string(), Box::new(f));
        self
    }

    /// Register a function that always returns `value`
    pub fn with_value(self, name: &str, value: Scalar) -> Self {
        self.with_function(name, move |_| Some(value.clone()))
    }

    /// All calls so far, oldest first
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Bridge for MemoryBridge {
    async fn call(&self, function: &str, arg: Option<Scalar>) -> Option<Scalar> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(Call {
                function: function.to_string(),
                arg: arg.clone(),
            });
        }

        match self.functions.get(function) {
            Some(f) => f(arg),
            None => {
                tracing::warn!(func = function, "driver function not found");
                None
            }
        }
    }
}
