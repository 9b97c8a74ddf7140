//! Per-endpoint batching policy.

use crate::transport::Response;
use serde_json::Value;

/// Declares whether and how inputs for one endpoint may be coalesced.
///
/// All three functions must be pure. `unbatch_output` must return one response
/// per input, in the same order as `inputs`.
pub trait BatchPolicy: Send + Sync {
    /// Batch window id for this input, or `None` to dispatch it on its own.
    fn can_batch(&self, input: &Value) -> Option<String>;

    /// Combine the queued inputs into one aggregate input.
    fn batch_input(&self, inputs: &[Value]) -> Value;

    /// Split the aggregate response back into per-input responses.
    fn unbatch_output(&self, inputs: &[Value], response: Response) -> Vec<Response>;
}

/// Never batches. Used for endpoints without a declared policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBatching;

impl BatchPolicy for NoBatching {
    fn can_batch(&self, _input: &Value) -> Option<String> {
        None
    }

    fn batch_input(&self, inputs: &[Value]) -> Value {
        Value::Array(inputs.to_vec())
    }

    fn unbatch_output(&self, _inputs: &[Value], response: Response) -> Vec<Response> {
        vec![response]
    }
}

/// Closure-backed [`BatchPolicy`].
pub struct FnBatchPolicy<C, B, U> {
    can_batch: C,
    batch_input: B,
    unbatch_output: U,
}

impl<C, B, U> FnBatchPolicy<C, B, U>
where
    C: Fn(&Value) -> Option<String> + Send + Sync,
    B: Fn(&[Value]) -> Value + Send + Sync,
    U: Fn(&[Value], Response) -> Vec<Response> + Send + Sync,
{
    pub fn new(can_batch: C, batch_input: B, unbatch_output: U) -> Self {
        Self {
            can_batch,
            batch_input,
            unbatch_output,
        }
    }
}

impl<C, B, U> BatchPolicy for FnBatchPolicy<C, B, U>
where
    C: Fn(&Value) -> Option<String> + Send + Sync,
    B: Fn(&[Value]) -> Value + Send + Sync,
    U: Fn(&[Value], Response) -> Vec<Response> + Send + Sync,
{
    fn can_batch(&self, input: &Value) -> Option<String> {
        (self.can_batch)(input)
    }

    fn batch_input(&self, inputs: &[Value]) -> Value {
        (self.batch_input)(inputs)
    }

    fn unbatch_output(&self, inputs: &[Value], response: Response) -> Vec<Response> {
        (self.unbatch_output)(inputs, response)
    }
}
