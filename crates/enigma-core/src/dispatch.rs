//! Typed call dispatch.
//!
//! Calls are synchronous: control returns to the host only when the guest
//! function returns or traps. Every call runs under a fresh fuel budget when
//! metering is enabled, so a runaway loop ends as
//! [`RuntimeError::ExecutionBudgetExceeded`] instead of hanging the thread.
//!
//! Any call may grow guest memory, so each one advances the host generation
//! and invalidates previously issued memory spans.

use std::time::Instant;

use tracing::{debug, instrument, warn};
use wasmtime::{Trap, Val, ValType};

use crate::exports::{FunctionHandle, render_signature};
use crate::store::{calculate_fuel_consumed, refuel};
use crate::RuntimeHost;
use enigma_common::RuntimeError;

impl RuntimeHost {
    /// Call a function taking `i32` arguments and returning one `i32`.
    ///
    /// The handle's declared signature is checked before entering the guest.
    /// A failed check leaves the instance untouched and callable.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::ArityMismatch`] if `args.len()` differs from the
    ///   declared parameter count
    /// - [`RuntimeError::TypeMismatch`] if any declared parameter is not
    ///   `i32` or the function does not return exactly one `i32`
    /// - [`RuntimeError::GuestTrap`] if guest execution trapped
    /// - [`RuntimeError::ExecutionBudgetExceeded`] if the call ran out of fuel
    #[instrument(skip(self, handle, args), fields(function = %handle.name(), argc = args.len()))]
    pub fn call_i32(&mut self, handle: &FunctionHandle, args: &[i32]) -> Result<i32, RuntimeError> {
        self.live()?;
        self.check_owner(handle.store_id(), handle.name())?;
        check_i32_signature(handle, args.len())?;

        let params: Vec<Val> = args.iter().copied().map(Val::I32).collect();
        let mut results = [Val::I32(0)];
        self.dispatch(handle, &params, &mut results)?;

        results[0].i32().ok_or_else(|| RuntimeError::TypeMismatch {
            function: handle.name().to_string(),
            expected: i32_signature(args.len()),
            found: handle.signature(),
        })
    }

    /// Call a zero-argument function returning one `i32`.
    ///
    /// This is the shape of "pointer getter" exports that tell the host
    /// where to stage data in guest memory.
    pub fn call_noargs_i32(&mut self, handle: &FunctionHandle) -> Result<i32, RuntimeError> {
        self.call_i32(handle, &[])
    }

    /// Enter guest code with the given values.
    fn dispatch(
        &mut self,
        handle: &FunctionHandle,
        params: &[Val],
        results: &mut [Val],
    ) -> Result<(), RuntimeError> {
        let metered = self.engine()?.is_fuel_metered();
        let budget = self.exec_config().max_fuel;

        // Spans issued before this point may dangle once the guest runs
        self.advance_generation();

        let live = self.live_mut()?;
        if metered {
            refuel(&mut live.store, budget)?;
        }

        let start = Instant::now();
        let outcome = handle.func().call(&mut live.store, params, results);
        let elapsed = start.elapsed();

        let fuel_consumed = if metered {
            calculate_fuel_consumed(budget, &live.store)
        } else {
            0
        };
        live.store
            .data_mut()
            .record_call(fuel_consumed, elapsed, outcome.is_err());

        match outcome {
            Ok(()) => {
                debug!(
                    duration_us = elapsed.as_micros(),
                    fuel_consumed, "Guest call returned"
                );
                Ok(())
            }
            Err(error) => {
                let error = classify_call_error(handle.name(), budget, &error);
                warn!(
                    duration_us = elapsed.as_micros(),
                    fuel_consumed,
                    error = %error,
                    "Guest call failed"
                );
                Err(error)
            }
        }
    }
}

/// Check that a handle takes `argc` `i32` parameters and returns one `i32`.
fn check_i32_signature(handle: &FunctionHandle, argc: usize) -> Result<(), RuntimeError> {
    let expected = handle.param_count();
    if expected != argc {
        return Err(RuntimeError::ArityMismatch {
            function: handle.name().to_string(),
            expected,
            found: argc,
        });
    }

    let params_match = handle.params().all(|ty| matches!(ty, ValType::I32));
    let mut results = handle.results();
    let results_match =
        results.len() == 1 && results.next().is_some_and(|ty| matches!(ty, ValType::I32));

    if params_match && results_match {
        Ok(())
    } else {
        Err(RuntimeError::TypeMismatch {
            function: handle.name().to_string(),
            expected: i32_signature(argc),
            found: handle.signature(),
        })
    }
}

/// The signature `call_i32` assumes for `argc` arguments.
fn i32_signature(argc: usize) -> String {
    render_signature(
        std::iter::repeat_n("i32".to_string(), argc),
        std::iter::once("i32".to_string()),
    )
}

/// Turn a failed call into a host error, keeping the trap diagnostic.
fn classify_call_error(function: &str, budget: u64, error: &wasmtime::Error) -> RuntimeError {
    match error.downcast_ref::<Trap>() {
        Some(Trap::OutOfFuel) => RuntimeError::ExecutionBudgetExceeded {
            function: function.to_string(),
            budget,
        },
        Some(trap) => RuntimeError::GuestTrap {
            function: function.to_string(),
            message: Some(format!("{error:#}")),
            code: Some(format!("{trap:?}")),
        },
        None => RuntimeError::GuestTrap {
            function: function.to_string(),
            message: Some(format!("{error:#}")),
            code: None,
        },
    }
}
