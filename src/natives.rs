use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;

use crate::objects::object::NativeObject;
use crate::value::{make_number_value, Value};

/// `clock()` — seconds since the Unix epoch, as an `f64`. Scripts use this
/// for crude timing (`var start = clock(); ...; print clock() - start;`).
pub struct Clock;

impl NativeObject for Clock {
    fn run(&self, args: &[Value]) -> Result<Value, String> {
        if !args.is_empty() {
            return Err(format!("Expected 0 arguments but got {}.", args.len()));
        }
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| "system clock is before the Unix epoch".to_string())?;
        Ok(make_number_value(elapsed.as_secs_f64()))
    }
}

/// One entry in the native-function registry: a global name, the arity the
/// VM enforces before calling it, and a constructor for a fresh instance.
pub struct NativeDef {
    pub name: &'static str,
    pub arity: u8,
    pub make: fn() -> Box<dyn NativeObject>,
}

/// The full native-function registry, built once on first access. New
/// natives are added as entries here rather than as one-off bootstrap
/// calls, so `Vm::new()` stays a plain iteration over this table.
pub static NATIVES: Lazy<Vec<NativeDef>> = Lazy::new(|| {
    vec![NativeDef {
        name: "clock",
        arity: 0,
        make: || Box::new(Clock),
    }]
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_returns_a_positive_number_of_seconds() {
        let value = Clock.run(&[]).unwrap();
        assert!(crate::value::as_number(&value) > 0.0);
    }

    #[test]
    fn clock_rejects_arguments() {
        assert!(Clock.run(&[make_number_value(1.0)]).is_err());
    }

    #[test]
    fn registry_contains_clock_with_arity_zero() {
        let clock_def = NATIVES.iter().find(|def| def.name == "clock").unwrap();
        assert_eq!(clock_def.arity, 0);
        assert!((clock_def.make)().run(&[]).is_ok());
    }
}
