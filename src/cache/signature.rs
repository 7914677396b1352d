//! Deterministic identities for memoized calls.

use std::fmt;

use serde::Serialize;

/// Identity of one memoized call: the operation name plus its argument
/// values, serialized in declaration order.
///
/// Argument rendering is JSON, which keeps keys order-sensitive and
/// type-sensitive (`1` and `"1"` produce distinct signatures). Rust has no
/// keyword arguments, so the equal-but-reordered-kwargs case cannot arise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallSignature {
    op: &'static str,
    args: String,
}

impl CallSignature {
    /// Start building a signature for the named operation.
    #[must_use]
    pub fn of(op: &'static str) -> SignatureBuilder {
        SignatureBuilder {
            op,
            parts: Vec::new(),
        }
    }

    #[must_use]
    pub fn operation(&self) -> &'static str {
        self.op
    }
}

impl fmt::Display for CallSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.op, self.args)
    }
}

pub struct SignatureBuilder {
    op: &'static str,
    parts: Vec<String>,
}

impl SignatureBuilder {
    /// Append one argument value, in call order.
    #[must_use]
    pub fn arg<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        let rendered = serde_json::to_string(value)
            .unwrap_or_else(|err| format!("<unserializable:{err}>"));
        self.parts.push(rendered);
        self
    }

    #[must_use]
    pub fn finish(self) -> CallSignature {
        CallSignature {
            op: self.op,
            args: self.parts.join(","),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_arguments_produce_equal_signatures() {
        let a = CallSignature::of("weather.current").arg("New York").finish();
        let b = CallSignature::of("weather.current").arg("New York").finish();
        assert_eq!(a, b);
    }

    #[test]
    fn argument_order_is_significant() {
        let a = CallSignature::of("op").arg("x").arg("y").finish();
        let b = CallSignature::of("op").arg("y").arg("x").finish();
        assert_ne!(a, b);
    }

    #[test]
    fn argument_types_are_significant() {
        let number = CallSignature::of("op").arg(&1).finish();
        let string = CallSignature::of("op").arg("1").finish();
        assert_ne!(number, string);
    }

    #[test]
    fn operations_partition_the_key_space() {
        let a = CallSignature::of("sales.top").arg(&5).finish();
        let b = CallSignature::of("holiday.outlook").arg(&5).finish();
        assert_ne!(a, b);
    }
}
