use crate::error::{FieldMap, PaymentError, Result};
use serde_json::Value;
use std::io::Read;

/// Reads a flat gateway field set from a JSON object.
///
/// Gateways post everything as strings, but hand-written fixtures often use
/// numbers and booleans; those are converted to their string form and `null`
/// becomes an empty string. Nested values are rejected.
pub struct FieldReader<R: Read> {
    source: R,
}

impl<R: Read> FieldReader<R> {
    /// Creates a new `FieldReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        Self { source }
    }

    pub fn fields(self) -> Result<FieldMap> {
        let value: Value = serde_json::from_reader(self.source)?;
        let Value::Object(object) = value else {
            return Err(PaymentError::InvalidField {
                field: "<root>".to_string(),
                value: "expected a JSON object".to_string(),
            });
        };

        object
            .into_iter()
            .map(|(key, value)| {
                let text = match value {
                    Value::String(s) => s,
                    Value::Null => String::new(),
                    Value::Bool(b) => b.to_string(),
                    Value::Number(n) => n.to_string(),
                    nested => {
                        return Err(PaymentError::InvalidField {
                            field: key,
                            value: nested.to_string(),
                        });
                    }
                };
                Ok((key, text))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_flat_object() {
        let data = r#"{"oid": "1001", "amount": 10.5, "instalment": null, "Response": "Approved"}"#;
        let fields = FieldReader::new(data.as_bytes()).fields().unwrap();

        assert_eq!(fields.get("oid").unwrap(), "1001");
        assert_eq!(fields.get("amount").unwrap(), "10.5");
        assert_eq!(fields.get("instalment").unwrap(), "");
        assert_eq!(fields.len(), 4);
    }

    #[test]
    fn test_reader_rejects_nested_values() {
        let data = r#"{"oid": {"id": 1}}"#;
        let result = FieldReader::new(data.as_bytes()).fields();
        assert!(matches!(result, Err(PaymentError::InvalidField { field, .. }) if field == "oid"));
    }

    #[test]
    fn test_reader_rejects_non_objects() {
        assert!(FieldReader::new("[1, 2]".as_bytes()).fields().is_err());
        assert!(matches!(
            FieldReader::new("{oid".as_bytes()).fields(),
            Err(PaymentError::JsonError(_))
        ));
    }
}
